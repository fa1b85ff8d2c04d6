//! Error type for `rfid-store-sqlite`.

use rfid_core::{Classify, ErrorClass};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error(transparent)]
  Core(#[from] rfid_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("sqlite error: {0}")]
  Sqlite(#[from] rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  /// A stored row that does not decode into a domain value.
  #[error("corrupt row: {0}")]
  Decode(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Classify for Error {
  fn class(&self) -> ErrorClass {
    match self {
      Self::Core(e) => e.class(),
      Self::Sqlite(e) | Self::Database(tokio_rusqlite::Error::Rusqlite(e)) => {
        classify_sqlite(e)
      }
      _ => ErrorClass::Internal,
    }
  }
}

/// UNIQUE, CHECK and FOREIGN KEY failures are integrity errors; everything
/// else is the database misbehaving.
fn classify_sqlite(e: &rusqlite::Error) -> ErrorClass {
  match e.sqlite_error_code() {
    Some(rusqlite::ErrorCode::ConstraintViolation) => ErrorClass::Integrity,
    _ => ErrorClass::Internal,
  }
}

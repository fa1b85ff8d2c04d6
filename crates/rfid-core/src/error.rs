//! Error types for `rfid-core`.

use thiserror::Error;

use crate::{
  id::{AccessGroupId, EmployeeId},
  model::CardNumber,
};

#[derive(Debug, Error)]
pub enum Error {
  #[error("card number must be exactly 10 digits, got {0:?}")]
  InvalidCardNumber(String),

  #[error("card number {0} is already in use")]
  DuplicateCardNumber(CardNumber),

  #[error("a card cannot belong to an employee and a contact at once")]
  ConflictingOwners,

  #[error("clear the card's current {0} before assigning another owner kind")]
  OwnerNotCleared(&'static str),

  #[error("a card must have an owner")]
  MissingOwner,

  #[error("{group} is not allowed by the department of {employee}")]
  GroupNotAllowed {
    employee: EmployeeId,
    group:    AccessGroupId,
  },

  /// A storage-level constraint was violated (validation was bypassed).
  #[error("integrity error: {0}")]
  Integrity(String),

  #[error("{kind} {id} not found")]
  NotFound { kind: &'static str, id: i64 },
}

impl Error {
  pub fn not_found(kind: &'static str, id: i64) -> Self {
    Self::NotFound { kind, id }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

// ─── Classification ──────────────────────────────────────────────────────────

/// Coarse category of a failure, independent of the backend that raised it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
  /// User-facing; the mutation was rejected before touching storage.
  Validation,
  /// A storage constraint fired.
  Integrity,
  NotFound,
  Internal,
}

/// Implemented by every error type a store can return so that outer layers
/// can react to the category without knowing the backend.
pub trait Classify {
  fn class(&self) -> ErrorClass;

  fn is_validation(&self) -> bool { self.class() == ErrorClass::Validation }
}

impl Classify for Error {
  fn class(&self) -> ErrorClass {
    match self {
      Self::InvalidCardNumber(_)
      | Self::DuplicateCardNumber(_)
      | Self::ConflictingOwners
      | Self::OwnerNotCleared(_)
      | Self::MissingOwner
      | Self::GroupNotAllowed { .. } => ErrorClass::Validation,
      Self::Integrity(_) => ErrorClass::Integrity,
      Self::NotFound { .. } => ErrorClass::NotFound,
    }
  }
}

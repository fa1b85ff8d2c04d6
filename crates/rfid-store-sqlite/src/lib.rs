//! SQLite backend for the RFID access store.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! without blocking the async runtime. Every [`rfid_core::AccessStore`] call is
//! one SQLite transaction: the entity write, the reconciliation it triggers
//! and the sync events it emits commit together or not at all.

mod encode;
mod graph;
mod schema;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use graph::SqliteGraph;
pub use store::SqliteStore;

#[cfg(test)]
mod tests;

//! Core types and the permission reconciliation engine for RFID door access.
//!
//! This crate is deliberately free of HTTP and database dependencies. Storage
//! backends implement [`graph::AccessGraph`] and [`graph::GraphMut`]; the
//! engine in [`reconcile`] and the hooks in [`mutate`] run against those
//! traits inside whatever transaction the backend provides.

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod compat;
pub mod error;
pub mod graph;
pub mod id;
pub mod memory;
pub mod model;
pub mod mutate;
pub mod reconcile;
pub mod resolver;
pub mod store;

pub use error::{Classify, Error, ErrorClass, Result};

//! JSON REST API for the RFID access reconciler.
//!
//! Exposes an axum [`Router`] backed by any [`rfid_core::store::AccessStore`].
//! Every mutating endpoint answers with the card–door relation changes it
//! caused; the device layer picks up the matching grant/revoke events from
//! `POST /sync-events/drain`. Auth and TLS are the caller's responsibility.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api", rfid_api::api_router(store.clone()))
//! ```

pub mod cards;
pub mod entities;
pub mod error;
pub mod groups;
pub mod hardware;
pub mod owners;
pub mod relevance;

use std::{path::PathBuf, sync::Arc};

use axum::{
  Router,
  routing::{delete, get, post, put},
};
use rfid_core::store::AccessStore;
use serde::Deserialize;
use tower_http::trace::TraceLayer;

pub use error::ApiError;

// ─── Configuration ────────────────────────────────────────────────────────────

/// Runtime server configuration, deserialised from `config.toml` and
/// `RFID_*` environment variables.
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
  #[serde(default = "default_host")]
  pub host:       String,
  #[serde(default = "default_port")]
  pub port:       u16,
  pub store_path: PathBuf,
}

fn default_host() -> String { "127.0.0.1".to_string() }

fn default_port() -> u16 { 8080 }

// ─── Router ───────────────────────────────────────────────────────────────────

/// Build a fully-materialised API router for `store`.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<S>(store: Arc<S>) -> Router<()>
where
  S: AccessStore + 'static,
{
  Router::new()
    // People
    .route("/employees", post(entities::create_employee::<S>))
    .route("/employees/{id}", delete(owners::delete_employee::<S>))
    .route("/employees/{id}/department", put(owners::set_department::<S>))
    .route(
      "/employees/{id}/memberships/{group}",
      put(owners::put_employee_membership::<S>)
        .delete(owners::delete_employee_membership::<S>),
    )
    .route("/contacts", post(entities::create_contact::<S>))
    .route("/contacts/{id}", delete(owners::delete_contact::<S>))
    .route(
      "/contacts/{id}/memberships/{group}",
      put(owners::put_contact_membership::<S>)
        .delete(owners::delete_contact_membership::<S>),
    )
    .route("/memberships/expire", post(owners::expire::<S>))
    .route("/departments", post(entities::create_department::<S>))
    .route("/departments/{id}/groups", put(owners::set_department_groups::<S>))
    // Hardware
    .route("/webstacks", post(entities::create_webstack::<S>))
    .route("/controllers", post(entities::create_controller::<S>))
    .route("/controllers/{id}/external-db", put(hardware::set_sync_mode::<S>))
    .route("/controllers/{id}/reload", post(hardware::reload::<S>))
    .route("/doors", post(entities::create_door::<S>))
    .route("/doors/{id}", delete(hardware::delete_door::<S>))
    .route("/doors/{id}/card-type", put(hardware::set_card_type::<S>))
    .route("/doors/{id}/relations", get(hardware::door_relations::<S>))
    .route("/doors/{id}/potential-cards", get(hardware::potential_cards::<S>))
    .route("/doors/{id}/reconcile", post(hardware::reconcile_door::<S>))
    // Access configuration
    .route("/time-schedules", post(entities::create_time_schedule::<S>))
    .route("/card-types", post(entities::create_card_type::<S>))
    .route("/access-groups", post(entities::create_access_group::<S>))
    .route("/access-groups/{id}", delete(groups::delete::<S>))
    .route(
      "/access-groups/{id}/doors/{door}",
      put(groups::put_door::<S>).delete(groups::delete_door::<S>),
    )
    // Cards
    .route("/cards", post(cards::create::<S>))
    .route(
      "/cards/{id}",
      get(cards::get_one::<S>)
        .patch(cards::update::<S>)
        .delete(cards::delete::<S>),
    )
    .route("/cards/{id}/relations", get(cards::relations::<S>))
    .route("/cards/{id}/potential-doors", get(cards::potential_doors::<S>))
    .route("/cards/{id}/reconcile", post(cards::reconcile::<S>))
    // Reconciliation
    .route("/relevance/fast", post(relevance::fast::<S>))
    .route("/relevance/slow", post(relevance::slow::<S>))
    .route("/sync-events/drain", post(relevance::drain::<S>))
    .with_state(store)
    .layer(TraceLayer::new_for_http())
}

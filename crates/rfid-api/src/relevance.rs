//! Explicit single-pair relevance checks and the device sync outbox.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `POST` | `/relevance/fast` | Body: `{"card":1,"door":2,"schedule":3}`; `schedule` optional |
//! | `POST` | `/relevance/slow` | Body: `{"card":1,"door":2}` |
//! | `POST` | `/sync-events/drain` | Pending grant/revoke events, oldest first |

use std::sync::Arc;

use axum::{Json, extract::State};
use rfid_core::{
  id::{CardId, DoorId, TimeScheduleId},
  model::SyncEvent,
  reconcile::Changes,
  store::AccessStore,
};
use serde::Deserialize;

use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct PairBody {
  pub card:     CardId,
  pub door:     DoorId,
  /// Asserted schedule; resolved through the door's grants when absent.
  #[serde(default)]
  pub schedule: Option<TimeScheduleId>,
}

/// `POST /relevance/fast`
pub async fn fast<S: AccessStore>(
  State(store): State<Arc<S>>,
  Json(body): Json<PairBody>,
) -> Result<Json<Changes>, ApiError> {
  let changes = store
    .check_relevance_fast(body.card, body.door, body.schedule)
    .await
    .map_err(ApiError::store)?;
  Ok(Json(changes))
}

/// `POST /relevance/slow`
pub async fn slow<S: AccessStore>(
  State(store): State<Arc<S>>,
  Json(body): Json<PairBody>,
) -> Result<Json<Changes>, ApiError> {
  let changes = store
    .check_relevance_slow(body.card, body.door)
    .await
    .map_err(ApiError::store)?;
  Ok(Json(changes))
}

/// `POST /sync-events/drain`
pub async fn drain<S: AccessStore>(
  State(store): State<Arc<S>>,
) -> Result<Json<Vec<SyncEvent>>, ApiError> {
  let events = store.drain_sync_events().await.map_err(ApiError::store)?;
  Ok(Json(events))
}

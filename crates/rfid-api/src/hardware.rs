//! Handlers for doors and controllers.
//!
//! | Method   | Path | Notes |
//! |----------|------|-------|
//! | `PUT`    | `/doors/{id}/card-type` | Body: [`CardTypeFilter`], e.g. `{"kind":"any"}` |
//! | `DELETE` | `/doors/{id}` | Revokes every relation of the door |
//! | `GET`    | `/doors/{id}/relations` | Materialised card–door relations |
//! | `GET`    | `/doors/{id}/potential-cards` | Cards whose owners reach the door |
//! | `POST`   | `/doors/{id}/reconcile` | Full recomputation for the door |
//! | `PUT`    | `/controllers/{id}/external-db` | Body: `{"external_db":true}` |
//! | `POST`   | `/controllers/{id}/reload` | Recompute every door of the controller |

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, State},
};
use rfid_core::{
  id::{ControllerId, DoorId},
  model::{CardDoorRelation, CardTypeFilter},
  reconcile::Changes,
  resolver::PotentialCard,
  store::AccessStore,
};
use serde::Deserialize;

use crate::error::ApiError;

// ─── Doors ────────────────────────────────────────────────────────────────────

/// `PUT /doors/{id}/card-type`
pub async fn set_card_type<S: AccessStore>(
  State(store): State<Arc<S>>,
  Path(id): Path<DoorId>,
  Json(filter): Json<CardTypeFilter>,
) -> Result<Json<Changes>, ApiError> {
  let changes = store
    .set_door_card_type(id, filter)
    .await
    .map_err(ApiError::store)?;
  Ok(Json(changes))
}

/// `DELETE /doors/{id}`
pub async fn delete_door<S: AccessStore>(
  State(store): State<Arc<S>>,
  Path(id): Path<DoorId>,
) -> Result<Json<Changes>, ApiError> {
  let changes = store.delete_door(id).await.map_err(ApiError::store)?;
  Ok(Json(changes))
}

/// `GET /doors/{id}/relations`
pub async fn door_relations<S: AccessStore>(
  State(store): State<Arc<S>>,
  Path(id): Path<DoorId>,
) -> Result<Json<Vec<CardDoorRelation>>, ApiError> {
  let relations = store
    .relations_of_door(id)
    .await
    .map_err(ApiError::store)?;
  Ok(Json(relations))
}

/// `GET /doors/{id}/potential-cards`
pub async fn potential_cards<S: AccessStore>(
  State(store): State<Arc<S>>,
  Path(id): Path<DoorId>,
) -> Result<Json<Vec<PotentialCard>>, ApiError> {
  let cards = store
    .potential_access_cards(id)
    .await
    .map_err(ApiError::store)?;
  Ok(Json(cards))
}

/// `POST /doors/{id}/reconcile`
pub async fn reconcile_door<S: AccessStore>(
  State(store): State<Arc<S>>,
  Path(id): Path<DoorId>,
) -> Result<Json<Changes>, ApiError> {
  let changes = store.update_door_rels(id).await.map_err(ApiError::store)?;
  Ok(Json(changes))
}

// ─── Controllers ──────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct SyncModeBody {
  pub external_db: bool,
}

/// `PUT /controllers/{id}/external-db`
pub async fn set_sync_mode<S: AccessStore>(
  State(store): State<Arc<S>>,
  Path(id): Path<ControllerId>,
  Json(body): Json<SyncModeBody>,
) -> Result<Json<Changes>, ApiError> {
  let changes = store
    .set_controller_external_db(id, body.external_db)
    .await
    .map_err(ApiError::store)?;
  Ok(Json(changes))
}

/// `POST /controllers/{id}/reload`
pub async fn reload<S: AccessStore>(
  State(store): State<Arc<S>>,
  Path(id): Path<ControllerId>,
) -> Result<Json<Changes>, ApiError> {
  let changes = store
    .reload_controller_cards(id)
    .await
    .map_err(ApiError::store)?;
  Ok(Json(changes))
}

//! Handlers for access-group doors and group deletion.
//!
//! | Method   | Path | Notes |
//! |----------|------|-------|
//! | `PUT`    | `/access-groups/{id}/doors/{door}` | Body: `{"schedule":<id>}`; replaces an existing schedule |
//! | `DELETE` | `/access-groups/{id}/doors/{door}` | No-op if the door is not granted |
//! | `DELETE` | `/access-groups/{id}` | Drops memberships and grants too |

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, State},
};
use rfid_core::{
  id::{AccessGroupId, DoorId, TimeScheduleId},
  reconcile::Changes,
  store::AccessStore,
};
use serde::Deserialize;

use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct GrantBody {
  pub schedule: TimeScheduleId,
}

/// `PUT /access-groups/{id}/doors/{door}`
pub async fn put_door<S: AccessStore>(
  State(store): State<Arc<S>>,
  Path((group, door)): Path<(AccessGroupId, DoorId)>,
  Json(body): Json<GrantBody>,
) -> Result<Json<Changes>, ApiError> {
  let changes = store
    .add_group_door(group, door, body.schedule)
    .await
    .map_err(ApiError::store)?;
  Ok(Json(changes))
}

/// `DELETE /access-groups/{id}/doors/{door}`
pub async fn delete_door<S: AccessStore>(
  State(store): State<Arc<S>>,
  Path((group, door)): Path<(AccessGroupId, DoorId)>,
) -> Result<Json<Changes>, ApiError> {
  let changes = store
    .remove_group_door(group, door)
    .await
    .map_err(ApiError::store)?;
  Ok(Json(changes))
}

/// `DELETE /access-groups/{id}`
pub async fn delete<S: AccessStore>(
  State(store): State<Arc<S>>,
  Path(group): Path<AccessGroupId>,
) -> Result<Json<Changes>, ApiError> {
  let changes = store
    .delete_access_group(group)
    .await
    .map_err(ApiError::store)?;
  Ok(Json(changes))
}

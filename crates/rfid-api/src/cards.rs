//! Handlers for `/cards` endpoints.
//!
//! | Method   | Path | Notes |
//! |----------|------|-------|
//! | `POST`   | `/cards` | Body: [`NewCard`]; returns 201 + stored card |
//! | `GET`    | `/cards/{id}` | 404 if not found |
//! | `PATCH`  | `/cards/{id}` | Body: [`CardUpdate`]; `null` clears an owner |
//! | `DELETE` | `/cards/{id}` | Returns the revoked relations |
//! | `GET`    | `/cards/{id}/relations` | Materialised card–door relations |
//! | `GET`    | `/cards/{id}/potential-doors` | Optional `?group=<id>` |
//! | `POST`   | `/cards/{id}/reconcile` | Full recomputation for the card |

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, Query, State},
  http::StatusCode,
  response::IntoResponse,
};
use rfid_core::{
  id::{AccessGroupId, CardId},
  model::{Card, CardDoorRelation, CardUpdate, NewCard},
  reconcile::Changes,
  resolver::PotentialDoor,
  store::AccessStore,
};
use serde::Deserialize;

use crate::error::ApiError;

// ─── Create ───────────────────────────────────────────────────────────────────

/// `POST /cards`
pub async fn create<S: AccessStore>(
  State(store): State<Arc<S>>,
  Json(body): Json<NewCard>,
) -> Result<impl IntoResponse, ApiError> {
  let card = store.create_card(body).await.map_err(ApiError::store)?;
  Ok((StatusCode::CREATED, Json(card)))
}

// ─── Get one ──────────────────────────────────────────────────────────────────

/// `GET /cards/{id}`
pub async fn get_one<S: AccessStore>(
  State(store): State<Arc<S>>,
  Path(id): Path<CardId>,
) -> Result<Json<Card>, ApiError> {
  let card = store
    .get_card(id)
    .await
    .map_err(ApiError::store)?
    .ok_or_else(|| ApiError::NotFound(id.to_string()))?;
  Ok(Json(card))
}

// ─── Update / delete ──────────────────────────────────────────────────────────

/// `PATCH /cards/{id}`
pub async fn update<S: AccessStore>(
  State(store): State<Arc<S>>,
  Path(id): Path<CardId>,
  Json(body): Json<CardUpdate>,
) -> Result<Json<Card>, ApiError> {
  let card = store.update_card(id, body).await.map_err(ApiError::store)?;
  Ok(Json(card))
}

/// `DELETE /cards/{id}`
pub async fn delete<S: AccessStore>(
  State(store): State<Arc<S>>,
  Path(id): Path<CardId>,
) -> Result<Json<Changes>, ApiError> {
  let changes = store.delete_card(id).await.map_err(ApiError::store)?;
  Ok(Json(changes))
}

// ─── Access ───────────────────────────────────────────────────────────────────

/// `GET /cards/{id}/relations`
pub async fn relations<S: AccessStore>(
  State(store): State<Arc<S>>,
  Path(id): Path<CardId>,
) -> Result<Json<Vec<CardDoorRelation>>, ApiError> {
  let relations = store
    .relations_of_card(id)
    .await
    .map_err(ApiError::store)?;
  Ok(Json(relations))
}

#[derive(Debug, Deserialize)]
pub struct PotentialParams {
  /// Restrict the answer to the doors of one access group.
  pub group: Option<AccessGroupId>,
}

/// `GET /cards/{id}/potential-doors[?group=<id>]`
pub async fn potential_doors<S: AccessStore>(
  State(store): State<Arc<S>>,
  Path(id): Path<CardId>,
  Query(params): Query<PotentialParams>,
) -> Result<Json<Vec<PotentialDoor>>, ApiError> {
  let doors = store
    .potential_access_doors(id, params.group)
    .await
    .map_err(ApiError::store)?;
  Ok(Json(doors))
}

/// `POST /cards/{id}/reconcile`
pub async fn reconcile<S: AccessStore>(
  State(store): State<Arc<S>>,
  Path(id): Path<CardId>,
) -> Result<Json<Changes>, ApiError> {
  let changes = store.update_card_rels(id).await.map_err(ApiError::store)?;
  Ok(Json(changes))
}

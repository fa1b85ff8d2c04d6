//! Handlers that create plain entities.
//!
//! | Method | Path | Body |
//! |--------|------|------|
//! | `POST` | `/employees` | [`NewEmployee`] |
//! | `POST` | `/contacts` | `{"name":"..."}` |
//! | `POST` | `/departments` | [`NewDepartment`] |
//! | `POST` | `/webstacks` | `{"name":"..."}` |
//! | `POST` | `/controllers` | [`NewController`] |
//! | `POST` | `/doors` | [`NewDoor`] |
//! | `POST` | `/time-schedules` | `{"name":"..."}` |
//! | `POST` | `/card-types` | `{"name":"..."}` |
//! | `POST` | `/access-groups` | `{"name":"..."}` |
//!
//! Every endpoint answers `201` with the stored entity.

use std::sync::Arc;

use axum::{
  Json,
  extract::State,
  http::StatusCode,
  response::IntoResponse,
};
use rfid_core::{
  model::{NewController, NewDepartment, NewDoor, NewEmployee},
  store::AccessStore,
};
use serde::Deserialize;

use crate::error::ApiError;

/// Body for entities that only carry a name.
#[derive(Debug, Deserialize)]
pub struct NameBody {
  pub name: String,
}

// ─── People ───────────────────────────────────────────────────────────────────

/// `POST /employees`
pub async fn create_employee<S: AccessStore>(
  State(store): State<Arc<S>>,
  Json(body): Json<NewEmployee>,
) -> Result<impl IntoResponse, ApiError> {
  let employee = store
    .create_employee(body)
    .await
    .map_err(ApiError::store)?;
  Ok((StatusCode::CREATED, Json(employee)))
}

/// `POST /contacts`
pub async fn create_contact<S: AccessStore>(
  State(store): State<Arc<S>>,
  Json(body): Json<NameBody>,
) -> Result<impl IntoResponse, ApiError> {
  let contact = store
    .create_contact(body.name)
    .await
    .map_err(ApiError::store)?;
  Ok((StatusCode::CREATED, Json(contact)))
}

/// `POST /departments`
pub async fn create_department<S: AccessStore>(
  State(store): State<Arc<S>>,
  Json(body): Json<NewDepartment>,
) -> Result<impl IntoResponse, ApiError> {
  let department = store
    .create_department(body)
    .await
    .map_err(ApiError::store)?;
  Ok((StatusCode::CREATED, Json(department)))
}

// ─── Hardware ─────────────────────────────────────────────────────────────────

/// `POST /webstacks`
pub async fn create_webstack<S: AccessStore>(
  State(store): State<Arc<S>>,
  Json(body): Json<NameBody>,
) -> Result<impl IntoResponse, ApiError> {
  let webstack = store
    .create_webstack(body.name)
    .await
    .map_err(ApiError::store)?;
  Ok((StatusCode::CREATED, Json(webstack)))
}

/// `POST /controllers`
pub async fn create_controller<S: AccessStore>(
  State(store): State<Arc<S>>,
  Json(body): Json<NewController>,
) -> Result<impl IntoResponse, ApiError> {
  let controller = store
    .create_controller(body)
    .await
    .map_err(ApiError::store)?;
  Ok((StatusCode::CREATED, Json(controller)))
}

/// `POST /doors`
pub async fn create_door<S: AccessStore>(
  State(store): State<Arc<S>>,
  Json(body): Json<NewDoor>,
) -> Result<impl IntoResponse, ApiError> {
  let door = store.create_door(body).await.map_err(ApiError::store)?;
  Ok((StatusCode::CREATED, Json(door)))
}

// ─── Access configuration ─────────────────────────────────────────────────────

/// `POST /time-schedules`
pub async fn create_time_schedule<S: AccessStore>(
  State(store): State<Arc<S>>,
  Json(body): Json<NameBody>,
) -> Result<impl IntoResponse, ApiError> {
  let schedule = store
    .create_time_schedule(body.name)
    .await
    .map_err(ApiError::store)?;
  Ok((StatusCode::CREATED, Json(schedule)))
}

/// `POST /card-types`
pub async fn create_card_type<S: AccessStore>(
  State(store): State<Arc<S>>,
  Json(body): Json<NameBody>,
) -> Result<impl IntoResponse, ApiError> {
  let card_type = store
    .create_card_type(body.name)
    .await
    .map_err(ApiError::store)?;
  Ok((StatusCode::CREATED, Json(card_type)))
}

/// `POST /access-groups`
pub async fn create_access_group<S: AccessStore>(
  State(store): State<Arc<S>>,
  Json(body): Json<NameBody>,
) -> Result<impl IntoResponse, ApiError> {
  let group = store
    .create_access_group(body.name)
    .await
    .map_err(ApiError::store)?;
  Ok((StatusCode::CREATED, Json(group)))
}

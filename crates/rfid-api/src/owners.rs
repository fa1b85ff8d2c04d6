//! Handlers for owners, their memberships and department allow-lists.
//!
//! | Method   | Path | Notes |
//! |----------|------|-------|
//! | `PUT`    | `/employees/{id}/memberships/{group}` | Body: `{}` or `{"expiration":"<rfc3339>"}` |
//! | `DELETE` | `/employees/{id}/memberships/{group}` | No-op if absent |
//! | `PUT`    | `/contacts/{id}/memberships/{group}` | As above |
//! | `DELETE` | `/contacts/{id}/memberships/{group}` | As above |
//! | `POST`   | `/memberships/expire` | Drops memberships whose expiration has passed |
//! | `PUT`    | `/employees/{id}/department` | Body: `{"department":<id>\|null}` |
//! | `DELETE` | `/employees/{id}` | Deletes the employee's cards too |
//! | `DELETE` | `/contacts/{id}` | Deletes the contact's cards too |
//! | `PUT`    | `/departments/{id}/groups` | Body: `{"groups":[...]}` |
//!
//! Every endpoint answers with the relation changes it caused.

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, State},
};
use chrono::{DateTime, Utc};
use rfid_core::{
  id::{AccessGroupId, ContactId, DepartmentId, EmployeeId},
  model::OwnerRef,
  reconcile::Changes,
  store::AccessStore,
};
use serde::Deserialize;

use crate::error::ApiError;

// ─── Memberships ──────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct MembershipBody {
  #[serde(default)]
  pub expiration: Option<DateTime<Utc>>,
}

async fn put_membership<S: AccessStore>(
  store: &S,
  owner: OwnerRef,
  group: AccessGroupId,
  body: MembershipBody,
) -> Result<Json<Changes>, ApiError> {
  let changes = store
    .add_membership(owner, group, body.expiration)
    .await
    .map_err(ApiError::store)?;
  Ok(Json(changes))
}

async fn delete_membership<S: AccessStore>(
  store: &S,
  owner: OwnerRef,
  group: AccessGroupId,
) -> Result<Json<Changes>, ApiError> {
  let changes = store
    .remove_membership(owner, group)
    .await
    .map_err(ApiError::store)?;
  Ok(Json(changes))
}

/// `PUT /employees/{id}/memberships/{group}`
pub async fn put_employee_membership<S: AccessStore>(
  State(store): State<Arc<S>>,
  Path((id, group)): Path<(EmployeeId, AccessGroupId)>,
  Json(body): Json<MembershipBody>,
) -> Result<Json<Changes>, ApiError> {
  put_membership(&*store, OwnerRef::Employee(id), group, body).await
}

/// `DELETE /employees/{id}/memberships/{group}`
pub async fn delete_employee_membership<S: AccessStore>(
  State(store): State<Arc<S>>,
  Path((id, group)): Path<(EmployeeId, AccessGroupId)>,
) -> Result<Json<Changes>, ApiError> {
  delete_membership(&*store, OwnerRef::Employee(id), group).await
}

/// `PUT /contacts/{id}/memberships/{group}`
pub async fn put_contact_membership<S: AccessStore>(
  State(store): State<Arc<S>>,
  Path((id, group)): Path<(ContactId, AccessGroupId)>,
  Json(body): Json<MembershipBody>,
) -> Result<Json<Changes>, ApiError> {
  put_membership(&*store, OwnerRef::Contact(id), group, body).await
}

/// `DELETE /contacts/{id}/memberships/{group}`
pub async fn delete_contact_membership<S: AccessStore>(
  State(store): State<Arc<S>>,
  Path((id, group)): Path<(ContactId, AccessGroupId)>,
) -> Result<Json<Changes>, ApiError> {
  delete_membership(&*store, OwnerRef::Contact(id), group).await
}

/// `POST /memberships/expire`
pub async fn expire<S: AccessStore>(
  State(store): State<Arc<S>>,
) -> Result<Json<Changes>, ApiError> {
  let changes = store.expire_memberships().await.map_err(ApiError::store)?;
  Ok(Json(changes))
}

// ─── Departments ──────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct DepartmentBody {
  pub department: Option<DepartmentId>,
}

/// `PUT /employees/{id}/department`
pub async fn set_department<S: AccessStore>(
  State(store): State<Arc<S>>,
  Path(id): Path<EmployeeId>,
  Json(body): Json<DepartmentBody>,
) -> Result<Json<Changes>, ApiError> {
  let changes = store
    .set_employee_department(id, body.department)
    .await
    .map_err(ApiError::store)?;
  Ok(Json(changes))
}

#[derive(Debug, Deserialize)]
pub struct GroupsBody {
  pub groups: Vec<AccessGroupId>,
}

/// `PUT /departments/{id}/groups`
pub async fn set_department_groups<S: AccessStore>(
  State(store): State<Arc<S>>,
  Path(id): Path<DepartmentId>,
  Json(body): Json<GroupsBody>,
) -> Result<Json<Changes>, ApiError> {
  let changes = store
    .set_department_groups(id, body.groups)
    .await
    .map_err(ApiError::store)?;
  Ok(Json(changes))
}

// ─── Deletion ─────────────────────────────────────────────────────────────────

/// `DELETE /employees/{id}`
pub async fn delete_employee<S: AccessStore>(
  State(store): State<Arc<S>>,
  Path(id): Path<EmployeeId>,
) -> Result<Json<Changes>, ApiError> {
  let changes = store.delete_employee(id).await.map_err(ApiError::store)?;
  Ok(Json(changes))
}

/// `DELETE /contacts/{id}`
pub async fn delete_contact<S: AccessStore>(
  State(store): State<Arc<S>>,
  Path(id): Path<ContactId>,
) -> Result<Json<Changes>, ApiError> {
  let changes = store.delete_contact(id).await.map_err(ApiError::store)?;
  Ok(Json(changes))
}

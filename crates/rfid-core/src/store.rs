//! The `AccessStore` trait: the async service surface over a persistent
//! backend.
//!
//! Each method is one unit of work. Implementations run the matching
//! [`crate::mutate::Mutator`] or [`crate::reconcile::Reconciler`] call inside
//! a single storage transaction and commit only if it succeeds, so concurrent
//! reconciliations over the same (card, door) pairs serialise in the store.
//!
//! All methods return `Send` futures so the trait can be used in multi-threaded
//! async runtimes (e.g. tokio with `axum`).

use std::future::Future;

use chrono::{DateTime, Utc};

use crate::{
  Classify,
  id::{
    AccessGroupId, CardId, ContactId, ControllerId, DepartmentId, DoorId,
    EmployeeId, TimeScheduleId,
  },
  model::{
    AccessGroup, Card, CardDoorRelation, CardType, CardTypeFilter, CardUpdate,
    Contact, Controller, Department, Door, Employee, NewCard, NewController,
    NewDepartment, NewDoor, NewEmployee, OwnerRef, SyncEvent, TimeSchedule,
    Webstack,
  },
  reconcile::Changes,
  resolver::{PotentialCard, PotentialDoor},
};

pub trait AccessStore: Send + Sync {
  type Error: std::error::Error + Classify + Send + Sync + 'static;

  // ── Plain entities ────────────────────────────────────────────────────

  fn create_employee(
    &self,
    new: NewEmployee,
  ) -> impl Future<Output = Result<Employee, Self::Error>> + Send + '_;

  fn create_contact(
    &self,
    name: String,
  ) -> impl Future<Output = Result<Contact, Self::Error>> + Send + '_;

  fn create_department(
    &self,
    new: NewDepartment,
  ) -> impl Future<Output = Result<Department, Self::Error>> + Send + '_;

  fn create_card_type(
    &self,
    name: String,
  ) -> impl Future<Output = Result<CardType, Self::Error>> + Send + '_;

  fn create_webstack(
    &self,
    name: String,
  ) -> impl Future<Output = Result<Webstack, Self::Error>> + Send + '_;

  fn create_controller(
    &self,
    new: NewController,
  ) -> impl Future<Output = Result<Controller, Self::Error>> + Send + '_;

  fn create_door(
    &self,
    new: NewDoor,
  ) -> impl Future<Output = Result<Door, Self::Error>> + Send + '_;

  fn create_time_schedule(
    &self,
    name: String,
  ) -> impl Future<Output = Result<TimeSchedule, Self::Error>> + Send + '_;

  fn create_access_group(
    &self,
    name: String,
  ) -> impl Future<Output = Result<AccessGroup, Self::Error>> + Send + '_;

  // ── Cards ─────────────────────────────────────────────────────────────

  /// Validate and store a card, then reconcile its relations.
  fn create_card(
    &self,
    new: NewCard,
  ) -> impl Future<Output = Result<Card, Self::Error>> + Send + '_;

  /// Retrieve a card by handle. Returns `None` if not found.
  fn get_card(
    &self,
    id: CardId,
  ) -> impl Future<Output = Result<Option<Card>, Self::Error>> + Send + '_;

  fn update_card(
    &self,
    id: CardId,
    update: CardUpdate,
  ) -> impl Future<Output = Result<Card, Self::Error>> + Send + '_;

  fn delete_card(
    &self,
    id: CardId,
  ) -> impl Future<Output = Result<Changes, Self::Error>> + Send + '_;

  // ── Owners and memberships ────────────────────────────────────────────

  fn add_membership(
    &self,
    owner: OwnerRef,
    group: AccessGroupId,
    expiration: Option<DateTime<Utc>>,
  ) -> impl Future<Output = Result<Changes, Self::Error>> + Send + '_;

  /// Removing a membership that does not exist changes nothing.
  fn remove_membership(
    &self,
    owner: OwnerRef,
    group: AccessGroupId,
  ) -> impl Future<Output = Result<Changes, Self::Error>> + Send + '_;

  /// Drop every membership whose expiration has passed and revoke the
  /// relations it justified.
  fn expire_memberships(
    &self,
  ) -> impl Future<Output = Result<Changes, Self::Error>> + Send + '_;

  fn set_employee_department(
    &self,
    employee: EmployeeId,
    department: Option<DepartmentId>,
  ) -> impl Future<Output = Result<Changes, Self::Error>> + Send + '_;

  fn set_department_groups(
    &self,
    department: DepartmentId,
    groups: Vec<AccessGroupId>,
  ) -> impl Future<Output = Result<Changes, Self::Error>> + Send + '_;

  fn delete_employee(
    &self,
    id: EmployeeId,
  ) -> impl Future<Output = Result<Changes, Self::Error>> + Send + '_;

  fn delete_contact(
    &self,
    id: ContactId,
  ) -> impl Future<Output = Result<Changes, Self::Error>> + Send + '_;

  // ── Access group doors ────────────────────────────────────────────────

  fn add_group_door(
    &self,
    group: AccessGroupId,
    door: DoorId,
    schedule: TimeScheduleId,
  ) -> impl Future<Output = Result<Changes, Self::Error>> + Send + '_;

  fn remove_group_door(
    &self,
    group: AccessGroupId,
    door: DoorId,
  ) -> impl Future<Output = Result<Changes, Self::Error>> + Send + '_;

  fn delete_access_group(
    &self,
    group: AccessGroupId,
  ) -> impl Future<Output = Result<Changes, Self::Error>> + Send + '_;

  // ── Hardware ──────────────────────────────────────────────────────────

  fn set_door_card_type(
    &self,
    door: DoorId,
    filter: CardTypeFilter,
  ) -> impl Future<Output = Result<Changes, Self::Error>> + Send + '_;

  fn set_controller_external_db(
    &self,
    controller: ControllerId,
    external_db: bool,
  ) -> impl Future<Output = Result<Changes, Self::Error>> + Send + '_;

  fn reload_controller_cards(
    &self,
    controller: ControllerId,
  ) -> impl Future<Output = Result<Changes, Self::Error>> + Send + '_;

  fn delete_door(
    &self,
    door: DoorId,
  ) -> impl Future<Output = Result<Changes, Self::Error>> + Send + '_;

  // ── Explicit reconciliation ───────────────────────────────────────────

  fn check_relevance_fast(
    &self,
    card: CardId,
    door: DoorId,
    schedule: Option<TimeScheduleId>,
  ) -> impl Future<Output = Result<Changes, Self::Error>> + Send + '_;

  fn check_relevance_slow(
    &self,
    card: CardId,
    door: DoorId,
  ) -> impl Future<Output = Result<Changes, Self::Error>> + Send + '_;

  fn update_card_rels(
    &self,
    card: CardId,
  ) -> impl Future<Output = Result<Changes, Self::Error>> + Send + '_;

  fn update_door_rels(
    &self,
    door: DoorId,
  ) -> impl Future<Output = Result<Changes, Self::Error>> + Send + '_;

  // ── Reads ─────────────────────────────────────────────────────────────

  fn relations_of_card(
    &self,
    card: CardId,
  ) -> impl Future<Output = Result<Vec<CardDoorRelation>, Self::Error>> + Send + '_;

  fn relations_of_door(
    &self,
    door: DoorId,
  ) -> impl Future<Output = Result<Vec<CardDoorRelation>, Self::Error>> + Send + '_;

  /// What the card's owner reaches right now, optionally restricted to one
  /// access group. Errors if the card does not exist.
  fn potential_access_doors(
    &self,
    card: CardId,
    restrict_to: Option<AccessGroupId>,
  ) -> impl Future<Output = Result<Vec<PotentialDoor>, Self::Error>> + Send + '_;

  fn potential_access_cards(
    &self,
    door: DoorId,
  ) -> impl Future<Output = Result<Vec<PotentialCard>, Self::Error>> + Send + '_;

  /// Remove and return the pending device sync events, oldest first.
  fn drain_sync_events(
    &self,
  ) -> impl Future<Output = Result<Vec<SyncEvent>, Self::Error>> + Send + '_;
}

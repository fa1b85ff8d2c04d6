//! The entity-graph traits the reconciler runs against.
//!
//! [`AccessGraph`] is the read side: the explicit lookups (by owner, by access
//! group, by door) the resolver and reconciler join over. [`GraphMut`] is the
//! write side. Backends implement both over a single transaction so that a
//! mutation and its reconciliation commit together.
//!
//! Deletions on [`GraphMut`] remove only the named row (and, for access
//! groups, department allow-list entries). Dependent memberships, grants and
//! relations are removed explicitly by [`crate::mutate::Mutator`] so that
//! every removal passes through the reconciler.

use chrono::{DateTime, Utc};

use crate::{
  Error,
  id::{
    AccessGroupId, CardId, CardTypeId, ContactId, ControllerId, DepartmentId,
    DoorId, EmployeeId, TimeScheduleId, WebstackId,
  },
  model::{
    AccessGroup, Card, CardDoorRelation, CardFields, CardNumber, CardType,
    CardTypeFilter, Contact, Controller, Department, Door, DoorGrant, Employee,
    Membership, NewController, NewDepartment, NewDoor, NewEmployee, OwnerRef,
    SyncEvent, TimeSchedule, Webstack,
  },
};

// ─── Reads ───────────────────────────────────────────────────────────────────

pub trait AccessGraph {
  type Error: std::error::Error + From<Error> + Send + Sync + 'static;

  // ── Owners ────────────────────────────────────────────────────────────

  fn employee(&self, id: EmployeeId) -> Result<Option<Employee>, Self::Error>;

  fn contact(&self, id: ContactId) -> Result<Option<Contact>, Self::Error>;

  fn department(
    &self,
    id: DepartmentId,
  ) -> Result<Option<Department>, Self::Error>;

  fn employees_of_department(
    &self,
    id: DepartmentId,
  ) -> Result<Vec<Employee>, Self::Error>;

  // ── Cards ─────────────────────────────────────────────────────────────

  fn card(&self, id: CardId) -> Result<Option<Card>, Self::Error>;

  fn card_by_number(
    &self,
    number: &CardNumber,
  ) -> Result<Option<Card>, Self::Error>;

  fn cards_of_owner(&self, owner: OwnerRef) -> Result<Vec<Card>, Self::Error>;

  fn card_type(&self, id: CardTypeId) -> Result<Option<CardType>, Self::Error>;

  // ── Access groups ─────────────────────────────────────────────────────

  fn access_group(
    &self,
    id: AccessGroupId,
  ) -> Result<Option<AccessGroup>, Self::Error>;

  /// All memberships of `owner`, expired ones included.
  fn memberships_of_owner(
    &self,
    owner: OwnerRef,
  ) -> Result<Vec<Membership>, Self::Error>;

  /// All memberships in `group`, expired ones included.
  fn members_of_group(
    &self,
    group: AccessGroupId,
  ) -> Result<Vec<Membership>, Self::Error>;

  /// Memberships that are no longer active at `now`.
  fn expired_memberships(
    &self,
    now: DateTime<Utc>,
  ) -> Result<Vec<Membership>, Self::Error>;

  fn grants_of_group(
    &self,
    group: AccessGroupId,
  ) -> Result<Vec<DoorGrant>, Self::Error>;

  /// Every access group granting `door`, with the schedule it grants under.
  fn grants_of_door(
    &self,
    door: DoorId,
  ) -> Result<Vec<(AccessGroupId, TimeScheduleId)>, Self::Error>;

  fn time_schedule(
    &self,
    id: TimeScheduleId,
  ) -> Result<Option<TimeSchedule>, Self::Error>;

  // ── Hardware ──────────────────────────────────────────────────────────

  fn webstack(&self, id: WebstackId) -> Result<Option<Webstack>, Self::Error>;

  fn controller(
    &self,
    id: ControllerId,
  ) -> Result<Option<Controller>, Self::Error>;

  fn door(&self, id: DoorId) -> Result<Option<Door>, Self::Error>;

  fn doors_of_controller(
    &self,
    id: ControllerId,
  ) -> Result<Vec<Door>, Self::Error>;

  // ── Relations ─────────────────────────────────────────────────────────

  fn relation(
    &self,
    card: CardId,
    door: DoorId,
  ) -> Result<Option<CardDoorRelation>, Self::Error>;

  fn relations_of_card(
    &self,
    card: CardId,
  ) -> Result<Vec<CardDoorRelation>, Self::Error>;

  fn relations_of_door(
    &self,
    door: DoorId,
  ) -> Result<Vec<CardDoorRelation>, Self::Error>;

  // ── Required lookups ──────────────────────────────────────────────────

  fn require_card(&self, id: CardId) -> Result<Card, Self::Error> {
    self
      .card(id)?
      .ok_or_else(|| Error::not_found(CardId::KIND, id.0).into())
  }

  fn require_door(&self, id: DoorId) -> Result<Door, Self::Error> {
    self
      .door(id)?
      .ok_or_else(|| Error::not_found(DoorId::KIND, id.0).into())
  }

  fn require_controller(&self, id: ControllerId) -> Result<Controller, Self::Error> {
    self
      .controller(id)?
      .ok_or_else(|| Error::not_found(ControllerId::KIND, id.0).into())
  }

  fn require_employee(&self, id: EmployeeId) -> Result<Employee, Self::Error> {
    self
      .employee(id)?
      .ok_or_else(|| Error::not_found(EmployeeId::KIND, id.0).into())
  }

  fn require_department(
    &self,
    id: DepartmentId,
  ) -> Result<Department, Self::Error> {
    self
      .department(id)?
      .ok_or_else(|| Error::not_found(DepartmentId::KIND, id.0).into())
  }

  fn require_access_group(
    &self,
    id: AccessGroupId,
  ) -> Result<AccessGroup, Self::Error> {
    self
      .access_group(id)?
      .ok_or_else(|| Error::not_found(AccessGroupId::KIND, id.0).into())
  }

  /// Fails unless `owner` refers to an existing employee or contact.
  fn require_owner(&self, owner: OwnerRef) -> Result<(), Self::Error> {
    let exists = match owner {
      OwnerRef::Employee(id) => self.employee(id)?.is_some(),
      OwnerRef::Contact(id) => self.contact(id)?.is_some(),
    };
    if exists {
      return Ok(());
    }
    Err(match owner {
      OwnerRef::Employee(id) => Error::not_found(EmployeeId::KIND, id.0),
      OwnerRef::Contact(id) => Error::not_found(ContactId::KIND, id.0),
    }
    .into())
  }
}

// ─── Writes ──────────────────────────────────────────────────────────────────

pub trait GraphMut: AccessGraph {
  // ── Owners ────────────────────────────────────────────────────────────

  fn insert_employee(
    &mut self,
    new: NewEmployee,
  ) -> Result<Employee, Self::Error>;

  fn set_employee_department(
    &mut self,
    id: EmployeeId,
    department: Option<DepartmentId>,
  ) -> Result<(), Self::Error>;

  fn delete_employee(&mut self, id: EmployeeId) -> Result<(), Self::Error>;

  fn insert_contact(&mut self, name: String) -> Result<Contact, Self::Error>;

  fn delete_contact(&mut self, id: ContactId) -> Result<(), Self::Error>;

  fn insert_department(
    &mut self,
    new: NewDepartment,
  ) -> Result<Department, Self::Error>;

  fn set_department_groups(
    &mut self,
    id: DepartmentId,
    groups: &[AccessGroupId],
  ) -> Result<(), Self::Error>;

  // ── Cards ─────────────────────────────────────────────────────────────

  fn insert_card_type(&mut self, name: String) -> Result<CardType, Self::Error>;

  /// Store a new card. Implementations enforce number uniqueness at the
  /// storage level and report a violation as an integrity failure.
  fn insert_card(&mut self, fields: CardFields) -> Result<Card, Self::Error>;

  fn update_card(&mut self, card: &Card) -> Result<(), Self::Error>;

  fn delete_card(&mut self, id: CardId) -> Result<(), Self::Error>;

  // ── Hardware ──────────────────────────────────────────────────────────

  fn insert_webstack(&mut self, name: String) -> Result<Webstack, Self::Error>;

  fn insert_controller(
    &mut self,
    new: NewController,
  ) -> Result<Controller, Self::Error>;

  fn set_controller_external_db(
    &mut self,
    id: ControllerId,
    external_db: bool,
  ) -> Result<(), Self::Error>;

  fn insert_door(&mut self, new: NewDoor) -> Result<Door, Self::Error>;

  fn set_door_card_type(
    &mut self,
    id: DoorId,
    filter: CardTypeFilter,
  ) -> Result<(), Self::Error>;

  fn delete_door(&mut self, id: DoorId) -> Result<(), Self::Error>;

  // ── Access groups ─────────────────────────────────────────────────────

  fn insert_time_schedule(
    &mut self,
    name: String,
  ) -> Result<TimeSchedule, Self::Error>;

  fn insert_access_group(
    &mut self,
    name: String,
  ) -> Result<AccessGroup, Self::Error>;

  /// Remove the group row and drop it from every department allow-list.
  fn delete_access_group(&mut self, id: AccessGroupId) -> Result<(), Self::Error>;

  /// Insert the grant, or replace the schedule of an existing one.
  fn upsert_grant(
    &mut self,
    group: AccessGroupId,
    grant: DoorGrant,
  ) -> Result<(), Self::Error>;

  /// Returns `false` when no such grant existed.
  fn delete_grant(
    &mut self,
    group: AccessGroupId,
    door: DoorId,
  ) -> Result<bool, Self::Error>;

  /// Insert the membership, or replace the expiration of an existing one.
  fn upsert_membership(&mut self, m: Membership) -> Result<(), Self::Error>;

  /// Returns `false` when no such membership existed.
  fn delete_membership(
    &mut self,
    owner: OwnerRef,
    group: AccessGroupId,
  ) -> Result<bool, Self::Error>;

  // ── Relations ─────────────────────────────────────────────────────────

  fn insert_relation(&mut self, rel: CardDoorRelation) -> Result<(), Self::Error>;

  /// Replace the schedule of the existing relation for `(rel.card, rel.door)`.
  fn update_relation(&mut self, rel: CardDoorRelation) -> Result<(), Self::Error>;

  fn delete_relation(
    &mut self,
    card: CardId,
    door: DoorId,
  ) -> Result<bool, Self::Error>;

  /// Append an event to the outbox read by the device layer.
  fn push_sync(&mut self, event: SyncEvent) -> Result<(), Self::Error>;
}

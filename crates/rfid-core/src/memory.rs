//! An in-memory arena implementation of the entity graph.
//!
//! Entities live in `BTreeMap`s keyed by their handles; the many-to-many
//! edges (memberships, grants, relations) are keyed by the pair they join.
//! One counter hands out every handle, so creation order is total.
//!
//! Writes made through [`MemoryGraph::mutator`] are applied immediately and
//! stay in place if a later step of the same mutation fails. Use
//! [`MemoryGraph::transact`] for all-or-nothing semantics.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::{
  Error, Result,
  graph::{AccessGraph, GraphMut},
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
  mutate::Mutator,
  reconcile::Changes,
};

#[derive(Debug, Clone, Default)]
pub struct MemoryGraph {
  last_id:        i64,
  employees:      BTreeMap<EmployeeId, Employee>,
  contacts:       BTreeMap<ContactId, Contact>,
  departments:    BTreeMap<DepartmentId, Department>,
  card_types:     BTreeMap<CardTypeId, CardType>,
  cards:          BTreeMap<CardId, Card>,
  card_numbers:   BTreeMap<CardNumber, CardId>,
  webstacks:      BTreeMap<WebstackId, Webstack>,
  controllers:    BTreeMap<ControllerId, Controller>,
  doors:          BTreeMap<DoorId, Door>,
  time_schedules: BTreeMap<TimeScheduleId, TimeSchedule>,
  access_groups:  BTreeMap<AccessGroupId, AccessGroup>,
  memberships:    BTreeMap<(OwnerRef, AccessGroupId), Option<DateTime<Utc>>>,
  grants:         BTreeMap<(AccessGroupId, DoorId), TimeScheduleId>,
  relations:      BTreeMap<(CardId, DoorId), TimeScheduleId>,
  outbox:         Vec<SyncEvent>,
}

impl MemoryGraph {
  pub fn new() -> Self { Self::default() }

  /// A mutator evaluating memberships as of now.
  pub fn mutator(&mut self) -> Mutator<'_, Self> { Mutator::new(self, Utc::now()) }

  /// Run `f` against a mutator evaluating memberships as of `now`. If `f`
  /// fails the graph is restored to its state before the call.
  pub fn transact<T>(
    &mut self,
    now: DateTime<Utc>,
    f: impl FnOnce(&mut Mutator<'_, Self>) -> Result<T>,
  ) -> Result<(T, Changes)> {
    let snapshot = self.clone();
    let result = {
      let mut m = Mutator::new(self, now);
      f(&mut m).map(|out| (out, m.finish()))
    };
    if result.is_err() {
      *self = snapshot;
    }
    result
  }

  /// Every persisted relation, ordered by (card, door).
  pub fn relations(&self) -> Vec<CardDoorRelation> {
    self
      .relations
      .iter()
      .map(|(&(card, door), &schedule)| CardDoorRelation { card, door, schedule })
      .collect()
  }

  /// Remove and return the pending sync events, oldest first.
  pub fn take_sync_events(&mut self) -> Vec<SyncEvent> {
    std::mem::take(&mut self.outbox)
  }

  fn next_id(&mut self) -> i64 {
    self.last_id += 1;
    self.last_id
  }
}

fn missing<T>(kind: &'static str, id: i64) -> Result<T> {
  Err(Error::not_found(kind, id))
}

// ─── Reads ───────────────────────────────────────────────────────────────────

impl AccessGraph for MemoryGraph {
  type Error = Error;

  fn employee(&self, id: EmployeeId) -> Result<Option<Employee>> {
    Ok(self.employees.get(&id).cloned())
  }

  fn contact(&self, id: ContactId) -> Result<Option<Contact>> {
    Ok(self.contacts.get(&id).cloned())
  }

  fn department(&self, id: DepartmentId) -> Result<Option<Department>> {
    Ok(self.departments.get(&id).cloned())
  }

  fn employees_of_department(&self, id: DepartmentId) -> Result<Vec<Employee>> {
    Ok(
      self
        .employees
        .values()
        .filter(|e| e.department == Some(id))
        .cloned()
        .collect(),
    )
  }

  fn card(&self, id: CardId) -> Result<Option<Card>> {
    Ok(self.cards.get(&id).cloned())
  }

  fn card_by_number(&self, number: &CardNumber) -> Result<Option<Card>> {
    Ok(
      self
        .card_numbers
        .get(number)
        .and_then(|id| self.cards.get(id))
        .cloned(),
    )
  }

  fn cards_of_owner(&self, owner: OwnerRef) -> Result<Vec<Card>> {
    Ok(
      self
        .cards
        .values()
        .filter(|c| c.owner() == Some(owner))
        .cloned()
        .collect(),
    )
  }

  fn card_type(&self, id: CardTypeId) -> Result<Option<CardType>> {
    Ok(self.card_types.get(&id).cloned())
  }

  fn access_group(&self, id: AccessGroupId) -> Result<Option<AccessGroup>> {
    Ok(self.access_groups.get(&id).cloned())
  }

  fn memberships_of_owner(&self, owner: OwnerRef) -> Result<Vec<Membership>> {
    Ok(
      self
        .memberships
        .iter()
        .filter(|((o, _), _)| *o == owner)
        .map(|(&(owner, group), &expiration)| Membership { owner, group, expiration })
        .collect(),
    )
  }

  fn members_of_group(&self, group: AccessGroupId) -> Result<Vec<Membership>> {
    Ok(
      self
        .memberships
        .iter()
        .filter(|((_, g), _)| *g == group)
        .map(|(&(owner, group), &expiration)| Membership { owner, group, expiration })
        .collect(),
    )
  }

  fn expired_memberships(&self, now: DateTime<Utc>) -> Result<Vec<Membership>> {
    Ok(
      self
        .memberships
        .iter()
        .map(|(&(owner, group), &expiration)| Membership { owner, group, expiration })
        .filter(|m| !m.is_active_at(now))
        .collect(),
    )
  }

  fn grants_of_group(&self, group: AccessGroupId) -> Result<Vec<DoorGrant>> {
    Ok(
      self
        .grants
        .range((group, DoorId(i64::MIN))..=(group, DoorId(i64::MAX)))
        .map(|(&(_, door), &schedule)| DoorGrant { door, schedule })
        .collect(),
    )
  }

  fn grants_of_door(
    &self,
    door: DoorId,
  ) -> Result<Vec<(AccessGroupId, TimeScheduleId)>> {
    Ok(
      self
        .grants
        .iter()
        .filter(|((_, d), _)| *d == door)
        .map(|(&(group, _), &schedule)| (group, schedule))
        .collect(),
    )
  }

  fn time_schedule(&self, id: TimeScheduleId) -> Result<Option<TimeSchedule>> {
    Ok(self.time_schedules.get(&id).cloned())
  }

  fn webstack(&self, id: WebstackId) -> Result<Option<Webstack>> {
    Ok(self.webstacks.get(&id).cloned())
  }

  fn controller(&self, id: ControllerId) -> Result<Option<Controller>> {
    Ok(self.controllers.get(&id).cloned())
  }

  fn door(&self, id: DoorId) -> Result<Option<Door>> {
    Ok(self.doors.get(&id).cloned())
  }

  fn doors_of_controller(&self, id: ControllerId) -> Result<Vec<Door>> {
    Ok(
      self
        .doors
        .values()
        .filter(|d| d.controller == id)
        .cloned()
        .collect(),
    )
  }

  fn relation(
    &self,
    card: CardId,
    door: DoorId,
  ) -> Result<Option<CardDoorRelation>> {
    Ok(
      self
        .relations
        .get(&(card, door))
        .map(|&schedule| CardDoorRelation { card, door, schedule }),
    )
  }

  fn relations_of_card(&self, card: CardId) -> Result<Vec<CardDoorRelation>> {
    Ok(
      self
        .relations
        .range((card, DoorId(i64::MIN))..=(card, DoorId(i64::MAX)))
        .map(|(&(card, door), &schedule)| CardDoorRelation { card, door, schedule })
        .collect(),
    )
  }

  fn relations_of_door(&self, door: DoorId) -> Result<Vec<CardDoorRelation>> {
    Ok(
      self
        .relations
        .iter()
        .filter(|((_, d), _)| *d == door)
        .map(|(&(card, door), &schedule)| CardDoorRelation { card, door, schedule })
        .collect(),
    )
  }
}

// ─── Writes ──────────────────────────────────────────────────────────────────

impl GraphMut for MemoryGraph {
  fn insert_employee(&mut self, new: NewEmployee) -> Result<Employee> {
    let employee = Employee {
      id:         EmployeeId(self.next_id()),
      name:       new.name,
      department: new.department,
    };
    self.employees.insert(employee.id, employee.clone());
    Ok(employee)
  }

  fn set_employee_department(
    &mut self,
    id: EmployeeId,
    department: Option<DepartmentId>,
  ) -> Result<()> {
    match self.employees.get_mut(&id) {
      Some(e) => {
        e.department = department;
        Ok(())
      }
      None => missing(EmployeeId::KIND, id.0),
    }
  }

  fn delete_employee(&mut self, id: EmployeeId) -> Result<()> {
    self.employees.remove(&id);
    Ok(())
  }

  fn insert_contact(&mut self, name: String) -> Result<Contact> {
    let contact = Contact { id: ContactId(self.next_id()), name };
    self.contacts.insert(contact.id, contact.clone());
    Ok(contact)
  }

  fn delete_contact(&mut self, id: ContactId) -> Result<()> {
    self.contacts.remove(&id);
    Ok(())
  }

  fn insert_department(&mut self, new: NewDepartment) -> Result<Department> {
    let mut allowed_groups = new.allowed_groups;
    allowed_groups.sort_unstable();
    allowed_groups.dedup();
    let department = Department {
      id: DepartmentId(self.next_id()),
      name: new.name,
      allowed_groups,
    };
    self.departments.insert(department.id, department.clone());
    Ok(department)
  }

  fn set_department_groups(
    &mut self,
    id: DepartmentId,
    groups: &[AccessGroupId],
  ) -> Result<()> {
    let Some(department) = self.departments.get_mut(&id) else {
      return missing(DepartmentId::KIND, id.0);
    };
    department.allowed_groups = groups.to_vec();
    department.allowed_groups.sort_unstable();
    department.allowed_groups.dedup();
    Ok(())
  }

  fn insert_card_type(&mut self, name: String) -> Result<CardType> {
    let card_type = CardType { id: CardTypeId(self.next_id()), name };
    self.card_types.insert(card_type.id, card_type.clone());
    Ok(card_type)
  }

  fn insert_card(&mut self, fields: CardFields) -> Result<Card> {
    if self.card_numbers.contains_key(&fields.number) {
      return Err(Error::Integrity(format!(
        "UNIQUE constraint failed: cards.number ({})",
        fields.number
      )));
    }
    let card = Card {
      id:         CardId(self.next_id()),
      number:     fields.number,
      employee:   fields.employee,
      contact:    fields.contact,
      active:     fields.active,
      card_type:  fields.card_type,
      cloud_card: fields.cloud_card,
      created_at: Utc::now(),
    };
    self.card_numbers.insert(card.number.clone(), card.id);
    self.cards.insert(card.id, card.clone());
    Ok(card)
  }

  fn update_card(&mut self, card: &Card) -> Result<()> {
    let Some(old) = self.cards.get(&card.id) else {
      return missing(CardId::KIND, card.id.0);
    };
    if old.number != card.number {
      if self.card_numbers.contains_key(&card.number) {
        return Err(Error::Integrity(format!(
          "UNIQUE constraint failed: cards.number ({})",
          card.number
        )));
      }
      self.card_numbers.remove(&old.number);
      self.card_numbers.insert(card.number.clone(), card.id);
    }
    self.cards.insert(card.id, card.clone());
    Ok(())
  }

  fn delete_card(&mut self, id: CardId) -> Result<()> {
    if let Some(card) = self.cards.remove(&id) {
      self.card_numbers.remove(&card.number);
    }
    Ok(())
  }

  fn insert_webstack(&mut self, name: String) -> Result<Webstack> {
    let webstack = Webstack { id: WebstackId(self.next_id()), name };
    self.webstacks.insert(webstack.id, webstack.clone());
    Ok(webstack)
  }

  fn insert_controller(&mut self, new: NewController) -> Result<Controller> {
    let controller = Controller {
      id:          ControllerId(self.next_id()),
      name:        new.name,
      webstack:    new.webstack,
      external_db: new.external_db,
    };
    self.controllers.insert(controller.id, controller.clone());
    Ok(controller)
  }

  fn set_controller_external_db(
    &mut self,
    id: ControllerId,
    external_db: bool,
  ) -> Result<()> {
    match self.controllers.get_mut(&id) {
      Some(c) => {
        c.external_db = external_db;
        Ok(())
      }
      None => missing(ControllerId::KIND, id.0),
    }
  }

  fn insert_door(&mut self, new: NewDoor) -> Result<Door> {
    let door = Door {
      id:         DoorId(self.next_id()),
      name:       new.name,
      controller: new.controller,
      card_type:  new.card_type,
    };
    self.doors.insert(door.id, door.clone());
    Ok(door)
  }

  fn set_door_card_type(
    &mut self,
    id: DoorId,
    filter: CardTypeFilter,
  ) -> Result<()> {
    match self.doors.get_mut(&id) {
      Some(d) => {
        d.card_type = filter;
        Ok(())
      }
      None => missing(DoorId::KIND, id.0),
    }
  }

  fn delete_door(&mut self, id: DoorId) -> Result<()> {
    self.doors.remove(&id);
    Ok(())
  }

  fn insert_time_schedule(&mut self, name: String) -> Result<TimeSchedule> {
    let schedule = TimeSchedule { id: TimeScheduleId(self.next_id()), name };
    self.time_schedules.insert(schedule.id, schedule.clone());
    Ok(schedule)
  }

  fn insert_access_group(&mut self, name: String) -> Result<AccessGroup> {
    let group = AccessGroup {
      id: AccessGroupId(self.next_id()),
      name,
      created_at: Utc::now(),
    };
    self.access_groups.insert(group.id, group.clone());
    Ok(group)
  }

  fn delete_access_group(&mut self, id: AccessGroupId) -> Result<()> {
    self.access_groups.remove(&id);
    for department in self.departments.values_mut() {
      department.allowed_groups.retain(|g| *g != id);
    }
    Ok(())
  }

  fn upsert_grant(&mut self, group: AccessGroupId, grant: DoorGrant) -> Result<()> {
    self.grants.insert((group, grant.door), grant.schedule);
    Ok(())
  }

  fn delete_grant(&mut self, group: AccessGroupId, door: DoorId) -> Result<bool> {
    Ok(self.grants.remove(&(group, door)).is_some())
  }

  fn upsert_membership(&mut self, m: Membership) -> Result<()> {
    self.memberships.insert((m.owner, m.group), m.expiration);
    Ok(())
  }

  fn delete_membership(
    &mut self,
    owner: OwnerRef,
    group: AccessGroupId,
  ) -> Result<bool> {
    Ok(self.memberships.remove(&(owner, group)).is_some())
  }

  fn insert_relation(&mut self, rel: CardDoorRelation) -> Result<()> {
    if self.relations.contains_key(&(rel.card, rel.door)) {
      return Err(Error::Integrity(format!(
        "UNIQUE constraint failed: relation ({}, {})",
        rel.card, rel.door
      )));
    }
    self.relations.insert((rel.card, rel.door), rel.schedule);
    Ok(())
  }

  fn update_relation(&mut self, rel: CardDoorRelation) -> Result<()> {
    match self.relations.get_mut(&(rel.card, rel.door)) {
      Some(schedule) => {
        *schedule = rel.schedule;
        Ok(())
      }
      None => missing("relation", rel.card.0),
    }
  }

  fn delete_relation(&mut self, card: CardId, door: DoorId) -> Result<bool> {
    Ok(self.relations.remove(&(card, door)).is_some())
  }

  fn push_sync(&mut self, event: SyncEvent) -> Result<()> {
    self.outbox.push(event);
    Ok(())
  }
}

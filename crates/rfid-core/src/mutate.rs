//! Mutation triggers: every administrative write, followed synchronously by
//! the reconciliation it requires.
//!
//! A [`Mutator`] borrows one graph handle for its whole lifetime. Backends
//! open a transaction, run one or more mutator calls against it and commit,
//! so the entity write and the relation changes it causes land together.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use tracing::info;

use crate::{
  Error,
  graph::GraphMut,
  id::{
    AccessGroupId, CardId, CardTypeId, ContactId, ControllerId, DepartmentId,
    DoorId, EmployeeId, TimeScheduleId, WebstackId,
  },
  model::{
    AccessGroup, Card, CardFields, CardNumber, CardType, CardTypeFilter,
    CardUpdate, Contact, Controller, Department, Door, DoorGrant, Employee,
    Membership, NewCard, NewController, NewDepartment, NewDoor, NewEmployee,
    OwnerRef, TimeSchedule, Webstack,
  },
  reconcile::{Changes, Reconciler},
};

pub struct Mutator<'g, G: GraphMut> {
  rec: Reconciler<'g, G>,
}

impl<'g, G: GraphMut> Mutator<'g, G> {
  pub fn new(graph: &'g mut G, now: DateTime<Utc>) -> Self {
    Self { rec: Reconciler::new(graph, now) }
  }

  pub fn graph(&self) -> &G { self.rec.graph() }

  /// Direct access to the reconciler, for explicit relevance checks.
  pub fn reconciler(&mut self) -> &mut Reconciler<'g, G> { &mut self.rec }

  /// The relation changes made so far.
  pub fn finish(self) -> Changes { self.rec.finish() }

  // ─── Plain entities ────────────────────────────────────────────────────────

  pub fn create_employee(
    &mut self,
    new: NewEmployee,
  ) -> Result<Employee, G::Error> {
    if let Some(department) = new.department {
      self.graph().require_department(department)?;
    }
    self.rec.graph_mut().insert_employee(new)
  }

  pub fn create_contact(&mut self, name: String) -> Result<Contact, G::Error> {
    self.rec.graph_mut().insert_contact(name)
  }

  pub fn create_department(
    &mut self,
    new: NewDepartment,
  ) -> Result<Department, G::Error> {
    for group in &new.allowed_groups {
      self.graph().require_access_group(*group)?;
    }
    self.rec.graph_mut().insert_department(new)
  }

  pub fn create_card_type(&mut self, name: String) -> Result<CardType, G::Error> {
    self.rec.graph_mut().insert_card_type(name)
  }

  pub fn create_webstack(&mut self, name: String) -> Result<Webstack, G::Error> {
    self.rec.graph_mut().insert_webstack(name)
  }

  pub fn create_controller(
    &mut self,
    new: NewController,
  ) -> Result<Controller, G::Error> {
    self.require_webstack(new.webstack)?;
    self.rec.graph_mut().insert_controller(new)
  }

  pub fn create_door(&mut self, new: NewDoor) -> Result<Door, G::Error> {
    self.graph().require_controller(new.controller)?;
    if let CardTypeFilter::Only(t) = new.card_type {
      self.require_card_type(t)?;
    }
    self.rec.graph_mut().insert_door(new)
  }

  pub fn create_time_schedule(
    &mut self,
    name: String,
  ) -> Result<TimeSchedule, G::Error> {
    self.rec.graph_mut().insert_time_schedule(name)
  }

  pub fn create_access_group(
    &mut self,
    name: String,
  ) -> Result<AccessGroup, G::Error> {
    self.rec.graph_mut().insert_access_group(name)
  }

  // ─── Cards ─────────────────────────────────────────────────────────────────

  /// Validate and store a card, then grant it everything its owner reaches.
  pub fn create_card(&mut self, new: NewCard) -> Result<Card, G::Error> {
    let number = CardNumber::parse(&new.number)?;
    let owner = match (new.employee, new.contact) {
      (Some(_), Some(_)) => return Err(Error::ConflictingOwners.into()),
      (None, None) => return Err(Error::MissingOwner.into()),
      (Some(e), None) => OwnerRef::Employee(e),
      (None, Some(c)) => OwnerRef::Contact(c),
    };
    self.graph().require_owner(owner)?;
    self.require_card_type(new.card_type)?;
    if self.graph().card_by_number(&number)?.is_some() {
      return Err(Error::DuplicateCardNumber(number).into());
    }

    let card = self.rec.graph_mut().insert_card(CardFields {
      number,
      employee: new.employee,
      contact: new.contact,
      active: new.active,
      card_type: new.card_type,
      cloud_card: new.cloud_card,
    })?;
    info!(card = %card.id, owner = %owner, "card created");

    self.rec.update_card_rels(card.id)?;
    Ok(card)
  }

  /// Apply a partial write to a card and reconcile what it affects.
  ///
  /// Assigning an owner of the other kind requires clearing the current one
  /// in the same update.
  pub fn update_card(
    &mut self,
    id: CardId,
    update: CardUpdate,
  ) -> Result<Card, G::Error> {
    let old = self.graph().require_card(id)?;
    let mut card = old.clone();

    match (update.employee, update.contact) {
      (Some(Some(_)), Some(Some(_))) => {
        return Err(Error::ConflictingOwners.into());
      }
      (Some(Some(_)), None) if old.contact.is_some() => {
        return Err(Error::OwnerNotCleared("contact").into());
      }
      (None, Some(Some(_))) if old.employee.is_some() => {
        return Err(Error::OwnerNotCleared("employee").into());
      }
      _ => {}
    }
    if let Some(employee) = update.employee {
      card.employee = employee;
    }
    if let Some(contact) = update.contact {
      card.contact = contact;
    }
    let owner = card.owner().ok_or(Error::MissingOwner)?;

    if let Some(number) = update.number {
      let number = CardNumber::parse(&number)?;
      if number != card.number {
        if self.graph().card_by_number(&number)?.is_some() {
          return Err(Error::DuplicateCardNumber(number).into());
        }
        card.number = number;
      }
    }
    if let Some(active) = update.active {
      card.active = active;
    }
    if let Some(card_type) = update.card_type {
      self.require_card_type(card_type)?;
      card.card_type = card_type;
    }
    if let Some(cloud_card) = update.cloud_card {
      card.cloud_card = cloud_card;
    }

    if card == old {
      return Ok(card);
    }

    let owner_changed = old.owner() != Some(owner);
    if owner_changed {
      self.graph().require_owner(owner)?;
      // Revokes must still carry the number the device knows.
      self.rec.invalidate_card(id)?;
    }

    self.rec.graph_mut().update_card(&card)?;

    if card.number != old.number {
      self.rec.renumber_card(&card, &old.number)?;
    }

    let access_changed = owner_changed
      || card.active != old.active
      || card.card_type != old.card_type
      || card.cloud_card != old.cloud_card;
    if access_changed {
      self.rec.update_card_rels(id)?;
    }

    info!(card = %id, owner_changed, access_changed, "card updated");
    Ok(card)
  }

  pub fn delete_card(&mut self, id: CardId) -> Result<(), G::Error> {
    self.rec.invalidate_card(id)?;
    self.rec.graph_mut().delete_card(id)?;
    info!(card = %id, "card deleted");
    Ok(())
  }

  // ─── Memberships ───────────────────────────────────────────────────────────

  /// Add `owner` to `group`, or move the expiration of an existing
  /// membership.
  pub fn add_membership(
    &mut self,
    owner: OwnerRef,
    group: AccessGroupId,
    expiration: Option<DateTime<Utc>>,
  ) -> Result<(), G::Error> {
    self.graph().require_owner(owner)?;
    self.graph().require_access_group(group)?;

    if let OwnerRef::Employee(employee) = owner {
      let emp = self.graph().require_employee(employee)?;
      if let Some(department) = emp.department {
        let department = self.graph().require_department(department)?;
        if !department.allows(group) {
          return Err(Error::GroupNotAllowed { employee, group }.into());
        }
      }
    }

    self
      .rec
      .graph_mut()
      .upsert_membership(Membership { owner, group, expiration })?;
    info!(%owner, %group, ?expiration, "membership added");
    self.recheck_owner_in_group(owner, group)
  }

  /// Remove `owner` from `group`. Returns `false` (and changes nothing) if it
  /// was not a member.
  pub fn remove_membership(
    &mut self,
    owner: OwnerRef,
    group: AccessGroupId,
  ) -> Result<bool, G::Error> {
    if !self.rec.graph_mut().delete_membership(owner, group)? {
      return Ok(false);
    }
    info!(%owner, %group, "membership removed");
    self.recheck_owner_in_group(owner, group)?;
    Ok(true)
  }

  /// Delete every membership that is no longer active and revoke what it
  /// granted. Returns the number of memberships removed.
  pub fn expire_memberships(&mut self) -> Result<usize, G::Error> {
    let expired = self.graph().expired_memberships(self.rec.now())?;
    for m in &expired {
      self.rec.graph_mut().delete_membership(m.owner, m.group)?;
    }
    for m in &expired {
      self.recheck_owner_in_group(m.owner, m.group)?;
    }
    if !expired.is_empty() {
      info!(expired = expired.len(), "expired memberships removed");
    }
    Ok(expired.len())
  }

  /// Move an employee to another department, dropping memberships the new
  /// department does not allow. Leaving every department keeps them all.
  pub fn set_employee_department(
    &mut self,
    employee: EmployeeId,
    department: Option<DepartmentId>,
  ) -> Result<(), G::Error> {
    self.graph().require_employee(employee)?;
    let owner = OwnerRef::Employee(employee);

    if let Some(department) = department {
      let department = self.graph().require_department(department)?;
      self.prune_memberships(owner, &department)?;
    }
    self
      .rec
      .graph_mut()
      .set_employee_department(employee, department)?;

    for card in self.graph().cards_of_owner(owner)? {
      self.rec.update_card_rels(card.id)?;
    }
    Ok(())
  }

  /// Replace a department's allow-list and prune its employees accordingly.
  pub fn set_department_groups(
    &mut self,
    department: DepartmentId,
    groups: Vec<AccessGroupId>,
  ) -> Result<(), G::Error> {
    self.graph().require_department(department)?;
    for group in &groups {
      self.graph().require_access_group(*group)?;
    }
    self
      .rec
      .graph_mut()
      .set_department_groups(department, &groups)?;

    let department = self.graph().require_department(department)?;
    for employee in self.graph().employees_of_department(department.id)? {
      let owner = OwnerRef::Employee(employee.id);
      if self.prune_memberships(owner, &department)? > 0 {
        for card in self.graph().cards_of_owner(owner)? {
          self.rec.update_card_rels(card.id)?;
        }
      }
    }
    Ok(())
  }

  /// Drop memberships of `owner` outside the department's allow-list.
  fn prune_memberships(
    &mut self,
    owner: OwnerRef,
    department: &Department,
  ) -> Result<usize, G::Error> {
    let mut pruned = 0;
    for m in self.graph().memberships_of_owner(owner)? {
      if !department.allows(m.group) {
        self.rec.graph_mut().delete_membership(owner, m.group)?;
        pruned += 1;
      }
    }
    if pruned > 0 {
      info!(%owner, department = %department.id, pruned, "memberships pruned");
    }
    Ok(pruned)
  }

  fn recheck_owner_in_group(
    &mut self,
    owner: OwnerRef,
    group: AccessGroupId,
  ) -> Result<(), G::Error> {
    let cards = self.graph().cards_of_owner(owner)?;
    let grants = self.graph().grants_of_group(group)?;
    for card in &cards {
      for grant in &grants {
        self.rec.check_relevance_fast(card.id, grant.door, None)?;
      }
    }
    Ok(())
  }

  // ─── Access group doors ────────────────────────────────────────────────────

  /// Grant `door` to `group` under `schedule`, replacing any previous
  /// schedule for that door.
  pub fn add_group_door(
    &mut self,
    group: AccessGroupId,
    door: DoorId,
    schedule: TimeScheduleId,
  ) -> Result<(), G::Error> {
    self.graph().require_access_group(group)?;
    self.graph().require_door(door)?;
    self.require_time_schedule(schedule)?;

    self
      .rec
      .graph_mut()
      .upsert_grant(group, DoorGrant { door, schedule })?;
    info!(%group, %door, %schedule, "door granted to group");
    self.recheck_group_door(group, door)
  }

  pub fn remove_group_door(
    &mut self,
    group: AccessGroupId,
    door: DoorId,
  ) -> Result<bool, G::Error> {
    if !self.rec.graph_mut().delete_grant(group, door)? {
      return Ok(false);
    }
    info!(%group, %door, "door removed from group");
    self.recheck_group_door(group, door)?;
    Ok(true)
  }

  fn recheck_group_door(
    &mut self,
    group: AccessGroupId,
    door: DoorId,
  ) -> Result<(), G::Error> {
    for m in self.graph().members_of_group(group)? {
      for card in self.graph().cards_of_owner(m.owner)? {
        self.rec.check_relevance_fast(card.id, door, None)?;
      }
    }
    Ok(())
  }

  /// Delete a group with its memberships and grants, then re-check every
  /// (card, door) pair the group used to reach.
  pub fn delete_access_group(
    &mut self,
    group: AccessGroupId,
  ) -> Result<(), G::Error> {
    self.graph().require_access_group(group)?;
    let members = self.graph().members_of_group(group)?;
    let grants = self.graph().grants_of_group(group)?;

    let mut pairs: BTreeSet<(CardId, DoorId)> = BTreeSet::new();
    for m in &members {
      for card in self.graph().cards_of_owner(m.owner)? {
        pairs.extend(grants.iter().map(|g| (card.id, g.door)));
      }
    }

    let graph = self.rec.graph_mut();
    for m in &members {
      graph.delete_membership(m.owner, group)?;
    }
    for g in &grants {
      graph.delete_grant(group, g.door)?;
    }
    graph.delete_access_group(group)?;
    info!(%group, affected = pairs.len(), "access group deleted");

    for (card, door) in pairs {
      self.rec.check_relevance_fast(card, door, None)?;
    }
    Ok(())
  }

  // ─── Hardware ──────────────────────────────────────────────────────────────

  pub fn set_door_card_type(
    &mut self,
    door: DoorId,
    filter: CardTypeFilter,
  ) -> Result<(), G::Error> {
    self.graph().require_door(door)?;
    if let CardTypeFilter::Only(t) = filter {
      self.require_card_type(t)?;
    }
    self.rec.graph_mut().set_door_card_type(door, filter)?;
    self.rec.update_door_rels(door)
  }

  pub fn set_controller_external_db(
    &mut self,
    controller: ControllerId,
    external_db: bool,
  ) -> Result<(), G::Error> {
    let current = self.graph().require_controller(controller)?;
    if current.external_db == external_db {
      return Ok(());
    }
    self
      .rec
      .graph_mut()
      .set_controller_external_db(controller, external_db)?;
    info!(%controller, external_db, "controller sync mode changed");
    self.rec.reload_controller(controller)
  }

  /// Recompute the relations of every door on a controller.
  pub fn reload_controller_cards(
    &mut self,
    controller: ControllerId,
  ) -> Result<(), G::Error> {
    self.rec.reload_controller(controller)
  }

  pub fn delete_door(&mut self, door: DoorId) -> Result<(), G::Error> {
    self.graph().require_door(door)?;
    self.rec.invalidate_door(door)?;

    let grants = self.graph().grants_of_door(door)?;
    let graph = self.rec.graph_mut();
    for (group, _) in grants {
      graph.delete_grant(group, door)?;
    }
    graph.delete_door(door)?;
    info!(%door, "door deleted");
    Ok(())
  }

  // ─── Owner deletion ────────────────────────────────────────────────────────

  pub fn delete_employee(&mut self, id: EmployeeId) -> Result<(), G::Error> {
    self.graph().require_employee(id)?;
    self.delete_owner_dependents(OwnerRef::Employee(id))?;
    self.rec.graph_mut().delete_employee(id)
  }

  pub fn delete_contact(&mut self, id: ContactId) -> Result<(), G::Error> {
    self.graph().require_owner(OwnerRef::Contact(id))?;
    self.delete_owner_dependents(OwnerRef::Contact(id))?;
    self.rec.graph_mut().delete_contact(id)
  }

  fn delete_owner_dependents(&mut self, owner: OwnerRef) -> Result<(), G::Error> {
    for card in self.graph().cards_of_owner(owner)? {
      self.delete_card(card.id)?;
    }
    for m in self.graph().memberships_of_owner(owner)? {
      self.rec.graph_mut().delete_membership(owner, m.group)?;
    }
    Ok(())
  }

  // ─── Lookups ───────────────────────────────────────────────────────────────

  fn require_card_type(&self, id: CardTypeId) -> Result<CardType, G::Error> {
    self
      .graph()
      .card_type(id)?
      .ok_or_else(|| Error::not_found(CardTypeId::KIND, id.0).into())
  }

  fn require_time_schedule(
    &self,
    id: TimeScheduleId,
  ) -> Result<TimeSchedule, G::Error> {
    self
      .graph()
      .time_schedule(id)?
      .ok_or_else(|| Error::not_found(TimeScheduleId::KIND, id.0).into())
  }

  fn require_webstack(&self, id: WebstackId) -> Result<Webstack, G::Error> {
    self
      .graph()
      .webstack(id)?
      .ok_or_else(|| Error::not_found(WebstackId::KIND, id.0).into())
  }
}

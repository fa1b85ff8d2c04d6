//! [`SqliteStore`]: the SQLite implementation of [`AccessStore`].

use std::path::Path;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use rfid_core::{
  graph::AccessGraph,
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
  mutate::Mutator,
  reconcile::Changes,
  resolver::{self, PotentialCard, PotentialDoor},
  store::AccessStore,
};

use crate::{Error, Result, graph::SqliteGraph, schema::SCHEMA};

// ─── Store ───────────────────────────────────────────────────────────────────

/// An access store backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted. All calls are
/// serialised on the connection's thread, so two reconciliations never
/// interleave.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let path = path.as_ref().to_owned();
    let conn = tokio_rusqlite::Connection::open(&path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    info!(path = %path.display(), "sqlite store opened");
    Ok(store)
  }

  /// Open an in-memory store; useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Run `f` against a [`Mutator`] inside one transaction, committing only if
  /// it succeeds. Memberships are evaluated as of the call.
  pub(crate) async fn mutate<T, F>(&self, f: F) -> Result<(T, Changes)>
  where
    T: Send + 'static,
    F: FnOnce(&mut Mutator<'_, SqliteGraph<'_>>) -> Result<T> + Send + 'static,
  {
    self.mutate_at(Utc::now(), f).await
  }

  /// [`Self::mutate`] with memberships evaluated as of `now`.
  pub(crate) async fn mutate_at<T, F>(
    &self,
    now: DateTime<Utc>,
    f: F,
  ) -> Result<(T, Changes)>
  where
    T: Send + 'static,
    F: FnOnce(&mut Mutator<'_, SqliteGraph<'_>>) -> Result<T> + Send + 'static,
  {
    let (out, changes) = self
      .conn
      .call(move |conn| Ok(run_mutation(conn, now, f)))
      .await??;
    if !changes.is_empty() {
      debug!(
        created = changes.created(),
        updated = changes.updated(),
        deleted = changes.deleted(),
        "relations committed"
      );
    }
    Ok((out, changes))
  }

  /// Like [`Self::mutate`] for callers that only care about the relation
  /// changes.
  async fn reconcile<F>(&self, f: F) -> Result<Changes>
  where
    F: FnOnce(&mut Mutator<'_, SqliteGraph<'_>>) -> Result<()> + Send + 'static,
  {
    Ok(self.mutate(f).await?.1)
  }

  /// Run a read-only query against the graph.
  pub(crate) async fn read<T, F>(&self, f: F) -> Result<T>
  where
    T: Send + 'static,
    F: FnOnce(&SqliteGraph<'_>) -> Result<T> + Send + 'static,
  {
    Ok(
      self
        .conn
        .call(move |conn| Ok(f(&SqliteGraph::new(conn))))
        .await??,
    )
  }
}

fn run_mutation<T, F>(
  conn: &mut rusqlite::Connection,
  now: DateTime<Utc>,
  f: F,
) -> Result<(T, Changes)>
where
  F: FnOnce(&mut Mutator<'_, SqliteGraph<'_>>) -> Result<T>,
{
  let tx = conn.transaction()?;
  let (out, changes) = {
    let mut graph = SqliteGraph::new(&tx);
    let mut mutator = Mutator::new(&mut graph, now);
    let out = f(&mut mutator)?;
    (out, mutator.finish())
  };
  tx.commit()?;
  Ok((out, changes))
}

// ─── AccessStore impl ────────────────────────────────────────────────────────

impl AccessStore for SqliteStore {
  type Error = Error;

  // ── Plain entities ────────────────────────────────────────────────────────

  async fn create_employee(&self, new: NewEmployee) -> Result<Employee> {
    Ok(self.mutate(move |m| m.create_employee(new)).await?.0)
  }

  async fn create_contact(&self, name: String) -> Result<Contact> {
    Ok(self.mutate(move |m| m.create_contact(name)).await?.0)
  }

  async fn create_department(&self, new: NewDepartment) -> Result<Department> {
    Ok(self.mutate(move |m| m.create_department(new)).await?.0)
  }

  async fn create_card_type(&self, name: String) -> Result<CardType> {
    Ok(self.mutate(move |m| m.create_card_type(name)).await?.0)
  }

  async fn create_webstack(&self, name: String) -> Result<Webstack> {
    Ok(self.mutate(move |m| m.create_webstack(name)).await?.0)
  }

  async fn create_controller(&self, new: NewController) -> Result<Controller> {
    Ok(self.mutate(move |m| m.create_controller(new)).await?.0)
  }

  async fn create_door(&self, new: NewDoor) -> Result<Door> {
    Ok(self.mutate(move |m| m.create_door(new)).await?.0)
  }

  async fn create_time_schedule(&self, name: String) -> Result<TimeSchedule> {
    Ok(self.mutate(move |m| m.create_time_schedule(name)).await?.0)
  }

  async fn create_access_group(&self, name: String) -> Result<AccessGroup> {
    Ok(self.mutate(move |m| m.create_access_group(name)).await?.0)
  }

  // ── Cards ─────────────────────────────────────────────────────────────────

  async fn create_card(&self, new: NewCard) -> Result<Card> {
    Ok(self.mutate(move |m| m.create_card(new)).await?.0)
  }

  async fn get_card(&self, id: CardId) -> Result<Option<Card>> {
    self.read(move |g| g.card(id)).await
  }

  async fn update_card(&self, id: CardId, update: CardUpdate) -> Result<Card> {
    Ok(self.mutate(move |m| m.update_card(id, update)).await?.0)
  }

  async fn delete_card(&self, id: CardId) -> Result<Changes> {
    self.reconcile(move |m| m.delete_card(id)).await
  }

  // ── Owners and memberships ────────────────────────────────────────────────

  async fn add_membership(
    &self,
    owner: OwnerRef,
    group: AccessGroupId,
    expiration: Option<DateTime<Utc>>,
  ) -> Result<Changes> {
    self
      .reconcile(move |m| m.add_membership(owner, group, expiration))
      .await
  }

  async fn remove_membership(
    &self,
    owner: OwnerRef,
    group: AccessGroupId,
  ) -> Result<Changes> {
    self
      .reconcile(move |m| m.remove_membership(owner, group).map(drop))
      .await
  }

  async fn expire_memberships(&self) -> Result<Changes> {
    self
      .reconcile(|m| m.expire_memberships().map(drop))
      .await
  }

  async fn set_employee_department(
    &self,
    employee: EmployeeId,
    department: Option<DepartmentId>,
  ) -> Result<Changes> {
    self
      .reconcile(move |m| m.set_employee_department(employee, department))
      .await
  }

  async fn set_department_groups(
    &self,
    department: DepartmentId,
    groups: Vec<AccessGroupId>,
  ) -> Result<Changes> {
    self
      .reconcile(move |m| m.set_department_groups(department, groups))
      .await
  }

  async fn delete_employee(&self, id: EmployeeId) -> Result<Changes> {
    self.reconcile(move |m| m.delete_employee(id)).await
  }

  async fn delete_contact(&self, id: ContactId) -> Result<Changes> {
    self.reconcile(move |m| m.delete_contact(id)).await
  }

  // ── Access group doors ────────────────────────────────────────────────────

  async fn add_group_door(
    &self,
    group: AccessGroupId,
    door: DoorId,
    schedule: TimeScheduleId,
  ) -> Result<Changes> {
    self
      .reconcile(move |m| m.add_group_door(group, door, schedule))
      .await
  }

  async fn remove_group_door(
    &self,
    group: AccessGroupId,
    door: DoorId,
  ) -> Result<Changes> {
    self
      .reconcile(move |m| m.remove_group_door(group, door).map(drop))
      .await
  }

  async fn delete_access_group(&self, group: AccessGroupId) -> Result<Changes> {
    self.reconcile(move |m| m.delete_access_group(group)).await
  }

  // ── Hardware ──────────────────────────────────────────────────────────────

  async fn set_door_card_type(
    &self,
    door: DoorId,
    filter: CardTypeFilter,
  ) -> Result<Changes> {
    self
      .reconcile(move |m| m.set_door_card_type(door, filter))
      .await
  }

  async fn set_controller_external_db(
    &self,
    controller: ControllerId,
    external_db: bool,
  ) -> Result<Changes> {
    self
      .reconcile(move |m| m.set_controller_external_db(controller, external_db))
      .await
  }

  async fn reload_controller_cards(
    &self,
    controller: ControllerId,
  ) -> Result<Changes> {
    self
      .reconcile(move |m| m.reload_controller_cards(controller))
      .await
  }

  async fn delete_door(&self, door: DoorId) -> Result<Changes> {
    self.reconcile(move |m| m.delete_door(door)).await
  }

  // ── Explicit reconciliation ───────────────────────────────────────────────

  async fn check_relevance_fast(
    &self,
    card: CardId,
    door: DoorId,
    schedule: Option<TimeScheduleId>,
  ) -> Result<Changes> {
    self
      .reconcile(move |m| {
        m.reconciler().check_relevance_fast(card, door, schedule)
      })
      .await
  }

  async fn check_relevance_slow(
    &self,
    card: CardId,
    door: DoorId,
  ) -> Result<Changes> {
    self
      .reconcile(move |m| m.reconciler().check_relevance_slow(card, door))
      .await
  }

  async fn update_card_rels(&self, card: CardId) -> Result<Changes> {
    self
      .reconcile(move |m| m.reconciler().update_card_rels(card))
      .await
  }

  async fn update_door_rels(&self, door: DoorId) -> Result<Changes> {
    self
      .reconcile(move |m| m.reconciler().update_door_rels(door))
      .await
  }

  // ── Reads ─────────────────────────────────────────────────────────────────

  async fn relations_of_card(&self, card: CardId) -> Result<Vec<CardDoorRelation>> {
    self
      .read(move |g| {
        g.require_card(card)?;
        g.relations_of_card(card)
      })
      .await
  }

  async fn relations_of_door(&self, door: DoorId) -> Result<Vec<CardDoorRelation>> {
    self
      .read(move |g| {
        g.require_door(door)?;
        g.relations_of_door(door)
      })
      .await
  }

  async fn potential_access_doors(
    &self,
    card: CardId,
    restrict_to: Option<AccessGroupId>,
  ) -> Result<Vec<PotentialDoor>> {
    let now = Utc::now();
    self
      .read(move |g| {
        let card = g.require_card(card)?;
        resolver::potential_access_doors(g, &card, restrict_to, now)
      })
      .await
  }

  async fn potential_access_cards(&self, door: DoorId) -> Result<Vec<PotentialCard>> {
    let now = Utc::now();
    self
      .read(move |g| {
        g.require_door(door)?;
        resolver::potential_access_cards(g, door, now)
      })
      .await
  }

  async fn drain_sync_events(&self) -> Result<Vec<SyncEvent>> {
    let events = self
      .conn
      .call(|conn| Ok(drain_outbox(conn)))
      .await??;
    if !events.is_empty() {
      debug!(count = events.len(), "sync events drained");
    }
    Ok(events)
  }
}

fn drain_outbox(conn: &mut rusqlite::Connection) -> Result<Vec<SyncEvent>> {
  let tx = conn.transaction()?;
  let pending = SqliteGraph::new(&tx).pending_sync_events()?;
  if let Some((last_id, _)) = pending.last() {
    SqliteGraph::new(&tx).clear_sync_events(*last_id)?;
  }
  tx.commit()?;
  Ok(pending.into_iter().map(|(_, event)| event).collect())
}

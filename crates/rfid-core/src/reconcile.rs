//! Relevance reconciliation: keeps the persisted card-door relations equal to
//! what the membership graph justifies.
//!
//! Every entry point is idempotent. Running one twice without an intervening
//! mutation records no changes the second time.
//!
//! Each relation insert and schedule change pushes [`SyncEvent::Grant`], each
//! delete pushes [`SyncEvent::Revoke`]. The device layer consumes those; the
//! reconciler never talks to controllers itself.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, instrument};

use crate::{
  compat::{card_ready, door_compatible, relation_allowed},
  graph::GraphMut,
  id::{CardId, ControllerId, DoorId, TimeScheduleId},
  model::{Card, CardDoorRelation, CardNumber, Controller, SyncEvent},
  resolver::{
    door_schedules, potential_access_cards, potential_access_doors,
    schedule_via_door,
  },
};

// ─── Change log ──────────────────────────────────────────────────────────────

/// One write the reconciler made to the relation set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "change", rename_all = "snake_case")]
pub enum RelationChange {
  Created(CardDoorRelation),
  Updated {
    relation: CardDoorRelation,
    previous: TimeScheduleId,
  },
  Deleted(CardDoorRelation),
}

impl RelationChange {
  pub fn relation(&self) -> CardDoorRelation {
    match *self {
      Self::Created(r) | Self::Deleted(r) => r,
      Self::Updated { relation, .. } => relation,
    }
  }
}

/// Ordered log of the changes made during one reconciliation session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Changes(Vec<RelationChange>);

impl Changes {
  pub fn is_empty(&self) -> bool { self.0.is_empty() }

  pub fn len(&self) -> usize { self.0.len() }

  pub fn iter(&self) -> impl Iterator<Item = &RelationChange> { self.0.iter() }

  pub fn created(&self) -> usize {
    self.count(|c| matches!(c, RelationChange::Created(_)))
  }

  pub fn updated(&self) -> usize {
    self.count(|c| matches!(c, RelationChange::Updated { .. }))
  }

  pub fn deleted(&self) -> usize {
    self.count(|c| matches!(c, RelationChange::Deleted(_)))
  }

  fn count(&self, f: impl Fn(&RelationChange) -> bool) -> usize {
    self.0.iter().filter(|c| f(c)).count()
  }
}

impl IntoIterator for Changes {
  type IntoIter = std::vec::IntoIter<RelationChange>;
  type Item = RelationChange;

  fn into_iter(self) -> Self::IntoIter { self.0.into_iter() }
}

// ─── Reconciler ──────────────────────────────────────────────────────────────

/// Reconciles relations against a graph handle, usually one storage
/// transaction. Memberships are evaluated as of `now`.
pub struct Reconciler<'g, G: GraphMut> {
  graph:   &'g mut G,
  now:     DateTime<Utc>,
  changes: Changes,
}

impl<'g, G: GraphMut> Reconciler<'g, G> {
  pub fn new(graph: &'g mut G, now: DateTime<Utc>) -> Self {
    Self { graph, now, changes: Changes::default() }
  }

  pub fn graph(&self) -> &G { &*self.graph }

  pub fn graph_mut(&mut self) -> &mut G { &mut *self.graph }

  pub fn now(&self) -> DateTime<Utc> { self.now }

  pub fn changes(&self) -> &Changes { &self.changes }

  pub fn finish(self) -> Changes { self.changes }

  /// Re-check a single (card, door) pair.
  ///
  /// With `schedule` given, the caller asserts it is a valid grant and no
  /// graph walk happens. Otherwise the schedule is resolved through the
  /// grants of `door` only.
  #[instrument(level = "debug", skip(self))]
  pub fn check_relevance_fast(
    &mut self,
    card: CardId,
    door: DoorId,
    schedule: Option<TimeScheduleId>,
  ) -> Result<(), G::Error> {
    let card = self.graph.require_card(card)?;
    let door = self.graph.require_door(door)?;
    let controller = self.graph.require_controller(door.controller)?;

    if !relation_allowed(&card, &door, &controller) {
      return self.apply(&card, door.id, None);
    }

    let schedule = match schedule {
      Some(s) => Some(s),
      None => schedule_via_door(&*self.graph, &card, door.id, self.now)?,
    };
    self.apply(&card, door.id, schedule)
  }

  /// Re-check a single (card, door) pair with a full walk of the card's
  /// potential doors.
  #[instrument(level = "debug", skip(self))]
  pub fn check_relevance_slow(
    &mut self,
    card: CardId,
    door: DoorId,
  ) -> Result<(), G::Error> {
    let card = self.graph.require_card(card)?;
    let door = self.graph.require_door(door)?;
    let controller = self.graph.require_controller(door.controller)?;

    if !relation_allowed(&card, &door, &controller) {
      return self.apply(&card, door.id, None);
    }

    let schedule = potential_access_doors(&*self.graph, &card, None, self.now)?
      .into_iter()
      .find(|p| p.door == door.id)
      .map(|p| p.schedule);
    self.apply(&card, door.id, schedule)
  }

  /// Recompute every relation of one card.
  #[instrument(level = "debug", skip(self))]
  pub fn update_card_rels(&mut self, card: CardId) -> Result<(), G::Error> {
    let card = self.graph.require_card(card)?;
    let before = self.changes.len();

    let mut desired = BTreeMap::new();
    if card_ready(&card) {
      let potential =
        potential_access_doors(&*self.graph, &card, None, self.now)?;
      let mut controllers: BTreeMap<ControllerId, Controller> = BTreeMap::new();

      for (door_id, schedule) in door_schedules(&potential) {
        let door = self.graph.require_door(door_id)?;
        if !controllers.contains_key(&door.controller) {
          let c = self.graph.require_controller(door.controller)?;
          controllers.insert(door.controller, c);
        }
        if door_compatible(&card, &door, &controllers[&door.controller]) {
          desired.insert(door_id, schedule);
        }
      }
    }

    for rel in self.graph.relations_of_card(card.id)? {
      if !desired.contains_key(&rel.door) {
        self.apply(&card, rel.door, None)?;
      }
    }
    for (door, schedule) in desired {
      self.apply(&card, door, Some(schedule))?;
    }

    info!(
      card = %card.id,
      changes = self.changes.len() - before,
      "card relations reconciled"
    );
    Ok(())
  }

  /// Recompute every relation of one door.
  #[instrument(level = "debug", skip(self))]
  pub fn update_door_rels(&mut self, door: DoorId) -> Result<(), G::Error> {
    let door = self.graph.require_door(door)?;
    let controller = self.graph.require_controller(door.controller)?;
    let before = self.changes.len();

    let mut desired: BTreeMap<CardId, (Card, TimeScheduleId)> = BTreeMap::new();
    for p in potential_access_cards(&*self.graph, door.id, self.now)? {
      if desired.contains_key(&p.card.id)
        || !relation_allowed(&p.card, &door, &controller)
      {
        continue;
      }
      desired.insert(p.card.id, (p.card, p.schedule));
    }

    for rel in self.graph.relations_of_door(door.id)? {
      if !desired.contains_key(&rel.card) {
        let card = self.graph.require_card(rel.card)?;
        self.apply(&card, door.id, None)?;
      }
    }
    for (card, schedule) in desired.into_values() {
      self.apply(&card, door.id, Some(schedule))?;
    }

    info!(
      door = %door.id,
      changes = self.changes.len() - before,
      "door relations reconciled"
    );
    Ok(())
  }

  /// `update_door_rels` for every door of a controller.
  pub fn reload_controller(
    &mut self,
    controller: ControllerId,
  ) -> Result<(), G::Error> {
    let controller = self.graph.require_controller(controller)?;
    for door in self.graph.doors_of_controller(controller.id)? {
      self.update_door_rels(door.id)?;
    }
    Ok(())
  }

  /// Delete every relation of a card regardless of what the graph says.
  pub fn invalidate_card(&mut self, card: CardId) -> Result<(), G::Error> {
    let card = self.graph.require_card(card)?;
    for rel in self.graph.relations_of_card(card.id)? {
      self.apply(&card, rel.door, None)?;
    }
    Ok(())
  }

  /// Delete every relation of a door regardless of what the graph says.
  pub fn invalidate_door(&mut self, door: DoorId) -> Result<(), G::Error> {
    for rel in self.graph.relations_of_door(door)? {
      let card = self.graph.require_card(rel.card)?;
      self.apply(&card, door, None)?;
    }
    Ok(())
  }

  /// Re-announce a card's relations after its number changed: the device
  /// layer must forget `old_number` and learn the new one. The relations
  /// themselves stay attached to the card.
  pub fn renumber_card(
    &mut self,
    card: &Card,
    old_number: &CardNumber,
  ) -> Result<(), G::Error> {
    for rel in self.graph.relations_of_card(card.id)? {
      self.graph.push_sync(SyncEvent::Revoke {
        card:   card.id,
        number: old_number.clone(),
        door:   rel.door,
      })?;
      self.graph.push_sync(SyncEvent::Grant {
        card:     card.id,
        number:   card.number.clone(),
        door:     rel.door,
        schedule: rel.schedule,
      })?;
    }
    debug!(card = %card.id, old = %old_number, new = %card.number, "card renumbered");
    Ok(())
  }

  /// Move the persisted relation for `(card, door)` to `schedule`, creating
  /// or deleting it as needed.
  fn apply(
    &mut self,
    card: &Card,
    door: DoorId,
    schedule: Option<TimeScheduleId>,
  ) -> Result<(), G::Error> {
    let existing = self.graph.relation(card.id, door)?;

    let change = match (existing, schedule) {
      (None, None) => return Ok(()),
      (Some(rel), Some(s)) if rel.schedule == s => return Ok(()),
      (Some(rel), None) => {
        self.graph.delete_relation(card.id, door)?;
        self.graph.push_sync(SyncEvent::Revoke {
          card:   card.id,
          number: card.number.clone(),
          door,
        })?;
        RelationChange::Deleted(rel)
      }
      (None, Some(schedule)) => {
        let rel = CardDoorRelation { card: card.id, door, schedule };
        self.graph.insert_relation(rel)?;
        self.push_grant(card, rel)?;
        RelationChange::Created(rel)
      }
      (Some(old), Some(schedule)) => {
        let rel = CardDoorRelation { schedule, ..old };
        self.graph.update_relation(rel)?;
        self.push_grant(card, rel)?;
        RelationChange::Updated { relation: rel, previous: old.schedule }
      }
    };

    debug!(
      card = %change.relation().card,
      door = %change.relation().door,
      ?change,
      "relation changed"
    );
    self.changes.0.push(change);
    Ok(())
  }

  fn push_grant(
    &mut self,
    card: &Card,
    rel: CardDoorRelation,
  ) -> Result<(), G::Error> {
    self.graph.push_sync(SyncEvent::Grant {
      card:     card.id,
      number:   card.number.clone(),
      door:     rel.door,
      schedule: rel.schedule,
    })
  }
}

//! Potential access: which (door, schedule) pairs a card could reach, and
//! which cards could reach a door, by walking owner → memberships → grants.
//!
//! Results are ordered newest access group first. When an owner reaches the
//! same door through several groups, the first candidate for that door is
//! the winning one, so the most recently created group decides the schedule.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{
  graph::AccessGraph,
  id::{AccessGroupId, DoorId, TimeScheduleId},
  model::{Card, OwnerRef},
};

/// A door reachable by a card, and the group that grants it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PotentialDoor {
  pub door:     DoorId,
  pub schedule: TimeScheduleId,
  pub group:    AccessGroupId,
}

/// A card that could reach a door, and the group that grants it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PotentialCard {
  pub card:     Card,
  pub schedule: TimeScheduleId,
  pub group:    AccessGroupId,
}

/// Active groups of `owner`, newest first.
fn active_groups<G: AccessGraph + ?Sized>(
  graph: &G,
  owner: OwnerRef,
  now: DateTime<Utc>,
) -> Result<Vec<AccessGroupId>, G::Error> {
  let mut groups: Vec<AccessGroupId> = graph
    .memberships_of_owner(owner)?
    .into_iter()
    .filter(|m| m.is_active_at(now))
    .map(|m| m.group)
    .collect();
  groups.sort_unstable_by(|a, b| b.cmp(a));
  groups.dedup();
  Ok(groups)
}

/// Every (door, schedule) the card's owner reaches through its active
/// memberships, optionally restricted to one access group.
///
/// A card without an owner reaches nothing.
pub fn potential_access_doors<G: AccessGraph + ?Sized>(
  graph: &G,
  card: &Card,
  restrict_to: Option<AccessGroupId>,
  now: DateTime<Utc>,
) -> Result<Vec<PotentialDoor>, G::Error> {
  let Some(owner) = card.owner() else {
    return Ok(Vec::new());
  };

  let mut out = Vec::new();
  for group in active_groups(graph, owner, now)? {
    if restrict_to.is_some_and(|r| r != group) {
      continue;
    }
    let mut seen = BTreeSet::new();
    for grant in graph.grants_of_group(group)? {
      if seen.insert(grant) {
        out.push(PotentialDoor {
          door: grant.door,
          schedule: grant.schedule,
          group,
        });
      }
    }
  }
  Ok(out)
}

/// Every card whose owner is an active member of a group granting `door`.
pub fn potential_access_cards<G: AccessGraph + ?Sized>(
  graph: &G,
  door: DoorId,
  now: DateTime<Utc>,
) -> Result<Vec<PotentialCard>, G::Error> {
  let mut grants = graph.grants_of_door(door)?;
  grants.sort_unstable_by(|a, b| b.0.cmp(&a.0));

  let mut out = Vec::new();
  for (group, schedule) in grants {
    let owners: BTreeSet<OwnerRef> = graph
      .members_of_group(group)?
      .into_iter()
      .filter(|m| m.is_active_at(now))
      .map(|m| m.owner)
      .collect();

    for owner in owners {
      for card in graph.cards_of_owner(owner)? {
        out.push(PotentialCard { card, schedule, group });
      }
    }
  }
  Ok(out)
}

/// The winning schedule per door.
pub fn door_schedules(
  potential: &[PotentialDoor],
) -> BTreeMap<DoorId, TimeScheduleId> {
  let mut out = BTreeMap::new();
  for p in potential {
    out.entry(p.door).or_insert(p.schedule);
  }
  out
}

/// The schedule under which `card` may open `door`, resolved through the
/// by-door grant index instead of walking every group of the owner.
pub fn schedule_via_door<G: AccessGraph + ?Sized>(
  graph: &G,
  card: &Card,
  door: DoorId,
  now: DateTime<Utc>,
) -> Result<Option<TimeScheduleId>, G::Error> {
  let Some(owner) = card.owner() else {
    return Ok(None);
  };
  let active: BTreeSet<AccessGroupId> =
    active_groups(graph, owner, now)?.into_iter().collect();

  Ok(
    graph
      .grants_of_door(door)?
      .into_iter()
      .filter(|(group, _)| active.contains(group))
      .max_by_key(|(group, _)| *group)
      .map(|(_, schedule)| schedule),
  )
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn first_candidate_wins_per_door() {
    let potential = [
      PotentialDoor {
        door:     DoorId(1),
        schedule: TimeScheduleId(20),
        group:    AccessGroupId(9),
      },
      PotentialDoor {
        door:     DoorId(1),
        schedule: TimeScheduleId(10),
        group:    AccessGroupId(2),
      },
      PotentialDoor {
        door:     DoorId(2),
        schedule: TimeScheduleId(10),
        group:    AccessGroupId(2),
      },
    ];
    let map = door_schedules(&potential);
    assert_eq!(map.len(), 2);
    assert_eq!(map[&DoorId(1)], TimeScheduleId(20));
    assert_eq!(map[&DoorId(2)], TimeScheduleId(10));
  }
}

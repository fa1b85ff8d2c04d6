//! Integration tests for `SqliteStore` against an in-memory database.

use chrono::{Duration, Utc};
use rfid_core::{
  Classify, ErrorClass,
  graph::{AccessGraph as _, GraphMut as _},
  id::{AccessGroupId, CardId, CardTypeId, DoorId, TimeScheduleId},
  model::{
    CardFields, CardNumber, CardTypeFilter, CardUpdate, NewCard, NewController,
    NewDepartment, NewDoor, NewEmployee, OwnerRef, SyncEvent,
  },
  store::AccessStore,
};

use crate::{Error, SqliteStore};

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
}

/// One local and one cloud-synced controller with a door each, and one access
/// group per door.
struct Site {
  store:       SqliteStore,
  card_type:   CardTypeId,
  always:      TimeScheduleId,
  nights:      TimeScheduleId,
  local_door:  DoorId,
  cloud_door:  DoorId,
  day_group:   AccessGroupId,
  cloud_group: AccessGroupId,
}

async fn site() -> Site {
  let s = store().await;
  let card_type = s.create_card_type("mifare".into()).await.unwrap().id;
  let always = s.create_time_schedule("always".into()).await.unwrap().id;
  let nights = s.create_time_schedule("nights".into()).await.unwrap().id;
  let ws = s.create_webstack("ws".into()).await.unwrap().id;

  let mut doors = Vec::new();
  for external_db in [false, true] {
    let ctrl = s
      .create_controller(NewController {
        name: format!("ctrl external={external_db}"),
        webstack: ws,
        external_db,
      })
      .await
      .unwrap();
    let door = s
      .create_door(NewDoor {
        name:       format!("door of {}", ctrl.name),
        controller: ctrl.id,
        card_type:  CardTypeFilter::Only(card_type),
      })
      .await
      .unwrap();
    doors.push(door.id);
  }

  let day_group = s.create_access_group("day".into()).await.unwrap().id;
  let cloud_group = s.create_access_group("cloud".into()).await.unwrap().id;
  s.add_group_door(day_group, doors[0], always).await.unwrap();
  s.add_group_door(cloud_group, doors[1], always).await.unwrap();
  s.drain_sync_events().await.unwrap();

  Site {
    store: s,
    card_type,
    always,
    nights,
    local_door: doors[0],
    cloud_door: doors[1],
    day_group,
    cloud_group,
  }
}

impl Site {
  async fn contact_in(&self, groups: &[AccessGroupId]) -> OwnerRef {
    let contact = self.store.create_contact("Greg".into()).await.unwrap();
    let owner = OwnerRef::Contact(contact.id);
    for group in groups {
      self.store.add_membership(owner, *group, None).await.unwrap();
    }
    owner
  }

  async fn card(&self, number: &str, owner: OwnerRef) -> CardId {
    self
      .store
      .create_card(NewCard::new(number, owner, self.card_type))
      .await
      .unwrap()
      .id
  }

  async fn doors_of(&self, card: CardId) -> Vec<(DoorId, TimeScheduleId)> {
    self
      .store
      .relations_of_card(card)
      .await
      .unwrap()
      .into_iter()
      .map(|r| (r.door, r.schedule))
      .collect()
  }
}

// ─── Cards ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn create_card_persists_relations() {
  let site = site().await;
  let owner = site.contact_in(&[site.day_group]).await;
  let card = site.card("0000000001", owner).await;

  assert_eq!(site.doors_of(card).await, vec![(site.local_door, site.always)]);

  let fetched = site.store.get_card(card).await.unwrap().unwrap();
  assert_eq!(fetched.number.as_str(), "0000000001");
  assert_eq!(fetched.owner(), Some(owner));
  assert!(fetched.active);
  assert!(fetched.cloud_card);
}

#[tokio::test]
async fn get_card_missing_returns_none() {
  let s = store().await;
  assert!(s.get_card(CardId(42)).await.unwrap().is_none());
}

#[tokio::test]
async fn validation_errors_classify_as_validation() {
  let site = site().await;
  let owner = site.contact_in(&[]).await;
  site.card("0000000001", owner).await;

  let err = site
    .store
    .create_card(NewCard::new("0000000001", owner, site.card_type))
    .await
    .unwrap_err();
  assert!(matches!(
    err,
    Error::Core(rfid_core::Error::DuplicateCardNumber(_))
  ));
  assert_eq!(err.class(), ErrorClass::Validation);

  let err = site
    .store
    .create_card(NewCard::new("12345", owner, site.card_type))
    .await
    .unwrap_err();
  assert!(err.is_validation());
}

#[tokio::test]
async fn constraint_violations_classify_as_integrity() {
  let site = site().await;
  let owner = site.contact_in(&[]).await;
  site.card("0000000001", owner).await;
  let OwnerRef::Contact(contact) = owner else {
    unreachable!()
  };
  let card_type = site.card_type;

  let err = site
    .store
    .mutate(move |m| {
      m.reconciler().graph_mut().insert_card(CardFields {
        number: CardNumber::parse("0000000001")?,
        employee: None,
        contact: Some(contact),
        active: true,
        card_type,
        cloud_card: true,
      })
    })
    .await
    .unwrap_err();
  assert_eq!(err.class(), ErrorClass::Integrity);
}

#[tokio::test]
async fn failed_mutation_rolls_back() {
  let site = site().await;
  let owner = site.contact_in(&[site.day_group]).await;
  let card_type = site.card_type;

  let err = site
    .store
    .mutate(move |m| {
      m.create_card(NewCard::new("0000000001", owner, card_type))?;
      Err::<(), _>(rfid_core::Error::MissingOwner.into())
    })
    .await
    .unwrap_err();
  assert!(err.is_validation());

  // Neither the card, its relation nor the sync event survived.
  let retry = site.card("0000000001", owner).await;
  assert_eq!(site.doors_of(retry).await.len(), 1);
  let events = site.store.drain_sync_events().await.unwrap();
  assert_eq!(events.len(), 1);
}

#[tokio::test]
async fn update_card_reconciles_and_renumbers() {
  let site = site().await;
  let owner = site.contact_in(&[site.day_group]).await;
  let card = site.card("0000000001", owner).await;
  site.store.drain_sync_events().await.unwrap();

  site
    .store
    .update_card(card, CardUpdate { active: Some(false), ..Default::default() })
    .await
    .unwrap();
  assert!(site.doors_of(card).await.is_empty());

  site
    .store
    .update_card(card, CardUpdate { active: Some(true), ..Default::default() })
    .await
    .unwrap();
  site.store.drain_sync_events().await.unwrap();

  let updated = site
    .store
    .update_card(card, CardUpdate {
      number: Some("0000000009".into()),
      ..Default::default()
    })
    .await
    .unwrap();
  assert_eq!(updated.number.as_str(), "0000000009");
  assert_eq!(site.doors_of(card).await, vec![(site.local_door, site.always)]);

  let events = site.store.drain_sync_events().await.unwrap();
  assert_eq!(events, vec![
    SyncEvent::Revoke {
      card,
      number: CardNumber::parse("0000000001").unwrap(),
      door: site.local_door,
    },
    SyncEvent::Grant {
      card,
      number: CardNumber::parse("0000000009").unwrap(),
      door: site.local_door,
      schedule: site.always,
    },
  ]);
}

#[tokio::test]
async fn cloud_flag_controls_access_to_external_db_doors() {
  let site = site().await;
  let owner = site.contact_in(&[site.cloud_group]).await;
  let card = site.card("0000000001", owner).await;
  assert!(site.doors_of(card).await.is_empty());

  site
    .store
    .update_card(card, CardUpdate { cloud_card: Some(false), ..Default::default() })
    .await
    .unwrap();
  assert_eq!(site.doors_of(card).await, vec![(site.cloud_door, site.always)]);
}

#[tokio::test]
async fn delete_card_revokes_and_removes() {
  let site = site().await;
  let owner = site.contact_in(&[site.day_group]).await;
  let card = site.card("0000000001", owner).await;
  site.store.drain_sync_events().await.unwrap();

  let changes = site.store.delete_card(card).await.unwrap();
  assert_eq!(changes.deleted(), 1);
  assert!(site.store.get_card(card).await.unwrap().is_none());

  let events = site.store.drain_sync_events().await.unwrap();
  assert!(matches!(events.as_slice(), [SyncEvent::Revoke { .. }]));

  let err = site.store.relations_of_card(card).await.unwrap_err();
  assert_eq!(err.class(), ErrorClass::NotFound);
}

// ─── Memberships and groups ──────────────────────────────────────────────────

#[tokio::test]
async fn membership_expiration_round_trips() {
  let site = site().await;
  let owner = site.contact_in(&[]).await;
  let card = site.card("0000000001", owner).await;

  let future = Utc::now() + Duration::days(7);
  let changes = site
    .store
    .add_membership(owner, site.day_group, Some(future))
    .await
    .unwrap();
  assert_eq!(changes.created(), 1);

  let potential = site.store.potential_access_doors(card, None).await.unwrap();
  assert_eq!(potential.len(), 1);
  assert_eq!(potential[0].group, site.day_group);

  let past = Utc::now() - Duration::days(1);
  let changes = site
    .store
    .add_membership(owner, site.day_group, Some(past))
    .await
    .unwrap();
  assert_eq!(changes.deleted(), 1);
  assert!(site.doors_of(card).await.is_empty());
}

#[tokio::test]
async fn expiry_sweep_revokes_after_the_deadline() {
  let site = site().await;
  let owner = site.contact_in(&[]).await;
  let card = site.card("0000000001", owner).await;
  let t0 = Utc::now();

  site
    .store
    .add_membership(owner, site.day_group, Some(t0 + Duration::hours(1)))
    .await
    .unwrap();
  assert_eq!(site.doors_of(card).await, vec![(site.local_door, site.always)]);
  site.store.drain_sync_events().await.unwrap();

  let (expired, changes) = site
    .store
    .mutate_at(t0 + Duration::hours(2), |m| m.expire_memberships())
    .await
    .unwrap();
  assert_eq!(expired, 1);
  assert_eq!(changes.deleted(), 1);
  assert!(site.doors_of(card).await.is_empty());

  let events = site.store.drain_sync_events().await.unwrap();
  assert_eq!(events.len(), 1);
  assert!(matches!(
    &events[0],
    SyncEvent::Revoke { card: c, door, .. } if *c == card && *door == site.local_door
  ));

  let remaining = site
    .store
    .read(move |g| g.memberships_of_owner(owner))
    .await
    .unwrap();
  assert!(remaining.is_empty());
}

#[tokio::test]
async fn expire_memberships_drops_only_lapsed_ones() {
  let site = site().await;
  let owner = site.contact_in(&[site.day_group]).await;
  let card = site.card("0000000001", owner).await;
  site
    .store
    .add_membership(owner, site.cloud_group, Some(Utc::now() - Duration::hours(1)))
    .await
    .unwrap();

  let changes = site.store.expire_memberships().await.unwrap();
  assert!(changes.is_empty());
  assert_eq!(site.doors_of(card).await, vec![(site.local_door, site.always)]);

  let groups: Vec<_> = site
    .store
    .read(move |g| g.memberships_of_owner(owner))
    .await
    .unwrap()
    .into_iter()
    .map(|m| m.group)
    .collect();
  assert_eq!(groups, vec![site.day_group]);
}

#[tokio::test]
async fn remove_missing_membership_is_a_no_op() {
  let site = site().await;
  let owner = site.contact_in(&[]).await;
  let changes = site
    .store
    .remove_membership(owner, site.day_group)
    .await
    .unwrap();
  assert!(changes.is_empty());
}

#[tokio::test]
async fn newest_group_decides_the_schedule() {
  let site = site().await;
  let owner = site.contact_in(&[site.day_group]).await;
  let card = site.card("0000000001", owner).await;

  let night_group = site.store.create_access_group("night".into()).await.unwrap().id;
  site
    .store
    .add_group_door(night_group, site.local_door, site.nights)
    .await
    .unwrap();
  site
    .store
    .add_membership(owner, night_group, None)
    .await
    .unwrap();
  assert_eq!(site.doors_of(card).await, vec![(site.local_door, site.nights)]);

  site.store.update_card_rels(card).await.unwrap();
  site.store.check_relevance_slow(card, site.local_door).await.unwrap();
  assert_eq!(site.doors_of(card).await, vec![(site.local_door, site.nights)]);

  site.store.delete_access_group(night_group).await.unwrap();
  assert_eq!(site.doors_of(card).await, vec![(site.local_door, site.always)]);
}

#[tokio::test]
async fn department_change_prunes_memberships() {
  let site = site().await;
  let open = site
    .store
    .create_department(NewDepartment {
      name:           "open".into(),
      allowed_groups: vec![site.day_group, site.cloud_group],
    })
    .await
    .unwrap();
  let closed = site
    .store
    .create_department(NewDepartment {
      name:           "closed".into(),
      allowed_groups: vec![site.cloud_group],
    })
    .await
    .unwrap();
  let emp = site
    .store
    .create_employee(NewEmployee { name: "Max".into(), department: Some(open.id) })
    .await
    .unwrap();
  let owner = OwnerRef::Employee(emp.id);
  site.store.add_membership(owner, site.day_group, None).await.unwrap();
  let card = site.card("0000000001", owner).await;
  assert_eq!(site.doors_of(card).await.len(), 1);

  let err = site
    .store
    .set_department_groups(closed.id, vec![AccessGroupId(9_999)])
    .await
    .unwrap_err();
  assert_eq!(err.class(), ErrorClass::NotFound);

  site
    .store
    .set_employee_department(emp.id, Some(closed.id))
    .await
    .unwrap();
  assert!(site.doors_of(card).await.is_empty());

  let err = site
    .store
    .add_membership(owner, site.day_group, None)
    .await
    .unwrap_err();
  assert!(matches!(
    err,
    Error::Core(rfid_core::Error::GroupNotAllowed { .. })
  ));
}

// ─── Hardware ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn door_and_controller_changes_reconcile() {
  let site = site().await;
  let owner = site.contact_in(&[site.day_group]).await;
  let card = site.card("0000000001", owner).await;
  let other_type = site.store.create_card_type("em4100".into()).await.unwrap().id;

  let changes = site
    .store
    .set_door_card_type(site.local_door, CardTypeFilter::Only(other_type))
    .await
    .unwrap();
  assert_eq!(changes.deleted(), 1);

  site
    .store
    .set_door_card_type(site.local_door, CardTypeFilter::Any)
    .await
    .unwrap();
  assert_eq!(site.doors_of(card).await.len(), 1);

  let potential = site
    .store
    .potential_access_cards(site.local_door)
    .await
    .unwrap();
  assert_eq!(potential.len(), 1);
  assert_eq!(potential[0].card.id, card);

  let door = site.local_door;
  let controller = site
    .store
    .read(move |g| Ok(g.require_door(door)?.controller))
    .await
    .unwrap();
  let changes = site
    .store
    .set_controller_external_db(controller, true)
    .await
    .unwrap();
  assert_eq!(changes.deleted(), 1);
  let changes = site
    .store
    .reload_controller_cards(controller)
    .await
    .unwrap();
  assert!(changes.is_empty());

  site.store.delete_door(site.local_door).await.unwrap();
  assert!(site.doors_of(card).await.is_empty());
}

#[tokio::test]
async fn explicit_fast_check_with_schedule() {
  let site = site().await;
  let owner = site.contact_in(&[]).await;
  let card = site.card("0000000001", owner).await;

  let changes = site
    .store
    .check_relevance_fast(card, site.local_door, Some(site.nights))
    .await
    .unwrap();
  assert_eq!(changes.created(), 1);

  // Without a schedule the door's grants decide, and the owner has none.
  let changes = site
    .store
    .check_relevance_fast(card, site.local_door, None)
    .await
    .unwrap();
  assert_eq!(changes.deleted(), 1);
  assert!(
    site
      .store
      .relations_of_door(site.local_door)
      .await
      .unwrap()
      .is_empty()
  );
}

#[tokio::test]
async fn deleting_an_owner_cascades() {
  let site = site().await;
  let owner = site.contact_in(&[site.day_group]).await;
  let card = site.card("0000000001", owner).await;
  let OwnerRef::Contact(contact) = owner else {
    unreachable!()
  };

  let changes = site.store.delete_contact(contact).await.unwrap();
  assert_eq!(changes.deleted(), 1);
  assert!(site.store.get_card(card).await.unwrap().is_none());

  let changes = site.store.update_door_rels(site.local_door).await.unwrap();
  assert!(changes.is_empty());
}

// ─── Sync outbox ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn drain_returns_events_once_in_order() {
  let site = site().await;
  let owner = site.contact_in(&[site.day_group]).await;
  let card = site.card("0000000001", owner).await;
  site.store.remove_membership(owner, site.day_group).await.unwrap();

  let events = site.store.drain_sync_events().await.unwrap();
  assert_eq!(events.len(), 2);
  assert!(matches!(events[0], SyncEvent::Grant { card: c, .. } if c == card));
  assert!(matches!(events[1], SyncEvent::Revoke { card: c, .. } if c == card));

  assert!(site.store.drain_sync_events().await.unwrap().is_empty());
}

// ─── Persistence ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn reopened_file_keeps_state() {
  let nanos = Utc::now().timestamp_nanos_opt().unwrap_or_default();
  let path = std::env::temp_dir()
    .join(format!("rfid-store-{}-{nanos}.db", std::process::id()));

  let card = {
    let s = SqliteStore::open(&path).await.unwrap();
    let card_type = s.create_card_type("mifare".into()).await.unwrap().id;
    let contact = s.create_contact("Richard".into()).await.unwrap().id;
    s.create_card(NewCard::new(
      "0000000001",
      OwnerRef::Contact(contact),
      card_type,
    ))
    .await
    .unwrap()
    .id
  };

  let s = SqliteStore::open(&path).await.unwrap();
  let fetched = s.get_card(card).await.unwrap().unwrap();
  assert_eq!(fetched.number.as_str(), "0000000001");
  drop(s);

  for suffix in ["", "-wal", "-shm"] {
    let _ = std::fs::remove_file(format!("{}{suffix}", path.display()));
  }
}

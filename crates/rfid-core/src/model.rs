//! Entity types of the access graph.
//!
//! Owners (employees and contacts) hold cards and access-group memberships;
//! access groups grant doors under time schedules. The only derived entity is
//! [`CardDoorRelation`], which the reconciler alone creates and removes.

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
  Error, Result,
  id::{
    AccessGroupId, CardId, CardTypeId, ContactId, ControllerId, DepartmentId,
    DoorId, EmployeeId, TimeScheduleId, WebstackId,
  },
};

// ─── Card number ─────────────────────────────────────────────────────────────

/// A card's printed number: exactly ten ASCII digits.
#[derive(
  Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(try_from = "String", into = "String")]
pub struct CardNumber(String);

impl CardNumber {
  pub const LEN: usize = 10;

  pub fn parse(s: &str) -> Result<Self> {
    if s.len() == Self::LEN && s.bytes().all(|b| b.is_ascii_digit()) {
      Ok(Self(s.to_owned()))
    } else {
      Err(Error::InvalidCardNumber(s.to_owned()))
    }
  }

  pub fn as_str(&self) -> &str { &self.0 }
}

impl FromStr for CardNumber {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self> { Self::parse(s) }
}

impl TryFrom<String> for CardNumber {
  type Error = Error;

  fn try_from(s: String) -> Result<Self> { Self::parse(&s) }
}

impl From<CardNumber> for String {
  fn from(n: CardNumber) -> Self { n.0 }
}

impl fmt::Display for CardNumber {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

// ─── Owners ──────────────────────────────────────────────────────────────────

/// The holder of cards and access-group memberships.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum OwnerRef {
  Employee(EmployeeId),
  Contact(ContactId),
}

impl fmt::Display for OwnerRef {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Employee(id) => id.fmt(f),
      Self::Contact(id) => id.fmt(f),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Employee {
  pub id:         EmployeeId,
  pub name:       String,
  pub department: Option<DepartmentId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
  pub id:   ContactId,
  pub name: String,
}

/// An organisational unit. Employees of a department may only be members of
/// the access groups on its allow-list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Department {
  pub id:             DepartmentId,
  pub name:           String,
  pub allowed_groups: Vec<AccessGroupId>,
}

impl Department {
  pub fn allows(&self, group: AccessGroupId) -> bool {
    self.allowed_groups.contains(&group)
  }
}

// ─── Cards ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardType {
  pub id:   CardTypeId,
  pub name: String,
}

/// An RFID card. At most one of `employee` / `contact` is set; a card with
/// neither is unreachable and never receives access.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Card {
  pub id:         CardId,
  pub number:     CardNumber,
  pub employee:   Option<EmployeeId>,
  pub contact:    Option<ContactId>,
  pub active:     bool,
  pub card_type:  CardTypeId,
  /// Synced through the cloud registry rather than a door-local list.
  pub cloud_card: bool,
  pub created_at: DateTime<Utc>,
}

impl Card {
  pub fn owner(&self) -> Option<OwnerRef> {
    match (self.employee, self.contact) {
      (Some(e), None) => Some(OwnerRef::Employee(e)),
      (None, Some(c)) => Some(OwnerRef::Contact(c)),
      _ => None,
    }
  }
}

/// Validated column values for a card that is about to be stored.
#[derive(Debug, Clone)]
pub struct CardFields {
  pub number:     CardNumber,
  pub employee:   Option<EmployeeId>,
  pub contact:    Option<ContactId>,
  pub active:     bool,
  pub card_type:  CardTypeId,
  pub cloud_card: bool,
}

/// Input to [`crate::mutate::Mutator::create_card`]. The number is validated
/// by the mutator, not here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewCard {
  pub number:     String,
  #[serde(default)]
  pub employee:   Option<EmployeeId>,
  #[serde(default)]
  pub contact:    Option<ContactId>,
  #[serde(default = "default_true")]
  pub active:     bool,
  pub card_type:  CardTypeId,
  #[serde(default = "default_true")]
  pub cloud_card: bool,
}

impl NewCard {
  /// An active cloud card of `card_type` owned by `owner`.
  pub fn new(number: impl Into<String>, owner: OwnerRef, card_type: CardTypeId) -> Self {
    let (employee, contact) = match owner {
      OwnerRef::Employee(e) => (Some(e), None),
      OwnerRef::Contact(c) => (None, Some(c)),
    };
    Self {
      number: number.into(),
      employee,
      contact,
      active: true,
      card_type,
      cloud_card: true,
    }
  }
}

fn default_true() -> bool { true }

/// A partial write to a card. `None` leaves the field untouched; for the owner
/// columns `Some(None)` clears the column.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CardUpdate {
  #[serde(default)]
  pub number:     Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none", with = "double_option")]
  pub employee:   Option<Option<EmployeeId>>,
  #[serde(default, skip_serializing_if = "Option::is_none", with = "double_option")]
  pub contact:    Option<Option<ContactId>>,
  #[serde(default)]
  pub active:     Option<bool>,
  #[serde(default)]
  pub card_type:  Option<CardTypeId>,
  #[serde(default)]
  pub cloud_card: Option<bool>,
}

/// Distinguishes an absent key from an explicit `null` in JSON.
mod double_option {
  use serde::{Deserialize, Deserializer, Serialize, Serializer};

  pub fn serialize<T: Serialize, S: Serializer>(
    value: &Option<Option<T>>,
    serializer: S,
  ) -> Result<S::Ok, S::Error> {
    match value {
      Some(inner) => inner.serialize(serializer),
      None => serializer.serialize_none(),
    }
  }

  pub fn deserialize<'de, T: Deserialize<'de>, D: Deserializer<'de>>(
    deserializer: D,
  ) -> Result<Option<Option<T>>, D::Error> {
    Option::<T>::deserialize(deserializer).map(Some)
  }
}

// ─── Hardware ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Webstack {
  pub id:   WebstackId,
  pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Controller {
  pub id:          ControllerId,
  pub name:        String,
  pub webstack:    WebstackId,
  /// Card membership is delegated to an external (cloud) database; cloud
  /// cards must not also receive a local relation on this controller's doors.
  pub external_db: bool,
}

/// Which card types a door reader accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", content = "card_type", rename_all = "snake_case")]
pub enum CardTypeFilter {
  #[default]
  Any,
  Only(CardTypeId),
}

impl CardTypeFilter {
  pub fn accepts(self, card_type: CardTypeId) -> bool {
    match self {
      Self::Any => true,
      Self::Only(t) => t == card_type,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Door {
  pub id:         DoorId,
  pub name:       String,
  pub controller: ControllerId,
  pub card_type:  CardTypeFilter,
}

// ─── Access groups ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSchedule {
  pub id:   TimeScheduleId,
  pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessGroup {
  pub id:         AccessGroupId,
  pub name:       String,
  pub created_at: DateTime<Utc>,
}

/// One door assignment of an access group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DoorGrant {
  pub door:     DoorId,
  pub schedule: TimeScheduleId,
}

/// An owner's membership in an access group, optionally time-bounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Membership {
  pub owner:      OwnerRef,
  pub group:      AccessGroupId,
  pub expiration: Option<DateTime<Utc>>,
}

impl Membership {
  pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
    self.expiration.is_none_or(|exp| exp > now)
  }
}

// ─── Derived ─────────────────────────────────────────────────────────────────

/// The materialised fact "this card may open this door under this schedule".
/// At most one exists per (card, door).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CardDoorRelation {
  pub card:     CardId,
  pub door:     DoorId,
  pub schedule: TimeScheduleId,
}

/// Abstract instruction for the device layer, emitted whenever a relation
/// appears, changes schedule, or disappears.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum SyncEvent {
  Grant {
    card:     CardId,
    number:   CardNumber,
    door:     DoorId,
    schedule: TimeScheduleId,
  },
  Revoke {
    card:   CardId,
    number: CardNumber,
    door:   DoorId,
  },
}

// ─── Inputs for simple entities ──────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewEmployee {
  pub name:       String,
  #[serde(default)]
  pub department: Option<DepartmentId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewDepartment {
  pub name:           String,
  #[serde(default)]
  pub allowed_groups: Vec<AccessGroupId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewController {
  pub name:        String,
  pub webstack:    WebstackId,
  #[serde(default)]
  pub external_db: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewDoor {
  pub name:       String,
  pub controller: ControllerId,
  #[serde(default)]
  pub card_type:  CardTypeFilter,
}

#[cfg(test)]
mod tests {
  use chrono::Duration;

  use super::*;

  #[test]
  fn card_number_requires_ten_digits() {
    assert!(CardNumber::parse("0000000001").is_ok());
    assert!(matches!(
      CardNumber::parse("123"),
      Err(Error::InvalidCardNumber(_))
    ));
    assert!(matches!(
      CardNumber::parse("123456789a"),
      Err(Error::InvalidCardNumber(_))
    ));
    assert!(CardNumber::parse("00000000011").is_err());
    assert!(CardNumber::parse("").is_err());
  }

  #[test]
  fn card_number_rejects_non_ascii_digits() {
    // Arabic-Indic digits are numeric but not accepted by readers.
    assert!(CardNumber::parse("٠١٢٣٤٥٦٧٨٩").is_err());
  }

  #[test]
  fn card_number_deserialization_validates() {
    let ok: CardNumber = serde_json::from_str("\"0123456789\"").unwrap();
    assert_eq!(ok.as_str(), "0123456789");
    assert!(serde_json::from_str::<CardNumber>("\"12\"").is_err());
  }

  #[test]
  fn card_owner_requires_exactly_one_column() {
    let mut card = Card {
      id:         CardId(1),
      number:     CardNumber::parse("0000000001").unwrap(),
      employee:   Some(EmployeeId(1)),
      contact:    None,
      active:     true,
      card_type:  CardTypeId(1),
      cloud_card: true,
      created_at: Utc::now(),
    };
    assert_eq!(card.owner(), Some(OwnerRef::Employee(EmployeeId(1))));

    card.contact = Some(ContactId(2));
    assert_eq!(card.owner(), None);

    card.employee = None;
    assert_eq!(card.owner(), Some(OwnerRef::Contact(ContactId(2))));
  }

  #[test]
  fn membership_expiry() {
    let now = Utc::now();
    let m = Membership {
      owner:      OwnerRef::Contact(ContactId(1)),
      group:      AccessGroupId(1),
      expiration: None,
    };
    assert!(m.is_active_at(now));

    let expired = Membership { expiration: Some(now - Duration::hours(1)), ..m };
    assert!(!expired.is_active_at(now));

    let future = Membership { expiration: Some(now + Duration::hours(1)), ..m };
    assert!(future.is_active_at(now));
  }

  #[test]
  fn card_update_distinguishes_null_from_absent() {
    let u: CardUpdate = serde_json::from_str(r#"{"employee": null}"#).unwrap();
    assert_eq!(u.employee, Some(None));
    assert_eq!(u.contact, None);

    let u: CardUpdate = serde_json::from_str(r#"{"contact": 4}"#).unwrap();
    assert_eq!(u.contact, Some(Some(ContactId(4))));
  }

  #[test]
  fn door_filter_any_accepts_everything() {
    assert!(CardTypeFilter::Any.accepts(CardTypeId(9)));
    assert!(CardTypeFilter::Only(CardTypeId(1)).accepts(CardTypeId(1)));
    assert!(!CardTypeFilter::Only(CardTypeId(1)).accepts(CardTypeId(2)));
  }
}

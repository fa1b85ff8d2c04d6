//! Encoding and decoding helpers between domain types and SQLite columns.
//!
//! Handles are stored as plain integers. Timestamps are RFC 3339 strings.
//! Owners are split over an `employee_id` / `contact_id` column pair, and a
//! door's card-type filter is a nullable `card_type_id`.

use chrono::{DateTime, Utc};
use rfid_core::{
  id::{
    AccessGroupId, CardId, CardTypeId, ContactId, ControllerId, DoorId,
    EmployeeId,
  },
  model::{
    AccessGroup, Card, CardNumber, CardTypeFilter, Door, Membership, OwnerRef,
    SyncEvent,
  },
};

use crate::{Error, Result};

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── OwnerRef ────────────────────────────────────────────────────────────────

/// The column holding `owner` and the id to match it against.
pub fn owner_column(owner: OwnerRef) -> (&'static str, i64) {
  match owner {
    OwnerRef::Employee(id) => ("employee_id", id.0),
    OwnerRef::Contact(id) => ("contact_id", id.0),
  }
}

/// `(employee_id, contact_id)` column values for `owner`.
pub fn encode_owner(owner: OwnerRef) -> (Option<i64>, Option<i64>) {
  match owner {
    OwnerRef::Employee(id) => (Some(id.0), None),
    OwnerRef::Contact(id) => (None, Some(id.0)),
  }
}

pub fn decode_owner(employee: Option<i64>, contact: Option<i64>) -> Result<OwnerRef> {
  match (employee, contact) {
    (Some(e), None) => Ok(OwnerRef::Employee(EmployeeId(e))),
    (None, Some(c)) => Ok(OwnerRef::Contact(ContactId(c))),
    other => Err(Error::Decode(format!("membership owner columns {other:?}"))),
  }
}

// ─── CardTypeFilter ──────────────────────────────────────────────────────────

pub fn encode_filter(filter: CardTypeFilter) -> Option<i64> {
  match filter {
    CardTypeFilter::Any => None,
    CardTypeFilter::Only(t) => Some(t.0),
  }
}

pub fn decode_filter(card_type: Option<i64>) -> CardTypeFilter {
  card_type.map_or(CardTypeFilter::Any, |t| CardTypeFilter::Only(CardTypeId(t)))
}

// ─── SyncEvent ───────────────────────────────────────────────────────────────

pub fn encode_sync_action(event: &SyncEvent) -> &'static str {
  match event {
    SyncEvent::Grant { .. } => "grant",
    SyncEvent::Revoke { .. } => "revoke",
  }
}

pub fn encode_sync_event(event: &SyncEvent) -> Result<String> {
  Ok(serde_json::to_string(event)?)
}

pub fn decode_sync_event(s: &str) -> Result<SyncEvent> {
  Ok(serde_json::from_str(s)?)
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Column list matching [`RawCard::from_row`].
pub const CARD_COLUMNS: &str =
  "id, number, employee_id, contact_id, active, card_type_id, cloud_card, created_at";

/// Raw values read directly from a `cards` row.
pub struct RawCard {
  pub id:         i64,
  pub number:     String,
  pub employee:   Option<i64>,
  pub contact:    Option<i64>,
  pub active:     bool,
  pub card_type:  i64,
  pub cloud_card: bool,
  pub created_at: String,
}

impl RawCard {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:         row.get(0)?,
      number:     row.get(1)?,
      employee:   row.get(2)?,
      contact:    row.get(3)?,
      active:     row.get(4)?,
      card_type:  row.get(5)?,
      cloud_card: row.get(6)?,
      created_at: row.get(7)?,
    })
  }

  pub fn into_card(self) -> Result<Card> {
    Ok(Card {
      id:         CardId(self.id),
      number:     CardNumber::parse(&self.number)?,
      employee:   self.employee.map(EmployeeId),
      contact:    self.contact.map(ContactId),
      active:     self.active,
      card_type:  CardTypeId(self.card_type),
      cloud_card: self.cloud_card,
      created_at: decode_dt(&self.created_at)?,
    })
  }
}

/// Raw values read directly from a `memberships` row.
pub struct RawMembership {
  pub employee:   Option<i64>,
  pub contact:    Option<i64>,
  pub group:      i64,
  pub expiration: Option<String>,
}

impl RawMembership {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      employee:   row.get(0)?,
      contact:    row.get(1)?,
      group:      row.get(2)?,
      expiration: row.get(3)?,
    })
  }

  pub fn into_membership(self) -> Result<Membership> {
    Ok(Membership {
      owner:      decode_owner(self.employee, self.contact)?,
      group:      AccessGroupId(self.group),
      expiration: self.expiration.as_deref().map(decode_dt).transpose()?,
    })
  }
}

/// Raw values read directly from an `access_groups` row.
pub struct RawAccessGroup {
  pub id:         i64,
  pub name:       String,
  pub created_at: String,
}

impl RawAccessGroup {
  pub fn into_access_group(self) -> Result<AccessGroup> {
    Ok(AccessGroup {
      id:         AccessGroupId(self.id),
      name:       self.name,
      created_at: decode_dt(&self.created_at)?,
    })
  }
}

pub fn door_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Door> {
  Ok(Door {
    id:         DoorId(row.get(0)?),
    name:       row.get(1)?,
    controller: ControllerId(row.get(2)?),
    card_type:  decode_filter(row.get(3)?),
  })
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn owner_columns_round_trip() {
    let owner = OwnerRef::Contact(ContactId(7));
    let (e, c) = encode_owner(owner);
    assert_eq!(decode_owner(e, c).unwrap(), owner);
    assert!(decode_owner(Some(1), Some(2)).is_err());
    assert!(decode_owner(None, None).is_err());
  }

  #[test]
  fn null_card_type_means_any() {
    assert_eq!(decode_filter(None), CardTypeFilter::Any);
    assert_eq!(encode_filter(CardTypeFilter::Only(CardTypeId(3))), Some(3));
  }

  #[test]
  fn timestamps_keep_subsecond_precision() {
    let now = Utc::now();
    assert_eq!(decode_dt(&encode_dt(now)).unwrap(), now);
  }
}

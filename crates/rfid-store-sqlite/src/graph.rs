//! [`SqliteGraph`]: the entity-graph traits over a borrowed SQLite
//! connection, usually an open transaction.

use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension as _, Params, Row};

use rfid_core::{
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
};

use crate::{
  Result,
  encode::{
    CARD_COLUMNS, RawAccessGroup, RawCard, RawMembership, decode_sync_event,
    door_from_row, encode_dt, encode_filter, encode_owner, encode_sync_action,
    encode_sync_event, owner_column,
  },
};

/// Graph reads and writes against `conn`. Nothing is committed here; the
/// caller owns the transaction.
pub struct SqliteGraph<'c> {
  conn: &'c rusqlite::Connection,
}

impl<'c> SqliteGraph<'c> {
  pub fn new(conn: &'c rusqlite::Connection) -> Self { Self { conn } }

  fn query_opt<T>(
    &self,
    sql: &str,
    params: impl Params,
    f: impl FnOnce(&Row<'_>) -> rusqlite::Result<T>,
  ) -> Result<Option<T>> {
    Ok(self.conn.query_row(sql, params, f).optional()?)
  }

  fn query_all<T>(
    &self,
    sql: &str,
    params: impl Params,
    f: impl FnMut(&Row<'_>) -> rusqlite::Result<T>,
  ) -> Result<Vec<T>> {
    let mut stmt = self.conn.prepare_cached(sql)?;
    let rows = stmt
      .query_map(params, f)?
      .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
  }

  fn cards_where(&self, cond: &str, params: impl Params) -> Result<Vec<Card>> {
    let sql = format!("SELECT {CARD_COLUMNS} FROM cards WHERE {cond} ORDER BY id");
    self
      .query_all(&sql, params, RawCard::from_row)?
      .into_iter()
      .map(RawCard::into_card)
      .collect()
  }

  fn memberships_where(
    &self,
    cond: &str,
    params: impl Params,
  ) -> Result<Vec<Membership>> {
    let sql = format!(
      "SELECT employee_id, contact_id, group_id, expiration
       FROM memberships WHERE {cond} ORDER BY group_id, employee_id, contact_id"
    );
    self
      .query_all(&sql, params, RawMembership::from_row)?
      .into_iter()
      .map(RawMembership::into_membership)
      .collect()
  }

  fn relations_where(
    &self,
    cond: &str,
    params: impl Params,
  ) -> Result<Vec<CardDoorRelation>> {
    let sql = format!(
      "SELECT card_id, door_id, schedule_id FROM card_door_relations
       WHERE {cond} ORDER BY card_id, door_id"
    );
    self.query_all(&sql, params, |row| {
      Ok(CardDoorRelation {
        card:     CardId(row.get(0)?),
        door:     DoorId(row.get(1)?),
        schedule: TimeScheduleId(row.get(2)?),
      })
    })
  }

  fn allowed_groups(&self, department: DepartmentId) -> Result<Vec<AccessGroupId>> {
    self.query_all(
      "SELECT group_id FROM department_groups
       WHERE department_id = ?1 ORDER BY group_id",
      [department.0],
      |row| Ok(AccessGroupId(row.get(0)?)),
    )
  }

  fn insert_department_groups(
    &self,
    department: DepartmentId,
    groups: &[AccessGroupId],
  ) -> Result<()> {
    let mut stmt = self.conn.prepare_cached(
      "INSERT OR IGNORE INTO department_groups (department_id, group_id)
       VALUES (?1, ?2)",
    )?;
    for group in groups {
      stmt.execute([department.0, group.0])?;
    }
    Ok(())
  }

  /// Turn "no row changed" into `NotFound`.
  fn expect_changed(changed: usize, kind: &'static str, id: i64) -> Result<()> {
    if changed == 0 {
      return Err(rfid_core::Error::not_found(kind, id).into());
    }
    Ok(())
  }

  /// Every pending sync event, oldest first, with its outbox row id.
  pub fn pending_sync_events(&self) -> Result<Vec<(i64, SyncEvent)>> {
    self
      .query_all(
        "SELECT id, payload FROM sync_outbox ORDER BY id",
        [],
        |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)),
      )?
      .into_iter()
      .map(|(id, payload)| decode_sync_event(&payload).map(|event| (id, event)))
      .collect()
  }

  /// Drop outbox rows up to and including `last_id`.
  pub fn clear_sync_events(&self, last_id: i64) -> Result<usize> {
    Ok(
      self
        .conn
        .execute("DELETE FROM sync_outbox WHERE id <= ?1", [last_id])?,
    )
  }
}

// ─── Reads ───────────────────────────────────────────────────────────────────

impl AccessGraph for SqliteGraph<'_> {
  type Error = crate::Error;

  fn employee(&self, id: EmployeeId) -> Result<Option<Employee>> {
    self.query_opt(
      "SELECT id, name, department_id FROM employees WHERE id = ?1",
      [id.0],
      |row| {
        Ok(Employee {
          id:         EmployeeId(row.get(0)?),
          name:       row.get(1)?,
          department: row.get::<_, Option<i64>>(2)?.map(DepartmentId),
        })
      },
    )
  }

  fn contact(&self, id: ContactId) -> Result<Option<Contact>> {
    self.query_opt(
      "SELECT id, name FROM contacts WHERE id = ?1",
      [id.0],
      |row| Ok(Contact { id: ContactId(row.get(0)?), name: row.get(1)? }),
    )
  }

  fn department(&self, id: DepartmentId) -> Result<Option<Department>> {
    let name: Option<String> = self.query_opt(
      "SELECT name FROM departments WHERE id = ?1",
      [id.0],
      |row| row.get(0),
    )?;
    let Some(name) = name else {
      return Ok(None);
    };
    Ok(Some(Department { id, name, allowed_groups: self.allowed_groups(id)? }))
  }

  fn employees_of_department(&self, id: DepartmentId) -> Result<Vec<Employee>> {
    self.query_all(
      "SELECT id, name FROM employees WHERE department_id = ?1 ORDER BY id",
      [id.0],
      |row| {
        Ok(Employee {
          id:         EmployeeId(row.get(0)?),
          name:       row.get(1)?,
          department: Some(id),
        })
      },
    )
  }

  // ── Cards ─────────────────────────────────────────────────────────────────

  fn card(&self, id: CardId) -> Result<Option<Card>> {
    Ok(self.cards_where("id = ?1", [id.0])?.into_iter().next())
  }

  fn card_by_number(&self, number: &CardNumber) -> Result<Option<Card>> {
    Ok(
      self
        .cards_where("number = ?1", [number.as_str()])?
        .into_iter()
        .next(),
    )
  }

  fn cards_of_owner(&self, owner: OwnerRef) -> Result<Vec<Card>> {
    let (column, id) = owner_column(owner);
    self.cards_where(&format!("{column} = ?1"), [id])
  }

  fn card_type(&self, id: CardTypeId) -> Result<Option<CardType>> {
    self.query_opt(
      "SELECT id, name FROM card_types WHERE id = ?1",
      [id.0],
      |row| Ok(CardType { id: CardTypeId(row.get(0)?), name: row.get(1)? }),
    )
  }

  // ── Access groups ─────────────────────────────────────────────────────────

  fn access_group(&self, id: AccessGroupId) -> Result<Option<AccessGroup>> {
    self
      .query_opt(
        "SELECT id, name, created_at FROM access_groups WHERE id = ?1",
        [id.0],
        |row| {
          Ok(RawAccessGroup {
            id:         row.get(0)?,
            name:       row.get(1)?,
            created_at: row.get(2)?,
          })
        },
      )?
      .map(RawAccessGroup::into_access_group)
      .transpose()
  }

  fn memberships_of_owner(&self, owner: OwnerRef) -> Result<Vec<Membership>> {
    let (column, id) = owner_column(owner);
    self.memberships_where(&format!("{column} = ?1"), [id])
  }

  fn members_of_group(&self, group: AccessGroupId) -> Result<Vec<Membership>> {
    self.memberships_where("group_id = ?1", [group.0])
  }

  fn expired_memberships(&self, now: DateTime<Utc>) -> Result<Vec<Membership>> {
    let mut expiring = self.memberships_where("expiration IS NOT NULL", [])?;
    expiring.retain(|m| !m.is_active_at(now));
    Ok(expiring)
  }

  fn grants_of_group(&self, group: AccessGroupId) -> Result<Vec<DoorGrant>> {
    self.query_all(
      "SELECT door_id, schedule_id FROM group_doors
       WHERE group_id = ?1 ORDER BY door_id",
      [group.0],
      |row| {
        Ok(DoorGrant {
          door:     DoorId(row.get(0)?),
          schedule: TimeScheduleId(row.get(1)?),
        })
      },
    )
  }

  fn grants_of_door(
    &self,
    door: DoorId,
  ) -> Result<Vec<(AccessGroupId, TimeScheduleId)>> {
    self.query_all(
      "SELECT group_id, schedule_id FROM group_doors
       WHERE door_id = ?1 ORDER BY group_id",
      [door.0],
      |row| Ok((AccessGroupId(row.get(0)?), TimeScheduleId(row.get(1)?))),
    )
  }

  fn time_schedule(&self, id: TimeScheduleId) -> Result<Option<TimeSchedule>> {
    self.query_opt(
      "SELECT id, name FROM time_schedules WHERE id = ?1",
      [id.0],
      |row| Ok(TimeSchedule { id: TimeScheduleId(row.get(0)?), name: row.get(1)? }),
    )
  }

  // ── Hardware ──────────────────────────────────────────────────────────────

  fn webstack(&self, id: WebstackId) -> Result<Option<Webstack>> {
    self.query_opt(
      "SELECT id, name FROM webstacks WHERE id = ?1",
      [id.0],
      |row| Ok(Webstack { id: WebstackId(row.get(0)?), name: row.get(1)? }),
    )
  }

  fn controller(&self, id: ControllerId) -> Result<Option<Controller>> {
    self.query_opt(
      "SELECT id, name, webstack_id, external_db FROM controllers WHERE id = ?1",
      [id.0],
      |row| {
        Ok(Controller {
          id:          ControllerId(row.get(0)?),
          name:        row.get(1)?,
          webstack:    WebstackId(row.get(2)?),
          external_db: row.get(3)?,
        })
      },
    )
  }

  fn door(&self, id: DoorId) -> Result<Option<Door>> {
    self.query_opt(
      "SELECT id, name, controller_id, card_type_id FROM doors WHERE id = ?1",
      [id.0],
      door_from_row,
    )
  }

  fn doors_of_controller(&self, id: ControllerId) -> Result<Vec<Door>> {
    self.query_all(
      "SELECT id, name, controller_id, card_type_id FROM doors
       WHERE controller_id = ?1 ORDER BY id",
      [id.0],
      door_from_row,
    )
  }

  // ── Relations ─────────────────────────────────────────────────────────────

  fn relation(
    &self,
    card: CardId,
    door: DoorId,
  ) -> Result<Option<CardDoorRelation>> {
    Ok(
      self
        .relations_where("card_id = ?1 AND door_id = ?2", [card.0, door.0])?
        .into_iter()
        .next(),
    )
  }

  fn relations_of_card(&self, card: CardId) -> Result<Vec<CardDoorRelation>> {
    self.relations_where("card_id = ?1", [card.0])
  }

  fn relations_of_door(&self, door: DoorId) -> Result<Vec<CardDoorRelation>> {
    self.relations_where("door_id = ?1", [door.0])
  }
}

// ─── Writes ──────────────────────────────────────────────────────────────────

impl GraphMut for SqliteGraph<'_> {
  // ── Owners ────────────────────────────────────────────────────────────────

  fn insert_employee(&mut self, new: NewEmployee) -> Result<Employee> {
    self.conn.execute(
      "INSERT INTO employees (name, department_id) VALUES (?1, ?2)",
      rusqlite::params![new.name, new.department.map(|d| d.0)],
    )?;
    Ok(Employee {
      id:         EmployeeId(self.conn.last_insert_rowid()),
      name:       new.name,
      department: new.department,
    })
  }

  fn set_employee_department(
    &mut self,
    id: EmployeeId,
    department: Option<DepartmentId>,
  ) -> Result<()> {
    let changed = self.conn.execute(
      "UPDATE employees SET department_id = ?2 WHERE id = ?1",
      rusqlite::params![id.0, department.map(|d| d.0)],
    )?;
    Self::expect_changed(changed, EmployeeId::KIND, id.0)
  }

  fn delete_employee(&mut self, id: EmployeeId) -> Result<()> {
    self.conn.execute("DELETE FROM employees WHERE id = ?1", [id.0])?;
    Ok(())
  }

  fn insert_contact(&mut self, name: String) -> Result<Contact> {
    self
      .conn
      .execute("INSERT INTO contacts (name) VALUES (?1)", [&name])?;
    Ok(Contact { id: ContactId(self.conn.last_insert_rowid()), name })
  }

  fn delete_contact(&mut self, id: ContactId) -> Result<()> {
    self.conn.execute("DELETE FROM contacts WHERE id = ?1", [id.0])?;
    Ok(())
  }

  fn insert_department(&mut self, new: NewDepartment) -> Result<Department> {
    self
      .conn
      .execute("INSERT INTO departments (name) VALUES (?1)", [&new.name])?;
    let id = DepartmentId(self.conn.last_insert_rowid());
    self.insert_department_groups(id, &new.allowed_groups)?;
    Ok(Department {
      id,
      name: new.name,
      allowed_groups: self.allowed_groups(id)?,
    })
  }

  fn set_department_groups(
    &mut self,
    id: DepartmentId,
    groups: &[AccessGroupId],
  ) -> Result<()> {
    self
      .conn
      .execute("DELETE FROM department_groups WHERE department_id = ?1", [id.0])?;
    self.insert_department_groups(id, groups)
  }

  // ── Cards ─────────────────────────────────────────────────────────────────

  fn insert_card_type(&mut self, name: String) -> Result<CardType> {
    self
      .conn
      .execute("INSERT INTO card_types (name) VALUES (?1)", [&name])?;
    Ok(CardType { id: CardTypeId(self.conn.last_insert_rowid()), name })
  }

  fn insert_card(&mut self, fields: CardFields) -> Result<Card> {
    let created_at = Utc::now();
    self.conn.execute(
      "INSERT INTO cards (
         number, employee_id, contact_id, active, card_type_id, cloud_card,
         created_at
       ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
      rusqlite::params![
        fields.number.as_str(),
        fields.employee.map(|e| e.0),
        fields.contact.map(|c| c.0),
        fields.active,
        fields.card_type.0,
        fields.cloud_card,
        encode_dt(created_at),
      ],
    )?;
    Ok(Card {
      id: CardId(self.conn.last_insert_rowid()),
      number: fields.number,
      employee: fields.employee,
      contact: fields.contact,
      active: fields.active,
      card_type: fields.card_type,
      cloud_card: fields.cloud_card,
      created_at,
    })
  }

  fn update_card(&mut self, card: &Card) -> Result<()> {
    let changed = self.conn.execute(
      "UPDATE cards SET
         number = ?2, employee_id = ?3, contact_id = ?4, active = ?5,
         card_type_id = ?6, cloud_card = ?7
       WHERE id = ?1",
      rusqlite::params![
        card.id.0,
        card.number.as_str(),
        card.employee.map(|e| e.0),
        card.contact.map(|c| c.0),
        card.active,
        card.card_type.0,
        card.cloud_card,
      ],
    )?;
    Self::expect_changed(changed, CardId::KIND, card.id.0)
  }

  fn delete_card(&mut self, id: CardId) -> Result<()> {
    self.conn.execute("DELETE FROM cards WHERE id = ?1", [id.0])?;
    Ok(())
  }

  // ── Hardware ──────────────────────────────────────────────────────────────

  fn insert_webstack(&mut self, name: String) -> Result<Webstack> {
    self
      .conn
      .execute("INSERT INTO webstacks (name) VALUES (?1)", [&name])?;
    Ok(Webstack { id: WebstackId(self.conn.last_insert_rowid()), name })
  }

  fn insert_controller(&mut self, new: NewController) -> Result<Controller> {
    self.conn.execute(
      "INSERT INTO controllers (name, webstack_id, external_db)
       VALUES (?1, ?2, ?3)",
      rusqlite::params![new.name, new.webstack.0, new.external_db],
    )?;
    Ok(Controller {
      id:          ControllerId(self.conn.last_insert_rowid()),
      name:        new.name,
      webstack:    new.webstack,
      external_db: new.external_db,
    })
  }

  fn set_controller_external_db(
    &mut self,
    id: ControllerId,
    external_db: bool,
  ) -> Result<()> {
    let changed = self.conn.execute(
      "UPDATE controllers SET external_db = ?2 WHERE id = ?1",
      rusqlite::params![id.0, external_db],
    )?;
    Self::expect_changed(changed, ControllerId::KIND, id.0)
  }

  fn insert_door(&mut self, new: NewDoor) -> Result<Door> {
    self.conn.execute(
      "INSERT INTO doors (name, controller_id, card_type_id) VALUES (?1, ?2, ?3)",
      rusqlite::params![new.name, new.controller.0, encode_filter(new.card_type)],
    )?;
    Ok(Door {
      id:         DoorId(self.conn.last_insert_rowid()),
      name:       new.name,
      controller: new.controller,
      card_type:  new.card_type,
    })
  }

  fn set_door_card_type(
    &mut self,
    id: DoorId,
    filter: CardTypeFilter,
  ) -> Result<()> {
    let changed = self.conn.execute(
      "UPDATE doors SET card_type_id = ?2 WHERE id = ?1",
      rusqlite::params![id.0, encode_filter(filter)],
    )?;
    Self::expect_changed(changed, DoorId::KIND, id.0)
  }

  fn delete_door(&mut self, id: DoorId) -> Result<()> {
    self.conn.execute("DELETE FROM doors WHERE id = ?1", [id.0])?;
    Ok(())
  }

  // ── Access groups ─────────────────────────────────────────────────────────

  fn insert_time_schedule(&mut self, name: String) -> Result<TimeSchedule> {
    self
      .conn
      .execute("INSERT INTO time_schedules (name) VALUES (?1)", [&name])?;
    Ok(TimeSchedule { id: TimeScheduleId(self.conn.last_insert_rowid()), name })
  }

  fn insert_access_group(&mut self, name: String) -> Result<AccessGroup> {
    let created_at = Utc::now();
    self.conn.execute(
      "INSERT INTO access_groups (name, created_at) VALUES (?1, ?2)",
      rusqlite::params![name, encode_dt(created_at)],
    )?;
    Ok(AccessGroup {
      id: AccessGroupId(self.conn.last_insert_rowid()),
      name,
      created_at,
    })
  }

  fn delete_access_group(&mut self, id: AccessGroupId) -> Result<()> {
    self
      .conn
      .execute("DELETE FROM department_groups WHERE group_id = ?1", [id.0])?;
    self
      .conn
      .execute("DELETE FROM access_groups WHERE id = ?1", [id.0])?;
    Ok(())
  }

  fn upsert_grant(&mut self, group: AccessGroupId, grant: DoorGrant) -> Result<()> {
    self.conn.execute(
      "INSERT INTO group_doors (group_id, door_id, schedule_id) VALUES (?1, ?2, ?3)
       ON CONFLICT (group_id, door_id) DO UPDATE SET schedule_id = excluded.schedule_id",
      [group.0, grant.door.0, grant.schedule.0],
    )?;
    Ok(())
  }

  fn delete_grant(&mut self, group: AccessGroupId, door: DoorId) -> Result<bool> {
    let changed = self.conn.execute(
      "DELETE FROM group_doors WHERE group_id = ?1 AND door_id = ?2",
      [group.0, door.0],
    )?;
    Ok(changed > 0)
  }

  fn upsert_membership(&mut self, m: Membership) -> Result<()> {
    let (column, id) = owner_column(m.owner);
    let expiration = m.expiration.map(encode_dt);
    let changed = self.conn.execute(
      &format!(
        "UPDATE memberships SET expiration = ?3 WHERE {column} = ?1 AND group_id = ?2"
      ),
      rusqlite::params![id, m.group.0, expiration],
    )?;
    if changed == 0 {
      let (employee, contact) = encode_owner(m.owner);
      self.conn.execute(
        "INSERT INTO memberships (employee_id, contact_id, group_id, expiration)
         VALUES (?1, ?2, ?3, ?4)",
        rusqlite::params![employee, contact, m.group.0, expiration],
      )?;
    }
    Ok(())
  }

  fn delete_membership(
    &mut self,
    owner: OwnerRef,
    group: AccessGroupId,
  ) -> Result<bool> {
    let (column, id) = owner_column(owner);
    let changed = self.conn.execute(
      &format!("DELETE FROM memberships WHERE {column} = ?1 AND group_id = ?2"),
      [id, group.0],
    )?;
    Ok(changed > 0)
  }

  // ── Relations ─────────────────────────────────────────────────────────────

  fn insert_relation(&mut self, rel: CardDoorRelation) -> Result<()> {
    self.conn.execute(
      "INSERT INTO card_door_relations (card_id, door_id, schedule_id)
       VALUES (?1, ?2, ?3)",
      [rel.card.0, rel.door.0, rel.schedule.0],
    )?;
    Ok(())
  }

  fn update_relation(&mut self, rel: CardDoorRelation) -> Result<()> {
    let changed = self.conn.execute(
      "UPDATE card_door_relations SET schedule_id = ?3
       WHERE card_id = ?1 AND door_id = ?2",
      [rel.card.0, rel.door.0, rel.schedule.0],
    )?;
    Self::expect_changed(changed, "relation", rel.card.0)
  }

  fn delete_relation(&mut self, card: CardId, door: DoorId) -> Result<bool> {
    let changed = self.conn.execute(
      "DELETE FROM card_door_relations WHERE card_id = ?1 AND door_id = ?2",
      [card.0, door.0],
    )?;
    Ok(changed > 0)
  }

  fn push_sync(&mut self, event: SyncEvent) -> Result<()> {
    self.conn.execute(
      "INSERT INTO sync_outbox (action, payload, recorded_at) VALUES (?1, ?2, ?3)",
      rusqlite::params![
        encode_sync_action(&event),
        encode_sync_event(&event)?,
        encode_dt(Utc::now()),
      ],
    )?;
    Ok(())
  }
}

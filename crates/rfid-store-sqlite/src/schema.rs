//! SQL schema for the RFID SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

-- ── Owners ──────────────────────────────────────────────────────────────────

CREATE TABLE IF NOT EXISTS departments (
    id    INTEGER PRIMARY KEY,
    name  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS employees (
    id             INTEGER PRIMARY KEY,
    name           TEXT NOT NULL,
    department_id  INTEGER REFERENCES departments(id)
);

CREATE TABLE IF NOT EXISTS contacts (
    id    INTEGER PRIMARY KEY,
    name  TEXT NOT NULL
);

-- ── Access groups ───────────────────────────────────────────────────────────

-- AUTOINCREMENT keeps ids monotonic across deletes: the newest group wins
-- overlapping grants.
CREATE TABLE IF NOT EXISTS access_groups (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    name        TEXT NOT NULL,
    created_at  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS department_groups (
    department_id  INTEGER NOT NULL REFERENCES departments(id),
    group_id       INTEGER NOT NULL REFERENCES access_groups(id),
    PRIMARY KEY (department_id, group_id)
);

CREATE TABLE IF NOT EXISTS time_schedules (
    id    INTEGER PRIMARY KEY,
    name  TEXT NOT NULL
);

-- Exactly one of employee_id / contact_id is set.
CREATE TABLE IF NOT EXISTS memberships (
    employee_id  INTEGER REFERENCES employees(id),
    contact_id   INTEGER REFERENCES contacts(id),
    group_id     INTEGER NOT NULL REFERENCES access_groups(id),
    expiration   TEXT,
    UNIQUE (employee_id, group_id),
    UNIQUE (contact_id, group_id),
    CHECK  ((employee_id IS NULL) != (contact_id IS NULL))
);

-- ── Hardware ────────────────────────────────────────────────────────────────

CREATE TABLE IF NOT EXISTS card_types (
    id    INTEGER PRIMARY KEY,
    name  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS webstacks (
    id    INTEGER PRIMARY KEY,
    name  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS controllers (
    id           INTEGER PRIMARY KEY,
    name         TEXT NOT NULL,
    webstack_id  INTEGER NOT NULL REFERENCES webstacks(id),
    external_db  INTEGER NOT NULL DEFAULT 0
);

-- card_type_id NULL accepts every card type.
CREATE TABLE IF NOT EXISTS doors (
    id             INTEGER PRIMARY KEY,
    name           TEXT NOT NULL,
    controller_id  INTEGER NOT NULL REFERENCES controllers(id),
    card_type_id   INTEGER REFERENCES card_types(id)
);

CREATE TABLE IF NOT EXISTS group_doors (
    group_id     INTEGER NOT NULL REFERENCES access_groups(id),
    door_id      INTEGER NOT NULL REFERENCES doors(id),
    schedule_id  INTEGER NOT NULL REFERENCES time_schedules(id),
    PRIMARY KEY (group_id, door_id)
);

-- ── Cards ───────────────────────────────────────────────────────────────────

CREATE TABLE IF NOT EXISTS cards (
    id            INTEGER PRIMARY KEY,
    number        TEXT NOT NULL UNIQUE,
    employee_id   INTEGER REFERENCES employees(id),
    contact_id    INTEGER REFERENCES contacts(id),
    active        INTEGER NOT NULL DEFAULT 1,
    card_type_id  INTEGER NOT NULL REFERENCES card_types(id),
    cloud_card    INTEGER NOT NULL DEFAULT 1,
    created_at    TEXT NOT NULL,
    CHECK (length(number) = 10),
    CHECK (employee_id IS NULL OR contact_id IS NULL)
);

-- Written only by the reconciler.
CREATE TABLE IF NOT EXISTS card_door_relations (
    card_id      INTEGER NOT NULL REFERENCES cards(id),
    door_id      INTEGER NOT NULL REFERENCES doors(id),
    schedule_id  INTEGER NOT NULL REFERENCES time_schedules(id),
    UNIQUE (card_id, door_id)
);

-- Pending device instructions, drained oldest first.
CREATE TABLE IF NOT EXISTS sync_outbox (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    action       TEXT NOT NULL,   -- 'grant' | 'revoke'
    payload      TEXT NOT NULL,   -- JSON-encoded SyncEvent
    recorded_at  TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS employees_department_idx ON employees(department_id);
CREATE INDEX IF NOT EXISTS cards_employee_idx        ON cards(employee_id);
CREATE INDEX IF NOT EXISTS cards_contact_idx         ON cards(contact_id);
CREATE INDEX IF NOT EXISTS memberships_group_idx     ON memberships(group_id);
CREATE INDEX IF NOT EXISTS group_doors_door_idx      ON group_doors(door_id);
CREATE INDEX IF NOT EXISTS doors_controller_idx      ON doors(controller_id);
CREATE INDEX IF NOT EXISTS relations_door_idx        ON card_door_relations(door_id);

PRAGMA user_version = 1;
";

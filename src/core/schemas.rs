//! Schema definitions for the registry database.
//!
//! The registry is a single SQLite file with two tables:
//! 1. `data`: top-level records, one row per key.
//! 2. `subdata`: one level of nested sub-keys owned by a `data` row.

pub const REGISTRY_DB_NAME: &str = "androsh.db";

pub const REGISTRY_DB_SCHEMA_DATA: &str = "
    CREATE TABLE IF NOT EXISTS data (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        key TEXT NOT NULL UNIQUE,
        value TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )
";

pub const REGISTRY_DB_SCHEMA_SUBDATA: &str = "
    CREATE TABLE IF NOT EXISTS subdata (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        parent_key TEXT NOT NULL,
        subkey TEXT NOT NULL,
        subvalue TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        FOREIGN KEY (parent_key) REFERENCES data (key) ON DELETE CASCADE,
        UNIQUE(parent_key, subkey)
    )
";

pub const REGISTRY_DB_SCHEMA_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_subdata_parent ON subdata(parent_key)";

// Upserts keep `created_at` and, for `data`, leave owned sub-keys untouched.
// INSERT OR REPLACE would delete the parent row and cascade into `subdata`.
pub const UPSERT_DATA: &str = "
    INSERT INTO data (key, value, created_at, updated_at) VALUES (?1, ?2, ?3, ?3)
    ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
";

pub const UPSERT_SUBDATA: &str = "
    INSERT INTO subdata (parent_key, subkey, subvalue, created_at, updated_at)
    VALUES (?1, ?2, ?3, ?4, ?4)
    ON CONFLICT(parent_key, subkey) DO UPDATE SET
        subvalue = excluded.subvalue, updated_at = excluded.updated_at
";

pub const INSERT_EMPTY_PARENT: &str = "
    INSERT INTO data (key, value, created_at, updated_at) VALUES (?1, '{}', ?2, ?2)
    ON CONFLICT(key) DO NOTHING
";

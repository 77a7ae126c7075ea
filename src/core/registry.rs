//! Durable key / sub-key registry.
//!
//! Every public method performs one scoped unit of work through [`DbBroker`]
//! and swallows storage failures: they are logged and surface as `false`,
//! `None` or an empty map. Callers treat a `false` from a mutating call as
//! "state may be unchanged".

use crate::core::broker::DbBroker;
use crate::core::db;
use crate::core::error::AndroshError;
use crate::core::schemas;
use crate::core::time;
use rusqlite::{Connection, OptionalExtension, params};
use serde_json::{Map, Value};
use std::path::Path;

/// Key of the global setup-completion flag.
pub const DONE_KEY: &str = "done";

pub struct Registry {
    broker: DbBroker,
}

fn serialize(value: &Value) -> Result<String, AndroshError> {
    Ok(serde_json::to_string(value)?)
}

fn deserialize(raw: Option<String>) -> Result<Value, AndroshError> {
    match raw {
        Some(text) => Ok(serde_json::from_str(&text)?),
        None => Ok(Value::Null),
    }
}

fn degrade<T>(op: &str, result: Result<T, AndroshError>, fallback: T) -> T {
    match result {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!(op, error = %e, "registry operation failed");
            fallback
        }
    }
}

fn upsert(conn: &Connection, key: &str, value: &Value, now: &str) -> Result<(), AndroshError> {
    conn.execute(schemas::UPSERT_DATA, params![key, serialize(value)?, now])?;
    Ok(())
}

fn upsert_sub(
    conn: &Connection,
    key: &str,
    subkey: &str,
    value: &Value,
    now: &str,
) -> Result<(), AndroshError> {
    conn.execute(schemas::INSERT_EMPTY_PARENT, params![key, now])?;
    conn.execute(
        schemas::UPSERT_SUBDATA,
        params![key, subkey, serialize(value)?, now],
    )?;
    Ok(())
}

/// Python-style truthiness, used for the `done` flag.
fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

impl Registry {
    /// Open (creating if needed) the registry stored at `db_path`.
    pub fn open(db_path: &Path) -> Result<Self, AndroshError> {
        db::initialize_registry_db(db_path)?;
        Ok(Self {
            broker: DbBroker::new(db_path),
        })
    }

    pub fn path(&self) -> &Path {
        self.broker.db_path()
    }

    pub fn set_global_flag(&self, done: bool) -> bool {
        self.set_flag(DONE_KEY, Value::Bool(done))
    }

    /// Upsert a marker under a custom key, e.g. the last active instance.
    pub fn set_flag(&self, key: &str, value: Value) -> bool {
        self.put(key, &value)
    }

    pub fn is_setup_done(&self) -> bool {
        self.get(DONE_KEY).as_ref().is_some_and(truthy)
    }

    pub fn put(&self, key: &str, value: &Value) -> bool {
        let result = self.broker.with_conn("registry.put", |conn| {
            upsert(conn, key, value, &time::now_rfc3339())
        });
        degrade("put", result.map(|_| true), false)
    }

    pub fn put_sub(&self, key: &str, subkey: &str, value: &Value) -> bool {
        let result = self.broker.with_tx("registry.put_sub", |conn| {
            upsert_sub(conn, key, subkey, value, &time::now_rfc3339())
        });
        degrade("put_sub", result.map(|_| true), false)
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        let result = self.broker.with_conn("registry.get", |conn| {
            let raw: Option<Option<String>> = conn
                .query_row("SELECT value FROM data WHERE key = ?1", [key], |row| {
                    row.get(0)
                })
                .optional()?;
            raw.map(deserialize).transpose()
        });
        degrade("get", result, None)
    }

    pub fn get_sub(&self, key: &str, subkey: &str) -> Option<Value> {
        let result = self.broker.with_conn("registry.get_sub", |conn| {
            let raw: Option<Option<String>> = conn
                .query_row(
                    "SELECT subvalue FROM subdata WHERE parent_key = ?1 AND subkey = ?2",
                    [key, subkey],
                    |row| row.get(0),
                )
                .optional()?;
            raw.map(deserialize).transpose()
        });
        degrade("get_sub", result, None)
    }

    /// All sub-keys of `key`. A missing key and a key without sub-keys both
    /// yield an empty map.
    pub fn get_all_sub(&self, key: &str) -> Map<String, Value> {
        let result = self.broker.with_conn("registry.get_all_sub", |conn| {
            let mut stmt =
                conn.prepare("SELECT subkey, subvalue FROM subdata WHERE parent_key = ?1")?;
            let rows = stmt.query_map([key], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, Option<String>>(1)?))
            })?;
            let mut out = Map::new();
            for row in rows {
                let (subkey, raw) = row?;
                out.insert(subkey, deserialize(raw)?);
            }
            Ok(out)
        });
        degrade("get_all_sub", result, Map::new())
    }

    /// Apply many writes in one transaction. A mapping value is a batch of
    /// sub-key upserts for its key; any other value is a plain upsert.
    pub fn update_bulk(&self, records: &Map<String, Value>) -> bool {
        let result = self.broker.with_tx("registry.update_bulk", |conn| {
            let now = time::now_rfc3339();
            for (key, value) in records {
                match value {
                    Value::Object(subs) => {
                        for (subkey, subvalue) in subs {
                            upsert_sub(conn, key, subkey, subvalue, &now)?;
                        }
                    }
                    other => upsert(conn, key, other, &now)?,
                }
            }
            Ok(())
        });
        degrade("update_bulk", result.map(|_| true), false)
    }

    /// Every top-level record with its sub-keys merged in as a mapping.
    ///
    /// A record whose own value is not a mapping but which owns sub-keys is
    /// reported as the mapping of its sub-keys; the scalar value is dropped.
    pub fn fetch_all(&self) -> Map<String, Value> {
        let result = self.broker.with_conn("registry.fetch_all", |conn| {
            let mut out = Map::new();

            let mut stmt = conn.prepare("SELECT key, value FROM data ORDER BY id")?;
            let rows = stmt.query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, Option<String>>(1)?))
            })?;
            for row in rows {
                let (key, raw) = row?;
                out.insert(key, deserialize(raw)?);
            }

            let mut stmt =
                conn.prepare("SELECT parent_key, subkey, subvalue FROM subdata ORDER BY id")?;
            let rows = stmt.query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<String>>(2)?,
                ))
            })?;
            for row in rows {
                let (parent, subkey, raw) = row?;
                let subvalue = deserialize(raw)?;
                match out.get_mut(&parent) {
                    Some(Value::Object(map)) => {
                        map.insert(subkey, subvalue);
                    }
                    Some(other) => {
                        let mut map = Map::new();
                        map.insert(subkey, subvalue);
                        *other = Value::Object(map);
                    }
                    None => {
                        let mut map = Map::new();
                        map.insert(subkey, subvalue);
                        out.insert(parent, Value::Object(map));
                    }
                }
            }
            Ok(out)
        });
        degrade("fetch_all", result, Map::new())
    }

    /// Delete one sub-key, or the whole key together with its sub-keys.
    pub fn remove(&self, key: &str, subkey: Option<&str>) -> bool {
        let result = self.broker.with_conn("registry.remove", |conn| {
            match subkey {
                Some(subkey) => conn.execute(
                    "DELETE FROM subdata WHERE parent_key = ?1 AND subkey = ?2",
                    [key, subkey],
                )?,
                None => conn.execute("DELETE FROM data WHERE key = ?1", [key])?,
            };
            Ok(())
        });
        degrade("remove", result.map(|_| true), false)
    }

    pub fn exists(&self, key: &str, subkey: Option<&str>) -> bool {
        let result = self.broker.with_conn("registry.exists", |conn| {
            let found = match subkey {
                Some(subkey) => conn
                    .query_row(
                        "SELECT 1 FROM subdata WHERE parent_key = ?1 AND subkey = ?2",
                        [key, subkey],
                        |_| Ok(()),
                    )
                    .optional()?,
                None => conn
                    .query_row("SELECT 1 FROM data WHERE key = ?1", [key], |_| Ok(()))
                    .optional()?,
            };
            Ok(found.is_some())
        });
        degrade("exists", result, false)
    }

    /// `(number of keys, number of sub-keys)`.
    pub fn count(&self) -> (usize, usize) {
        let result = self.broker.with_conn("registry.count", |conn| {
            let keys: i64 = conn.query_row("SELECT COUNT(*) FROM data", [], |r| r.get(0))?;
            let subkeys: i64 = conn.query_row("SELECT COUNT(*) FROM subdata", [], |r| r.get(0))?;
            Ok((keys as usize, subkeys as usize))
        });
        degrade("count", result, (0, 0))
    }
}

use crate::core::db;
use crate::core::error;
use rusqlite::Connection;
use std::path::{Path, PathBuf};

/// The DB Broker is the single way registry code touches SQLite.
///
/// Every call opens a fresh connection, runs one unit of work and drops the
/// connection before returning, on success and on error alike. Nothing holds
/// the database open across a privileged command or a network fetch.
pub struct DbBroker {
    db_path: PathBuf,
}

impl DbBroker {
    pub fn new(db_path: &Path) -> Self {
        Self {
            db_path: db_path.to_path_buf(),
        }
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Execute a closure with a scoped connection to the registry DB.
    pub fn with_conn<F, R>(&self, op_name: &str, f: F) -> Result<R, error::AndroshError>
    where
        F: FnOnce(&Connection) -> Result<R, error::AndroshError>,
    {
        let conn = db::db_connect(&self.db_path)?;
        let result = f(&conn);
        drop(conn);

        self.log_event(op_name, result.is_ok());
        result
    }

    /// Like [`DbBroker::with_conn`], but every statement in the closure commits
    /// together or not at all.
    pub fn with_tx<F, R>(&self, op_name: &str, f: F) -> Result<R, error::AndroshError>
    where
        F: FnOnce(&Connection) -> Result<R, error::AndroshError>,
    {
        let mut conn = db::db_connect(&self.db_path)?;
        let result: Result<R, error::AndroshError> = (|| {
            let tx = conn.transaction()?;
            let value = f(&tx)?;
            tx.commit()?;
            Ok(value)
        })();
        drop(conn);

        self.log_event(op_name, result.is_ok());
        result
    }

    fn log_event(&self, op: &str, ok: bool) {
        let db_id = self
            .db_path
            .file_name()
            .unwrap_or_default()
            .to_string_lossy();
        let status = if ok { "success" } else { "error" };
        tracing::debug!(op, db = %db_id, status, "broker op");
    }
}

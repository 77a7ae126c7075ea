use crate::core::broker::DbBroker;
use crate::core::error;
use crate::core::schemas;
use rusqlite::Connection;
use std::fs;
use std::path::Path;

pub fn db_connect(db_path: &Path) -> Result<Connection, error::AndroshError> {
    let conn = Connection::open(db_path)?;
    conn.busy_timeout(std::time::Duration::from_secs(5))
        .map_err(error::AndroshError::RusqliteError)?;
    // Foreign keys are per connection in SQLite; cascade deletes depend on this.
    conn.execute("PRAGMA foreign_keys=ON;", [])
        .map_err(error::AndroshError::RusqliteError)?;
    Ok(conn)
}

pub fn initialize_registry_db(db_path: &Path) -> Result<(), error::AndroshError> {
    if let Some(parent_dir) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent_dir).map_err(error::AndroshError::IoError)?;
    }

    let broker = DbBroker::new(db_path);
    broker.with_conn("registry.init", |conn| {
        conn.execute(schemas::REGISTRY_DB_SCHEMA_DATA, [])?;
        conn.execute(schemas::REGISTRY_DB_SCHEMA_SUBDATA, [])?;
        conn.execute(schemas::REGISTRY_DB_SCHEMA_INDEX, [])?;
        Ok(())
    })?;

    tracing::debug!(path = %db_path.display(), "registry database initialized");
    Ok(())
}

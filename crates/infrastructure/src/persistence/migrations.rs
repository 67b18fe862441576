//! Schema versioning for the experiment database
//!
//! Each `migrate_vN` moves the schema from N-1 to N. The applied version
//! lives in `schema_version`; new migrations bump [`SCHEMA_VERSION`] and get
//! a branch in [`run_migrations`].

use rusqlite::Connection;
use tracing::{debug, error, info};

use super::connection::DatabaseError;

pub const SCHEMA_VERSION: i32 = 2;

/// Bring the schema up to [`SCHEMA_VERSION`]
pub fn run_migrations(conn: &Connection) -> Result<(), DatabaseError> {
    let current = schema_version(conn)?;
    if current >= SCHEMA_VERSION {
        debug!(version = current, "schema up to date");
        return Ok(());
    }

    info!(from_version = current, to_version = SCHEMA_VERSION, "migrating experiment database");

    let steps: [(i32, fn(&Connection) -> Result<(), DatabaseError>); 2] =
        [(1, migrate_v1), (2, migrate_v2)];
    for (version, step) in steps {
        if current < version {
            step(conn).inspect_err(|e| error!(version, error = %e, "migration failed"))?;
            set_schema_version(conn, version)?;
        }
    }
    Ok(())
}

/// Applied schema version, 0 for a fresh database
pub fn schema_version(conn: &Connection) -> Result<i32, DatabaseError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (version INTEGER PRIMARY KEY)",
        [],
    )?;
    let version = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )?;
    Ok(version)
}

fn set_schema_version(conn: &Connection, version: i32) -> Result<(), DatabaseError> {
    conn.execute("DELETE FROM schema_version", [])?;
    conn.execute("INSERT INTO schema_version (version) VALUES (?1)", [version])?;
    Ok(())
}

/// Experiments with their full JSON record
fn migrate_v1(conn: &Connection) -> Result<(), DatabaseError> {
    debug!("applying migration V001: experiments");
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS experiments (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            status TEXT NOT NULL,
            priority TEXT NOT NULL,
            target_name TEXT NOT NULL,
            record TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_experiments_status ON experiments(status);
        CREATE INDEX IF NOT EXISTS idx_experiments_created ON experiments(created_at);
        ",
    )?;
    Ok(())
}

/// Tags in their own table so tag filters stay indexed
fn migrate_v2(conn: &Connection) -> Result<(), DatabaseError> {
    debug!("applying migration V002: experiment tags");
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS experiment_tags (
            experiment_id TEXT NOT NULL REFERENCES experiments(id) ON DELETE CASCADE,
            tag TEXT NOT NULL,
            PRIMARY KEY (experiment_id, tag)
        );

        CREATE INDEX IF NOT EXISTS idx_experiment_tags_tag ON experiment_tags(tag);
        ",
    )?;
    Ok(())
}

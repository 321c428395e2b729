//! Schema migrations, tracked in the `migrations` table.

use crate::{StoreError, StoreResult};
use rusqlite::Connection;
use tracing::{debug, info};

/// Current schema version.
pub const CURRENT_VERSION: i32 = 2;

/// Run all pending migrations.
pub fn run_migrations(conn: &Connection) -> StoreResult<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        [],
    )?;

    let current_version: i32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM migrations",
        [],
        |row| row.get(0),
    )?;

    if current_version > CURRENT_VERSION {
        return Err(StoreError::Migration(format!(
            "database schema version {current_version} is newer than supported version {CURRENT_VERSION}"
        )));
    }

    info!(current_version, target_version = CURRENT_VERSION, "Running migrations");

    if current_version < 1 {
        migrate_v1_run_documents(conn)?;
    }
    if current_version < 2 {
        migrate_v2_status_index(conn)?;
    }

    Ok(())
}

fn record_migration(conn: &Connection, version: i32, name: &str) -> StoreResult<()> {
    conn.execute(
        "INSERT INTO migrations (version, name) VALUES (?1, ?2)",
        rusqlite::params![version, name],
    )?;
    debug!(version, name, "Migration applied");
    Ok(())
}

/// V1: one row per run document, keyed by run id.
fn migrate_v1_run_documents(conn: &Connection) -> StoreResult<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS run_documents (
            run_id TEXT PRIMARY KEY,
            recorded_at TEXT NOT NULL,
            status TEXT,
            document TEXT NOT NULL,
            inserted_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
        );
        CREATE INDEX IF NOT EXISTS idx_run_documents_recorded_at
            ON run_documents(recorded_at);
        ",
    )?;
    record_migration(conn, 1, "run_documents")
}

/// V2: status lookups for the failed-run listing.
fn migrate_v2_status_index(conn: &Connection) -> StoreResult<()> {
    conn.execute_batch(
        "CREATE INDEX IF NOT EXISTS idx_run_documents_status
            ON run_documents(status, recorded_at);",
    )?;
    record_migration(conn, 2, "status_index")
}

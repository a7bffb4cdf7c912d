//! Schema versions for the SQLite content store.
//!
//! Steps are listed in order in [`STEPS`]; a database records every step it
//! has taken in `schema_migrations`, in the same transaction as the step.

use rusqlite::{params, Connection, Transaction};

use crate::error::{Result, StoreError};

/// Schema version this build reads and writes.
pub const CURRENT_VERSION: u32 = STEPS.len() as u32;

type Step = fn(&Transaction<'_>) -> Result<()>;

/// `STEPS[n]` moves a database from version `n` to `n + 1`.
const STEPS: [Step; 1] = [apply_v1];

/// Bring `conn` up to [`CURRENT_VERSION`]. A no-op on a current database.
pub fn migrate(conn: &mut Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL
        );",
    )?;

    let found = schema_version(conn)?;
    if found > CURRENT_VERSION {
        return Err(StoreError::Migration(format!(
            "database is at schema {found}, this build understands up to {CURRENT_VERSION}"
        )));
    }
    if found == CURRENT_VERSION {
        return Ok(());
    }

    let tx = conn.transaction()?;
    for (index, step) in STEPS.iter().enumerate().skip(found as usize) {
        let version = index as u32 + 1;
        tracing::info!(from = version - 1, to = version, "migrating content store schema");
        step(&tx)?;
        tx.execute(
            "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
            params![version, unix_millis()],
        )?;
    }
    tx.commit()?;
    Ok(())
}

fn schema_version(conn: &Connection) -> Result<u32> {
    let version = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
        [],
        |row| row.get(0),
    )?;
    Ok(version)
}

/// v1: one row per distinct blob, keyed by the Blake3 hash of its bytes.
fn apply_v1(tx: &Transaction<'_>) -> Result<()> {
    tx.execute_batch(
        "CREATE TABLE blobs (
            blob_hash BLOB PRIMARY KEY,
            bytes BLOB NOT NULL,
            size INTEGER NOT NULL,
            stored_at INTEGER NOT NULL
        );",
    )?;
    Ok(())
}

/// Wall-clock milliseconds since the Unix epoch, 0 if the clock is before it.
pub(crate) fn unix_millis() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_millis() as i64)
}

//! Schema versions for the target store.
//!
//! Applied versions are recorded in `_migrations`. Each pending step runs in
//! its own transaction together with its version row, so a failed step leaves
//! the previous version intact. A database stamped with a version newer than
//! this build knows about is refused.

use libsql::Connection;

use crate::error::DatabaseError;

struct Migration {
    version: i64,
    name: &'static str,
    sql: &'static str,
}

/// Ordered by version. Append only.
static MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    name: "forward_targets",
    sql: r#"
        CREATE TABLE IF NOT EXISTS forward_targets (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            email TEXT NOT NULL,
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            updated_at TEXT NOT NULL DEFAULT (datetime('now'))
        );
        CREATE INDEX IF NOT EXISTS idx_forward_targets_name ON forward_targets(name);
    "#,
}];

fn latest_version() -> i64 {
    MIGRATIONS.last().map_or(0, |m| m.version)
}

/// Bring the schema up to date. Returns how many steps were applied.
pub async fn run_migrations(conn: &Connection) -> Result<usize, DatabaseError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS _migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        (),
    )
    .await
    .map_err(|e| DatabaseError::Migration(format!("Failed to create _migrations table: {e}")))?;

    let from = schema_version(conn).await?;
    let latest = latest_version();
    if from > latest {
        return Err(DatabaseError::Migration(format!(
            "Database schema is at V{from}, newer than the latest known V{latest}"
        )));
    }

    let mut applied = 0;
    for migration in MIGRATIONS.iter().filter(|m| m.version > from) {
        apply(conn, migration).await?;
        applied += 1;
    }

    if applied > 0 {
        tracing::info!(from, to = latest, applied, "Target store schema upgraded");
    } else {
        tracing::debug!(version = from, "Target store schema up to date");
    }
    Ok(applied)
}

async fn apply(conn: &Connection, migration: &Migration) -> Result<(), DatabaseError> {
    let failed = |e: libsql::Error| {
        DatabaseError::Migration(format!(
            "V{} ({}) failed: {e}",
            migration.version, migration.name
        ))
    };

    tracing::debug!(
        version = migration.version,
        name = migration.name,
        "Applying migration"
    );
    let tx = conn.transaction().await.map_err(failed)?;
    tx.execute_batch(migration.sql).await.map_err(failed)?;
    tx.execute(
        "INSERT INTO _migrations (version, name) VALUES (?1, ?2)",
        libsql::params![migration.version, migration.name],
    )
    .await
    .map_err(failed)?;
    tx.commit().await.map_err(failed)
}

/// Highest recorded version, 0 for a fresh database.
async fn schema_version(conn: &Connection) -> Result<i64, DatabaseError> {
    let mut rows = conn
        .query("SELECT COALESCE(MAX(version), 0) FROM _migrations", ())
        .await
        .map_err(|e| DatabaseError::Migration(format!("Failed to read schema version: {e}")))?;

    match rows
        .next()
        .await
        .map_err(|e| DatabaseError::Migration(format!("Failed to read schema version: {e}")))?
    {
        Some(row) => row
            .get::<i64>(0)
            .map_err(|e| DatabaseError::Migration(format!("Bad schema version value: {e}"))),
        None => Ok(0),
    }
}

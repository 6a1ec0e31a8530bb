//! libSQL-backed forward target store.
//!
//! Supports local file and in-memory databases.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{DatabaseError, TargetError};
use crate::store::migrations;
use crate::store::traits::{ForwardTarget, TargetResolver};

/// Name → email lookup table.
///
/// Stores a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlTargetStore {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlTargetStore {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let store = Self::from_database(db).await?;
        info!(path = %path.display(), "Target store opened");
        Ok(store)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;
        Self::from_database(db).await
    }

    async fn from_database(db: LibSqlDatabase) -> Result<Self, DatabaseError> {
        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;
        migrations::run_migrations(&conn).await?;
        Ok(Self {
            db: Arc::new(db),
            conn,
        })
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Email for `name`, or `None` if no such target exists.
    pub async fn find_email_by_name(&self, name: &str) -> Result<Option<String>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT email FROM forward_targets WHERE name = ?1",
                params![name],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("find_email_by_name: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => row
                .get::<String>(0)
                .map(Some)
                .map_err(|e| DatabaseError::Query(format!("find_email_by_name: {e}"))),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("find_email_by_name: {e}"))),
        }
    }

    /// Insert a target, or replace the email of an existing one with the same name.
    pub async fn upsert_target(&self, name: &str, email: &str) -> Result<(), DatabaseError> {
        let now = Utc::now().to_rfc3339();
        self.conn()
            .execute(
                "INSERT INTO forward_targets (id, name, email, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?4)
                 ON CONFLICT(name) DO UPDATE SET
                     email = excluded.email,
                     updated_at = excluded.updated_at",
                params![Uuid::new_v4().to_string(), name, email, now],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("upsert_target: {e}")))?;

        debug!(name = name, email = email, "Forward target saved");
        Ok(())
    }

    /// All targets, ordered by name.
    pub async fn list_targets(&self) -> Result<Vec<ForwardTarget>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT id, name, email, created_at, updated_at
                 FROM forward_targets ORDER BY name",
                (),
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_targets: {e}")))?;

        let mut targets = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("list_targets: {e}")))?
        {
            targets.push(
                row_to_target(&row).map_err(|e| DatabaseError::Query(format!("list_targets: {e}")))?,
            );
        }
        Ok(targets)
    }

    /// Delete a target by name. Returns whether a row was removed.
    pub async fn remove_target(&self, name: &str) -> Result<bool, DatabaseError> {
        let affected = self
            .conn()
            .execute("DELETE FROM forward_targets WHERE name = ?1", params![name])
            .await
            .map_err(|e| DatabaseError::Query(format!("remove_target: {e}")))?;
        Ok(affected > 0)
    }
}

#[async_trait]
impl TargetResolver for LibSqlTargetStore {
    async fn resolve(&self, name: &str) -> Result<String, TargetError> {
        self.find_email_by_name(name)
            .await?
            .ok_or_else(|| TargetError::NotFound {
                name: name.to_string(),
            })
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

fn row_to_target(row: &libsql::Row) -> Result<ForwardTarget, libsql::Error> {
    Ok(ForwardTarget {
        id: row.get(0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        created_at: parse_datetime(&row.get::<String>(3)?),
        updated_at: parse_datetime(&row.get::<String>(4)?),
    })
}

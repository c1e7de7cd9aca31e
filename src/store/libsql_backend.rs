//! libSQL backend — async `Repository` implementation.
//!
//! Supports local file and in-memory databases. A single connection is
//! reused for all operations; `libsql::Connection` is `Send + Sync` and
//! safe for concurrent async use.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::info;
use uuid::Uuid;

use crate::catalog::ChallengeKind;
use crate::error::DatabaseError;
use crate::store::migrations;
use crate::store::traits::{EntryKind, LedgerEntry, LedgerFilter, Repository, User};

/// libSQL repository backend.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Connection(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Connection(format!("Failed to open libSQL database: {e}"))
            })?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Connection(format!("Failed to create connection: {e}")))?;

        migrations::run_migrations(&conn).await?;
        info!(path = %path.display(), "Database opened");
        Ok(Self {
            db: Arc::new(db),
            conn,
        })
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Connection(format!("Failed to create in-memory database: {e}"))
            })?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Connection(format!("Failed to create connection: {e}")))?;

        migrations::run_migrations(&conn).await?;
        Ok(Self {
            db: Arc::new(db),
            conn,
        })
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Convert `Option<&str>` to a libsql Value.
fn opt_text(s: Option<&str>) -> libsql::Value {
    match s {
        Some(s) => libsql::Value::Text(s.to_string()),
        None => libsql::Value::Null,
    }
}

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

/// Serialize the completed-challenge set as a JSON array of kind strings.
fn completed_to_json(completed: &HashSet<ChallengeKind>) -> String {
    let mut kinds: Vec<&str> = completed.iter().map(|k| k.as_str()).collect();
    kinds.sort_unstable();
    serde_json::to_string(&kinds).unwrap_or_else(|_| "[]".to_string())
}

fn completed_from_json(s: &str) -> Result<HashSet<ChallengeKind>, DatabaseError> {
    let kinds: Vec<String> = serde_json::from_str(s)
        .map_err(|e| DatabaseError::Serialization(format!("completed_challenges: {e}")))?;
    Ok(kinds
        .iter()
        .filter_map(|k| ChallengeKind::parse(k))
        .collect())
}

/// Map a points row to a LedgerEntry.
///
/// Column order: 0:id, 1:user_id, 2:points, 3:kind, 4:note, 5:occurred_at
fn row_to_entry(row: &libsql::Row) -> Result<LedgerEntry, DatabaseError> {
    let id: String = row
        .get(0)
        .map_err(|e| DatabaseError::Query(e.to_string()))?;
    let user_id: String = row
        .get(1)
        .map_err(|e| DatabaseError::Query(e.to_string()))?;
    let points: i64 = row
        .get(2)
        .map_err(|e| DatabaseError::Query(e.to_string()))?;
    let kind: String = row
        .get(3)
        .map_err(|e| DatabaseError::Query(e.to_string()))?;
    let note: Option<String> = row.get(4).ok();
    let occurred_at: String = row
        .get(5)
        .map_err(|e| DatabaseError::Query(e.to_string()))?;

    Ok(LedgerEntry {
        id: Uuid::parse_str(&id)
            .map_err(|e| DatabaseError::Serialization(format!("entry id: {e}")))?,
        user_id,
        points,
        kind: EntryKind::parse(&kind)
            .ok_or_else(|| DatabaseError::Serialization(format!("unknown entry kind '{kind}'")))?,
        note,
        occurred_at: parse_datetime(&occurred_at),
    })
}

/// Build the WHERE clause and parameter list for a ledger filter.
fn filter_clause(filter: &LedgerFilter) -> (String, Vec<libsql::Value>) {
    let mut conditions = Vec::new();
    let mut values: Vec<libsql::Value> = Vec::new();

    if let Some(ref user_id) = filter.user_id {
        conditions.push(format!("user_id = ?{}", values.len() + 1));
        values.push(libsql::Value::Text(user_id.clone()));
    }
    if let Some(since) = filter.since {
        conditions.push(format!("occurred_at >= ?{}", values.len() + 1));
        values.push(libsql::Value::Text(since.to_rfc3339()));
    }

    let clause = if conditions.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", conditions.join(" AND "))
    };
    (clause, values)
}

// ── Repository implementation ───────────────────────────────────────

#[async_trait]
impl Repository for LibSqlBackend {
    async fn get_user(&self, id: &str) -> Result<User, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT id, completed_challenges, active_challenge FROM users WHERE id = ?1",
                params![id],
            )
            .await
            .map_err(|e| DatabaseError::Query(e.to_string()))?;

        if let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(e.to_string()))?
        {
            let completed: String = row
                .get(1)
                .map_err(|e| DatabaseError::Query(e.to_string()))?;
            let active: Option<String> = row.get(2).ok();

            return Ok(User {
                id: id.to_string(),
                completed_challenges: completed_from_json(&completed)?,
                active_challenge: active.as_deref().and_then(ChallengeKind::parse),
                is_new: false,
            });
        }

        // First interaction: create the record lazily with empty state.
        let now = Utc::now().to_rfc3339();
        self.conn()
            .execute(
                "INSERT INTO users (id, completed_challenges, active_challenge, created_at, updated_at)
                 VALUES (?1, '[]', NULL, ?2, ?2)",
                params![id, now],
            )
            .await
            .map_err(|e| DatabaseError::Query(e.to_string()))?;

        Ok(User::new(id))
    }

    async fn save_user(&self, user: &User) -> Result<(), DatabaseError> {
        let completed = completed_to_json(&user.completed_challenges);
        let active = opt_text(user.active_challenge.map(|k| k.as_str()));
        let now = Utc::now().to_rfc3339();

        self.conn()
            .execute(
                "INSERT INTO users (id, completed_challenges, active_challenge, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?4)
                 ON CONFLICT(id) DO UPDATE SET
                     completed_challenges = excluded.completed_challenges,
                     active_challenge = excluded.active_challenge,
                     updated_at = excluded.updated_at",
                params![user.id.as_str(), completed, active, now],
            )
            .await
            .map_err(|e| DatabaseError::Query(e.to_string()))?;
        Ok(())
    }

    async fn append_entry(&self, entry: &LedgerEntry) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "INSERT INTO points (id, user_id, points, kind, note, occurred_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    entry.id.to_string(),
                    entry.user_id.as_str(),
                    entry.points,
                    entry.kind.as_str(),
                    opt_text(entry.note.as_deref()),
                    entry.occurred_at.to_rfc3339()
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(e.to_string()))?;
        Ok(())
    }

    async fn query_entries(
        &self,
        filter: &LedgerFilter,
    ) -> Result<Vec<LedgerEntry>, DatabaseError> {
        let (clause, values) = filter_clause(filter);
        let sql = format!(
            "SELECT id, user_id, points, kind, note, occurred_at FROM points{clause} ORDER BY occurred_at ASC"
        );

        let mut rows = self
            .conn()
            .query(&sql, values)
            .await
            .map_err(|e| DatabaseError::Query(e.to_string()))?;

        let mut entries = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(e.to_string()))?
        {
            entries.push(row_to_entry(&row)?);
        }
        Ok(entries)
    }

    async fn count_entries(&self, filter: &LedgerFilter) -> Result<u64, DatabaseError> {
        let (clause, values) = filter_clause(filter);
        let sql = format!("SELECT COUNT(*) FROM points{clause}");

        let mut rows = self
            .conn()
            .query(&sql, values)
            .await
            .map_err(|e| DatabaseError::Query(e.to_string()))?;

        match rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(e.to_string()))?
        {
            Some(row) => {
                let count: i64 = row
                    .get(0)
                    .map_err(|e| DatabaseError::Query(e.to_string()))?;
                Ok(count as u64)
            }
            None => Ok(0),
        }
    }

    async fn bonus_granted(&self, user_id: &str, week: &str) -> Result<bool, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT 1 FROM bonus_grants WHERE user_id = ?1 AND week = ?2",
                params![user_id, week],
            )
            .await
            .map_err(|e| DatabaseError::Query(e.to_string()))?;

        Ok(rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(e.to_string()))?
            .is_some())
    }

    async fn record_bonus_grant(&self, user_id: &str, week: &str) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "INSERT OR IGNORE INTO bonus_grants (user_id, week, granted_at) VALUES (?1, ?2, ?3)",
                params![user_id, week, Utc::now().to_rfc3339()],
            )
            .await
            .map_err(|e| DatabaseError::Query(e.to_string()))?;
        Ok(())
    }
}

//! SQLite storage backend for Grantflow
//!
//! Holds the three tables this core mutates (sessions, conversation
//! history, matching results) plus the read-only grants corpus table.
//! Connections are opened per operation; all durable state lives in the
//! database so request handling stays stateless.

use crate::catalog::UserType;
use crate::error::{GrantflowError, Result};
use crate::interpreter::AnswerValue;
use anyhow::Context;
use chrono::{DateTime, NaiveDate, Utc};
use directories::ProjectDirs;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use std::path::PathBuf;
use uuid::Uuid;

pub mod types;
pub use types::{Grant, GrantStatus, HistoryEntry, MatchingResult, Session};

/// A constrained query over the grant corpus
///
/// Scalar constraints (status, amount, deadline) are pushed into SQL; tag
/// constraints (region, category) are applied over the deserialized rows.
/// Empty/None dimensions are inactive.
#[derive(Debug, Clone, Default)]
pub struct GrantQuery {
    /// Acceptable statuses; empty means no status constraint
    pub statuses: Vec<GrantStatus>,
    /// Declared region; grants tagged with it or `nationwide` pass
    pub region: Option<String>,
    /// Declared purposes; grants whose tags intersect pass
    pub categories: Vec<String>,
    /// Declared budget range (lo, hi); unrestricted grants always pass
    pub amount_range: Option<(i64, i64)>,
    /// Deadline window (from, to); no-deadline grants always pass
    pub deadline_window: Option<(NaiveDate, NaiveDate)>,
}

/// Storage backend over a single SQLite database file
pub struct SqliteStorage {
    db_path: PathBuf,
}

impl SqliteStorage {
    /// Create a new storage instance
    ///
    /// Initializes the database file in the user's data directory. The
    /// `GRANTFLOW_DB` environment variable overrides the path, which makes
    /// it easy to point the binary at a test DB or alternate file.
    pub fn new() -> Result<Self> {
        if let Ok(override_path) = std::env::var("GRANTFLOW_DB") {
            return Self::new_with_path(override_path);
        }

        let proj_dirs = ProjectDirs::from("org", "grantflow", "grantflow")
            .ok_or_else(|| GrantflowError::Storage("Could not determine data directory".into()))?;

        let data_dir = proj_dirs.data_dir();
        std::fs::create_dir_all(data_dir)
            .context("Failed to create data directory")
            .map_err(|e| GrantflowError::Storage(e.to_string()))?;

        let db_path = data_dir.join("grantflow.db");
        let storage = Self { db_path };
        storage.init()?;
        Ok(storage)
    }

    /// Create a new storage instance that uses the specified database path.
    ///
    /// This is primarily useful for tests where the default application data
    /// directory is not desirable (for example, using a temporary directory).
    pub fn new_with_path<P: Into<PathBuf>>(db_path: P) -> Result<Self> {
        let db_path = db_path.into();

        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .context("Failed to create parent directory for database")
                .map_err(|e| GrantflowError::Storage(e.to_string()))?;
        }

        let storage = Self { db_path };
        storage.init()?;
        Ok(storage)
    }

    fn open(&self) -> Result<Connection> {
        let conn = Connection::open(&self.db_path)
            .context("Failed to open database")
            .map_err(|e| GrantflowError::Storage(e.to_string()))?;
        conn.pragma_update(None, "foreign_keys", "ON")
            .map_err(|e| GrantflowError::Storage(e.to_string()))?;
        Ok(conn)
    }

    /// Initialize the database schema
    fn init(&self) -> Result<()> {
        let conn = self.open()?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS sessions (
                session_id TEXT PRIMARY KEY,
                origin_address TEXT,
                origin_agent TEXT,
                user_type TEXT,
                answered_count INTEGER NOT NULL DEFAULT 0,
                completed INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS conversation_history (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id TEXT NOT NULL,
                question_id TEXT NOT NULL,
                question_text TEXT NOT NULL,
                answer_value TEXT NOT NULL,
                answer_label TEXT NOT NULL,
                created_at TEXT NOT NULL,
                UNIQUE (session_id, question_id)
            );
            CREATE TABLE IF NOT EXISTS grants (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                organization TEXT NOT NULL,
                amount_min INTEGER,
                amount_max INTEGER,
                deadline TEXT,
                region_tags TEXT NOT NULL,
                category_tags TEXT NOT NULL,
                status TEXT NOT NULL,
                target_text TEXT,
                link TEXT
            );
            CREATE TABLE IF NOT EXISTS matching_results (
                session_id TEXT NOT NULL,
                grant_id TEXT NOT NULL,
                score REAL NOT NULL,
                reasoning TEXT NOT NULL,
                rank INTEGER NOT NULL,
                feedback_rating INTEGER,
                feedback_text TEXT,
                feedback_helpful INTEGER,
                PRIMARY KEY (session_id, grant_id),
                UNIQUE (session_id, rank)
            );",
        )
        .context("Failed to create tables")
        .map_err(|e| GrantflowError::Storage(e.to_string()))?;
        Ok(())
    }

    // ---- sessions ----

    /// Create a session with a fresh caller-unguessable id
    pub fn create_session(
        &self,
        origin_address: Option<&str>,
        origin_agent: Option<&str>,
    ) -> Result<Session> {
        let conn = self.open()?;
        let now = Utc::now();
        let session = Session {
            session_id: Uuid::new_v4().to_string(),
            origin_address: origin_address.map(String::from),
            origin_agent: origin_agent.map(String::from),
            user_type: None,
            answered_count: 0,
            completed: false,
            created_at: now,
            updated_at: now,
        };
        conn.execute(
            "INSERT INTO sessions
                (session_id, origin_address, origin_agent, user_type,
                 answered_count, completed, created_at, updated_at)
             VALUES (?, ?, ?, NULL, 0, 0, ?, ?)",
            params![
                session.session_id,
                session.origin_address,
                session.origin_agent,
                now.to_rfc3339(),
                now.to_rfc3339(),
            ],
        )
        .context("Failed to insert session")
        .map_err(|e| GrantflowError::Storage(e.to_string()))?;
        Ok(session)
    }

    /// Fetch a session by id
    pub fn get_session(&self, session_id: &str) -> Result<Option<Session>> {
        let conn = self.open()?;
        let row = conn
            .query_row(
                "SELECT session_id, origin_address, origin_agent, user_type,
                        answered_count, completed, created_at, updated_at
                 FROM sessions WHERE session_id = ?",
                params![session_id],
                |row| {
                    let user_type: Option<String> = row.get(3)?;
                    Ok(Session {
                        session_id: row.get(0)?,
                        origin_address: row.get(1)?,
                        origin_agent: row.get(2)?,
                        user_type: user_type.as_deref().and_then(UserType::parse),
                        answered_count: row.get(4)?,
                        completed: row.get::<_, i64>(5)? != 0,
                        created_at: parse_ts(row.get::<_, String>(6)?),
                        updated_at: parse_ts(row.get::<_, String>(7)?),
                    })
                },
            )
            .optional()
            .context("Failed to query session")
            .map_err(|e| GrantflowError::Storage(e.to_string()))?;
        Ok(row)
    }

    /// Increment the answer counter and touch the session timestamp
    ///
    /// Returns false if the session does not exist.
    pub fn record_answer(&self, session_id: &str) -> Result<bool> {
        let conn = self.open()?;
        let changed = conn
            .execute(
                "UPDATE sessions
                 SET answered_count = answered_count + 1, updated_at = ?
                 WHERE session_id = ?",
                params![Utc::now().to_rfc3339(), session_id],
            )
            .context("Failed to record answer")
            .map_err(|e| GrantflowError::Storage(e.to_string()))?;
        Ok(changed == 1)
    }

    /// One-time user type write
    ///
    /// The unset guard is part of the UPDATE itself, so two racing first
    /// writes cannot both pass a read-side check: exactly one wins and the
    /// loser sees the stored value. Setting the same value again is a
    /// no-op; attempting to change an already-set value is a validation
    /// error (the invariant says the user type never reverts or flips).
    pub fn set_user_type(&self, session_id: &str, user_type: UserType) -> Result<()> {
        let conn = self.open()?;
        let changed = conn
            .execute(
                "UPDATE sessions SET user_type = ?, updated_at = ?
                 WHERE session_id = ? AND user_type IS NULL",
                params![user_type.to_string(), Utc::now().to_rfc3339(), session_id],
            )
            .context("Failed to set user type")
            .map_err(|e| GrantflowError::Storage(e.to_string()))?;
        if changed == 1 {
            return Ok(());
        }

        let current = self
            .get_session(session_id)?
            .ok_or_else(|| GrantflowError::SessionNotFound(session_id.to_string()))?;
        match current.user_type {
            Some(existing) if existing == user_type => Ok(()),
            Some(existing) => Err(GrantflowError::Validation(format!(
                "User type is already set to {} and cannot change",
                existing
            ))
            .into()),
            None => Err(GrantflowError::Storage(format!(
                "Failed to set user type for session {}",
                session_id
            ))
            .into()),
        }
    }

    /// Mark a session completed (first recommendation batch computed)
    pub fn mark_completed(&self, session_id: &str) -> Result<()> {
        let conn = self.open()?;
        conn.execute(
            "UPDATE sessions SET completed = 1, updated_at = ? WHERE session_id = ?",
            params![Utc::now().to_rfc3339(), session_id],
        )
        .context("Failed to mark session completed")
        .map_err(|e| GrantflowError::Storage(e.to_string()))?;
        Ok(())
    }

    /// Delete a session, cascading to history and cached results
    ///
    /// Returns false if the session did not exist.
    pub fn delete_session(&self, session_id: &str) -> Result<bool> {
        let mut conn = self.open()?;
        let tx = conn
            .transaction()
            .context("Failed to start transaction")
            .map_err(|e| GrantflowError::Storage(e.to_string()))?;
        tx.execute(
            "DELETE FROM conversation_history WHERE session_id = ?",
            params![session_id],
        )
        .context("Failed to delete history")
        .map_err(|e| GrantflowError::Storage(e.to_string()))?;
        tx.execute(
            "DELETE FROM matching_results WHERE session_id = ?",
            params![session_id],
        )
        .context("Failed to delete matching results")
        .map_err(|e| GrantflowError::Storage(e.to_string()))?;
        let deleted = tx
            .execute("DELETE FROM sessions WHERE session_id = ?", params![session_id])
            .context("Failed to delete session")
            .map_err(|e| GrantflowError::Storage(e.to_string()))?;
        tx.commit()
            .context("Failed to commit transaction")
            .map_err(|e| GrantflowError::Storage(e.to_string()))?;
        Ok(deleted == 1)
    }

    // ---- conversation history ----

    /// Record an answer, upserting by (session_id, question_id)
    ///
    /// Resubmitting an answered question overwrites the prior value while
    /// keeping the entry's original insertion position. Returns true when a
    /// new entry was inserted (a previously unanswered question).
    pub fn upsert_history(
        &self,
        session_id: &str,
        question_id: &str,
        question_text: &str,
        answer: &AnswerValue,
        answer_label: &str,
    ) -> Result<bool> {
        let mut conn = self.open()?;
        let answer_json = serde_json::to_string(answer)
            .context("Failed to serialize answer value")
            .map_err(|e| GrantflowError::Storage(e.to_string()))?;
        let now = Utc::now().to_rfc3339();

        let tx = conn
            .transaction()
            .context("Failed to start transaction")
            .map_err(|e| GrantflowError::Storage(e.to_string()))?;

        let exists: bool = tx
            .query_row(
                "SELECT 1 FROM conversation_history WHERE session_id = ? AND question_id = ?",
                params![session_id, question_id],
                |_| Ok(true),
            )
            .optional()
            .unwrap_or(Some(false))
            .unwrap_or(false);

        if exists {
            tx.execute(
                "UPDATE conversation_history
                 SET answer_value = ?, answer_label = ?
                 WHERE session_id = ? AND question_id = ?",
                params![answer_json, answer_label, session_id, question_id],
            )
            .context("Failed to update history entry")
            .map_err(|e| GrantflowError::Storage(e.to_string()))?;
        } else {
            tx.execute(
                "INSERT INTO conversation_history
                    (session_id, question_id, question_text, answer_value, answer_label, created_at)
                 VALUES (?, ?, ?, ?, ?, ?)",
                params![session_id, question_id, question_text, answer_json, answer_label, now],
            )
            .context("Failed to insert history entry")
            .map_err(|e| GrantflowError::Storage(e.to_string()))?;
        }

        tx.commit()
            .context("Failed to commit transaction")
            .map_err(|e| GrantflowError::Storage(e.to_string()))?;
        Ok(!exists)
    }

    /// Full ordered conversation history for a session
    pub fn history(&self, session_id: &str) -> Result<Vec<HistoryEntry>> {
        let conn = self.open()?;
        let mut stmt = conn
            .prepare(
                "SELECT seq, session_id, question_id, question_text,
                        answer_value, answer_label, created_at
                 FROM conversation_history
                 WHERE session_id = ?
                 ORDER BY seq ASC",
            )
            .context("Failed to prepare statement")
            .map_err(|e| GrantflowError::Storage(e.to_string()))?;

        let rows = stmt
            .query_map(params![session_id], |row| {
                let answer_json: String = row.get(4)?;
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    answer_json,
                    row.get::<_, String>(5)?,
                    row.get::<_, String>(6)?,
                ))
            })
            .context("Failed to query history")
            .map_err(|e| GrantflowError::Storage(e.to_string()))?;

        let mut entries = Vec::new();
        for row in rows {
            let (seq, session_id, question_id, question_text, answer_json, answer_label, created) =
                row.context("Failed to read history row")
                    .map_err(|e| GrantflowError::Storage(e.to_string()))?;
            let answer: AnswerValue = serde_json::from_str(&answer_json)
                .context("Failed to deserialize answer value")
                .map_err(|e| GrantflowError::Storage(e.to_string()))?;
            entries.push(HistoryEntry {
                seq,
                session_id,
                question_id,
                question_text,
                answer,
                answer_label,
                created_at: parse_ts(created),
            });
        }
        Ok(entries)
    }

    // ---- grants (read-only corpus) ----

    /// Bulk-load grant records (operator seeding; replaces by id)
    pub fn seed_grants(&self, grants: &[Grant]) -> Result<usize> {
        let mut conn = self.open()?;
        let tx = conn
            .transaction()
            .context("Failed to start transaction")
            .map_err(|e| GrantflowError::Storage(e.to_string()))?;
        for grant in grants {
            let region_tags = serde_json::to_string(&grant.region_tags)
                .map_err(|e| GrantflowError::Storage(e.to_string()))?;
            let category_tags = serde_json::to_string(&grant.category_tags)
                .map_err(|e| GrantflowError::Storage(e.to_string()))?;
            tx.execute(
                "INSERT OR REPLACE INTO grants
                    (id, title, organization, amount_min, amount_max, deadline,
                     region_tags, category_tags, status, target_text, link)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                params![
                    grant.id,
                    grant.title,
                    grant.organization,
                    grant.amount_min,
                    grant.amount_max,
                    grant.deadline.map(|d| d.to_string()),
                    region_tags,
                    category_tags,
                    grant.status.as_str(),
                    grant.target_text,
                    grant.link,
                ],
            )
            .context("Failed to insert grant")
            .map_err(|e| GrantflowError::Storage(e.to_string()))?;
        }
        tx.commit()
            .context("Failed to commit transaction")
            .map_err(|e| GrantflowError::Storage(e.to_string()))?;
        Ok(grants.len())
    }

    /// Run a constrained query over the grant corpus
    ///
    /// Scalar constraints are evaluated in SQL; region/category tag
    /// constraints are evaluated over the deserialized rows. Results are
    /// ordered by id for determinism.
    pub fn query_grants(&self, query: &GrantQuery) -> Result<Vec<Grant>> {
        let conn = self.open()?;

        let mut sql = String::from(
            "SELECT id, title, organization, amount_min, amount_max, deadline,
                    region_tags, category_tags, status, target_text, link
             FROM grants WHERE 1=1",
        );
        let mut bind: Vec<rusqlite::types::Value> = Vec::new();

        if !query.statuses.is_empty() {
            let marks = vec!["?"; query.statuses.len()].join(", ");
            sql.push_str(&format!(" AND status IN ({})", marks));
            for status in &query.statuses {
                bind.push(status.as_str().to_string().into());
            }
        }
        if let Some((lo, hi)) = query.amount_range {
            sql.push_str(
                " AND ((amount_min IS NULL AND amount_max IS NULL)
                       OR (COALESCE(amount_min, 0) <= ?
                           AND COALESCE(amount_max, 9223372036854775807) >= ?))",
            );
            bind.push(hi.into());
            bind.push(lo.into());
        }
        if let Some((from, to)) = query.deadline_window {
            // ISO dates compare lexicographically.
            sql.push_str(" AND (deadline IS NULL OR (deadline >= ? AND deadline <= ?))");
            bind.push(from.to_string().into());
            bind.push(to.to_string().into());
        }
        sql.push_str(" ORDER BY id ASC");

        let mut stmt = stmt_context(conn.prepare(&sql))?;
        let rows = stmt
            .query_map(params_from_iter(bind), grant_from_row)
            .context("Failed to query grants")
            .map_err(|e| GrantflowError::Storage(e.to_string()))?;

        let mut grants = Vec::new();
        for row in rows {
            let grant = row
                .context("Failed to read grant row")
                .map_err(|e| GrantflowError::Storage(e.to_string()))?;
            if let Some(region) = &query.region {
                let matches = grant
                    .region_tags
                    .iter()
                    .any(|t| t == region || t == "nationwide");
                if !matches {
                    continue;
                }
            }
            if !query.categories.is_empty() {
                let intersects = grant
                    .category_tags
                    .iter()
                    .any(|t| query.categories.iter().any(|c| c == t));
                if !intersects {
                    continue;
                }
            }
            grants.push(grant);
        }
        Ok(grants)
    }

    /// Fetch grants by id, preserving the requested order
    pub fn grants_by_ids(&self, ids: &[String]) -> Result<Vec<Grant>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let conn = self.open()?;
        let marks = vec!["?"; ids.len()].join(", ");
        let sql = format!(
            "SELECT id, title, organization, amount_min, amount_max, deadline,
                    region_tags, category_tags, status, target_text, link
             FROM grants WHERE id IN ({})",
            marks
        );
        let mut stmt = stmt_context(conn.prepare(&sql))?;
        let rows = stmt
            .query_map(
                params_from_iter(ids.iter().map(|s| s.as_str())),
                grant_from_row,
            )
            .context("Failed to query grants by id")
            .map_err(|e| GrantflowError::Storage(e.to_string()))?;
        let mut found = Vec::new();
        for row in rows {
            found.push(
                row.context("Failed to read grant row")
                    .map_err(|e| GrantflowError::Storage(e.to_string()))?,
            );
        }
        // Preserve caller order (ranked order).
        let mut ordered = Vec::with_capacity(found.len());
        for id in ids {
            if let Some(pos) = found.iter().position(|g: &Grant| &g.id == id) {
                ordered.push(found.remove(pos));
            }
        }
        Ok(ordered)
    }

    /// Distinct region tags observed in the corpus, sorted
    pub fn distinct_regions(&self) -> Result<Vec<String>> {
        let conn = self.open()?;
        let mut stmt = stmt_context(conn.prepare("SELECT region_tags FROM grants"))?;
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .context("Failed to query region tags")
            .map_err(|e| GrantflowError::Storage(e.to_string()))?;
        let mut regions = std::collections::BTreeSet::new();
        for row in rows {
            let json = row
                .context("Failed to read region tags")
                .map_err(|e| GrantflowError::Storage(e.to_string()))?;
            let tags: Vec<String> = serde_json::from_str(&json).unwrap_or_default();
            regions.extend(tags);
        }
        Ok(regions.into_iter().collect())
    }

    // ---- matching results (recommendation cache) ----

    /// Load the cached batch for a session, ordered by rank
    pub fn load_batch(&self, session_id: &str) -> Result<Vec<MatchingResult>> {
        let conn = self.open()?;
        let mut stmt = stmt_context(conn.prepare(
            "SELECT session_id, grant_id, score, reasoning, rank,
                    feedback_rating, feedback_text, feedback_helpful
             FROM matching_results WHERE session_id = ? ORDER BY rank ASC",
        ))?;
        let rows = stmt
            .query_map(params![session_id], |row| {
                let helpful: Option<i64> = row.get(7)?;
                Ok(MatchingResult {
                    session_id: row.get(0)?,
                    grant_id: row.get(1)?,
                    score: row.get(2)?,
                    reasoning: row.get(3)?,
                    rank: row.get(4)?,
                    feedback_rating: row.get(5)?,
                    feedback_text: row.get(6)?,
                    feedback_helpful: helpful.map(|v| v != 0),
                })
            })
            .context("Failed to query matching results")
            .map_err(|e| GrantflowError::Storage(e.to_string()))?;
        let mut results = Vec::new();
        for row in rows {
            results.push(
                row.context("Failed to read matching result row")
                    .map_err(|e| GrantflowError::Storage(e.to_string()))?,
            );
        }
        Ok(results)
    }

    /// Insert a full ranked batch in one transaction
    ///
    /// Plain INSERTs under the (session_id, grant_id) and (session_id, rank)
    /// uniqueness constraints: if a concurrent request already persisted a
    /// batch, the transaction rolls back and this returns false so the
    /// caller can re-read the now-present cache. Duplicate batches for one
    /// session can never persist.
    pub fn insert_batch(&self, results: &[MatchingResult]) -> Result<bool> {
        let mut conn = self.open()?;
        let tx = conn
            .transaction()
            .context("Failed to start transaction")
            .map_err(|e| GrantflowError::Storage(e.to_string()))?;
        for result in results {
            let outcome = tx.execute(
                "INSERT INTO matching_results
                    (session_id, grant_id, score, reasoning, rank,
                     feedback_rating, feedback_text, feedback_helpful)
                 VALUES (?, ?, ?, ?, ?, NULL, NULL, NULL)",
                params![
                    result.session_id,
                    result.grant_id,
                    result.score,
                    result.reasoning,
                    result.rank,
                ],
            );
            match outcome {
                Ok(_) => {}
                Err(e) if is_constraint_violation(&e) => {
                    // Concurrent writer won the race; abandon our batch.
                    return Ok(false);
                }
                Err(e) => {
                    return Err(GrantflowError::Storage(format!(
                        "Failed to insert matching result: {}",
                        e
                    ))
                    .into());
                }
            }
        }
        tx.commit()
            .context("Failed to commit batch")
            .map_err(|e| GrantflowError::Storage(e.to_string()))?;
        Ok(true)
    }

    /// Delete the whole batch for a session; returns rows removed
    pub fn delete_batch(&self, session_id: &str) -> Result<usize> {
        let conn = self.open()?;
        let deleted = conn
            .execute(
                "DELETE FROM matching_results WHERE session_id = ?",
                params![session_id],
            )
            .context("Failed to delete batch")
            .map_err(|e| GrantflowError::Storage(e.to_string()))?;
        Ok(deleted)
    }

    /// Record user feedback on one recommendation row
    ///
    /// Returns false if the (session, grant) row does not exist. Score,
    /// rank, and reasoning are never touched here.
    pub fn update_feedback(
        &self,
        session_id: &str,
        grant_id: &str,
        rating: i32,
        text: Option<&str>,
        helpful: bool,
    ) -> Result<bool> {
        let conn = self.open()?;
        let changed = conn
            .execute(
                "UPDATE matching_results
                 SET feedback_rating = ?, feedback_text = ?, feedback_helpful = ?
                 WHERE session_id = ? AND grant_id = ?",
                params![rating, text, helpful as i64, session_id, grant_id],
            )
            .context("Failed to update feedback")
            .map_err(|e| GrantflowError::Storage(e.to_string()))?;
        Ok(changed == 1)
    }
}

fn stmt_context(result: rusqlite::Result<rusqlite::Statement<'_>>) -> Result<rusqlite::Statement<'_>> {
    result
        .context("Failed to prepare statement")
        .map_err(|e| GrantflowError::Storage(e.to_string()).into())
}

fn grant_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Grant> {
    let deadline: Option<String> = row.get(5)?;
    let region_json: String = row.get(6)?;
    let category_json: String = row.get(7)?;
    let status: String = row.get(8)?;
    Ok(Grant {
        id: row.get(0)?,
        title: row.get(1)?,
        organization: row.get(2)?,
        amount_min: row.get(3)?,
        amount_max: row.get(4)?,
        deadline: deadline.and_then(|d| d.parse().ok()),
        region_tags: serde_json::from_str(&region_json).unwrap_or_default(),
        category_tags: serde_json::from_str(&category_json).unwrap_or_default(),
        status: GrantStatus::parse(&status).unwrap_or(GrantStatus::Closed),
        target_text: row.get(9)?,
        link: row.get(10)?,
    })
}

fn is_constraint_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _)
            if err.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

fn parse_ts(s: String) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

use crate::errors::{AppError, AppResult};
use crate::models::{
    AppSettings, JobKind, JobRecord, JobStatus, NodeDraft, NodeKind, NodeRecord, SessionRecord, UserProfile,
};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::fs;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

const SCHEMA_SQL: &str = include_str!("schema.sql");

const JOB_COLUMNS: &str =
    "id, session_id, kind, status, progress, error, result_json, created_at, updated_at";

#[derive(Debug)]
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    pub fn new(path: &Path) -> AppResult<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|err| AppError::Io(err.to_string()))?;
        }
        let conn = Connection::open(path).map_err(AppError::from)?;
        conn.execute_batch(SCHEMA_SQL).map_err(AppError::from)?;

        let db = Self {
            conn: Mutex::new(conn),
        };

        db.ensure_default_settings()?;

        Ok(db)
    }

    fn lock(&self) -> AppResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| AppError::Internal("database mutex poisoned".to_string()))
    }

    // ─── Profiles ───────────────────────────────────────────────────────────

    pub fn upsert_profile(
        &self,
        user_id: &str,
        name: Option<&str>,
        email: Option<&str>,
        image: Option<&str>,
    ) -> AppResult<UserProfile> {
        let now = Utc::now();
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO users (id, name, email, image, created_at) VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(id) DO UPDATE SET
               name = COALESCE(excluded.name, users.name),
               email = COALESCE(excluded.email, users.email),
               image = COALESCE(excluded.image, users.image)",
            params![user_id, name, email, image, now.to_rfc3339()],
        )?;
        conn.query_row(
            "SELECT id, name, email, image, created_at FROM users WHERE id = ?1",
            [user_id],
            parse_profile_row,
        )
        .map_err(AppError::from)
    }

    pub fn get_profile(&self, user_id: &str) -> AppResult<Option<UserProfile>> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT id, name, email, image, created_at FROM users WHERE id = ?1",
            [user_id],
            parse_profile_row,
        )
        .optional()
        .map_err(AppError::from)
    }

    // ─── Sessions ───────────────────────────────────────────────────────────

    pub fn insert_session(&self, owner_id: Option<&str>, title: &str) -> AppResult<SessionRecord> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO sessions (id, owner_id, title, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![id, owner_id, title, now.to_rfc3339()],
        )?;
        Ok(SessionRecord {
            id,
            owner_id: owner_id.map(ToString::to_string),
            title: title.to_string(),
            created_at: now,
        })
    }

    pub fn get_session(&self, session_id: &str) -> AppResult<Option<SessionRecord>> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT id, owner_id, title, created_at FROM sessions WHERE id = ?1",
            [session_id],
            parse_session_row,
        )
        .optional()
        .map_err(AppError::from)
    }

    pub fn list_sessions_by_owner(&self, owner_id: &str, limit: u32) -> AppResult<Vec<SessionRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, owner_id, title, created_at FROM sessions
             WHERE owner_id = ?1
             ORDER BY created_at DESC, rowid DESC
             LIMIT ?2",
        )?;
        let rows = stmt
            .query_map(params![owner_id, limit], parse_session_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn update_session_title(&self, session_id: &str, title: &str) -> AppResult<bool> {
        let conn = self.lock()?;
        let changed = conn.execute(
            "UPDATE sessions SET title = ?1 WHERE id = ?2",
            params![title, session_id],
        )?;
        Ok(changed > 0)
    }

    /// Deletes every node of the session, then the session itself. Returns the
    /// number of nodes removed.
    pub fn delete_session_cascade(&self, session_id: &str) -> AppResult<usize> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let node_ids = {
            let mut stmt = tx.prepare("SELECT id FROM nodes WHERE session_id = ?1")?;
            let ids = stmt
                .query_map([session_id], |row| row.get::<_, String>(0))?
                .collect::<Result<Vec<_>, _>>()?;
            ids
        };
        for node_id in &node_ids {
            tx.execute("DELETE FROM nodes WHERE id = ?1", [node_id])?;
        }
        tx.execute("DELETE FROM sessions WHERE id = ?1", [session_id])?;
        tx.commit()?;
        Ok(node_ids.len())
    }

    // ─── Nodes ──────────────────────────────────────────────────────────────

    pub fn insert_node(
        &self,
        session_id: &str,
        title: &str,
        content: &str,
        kind: NodeKind,
    ) -> AppResult<NodeRecord> {
        let conn = self.lock()?;
        ensure_session_exists(&conn, session_id)?;
        insert_node_row(&conn, session_id, title, content, kind)
    }

    /// Appends all drafts in order inside one transaction.
    pub fn insert_nodes(&self, session_id: &str, drafts: &[(NodeDraft, NodeKind)]) -> AppResult<Vec<NodeRecord>> {
        let mut conn = self.lock()?;
        ensure_session_exists(&conn, session_id)?;
        let tx = conn.transaction()?;
        let mut records = Vec::with_capacity(drafts.len());
        for (draft, kind) in drafts {
            records.push(insert_node_row(&tx, session_id, &draft.title, &draft.content, *kind)?);
        }
        tx.commit()?;
        Ok(records)
    }

    pub fn get_node(&self, node_id: &str) -> AppResult<Option<NodeRecord>> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT id, session_id, title, content, kind, created_at FROM nodes WHERE id = ?1",
            [node_id],
            parse_node_row,
        )
        .optional()
        .map_err(AppError::from)
    }

    pub fn list_nodes(&self, session_id: &str) -> AppResult<Vec<NodeRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, session_id, title, content, kind, created_at FROM nodes
             WHERE session_id = ?1 ORDER BY seq ASC",
        )?;
        let rows = stmt
            .query_map([session_id], parse_node_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn update_node(&self, node_id: &str, title: &str, content: &str) -> AppResult<bool> {
        let conn = self.lock()?;
        let changed = conn.execute(
            "UPDATE nodes SET title = ?1, content = ?2 WHERE id = ?3",
            params![title, content, node_id],
        )?;
        Ok(changed > 0)
    }

    pub fn update_node_title(&self, node_id: &str, title: &str) -> AppResult<bool> {
        let conn = self.lock()?;
        let changed = conn.execute("UPDATE nodes SET title = ?1 WHERE id = ?2", params![title, node_id])?;
        Ok(changed > 0)
    }

    pub fn delete_node(&self, node_id: &str) -> AppResult<bool> {
        let conn = self.lock()?;
        let changed = conn.execute("DELETE FROM nodes WHERE id = ?1", [node_id])?;
        Ok(changed > 0)
    }

    // ─── Jobs ───────────────────────────────────────────────────────────────

    pub fn insert_job(&self, session_id: Option<&str>, kind: JobKind) -> AppResult<JobRecord> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO jobs (id, session_id, kind, status, progress, error, result_json, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, NULL, NULL, NULL, ?5, ?5)",
            params![
                id,
                session_id,
                kind.as_str(),
                JobStatus::Pending.as_str(),
                now.to_rfc3339()
            ],
        )?;
        Ok(JobRecord {
            id,
            session_id: session_id.map(ToString::to_string),
            kind,
            status: JobStatus::Pending,
            progress: None,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn get_job(&self, job_id: &str) -> AppResult<Option<JobRecord>> {
        let conn = self.lock()?;
        select_job(&conn, job_id)
    }

    pub fn list_jobs_for_session(&self, session_id: &str) -> AppResult<Vec<JobRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {JOB_COLUMNS} FROM jobs WHERE session_id = ?1 ORDER BY created_at DESC, rowid DESC"
        ))?;
        let rows = stmt
            .query_map([session_id], parse_job_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Moves a job to `next` if the current status allows it. The read and the
    /// write happen under the same connection lock.
    pub fn transition_job(&self, job_id: &str, next: &JobStatus) -> AppResult<JobRecord> {
        let conn = self.lock()?;
        let current = select_job(&conn, job_id)?
            .ok_or_else(|| AppError::NotFound(format!("Job {} not found", job_id)))?;
        if !current.status.can_transition_to(next) {
            return Err(AppError::InvalidTransition(format!(
                "job {} cannot move from {} to {}",
                job_id,
                current.status.as_str(),
                next.as_str()
            )));
        }

        let now = Utc::now();
        let (error, result_json) = match next {
            JobStatus::Failed { error } => (Some(error.clone()), None),
            JobStatus::Completed { result } => (None, Some(serde_json::to_string(result)?)),
            _ => (None, None),
        };
        let progress = match next {
            JobStatus::Completed { .. } => Some(100u8),
            _ => current.progress,
        };
        conn.execute(
            "UPDATE jobs SET status = ?1, progress = ?2, error = ?3, result_json = ?4, updated_at = ?5 WHERE id = ?6",
            params![next.as_str(), progress, error, result_json, now.to_rfc3339(), job_id],
        )?;

        Ok(JobRecord {
            status: next.clone(),
            progress,
            updated_at: now,
            ..current
        })
    }

    pub fn update_job_progress(&self, job_id: &str, progress: u8) -> AppResult<Option<JobRecord>> {
        let conn = self.lock()?;
        let changed = conn.execute(
            "UPDATE jobs SET progress = ?1, updated_at = ?2 WHERE id = ?3 AND status = 'in_progress'",
            params![progress.min(100), Utc::now().to_rfc3339(), job_id],
        )?;
        if changed == 0 {
            return Ok(None);
        }
        select_job(&conn, job_id)
    }

    /// Jobs left pending or in progress by a previous process can never finish.
    pub fn mark_orphan_jobs_failed(&self) -> AppResult<u64> {
        let conn = self.lock()?;
        let changed = conn.execute(
            "UPDATE jobs
             SET status = 'failed', error = 'Interrupted by application restart', updated_at = ?1
             WHERE status IN ('pending', 'in_progress')",
            [Utc::now().to_rfc3339()],
        )?;
        Ok(changed as u64)
    }

    // ─── Settings ───────────────────────────────────────────────────────────

    pub fn get_settings(&self) -> AppResult<AppSettings> {
        let conn = self.lock()?;
        let raw = conn
            .query_row(
                "SELECT value_json FROM settings WHERE key = 'app'",
                [],
                |row| row.get::<_, String>(0),
            )
            .optional()?;

        match raw {
            Some(raw) => Ok(serde_json::from_str::<AppSettings>(&raw).unwrap_or_default()),
            None => Ok(AppSettings::default()),
        }
    }

    /// Current settings with `update` merged on top, without saving.
    pub fn merged_settings(&self, update: serde_json::Value) -> AppResult<AppSettings> {
        let current = self.get_settings()?;
        let mut merged = serde_json::to_value(current)?;
        merge_json(&mut merged, update);
        serde_json::from_value(merged)
            .map_err(|error| AppError::InvalidInput(format!("Invalid settings update: {}", error)))
    }

    pub fn save_settings(&self, settings: &AppSettings) -> AppResult<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO settings (key, value_json, updated_at)
             VALUES ('app', ?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json, updated_at = excluded.updated_at",
            params![serde_json::to_string(settings)?, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    fn ensure_default_settings(&self) -> AppResult<()> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row("SELECT COUNT(1) FROM settings WHERE key = 'app'", [], |row| row.get(0))?;
        if count == 0 {
            conn.execute(
                "INSERT INTO settings (key, value_json, updated_at) VALUES ('app', ?1, ?2)",
                params![
                    serde_json::to_string(&AppSettings::default())?,
                    Utc::now().to_rfc3339()
                ],
            )?;
        }
        Ok(())
    }
}

fn ensure_session_exists(conn: &Connection, session_id: &str) -> AppResult<()> {
    let exists: i64 = conn.query_row(
        "SELECT COUNT(1) FROM sessions WHERE id = ?1",
        [session_id],
        |row| row.get(0),
    )?;
    if exists == 0 {
        return Err(AppError::NotFound(format!("Session {} not found", session_id)));
    }
    Ok(())
}

fn insert_node_row(
    conn: &Connection,
    session_id: &str,
    title: &str,
    content: &str,
    kind: NodeKind,
) -> AppResult<NodeRecord> {
    let id = Uuid::new_v4().to_string();
    let now = Utc::now();
    let seq: i64 = conn.query_row(
        "SELECT COALESCE(MAX(seq), 0) + 1 FROM nodes WHERE session_id = ?1",
        [session_id],
        |row| row.get(0),
    )?;
    conn.execute(
        "INSERT INTO nodes (id, session_id, seq, title, content, kind, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![id, session_id, seq, title, content, kind.as_str(), now.to_rfc3339()],
    )?;
    Ok(NodeRecord {
        id,
        session_id: session_id.to_string(),
        title: title.to_string(),
        content: content.to_string(),
        kind,
        created_at: now,
    })
}

fn select_job(conn: &Connection, job_id: &str) -> AppResult<Option<JobRecord>> {
    conn.query_row(
        &format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = ?1"),
        [job_id],
        parse_job_row,
    )
    .optional()
    .map_err(AppError::from)
}

fn parse_profile_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<UserProfile> {
    Ok(UserProfile {
        id: row.get(0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        image: row.get(3)?,
        created_at: parse_time(&row.get::<_, String>(4)?)?,
    })
}

fn parse_session_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<SessionRecord> {
    Ok(SessionRecord {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        title: row.get(2)?,
        created_at: parse_time(&row.get::<_, String>(3)?)?,
    })
}

fn parse_node_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<NodeRecord> {
    Ok(NodeRecord {
        id: row.get(0)?,
        session_id: row.get(1)?,
        title: row.get(2)?,
        content: row.get(3)?,
        kind: parse_node_kind(&row.get::<_, String>(4)?)?,
        created_at: parse_time(&row.get::<_, String>(5)?)?,
    })
}

fn parse_job_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<JobRecord> {
    let status_raw: String = row.get(3)?;
    let error: Option<String> = row.get(5)?;
    let result_raw: Option<String> = row.get(6)?;
    let status = match status_raw.as_str() {
        "pending" => JobStatus::Pending,
        "in_progress" => JobStatus::InProgress,
        "completed" => JobStatus::Completed {
            result: result_raw
                .as_deref()
                .and_then(|raw| serde_json::from_str(raw).ok())
                .unwrap_or(serde_json::Value::Null),
        },
        "failed" => JobStatus::Failed {
            error: error.unwrap_or_else(|| "Unknown error".to_string()),
        },
        "cancelled" => JobStatus::Cancelled,
        other => return Err(invalid_text(format!("unknown job status {}", other))),
    };
    Ok(JobRecord {
        id: row.get(0)?,
        session_id: row.get(1)?,
        kind: parse_job_kind(&row.get::<_, String>(2)?)?,
        status,
        progress: row.get::<_, Option<i64>>(4)?.map(|value| value.clamp(0, 100) as u8),
        created_at: parse_time(&row.get::<_, String>(7)?)?,
        updated_at: parse_time(&row.get::<_, String>(8)?)?,
    })
}

fn parse_node_kind(raw: &str) -> rusqlite::Result<NodeKind> {
    match raw {
        "initial" => Ok(NodeKind::Initial),
        "user" => Ok(NodeKind::User),
        "expansion" => Ok(NodeKind::Expansion),
        "blueprint" => Ok(NodeKind::Blueprint),
        _ => Err(invalid_text(format!("unknown node kind {}", raw))),
    }
}

fn parse_job_kind(raw: &str) -> rusqlite::Result<JobKind> {
    match raw {
        "generate_next" => Ok(JobKind::GenerateNext),
        "remix_blueprint" => Ok(JobKind::RemixBlueprint),
        "structure_import" => Ok(JobKind::StructureImport),
        _ => Err(invalid_text(format!("unknown job kind {}", raw))),
    }
}

fn invalid_text(message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        0,
        rusqlite::types::Type::Text,
        Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, message)),
    )
}

fn parse_time(raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|error| invalid_text(error.to_string()))
}

fn merge_json(target: &mut serde_json::Value, update: serde_json::Value) {
    match (target, update) {
        (serde_json::Value::Object(target_map), serde_json::Value::Object(update_map)) => {
            for (key, value) in update_map {
                merge_json(target_map.entry(key).or_insert(serde_json::Value::Null), value);
            }
        }
        (target, update) => {
            *target = update;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Database;
    use crate::errors::AppError;
    use crate::models::{AppSettings, JobKind, JobStatus, NodeDraft, NodeKind};

    fn open() -> (tempfile::TempDir, Database) {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = Database::new(&dir.path().join("test.db")).expect("db");
        (dir, db)
    }

    #[test]
    fn nodes_come_back_in_insertion_order() {
        let (_dir, db) = open();
        let session = db.insert_session(Some("user-1"), "Ordering").expect("session");
        for index in 0..5 {
            db.insert_node(&session.id, &format!("Node {}", index), "body", NodeKind::User)
                .expect("insert node");
        }
        let titles = db
            .list_nodes(&session.id)
            .expect("list nodes")
            .into_iter()
            .map(|node| node.title)
            .collect::<Vec<_>>();
        assert_eq!(titles, vec!["Node 0", "Node 1", "Node 2", "Node 3", "Node 4"]);
    }

    #[test]
    fn inserting_into_missing_session_is_rejected() {
        let (_dir, db) = open();
        let err = db
            .insert_node("missing", "Title", "Body", NodeKind::User)
            .expect_err("missing session");
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[test]
    fn delete_session_cascades_to_nodes() {
        let (_dir, db) = open();
        let doomed = db.insert_session(Some("user-1"), "Doomed").expect("session");
        let kept = db.insert_session(Some("user-1"), "Kept").expect("session");
        db.insert_nodes(
            &doomed.id,
            &[
                (
                    NodeDraft {
                        title: "A".to_string(),
                        content: "a".to_string(),
                    },
                    NodeKind::Initial,
                ),
                (
                    NodeDraft {
                        title: "B".to_string(),
                        content: "b".to_string(),
                    },
                    NodeKind::User,
                ),
            ],
        )
        .expect("insert nodes");
        db.insert_node(&kept.id, "C", "c", NodeKind::Initial).expect("insert node");

        let removed = db.delete_session_cascade(&doomed.id).expect("delete");
        assert_eq!(removed, 2);
        assert!(db.list_nodes(&doomed.id).expect("list").is_empty());
        assert!(db.get_session(&doomed.id).expect("get").is_none());
        assert_eq!(db.list_nodes(&kept.id).expect("list").len(), 1);
    }

    #[test]
    fn sessions_list_newest_first_and_respects_limit() {
        let (_dir, db) = open();
        let first = db.insert_session(Some("user-1"), "First").expect("session");
        let second = db.insert_session(Some("user-1"), "Second").expect("session");
        db.insert_session(Some("user-2"), "Other").expect("session");

        let listed = db.list_sessions_by_owner("user-1", 10).expect("list");
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, second.id);
        assert_eq!(listed[1].id, first.id);

        let limited = db.list_sessions_by_owner("user-1", 1).expect("list");
        assert_eq!(limited.len(), 1);
    }

    #[test]
    fn job_transitions_follow_lifecycle_and_terminal_is_final() {
        let (_dir, db) = open();
        let job = db.insert_job(None, JobKind::StructureImport).expect("job");
        assert_eq!(job.status, JobStatus::Pending);

        let started = db.transition_job(&job.id, &JobStatus::InProgress).expect("start");
        assert_eq!(started.status, JobStatus::InProgress);

        let result = serde_json::json!([{"title": "A", "content": "a"}]);
        let done = db
            .transition_job(&job.id, &JobStatus::Completed { result: result.clone() })
            .expect("complete");
        assert_eq!(done.progress, Some(100));

        let err = db
            .transition_job(
                &job.id,
                &JobStatus::Failed {
                    error: "late failure".to_string(),
                },
            )
            .expect_err("terminal job must not change");
        assert!(matches!(err, AppError::InvalidTransition(_)));

        let stored = db.get_job(&job.id).expect("get").expect("job exists");
        assert_eq!(stored.status, JobStatus::Completed { result });
    }

    #[test]
    fn progress_only_updates_running_jobs() {
        let (_dir, db) = open();
        let job = db.insert_job(None, JobKind::GenerateNext).expect("job");
        assert!(db.update_job_progress(&job.id, 50).expect("progress").is_none());
        db.transition_job(&job.id, &JobStatus::InProgress).expect("start");
        let updated = db.update_job_progress(&job.id, 50).expect("progress").expect("running");
        assert_eq!(updated.progress, Some(50));
    }

    #[test]
    fn orphaned_jobs_are_failed_on_startup() {
        let (_dir, db) = open();
        let pending = db.insert_job(None, JobKind::GenerateNext).expect("job");
        let running = db.insert_job(None, JobKind::RemixBlueprint).expect("job");
        db.transition_job(&running.id, &JobStatus::InProgress).expect("start");

        assert_eq!(db.mark_orphan_jobs_failed().expect("mark"), 2);
        for id in [&pending.id, &running.id] {
            let job = db.get_job(id).expect("get").expect("exists");
            assert!(matches!(job.status, JobStatus::Failed { .. }));
        }
    }

    #[test]
    fn settings_merge_partial_updates() {
        let (_dir, db) = open();
        let updated = db
            .merged_settings(serde_json::json!({ "model": "gemini-2.0-flash", "maxConcurrentJobs": 2 }))
            .expect("merge");
        assert_eq!(db.get_settings().expect("get").model, AppSettings::default().model);
        db.save_settings(&updated).expect("save");
        assert_eq!(updated.model, "gemini-2.0-flash");
        assert_eq!(updated.max_concurrent_jobs, 2);
        assert_eq!(updated.import_char_limit, 30_000);
        assert_eq!(db.get_settings().expect("get").model, "gemini-2.0-flash");
    }

    #[test]
    fn profile_upsert_keeps_existing_fields() {
        let (_dir, db) = open();
        db.upsert_profile("user-1", Some("Ada"), Some("ada@example.com"), None)
            .expect("upsert");
        let again = db.upsert_profile("user-1", None, None, Some("https://img")).expect("upsert");
        assert_eq!(again.name.as_deref(), Some("Ada"));
        assert_eq!(again.image.as_deref(), Some("https://img"));
        assert!(db.get_profile("user-2").expect("get").is_none());
    }
}

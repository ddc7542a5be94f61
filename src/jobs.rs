use crate::db::Database;
use crate::errors::{AppError, AppResult};
use crate::models::{JobKind, JobRecord, JobStatus};
use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, MutexGuard};
use tokio::sync::watch;

/// Tracks the lifecycle of asynchronous AI jobs.
///
/// Every status change goes through [`JobTracker::transition`], which refuses
/// moves the lifecycle does not allow and then publishes the new record to any
/// subscribers of that job.
#[derive(Clone)]
pub struct JobTracker {
    db: Arc<Database>,
    watchers: Arc<StdMutex<HashMap<String, watch::Sender<JobRecord>>>>,
}

impl JobTracker {
    pub fn new(db: Arc<Database>) -> Self {
        Self {
            db,
            watchers: Arc::new(StdMutex::new(HashMap::new())),
        }
    }

    pub fn create(&self, session_id: Option<&str>, kind: JobKind) -> AppResult<JobRecord> {
        let record = self.db.insert_job(session_id, kind)?;
        tracing::debug!(job_id = %record.id, kind = kind.as_str(), "job created");
        Ok(record)
    }

    pub fn get(&self, job_id: &str) -> AppResult<Option<JobRecord>> {
        self.db.get_job(job_id)
    }

    pub fn list_for_session(&self, session_id: &str) -> AppResult<Vec<JobRecord>> {
        self.db.list_jobs_for_session(session_id)
    }

    pub fn transition(&self, job_id: &str, next: JobStatus) -> AppResult<JobRecord> {
        let record = self.db.transition_job(job_id, &next)?;
        match &record.status {
            JobStatus::Failed { error } => {
                tracing::warn!(job_id = %job_id, error = %error, "job failed");
            }
            status => {
                tracing::info!(job_id = %job_id, status = status.as_str(), "job status changed");
            }
        }
        self.publish(&record)?;
        Ok(record)
    }

    pub fn set_progress(&self, job_id: &str, progress: u8) -> AppResult<()> {
        if let Some(record) = self.db.update_job_progress(job_id, progress)? {
            self.publish(&record)?;
        }
        Ok(())
    }

    pub fn subscribe(&self, job_id: &str) -> AppResult<watch::Receiver<JobRecord>> {
        let mut watchers = self.watchers()?;
        if let Some(sender) = watchers.get(job_id) {
            return Ok(sender.subscribe());
        }

        let record = self
            .db
            .get_job(job_id)?
            .ok_or_else(|| AppError::NotFound(format!("Job {} not found", job_id)))?;
        let terminal = record.status.is_terminal();
        let (sender, receiver) = watch::channel(record);
        if !terminal {
            watchers.insert(job_id.to_string(), sender);
        }
        Ok(receiver)
    }

    pub async fn wait_for_terminal(&self, job_id: &str) -> AppResult<JobRecord> {
        let mut receiver = self.subscribe(job_id)?;
        loop {
            {
                let current = receiver.borrow_and_update();
                if current.status.is_terminal() {
                    return Ok(current.clone());
                }
            }
            if receiver.changed().await.is_err() {
                return self
                    .db
                    .get_job(job_id)?
                    .ok_or_else(|| AppError::NotFound(format!("Job {} not found", job_id)));
            }
        }
    }

    fn publish(&self, record: &JobRecord) -> AppResult<()> {
        let mut watchers = self.watchers()?;
        if let Some(sender) = watchers.get(&record.id) {
            sender.send_replace(record.clone());
        }
        if record.status.is_terminal() {
            watchers.remove(&record.id);
        }
        Ok(())
    }

    fn watchers(&self) -> AppResult<MutexGuard<'_, HashMap<String, watch::Sender<JobRecord>>>> {
        self.watchers
            .lock()
            .map_err(|_| AppError::Internal("job watcher mutex poisoned".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::JobTracker;
    use crate::db::Database;
    use crate::errors::AppError;
    use crate::models::{JobKind, JobStatus};
    use std::sync::Arc;
    use std::time::Duration;

    fn tracker() -> (tempfile::TempDir, JobTracker) {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = Arc::new(Database::new(&dir.path().join("jobs.db")).expect("db"));
        (dir, JobTracker::new(db))
    }

    #[tokio::test]
    async fn waiter_sees_completion_published_later() {
        let (_dir, tracker) = tracker();
        let job = tracker.create(Some("session-1"), JobKind::GenerateNext).expect("create");

        let waiter = {
            let tracker = tracker.clone();
            let job_id = job.id.clone();
            tokio::spawn(async move { tracker.wait_for_terminal(&job_id).await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        tracker.transition(&job.id, JobStatus::InProgress).expect("start");
        tracker
            .transition(
                &job.id,
                JobStatus::Completed {
                    result: serde_json::json!({"title": "Solution"}),
                },
            )
            .expect("complete");

        let finished = tokio::time::timeout(Duration::from_secs(2), waiter)
            .await
            .expect("waiter finished in time")
            .expect("join")
            .expect("wait result");
        assert_eq!(finished.status.as_str(), "completed");
    }

    #[tokio::test]
    async fn subscribing_to_finished_job_returns_terminal_record() {
        let (_dir, tracker) = tracker();
        let job = tracker.create(None, JobKind::StructureImport).expect("create");
        tracker.transition(&job.id, JobStatus::Cancelled).expect("cancel");

        let finished = tracker.wait_for_terminal(&job.id).await.expect("wait");
        assert_eq!(finished.status, JobStatus::Cancelled);
    }

    #[test]
    fn completed_job_cannot_be_failed_afterwards() {
        let (_dir, tracker) = tracker();
        let job = tracker.create(None, JobKind::RemixBlueprint).expect("create");
        tracker.transition(&job.id, JobStatus::InProgress).expect("start");
        tracker
            .transition(
                &job.id,
                JobStatus::Completed {
                    result: serde_json::json!([]),
                },
            )
            .expect("complete");

        let err = tracker
            .transition(
                &job.id,
                JobStatus::Failed {
                    error: "late".to_string(),
                },
            )
            .expect_err("terminal");
        assert!(matches!(err, AppError::InvalidTransition(_)));
        let stored = tracker.get(&job.id).expect("get").expect("exists");
        assert_eq!(stored.status.as_str(), "completed");
    }

    #[test]
    fn unknown_job_is_not_found() {
        let (_dir, tracker) = tracker();
        assert!(tracker.get("nope").expect("get").is_none());
        assert!(matches!(tracker.subscribe("nope"), Err(AppError::NotFound(_))));
    }
}

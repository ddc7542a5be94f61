//! Client-side state over [`RunnerCore`].
//!
//! Signed-in users work against the store: the active session, its nodes and
//! the AI job currently in flight. Anonymous users get an in-memory chain that
//! is never persisted and has no AI features.

use crate::errors::{AppError, AppResult};
use crate::export::{self, ExportFormat};
use crate::models::{
    AddNodePayload, Caller, JobRecord, JobStatus, NodeKind, NodeRecord, SessionRecord, UpdateNodePayload,
    NEW_NODE_CONTENT, NEW_NODE_TITLE, NEW_SESSION_TITLE, SEED_NODE_CONTENT, SEED_NODE_TITLE,
};
use crate::runner::RunnerCore;
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::watch;
use uuid::Uuid;

const LOCAL_SESSION_ID: &str = "local";

struct ActiveJob {
    job_id: String,
    updates: watch::Receiver<JobRecord>,
}

pub struct ClientState {
    runner: Arc<RunnerCore>,
    caller: Caller,
    active_session_id: Option<String>,
    local_nodes: Vec<NodeRecord>,
    active_job: Option<ActiveJob>,
    loading: bool,
    error: Option<String>,
}

impl ClientState {
    pub fn new(runner: Arc<RunnerCore>, caller: Caller) -> Self {
        Self {
            runner,
            caller,
            active_session_id: None,
            local_nodes: vec![local_node(SEED_NODE_TITLE, SEED_NODE_CONTENT, NodeKind::Initial)],
            active_job: None,
            loading: false,
            error: None,
        }
    }

    pub fn caller(&self) -> &Caller {
        &self.caller
    }

    pub fn active_session_id(&self) -> Option<&str> {
        self.active_session_id.as_deref()
    }

    pub fn active_job_id(&self) -> Option<&str> {
        self.active_job.as_ref().map(|job| job.job_id.as_str())
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn dismiss_error(&mut self) {
        self.error = None;
    }

    /// Sign-in or sign-out. Drops everything tied to the previous identity.
    pub fn set_caller(&mut self, caller: Caller) {
        if caller == self.caller {
            return;
        }
        self.caller = caller;
        self.active_session_id = None;
        self.active_job = None;
        self.loading = false;
    }

    /// Picks the newest session of a signed-in user, creating one when the
    /// user has none yet.
    pub fn sync_sessions(&mut self) -> AppResult<()> {
        if !self.caller.is_authenticated() || self.active_session_id.is_some() {
            return Ok(());
        }
        let session = match self.runner.list_sessions(&self.caller, None)?.into_iter().next() {
            Some(session) => session,
            None => self.runner.create_session(&self.caller, Some(NEW_SESSION_TITLE))?,
        };
        tracing::debug!(session_id = %session.id, "active session selected");
        self.active_session_id = Some(session.id);
        Ok(())
    }

    pub fn sessions(&self) -> AppResult<Vec<SessionRecord>> {
        self.runner.list_sessions(&self.caller, None)
    }

    pub fn nodes(&self) -> AppResult<Vec<NodeRecord>> {
        match self.stored_session() {
            Some(session_id) => self.runner.list_nodes(session_id),
            None => Ok(self.local_nodes.clone()),
        }
    }

    pub fn add_node(&mut self, title: &str, content: &str, kind: NodeKind) -> AppResult<NodeRecord> {
        if let Some(session_id) = self.stored_session().map(ToString::to_string) {
            return self.runner.add_node(
                &self.caller,
                AddNodePayload {
                    session_id,
                    title: title.to_string(),
                    content: content.to_string(),
                    kind,
                },
            );
        }
        let node = local_node(title, content, kind);
        self.local_nodes.push(node.clone());
        Ok(node)
    }

    pub fn add_manual_node(&mut self) -> AppResult<NodeRecord> {
        self.add_node(NEW_NODE_TITLE, NEW_NODE_CONTENT, NodeKind::User)
    }

    /// Saves an edit and, for signed-in users, kicks off auto-titling when the
    /// node or its session still carries a placeholder title.
    pub fn update_node(&mut self, node_id: &str, title: &str, content: &str) -> AppResult<()> {
        if self.stored_session().is_none() {
            let node = self
                .local_nodes
                .iter_mut()
                .find(|node| node.id == node_id)
                .ok_or_else(|| AppError::NotFound(format!("Node {} not found", node_id)))?;
            node.title = title.to_string();
            node.content = content.to_string();
            return Ok(());
        }

        let first_node_id = self.nodes()?.first().map(|node| node.id.clone());
        self.runner.update_node(
            &self.caller,
            UpdateNodePayload {
                node_id: node_id.to_string(),
                title: title.to_string(),
                content: content.to_string(),
            },
        )?;

        let min_chars = self.runner.get_settings()?.title_trigger_min_chars;
        let long_enough = content.chars().count() > min_chars;

        if long_enough && (title.is_empty() || title == NEW_NODE_TITLE) {
            if let Err(error) = self.runner.start_generate_node_title(&self.caller, node_id, content) {
                tracing::warn!(node_id = %node_id, error = %error, "could not start node title generation");
            }
        }

        if long_enough && first_node_id.as_deref() == Some(node_id) {
            if let Some(session_id) = self.active_session_id.clone() {
                let placeholder = self
                    .runner
                    .get_session(&session_id)?
                    .is_some_and(|session| session.title == NEW_SESSION_TITLE);
                if placeholder {
                    if let Err(error) = self
                        .runner
                        .start_generate_session_title(&self.caller, &session_id, content)
                    {
                        tracing::warn!(session_id = %session_id, error = %error, "could not start session title generation");
                    }
                }
            }
        }
        Ok(())
    }

    pub fn delete_node(&mut self, node_id: &str) -> AppResult<bool> {
        if self.stored_session().is_none() {
            let before = self.local_nodes.len();
            self.local_nodes.retain(|node| node.id != node_id);
            return Ok(self.local_nodes.len() != before);
        }
        Ok(self.runner.delete_node(&self.caller, node_id)?.success)
    }

    // ─── AI operations ──────────────────────────────────────────────────────

    pub async fn generate_next(&mut self) -> AppResult<()> {
        self.require_sign_in()?;
        let Some(session_id) = self.active_session_id.clone() else {
            return Ok(());
        };
        self.start_loading();
        match self.runner.start_generate_next(&self.caller, &session_id).await {
            Ok(started) => self.track_job(started.job_id),
            Err(error) => Err(self.start_failed("Failed to start generation.", error)),
        }
    }

    /// Remixes the active session into a new one and switches to it.
    pub async fn remix(&mut self, topic: &str) -> AppResult<()> {
        self.require_sign_in()?;
        let Some(session_id) = self.active_session_id.clone() else {
            return Ok(());
        };
        self.start_loading();
        match self.runner.start_remix(&self.caller, &session_id, topic).await {
            Ok(started) => {
                self.active_session_id = Some(started.session_id);
                self.track_job(started.job_id)
            }
            Err(error) => Err(self.start_failed("Failed to start remix.", error)),
        }
    }

    pub async fn import_text(&mut self, text: &str) -> AppResult<()> {
        self.require_sign_in()?;
        let Some(session_id) = self.active_session_id.clone() else {
            return Ok(());
        };
        self.start_loading();
        match self
            .runner
            .start_structure_import(&self.caller, &session_id, text)
            .await
        {
            Ok(started) => self.track_job(started.job_id),
            Err(error) => Err(self.start_failed("Failed to start import.", error)),
        }
    }

    /// Non-blocking look at the active job. Returns its latest status.
    pub fn poll_job(&mut self) -> Option<JobStatus> {
        let record = self.active_job.as_mut()?.updates.borrow_and_update().clone();
        if record.status.is_terminal() {
            self.finish_job(&record);
        }
        Some(record.status)
    }

    pub async fn wait_for_job(&mut self) -> AppResult<Option<JobStatus>> {
        let Some(job_id) = self.active_job_id().map(ToString::to_string) else {
            return Ok(None);
        };
        let record = self.runner.wait_for_job(&job_id).await?;
        self.finish_job(&record);
        Ok(Some(record.status))
    }

    /// Cancels the job in flight and leaves the loading state.
    pub async fn stop(&mut self) -> AppResult<()> {
        self.loading = false;
        if let Some(job) = self.active_job.take() {
            let cancelled = self.runner.cancel_job(&job.job_id).await?;
            tracing::info!(job_id = %job.job_id, cancelled = cancelled.success, "stop requested");
        }
        Ok(())
    }

    // ─── Sessions ───────────────────────────────────────────────────────────

    pub fn create_session(&mut self) -> AppResult<SessionRecord> {
        self.require_sign_in()?;
        let session = self.runner.create_session(&self.caller, Some(NEW_SESSION_TITLE))?;
        self.active_session_id = Some(session.id.clone());
        Ok(session)
    }

    pub fn select_session(&mut self, session_id: &str) -> AppResult<()> {
        self.require_sign_in()?;
        let session = self
            .runner
            .get_session(session_id)?
            .ok_or_else(|| AppError::NotFound(format!("Session {} not found", session_id)))?;
        self.active_session_id = Some(session.id);
        Ok(())
    }

    pub fn rename_session(&mut self, session_id: &str, title: &str) -> AppResult<SessionRecord> {
        self.runner.rename_session(&self.caller, session_id, title)
    }

    /// Deletes a session. When it was the active one, the newest remaining
    /// session (or a fresh one) becomes active.
    pub fn delete_session(&mut self, session_id: &str) -> AppResult<bool> {
        let deleted = self.runner.delete_session(&self.caller, session_id)?.success;
        if self.active_session_id.as_deref() == Some(session_id) {
            self.active_session_id = None;
            self.sync_sessions()?;
        }
        Ok(deleted)
    }

    pub fn export(&self, format: ExportFormat) -> AppResult<String> {
        export::render(&self.nodes()?, format)
    }

    // ─── Internals ──────────────────────────────────────────────────────────

    fn stored_session(&self) -> Option<&str> {
        if self.caller.is_authenticated() {
            self.active_session_id.as_deref()
        } else {
            None
        }
    }

    fn require_sign_in(&self) -> AppResult<()> {
        if self.caller.is_authenticated() {
            Ok(())
        } else {
            Err(AppError::Unauthenticated("Sign in to use AI features".to_string()))
        }
    }

    fn start_loading(&mut self) {
        self.loading = true;
        self.error = None;
    }

    fn start_failed(&mut self, message: &str, error: AppError) -> AppError {
        tracing::warn!(error = %error, "{}", message);
        self.loading = false;
        self.error = Some(message.to_string());
        error
    }

    fn track_job(&mut self, job_id: String) -> AppResult<()> {
        let updates = self.runner.subscribe_job(&job_id)?;
        self.active_job = Some(ActiveJob { job_id, updates });
        Ok(())
    }

    fn finish_job(&mut self, record: &JobRecord) {
        if self.active_job_id() != Some(record.id.as_str()) {
            return;
        }
        self.active_job = None;
        self.loading = false;
        if let JobStatus::Failed { error } = &record.status {
            self.error = Some(if error.trim().is_empty() {
                "Operation failed".to_string()
            } else {
                error.clone()
            });
        }
    }
}

fn local_node(title: &str, content: &str, kind: NodeKind) -> NodeRecord {
    NodeRecord {
        id: Uuid::new_v4().to_string(),
        session_id: LOCAL_SESSION_ID.to_string(),
        title: title.to_string(),
        content: content.to_string(),
        kind,
        created_at: Utc::now(),
    }
}

use crate::db::Database;
use crate::errors::{AppError, AppResult};
use crate::export::{self, ExportFormat};
use crate::jobs::JobTracker;
use crate::models::{
    AddNodePayload, AppSettings, BooleanResponse, Caller, ExportResponse, JobKind, JobRecord, JobStatus, NodeDraft,
    NodeKind, NodeRecord, SessionRecord, StartJobResponse, StartRemixResponse, UpdateNodePayload, UserProfile,
    DEFAULT_SESSION_TITLE,
};
use crate::policy::PolicyEngine;
use crate::prompt;
use crate::provider::{gemini, structured_output, ModelProvider, ModelRequest, OutputSchema};
use crate::redaction::Redactor;
use crate::scheduler::{ExecutorFuture, ScheduledJob, Scheduler};
use chrono::Utc;
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;

const DATABASE_FILE: &str = "ideanodes.sqlite";

/// Work captured at dispatch and carried to the executor.
#[derive(Debug, Clone)]
enum JobWork {
    GenerateNext {
        session_id: String,
    },
    Remix {
        session_id: String,
        topic: String,
        source: Vec<NodeDraft>,
    },
    StructureImport {
        session_id: String,
        text: String,
    },
}

impl JobWork {
    fn session_id(&self) -> &str {
        match self {
            Self::GenerateNext { session_id }
            | Self::Remix { session_id, .. }
            | Self::StructureImport { session_id, .. } => session_id,
        }
    }

    fn schema(&self) -> OutputSchema {
        match self {
            Self::GenerateNext { .. } => OutputSchema::Node,
            Self::Remix { .. } | Self::StructureImport { .. } => OutputSchema::NodeList,
        }
    }
}

struct PendingJob {
    work: JobWork,
    cancel: CancellationToken,
}

#[derive(Clone)]
pub struct RunnerCore {
    db: Arc<Database>,
    jobs: JobTracker,
    scheduler: Scheduler,
    policy: PolicyEngine,
    redactor: Arc<RwLock<Redactor>>,
    provider: Arc<dyn ModelProvider>,
    pending_jobs: Arc<Mutex<HashMap<String, PendingJob>>>,
    active_jobs: Arc<Mutex<HashMap<String, CancellationToken>>>,
    keyring_lock: Arc<Mutex<()>>,
    app_data_dir: PathBuf,
}

impl RunnerCore {
    pub fn new(app_data_dir: PathBuf, provider: Arc<dyn ModelProvider>) -> AppResult<Arc<Self>> {
        let db = Arc::new(Database::new(&app_data_dir.join(DATABASE_FILE))?);
        let settings = db.get_settings()?;
        provider.apply_settings(&settings)?;
        let scheduler = Scheduler::new(settings.max_concurrent_jobs, 1, settings.max_queue_size);

        let this = Arc::new(Self {
            jobs: JobTracker::new(db.clone()),
            db,
            scheduler: scheduler.clone(),
            policy: PolicyEngine::new(),
            redactor: Arc::new(RwLock::new(Redactor::new(settings.redact_aggressive))),
            provider,
            pending_jobs: Arc::new(Mutex::new(HashMap::new())),
            active_jobs: Arc::new(Mutex::new(HashMap::new())),
            keyring_lock: Arc::new(Mutex::new(())),
            app_data_dir,
        });

        match this.db.mark_orphan_jobs_failed() {
            Ok(interrupted) if interrupted > 0 => {
                tracing::warn!(count = interrupted, "marked orphaned jobs as failed on startup");
            }
            Ok(_) => {}
            Err(error) => tracing::warn!(error = %error, "failed to sweep orphaned jobs"),
        }

        let weak = Arc::downgrade(&this);
        scheduler.set_executor(Arc::new(move |job_id: String| -> ExecutorFuture {
            let weak = weak.clone();
            Box::pin(async move {
                if let Some(strong) = weak.upgrade() {
                    strong.execute_queued_job(job_id).await
                } else {
                    true
                }
            })
        }));

        Ok(this)
    }

    /// Builds a runner backed by Gemini. The API key is read from the
    /// environment or the OS keyring on each call, so a runner can start
    /// before any key is saved.
    pub fn with_gemini(app_data_dir: PathBuf) -> AppResult<Arc<Self>> {
        let provider = gemini::GeminiProvider::from_env(gemini::DEFAULT_TIMEOUT)?;
        Self::new(app_data_dir, Arc::new(provider))
    }

    pub fn start_scheduler(&self) {
        self.scheduler.start();
    }

    // ─── AI operations ──────────────────────────────────────────────────────

    pub async fn start_generate_next(&self, caller: &Caller, session_id: &str) -> AppResult<StartJobResponse> {
        self.policy.require_authenticated(caller)?;
        self.authorized_session(caller, session_id)?;
        self.ensure_queue_capacity().await?;

        let job = self.jobs.create(Some(session_id), JobKind::GenerateNext)?;
        self.dispatch(
            &job,
            JobWork::GenerateNext {
                session_id: session_id.to_string(),
            },
        )
        .await?;
        Ok(StartJobResponse { job_id: job.id })
    }

    /// Rewrites the chain of `source_session_id` for `topic` into a new session
    /// owned by the caller. The source session is never modified.
    pub async fn start_remix(
        &self,
        caller: &Caller,
        source_session_id: &str,
        topic: &str,
    ) -> AppResult<StartRemixResponse> {
        let user_id = self.policy.require_authenticated(caller)?;
        let topic = self.policy.validate_topic(topic)?;
        self.authorized_session(caller, source_session_id)?;

        let source = self
            .db
            .list_nodes(source_session_id)?
            .into_iter()
            .map(|node| NodeDraft {
                title: node.title,
                content: node.content,
            })
            .collect::<Vec<_>>();
        if source.is_empty() {
            return Err(AppError::InvalidInput("Cannot remix an empty session".to_string()));
        }
        self.ensure_queue_capacity().await?;

        let session = self.db.insert_session(Some(user_id), &format!("Remix: {}", topic))?;
        let job = self.jobs.create(Some(&session.id), JobKind::RemixBlueprint)?;
        let dispatched = self
            .dispatch(
                &job,
                JobWork::Remix {
                    session_id: session.id.clone(),
                    topic,
                    source,
                },
            )
            .await;
        if let Err(error) = dispatched {
            // The caller never learns the new session id, so drop it.
            if let Err(cleanup) = self.db.delete_session_cascade(&session.id) {
                tracing::warn!(session_id = %session.id, error = %cleanup, "failed to remove undispatched remix session");
            }
            return Err(error);
        }
        tracing::info!(
            job_id = %job.id,
            source_session_id = %source_session_id,
            session_id = %session.id,
            "remix dispatched"
        );
        Ok(StartRemixResponse {
            job_id: job.id,
            session_id: session.id,
        })
    }

    pub async fn start_structure_import(
        &self,
        caller: &Caller,
        session_id: &str,
        text: &str,
    ) -> AppResult<StartJobResponse> {
        self.policy.require_authenticated(caller)?;
        self.policy.validate_import_text(text)?;
        self.authorized_session(caller, session_id)?;
        self.ensure_queue_capacity().await?;

        let limit = self.db.get_settings()?.import_char_limit;
        let job = self.jobs.create(Some(session_id), JobKind::StructureImport)?;
        self.dispatch(
            &job,
            JobWork::StructureImport {
                session_id: session_id.to_string(),
                text: prompt::truncate_chars(text, limit).to_string(),
            },
        )
        .await?;
        Ok(StartJobResponse { job_id: job.id })
    }

    /// Runs one queued job to a terminal state. Returns `true` when the job
    /// ended up failed.
    pub async fn execute_queued_job(&self, job_id: String) -> bool {
        let pending = {
            let mut pending_jobs = self.pending_jobs.lock().await;
            let pending = pending_jobs.remove(&job_id);
            if let Some(pending) = &pending {
                self.active_jobs
                    .lock()
                    .await
                    .insert(job_id.clone(), pending.cancel.clone());
            }
            pending
        };
        let Some(pending) = pending else {
            // Cancelled while queued.
            return false;
        };

        let outcome = self.run_job(&job_id, &pending.work, &pending.cancel).await;
        self.active_jobs.lock().await.remove(&job_id);

        let (next, failed) = match outcome {
            Ok(result) => (JobStatus::Completed { result }, false),
            Err(AppError::Cancelled(_)) => (JobStatus::Cancelled, false),
            Err(_) if pending.cancel.is_cancelled() => (JobStatus::Cancelled, false),
            Err(error) => {
                let message = self.redactor.read().await.redact_text(&error.to_string());
                (JobStatus::Failed { error: message }, true)
            }
        };
        if let Err(error) = self.jobs.transition(&job_id, next) {
            tracing::error!(job_id = %job_id, error = %error, "failed to record job outcome");
            return true;
        }
        failed
    }

    async fn run_job(&self, job_id: &str, work: &JobWork, cancel: &CancellationToken) -> AppResult<Value> {
        self.jobs.transition(job_id, JobStatus::InProgress)?;
        let settings = self.db.get_settings()?;

        let prompt = match work {
            JobWork::GenerateNext { session_id } => {
                let history = self
                    .db
                    .list_nodes(session_id)?
                    .into_iter()
                    .map(|node| NodeDraft {
                        title: node.title,
                        content: node.content,
                    })
                    .collect::<Vec<_>>();
                prompt::generate_next_prompt(&history)
            }
            JobWork::Remix { topic, source, .. } => prompt::remix_prompt(source, topic, settings.anchor_char_limit),
            JobWork::StructureImport { text, .. } => {
                prompt::structure_import_prompt(text, settings.import_char_limit)
            }
        };
        let request = ModelRequest {
            model: settings.model,
            prompt,
            schema: work.schema(),
        };

        tracing::debug!(job_id = %job_id, provider = self.provider.name(), "calling model");
        let raw = tokio::select! {
            _ = cancel.cancelled() => {
                return Err(AppError::Cancelled("Cancelled by user".to_string()));
            }
            response = self.provider.generate(&request) => response?,
        };
        self.jobs.set_progress(job_id, 50)?;

        let value = structured_output::decode(&raw, request.schema)?;
        let drafts = match work {
            JobWork::GenerateNext { .. } => vec![(structured_output::node_draft(&value)?, NodeKind::Expansion)],
            JobWork::Remix { .. } => with_kinds(structured_output::node_drafts(&value)?, NodeKind::Blueprint),
            JobWork::StructureImport { .. } => with_kinds(structured_output::node_drafts(&value)?, NodeKind::User),
        };

        {
            // Past this point the job can no longer be cancelled.
            let mut active_jobs = self.active_jobs.lock().await;
            if cancel.is_cancelled() {
                return Err(AppError::Cancelled("Cancelled by user".to_string()));
            }
            active_jobs.remove(job_id);
        }
        let written = self.db.insert_nodes(work.session_id(), &drafts)?;
        tracing::info!(job_id = %job_id, session_id = %work.session_id(), nodes = written.len(), "job wrote nodes");
        Ok(value)
    }

    /// Cancels a queued or running job. `success` is `true` only when the job
    /// will end `cancelled` without writing nodes; a job that is already
    /// writing its result, finished or unknown yields `false`.
    pub async fn cancel_job(&self, job_id: &str) -> AppResult<BooleanResponse> {
        let mut pending_jobs = self.pending_jobs.lock().await;
        let queued = pending_jobs.remove(job_id);
        if let Some(pending) = queued {
            drop(pending_jobs);
            pending.cancel.cancel();
            self.jobs.transition(job_id, JobStatus::Cancelled)?;
            return Ok(BooleanResponse { success: true });
        }

        let active_jobs = self.active_jobs.lock().await;
        drop(pending_jobs);
        match active_jobs.get(job_id) {
            Some(token) => {
                token.cancel();
                tracing::info!(job_id = %job_id, "cancellation requested for running job");
                Ok(BooleanResponse { success: true })
            }
            None => Ok(BooleanResponse { success: false }),
        }
    }

    pub fn get_job(&self, job_id: &str) -> AppResult<Option<JobRecord>> {
        self.jobs.get(job_id)
    }

    pub fn list_jobs(&self, session_id: &str) -> AppResult<Vec<JobRecord>> {
        self.jobs.list_for_session(session_id)
    }

    pub fn subscribe_job(&self, job_id: &str) -> AppResult<watch::Receiver<JobRecord>> {
        self.jobs.subscribe(job_id)
    }

    pub async fn wait_for_job(&self, job_id: &str) -> AppResult<JobRecord> {
        self.jobs.wait_for_terminal(job_id).await
    }

    // ─── Auto-titling ───────────────────────────────────────────────────────

    /// Names a session after its first idea. Best effort: failures are logged
    /// and never reach the caller.
    pub fn start_generate_session_title(
        &self,
        caller: &Caller,
        session_id: &str,
        content: &str,
    ) -> AppResult<JoinHandle<()>> {
        self.policy.require_authenticated(caller)?;
        self.authorized_session(caller, session_id)?;

        let runner = self.clone();
        let session_id = session_id.to_string();
        let prompt = prompt::session_title_prompt(content);
        Ok(tokio::spawn(async move {
            match runner.generate_title(prompt).await {
                Ok(title) => {
                    if let Err(error) = runner.db.update_session_title(&session_id, &title) {
                        tracing::warn!(session_id = %session_id, error = %error, "failed to save session title");
                    }
                }
                Err(error) => {
                    tracing::warn!(session_id = %session_id, error = %error, "session title generation failed");
                }
            }
        }))
    }

    pub fn start_generate_node_title(
        &self,
        caller: &Caller,
        node_id: &str,
        content: &str,
    ) -> AppResult<JoinHandle<()>> {
        self.policy.require_authenticated(caller)?;
        let node = self.require_node(node_id)?;
        self.authorized_session(caller, &node.session_id)?;

        let runner = self.clone();
        let node_id = node.id;
        let prompt = prompt::node_title_prompt(content);
        Ok(tokio::spawn(async move {
            match runner.generate_title(prompt).await {
                Ok(title) => {
                    if let Err(error) = runner.db.update_node_title(&node_id, &title) {
                        tracing::warn!(node_id = %node_id, error = %error, "failed to save node title");
                    }
                }
                Err(error) => {
                    tracing::warn!(node_id = %node_id, error = %error, "node title generation failed");
                }
            }
        }))
    }

    async fn generate_title(&self, prompt: String) -> AppResult<String> {
        let settings = self.db.get_settings()?;
        let request = ModelRequest {
            model: settings.model,
            prompt,
            schema: OutputSchema::Title,
        };

        let mut attempt = 0u32;
        loop {
            let result = match self.provider.generate(&request).await {
                Ok(raw) => structured_output::decode(&raw, OutputSchema::Title)
                    .and_then(|value| structured_output::title(&value)),
                Err(error) => Err(error),
            };
            match result {
                Ok(title) => return Ok(title),
                Err(error) if attempt < settings.title_retry_attempts => {
                    let backoff = settings.title_retry_backoff_ms.saturating_mul(1u64 << attempt.min(16));
                    tracing::debug!(attempt = attempt + 1, backoff_ms = backoff, error = %error, "retrying title generation");
                    tokio::time::sleep(Duration::from_millis(backoff)).await;
                    attempt += 1;
                }
                Err(error) => {
                    let message = self.redactor.read().await.redact_text(&error.to_string());
                    return Err(AppError::Provider(message));
                }
            }
        }
    }

    // ─── Sessions ───────────────────────────────────────────────────────────

    pub fn create_session(&self, caller: &Caller, title: Option<&str>) -> AppResult<SessionRecord> {
        let title = match title {
            Some(title) => self.policy.validate_title(title)?,
            None => DEFAULT_SESSION_TITLE.to_string(),
        };
        self.db.insert_session(caller.user_id.as_deref(), &title)
    }

    /// Newest first. Anonymous callers own nothing and get an empty list.
    pub fn list_sessions(&self, caller: &Caller, limit: Option<u32>) -> AppResult<Vec<SessionRecord>> {
        let Some(user_id) = caller.user_id.as_deref() else {
            return Ok(Vec::new());
        };
        let limit = match limit {
            Some(limit) => limit,
            None => self.db.get_settings()?.session_list_limit,
        };
        self.db.list_sessions_by_owner(user_id, limit)
    }

    pub fn get_session(&self, session_id: &str) -> AppResult<Option<SessionRecord>> {
        self.db.get_session(session_id)
    }

    pub fn rename_session(&self, caller: &Caller, session_id: &str, title: &str) -> AppResult<SessionRecord> {
        let title = self.policy.validate_title(title)?;
        let session = self.authorized_session(caller, session_id)?;
        self.db.update_session_title(session_id, &title)?;
        Ok(SessionRecord { title, ..session })
    }

    pub fn delete_session(&self, caller: &Caller, session_id: &str) -> AppResult<BooleanResponse> {
        let Some(session) = self.db.get_session(session_id)? else {
            return Ok(BooleanResponse { success: false });
        };
        self.policy.authorize_session(caller, &session)?;
        let removed = self.db.delete_session_cascade(session_id)?;
        tracing::info!(session_id = %session_id, nodes = removed, "session deleted");
        Ok(BooleanResponse { success: true })
    }

    // ─── Nodes ──────────────────────────────────────────────────────────────

    pub fn add_node(&self, caller: &Caller, payload: AddNodePayload) -> AppResult<NodeRecord> {
        self.authorized_session(caller, &payload.session_id)?;
        self.db
            .insert_node(&payload.session_id, &payload.title, &payload.content, payload.kind)
    }

    pub fn list_nodes(&self, session_id: &str) -> AppResult<Vec<NodeRecord>> {
        self.db.list_nodes(session_id)
    }

    pub fn update_node(&self, caller: &Caller, payload: UpdateNodePayload) -> AppResult<NodeRecord> {
        let node = self.require_node(&payload.node_id)?;
        self.authorized_session(caller, &node.session_id)?;
        self.db.update_node(&node.id, &payload.title, &payload.content)?;
        Ok(NodeRecord {
            title: payload.title,
            content: payload.content,
            ..node
        })
    }

    pub fn delete_node(&self, caller: &Caller, node_id: &str) -> AppResult<BooleanResponse> {
        let Some(node) = self.db.get_node(node_id)? else {
            return Ok(BooleanResponse { success: false });
        };
        self.authorized_session(caller, &node.session_id)?;
        Ok(BooleanResponse {
            success: self.db.delete_node(node_id)?,
        })
    }

    // ─── Profile ────────────────────────────────────────────────────────────

    /// Mirrors identity fields handed over by the auth provider.
    pub fn upsert_profile(
        &self,
        caller: &Caller,
        name: Option<&str>,
        email: Option<&str>,
        image: Option<&str>,
    ) -> AppResult<UserProfile> {
        let user_id = self.policy.require_authenticated(caller)?;
        self.db.upsert_profile(user_id, name, email, image)
    }

    pub fn get_profile(&self, caller: &Caller) -> AppResult<Option<UserProfile>> {
        match caller.user_id.as_deref() {
            Some(user_id) => self.db.get_profile(user_id),
            None => Ok(None),
        }
    }

    pub fn update_name(&self, caller: &Caller, name: &str) -> AppResult<UserProfile> {
        let user_id = self.policy.require_authenticated(caller)?;
        let name = name.trim();
        if name.is_empty() {
            return Err(AppError::InvalidInput("Name cannot be empty".to_string()));
        }
        self.db.upsert_profile(user_id, Some(name), None, None)
    }

    /// Stores the URL of an avatar that has already been uploaded.
    pub fn update_avatar(&self, caller: &Caller, image_url: &str) -> AppResult<UserProfile> {
        let user_id = self.policy.require_authenticated(caller)?;
        if image_url.trim().is_empty() {
            return Err(AppError::InvalidInput("Avatar URL cannot be empty".to_string()));
        }
        self.db.upsert_profile(user_id, None, None, Some(image_url.trim()))
    }

    // ─── Settings, export, credentials ──────────────────────────────────────

    pub fn get_settings(&self) -> AppResult<AppSettings> {
        self.db.get_settings()
    }

    pub async fn update_settings(&self, update: Value) -> AppResult<AppSettings> {
        let merged = self.db.merged_settings(update)?;
        self.policy.validate_settings(&merged)?;
        self.apply_runtime_settings(&merged).await?;
        self.db.save_settings(&merged)?;
        Ok(merged)
    }

    pub fn export_session(&self, caller: &Caller, session_id: &str, format: &str) -> AppResult<ExportResponse> {
        let format: ExportFormat = format.parse()?;
        self.authorized_session(caller, session_id)?;
        let nodes = self.db.list_nodes(session_id)?;

        let export_dir = self.app_data_dir.join("exports");
        std::fs::create_dir_all(&export_dir).map_err(|error| AppError::Io(error.to_string()))?;

        let file_name = format!(
            "ideanodes-{}.{}",
            sanitize_filename_component(session_id),
            format.extension()
        );
        let output_path = export_dir.join(file_name);
        if !output_path.starts_with(&export_dir) {
            return Err(AppError::Io("Resolved export path escaped export directory".to_string()));
        }

        std::fs::write(&output_path, export::render(&nodes, format)?)
            .map_err(|error| AppError::Io(error.to_string()))?;
        tracing::info!(session_id = %session_id, path = %output_path.display(), "session exported");
        Ok(ExportResponse {
            path: output_path.to_string_lossy().to_string(),
        })
    }

    pub async fn save_api_key(&self, api_key: String) -> AppResult<BooleanResponse> {
        let _guard = self.keyring_lock.lock().await;
        gemini::save_api_key(&api_key)?;
        Ok(BooleanResponse { success: true })
    }

    pub async fn clear_api_key(&self) -> AppResult<BooleanResponse> {
        let _guard = self.keyring_lock.lock().await;
        gemini::clear_api_key()?;
        Ok(BooleanResponse { success: true })
    }

    pub async fn has_api_key(&self) -> AppResult<BooleanResponse> {
        let _guard = self.keyring_lock.lock().await;
        Ok(BooleanResponse {
            success: gemini::has_api_key()?,
        })
    }

    // ─── Internals ──────────────────────────────────────────────────────────

    async fn dispatch(&self, job: &JobRecord, work: JobWork) -> AppResult<()> {
        let session_key = work.session_id().to_string();
        self.pending_jobs.lock().await.insert(
            job.id.clone(),
            PendingJob {
                work,
                cancel: CancellationToken::new(),
            },
        );

        let scheduled = ScheduledJob {
            job_id: job.id.clone(),
            session_key,
            priority: 0,
            queued_at: Utc::now(),
        };
        if let Err(message) = self.scheduler.enqueue(scheduled).await {
            self.pending_jobs.lock().await.remove(&job.id);
            self.jobs.transition(
                &job.id,
                JobStatus::Failed {
                    error: message.clone(),
                },
            )?;
            return Err(AppError::Policy(message));
        }
        tracing::info!(
            job_id = %job.id,
            kind = job.kind.as_str(),
            queued = self.scheduler.queued_len().await,
            "job queued"
        );
        Ok(())
    }

    async fn ensure_queue_capacity(&self) -> AppResult<()> {
        if !self.scheduler.has_capacity().await {
            return Err(AppError::Policy(
                "Queue is at capacity. Wait for active jobs to complete before starting more.".to_string(),
            ));
        }
        Ok(())
    }

    fn authorized_session(&self, caller: &Caller, session_id: &str) -> AppResult<SessionRecord> {
        let session = self
            .db
            .get_session(session_id)?
            .ok_or_else(|| AppError::NotFound(format!("Session {} not found", session_id)))?;
        self.policy.authorize_session(caller, &session)?;
        Ok(session)
    }

    fn require_node(&self, node_id: &str) -> AppResult<NodeRecord> {
        self.db
            .get_node(node_id)?
            .ok_or_else(|| AppError::NotFound(format!("Node {} not found", node_id)))
    }

    /// Scheduler limits are fixed at construction; everything else takes
    /// effect immediately.
    async fn apply_runtime_settings(&self, settings: &AppSettings) -> AppResult<()> {
        self.provider.apply_settings(settings)?;
        let mut redactor = self.redactor.write().await;
        *redactor = Redactor::new(settings.redact_aggressive);
        Ok(())
    }
}

/// First draft becomes the chain's `initial` node, the rest take `rest`.
fn with_kinds(drafts: Vec<NodeDraft>, rest: NodeKind) -> Vec<(NodeDraft, NodeKind)> {
    drafts
        .into_iter()
        .enumerate()
        .map(|(index, draft)| (draft, if index == 0 { NodeKind::Initial } else { rest }))
        .collect()
}

fn sanitize_filename_component(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' {
            out.push(ch);
        } else {
            out.push('_');
        }
    }
    let candidate: String = out.trim_matches('_').chars().take(120).collect();
    if candidate.is_empty() {
        "session".to_string()
    } else {
        candidate
    }
}

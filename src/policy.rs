use crate::errors::{AppError, AppResult};
use crate::models::{AppSettings, Caller, SessionRecord};

const MAX_TITLE_CHARS: usize = 200;
const MAX_TOPIC_CHARS: usize = 500;
const MIN_TIMEOUT_SECONDS: u64 = 5;
const MAX_TIMEOUT_SECONDS: u64 = 600;
const MAX_CONCURRENT_JOBS: usize = 64;
const MAX_TITLE_RETRIES: u32 = 10;
const MAX_RETRY_BACKOFF_MS: u64 = 60_000;
const MAX_SESSION_LIST_LIMIT: u32 = 500;

/// Access and input checks shared by every entry point of the runner.
#[derive(Debug, Clone, Default)]
pub struct PolicyEngine;

impl PolicyEngine {
    pub fn new() -> Self {
        Self
    }

    pub fn require_authenticated<'a>(&self, caller: &'a Caller) -> AppResult<&'a str> {
        caller
            .user_id
            .as_deref()
            .ok_or_else(|| AppError::Unauthenticated("Sign in to use this feature".to_string()))
    }

    /// Sessions without an owner are open to anyone; owned sessions only to
    /// their owner.
    pub fn authorize_session(&self, caller: &Caller, session: &SessionRecord) -> AppResult<()> {
        match session.owner_id.as_deref() {
            None => Ok(()),
            Some(owner) if caller.user_id.as_deref() == Some(owner) => Ok(()),
            Some(_) => Err(AppError::Unauthorized(format!(
                "Session {} belongs to another user",
                session.id
            ))),
        }
    }

    pub fn validate_title(&self, title: &str) -> AppResult<String> {
        let trimmed = title.trim();
        if trimmed.is_empty() {
            return Err(AppError::InvalidInput("Title cannot be empty".to_string()));
        }
        if trimmed.chars().count() > MAX_TITLE_CHARS {
            return Err(AppError::InvalidInput(format!(
                "Title exceeds {} characters",
                MAX_TITLE_CHARS
            )));
        }
        Ok(trimmed.to_string())
    }

    pub fn validate_topic(&self, topic: &str) -> AppResult<String> {
        let trimmed = topic.trim();
        if trimmed.is_empty() {
            return Err(AppError::InvalidInput("Remix topic cannot be empty".to_string()));
        }
        if trimmed.chars().count() > MAX_TOPIC_CHARS {
            return Err(AppError::InvalidInput(format!(
                "Remix topic exceeds {} characters",
                MAX_TOPIC_CHARS
            )));
        }
        Ok(trimmed.to_string())
    }

    pub fn validate_import_text(&self, text: &str) -> AppResult<()> {
        if text.trim().is_empty() {
            return Err(AppError::InvalidInput("Import text cannot be empty".to_string()));
        }
        Ok(())
    }

    pub fn validate_settings(&self, settings: &AppSettings) -> AppResult<()> {
        if settings.model.trim().is_empty() {
            return Err(AppError::Policy("model cannot be empty".to_string()));
        }
        if !settings.api_base_url.starts_with("https://") && !settings.api_base_url.starts_with("http://") {
            return Err(AppError::Policy(format!(
                "apiBaseUrl must be an http(s) URL, got '{}'",
                settings.api_base_url
            )));
        }
        if !(MIN_TIMEOUT_SECONDS..=MAX_TIMEOUT_SECONDS).contains(&settings.request_timeout_secs) {
            return Err(AppError::Policy(format!(
                "requestTimeoutSecs {} is out of allowed range ({}..={})",
                settings.request_timeout_secs, MIN_TIMEOUT_SECONDS, MAX_TIMEOUT_SECONDS
            )));
        }
        if settings.import_char_limit == 0 || settings.anchor_char_limit == 0 {
            return Err(AppError::Policy("Character limits must be positive".to_string()));
        }
        if !(1..=MAX_CONCURRENT_JOBS).contains(&settings.max_concurrent_jobs) {
            return Err(AppError::Policy(format!(
                "maxConcurrentJobs {} is out of allowed range (1..={})",
                settings.max_concurrent_jobs, MAX_CONCURRENT_JOBS
            )));
        }
        if settings.max_queue_size == 0 {
            return Err(AppError::Policy("maxQueueSize must be positive".to_string()));
        }
        if settings.title_retry_attempts > MAX_TITLE_RETRIES {
            return Err(AppError::Policy(format!(
                "titleRetryAttempts {} exceeds allowed limit {}",
                settings.title_retry_attempts, MAX_TITLE_RETRIES
            )));
        }
        if settings.title_retry_backoff_ms > MAX_RETRY_BACKOFF_MS {
            return Err(AppError::Policy(format!(
                "titleRetryBackoffMs {} exceeds allowed limit {}",
                settings.title_retry_backoff_ms, MAX_RETRY_BACKOFF_MS
            )));
        }
        if !(1..=MAX_SESSION_LIST_LIMIT).contains(&settings.session_list_limit) {
            return Err(AppError::Policy(format!(
                "sessionListLimit {} is out of allowed range (1..={})",
                settings.session_list_limit, MAX_SESSION_LIST_LIMIT
            )));
        }
        Ok(())
    }
}

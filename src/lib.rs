pub mod client;
mod db;
pub mod errors;
pub mod export;
mod jobs;
pub mod models;
mod policy;
pub mod prompt;
pub mod provider;
mod redaction;
pub mod runner;
mod scheduler;

pub use crate::client::ClientState;
pub use crate::errors::{AppError, AppResult};
pub use crate::export::{ExportFormat, ExportedNode};
pub use crate::models::{Caller, JobKind, JobRecord, JobStatus, NodeKind, NodeRecord, SessionRecord};
pub use crate::provider::gemini::GeminiProvider;
pub use crate::provider::{ModelProvider, ModelRequest, OutputSchema};
pub use crate::runner::RunnerCore;

use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;

static LOG_GUARD: std::sync::OnceLock<WorkerGuard> = std::sync::OnceLock::new();

/// Installs JSON logging to `<app_data_dir>/logs/ideanodes.log`, rotated daily.
/// `RUST_LOG` overrides the default `info` filter.
pub fn init_tracing(app_data_dir: &Path) -> Result<(), String> {
    let log_dir = app_data_dir.join("logs");
    std::fs::create_dir_all(&log_dir).map_err(|error| error.to_string())?;
    let file_appender = tracing_appender::rolling::daily(log_dir, "ideanodes.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    let _ = LOG_GUARD.set(guard);

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .json()
        .with_writer(non_blocking)
        .try_init()
        .map_err(|error| error.to_string())
}

/// Flattens an error into the `CODE: message` string handed to a UI layer.
pub fn to_client_error(error: impl std::fmt::Display) -> String {
    error.to_string()
}

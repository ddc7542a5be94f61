use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const DEFAULT_SESSION_TITLE: &str = "Untitled Idea";
pub const NEW_SESSION_TITLE: &str = "New Idea Session";
pub const NEW_NODE_TITLE: &str = "New Node";
pub const NEW_NODE_CONTENT: &str = "Describe the next stage of the idea...";
pub const SEED_NODE_TITLE: &str = "Start Here";
pub const SEED_NODE_CONTENT: &str =
    "Enter your initial thought or problem statement here to begin the chain of reasoning.";

/// Identity presented by the external auth provider. `None` means anonymous.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Caller {
    pub user_id: Option<String>,
}

impl Caller {
    pub fn anonymous() -> Self {
        Self { user_id: None }
    }

    pub fn user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.user_id.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Initial,
    User,
    Expansion,
    Blueprint,
}

impl NodeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Initial => "initial",
            Self::User => "user",
            Self::Expansion => "expansion",
            Self::Blueprint => "blueprint",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    GenerateNext,
    RemixBlueprint,
    StructureImport,
}

impl JobKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::GenerateNext => "generate_next",
            Self::RemixBlueprint => "remix_blueprint",
            Self::StructureImport => "structure_import",
        }
    }
}

/// Lifecycle of a tracked AI job.
///
/// `Pending -> InProgress -> {Completed | Failed | Cancelled}`; a pending job may
/// also fail or be cancelled before it starts. Terminal states never change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    InProgress,
    Completed { result: serde_json::Value },
    Failed { error: String },
    Cancelled,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed { .. } => "completed",
            Self::Failed { .. } => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed { .. } | Self::Failed { .. } | Self::Cancelled
        )
    }

    pub fn can_transition_to(&self, next: &JobStatus) -> bool {
        match (self, next) {
            (Self::Pending, Self::InProgress)
            | (Self::Pending, Self::Failed { .. })
            | (Self::Pending, Self::Cancelled) => true,
            (Self::InProgress, Self::Completed { .. })
            | (Self::InProgress, Self::Failed { .. })
            | (Self::InProgress, Self::Cancelled) => true,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub id: String,
    pub owner_id: Option<String>,
    pub title: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeRecord {
    pub id: String,
    pub session_id: String,
    pub title: String,
    pub content: String,
    pub kind: NodeKind,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRecord {
    pub id: String,
    pub session_id: Option<String>,
    pub kind: JobKind,
    #[serde(flatten)]
    pub status: JobStatus,
    pub progress: Option<u8>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: String,
    pub name: Option<String>,
    pub email: Option<String>,
    pub image: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Title/content pair as produced by the model or supplied by a caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeDraft {
    pub title: String,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddNodePayload {
    pub session_id: String,
    pub title: String,
    pub content: String,
    pub kind: NodeKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateNodePayload {
    pub node_id: String,
    pub title: String,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartJobResponse {
    pub job_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartRemixResponse {
    pub job_id: String,
    pub session_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BooleanResponse {
    pub success: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportResponse {
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppSettings {
    pub model: String,
    pub api_base_url: String,
    pub request_timeout_secs: u64,
    pub import_char_limit: usize,
    pub anchor_char_limit: usize,
    pub title_trigger_min_chars: usize,
    pub max_concurrent_jobs: usize,
    pub max_queue_size: usize,
    pub title_retry_attempts: u32,
    pub title_retry_backoff_ms: u64,
    pub redact_aggressive: bool,
    pub session_list_limit: u32,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            model: "gemini-2.5-flash".to_string(),
            api_base_url: "https://generativelanguage.googleapis.com/v1beta/models".to_string(),
            request_timeout_secs: 60,
            import_char_limit: 30_000,
            anchor_char_limit: 800,
            title_trigger_min_chars: 10,
            max_concurrent_jobs: 4,
            max_queue_size: 256,
            title_retry_attempts: 2,
            title_retry_backoff_ms: 500,
            redact_aggressive: true,
            session_list_limit: 10,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{JobKind, JobRecord, JobStatus};
    use chrono::Utc;

    #[test]
    fn terminal_states_reject_every_transition() {
        let terminal = [
            JobStatus::Completed {
                result: serde_json::json!({}),
            },
            JobStatus::Failed {
                error: "boom".to_string(),
            },
            JobStatus::Cancelled,
        ];
        let targets = [
            JobStatus::Pending,
            JobStatus::InProgress,
            JobStatus::Failed {
                error: "late".to_string(),
            },
            JobStatus::Cancelled,
        ];
        for from in &terminal {
            assert!(from.is_terminal());
            for to in &targets {
                assert!(!from.can_transition_to(to), "{} -> {}", from.as_str(), to.as_str());
            }
        }
    }

    #[test]
    fn pending_cannot_skip_to_completed() {
        let completed = JobStatus::Completed {
            result: serde_json::json!(null),
        };
        assert!(!JobStatus::Pending.can_transition_to(&completed));
        assert!(JobStatus::InProgress.can_transition_to(&completed));
    }

    #[test]
    fn job_record_serializes_status_inline() {
        let now = Utc::now();
        let record = JobRecord {
            id: "job-1".to_string(),
            session_id: Some("session-1".to_string()),
            kind: JobKind::GenerateNext,
            status: JobStatus::Failed {
                error: "No response from AI".to_string(),
            },
            progress: None,
            created_at: now,
            updated_at: now,
        };
        let value = serde_json::to_value(&record).expect("serialize job");
        assert_eq!(value["status"], "failed");
        assert_eq!(value["error"], "No response from AI");
        assert_eq!(value["kind"], "generate_next");
        assert_eq!(value["sessionId"], "session-1");
    }
}

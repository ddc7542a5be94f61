use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("UNAUTHENTICATED: {0}")]
    Unauthenticated(String),
    #[error("UNAUTHORIZED: {0}")]
    Unauthorized(String),
    #[error("INVALID_INPUT: {0}")]
    InvalidInput(String),
    #[error("INVALID_TRANSITION: {0}")]
    InvalidTransition(String),
    #[error("PROVIDER_ERROR: {0}")]
    Provider(String),
    #[error("INVALID_OUTPUT: {0}")]
    InvalidOutput(String),
    #[error("CANCELLED: {0}")]
    Cancelled(String),
    #[error("POLICY_DENIED: {0}")]
    Policy(String),
    #[error("IO_FAILURE: {0}")]
    Io(String),
    #[error("NOT_FOUND: {0}")]
    NotFound(String),
    #[error("INTERNAL: {0}")]
    Internal(String),
}

impl From<std::io::Error> for AppError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value.to_string())
    }
}

impl From<rusqlite::Error> for AppError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Internal(value.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(value: serde_json::Error) -> Self {
        Self::Internal(value.to_string())
    }
}

impl From<reqwest::Error> for AppError {
    fn from(value: reqwest::Error) -> Self {
        Self::Provider(value.to_string())
    }
}

pub type AppResult<T> = Result<T, AppError>;

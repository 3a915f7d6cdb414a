use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum ForemanError {
    #[error("store error: {0}")]
    Store(String),

    #[error("tracker error: {0}")]
    Tracker(String),

    #[error("insight error: {0}")]
    Insight(String),

    #[error("action not found: {0}")]
    ActionNotFound(Uuid),

    #[error("run not found: {0}")]
    RunNotFound(Uuid),

    #[error("invalid action transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("automation cycle already in progress")]
    CycleInProgress,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ForemanError>;

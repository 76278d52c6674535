//! Error types for the batch orchestration engine.

use thiserror::Error;

/// Plan and request errors.
///
/// These are rejected synchronously and never partially applied. They are the
/// only error category that aborts the calling operation outright.
#[derive(Debug, Error)]
pub enum PlanError {
    #[error("Plan not found: {0}")]
    PlanNotFound(String),

    #[error("Batch request must contain at least one item")]
    EmptyPlan,

    #[error("Item {index} is invalid: {reason}")]
    InvalidItem { index: usize, reason: String },

    #[error("Item index {index} out of range for plan {plan_id}")]
    ItemOutOfRange { plan_id: String, index: usize },

    #[error("Invalid item state transition: {from} -> {to}")]
    InvalidTransition {
        from: &'static str,
        to: &'static str,
    },
}

/// Per-item orchestration errors.
///
/// Everything here is isolated to a single plan item: the sequential executor
/// captures it, records it on the item, and moves on to the next item.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("Unknown platform: {0}")]
    UnknownPlatform(String),

    #[error("Stream idle timeout: no message received after {attempts} reconnect attempts")]
    IdleTimeout { attempts: usize },

    #[error("Generation deadline of {deadline_ms}ms exceeded")]
    DeadlineExceeded { deadline_ms: u64 },

    #[error("Circuit open: {0}")]
    CircuitOpen(String),

    #[error("Provider error: {0}")]
    ProviderError(String),

    #[error("Provider request failed: {0}")]
    ProviderRequestFailed(String),

    #[error("Provider authentication failed: {0}")]
    ProviderAuthFailed(String),

    #[error("Provider rate limit exceeded: {0}")]
    ProviderRateLimit(String),

    #[error("Stream protocol error: {0}")]
    StreamProtocol(String),

    #[error("Validation unavailable: {0}")]
    ValidationUnavailable(String),

    #[error("Persistence failed: {0}")]
    PersistenceFailed(String),

    #[error("Session error: {0}")]
    Session(String),

    #[error("Batch cancelled")]
    Cancelled,

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error(transparent)]
    Plan(#[from] PlanError),
}

impl From<config::ConfigError> for OrchestratorError {
    fn from(err: config::ConfigError) -> Self {
        OrchestratorError::ConfigError(err.to_string())
    }
}

/// Errors surfaced by the escalation pipeline.
///
/// Only request validation reaches API callers; storage failures inside
/// the pipeline are logged and recorded as audit warnings instead.
#[derive(Debug, thiserror::Error)]
pub enum EscalationError {
    /// The escalation request is missing a required field or carries an
    /// out-of-range value.
    #[error("invalid escalation request: {0}")]
    Validation(String),

    #[error(transparent)]
    Storage(#[from] relaydesk_storage::StorageError),

    #[error(transparent)]
    Notify(#[from] relaydesk_notify::error::NotifyError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience `Result` alias for escalation operations.
pub type Result<T> = std::result::Result<T, EscalationError>;

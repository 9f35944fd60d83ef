/// Errors raised inside provider adapters before they are flattened into a
/// [`crate::SendOutcome`].
///
/// # Examples
///
/// ```rust
/// use relaydesk_notify::error::NotifyError;
///
/// let err = NotifyError::NotConfigured("slack webhook".to_string());
/// assert_eq!(err.to_string(), "slack webhook not configured");
/// ```
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    /// A webhook URL, API key, sender or recipient is missing.
    #[error("{0} not configured")]
    NotConfigured(String),

    /// An HTTP request to an external notification endpoint failed.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The external API returned a non-success response.
    #[error("{service} returned HTTP {status}: {body}")]
    Api {
        service: String,
        status: u16,
        body: String,
    },

    /// SMTP transport or message construction error.
    #[error("SMTP error: {0}")]
    Smtp(String),

    /// JSON serialization or deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl NotifyError {
    pub fn status(&self) -> Option<u16> {
        match self {
            NotifyError::Api { status, .. } => Some(*status),
            NotifyError::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

/// Convenience `Result` alias for notification operations.
pub type Result<T> = std::result::Result<T, NotifyError>;

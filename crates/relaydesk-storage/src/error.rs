/// Errors that can occur within the storage layer.
///
/// # Examples
///
/// ```rust
/// use relaydesk_storage::error::StorageError;
///
/// let err = StorageError::NotFound {
///     entity: "integration",
///     id: "42".to_string(),
/// };
/// assert!(err.to_string().contains("integration"));
/// ```
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// A required record was not found in the database.
    #[error("Storage: {entity} not found (id={id})")]
    NotFound { entity: &'static str, id: String },

    /// An error reported by the database driver or ORM.
    #[error("Storage: database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    /// JSON serialization or deserialization failure (JSON-valued TEXT columns).
    #[error("Storage: JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience `Result` alias for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

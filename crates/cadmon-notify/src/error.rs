/// Errors that can occur within the notification subsystem.
///
/// # Migration note
///
/// The `NotificationChannel` trait and the built-in plugins currently
/// return `anyhow::Result`. This module defines the target error type for
/// progressive migration; new channel implementations should return
/// `error::Result<T>` where possible.
///
/// # Examples
///
/// ```rust
/// use cadmon_notify::error::NotifyError;
///
/// let err = NotifyError::InvalidConfig("missing url".to_string());
/// assert!(err.to_string().contains("url"));
/// ```
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    /// Channel configuration is missing a required field or contains an
    /// invalid value.
    #[error("Notify: invalid channel configuration: {0}")]
    InvalidConfig(String),

    /// The channel type is not registered in the plugin registry.
    #[error("Notify: unknown channel type '{0}'")]
    UnknownChannelType(String),

    /// An HTTP request to an external notification endpoint failed.
    #[error("Notify: HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    /// The external endpoint returned a non-success response.
    #[error("Notify: endpoint returned status={status}: {body}")]
    ApiError { status: u16, body: String },

    /// JSON serialization or deserialization failed.
    #[error("Notify: JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

/// Convenience `Result` alias for notification operations.
pub type Result<T> = std::result::Result<T, NotifyError>;

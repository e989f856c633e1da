//! Error types for notifiers.

use std::time::Duration;

use thiserror::Error;

use crate::transport::TransportError;
use crate::validator::ValidationError;

/// Errors that can occur while dispatching a notification.
///
/// Every variant is caught at the dispatch boundary and turned into the
/// error list of a [`Response`](crate::Response); only the registry lookups
/// and [`Response::raise_on_errors`](crate::Response::raise_on_errors)
/// return it directly.
#[derive(Debug, Clone, Error)]
pub enum NotificationError {
    /// The request does not satisfy the provider schema.
    #[error("Configuration error: {0}")]
    Configuration(ValidationError),

    /// The provider has no transport in this build.
    #[error("Provider unavailable: {0}")]
    Unavailable(String),

    /// The remote host could not be reached or dropped the session.
    #[error("Connection error: {0}")]
    Connection(String),

    /// The remote host rejected the credentials.
    #[error("Authentication error: {0}")]
    Authentication(String),

    /// The remote host rejected the payload.
    #[error("Transmission error: {0}")]
    Transmission(String),

    /// An attachment could not be read.
    #[error("Resource error: {0}")]
    Resource(String),

    /// The connect/authenticate/send sequence did not finish in time.
    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    /// No provider is registered under this name.
    #[error("Unknown provider: {0}")]
    UnknownProvider(String),

    /// A failed response converted into an error.
    #[error("Notification failed ({provider}): {}", errors.join("; "))]
    Delivery {
        provider: &'static str,
        errors: Vec<String>,
    },

    /// Normalized data could not be read into the provider's request type.
    #[error("JSON error: {0}")]
    Json(String),
}

impl NotificationError {
    /// Flatten the error into the human-readable strings carried by a response.
    ///
    /// Configuration errors produce one entry per violation.
    pub fn messages(&self) -> Vec<String> {
        match self {
            Self::Configuration(err) => err.violations().iter().map(ToString::to_string).collect(),
            Self::Delivery { errors, .. } => errors.clone(),
            other => vec![other.to_string()],
        }
    }

    /// Whether the error was raised before any transport activity.
    pub fn is_pre_transport(&self) -> bool {
        matches!(
            self,
            Self::Configuration(_) | Self::Unavailable(_) | Self::Resource(_) | Self::Json(_)
        )
    }
}

impl From<ValidationError> for NotificationError {
    fn from(err: ValidationError) -> Self {
        Self::Configuration(err)
    }
}

impl From<serde_json::Error> for NotificationError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(err.to_string())
    }
}

impl From<TransportError> for NotificationError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Disconnected(msg) => {
                Self::Connection(format!("server disconnected: {msg}"))
            }
            TransportError::Network(msg) => Self::Connection(msg),
            TransportError::Authentication(msg) => Self::Authentication(msg),
            TransportError::SendRejected(msg) => Self::Transmission(msg),
            TransportError::Timeout(limit) => Self::Timeout(limit),
        }
    }
}

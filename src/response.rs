//! Uniform dispatch results.

use serde::Serialize;

use crate::error::NotificationError;
use crate::schema::Data;

/// Whether a dispatch succeeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    Success,
    Failure,
}

/// Result of one dispatch, whatever the transport.
///
/// Exactly one holds: `errors` is `None` (success) or a non-empty list.
///
/// ```
/// use notifiers::{Response, ResponseStatus};
/// use notifiers::schema::Data;
///
/// let response = Response::new("email", Data::new(), vec![]);
/// assert!(response.ok());
///
/// let response = Response::new("email", Data::new(), vec!["boom".into()]);
/// assert_eq!(response.status(), ResponseStatus::Failure);
/// assert!(response.raise_on_errors().is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Response {
    /// Name of the provider that handled the request
    pub provider: &'static str,
    /// The request as it stood when dispatch finished
    pub data: Data,
    /// Human-readable failures; `None` on success
    pub errors: Option<Vec<String>>,
}

impl Response {
    /// Build a response; an empty error list means success.
    pub fn new(provider: &'static str, data: Data, errors: Vec<String>) -> Self {
        Self {
            provider,
            data,
            errors: if errors.is_empty() { None } else { Some(errors) },
        }
    }

    pub fn success(provider: &'static str, data: Data) -> Self {
        Self::new(provider, data, Vec::new())
    }

    /// Build a failed response from a dispatch error.
    pub fn from_error(provider: &'static str, data: Data, error: &NotificationError) -> Self {
        let mut errors = error.messages();
        if errors.is_empty() {
            errors.push(error.to_string());
        }
        Self::new(provider, data, errors)
    }

    pub fn status(&self) -> ResponseStatus {
        if self.errors.is_some() {
            ResponseStatus::Failure
        } else {
            ResponseStatus::Success
        }
    }

    pub fn ok(&self) -> bool {
        self.status() == ResponseStatus::Success
    }

    /// Error messages; empty on success.
    pub fn errors(&self) -> &[String] {
        self.errors.as_deref().unwrap_or_default()
    }

    /// Turn a failed response into an error.
    pub fn raise_on_errors(&self) -> Result<(), NotificationError> {
        match &self.errors {
            Some(errors) => Err(NotificationError::Delivery {
                provider: self.provider,
                errors: errors.clone(),
            }),
            None => Ok(()),
        }
    }
}

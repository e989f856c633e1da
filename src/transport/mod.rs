//! Transport collaborators.
//!
//! A [`Connector`] opens [`Connection`]s; a connection can upgrade to TLS,
//! authenticate and transmit payloads. The
//! [`SessionManager`](crate::session::SessionManager) decides when to open
//! and release them.
//!
//! | Connector | Feature Flag | Description |
//! |-----------|-------------|-------------|
//! | [`MemoryConnector`] | (none) | Records calls in memory for dev/testing |
//! | [`SmtpConnector`] | `smtp` | SMTP sessions via lettre |

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::payload::Payload;

pub mod memory;
pub use memory::{MemoryConnector, Step, TransportEvent};

#[cfg(feature = "smtp")]
mod smtp;
#[cfg(feature = "smtp")]
pub use smtp::SmtpConnector;

/// The closed set of transport failure kinds.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The server closed the session.
    #[error("Server disconnected: {0}")]
    Disconnected(String),

    /// The server refused the payload (sender, recipients or content).
    #[error("Send rejected: {0}")]
    SendRejected(String),

    /// Socket, DNS or TLS level failure.
    #[error("Network error: {0}")]
    Network(String),

    /// The server rejected the credentials.
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// The exchange did not complete in time.
    #[error("Timed out after {0:?}")]
    Timeout(Duration),
}

impl TransportError {
    /// Whether the live session must be dropped after this failure.
    ///
    /// A rejected payload says nothing about the connection, so the session
    /// survives it. Everything else resets to disconnected.
    pub fn resets_session(&self) -> bool {
        !matches!(self, Self::SendRejected(_))
    }
}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        Self::Network(err.to_string())
    }
}

/// How the connection is encrypted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Security {
    /// Plain text for the whole session.
    #[default]
    None,
    /// Plain greeting, then a STARTTLS upgrade before authentication.
    StartTls,
    /// TLS from the first byte.
    Implicit,
}

impl Security {
    /// Resolve the provider's `ssl` / `tls` flags. `ssl` wins.
    pub fn from_flags(ssl: bool, tls: bool) -> Self {
        match (ssl, tls) {
            (true, _) => Self::Implicit,
            (false, true) => Self::StartTls,
            (false, false) => Self::None,
        }
    }
}

/// Where to connect and how.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
    pub security: Security,
}

/// Opens connections.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Connect to `endpoint` and read the server greeting.
    ///
    /// With [`Security::Implicit`] the socket is encrypted before the
    /// greeting. The STARTTLS upgrade is a separate step.
    async fn connect(&self, endpoint: &Endpoint) -> Result<Box<dyn Connection>, TransportError>;
}

/// A live transport handle.
#[async_trait]
pub trait Connection: Send {
    /// Upgrade a plain session to TLS (STARTTLS).
    async fn upgrade_encryption(&mut self) -> Result<(), TransportError>;

    async fn authenticate(&mut self, username: &str, password: &str)
        -> Result<(), TransportError>;

    async fn transmit(&mut self, payload: &Payload) -> Result<(), TransportError>;

    /// End the session politely. Failures are ignored; the handle is
    /// unusable afterwards either way.
    async fn close(&mut self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_security_from_flags() {
        assert_eq!(Security::from_flags(false, false), Security::None);
        assert_eq!(Security::from_flags(false, true), Security::StartTls);
        assert_eq!(Security::from_flags(true, true), Security::Implicit);
        assert_eq!(Security::from_flags(true, false), Security::Implicit);
    }

    #[test]
    fn test_resets_session() {
        assert!(!TransportError::SendRejected("550".into()).resets_session());
        assert!(TransportError::Disconnected("eof".into()).resets_session());
        assert!(TransportError::Network("refused".into()).resets_session());
        assert!(TransportError::Authentication("535".into()).resets_session());
        assert!(TransportError::Timeout(Duration::from_secs(1)).resets_session());
    }
}

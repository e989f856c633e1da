//! In-memory transport that records every call.
//!
//! Use it in tests to assert how many sessions were opened, what was sent,
//! and how the provider reacts to scripted failures.
//!
//! ```rust,ignore
//! use notifiers::transport::{MemoryConnector, Step, TransportError};
//!
//! let connector = MemoryConnector::new();
//! connector.fail_once(Step::Authenticate, TransportError::Authentication("535".into()));
//!
//! let provider = SmtpProvider::builder().connector(connector.clone()).build();
//! // ... dispatch ...
//! assert_eq!(connector.connect_count(), 1);
//! ```

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{Connection, Connector, Endpoint, TransportError};
use crate::payload::Payload;

/// One recorded transport call.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Connect(Endpoint),
    Upgrade,
    Authenticate { username: String },
    Transmit(Payload),
    Close,
}

/// A transport step that can be scripted to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Connect,
    Upgrade,
    Authenticate,
    Transmit,
}

#[derive(Debug, Default)]
struct State {
    events: Vec<TransportEvent>,
    failures: Vec<(Step, TransportError)>,
    transmit_delay: Option<Duration>,
}

impl State {
    /// Record `event` and pop the first scripted failure for `step`.
    fn record(&mut self, step: Step, event: TransportEvent) -> Result<(), TransportError> {
        self.events.push(event);
        match self.failures.iter().position(|(s, _)| *s == step) {
            Some(index) => Err(self.failures.remove(index).1),
            None => Ok(()),
        }
    }
}

/// Connector whose connections only record what they are asked to do.
///
/// Clones share the same log.
#[derive(Debug, Clone, Default)]
pub struct MemoryConnector {
    state: Arc<Mutex<State>>,
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next call of `step` fail with `error`.
    ///
    /// Failures queue up; each one fires once.
    pub fn fail_once(&self, step: Step, error: TransportError) {
        self.state.lock().failures.push((step, error));
    }

    /// Sleep this long inside every transmit (for timeout tests).
    pub fn set_transmit_delay(&self, delay: Duration) {
        self.state.lock().transmit_delay = Some(delay);
    }

    /// All recorded calls, oldest first.
    pub fn events(&self) -> Vec<TransportEvent> {
        self.state.lock().events.clone()
    }

    /// Number of connection attempts.
    pub fn connect_count(&self) -> usize {
        self.count(|e| matches!(e, TransportEvent::Connect(_)))
    }

    /// Number of authentication attempts.
    pub fn auth_count(&self) -> usize {
        self.count(|e| matches!(e, TransportEvent::Authenticate { .. }))
    }

    /// Number of explicit session releases.
    pub fn close_count(&self) -> usize {
        self.count(|e| matches!(e, TransportEvent::Close))
    }

    /// Payloads handed to the transport, oldest first.
    pub fn transmitted(&self) -> Vec<Payload> {
        self.state
            .lock()
            .events
            .iter()
            .filter_map(|e| match e {
                TransportEvent::Transmit(payload) => Some(payload.clone()),
                _ => None,
            })
            .collect()
    }

    /// Whether the transport was never touched.
    pub fn is_untouched(&self) -> bool {
        self.state.lock().events.is_empty()
    }

    /// Forget recorded calls. Scripted failures stay queued.
    pub fn clear(&self) {
        self.state.lock().events.clear();
    }

    fn count(&self, predicate: impl Fn(&TransportEvent) -> bool) -> usize {
        self.state.lock().events.iter().filter(|e| predicate(e)).count()
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self, endpoint: &Endpoint) -> Result<Box<dyn Connection>, TransportError> {
        self.state
            .lock()
            .record(Step::Connect, TransportEvent::Connect(endpoint.clone()))?;

        Ok(Box::new(MemoryConnection {
            state: Arc::clone(&self.state),
        }))
    }
}

struct MemoryConnection {
    state: Arc<Mutex<State>>,
}

#[async_trait]
impl Connection for MemoryConnection {
    async fn upgrade_encryption(&mut self) -> Result<(), TransportError> {
        self.state.lock().record(Step::Upgrade, TransportEvent::Upgrade)
    }

    async fn authenticate(&mut self, username: &str, _password: &str) -> Result<(), TransportError> {
        self.state.lock().record(
            Step::Authenticate,
            TransportEvent::Authenticate {
                username: username.to_string(),
            },
        )
    }

    async fn transmit(&mut self, payload: &Payload) -> Result<(), TransportError> {
        let delay = self.state.lock().transmit_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.state
            .lock()
            .record(Step::Transmit, TransportEvent::Transmit(payload.clone()))
    }

    async fn close(&mut self) {
        self.state.lock().events.push(TransportEvent::Close);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::Security;

    fn endpoint() -> Endpoint {
        Endpoint {
            host: "localhost".into(),
            port: 25,
            security: Security::None,
        }
    }

    #[tokio::test]
    async fn test_records_calls() {
        let connector = MemoryConnector::new();
        let mut conn = connector.connect(&endpoint()).await.unwrap();
        conn.upgrade_encryption().await.unwrap();
        conn.authenticate("user", "secret").await.unwrap();
        conn.close().await;

        assert_eq!(
            connector.events(),
            vec![
                TransportEvent::Connect(endpoint()),
                TransportEvent::Upgrade,
                TransportEvent::Authenticate {
                    username: "user".into()
                },
                TransportEvent::Close,
            ]
        );
        assert_eq!(connector.connect_count(), 1);
        assert_eq!(connector.auth_count(), 1);
        assert_eq!(connector.close_count(), 1);
    }

    #[tokio::test]
    async fn test_scripted_failure_fires_once() {
        let connector = MemoryConnector::new();
        connector.fail_once(Step::Connect, TransportError::Network("refused".into()));

        assert!(connector.connect(&endpoint()).await.is_err());
        assert!(connector.connect(&endpoint()).await.is_ok());
        assert_eq!(connector.connect_count(), 2);
    }

    #[tokio::test]
    async fn test_clones_share_log() {
        let connector = MemoryConnector::new();
        let other = connector.clone();
        other.connect(&endpoint()).await.unwrap();
        assert!(!connector.is_untouched());
        connector.clear();
        assert!(other.is_untouched());
    }
}

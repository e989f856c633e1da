//! Transport session management.
//!
//! A [`SessionManager`] owns at most one live [`Connection`] together with
//! the [`SessionIdentity`] it was opened for. Each send asks [`decide`]
//! whether the live session can serve the request:
//!
//! - same host, port and username: reuse it;
//! - anything else, or no session at all: release the old handle (QUIT)
//!   and run connect, optional STARTTLS, optional authentication again.
//!
//! Connection-level failures drop the handle and leave the manager
//! disconnected; nothing is retried. A rejected payload keeps the session.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::payload::Payload;
use crate::transport::{Connection, Connector, Endpoint, Security, TransportError};

/// What decides whether a live connection can be reused.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionIdentity {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
}

/// Username and password for the authentication step.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Everything needed to open (or match) a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRequest {
    pub endpoint: Endpoint,
    pub credentials: Option<Credentials>,
}

impl SessionRequest {
    pub fn identity(&self) -> SessionIdentity {
        SessionIdentity {
            host: self.endpoint.host.clone(),
            port: self.endpoint.port,
            username: self.credentials.as_ref().map(|c| c.username.clone()),
        }
    }
}

/// Outcome of [`decide`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionAction {
    Reuse,
    Reconnect,
}

/// Decide whether the current session can serve `requested`.
pub fn decide(current: Option<&SessionIdentity>, requested: &SessionIdentity) -> SessionAction {
    match current {
        Some(identity) if identity == requested => SessionAction::Reuse,
        _ => SessionAction::Reconnect,
    }
}

/// Observable state of a [`SessionManager`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState<'a> {
    Disconnected,
    Connected(&'a SessionIdentity),
}

struct Session {
    identity: SessionIdentity,
    connection: Box<dyn Connection>,
}

/// Owns one provider's live connection.
///
/// Not synchronized: callers that share a manager must hold it behind a
/// lock for the whole of [`send`](Self::send).
pub struct SessionManager {
    connector: Arc<dyn Connector>,
    session: Option<Session>,
    timeout: Option<Duration>,
}

impl SessionManager {
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        Self {
            connector,
            session: None,
            timeout: None,
        }
    }

    /// Bound the whole acquire-and-transmit sequence.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn state(&self) -> SessionState<'_> {
        match &self.session {
            Some(session) => SessionState::Connected(&session.identity),
            None => SessionState::Disconnected,
        }
    }

    pub fn identity(&self) -> Option<&SessionIdentity> {
        self.session.as_ref().map(|s| &s.identity)
    }

    pub fn is_connected(&self) -> bool {
        self.session.is_some()
    }

    /// Obtain (or reuse) a session for `request` and transmit `payload`.
    pub async fn send(
        &mut self,
        request: &SessionRequest,
        payload: &Payload,
    ) -> Result<(), TransportError> {
        let outcome = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, self.exchange(request, payload))
                .await
                .unwrap_or(Err(TransportError::Timeout(limit))),
            None => self.exchange(request, payload).await,
        };

        if let Err(err) = &outcome {
            if err.resets_session() {
                self.reset(err);
            }
        }
        outcome
    }

    /// Politely end the live session, if any.
    pub async fn release(&mut self) {
        if let Some(mut session) = self.session.take() {
            tracing::debug!(
                host = %session.identity.host,
                port = session.identity.port,
                "Releasing session"
            );
            session.connection.close().await;
        }
    }

    async fn exchange(
        &mut self,
        request: &SessionRequest,
        payload: &Payload,
    ) -> Result<(), TransportError> {
        let connection = self.acquire(request).await?;
        connection.transmit(payload).await
    }

    async fn acquire(
        &mut self,
        request: &SessionRequest,
    ) -> Result<&mut dyn Connection, TransportError> {
        let identity = request.identity();
        let action = decide(self.identity(), &identity);

        match action {
            SessionAction::Reuse => {
                tracing::debug!(host = %identity.host, port = identity.port, "Reusing session");
            }
            SessionAction::Reconnect => {
                self.release().await;
                tracing::debug!(host = %identity.host, port = identity.port, "Opening session");
                let connection = establish(self.connector.as_ref(), request).await?;
                self.session = Some(Session {
                    identity,
                    connection,
                });
            }
        }

        match self.session.as_mut() {
            Some(session) => Ok(session.connection.as_mut()),
            None => Err(TransportError::Disconnected("no live session".into())),
        }
    }

    /// Drop the handle without a QUIT; the failure already broke the exchange.
    fn reset(&mut self, cause: &TransportError) {
        if let Some(session) = self.session.take() {
            tracing::debug!(
                host = %session.identity.host,
                port = session.identity.port,
                error = %cause,
                "Session reset"
            );
        }
    }
}

/// Connect, upgrade and authenticate. Nothing is kept on failure.
async fn establish(
    connector: &dyn Connector,
    request: &SessionRequest,
) -> Result<Box<dyn Connection>, TransportError> {
    let mut connection = connector.connect(&request.endpoint).await?;

    if request.endpoint.security == Security::StartTls {
        connection.upgrade_encryption().await?;
    }

    if let Some(credentials) = &request.credentials {
        connection
            .authenticate(&credentials.username, &credentials.password)
            .await?;
    }

    Ok(connection)
}

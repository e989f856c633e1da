//! SMTP sessions using lettre.
//!
//! Unlike lettre's pooled `AsyncSmtpTransport`, each step is driven
//! separately so the [`SessionManager`](crate::session::SessionManager)
//! decides when to connect, upgrade and authenticate.
//!
//! ```rust,ignore
//! use notifiers::providers::SmtpProvider;
//! use notifiers::transport::SmtpConnector;
//!
//! let provider = SmtpProvider::builder()
//!     .connector(SmtpConnector::new().hello_name("mail.example.com"))
//!     .build();
//! ```

use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use lettre::{
    message::{
        header::ContentType, Attachment as LettreAttachment, Mailbox, MultiPart, SinglePart,
    },
    transport::smtp::{
        authentication::{Credentials, Mechanism},
        client::{AsyncSmtpConnection, TlsParameters},
        extension::ClientId,
    },
    Message,
};

use super::{Connection, Connector, Endpoint, Security, TransportError};
use crate::payload::{BodyKind, Payload};

/// Socket timeout used when none is configured.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Opens SMTP connections.
#[derive(Debug, Clone)]
pub struct SmtpConnector {
    hello_name: ClientId,
    timeout: Option<Duration>,
}

impl SmtpConnector {
    pub fn new() -> Self {
        Self {
            hello_name: ClientId::Domain("localhost".to_string()),
            timeout: Some(DEFAULT_TIMEOUT),
        }
    }

    /// Name sent with EHLO.
    pub fn hello_name(mut self, name: impl Into<String>) -> Self {
        self.hello_name = ClientId::Domain(name.into());
        self
    }

    /// Socket-level timeout; `None` waits forever.
    pub fn connect_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }
}

impl Default for SmtpConnector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Connector for SmtpConnector {
    async fn connect(&self, endpoint: &Endpoint) -> Result<Box<dyn Connection>, TransportError> {
        let tls = match endpoint.security {
            Security::Implicit => Some(tls_parameters(&endpoint.host)?),
            Security::None | Security::StartTls => None,
        };

        let inner = AsyncSmtpConnection::connect_tokio1(
            (endpoint.host.as_str(), endpoint.port),
            self.timeout,
            &self.hello_name,
            tls,
            None,
        )
        .await
        .map_err(|e| TransportError::Network(e.to_string()))?;

        tracing::debug!(host = %endpoint.host, port = endpoint.port, "SMTP connected");

        Ok(Box::new(SmtpConnection {
            inner,
            host: endpoint.host.clone(),
            hello_name: self.hello_name.clone(),
        }))
    }
}

struct SmtpConnection {
    inner: AsyncSmtpConnection,
    host: String,
    hello_name: ClientId,
}

#[async_trait]
impl Connection for SmtpConnection {
    async fn upgrade_encryption(&mut self) -> Result<(), TransportError> {
        if !self.inner.can_starttls() {
            return Err(TransportError::Network(format!(
                "{} does not offer STARTTLS",
                self.host
            )));
        }
        let tls = tls_parameters(&self.host)?;
        self.inner
            .starttls(tls, &self.hello_name)
            .await
            .map_err(|e| TransportError::Network(e.to_string()))
    }

    async fn authenticate(&mut self, username: &str, password: &str) -> Result<(), TransportError> {
        let credentials = Credentials::new(username.to_string(), password.to_string());
        self.inner
            .auth(&[Mechanism::Plain, Mechanism::Login], &credentials)
            .await
            .map(|_| ())
            .map_err(|e| {
                if e.is_permanent() || e.is_transient() {
                    TransportError::Authentication(e.to_string())
                } else {
                    TransportError::Network(e.to_string())
                }
            })
    }

    async fn transmit(&mut self, payload: &Payload) -> Result<(), TransportError> {
        let message = build_message(payload)?;

        let result = self
            .inner
            .send(message.envelope(), &message.formatted())
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) if self.inner.has_broken() => Err(TransportError::Disconnected(e.to_string())),
            Err(e) if e.is_permanent() || e.is_transient() => {
                Err(TransportError::SendRejected(e.to_string()))
            }
            Err(e) => Err(TransportError::Network(e.to_string())),
        }
    }

    async fn close(&mut self) {
        if let Err(e) = self.inner.quit().await {
            tracing::debug!(error = %e, "SMTP QUIT failed");
        }
    }
}

fn tls_parameters(host: &str) -> Result<TlsParameters, TransportError> {
    TlsParameters::new(host.to_string()).map_err(|e| TransportError::Network(e.to_string()))
}

/// Build a lettre Message from a payload.
fn build_message(payload: &Payload) -> Result<Message, TransportError> {
    let from: Mailbox = payload
        .from
        .parse()
        .map_err(|e: lettre::address::AddressError| TransportError::SendRejected(e.to_string()))?;

    let mut builder = Message::builder()
        .from(from)
        .subject(&payload.subject)
        .date(SystemTime::from(payload.date));

    for to in payload.recipients() {
        let mailbox: Mailbox = to.parse().map_err(|e: lettre::address::AddressError| {
            TransportError::SendRejected(e.to_string())
        })?;
        builder = builder.to(mailbox);
    }

    let content_type = match payload.body.kind {
        BodyKind::Plain => ContentType::TEXT_PLAIN,
        BodyKind::Html => ContentType::TEXT_HTML,
    };
    let body = SinglePart::builder()
        .header(content_type)
        .body(payload.body.content.clone());

    let message = if payload.has_attachments() {
        let mut multipart = MultiPart::mixed().singlepart(body);
        for attachment in &payload.attachments {
            let content_type: ContentType = attachment
                .content_type
                .parse()
                .unwrap_or(ContentType::TEXT_PLAIN);
            multipart = multipart.singlepart(
                LettreAttachment::new(attachment.filename.clone())
                    .body(attachment.data.clone(), content_type),
            );
        }
        builder.multipart(multipart)
    } else {
        builder.singlepart(body)
    };

    message.map_err(|e| TransportError::SendRejected(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attachment::Attachment;

    #[test]
    fn test_build_plain_message() {
        let payload = Payload::new("a@x.com,b@x.com", "me@x.com")
            .subject("Hi")
            .body(BodyKind::Plain, "hello");

        let message = build_message(&payload).unwrap();
        assert_eq!(message.envelope().to().len(), 2);

        let raw = String::from_utf8(message.formatted()).unwrap();
        assert!(raw.contains("Subject: Hi"));
        assert!(raw.contains("text/plain"));
    }

    #[test]
    fn test_build_message_with_attachment() {
        let payload = Payload::new("a@x.com", "me@x.com")
            .body(BodyKind::Html, "<b>hi</b>")
            .attachment(Attachment::from_bytes("report.csv", b"a,b".to_vec()));

        let raw = String::from_utf8(build_message(&payload).unwrap().formatted()).unwrap();
        assert!(raw.contains("multipart/mixed"));
        assert!(raw.contains("report.csv"));
        assert!(raw.contains("text/html"));
    }

    #[test]
    fn test_bad_address_is_rejected() {
        let payload = Payload::new("not-an-address", "me@x.com");
        assert!(matches!(
            build_message(&payload),
            Err(TransportError::SendRejected(_))
        ));
    }
}

//! Email over SMTP.
//!
//! # Example
//!
//! ```rust,ignore
//! use notifiers::providers::SmtpProvider;
//! use notifiers::Provider;
//! use serde_json::json;
//!
//! let provider = SmtpProvider::new();
//!
//! let response = provider
//!     .send(json!({
//!         "message": "Deploy finished",
//!         "to": ["ops@example.com", "dev@example.com"],
//!         "host": "smtp.example.com",
//!         "port": 587,
//!         "tls": true,
//!         "username": "bot",
//!         "password": "secret",
//!     }).as_object().cloned().unwrap_or_default())
//!     .await;
//!
//! response.raise_on_errors()?;
//! ```
//!
//! Consecutive sends to the same host, port and username share one SMTP
//! session. The session is closed when the identity changes or on
//! [`SmtpProvider::shutdown`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use email_address::EmailAddress;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::attachment::{FileSource, FsFileSource};
use crate::defaults::{defaults, Defaults};
use crate::error::NotificationError;
use crate::payload::{BodyKind, Payload};
use crate::provider::Provider;
use crate::schema::{Data, Field, Format, OneOrMore, Schema};
use crate::session::{Credentials, SessionIdentity, SessionManager, SessionRequest};
use crate::transport::{Connector, Endpoint, Security};

/// Subject used when the request has none.
pub const DEFAULT_SUBJECT: &str = "New email from 'notifiers'!";
/// SMTP host used when the request has none.
pub const DEFAULT_SMTP_HOST: &str = "localhost";
/// SMTP port used when the request has none.
pub const DEFAULT_SMTP_PORT: u16 = 25;

/// The email provider's schema.
pub fn email_schema() -> Schema {
    Schema::new()
        .field(Field::string("message").title("the content of the email message"))
        .field(Field::string("subject").title("the subject of the email message"))
        .field(
            Field::string("to")
                .format(Format::Email)
                .one_or_more()
                .title("one or more email addresses to use"),
        )
        .field(
            Field::string("from")
                .format(Format::Email)
                .title("the FROM address to use in the email"),
        )
        .field(
            Field::string("from_")
                .format(Format::Email)
                .duplicate()
                .title("the FROM address to use in the email"),
        )
        .field(
            Field::string("attachments")
                .format(Format::ValidFile)
                .one_or_more()
                .title("one or more attachments to use in the email"),
        )
        .field(
            Field::string("host")
                .format(Format::Hostname)
                .title("the host of the SMTP server"),
        )
        .field(
            Field::integer("port")
                .format(Format::Port)
                .title("the port number to use"),
        )
        .field(Field::string("username").title("username if relevant"))
        .field(Field::string("password").title("password if relevant"))
        .field(Field::boolean("tls").title("should TLS be used"))
        .field(Field::boolean("ssl").title("should SSL be used"))
        .field(Field::boolean("html").title("should the email be parse as an HTML file"))
        .required(["message", "to", "username", "password"])
        .dependency("username", ["password"])
        .dependency("password", ["username"])
        .dependency("ssl", ["tls"])
}

/// `<user>@<host>` for the current process.
///
/// Reads `USER`/`USERNAME` and `HOSTNAME`, falling back to `notifiers` and
/// `localhost`. Always a valid email address.
pub fn default_from() -> String {
    let user = std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .ok()
        .filter(|u| !u.is_empty())
        .unwrap_or_else(|| "notifiers".to_string());
    let host = std::env::var("HOSTNAME")
        .ok()
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| "localhost".to_string());
    compose_from(&user, &host)
}

/// `user@host`, or `notifiers@host` (then `notifiers@localhost`) when the
/// result is not a valid address.
fn compose_from(user: &str, host: &str) -> String {
    [format!("{user}@{host}"), format!("notifiers@{host}")]
        .into_iter()
        .find(|candidate| EmailAddress::is_valid(candidate))
        .unwrap_or_else(|| "notifiers@localhost".to_string())
}

/// Normalized email request.
#[derive(Debug, Clone, Deserialize)]
pub struct EmailRequest {
    pub message: String,
    pub subject: String,
    pub to: OneOrMore<String>,
    pub from: String,
    #[serde(default)]
    pub attachments: Option<OneOrMore<String>>,
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    pub tls: bool,
    pub ssl: bool,
    pub html: bool,
}

impl EmailRequest {
    /// Read normalized, validated data.
    pub fn from_data(data: &Data) -> Result<Self, NotificationError> {
        Ok(serde_json::from_value(Value::Object(data.clone()))?)
    }

    /// Login credentials; an empty username means an unauthenticated relay.
    pub fn credentials(&self) -> Option<Credentials> {
        match (&self.username, &self.password) {
            (Some(username), Some(password)) if !username.is_empty() => {
                Some(Credentials::new(username, password))
            }
            _ => None,
        }
    }

    pub fn session_request(&self) -> SessionRequest {
        SessionRequest {
            endpoint: Endpoint {
                host: self.host.clone(),
                port: self.port,
                security: Security::from_flags(self.ssl, self.tls),
            },
            credentials: self.credentials(),
        }
    }

    /// Build the payload, reading attachments through `files`.
    pub fn build_payload(&self, files: &dyn FileSource) -> Result<Payload, NotificationError> {
        let payload = Payload::new(self.to.clone().into_vec().join(","), &self.from)
            .subject(&self.subject)
            .body(BodyKind::from_html_flag(self.html), &self.message);

        match &self.attachments {
            Some(paths) => {
                let paths = paths.clone().into_vec();
                payload.attach_files(paths.as_slice(), files)
            }
            None => Ok(payload),
        }
    }
}

/// Collapse `to` lists and resolve the `from_` alias.
///
/// Idempotent: normalized data passes through unchanged.
pub fn normalize_email(mut data: Data) -> Data {
    let joined = match data.get("to") {
        Some(Value::Array(items)) => Some(
            items
                .iter()
                .filter_map(Value::as_str)
                .collect::<Vec<_>>()
                .join(","),
        ),
        _ => None,
    };
    if let Some(joined) = joined {
        data.insert("to".into(), Value::String(joined));
    }

    // `from` is reserved in some callers' languages; `from_` is its alias
    if let Some(from) = data.remove("from_") {
        data.insert("from".into(), from);
    }

    data
}

/// SMTP email provider.
pub struct SmtpProvider {
    schema: Schema,
    default_from: String,
    files: Arc<dyn FileSource>,
    /// `None` when no connector was given and the `smtp` feature is off
    sessions: Option<tokio::sync::Mutex<SessionManager>>,
}

impl SmtpProvider {
    /// Provider with the default connector and the local filesystem.
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> SmtpProviderBuilder {
        SmtpProviderBuilder::default()
    }

    /// Identity of the live session, if any.
    pub async fn session_identity(&self) -> Option<SessionIdentity> {
        let sessions = self.sessions.as_ref()?;
        sessions.lock().await.identity().cloned()
    }

    /// Close the live session, if any.
    pub async fn shutdown(&self) {
        if let Some(sessions) = &self.sessions {
            sessions.lock().await.release().await;
        }
    }
}

impl Default for SmtpProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Provider for SmtpProvider {
    fn name(&self) -> &'static str {
        "email"
    }

    fn site_url(&self) -> &'static str {
        "https://en.wikipedia.org/wiki/Email"
    }

    fn schema(&self) -> &Schema {
        &self.schema
    }

    fn defaults(&self) -> Defaults {
        defaults([
            ("subject", json!(DEFAULT_SUBJECT)),
            ("from", json!(self.default_from)),
            ("host", json!(DEFAULT_SMTP_HOST)),
            ("port", json!(DEFAULT_SMTP_PORT)),
            ("tls", json!(false)),
            ("ssl", json!(false)),
            ("html", json!(false)),
        ])
    }

    fn normalize(&self, data: Data) -> Data {
        normalize_email(data)
    }

    async fn deliver(&self, data: &Data) -> Result<(), NotificationError> {
        let sessions = self.sessions.as_ref().ok_or_else(|| {
            NotificationError::Unavailable(
                "'smtp' feature is not enabled and no connector was configured. \
                Add `features = [\"smtp\"]` to Cargo.toml"
                    .into(),
            )
        })?;
        let request = EmailRequest::from_data(data)?;

        // Attachments are read before any network activity
        let payload = request.build_payload(self.files.as_ref())?;
        tracing::debug!(
            to = %payload.to,
            attachments = payload.attachments.len(),
            "Email built"
        );

        let mut sessions = sessions.lock().await;
        sessions.send(&request.session_request(), &payload).await?;
        Ok(())
    }
}

/// Builder for [`SmtpProvider`].
#[derive(Default)]
pub struct SmtpProviderBuilder {
    connector: Option<Arc<dyn Connector>>,
    files: Option<Arc<dyn FileSource>>,
    timeout: Option<Duration>,
    default_from: Option<String>,
}

impl SmtpProviderBuilder {
    /// Transport used to open sessions.
    pub fn connector<C: Connector + 'static>(mut self, connector: C) -> Self {
        self.connector = Some(Arc::new(connector));
        self
    }

    /// Where attachments are read from.
    pub fn files<F: FileSource + 'static>(mut self, files: F) -> Self {
        self.files = Some(Arc::new(files));
        self
    }

    /// Bound each connect/authenticate/send sequence.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Override the `from` default.
    pub fn default_from(mut self, from: impl Into<String>) -> Self {
        self.default_from = Some(from.into());
        self
    }

    pub fn build(self) -> SmtpProvider {
        let files = self.files.unwrap_or_else(|| Arc::new(FsFileSource));
        let timeout = self.timeout;
        let sessions = self.connector.or_else(default_connector).map(|connector| {
            tokio::sync::Mutex::new(SessionManager::new(connector).with_timeout(timeout))
        });

        SmtpProvider {
            schema: email_schema(),
            default_from: self.default_from.unwrap_or_else(default_from),
            files,
            sessions,
        }
    }
}

#[cfg(feature = "smtp")]
fn default_connector() -> Option<Arc<dyn Connector>> {
    Some(Arc::new(crate::transport::SmtpConnector::new()))
}

#[cfg(not(feature = "smtp"))]
fn default_connector() -> Option<Arc<dyn Connector>> {
    tracing::warn!(
        "'smtp' feature is not enabled; email delivery will fail. \
        Add `features = [\"smtp\"]` to Cargo.toml"
    );
    None
}

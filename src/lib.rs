//! # Notifiers
//!
//! Validate, normalize and dispatch notifications through pluggable
//! providers, with one result shape for every transport.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use notifiers::notify;
//! use serde_json::json;
//!
//! let response = notify(
//!     "email",
//!     json!({
//!         "message": "hi",
//!         "to": "a@example.com",
//!         "username": "u",
//!         "password": "p",
//!     })
//!     .as_object()
//!     .cloned()
//!     .unwrap_or_default(),
//! )
//! .await?;
//!
//! response.raise_on_errors()?;
//! ```
//!
//! ## Pipeline
//!
//! Every [`Provider`] shares one dispatcher:
//!
//! 1. provider [defaults](defaults) fill unset optional fields;
//! 2. the request is checked against the provider's declarative
//!    [`Schema`](schema::Schema) by the generic [validator](validator);
//! 3. the provider normalizes it (e.g. recipient lists become one header);
//! 4. the provider builds its payload and transmits it, reusing a live
//!    [session](session) when host, port and username are unchanged;
//! 5. the outcome becomes a [`Response`]; failures never escape as errors.
//!
//! ## Feature Flags
//!
//! - `smtp` - real SMTP sessions via lettre
//! - `metrics` - Prometheus-style metrics (counters/histograms)
//!
//! ## Metrics
//!
//! Enable `features = ["metrics"]` to emit:
//!
//! | Metric | Type | Labels | Description |
//! |--------|------|--------|-------------|
//! | `notifiers_dispatch_total` | Counter | provider, status | Total dispatches |
//! | `notifiers_dispatch_duration_seconds` | Histogram | provider | Dispatch duration |
//!
//! Install a recorder (e.g., `metrics-exporter-prometheus`) in your app to collect them.

/// The version of the notifiers crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod attachment;
pub mod defaults;
mod error;
pub mod payload;
mod provider;
pub mod providers;
mod response;
pub mod schema;
pub mod session;
pub mod transport;
pub mod validator;

use parking_lot::RwLock;
use std::sync::Arc;

// Re-exports
pub use error::NotificationError;
pub use provider::{dispatch, Provider};
pub use response::{Response, ResponseStatus};
pub use schema::Data;

// ============================================================================
// Provider Registry
// ============================================================================

/// Registered providers - swappable for testing
static PROVIDERS: RwLock<Vec<Arc<dyn Provider>>> = RwLock::new(Vec::new());

/// Providers that can be built without configuration in this build.
#[cfg(feature = "smtp")]
const BUILTIN: &[&str] = &["email"];
#[cfg(not(feature = "smtp"))]
const BUILTIN: &[&str] = &[];

/// Built-in provider for `name`, if any.
fn builtin(name: &str) -> Option<Arc<dyn Provider>> {
    match name {
        #[cfg(feature = "smtp")]
        "email" => Some(Arc::new(providers::SmtpProvider::new())),
        _ => None,
    }
}

/// Register a provider under its [`Provider::name`].
///
/// Replaces any provider already registered under that name.
///
/// ```rust,ignore
/// use notifiers::{register, providers::SmtpProvider, transport::MemoryConnector};
///
/// register(SmtpProvider::builder().connector(MemoryConnector::new()).build());
/// ```
pub fn register<P: Provider + 'static>(provider: P) {
    register_arc(Arc::new(provider));
}

/// Register an Arc'd provider.
pub fn register_arc(provider: Arc<dyn Provider>) {
    let mut guard = PROVIDERS.write();
    guard.retain(|p| p.name() != provider.name());
    guard.push(provider);
}

/// Get a provider by name, instantiating a built-in one on first use.
///
/// `email` is built in only with the `smtp` feature; otherwise register an
/// [`SmtpProvider`](providers::SmtpProvider) with an explicit connector.
pub fn get_provider(name: &str) -> Result<Arc<dyn Provider>, NotificationError> {
    // Fast path: already registered
    {
        let guard = PROVIDERS.read();
        if let Some(provider) = guard.iter().find(|p| p.name() == name) {
            return Ok(Arc::clone(provider));
        }
    }

    // Slow path: built-in
    let provider =
        builtin(name).ok_or_else(|| NotificationError::UnknownProvider(name.to_string()))?;
    let mut guard = PROVIDERS.write();

    // Double-check after acquiring write lock
    if let Some(existing) = guard.iter().find(|p| p.name() == name) {
        return Ok(Arc::clone(existing));
    }
    guard.push(Arc::clone(&provider));
    tracing::debug!(provider = name, "Registered built-in provider");

    Ok(provider)
}

/// Names of every available provider, registered or built-in.
pub fn all_providers() -> Vec<&'static str> {
    let mut names: Vec<&'static str> = PROVIDERS.read().iter().map(|p| p.name()).collect();
    for &name in BUILTIN {
        if !names.contains(&name) {
            names.push(name);
        }
    }
    names.sort_unstable();
    names
}

/// Dispatch `data` through the provider registered as `name`.
///
/// Only an unknown provider name is an `Err`; delivery failures are in the
/// returned [`Response`].
pub async fn notify(name: &str, data: Data) -> Result<Response, NotificationError> {
    let provider = get_provider(name)?;
    Ok(provider.send(data).await)
}

/// Drop every registered provider (useful for tests).
pub fn reset() {
    PROVIDERS.write().clear();
}

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::schema::{Data, Field, Format, OneOrMore, Schema};
    pub use crate::NotificationError;
    pub use crate::Provider;
    pub use crate::{all_providers, get_provider, notify, register};
    pub use crate::{Response, ResponseStatus};
}

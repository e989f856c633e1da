//! Provider trait and the dispatch pipeline.
//!
//! # Architecture: Why `async_trait`?
//!
//! Providers are looked up by name at runtime and stored as
//! `Arc<dyn Provider>` in the registry. Native async trait methods are not
//! object-safe, so the trait is boxed with `#[async_trait]`. Dispatch is
//! network-bound; the allocation per call does not show up.
//!
//! # Pipeline
//!
//! [`dispatch`] is shared by every provider:
//!
//! 1. merge the provider's defaults into the raw request;
//! 2. validate the merged request against the provider's schema;
//! 3. let the provider normalize it;
//! 4. hand it to [`Provider::deliver`];
//! 5. fold the outcome into a [`Response`].
//!
//! Nothing escapes as an error; every failure ends up in `Response::errors`.

use async_trait::async_trait;
use tracing::Instrument;

#[cfg(feature = "metrics")]
use std::time::Instant;

use crate::defaults::{self, Defaults};
use crate::error::NotificationError;
use crate::response::Response;
use crate::schema::{Data, Schema};
use crate::validator;

/// A pluggable notification transport.
///
/// Implementors declare their schema and defaults, optionally reshape
/// validated data, and deliver it. [`send`](Self::send) runs the whole
/// pipeline and should not be overridden.
///
/// ```rust,ignore
/// use notifiers::{Provider, schema::Data};
///
/// let response = provider.send(data).await;
/// if !response.ok() {
///     eprintln!("{:?}", response.errors());
/// }
/// ```
#[async_trait]
pub trait Provider: Send + Sync {
    /// Registry name (e.g. `"email"`).
    fn name(&self) -> &'static str;

    /// Where to read about the underlying service.
    fn site_url(&self) -> &'static str {
        ""
    }

    /// Accepted fields and their constraints.
    fn schema(&self) -> &Schema;

    /// Values for optional fields the caller leaves unset.
    fn defaults(&self) -> Defaults {
        Defaults::new()
    }

    /// Reshape validated data into the form [`deliver`](Self::deliver)
    /// expects. Must be idempotent.
    fn normalize(&self, data: Data) -> Data {
        data
    }

    /// Transmit normalized data.
    async fn deliver(&self, data: &Data) -> Result<(), NotificationError>;

    /// Required field names.
    fn required(&self) -> Vec<&'static str> {
        self.schema().required_fields().to_vec()
    }

    /// All declared field names.
    fn arguments(&self) -> Vec<&'static str> {
        self.schema().arguments()
    }

    /// Merge, validate, normalize and deliver `request`.
    async fn send(&self, request: Data) -> Response {
        dispatch(self, request).await
    }
}

/// Run the dispatch pipeline for `provider`.
pub async fn dispatch<P>(provider: &P, request: Data) -> Response
where
    P: Provider + ?Sized,
{
    let name = provider.name();
    let span = tracing::info_span!("notifiers.send", provider = name);

    async move {
        #[cfg(feature = "metrics")]
        let start = Instant::now();

        let response = run(provider, request).await;

        #[cfg(feature = "metrics")]
        {
            let duration = start.elapsed().as_secs_f64();
            let status = if response.ok() { "success" } else { "error" };
            metrics::counter!("notifiers_dispatch_total", "provider" => name, "status" => status)
                .increment(1);
            metrics::histogram!("notifiers_dispatch_duration_seconds", "provider" => name)
                .record(duration);
        }

        response
    }
    .instrument(span)
    .await
}

async fn run<P>(provider: &P, request: Data) -> Response
where
    P: Provider + ?Sized,
{
    let name = provider.name();
    let merged = defaults::merge(&provider.defaults(), request);

    if let Err(err) = validator::validate(provider.schema(), &merged) {
        let err = NotificationError::from(err);
        tracing::warn!(error = %err, "Request rejected");
        return Response::from_error(name, merged, &err);
    }

    let data = provider.normalize(merged);
    tracing::debug!("Delivering notification");

    match provider.deliver(&data).await {
        Ok(()) => {
            tracing::info!("Notification delivered");
            Response::success(name, data)
        }
        Err(err) if err.is_pre_transport() => {
            tracing::warn!(error = %err, "Notification not sent");
            Response::from_error(name, data, &err)
        }
        Err(err) => {
            tracing::error!(error = %err, "Notification delivery failed");
            Response::from_error(name, data, &err)
        }
    }
}

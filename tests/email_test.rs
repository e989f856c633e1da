//! End-to-end dispatch tests for the email provider.
//!
//! Every test drives `SmtpProvider` through `MemoryConnector` and
//! `MemoryFiles`, so nothing touches the network or the filesystem.

use std::time::Duration;

use notifiers::attachment::MemoryFiles;
use notifiers::payload::BodyKind;
use notifiers::providers::email::{email_schema, DEFAULT_SUBJECT};
use notifiers::providers::SmtpProvider;
use notifiers::transport::{MemoryConnector, Security, Step, TransportError, TransportEvent};
use notifiers::validator::{validate, Violation};
use notifiers::{Data, NotificationError, Provider, ResponseStatus};
use serde_json::{json, Value};

fn data(value: Value) -> Data {
    value.as_object().cloned().expect("test data must be an object")
}

fn base() -> Value {
    json!({"message": "hi", "to": "a@x.com", "username": "u", "password": "p"})
}

fn with(extra: Value) -> Data {
    let mut request = data(base());
    request.extend(data(extra));
    request
}

fn provider(connector: &MemoryConnector) -> SmtpProvider {
    SmtpProvider::builder()
        .connector(connector.clone())
        .files(MemoryFiles::new())
        .default_from("me@example.com")
        .build()
}

// ============================================================================
// Defaults
// ============================================================================

#[tokio::test]
async fn defaults_fill_connection_and_message_fields() {
    let connector = MemoryConnector::new();
    let provider = provider(&connector);

    let response = provider.send(data(base())).await;

    assert!(response.ok(), "{:?}", response.errors());
    assert_eq!(response.status(), ResponseStatus::Success);
    assert_eq!(response.provider, "email");
    assert_eq!(response.data.get("host"), Some(&json!("localhost")));
    assert_eq!(response.data.get("port"), Some(&json!(25)));
    assert_eq!(response.data.get("subject"), Some(&json!(DEFAULT_SUBJECT)));

    assert_eq!(connector.connect_count(), 1);
    let events = connector.events();
    match &events[0] {
        TransportEvent::Connect(endpoint) => {
            assert_eq!(endpoint.host, "localhost");
            assert_eq!(endpoint.port, 25);
            assert_eq!(endpoint.security, Security::None);
        }
        other => panic!("expected connect, got {other:?}"),
    }

    let sent = connector.transmitted();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, "a@x.com");
    assert_eq!(sent[0].from, "me@example.com");
    assert_eq!(sent[0].subject, DEFAULT_SUBJECT);
    assert_eq!(sent[0].body.kind, BodyKind::Plain);
    assert_eq!(sent[0].body.content, "hi");
    assert!(sent[0].attachments.is_empty());
}

#[tokio::test]
async fn caller_values_win_over_defaults() {
    let connector = MemoryConnector::new();
    let provider = provider(&connector);

    let response = provider
        .send(with(json!({
            "subject": "Deploy",
            "host": "smtp.example.com",
            "port": 587,
            "tls": true,
            "html": true,
            "from": "ops@example.com",
        })))
        .await;

    assert!(response.ok(), "{:?}", response.errors());
    let events = connector.events();
    assert_eq!(
        events[..2],
        [
            TransportEvent::Connect(notifiers::transport::Endpoint {
                host: "smtp.example.com".into(),
                port: 587,
                security: Security::StartTls,
            }),
            TransportEvent::Upgrade,
        ]
    );

    let sent = connector.transmitted();
    assert_eq!(sent[0].subject, "Deploy");
    assert_eq!(sent[0].from, "ops@example.com");
    assert_eq!(sent[0].body.kind, BodyKind::Html);
}

#[tokio::test]
async fn from_alias_is_honoured() {
    let connector = MemoryConnector::new();
    let provider = provider(&connector);

    let response = provider.send(with(json!({"from_": "alias@example.com"}))).await;

    assert!(response.ok(), "{:?}", response.errors());
    assert!(response.data.get("from_").is_none());
    assert_eq!(connector.transmitted()[0].from, "alias@example.com");
}

// ============================================================================
// Recipients
// ============================================================================

#[tokio::test]
async fn recipient_list_is_joined_into_one_header() {
    let connector = MemoryConnector::new();
    let provider = provider(&connector);

    let response = provider.send(with(json!({"to": ["a@x.com", "b@x.com"]}))).await;

    assert!(response.ok(), "{:?}", response.errors());
    assert_eq!(response.data.get("to"), Some(&json!("a@x.com,b@x.com")));
    let sent = connector.transmitted();
    assert_eq!(sent[0].to, "a@x.com,b@x.com");
    assert_eq!(sent[0].recipients(), vec!["a@x.com", "b@x.com"]);
}

#[tokio::test]
async fn empty_recipient_list_is_rejected() {
    let connector = MemoryConnector::new();
    let provider = provider(&connector);

    let response = provider.send(with(json!({"to": []}))).await;

    assert!(!response.ok());
    assert!(connector.is_untouched());
}

// ============================================================================
// Validation failures never reach the transport
// ============================================================================

#[tokio::test]
async fn missing_required_field_makes_no_transport_calls() {
    let connector = MemoryConnector::new();
    let provider = provider(&connector);

    let mut request = data(base());
    request.remove("message");
    let response = provider.send(request).await;

    assert_eq!(response.status(), ResponseStatus::Failure);
    assert_eq!(response.errors(), &["'message' is a required property".to_string()]);
    // merged data is echoed back on configuration errors
    assert_eq!(response.data.get("host"), Some(&json!("localhost")));
    assert!(connector.is_untouched());
}

#[tokio::test]
async fn unknown_field_is_rejected() {
    let connector = MemoryConnector::new();
    let provider = provider(&connector);

    let response = provider.send(with(json!({"cc": "b@x.com"}))).await;

    assert_eq!(
        response.errors(),
        &["Additional properties are not allowed ('cc' was unexpected)".to_string()]
    );
    assert!(connector.is_untouched());
}

#[tokio::test]
async fn type_and_format_errors_are_all_reported() {
    let connector = MemoryConnector::new();
    let provider = provider(&connector);

    let response = provider
        .send(with(json!({"to": "not-an-email", "port": "smtp", "host": "bad host"})))
        .await;

    assert!(!response.ok());
    assert!(response.errors().len() >= 3, "{:?}", response.errors());
    assert!(connector.is_untouched());
}

#[tokio::test]
async fn username_without_password_fails_before_transport() {
    let connector = MemoryConnector::new();
    let provider = provider(&connector);

    let response = provider
        .send(data(json!({"message": "hi", "to": "a@x.com", "username": "u"})))
        .await;

    assert_eq!(response.errors(), &["'password' is a required property".to_string()]);
    assert!(connector.is_untouched());
}

#[tokio::test]
async fn empty_username_skips_authentication() {
    let connector = MemoryConnector::new();
    let provider = provider(&connector);

    let response = provider
        .send(with(json!({"username": "", "password": ""})))
        .await;

    assert!(response.ok(), "{:?}", response.errors());
    assert_eq!(connector.connect_count(), 1);
    assert_eq!(connector.auth_count(), 0);
    assert_eq!(connector.transmitted().len(), 1);
    assert_eq!(
        provider.session_identity().await.map(|identity| identity.username),
        Some(None)
    );
}

#[test]
fn ssl_without_tls_violates_dependency_before_defaults() {
    let request = with(json!({"ssl": true}));
    let err = validate(&email_schema(), &request).unwrap_err();

    assert_eq!(
        err.violations(),
        &[Violation::Dependency {
            field: "ssl".into(),
            missing: "tls".into(),
        }]
    );
}

// `ssl` depends on `tls` by key presence. Defaults are merged before
// validation and supply `tls=false`, so a request that sets only `ssl`
// passes and connects with implicit TLS. The raw request case above is the
// one that violates the dependency.
#[tokio::test]
async fn ssl_with_defaulted_tls_uses_implicit_tls() {
    let connector = MemoryConnector::new();
    let provider = provider(&connector);

    let response = provider.send(with(json!({"ssl": true, "port": 465}))).await;

    assert!(response.ok(), "{:?}", response.errors());
    match &connector.events()[0] {
        TransportEvent::Connect(endpoint) => assert_eq!(endpoint.security, Security::Implicit),
        other => panic!("expected connect, got {other:?}"),
    }
    assert!(!connector.events().contains(&TransportEvent::Upgrade));
}

// ============================================================================
// Attachments
// ============================================================================

#[tokio::test]
async fn attachments_are_read_in_order() {
    let connector = MemoryConnector::new();
    let files = MemoryFiles::new()
        .with_file("/srv/report.pdf", b"%PDF".to_vec())
        .with_file("/srv/notes.txt", b"notes".to_vec());
    let provider = SmtpProvider::builder()
        .connector(connector.clone())
        .files(files)
        .default_from("me@example.com")
        .build();

    let response = provider
        .send(with(json!({"attachments": ["/srv/report.pdf", "/srv/notes.txt"]})))
        .await;

    assert!(response.ok(), "{:?}", response.errors());
    let sent = connector.transmitted();
    let attachments = &sent[0].attachments;
    assert_eq!(attachments.len(), 2);
    assert_eq!(attachments[0].filename, "report.pdf");
    assert_eq!(attachments[0].content_type, "application/pdf");
    assert_eq!(attachments[1].filename, "notes.txt");
    assert_eq!(attachments[1].data, b"notes");
}

#[tokio::test]
async fn missing_attachment_is_a_resource_error_without_transport_calls() {
    let connector = MemoryConnector::new();
    let provider = provider(&connector);

    let response = provider.send(with(json!({"attachments": "/nope/missing.pdf"}))).await;

    assert!(!response.ok());
    assert_eq!(
        response.errors(),
        &["Resource error: Attachment file not found: /nope/missing.pdf".to_string()]
    );
    assert!(connector.is_untouched());
}

// ============================================================================
// Transport failures
// ============================================================================

#[tokio::test]
async fn authentication_failure_is_reported_and_resets_session() {
    let connector = MemoryConnector::new();
    connector.fail_once(
        Step::Authenticate,
        TransportError::Authentication("535 bad credentials".into()),
    );
    let provider = provider(&connector);

    let response = provider.send(data(base())).await;
    assert_eq!(
        response.errors(),
        &["Authentication error: 535 bad credentials".to_string()]
    );
    assert!(provider.session_identity().await.is_none());

    let response = provider.send(data(base())).await;
    assert!(response.ok(), "{:?}", response.errors());
    assert_eq!(connector.connect_count(), 2);
}

#[tokio::test]
async fn rejected_send_keeps_session() {
    let connector = MemoryConnector::new();
    connector.fail_once(Step::Transmit, TransportError::SendRejected("550 no such user".into()));
    let provider = provider(&connector);

    let response = provider.send(data(base())).await;
    assert_eq!(
        response.errors(),
        &["Transmission error: 550 no such user".to_string()]
    );
    assert!(provider.session_identity().await.is_some());

    let response = provider.send(data(base())).await;
    assert!(response.ok());
    assert_eq!(connector.connect_count(), 1);
}

#[tokio::test]
async fn disconnect_resets_session() {
    let connector = MemoryConnector::new();
    connector.fail_once(Step::Transmit, TransportError::Disconnected("eof".into()));
    let provider = provider(&connector);

    let response = provider.send(data(base())).await;
    assert_eq!(
        response.errors(),
        &["Connection error: server disconnected: eof".to_string()]
    );
    assert!(provider.session_identity().await.is_none());

    let err = response.raise_on_errors().unwrap_err();
    assert!(matches!(err, NotificationError::Delivery { provider: "email", .. }));
}

#[tokio::test(start_paused = true)]
async fn slow_exchange_times_out() {
    let connector = MemoryConnector::new();
    connector.set_transmit_delay(Duration::from_secs(30));
    let provider = SmtpProvider::builder()
        .connector(connector.clone())
        .default_from("me@example.com")
        .timeout(Duration::from_secs(5))
        .build();

    let response = provider.send(data(base())).await;

    assert_eq!(response.errors(), &["Timed out after 5s".to_string()]);
    assert!(provider.session_identity().await.is_none());
}

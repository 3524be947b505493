//! Integration tests for the mail sink client

use odp_common::config::{MailSettings, Recipient};
use odp_common::Secret;
use odp_ingest::mail::{error_report, MailClient, MailError};
use serde_json::json;
use wiremock::{
    matchers::{body_partial_json, header, method, path},
    Mock, MockServer, ResponseTemplate,
};

fn settings(server: &MockServer) -> MailSettings {
    MailSettings {
        api_base: format!("{}/", server.uri()),
        sender: "Analyse <analyse@telemarkfylke.no>".into(),
        recipients: vec![Recipient::new("Kari", "kari@example.no")],
        key: Secret::new("fn-key"),
    }
}

#[tokio::test]
async fn test_send_posts_message_with_function_key() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/mail"))
        .and(header("x-functions-key", "fn-key"))
        .and(body_partial_json(json!({
            "to": ["kari@example.no"],
            "from": "Analyse <analyse@telemarkfylke.no>",
            "subject": "Spørring feilet i script Bosatt"
        })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let settings = settings(&server);
    let message = error_report(
        "Bosatt",
        &settings.sender,
        &["kari@example.no".to_string()],
        &["HTTP 500".to_string()],
    );
    MailClient::new(&settings).send(&message).await.unwrap();
}

#[tokio::test]
async fn test_rejected_message_is_status_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(401).set_body_string("missing key"))
        .mount(&server)
        .await;

    let settings = settings(&server);
    let message = error_report("Bosatt", &settings.sender, &[], &[]);
    let err = MailClient::new(&settings).send(&message).await.unwrap_err();

    match err {
        MailError::Status { status, detail } => {
            assert_eq!(status, 401);
            assert_eq!(detail, "missing key");
        },
        other => panic!("unexpected error: {other}"),
    }
}

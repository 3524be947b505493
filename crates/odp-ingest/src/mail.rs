//! Mail sink client
//!
//! The sink is an HTTP function: `POST {api_base}/api/mail` with a JSON
//! message and the function key in `x-functions-key`.

use std::time::Duration;

use odp_common::config::MailSettings;
use odp_common::Secret;
use reqwest::Client;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, instrument};

pub const DEFAULT_MAIL_TIMEOUT_SECS: u64 = 30;
const FUNCTIONS_KEY_HEADER: &str = "x-functions-key";

#[derive(Error, Debug)]
pub enum MailError {
    #[error("Mail sink unreachable: {0}")]
    Transport(String),

    #[error("Mail sink answered HTTP {status}: {detail}")]
    Status { status: u16, detail: String },
}

/// One message as the sink expects it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MailMessage {
    pub to: Vec<String>,
    pub from: String,
    pub subject: String,
    pub text: String,
    pub html: String,
}

pub struct MailClient {
    client: Client,
    endpoint: String,
    key: Secret,
}

impl MailClient {
    pub fn new(settings: &MailSettings) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(DEFAULT_MAIL_TIMEOUT_SECS))
            .build()
            .unwrap_or_default();
        Self {
            client,
            endpoint: format!("{}/api/mail", settings.api_base.trim_end_matches('/')),
            key: settings.key.clone(),
        }
    }

    #[instrument(skip(self, message), fields(to = ?message.to, subject = %message.subject))]
    pub async fn send(&self, message: &MailMessage) -> Result<(), MailError> {
        let response = self
            .client
            .post(&self.endpoint)
            .header(FUNCTIONS_KEY_HEADER, self.key.expose())
            .json(message)
            .send()
            .await
            .map_err(|e| MailError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(MailError::Status {
                status: status.as_u16(),
                detail,
            });
        }
        debug!("Mail accepted");
        Ok(())
    }
}

/// Escape text for inclusion in an HTML body
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}

/// Error report sent by an extractor that failed
pub fn error_report(task_name: &str, sender: &str, recipients: &[String], errors: &[String]) -> MailMessage {
    let subject = format!("Spørring feilet i script {task_name}");
    let text = format!(
        "Følgende feil oppstod under kjøring av {task_name}:\n\n{}\n",
        errors.join("\n")
    );
    let items: String = errors
        .iter()
        .map(|e| format!("<li><pre>{}</pre></li>", escape_html(e)))
        .collect();
    let html = format!(
        "<p>Følgende feil oppstod under kjøring av <b>{}</b>:</p><ul>{items}</ul>",
        escape_html(task_name)
    );
    MailMessage {
        to: recipients.to_vec(),
        from: sender.to_string(),
        subject,
        text,
        html,
    }
}

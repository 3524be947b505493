//! Daily run summary
//!
//! Reads the master log back, renders the new-data rows first and the rest
//! dimmed below them, and mails one message per recipient. The plain-text
//! part is the master log itself.

use std::fmt::Write as _;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{Local, NaiveDate};
use odp_common::config::{MailSettings, Recipient};
use odp_common::Outcome;
use odp_ingest::mail::{escape_html, MailClient, MailMessage};
use tracing::{info, instrument, warn};

use crate::error::{Result, RunnerError};
use crate::master_log::{read_entries, MasterEntry, EMAIL_LOG_NAME, RUN_TIMESTAMP_FORMAT};

const COMPLETED_COLOR: &str = "#32CD32";
const FAILED_COLOR: &str = "#FF4500";
const HIGHLIGHT_COLOR: &str = "#E8F5E9";
const DIM_COLOR: &str = "#9E9E9E";

/// Where a finished run's summary goes
#[async_trait]
pub trait SummarySink: Send + Sync {
    async fn dispatch(&self, master_log: &Path) -> Result<()>;
}

/// `God morgen, <name>! Her er nattens kjøringer (<dd.mm.yyyy>).`
pub fn subject(recipient_name: &str, date: NaiveDate) -> String {
    format!(
        "God morgen, {recipient_name}! Her er nattens kjøringer ({}).",
        date.format("%d.%m.%Y")
    )
}

fn pill(outcome: Outcome) -> String {
    let color = match outcome {
        Outcome::Completed => COMPLETED_COLOR,
        Outcome::Failed => FAILED_COLOR,
    };
    format!(
        "<span style='background-color: {color}; color: white; border-radius: 8px; \
         padding: 2px 5px; display: inline-block;'>{outcome}</span>"
    )
}

fn push_row(html: &mut String, entry: &MasterEntry, style: &str) {
    let _ = write!(
        html,
        "<tr style='{style}'><td>{}</td><td>{}</td><td style='text-align: left;'>{}</td>\
         <td style='text-align: left;'>{}</td><td>{}</td><td>{}</td></tr>",
        entry.date.format("%d.%m.%Y"),
        entry.time.format("%H:%M:%S"),
        escape_html(&entry.task_name),
        escape_html(&entry.script),
        pill(entry.outcome),
        if entry.new_data { "Ja" } else { "Nei" },
    );
}

/// HTML table with new-data rows first
pub fn render_html(entries: &[MasterEntry]) -> String {
    let (fresh, rest): (Vec<&MasterEntry>, Vec<&MasterEntry>) = entries.iter().partition(|e| e.new_data);

    let mut html = String::from(
        "<table style='width: 100%; border-collapse: collapse; font-size: 14px;'>\
         <thead><tr style='background-color: #000; color: white;'>\
         <th>Dato</th><th>Tid</th><th>Oppgave</th><th>Script</th><th>Status</th><th>Nye data</th>\
         </tr></thead><tbody>",
    );

    if !fresh.is_empty() {
        html.push_str("<tr><td colspan='6' style='text-align: left;'><b>Nye data</b></td></tr>");
        for entry in &fresh {
            push_row(&mut html, entry, &format!("background-color: {HIGHLIGHT_COLOR}; font-weight: bold;"));
        }
    }
    if !rest.is_empty() {
        html.push_str("<tr><td colspan='6' style='text-align: left;'><b>Ingen endring</b></td></tr>");
        for entry in &rest {
            push_row(&mut html, entry, &format!("color: {DIM_COLOR};"));
        }
    }

    html.push_str("</tbody></table>");
    html
}

pub fn compose(
    recipient: &Recipient,
    sender: &str,
    date: NaiveDate,
    entries: &[MasterEntry],
    raw_log: &str,
) -> MailMessage {
    MailMessage {
        to: vec![recipient.address.clone()],
        from: sender.to_string(),
        subject: subject(&recipient.name, date),
        text: raw_log.to_string(),
        html: render_html(entries),
    }
}

/// Mails the summary through the mail sink and records each attempt in
/// `00_email.log`
pub struct MailSummary {
    client: MailClient,
    settings: MailSettings,
    email_log: PathBuf,
}

impl MailSummary {
    pub fn new(settings: &MailSettings, log_folder: &Path) -> Self {
        Self {
            client: MailClient::new(settings),
            settings: settings.clone(),
            email_log: log_folder.join(EMAIL_LOG_NAME),
        }
    }

    fn write_email_log(&self, lines: &[String]) {
        let written = std::fs::File::create(&self.email_log).and_then(|mut file| {
            for line in lines {
                writeln!(file, "{line}")?;
            }
            Ok(())
        });
        if let Err(e) = written {
            warn!(error = %e, path = %self.email_log.display(), "Could not write email log");
        }
    }
}

#[async_trait]
impl SummarySink for MailSummary {
    #[instrument(skip(self), fields(recipients = self.settings.recipients.len()))]
    async fn dispatch(&self, master_log: &Path) -> Result<()> {
        let raw_log = std::fs::read_to_string(master_log)?;
        let entries = read_entries(master_log)?;
        let today = Local::now().date_naive();

        let mut lines = Vec::new();
        let mut failures = Vec::new();
        for recipient in &self.settings.recipients {
            let message = compose(recipient, &self.settings.sender, today, &entries, &raw_log);
            let stamp = Local::now().format(RUN_TIMESTAMP_FORMAT);
            match self.client.send(&message).await {
                Ok(()) => {
                    info!(to = %recipient.address, "Summary sent");
                    lines.push(format!("[{stamp}] Sent to {} <{}>", recipient.name, recipient.address));
                },
                Err(e) => {
                    warn!(to = %recipient.address, error = %e, "Summary not delivered");
                    lines.push(format!("[{stamp}] Failed for {} <{}>: {e}", recipient.name, recipient.address));
                    failures.push(format!("{}: {e}", recipient.address));
                },
            }
        }
        self.write_email_log(&lines);

        if failures.is_empty() {
            Ok(())
        } else {
            Err(RunnerError::notify(failures.join("; ")))
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use chrono::NaiveTime;

    fn entry(task: &str, outcome: Outcome, new_data: bool) -> MasterEntry {
        MasterEntry {
            date: NaiveDate::from_ymd_opt(2025, 1, 13).unwrap(),
            time: NaiveTime::from_hms_opt(4, 0, 1).unwrap(),
            task_name: task.into(),
            script: "x".into(),
            outcome,
            new_data,
        }
    }

    #[test]
    fn test_subject_has_salutation_and_date() {
        let date = NaiveDate::from_ymd_opt(2025, 1, 13).unwrap();
        assert_eq!(subject("Kari", date), "God morgen, Kari! Her er nattens kjøringer (13.01.2025).");
    }

    #[test]
    fn test_new_data_rows_come_first() {
        let html = render_html(&[
            entry("Unchanged", Outcome::Completed, false),
            entry("Broken", Outcome::Failed, false),
            entry("Fresh", Outcome::Completed, true),
        ]);
        let fresh = html.find("Fresh").unwrap();
        let unchanged = html.find("Unchanged").unwrap();
        let broken = html.find("Broken").unwrap();
        assert!(fresh < unchanged && unchanged < broken);
        assert!(html.contains(FAILED_COLOR));
        assert!(html.contains(COMPLETED_COLOR));
    }

    #[test]
    fn test_task_names_are_escaped() {
        let html = render_html(&[entry("<b>Alle</b>", Outcome::Completed, false)]);
        assert!(html.contains("&lt;b&gt;Alle&lt;/b&gt;"));
        assert!(!html.contains("<b>Nye data</b>"));
    }
}

//! `odp-runner notify`
//!
//! Sends the summary for the master log left by the last run.

use odp_common::Settings;

use crate::error::{Result, RunnerError};
use crate::master_log::MASTER_LOG_NAME;
use crate::summary::{MailSummary, SummarySink};

pub async fn run(settings: &Settings) -> Result<()> {
    let mail = settings.mail_settings()?;
    let master_log = settings.log_folder.join(MASTER_LOG_NAME);
    if !master_log.exists() {
        return Err(RunnerError::MasterLog(format!(
            "'{}' does not exist. Run 'odp-runner run' first.",
            master_log.display()
        )));
    }

    MailSummary::new(mail, &settings.log_folder)
        .dispatch(&master_log)
        .await?;
    println!("Summary sent to {} recipient(s).", mail.recipients.len());
    Ok(())
}

//! Renders last calendar month's trend report to PDF and mails it. Any failure before
//! the send step is reported to `ALERT_EMAIL` instead.

use anyhow::{Context, Result};
use bdx_bridge::config::ReportConfig;
use bdx_bridge::services::bdx::BdxClient;
use bdx_bridge::services::notifier::{Notifier, SmtpMailer};
use bdx_bridge::services::query::TrendQuery;
use bdx_bridge::services::report::pipeline::{run_report, ReportOutcome};
use bdx_bridge::services::report::ReportRenderer;
use bdx_bridge::telemetry;
use bdx_bridge::time::previous_calendar_month;
use chrono::Utc;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<()> {
    let config = ReportConfig::from_env()?;
    let _log_guard = telemetry::init_tracing(None)?;

    let mailer =
        Arc::new(SmtpMailer::new(&config.smtp).context("failed to build SMTP transport")?);
    let notifier = Notifier::new(mailer, &config.smtp);

    let window = previous_calendar_month(Utc::now());
    let query = TrendQuery::build(&config.component_ids, &config.properties, window);
    let renderer = ReportRenderer::new(config.title.clone(), config.output_path.clone());

    let client = BdxClient::new(&config.bdx).context("failed to build BDX client")?;
    let session = match client.open_session().await {
        Ok(session) => session,
        Err(err) => {
            tracing::error!(error = %err, "BDX login failed");
            notifier
                .send_alert(&format!("Failed to log in to BDX: {err}"))
                .await;
            return Err(err).context("failed to log in to BDX");
        }
    };

    let outcome = run_report(&session, &query, &renderer, &notifier).await;
    if let Err(err) = session.close().await {
        tracing::warn!(error = %err, "failed to close BDX session");
    }

    match outcome.context("failed to send report")? {
        ReportOutcome::Sent(path) => {
            tracing::info!(path = %path.display(), "report sent");
        }
        ReportOutcome::Alerted(message) => {
            tracing::warn!(%message, "report not produced; alert sent");
        }
    }
    Ok(())
}

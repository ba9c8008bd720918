use std::path::PathBuf;

use crate::error::TransportError;
use crate::services::bdx::TrendSource;
use crate::services::notifier::Notifier;
use crate::services::query::TrendQuery;
use crate::services::report::ReportRenderer;
use crate::services::reshape::{to_document_tables, Reshaped};

#[derive(Debug, Clone, PartialEq)]
pub enum ReportOutcome {
    /// The report was rendered and mailed.
    Sent(PathBuf),
    /// Something upstream of the send failed; an alert went out instead.
    Alerted(String),
}

/// Runs one report: query → reshape → render → send. Every failure before the send
/// step becomes a single alert email; a failed report send is returned to the caller.
pub async fn run_report(
    source: &dyn TrendSource,
    query: &TrendQuery,
    renderer: &ReportRenderer,
    notifier: &Notifier,
) -> Result<ReportOutcome, TransportError> {
    tracing::info!(
        start = %query.window.start(),
        end = %query.window.end(),
        series = query.properties.len(),
        "generating report"
    );

    let table = match source.retrieve(query).await {
        Ok(table) => table,
        Err(err) => {
            tracing::error!(error = %err, "trend retrieval failed");
            return Ok(alert(notifier, format!("Failed to retrieve trend data: {err}")).await);
        }
    };

    let tables = match to_document_tables(&table) {
        Ok(Reshaped::Data(tables)) => tables,
        Ok(Reshaped::NoData) => {
            tracing::warn!(shape = %table.shape(), "no data returned for reporting period");
            return Ok(alert(notifier, "No data available for the reporting period".to_string()).await);
        }
        Err(err) => {
            tracing::error!(
                error = %err,
                shape = %table.shape(),
                columns = ?table.labels(),
                "failed to reshape trend table"
            );
            return Ok(alert(notifier, format!("Failed to reshape trend data: {err}")).await);
        }
    };

    let path = match renderer.render(&tables, &query.window) {
        Ok(path) => path,
        Err(err) => {
            tracing::error!(error = %err, "error generating PDF");
            return Ok(alert(notifier, format!("Failed to generate PDF report: {err}")).await);
        }
    };

    let sent = notifier.send_report(&path).await;
    if let Err(err) = std::fs::remove_file(&path) {
        tracing::warn!(path = %path.display(), error = %err, "failed to remove rendered report");
    }
    sent?;
    Ok(ReportOutcome::Sent(path))
}

async fn alert(notifier: &Notifier, message: String) -> ReportOutcome {
    notifier.send_alert(&message).await;
    ReportOutcome::Alerted(message)
}

use futures::future::BoxFuture;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::config::{BdxConfig, GatewayConfig, SmtpConfig};
use crate::error::{SourceError, TransportError};
use crate::rate_limit::RateLimiter;
use crate::services::bdx::TrendSource;
use crate::services::notifier::{Mailer, OutgoingMail};
use crate::services::query::{PropertyDescriptor, TrendQuery};
use crate::services::reshape::{SeriesColumn, SeriesTable};
use crate::state::AppState;

pub fn test_bdx_config() -> BdxConfig {
    BdxConfig {
        base_url: "http://127.0.0.1:9".to_string(),
        username: "report-bot".to_string(),
        password: "secret".to_string(),
        request_timeout: Duration::from_secs(1),
    }
}

pub fn test_gateway_config() -> GatewayConfig {
    GatewayConfig {
        bdx: test_bdx_config(),
        rate_limit_per_minute: 20,
        log_dir: None,
    }
}

pub fn test_smtp_config() -> SmtpConfig {
    SmtpConfig {
        server: "smtp.example.com".to_string(),
        port: 587,
        username: "reports@example.com".to_string(),
        password: "hunter2".to_string(),
        receiver: "facilities@example.com".to_string(),
        alert_receiver: "oncall@example.com".to_string(),
    }
}

pub fn test_state(source: Arc<dyn TrendSource>) -> AppState {
    let config = test_gateway_config();
    AppState {
        limiter: Arc::new(RateLimiter::per_minute(config.rate_limit_per_minute)),
        config,
        source,
    }
}

/// Builds a table from `(timestamp, [value per column])` rows.
pub fn table(columns: &[(i64, &str)], rows: &[(Option<&str>, Vec<Option<f64>>)]) -> SeriesTable {
    let index = rows.iter().map(|(ts, _)| ts.map(str::to_string)).collect();
    let columns = columns
        .iter()
        .enumerate()
        .map(|(i, (component_id, property))| SeriesColumn {
            descriptor: PropertyDescriptor::new(*component_id, *property),
            values: rows.iter().map(|(_, values)| values[i]).collect(),
        })
        .collect();
    SeriesTable::new(index, columns)
}

/// Trend source returning a canned result and recording every query it saw.
pub struct StaticSource {
    result: Result<SeriesTable, String>,
    queries: Mutex<Vec<TrendQuery>>,
}

impl StaticSource {
    pub fn new(table: SeriesTable) -> Self {
        Self {
            result: Ok(table),
            queries: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            result: Err(message.to_string()),
            queries: Mutex::new(Vec::new()),
        }
    }

    pub fn queries(&self) -> Vec<TrendQuery> {
        self.queries.lock().expect("queries lock").clone()
    }
}

impl TrendSource for StaticSource {
    fn retrieve<'a>(
        &'a self,
        query: &'a TrendQuery,
    ) -> BoxFuture<'a, Result<SeriesTable, SourceError>> {
        self.queries.lock().expect("queries lock").push(query.clone());
        let result = self
            .result
            .clone()
            .map_err(SourceError::Decode);
        Box::pin(async move { result })
    }
}

/// Mailer that records messages instead of sending them.
#[derive(Default)]
pub struct RecordingMailer {
    fail: bool,
    attempts: AtomicUsize,
    sent: Mutex<Vec<OutgoingMail>>,
}

impl RecordingMailer {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn sent(&self) -> Vec<OutgoingMail> {
        self.sent.lock().expect("sent lock").clone()
    }
}

impl Mailer for RecordingMailer {
    fn send(&self, mail: OutgoingMail) -> BoxFuture<'_, Result<(), TransportError>> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let result = if self.fail {
            Err(TransportError::ContentType("simulated transport failure".to_string()))
        } else {
            self.sent.lock().expect("sent lock").push(mail);
            Ok(())
        };
        Box::pin(async move { result })
    }
}

use anyhow::{anyhow, Context, Result};
use dotenvy::dotenv;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::services::query::{parse_component_ids, parse_properties};

const DEFAULT_RATE_LIMIT_PER_MINUTE: u64 = 20;
const DEFAULT_REPORT_OUTPUT_PATH: &str = "output/automated_report.pdf";
const DEFAULT_REPORT_TITLE: &str = "Automated Report";

#[derive(Debug, Clone)]
pub struct BdxConfig {
    pub base_url: String,
    pub username: String,
    pub password: String,
    pub request_timeout: Duration,
}

impl BdxConfig {
    pub fn from_env() -> Result<Self> {
        let base_url = env_string("BDX_URL", None)?;
        url::Url::parse(&base_url).context("invalid BDX_URL")?;
        Ok(Self {
            base_url,
            username: env_string("BDX_USER", None)?,
            password: env_string("BDX_PASS", None)?,
            request_timeout: Duration::from_secs(env_u64("BDX_REQUEST_TIMEOUT_SECS", Some(30))?),
        })
    }
}

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub bdx: BdxConfig,
    pub rate_limit_per_minute: u32,
    pub log_dir: Option<PathBuf>,
}

impl GatewayConfig {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();

        let rate_limit_per_minute = env_u64(
            "BDX_GATEWAY_RATE_LIMIT_PER_MINUTE",
            Some(DEFAULT_RATE_LIMIT_PER_MINUTE),
        )?;
        if rate_limit_per_minute == 0 || rate_limit_per_minute > u64::from(u32::MAX) {
            return Err(anyhow!(
                "BDX_GATEWAY_RATE_LIMIT_PER_MINUTE must be between 1 and {}",
                u32::MAX
            ));
        }

        Ok(Self {
            bdx: BdxConfig::from_env()?,
            rate_limit_per_minute: rate_limit_per_minute as u32,
            log_dir: env_optional("BDX_GATEWAY_LOG_DIR").map(PathBuf::from),
        })
    }
}

#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub server: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub receiver: String,
    pub alert_receiver: String,
}

impl SmtpConfig {
    pub fn from_env() -> Result<Self> {
        let port = env_u64("SMTP_PORT", Some(587))?;
        let port = u16::try_from(port).context("invalid SMTP_PORT")?;
        Ok(Self {
            server: env_string("SMTP_SERVER", None)?,
            port,
            username: env_string("SMTP_USERNAME", None)?,
            password: env_string("SMTP_PASSWORD", None)?,
            receiver: env_string("RECEIVER_EMAIL", None)?,
            alert_receiver: env_string("ALERT_EMAIL", None)?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct ReportConfig {
    pub bdx: BdxConfig,
    pub smtp: SmtpConfig,
    pub component_ids: Vec<i64>,
    pub properties: Vec<String>,
    pub output_path: PathBuf,
    pub title: String,
}

impl ReportConfig {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();

        let component_ids = parse_component_ids(&env_string("REPORT_COMPONENT_IDS", None)?)
            .context("invalid REPORT_COMPONENT_IDS")?;
        let properties = parse_properties(env_optional("REPORT_PROPERTIES").as_deref());

        Ok(Self {
            bdx: BdxConfig::from_env()?,
            smtp: SmtpConfig::from_env()?,
            component_ids,
            properties,
            output_path: PathBuf::from(env_string(
                "REPORT_OUTPUT_PATH",
                Some(DEFAULT_REPORT_OUTPUT_PATH.to_string()),
            )?),
            title: env_string("REPORT_TITLE", Some(DEFAULT_REPORT_TITLE.to_string()))?,
        })
    }
}

fn env_string(key: &str, default: Option<String>) -> Result<String> {
    match env_optional(key) {
        Some(value) => Ok(value),
        None => default.ok_or_else(|| anyhow!("missing env var {key}")),
    }
}

fn env_u64(key: &str, default: Option<u64>) -> Result<u64> {
    match env_optional(key) {
        Some(value) => value
            .parse::<u64>()
            .with_context(|| format!("invalid {key}")),
        None => default.ok_or_else(|| anyhow!("missing env var {key}")),
    }
}

fn env_optional(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

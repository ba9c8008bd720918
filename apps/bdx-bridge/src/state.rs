use std::sync::Arc;

use crate::config::GatewayConfig;
use crate::rate_limit::RateLimiter;
use crate::services::bdx::TrendSource;

#[derive(Clone)]
pub struct AppState {
    pub config: GatewayConfig,
    pub source: Arc<dyn TrendSource>,
    pub limiter: Arc<RateLimiter>,
}

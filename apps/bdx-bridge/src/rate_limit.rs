use std::collections::{HashMap, VecDeque};
use std::net::IpAddr;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

pub const RATE_LIMIT_WINDOW: Duration = Duration::from_secs(60);

/// Per-client sliding-window log: at most `limit` accepted requests in any `window`.
/// Rejected requests are not recorded, so a client hammering the gateway gets back in
/// as soon as its oldest accepted request ages out.
pub struct RateLimiter {
    limit: usize,
    window: Duration,
    hits: Mutex<HashMap<IpAddr, VecDeque<Instant>>>,
}

impl RateLimiter {
    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            limit: limit.max(1) as usize,
            window,
            hits: Mutex::new(HashMap::new()),
        }
    }

    pub fn per_minute(limit: u32) -> Self {
        Self::new(limit, RATE_LIMIT_WINDOW)
    }

    /// Records a request from `client`. `Err` carries how long until a slot frees up.
    pub fn check(&self, client: IpAddr) -> Result<(), Duration> {
        self.check_at(client, Instant::now())
    }

    fn check_at(&self, client: IpAddr, now: Instant) -> Result<(), Duration> {
        let mut hits = self.hits.lock().unwrap_or_else(PoisonError::into_inner);
        let log = hits.entry(client).or_default();
        while log
            .front()
            .is_some_and(|at| now.saturating_duration_since(*at) >= self.window)
        {
            log.pop_front();
        }
        if log.len() >= self.limit {
            let oldest = log.front().copied().unwrap_or(now);
            return Err(self
                .window
                .saturating_sub(now.saturating_duration_since(oldest)));
        }
        log.push_back(now);
        Ok(())
    }

    /// Forgets clients with no accepted request inside the window.
    pub fn retain_recent(&self) {
        self.retain_recent_at(Instant::now());
    }

    fn retain_recent_at(&self, now: Instant) {
        let mut hits = self.hits.lock().unwrap_or_else(PoisonError::into_inner);
        hits.retain(|_, log| {
            log.back()
                .is_some_and(|at| now.saturating_duration_since(*at) < self.window)
        });
    }

    pub fn tracked_clients(&self) -> usize {
        self.hits
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CLIENT: IpAddr = IpAddr::V4(std::net::Ipv4Addr::new(10, 0, 0, 7));
    const OTHER: IpAddr = IpAddr::V4(std::net::Ipv4Addr::new(10, 0, 0, 8));

    #[test]
    fn twenty_first_request_in_a_rolling_minute_is_rejected() {
        let limiter = RateLimiter::per_minute(20);
        let start = Instant::now();
        for i in 0..20 {
            let at = start + Duration::from_secs(i);
            assert!(limiter.check_at(CLIENT, at).is_ok(), "request {}", i + 1);
        }

        // Well past any token-bucket refill interval, still inside the minute.
        let retry = limiter
            .check_at(CLIENT, start + Duration::from_secs(30))
            .unwrap_err();
        assert_eq!(retry, Duration::from_secs(30));
        assert!(limiter
            .check_at(CLIENT, start + Duration::from_millis(59_999))
            .is_err());

        // The first request ages out at exactly one minute.
        assert!(limiter.check_at(CLIENT, start + Duration::from_secs(60)).is_ok());
        assert!(limiter.check_at(CLIENT, start + Duration::from_secs(60)).is_err());
    }

    #[test]
    fn clients_are_limited_independently() {
        let limiter = RateLimiter::per_minute(2);
        let now = Instant::now();
        assert!(limiter.check_at(CLIENT, now).is_ok());
        assert!(limiter.check_at(CLIENT, now).is_ok());
        assert!(limiter.check_at(CLIENT, now).is_err());
        assert!(limiter.check_at(OTHER, now).is_ok());
    }

    #[test]
    fn pruning_drops_idle_clients_only() {
        let limiter = RateLimiter::per_minute(5);
        let start = Instant::now();
        limiter.check_at(CLIENT, start).expect("first");
        limiter
            .check_at(OTHER, start + Duration::from_secs(30))
            .expect("other");

        limiter.retain_recent_at(start + Duration::from_secs(61));
        assert_eq!(limiter.tracked_clients(), 1);
        limiter.retain_recent_at(start + Duration::from_secs(91));
        assert_eq!(limiter.tracked_clients(), 0);
    }
}

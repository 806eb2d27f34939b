//! Sliding-window rate limiting for venue REST endpoints.
//!
//! Each endpoint category (market data vs private) has its own bucket,
//! and every venue additionally has an IP-wide bucket shared across its
//! categories. Callers are never rejected — `acquire` suspends until the
//! request fits inside the window.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::trace;

/// A single rate-limit rule: at most `max_requests` within `window`.
#[derive(Debug, Clone, Copy)]
pub struct RateLimit {
    pub max_requests: u32,
    pub window: Duration,
}

impl RateLimit {
    const fn per_second(max_requests: u32) -> Self {
        Self {
            max_requests,
            window: Duration::from_secs(1),
        }
    }

    const fn per_minute(max_requests: u32) -> Self {
        Self {
            max_requests,
            window: Duration::from_secs(60),
        }
    }

    const fn new(max_requests: u32, window_secs: u64) -> Self {
        Self {
            max_requests,
            window: Duration::from_secs(window_secs),
        }
    }
}

/// Per-key request timestamp windows, shared by all adapters.
pub struct RateLimiter {
    limits: HashMap<&'static str, RateLimit>,
    ip_limits: HashMap<&'static str, RateLimit>,
    windows: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        let mut limits = HashMap::new();
        limits.insert("mexc_market", RateLimit::per_second(20));
        limits.insert("mexc_private", RateLimit::per_minute(60));
        limits.insert("bybit_market", RateLimit::per_second(50));
        limits.insert("bybit_private", RateLimit::per_minute(600));
        limits.insert("okx_market", RateLimit::new(20, 2));
        limits.insert("okx_private", RateLimit::per_minute(300));
        limits.insert("kucoin_market", RateLimit::per_second(30));
        limits.insert("kucoin_private", RateLimit::per_minute(180));
        limits.insert("gateio_market", RateLimit::per_minute(300));
        limits.insert("gateio_private", RateLimit::per_minute(180));
        limits.insert("bitget_market", RateLimit::per_second(20));
        limits.insert("bitget_private", RateLimit::per_minute(300));
        limits.insert("binance_market", RateLimit::per_minute(1200));
        limits.insert("binance_private", RateLimit::per_minute(60));
        limits.insert("dexscreener", RateLimit::per_minute(30));
        // Conservative fallbacks for keys we have no published limit for.
        limits.insert("default_market", RateLimit::per_second(10));
        limits.insert("default_private", RateLimit::per_minute(30));

        let mut ip_limits = HashMap::new();
        ip_limits.insert("binance_ip", RateLimit::per_minute(2400));
        ip_limits.insert("okx_ip", RateLimit::per_minute(500));
        ip_limits.insert("bybit_ip", RateLimit::per_minute(1200));
        ip_limits.insert("kucoin_ip", RateLimit::per_minute(1800));
        ip_limits.insert("gateio_ip", RateLimit::per_minute(900));
        ip_limits.insert("mexc_ip", RateLimit::per_minute(1800));
        ip_limits.insert("dexscreener_ip", RateLimit::per_minute(60));

        Self {
            limits,
            ip_limits,
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// Suspend until `weight` more requests under `key` fit in the window.
    ///
    /// Also enforces the venue's IP-wide bucket: the IP-level limit is
    /// shared across a venue's market and private categories, so
    /// `mexc_market` acquires `mexc_ip` as well.
    pub async fn acquire(&self, key: &str, weight: u32) {
        self.acquire_one(key, weight).await;

        if let Some(venue) = key.split('_').next() {
            let ip_key = format!("{venue}_ip");
            if self.ip_limits.contains_key(ip_key.as_str()) {
                self.acquire_one(&ip_key, weight).await;
            }
        }
    }

    fn limit_for(&self, key: &str) -> RateLimit {
        if let Some(limit) = self.limits.get(key).or_else(|| self.ip_limits.get(key)) {
            return *limit;
        }
        if key.contains("market") {
            self.limits["default_market"]
        } else {
            self.limits["default_private"]
        }
    }

    async fn acquire_one(&self, key: &str, weight: u32) {
        let limit = self.limit_for(key);
        // A weight above the bucket size could never fit; saturate it so
        // the caller is delayed a full window instead of spinning on an
        // empty window.
        let weight = weight.min(limit.max_requests);

        loop {
            let wait = {
                let mut windows = self.windows.lock().await;
                let window = windows.entry(key.to_string()).or_default();
                let now = Instant::now();

                while let Some(front) = window.front() {
                    if now.duration_since(*front) > limit.window {
                        window.pop_front();
                    } else {
                        break;
                    }
                }

                if window.len() as u32 + weight <= limit.max_requests {
                    // A weight-N request occupies N slots in the window.
                    for _ in 0..weight {
                        window.push_back(now);
                    }
                    None
                } else {
                    // Blocked: wait for the oldest timestamp to exit the
                    // window, then re-check. Re-checking keeps the wait
                    // amount-correct when several callers race.
                    let oldest = *window.front().expect("window over limit must be non-empty");
                    Some((oldest + limit.window).saturating_duration_since(now))
                }
            };

            match wait {
                None => return,
                Some(delay) => {
                    trace!(key, delay_ms = delay.as_millis() as u64, "rate limit wait");
                    tokio::time::sleep(delay.max(Duration::from_millis(1))).await;
                }
            }
        }
    }

    /// Requests still allowed in the current window for `key`.
    pub async fn remaining(&self, key: &str) -> u32 {
        let limit = self.limit_for(key);
        let mut windows = self.windows.lock().await;
        let window = windows.entry(key.to_string()).or_default();
        let now = Instant::now();

        while let Some(front) = window.front() {
            if now.duration_since(*front) > limit.window {
                window.pop_front();
            } else {
                break;
            }
        }

        limit.max_requests.saturating_sub(window.len() as u32)
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_burst_within_limit_is_not_delayed() {
        let limiter = RateLimiter::new();
        let start = Instant::now();

        // mexc_market allows 20/s
        for _ in 0..20 {
            limiter.acquire("mexc_market", 1).await;
        }

        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_over_limit_waits_for_window_exit() {
        let limiter = RateLimiter::new();

        for _ in 0..20 {
            limiter.acquire("mexc_market", 1).await;
        }

        let start = Instant::now();
        limiter.acquire("mexc_market", 1).await;
        // The 21st call must wait until the first timestamp leaves the 1s window.
        assert!(start.elapsed() >= Duration::from_millis(999));
    }

    #[tokio::test(start_paused = true)]
    async fn test_weight_occupies_multiple_slots() {
        let limiter = RateLimiter::new();

        limiter.acquire("mexc_market", 18).await;
        let start = Instant::now();
        // 18 + 5 > 20 → must wait a full window
        limiter.acquire("mexc_market", 5).await;
        assert!(start.elapsed() >= Duration::from_millis(999));
    }

    #[tokio::test(start_paused = true)]
    async fn test_weight_above_bucket_size_saturates() {
        let limiter = RateLimiter::new();

        // mexc_market allows 20/s; an oversized weight fills the whole
        // bucket rather than waiting forever.
        limiter.acquire("mexc_market", 100).await;
        assert_eq!(limiter.remaining("mexc_market").await, 0);

        let start = Instant::now();
        limiter.acquire("mexc_market", 1).await;
        assert!(start.elapsed() >= Duration::from_millis(999));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_key_uses_conservative_default() {
        let limiter = RateLimiter::new();

        // Unknown market key falls back to 10 req/s.
        for _ in 0..10 {
            limiter.acquire("newvenue_market", 1).await;
        }
        let start = Instant::now();
        limiter.acquire("newvenue_market", 1).await;
        assert!(start.elapsed() >= Duration::from_millis(999));
    }

    #[tokio::test(start_paused = true)]
    async fn test_ip_bucket_shared_across_categories() {
        let limiter = RateLimiter::new();

        // Exhaust the okx_ip bucket (500/min) through the market key.
        // okx_market itself allows 20 per 2s, so advance time between bursts.
        for _ in 0..25 {
            limiter.acquire("okx_market", 20).await;
            tokio::time::advance(Duration::from_secs(2)).await;
        }

        // 500 IP slots consumed in well under a minute; the private key
        // has budget of its own but the shared IP bucket must block.
        assert_eq!(limiter.remaining("okx_ip").await, 0);
        let start = Instant::now();
        limiter.acquire("okx_private", 1).await;
        assert!(start.elapsed() > Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_remaining_counts_down() {
        let limiter = RateLimiter::new();
        assert_eq!(limiter.remaining("dexscreener").await, 30);
        limiter.acquire("dexscreener", 1).await;
        assert_eq!(limiter.remaining("dexscreener").await, 29);
    }
}

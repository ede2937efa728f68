//! Fixed-window rate limiting per `(endpoint, client identity)`.
//!
//! Each key holds a request count and the time its window resets. A request
//! arriving after the reset time starts a fresh window. Ended windows are
//! swept from [`RateLimiter::check`] at most once per [`SWEEP_INTERVAL`], so
//! the map stays bounded without a background task.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::http::HeaderMap;
use tokio::sync::Mutex;

use crate::clock::Clock;
use crate::config::{ClientIdentity, Endpoint, RateLimitRule};
use crate::error::{OAuthError, OAuthResult};

/// Identity used when no extractor is configured or the header is absent.
pub const SHARED_IDENTITY: &str = "global";

/// Minimum time between sweeps of ended windows.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy)]
struct Counter {
    count: u32,
    reset_at_ms: u64,
}

#[derive(Debug, Default)]
struct Windows {
    counters: HashMap<(Endpoint, String), Counter>,
    next_sweep_ms: u64,
}

impl Windows {
    fn sweep(&mut self, now: u64) -> usize {
        let before = self.counters.len();
        self.counters.retain(|_, c| c.reset_at_ms > now);
        self.next_sweep_ms = now.saturating_add(millis(SWEEP_INTERVAL));
        before - self.counters.len()
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Outcome of a permitted request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitInfo {
    /// Requests allowed per window.
    pub limit: u32,
    /// Requests left in the current window.
    pub remaining: u32,
    /// Time until the window resets.
    pub reset_after: Duration,
}

/// Per-endpoint rate limiter.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    rules: HashMap<Endpoint, RateLimitRule>,
    identity: ClientIdentity,
    windows: Arc<Mutex<Windows>>,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    /// Create a limiter enforcing `rules`. Endpoints without a rule pass freely.
    #[must_use]
    pub fn new(
        rules: HashMap<Endpoint, RateLimitRule>,
        identity: ClientIdentity,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { rules, identity, windows: Arc::new(Mutex::new(Windows::default())), clock }
    }

    /// Client identity for a request.
    #[must_use]
    pub fn identify(&self, headers: &HeaderMap) -> String {
        match &self.identity {
            ClientIdentity::Static => SHARED_IDENTITY.to_string(),
            ClientIdentity::Header(name) => headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.split(',').next())
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map_or_else(|| SHARED_IDENTITY.to_string(), str::to_string),
        }
    }

    /// Count a request against `endpoint`.
    ///
    /// # Errors
    ///
    /// Returns `too_many_requests` carrying the time until the window resets
    /// once `max` requests were already seen in the current window.
    pub async fn check(&self, endpoint: Endpoint, identity: &str) -> OAuthResult<Option<RateLimitInfo>> {
        let Some(rule) = self.rules.get(&endpoint) else {
            return Ok(None);
        };

        let now = self.clock.now_millis();
        let window_ms = millis(rule.window);

        let mut windows = self.windows.lock().await;
        if now >= windows.next_sweep_ms {
            let swept = windows.sweep(now);
            if swept > 0 {
                tracing::debug!(count = swept, "Dropped ended rate-limit windows");
            }
        }

        let counter = windows
            .counters
            .entry((endpoint, identity.to_string()))
            .or_insert(Counter { count: 0, reset_at_ms: now.saturating_add(window_ms) });

        if now >= counter.reset_at_ms {
            *counter = Counter { count: 0, reset_at_ms: now.saturating_add(window_ms) };
        }

        let reset_after = Duration::from_millis(counter.reset_at_ms - now);
        if counter.count >= rule.max {
            tracing::warn!(
                endpoint = endpoint.path(),
                identity = %identity,
                retry_after_secs = crate::error::retry_after_secs(reset_after),
                "Rate limit exceeded"
            );
            return Err(OAuthError::rate_limited(reset_after));
        }

        counter.count += 1;
        Ok(Some(RateLimitInfo { limit: rule.max, remaining: rule.max - counter.count, reset_after }))
    }

    /// Drop counters whose window has ended.
    pub async fn cleanup(&self) {
        let now = self.clock.now_millis();
        self.windows.lock().await.sweep(now);
    }

    /// Number of counters held, including ended windows not yet swept.
    pub async fn tracked(&self) -> usize {
        self.windows.lock().await.counters.len()
    }
}

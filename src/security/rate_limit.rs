//! Per-client rate limiting middleware.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::config::RateLimitConfig;
use crate::observability::metrics;

/// Buckets are swept once the map holds this many entries.
const PRUNE_THRESHOLD: usize = 1024;

/// Minimum time between sweeps while the map stays below its growth mark.
const PRUNE_INTERVAL: Duration = Duration::from_secs(60);

/// A simple token bucket rate limiter.
struct TokenBucket {
    tokens: f64,
    last_update: Instant,
}

impl TokenBucket {
    fn new(capacity: f64, now: Instant) -> Self {
        Self {
            tokens: capacity,
            last_update: now,
        }
    }

    fn refilled(&self, capacity: f64, refill_rate: f64, now: Instant) -> f64 {
        let elapsed = now.saturating_duration_since(self.last_update).as_secs_f64();
        (self.tokens + elapsed * refill_rate).min(capacity)
    }

    fn try_acquire(&mut self, capacity: f64, refill_rate: f64, now: Instant) -> bool {
        self.tokens = self.refilled(capacity, refill_rate, now);
        self.last_update = now;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

struct Buckets {
    map: HashMap<String, TokenBucket>,
    next_prune_len: usize,
    last_prune: Instant,
}

/// Buckets keyed by client IP.
///
/// A full bucket behaves exactly like a fresh one, so full buckets are
/// dropped during sweeps and the map only holds recently active clients.
pub struct RateLimiterState {
    buckets: Mutex<Buckets>,
    rps: f64,
    burst: f64,
}

impl RateLimiterState {
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            buckets: Mutex::new(Buckets {
                map: HashMap::new(),
                next_prune_len: PRUNE_THRESHOLD,
                last_prune: Instant::now(),
            }),
            rps: config.requests_per_second as f64,
            burst: config.burst_size as f64,
        }
    }

    /// Take one token for `key`. Returns false when the bucket is empty.
    pub fn check(&self, key: &str) -> bool {
        self.check_at(key, Instant::now())
    }

    fn check_at(&self, key: &str, now: Instant) -> bool {
        let mut buckets = self
            .buckets
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if !buckets.map.contains_key(key) {
            self.maybe_prune(&mut buckets, now);
        }

        let bucket = buckets
            .map
            .entry(key.to_string())
            .or_insert_with(|| TokenBucket::new(self.burst, now));

        bucket.try_acquire(self.burst, self.rps, now)
    }

    /// Sweep full buckets when the map has grown past its mark, or when it is
    /// large and the last sweep is old.
    fn maybe_prune(&self, buckets: &mut Buckets, now: Instant) {
        let len = buckets.map.len();
        if len < PRUNE_THRESHOLD {
            return;
        }
        let stale = now.saturating_duration_since(buckets.last_prune) >= PRUNE_INTERVAL;
        if len < buckets.next_prune_len && !stale {
            return;
        }

        let (burst, rps) = (self.burst, self.rps);
        buckets
            .map
            .retain(|_, bucket| bucket.refilled(burst, rps, now) < burst);
        buckets.next_prune_len = (buckets.map.len() * 2).max(PRUNE_THRESHOLD);
        buckets.last_prune = now;
        tracing::debug!(
            removed = len - buckets.map.len(),
            remaining = buckets.map.len(),
            "Pruned idle rate limit buckets"
        );
    }

    #[cfg(test)]
    fn bucket_count(&self) -> usize {
        self.buckets
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .map
            .len()
    }
}

/// Middleware rejecting clients that exceed their bucket with 429.
///
/// Keyed by the TCP peer, not by forwarding headers, so clients cannot pick
/// their own bucket.
pub async fn rate_limit_middleware(
    State(state): State<Arc<RateLimiterState>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let key = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string());

    if state.check(&key) {
        next.run(request).await
    } else {
        tracing::warn!(client = %key, "Rate limit exceeded");
        metrics::record_rate_limited();
        (StatusCode::TOO_MANY_REQUESTS, "Rate limit exceeded").into_response()
    }
}

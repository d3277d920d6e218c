//! Sliding-window rate limiter
//!
//! Per-identity 60-second window. The primary path runs an atomic
//! `ZREMRANGEBYSCORE` → `ZADD` → `ZCARD` → `EXPIRE` batch against Redis;
//! when Redis is unreachable the check downgrades to an in-process
//! mutex-guarded map with the same trim-append-count logic (per-process
//! only, not consistent across instances).
//!
//! A transport failure falls through; a *decision* from either path is
//! final for the request.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use redis::aio::ConnectionManager;
use tracing::{info, warn};

/// Window length in seconds
const WINDOW_SECS: f64 = 60.0;

/// Outcome of a limiter check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimiterDecision {
    /// Under the limit; proceed
    Allowed,
    /// Window exceeded; reject with `rate_limited`
    Limited,
}

/// Per-identity sliding-window limiter with a distributed primary path and
/// an in-process fallback.
pub struct RateLimiter {
    max_rpm: u32,
    redis: Option<ConnectionManager>,
    windows: Mutex<HashMap<String, Vec<f64>>>,
    sequence: AtomicU64,
}

impl RateLimiter {
    /// Limiter with no distributed backend. `max_rpm == 0` disables
    /// limiting entirely.
    #[must_use]
    pub fn in_process(max_rpm: u32) -> Self {
        Self {
            max_rpm,
            redis: None,
            windows: Mutex::new(HashMap::new()),
            sequence: AtomicU64::new(0),
        }
    }

    /// Connect the distributed path when a URL is configured; falls back
    /// to in-process when the connection cannot be established.
    pub async fn connect(redis_url: Option<&str>, max_rpm: u32) -> Self {
        let redis = match redis_url {
            Some(url) if max_rpm > 0 => match Self::open(url).await {
                Ok(manager) => {
                    info!(url, "distributed rate limiter connected");
                    Some(manager)
                }
                Err(e) => {
                    warn!(url, error = %e, "redis unavailable, using in-process rate limiter");
                    None
                }
            },
            _ => None,
        };
        Self {
            max_rpm,
            redis,
            windows: Mutex::new(HashMap::new()),
            sequence: AtomicU64::new(0),
        }
    }

    async fn open(url: &str) -> redis::RedisResult<ConnectionManager> {
        let client = redis::Client::open(url)?;
        ConnectionManager::new(client).await
    }

    /// Configured per-minute limit.
    #[must_use]
    pub const fn max_rpm(&self) -> u32 {
        self.max_rpm
    }

    /// Check one request for `identity`. A limiter outage never denies
    /// service; a decision to reject is final.
    pub async fn check(&self, identity: &str) -> LimiterDecision {
        if self.max_rpm == 0 {
            return LimiterDecision::Allowed;
        }

        if let Some(conn) = &self.redis {
            match self.check_distributed(conn.clone(), identity).await {
                Ok(decision) => return decision,
                Err(e) => {
                    warn!(error = %e, "distributed rate limiter unreachable, falling back");
                }
            }
        }

        self.check_fallback(identity, now_secs())
    }

    async fn check_distributed(
        &self,
        mut conn: ConnectionManager,
        identity: &str,
    ) -> redis::RedisResult<LimiterDecision> {
        let now = now_secs();
        let window_start = now - WINDOW_SECS;
        let key = format!("rate_limit:{identity}");
        // Unique member so same-instant requests still count separately
        let member = format!("{now}:{}", self.sequence.fetch_add(1, Ordering::Relaxed));

        let mut pipe = redis::pipe();
        pipe.atomic()
            .cmd("ZREMRANGEBYSCORE")
            .arg(&key)
            .arg("-inf")
            .arg(window_start)
            .cmd("ZADD")
            .arg(&key)
            .arg(now)
            .arg(&member)
            .cmd("ZCARD")
            .arg(&key)
            .cmd("EXPIRE")
            .arg(&key)
            .arg(60);
        let (_trimmed, _added, count, _expired): (i64, i64, i64, i64) =
            pipe.query_async(&mut conn).await?;

        if count > i64::from(self.max_rpm) {
            warn!(identity = %truncate(identity), count, "rate limit tripped (distributed)");
            Ok(LimiterDecision::Limited)
        } else {
            Ok(LimiterDecision::Allowed)
        }
    }

    fn check_fallback(&self, identity: &str, now: f64) -> LimiterDecision {
        let window_start = now - WINDOW_SECS;
        let mut windows = self.windows.lock();
        let timestamps = windows.entry(identity.to_string()).or_default();
        timestamps.retain(|t| *t > window_start);
        if timestamps.len() >= self.max_rpm as usize {
            warn!(identity = %truncate(identity), "rate limit tripped (in-process)");
            return LimiterDecision::Limited;
        }
        timestamps.push(now);
        LimiterDecision::Allowed
    }
}

fn now_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

fn truncate(identity: &str) -> &str {
    &identity[..identity.len().min(16)]
}

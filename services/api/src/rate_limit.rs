//! Fixed-window rate limiting for the AI proxy routes.
//!
//! Each identifier owns a counter whose window opens on its first request. The
//! read-modify-write of a counter happens inside a [`CounterStore`], so callers
//! never race on a stale read.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use axum::{
    body::Body,
    extract::{Request, State},
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode, header::RETRY_AFTER},
    middleware::Next,
    response::{IntoResponse, Json, Response},
};
use chrono::{DateTime, SecondsFormat, Utc};
use tokio::sync::Mutex;
use tracing::{error, warn};

use crate::models::{ErrorResponse, RateLimitErrorResponse};

const RATE_LIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
const RATE_LIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
const RATE_LIMIT_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");

const REDIS_KEY_PREFIX: &str = "ratelimit:";
pub const ANONYMOUS: &str = "anonymous";

/// A counter value after one increment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowCount {
    pub count: u64,
    /// Epoch milliseconds at which the window closes.
    pub reset_at_ms: i64,
}

/// Backing store for per-identifier windows.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Atomically counts one request for `identifier`, opening a fresh window of
    /// `window_ms` when there is none or the current one has expired.
    async fn increment(&self, identifier: &str, window_ms: u64, now_ms: i64) -> Result<WindowCount>;
}

struct MemoryWindows {
    windows: HashMap<String, WindowCount>,
    next_sweep_ms: i64,
}

/// A process-local store. Expired windows are swept on access, at most once per
/// sweep interval.
pub struct MemoryCounterStore {
    state: Mutex<MemoryWindows>,
    sweep_interval_ms: i64,
}

impl MemoryCounterStore {
    pub fn new(sweep_interval: Duration) -> Self {
        Self {
            state: Mutex::new(MemoryWindows {
                windows: HashMap::new(),
                next_sweep_ms: 0,
            }),
            sweep_interval_ms: sweep_interval.as_millis() as i64,
        }
    }

    /// Number of identifiers currently tracked.
    pub async fn len(&self) -> usize {
        self.state.lock().await.windows.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl CounterStore for MemoryCounterStore {
    async fn increment(&self, identifier: &str, window_ms: u64, now_ms: i64) -> Result<WindowCount> {
        let mut state = self.state.lock().await;

        if now_ms >= state.next_sweep_ms {
            state.windows.retain(|_, window| window.reset_at_ms >= now_ms);
            state.next_sweep_ms = now_ms + self.sweep_interval_ms;
        }

        let window = match state.windows.get_mut(identifier) {
            Some(window) if window.reset_at_ms >= now_ms => {
                window.count += 1;
                *window
            }
            _ => {
                let fresh = WindowCount {
                    count: 1,
                    reset_at_ms: now_ms + window_ms as i64,
                };
                state.windows.insert(identifier.to_string(), fresh);
                fresh
            }
        };
        Ok(window)
    }
}

const INCREMENT_SCRIPT: &str = r#"
  local count = redis.call("INCR", KEYS[1])
  if count == 1 then
    redis.call("PEXPIRE", KEYS[1], ARGV[1])
  end
  local ttl = redis.call("PTTL", KEYS[1])
  if ttl < 0 then
    redis.call("PEXPIRE", KEYS[1], ARGV[1])
    ttl = tonumber(ARGV[1])
  end
  return {count, ttl}
"#;

/// A store shared by every process pointed at the same Redis.
pub struct RedisCounterStore {
    conn: redis::aio::MultiplexedConnection,
    script: redis::Script,
}

impl RedisCounterStore {
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url).context("Invalid REDIS_URL")?;
        let conn = client
            .get_multiplexed_tokio_connection()
            .await
            .context("Failed to connect to Redis")?;
        Ok(Self {
            conn,
            script: redis::Script::new(INCREMENT_SCRIPT),
        })
    }
}

#[async_trait]
impl CounterStore for RedisCounterStore {
    async fn increment(&self, identifier: &str, window_ms: u64, now_ms: i64) -> Result<WindowCount> {
        let mut conn = self.conn.clone();
        let (count, ttl_ms): (u64, i64) = self
            .script
            .key(format!("{REDIS_KEY_PREFIX}{identifier}"))
            .arg(window_ms)
            .invoke_async(&mut conn)
            .await
            .context("Rate limit counter update failed")?;
        Ok(WindowCount {
            count,
            reset_at_ms: now_ms + ttl_ms,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitPolicy {
    pub max_requests: u32,
    pub window_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    pub reset_at_ms: i64,
}

impl RateLimitDecision {
    /// Whole seconds until the window closes, rounded up.
    pub fn retry_after_secs(&self, now_ms: i64) -> u64 {
        let millis = (self.reset_at_ms - now_ms).max(0) as u64;
        millis.div_ceil(1000)
    }

    fn reset_iso(&self) -> String {
        DateTime::<Utc>::from_timestamp_millis(self.reset_at_ms)
            .unwrap_or_default()
            .to_rfc3339_opts(SecondsFormat::Millis, true)
    }
}

pub struct RateLimiter {
    store: Arc<dyn CounterStore>,
    policy: RateLimitPolicy,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn CounterStore>, policy: RateLimitPolicy) -> Self {
        Self { store, policy }
    }

    pub fn policy(&self) -> RateLimitPolicy {
        self.policy
    }

    pub async fn check(&self, identifier: &str) -> Result<RateLimitDecision> {
        self.check_at(identifier, Utc::now().timestamp_millis()).await
    }

    pub async fn check_at(&self, identifier: &str, now_ms: i64) -> Result<RateLimitDecision> {
        let window = self
            .store
            .increment(identifier, self.policy.window_ms, now_ms)
            .await?;
        let max = self.policy.max_requests as u64;
        Ok(RateLimitDecision {
            allowed: window.count <= max,
            limit: self.policy.max_requests,
            remaining: max.saturating_sub(window.count) as u32,
            reset_at_ms: window.reset_at_ms,
        })
    }
}

/// The caller's credential, else its client-info string, else a shared bucket.
pub fn client_identifier(headers: &HeaderMap) -> String {
    ["authorization", "x-client-info"]
        .iter()
        .filter_map(|name| headers.get(*name))
        .filter_map(|value| value.to_str().ok())
        .find(|value| !value.is_empty())
        .unwrap_or(ANONYMOUS)
        .to_string()
}

fn apply_headers(headers: &mut HeaderMap, decision: &RateLimitDecision) {
    headers.insert(RATE_LIMIT_LIMIT, HeaderValue::from(decision.limit));
    headers.insert(RATE_LIMIT_REMAINING, HeaderValue::from(decision.remaining));
    if let Ok(value) = HeaderValue::from_str(&decision.reset_iso()) {
        headers.insert(RATE_LIMIT_RESET, value);
    }
}

/// Axum middleware enforcing the limiter on every request it wraps.
pub async fn rate_limit(
    State(limiter): State<Arc<RateLimiter>>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let identifier = client_identifier(req.headers());
    let now_ms = Utc::now().timestamp_millis();

    let decision = match limiter.check_at(&identifier, now_ms).await {
        Ok(decision) => decision,
        Err(err) => {
            error!(error = ?err, "Rate limit check failed");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: err.to_string(),
                }),
            )
                .into_response();
        }
    };

    if !decision.allowed {
        let retry_after = decision.retry_after_secs(now_ms);
        warn!(path = %req.uri().path(), retry_after, "Rate limit exceeded");
        let mut res = (
            StatusCode::TOO_MANY_REQUESTS,
            Json(RateLimitErrorResponse {
                error: "Too many requests. Please try again later.".to_string(),
                code: "RATE_LIMIT_EXCEEDED".to_string(),
                retry_after,
            }),
        )
            .into_response();
        apply_headers(res.headers_mut(), &decision);
        res.headers_mut()
            .insert(RETRY_AFTER, HeaderValue::from(retry_after));
        return res;
    }

    let mut res = next.run(req).await;
    apply_headers(res.headers_mut(), &decision);
    res
}

//! Per-client token-bucket rate limiting.
//!
//! Each key (a client IP) owns an independent bucket holding up to `burst`
//! tokens, refilled at `requests / window` tokens per second. Buckets are
//! created lazily and evicted once idle for `idle_ttl`. The `DashMap` entry
//! lock guards lookup, creation and consumption; `retain` holds the shard
//! locks during eviction, so a sweep never races an in-flight `allow`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Buckets untouched for this long are evicted.
pub const DEFAULT_IDLE_TTL: Duration = Duration::from_secs(600);

/// Interval between eviction sweeps.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(600);

/// Rate limiter settings.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub enabled: bool,
    /// Requests granted per `window`.
    pub requests: u32,
    pub window: Duration,
    /// Bucket capacity.
    pub burst: u32,
    pub idle_ttl: Duration,
    pub sweep_interval: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            requests: 5,
            window: Duration::from_secs(60),
            burst: 5,
            idle_ttl: DEFAULT_IDLE_TTL,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
        }
    }
}

impl RateLimitConfig {
    /// Tokens added per second.
    pub fn refill_per_sec(&self) -> f64 {
        let window = self.window.as_secs_f64();
        if window <= 0.0 {
            return f64::from(self.requests);
        }
        f64::from(self.requests) / window
    }
}

#[derive(Debug, Clone, Copy)]
struct Bucket {
    tokens: f64,
    last_refill: Instant,
    last_access: Instant,
}

/// In-memory, process-local rate limiter.
#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimitConfig,
    buckets: DashMap<String, Bucket>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            buckets: DashMap::new(),
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Consume one token from `key`'s bucket. Returns `false` when empty.
    pub fn allow(&self, key: &str) -> bool {
        if !self.config.enabled {
            return true;
        }
        let now = Instant::now();
        let capacity = f64::from(self.config.burst);
        let refill = self.config.refill_per_sec();

        let mut bucket = self.buckets.entry(key.to_string()).or_insert(Bucket {
            tokens: capacity,
            last_refill: now,
            last_access: now,
        });

        let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * refill).min(capacity);
        bucket.last_refill = now;
        bucket.last_access = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Suggested `Retry-After` in whole seconds: `ceil(1 / refill)`, at least 1.
    pub fn retry_after_secs(&self) -> u64 {
        if self.config.requests == 0 {
            return self.config.window.as_secs().max(1);
        }
        let secs_per_token = self.config.window.as_secs_f64() / f64::from(self.config.requests);
        (secs_per_token.ceil() as u64).max(1)
    }

    /// Number of live buckets.
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Drop buckets idle for longer than `idle_ttl`. Returns how many went.
    pub fn evict_idle(&self) -> usize {
        let now = Instant::now();
        let ttl = self.config.idle_ttl;
        let before = self.buckets.len();
        self.buckets
            .retain(|_, bucket| now.duration_since(bucket.last_access) < ttl);
        before.saturating_sub(self.buckets.len())
    }

    /// Spawn the periodic eviction sweep. It exits once `shutdown` is cancelled.
    pub fn spawn_sweeper(self: &Arc<Self>, shutdown: CancellationToken) -> JoinHandle<()> {
        let limiter = Arc::clone(self);
        let interval = self.config.sweep_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        debug!("rate limiter sweeper stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        let evicted = limiter.evict_idle();
                        if evicted > 0 {
                            debug!(evicted, "evicted idle rate limit buckets");
                        }
                    }
                }
            }
        })
    }
}

//! Pacing of outbound calls: token-bucket rate limiting, exponential backoff,
//! cooperative cancellation and network-path remediation.

use super::types::{GeocodeError, ProviderKind};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::process::Command;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Longest uninterrupted sleep; cancellation is noticed within this slice.
const SLEEP_SLICE: Duration = Duration::from_millis(200);

// ─── Cancellation ───────────────────────────────────────────────

/// Shared stop signal with an optional wall-clock deadline.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel automatically once `limit` has elapsed from now.
    pub fn with_time_limit(mut self, limit: Duration) -> Self {
        self.deadline = Some(Instant::now() + limit);
        self
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst) || self.deadline.map_or(false, |d| Instant::now() >= d)
    }

    pub fn check(&self) -> Result<(), GeocodeError> {
        if self.is_cancelled() {
            Err(GeocodeError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Sleep for `duration`, waking early with `Cancelled` if the token fires.
pub fn sleep(duration: Duration, cancel: &CancelToken) -> Result<(), GeocodeError> {
    let end = Instant::now() + duration;
    loop {
        cancel.check()?;
        let now = Instant::now();
        if now >= end {
            return Ok(());
        }
        std::thread::sleep((end - now).min(SLEEP_SLICE));
    }
}

// ─── Retry policy ───────────────────────────────────────────────

/// Exponential backoff for retryable provider errors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 1_000,
            max_delay_ms: 30_000,
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Retries without waiting.
    pub fn immediate(max_retries: u32) -> Self {
        Self { max_retries, base_delay_ms: 0, max_delay_ms: 0, ..Self::default() }
    }

    /// Delay before retry number `attempt` (0-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let multiplier = self.backoff_multiplier.powi(attempt as i32);
        let millis = (self.base_delay_ms as f64 * multiplier) as u64;
        Duration::from_millis(millis.min(self.max_delay_ms))
    }
}

// ─── Rate limiting ──────────────────────────────────────────────

#[derive(Debug)]
struct TokenBucket {
    tokens: f64,
    last_update: Instant,
    /// Tokens per second.
    rate: f64,
    capacity: f64,
}

impl TokenBucket {
    fn new(config: &RateLimitConfig) -> Self {
        let capacity = config.burst_capacity.max(1.0);
        Self {
            tokens: capacity,
            last_update: Instant::now(),
            rate: config.requests_per_minute as f64 / 60.0,
            capacity,
        }
    }

    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_update).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.rate).min(self.capacity);
        self.last_update = now;
    }

    fn try_acquire(&mut self) -> bool {
        self.refill();
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    fn time_until_available(&mut self) -> Duration {
        self.refill();
        if self.tokens >= 1.0 {
            Duration::ZERO
        } else {
            Duration::from_secs_f64((1.0 - self.tokens) / self.rate)
        }
    }
}

/// Request budget for one provider. Zero requests per minute disables limiting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub requests_per_minute: u32,
    pub burst_capacity: f64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self { requests_per_minute: 60, burst_capacity: 1.0 }
    }
}

/// Budgets for every provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimits {
    pub google: RateLimitConfig,
    pub nominatim: RateLimitConfig,
}

impl Default for RateLimits {
    fn default() -> Self {
        Self {
            google: RateLimitConfig { requests_per_minute: 300, burst_capacity: 10.0 },
            nominatim: RateLimitConfig { requests_per_minute: 60, burst_capacity: 1.0 },
        }
    }
}

impl RateLimits {
    pub fn unlimited() -> Self {
        let off = RateLimitConfig { requests_per_minute: 0, burst_capacity: 1.0 };
        Self { google: off.clone(), nominatim: off }
    }

    fn for_provider(&self, provider: ProviderKind) -> &RateLimitConfig {
        match provider {
            ProviderKind::GoogleMaps => &self.google,
            ProviderKind::Nominatim => &self.nominatim,
        }
    }
}

/// Per-provider token buckets.
pub struct RateLimiter {
    limits: RateLimits,
    buckets: HashMap<ProviderKind, TokenBucket>,
}

impl RateLimiter {
    pub fn new(limits: RateLimits) -> Self {
        Self { limits, buckets: HashMap::new() }
    }

    pub fn unlimited() -> Self {
        Self::new(RateLimits::unlimited())
    }

    /// Block until `provider` may be called, or the token is cancelled.
    pub fn acquire(&mut self, provider: ProviderKind, cancel: &CancelToken) -> Result<(), GeocodeError> {
        let config = self.limits.for_provider(provider);
        if config.requests_per_minute == 0 {
            return Ok(());
        }
        let bucket = self.buckets.entry(provider).or_insert_with(|| TokenBucket::new(config));

        loop {
            if bucket.try_acquire() {
                return Ok(());
            }
            let wait = bucket.time_until_available();
            debug!("Rate limit reached for {}, waiting {:?}", provider, wait);
            sleep(wait.max(Duration::from_millis(1)), cancel)?;
        }
    }
}

// ─── Network path ───────────────────────────────────────────────

/// Remediation for providers that reject the caller's location.
pub trait NetworkPath {
    /// Switch to a different network path. Returns whether it succeeded.
    fn reconnect(&mut self) -> bool;
}

/// No remediation available.
pub struct NoReconnect;

impl NetworkPath for NoReconnect {
    fn reconnect(&mut self) -> bool {
        warn!("Provider rejected our location and no reconnect command is configured");
        false
    }
}

/// Runs an external command (e.g. a VPN client) to change the network path.
pub struct CommandReconnect {
    program: String,
    args: Vec<String>,
    settle: Duration,
}

impl CommandReconnect {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self { program: program.into(), args, settle: Duration::from_secs(5) }
    }

    /// Time to wait after the command before traffic resumes.
    pub fn with_settle_time(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }
}

impl NetworkPath for CommandReconnect {
    fn reconnect(&mut self) -> bool {
        info!("Reconnecting network path via '{}'", self.program);
        match Command::new(&self.program).args(&self.args).output() {
            Ok(out) if out.status.success() => {
                std::thread::sleep(self.settle);
                info!("Network path reconnected");
                true
            }
            Ok(out) => {
                warn!(
                    "Reconnect command exited with {}: {}",
                    out.status,
                    String::from_utf8_lossy(&out.stderr).trim()
                );
                false
            }
            Err(e) => {
                warn!("Failed to run reconnect command '{}': {}", self.program, e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(0), Duration::from_secs(1));
        assert_eq!(policy.delay_for(1), Duration::from_secs(2));
        assert_eq!(policy.delay_for(2), Duration::from_secs(4));
        assert_eq!(policy.delay_for(10), Duration::from_secs(30));
        assert_eq!(RetryPolicy::immediate(3).delay_for(2), Duration::ZERO);
    }

    #[test]
    fn test_cancel_token_shared_between_clones() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(token.check().is_ok());
        clone.cancel();
        assert!(token.is_cancelled());
        assert_eq!(token.check(), Err(GeocodeError::Cancelled));
    }

    #[test]
    fn test_cancel_token_deadline() {
        let token = CancelToken::new().with_time_limit(Duration::ZERO);
        assert!(token.is_cancelled());
        let later = CancelToken::new().with_time_limit(Duration::from_secs(3600));
        assert!(!later.is_cancelled());
    }

    #[test]
    fn test_sleep_stops_on_cancel() {
        let token = CancelToken::new();
        token.cancel();
        let start = Instant::now();
        assert_eq!(sleep(Duration::from_secs(10), &token), Err(GeocodeError::Cancelled));
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_token_bucket_burst() {
        let mut bucket = TokenBucket::new(&RateLimitConfig { requests_per_minute: 60, burst_capacity: 2.0 });
        assert!(bucket.try_acquire());
        assert!(bucket.try_acquire());
        assert!(!bucket.try_acquire());
        let wait = bucket.time_until_available();
        assert!(wait > Duration::ZERO && wait <= Duration::from_secs(1));
    }

    #[test]
    fn test_unlimited_limiter_never_waits() {
        let mut limiter = RateLimiter::unlimited();
        let token = CancelToken::new();
        let start = Instant::now();
        for _ in 0..100 {
            limiter.acquire(ProviderKind::Nominatim, &token).unwrap();
        }
        assert!(start.elapsed() < Duration::from_millis(100));
    }

    #[test]
    fn test_limiter_wait_is_cancellable() {
        let mut limiter = RateLimiter::new(RateLimits {
            nominatim: RateLimitConfig { requests_per_minute: 1, burst_capacity: 1.0 },
            ..RateLimits::default()
        });
        let token = CancelToken::new();
        limiter.acquire(ProviderKind::Nominatim, &token).unwrap();
        token.cancel();
        assert_eq!(limiter.acquire(ProviderKind::Nominatim, &token), Err(GeocodeError::Cancelled));
    }

    #[test]
    fn test_rate_limits_from_toml() {
        let limits: RateLimits = toml::from_str("[google]\nrequests_per_minute = 50\n").unwrap();
        assert_eq!(limits.google.requests_per_minute, 50);
        assert_eq!(limits.google.burst_capacity, 1.0);
        assert_eq!(limits.nominatim.requests_per_minute, 60);
    }
}

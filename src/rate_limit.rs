use axum::http::HeaderMap;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::interval;

use crate::metrics::RATE_LIMIT_KEYS;

pub const UNKNOWN_CLIENT: &str = "unknown";

const REDIS_KEY_PREFIX: &str = "contact_rate_limit";
const REDIS_TIMEOUT: Duration = Duration::from_millis(500);

// INCR and set the expiry on the first hit, in one round trip
const INCR_WITH_EXPIRY: &str = r"
local count = redis.call('INCR', KEYS[1])
if count == 1 then
    redis.call('PEXPIRE', KEYS[1], ARGV[1])
end
return count
";

/// Client key: first hop of `X-Forwarded-For`, else [`UNKNOWN_CLIENT`].
pub fn client_identifier(headers: &HeaderMap) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.split(',').map(str::trim).find(|ip| !ip.is_empty()))
        .unwrap_or(UNKNOWN_CLIENT)
        .to_string()
}

// Rate limit entry - tracks requests per client
#[derive(Debug, Clone, Copy)]
pub struct RateLimitEntry {
    pub count: u32,
    pub window_start: Instant,
}

/// In-process fixed window counter.
pub struct FixedWindowLimiter {
    entries: DashMap<String, RateLimitEntry>,
    limit: u32,
    window: Duration,
}

impl FixedWindowLimiter {
    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            limit,
            window,
        }
    }

    pub fn check(&self, key: &str) -> bool {
        self.check_at(key, Instant::now())
    }

    // The entry guard holds the shard lock, so the read-modify-write is atomic per key
    pub fn check_at(&self, key: &str, now: Instant) -> bool {
        let mut entry = self
            .entries
            .entry(key.to_string())
            .or_insert(RateLimitEntry {
                count: 0,
                window_start: now,
            });

        // window expired..? start a new one
        if now.saturating_duration_since(entry.window_start) >= self.window {
            entry.count = 1;
            entry.window_start = now;
            return true;
        }

        if entry.count < self.limit {
            entry.count += 1;
            return true;
        }

        false
    }

    pub fn entry(&self, key: &str) -> Option<RateLimitEntry> {
        self.entries.get(key).map(|e| *e)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drops entries whose window has elapsed. Returns how many were removed.
    pub fn sweep(&self, now: Instant) -> usize {
        // counted inside retain, other tasks may insert while it runs
        let mut removed = 0;
        self.entries.retain(|_, e| {
            let live = now.saturating_duration_since(e.window_start) < self.window;
            if !live {
                removed += 1;
            }
            live
        });
        removed
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SharedLimitError {
    #[error(transparent)]
    Redis(#[from] redis::RedisError),

    #[error("redis did not answer within {0:?}")]
    Timeout(Duration),
}

/// Counter shared between instances through Redis.
pub struct RedisLimiter {
    client: redis::Client,
    script: redis::Script,
    limit: u32,
    window: Duration,
    timeout: Duration,
}

impl RedisLimiter {
    pub fn new(client: redis::Client, limit: u32, window: Duration) -> Self {
        Self {
            client,
            script: redis::Script::new(INCR_WITH_EXPIRY),
            limit,
            window,
            timeout: REDIS_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    // Connect and script round trip share one deadline
    pub async fn check(&self, key: &str) -> Result<bool, SharedLimitError> {
        let count = tokio::time::timeout(self.timeout, self.increment(key))
            .await
            .map_err(|_| SharedLimitError::Timeout(self.timeout))??;

        Ok(count <= self.limit as u64)
    }

    async fn increment(&self, key: &str) -> Result<u64, redis::RedisError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        self.script
            .key(format!("{}:{}", REDIS_KEY_PREFIX, key))
            .arg(self.window.as_millis() as u64)
            .invoke_async(&mut conn)
            .await
    }
}

/// Rate limiter used by the contact endpoint.
///
/// The local table is always kept; with Redis configured it only decides when
/// Redis cannot be reached.
pub struct RateLimiter {
    local: FixedWindowLimiter,
    shared: Option<RedisLimiter>,
}

impl RateLimiter {
    pub fn in_memory(limit: u32, window: Duration) -> Self {
        Self {
            local: FixedWindowLimiter::new(limit, window),
            shared: None,
        }
    }

    pub fn with_redis(client: redis::Client, limit: u32, window: Duration) -> Self {
        Self::with_shared(RedisLimiter::new(client, limit, window), limit, window)
    }

    pub fn with_shared(shared: RedisLimiter, limit: u32, window: Duration) -> Self {
        Self {
            local: FixedWindowLimiter::new(limit, window),
            shared: Some(shared),
        }
    }

    pub fn local(&self) -> &FixedWindowLimiter {
        &self.local
    }

    /// Counts the attempt and returns whether it is allowed.
    pub async fn check(&self, key: &str) -> bool {
        if let Some(shared) = &self.shared {
            match shared.check(key).await {
                Ok(allowed) => return allowed,
                Err(e) => {
                    tracing::warn!(error = %e, "Redis rate limit unavailable, using local counter");
                }
            }
        }

        let allowed = self.local.check(key);
        RATE_LIMIT_KEYS.set(self.local.len() as f64);
        allowed
    }
}

// Periodically drops expired windows so the table does not grow forever
pub async fn sweeper(limiter: Arc<RateLimiter>, every: Duration) {
    let mut interval = interval(every);

    tracing::info!(interval = ?every, "Rate limit sweeper started");

    loop {
        interval.tick().await;

        let removed = limiter.local().sweep(Instant::now());
        RATE_LIMIT_KEYS.set(limiter.local().len() as f64);
        if removed > 0 {
            tracing::debug!(removed, "Dropped expired rate limit entries");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    const WINDOW: Duration = Duration::from_secs(60);

    #[test]
    fn sixth_request_in_window_is_rejected() {
        let limiter = FixedWindowLimiter::new(5, WINDOW);
        let t0 = Instant::now();

        for i in 0..5 {
            assert!(limiter.check_at("1.2.3.4", t0 + Duration::from_secs(i)));
        }
        assert!(!limiter.check_at("1.2.3.4", t0 + Duration::from_secs(59)));
        assert_eq!(limiter.entry("1.2.3.4").unwrap().count, 5);
    }

    #[test]
    fn window_expiry_resets_count_to_one() {
        let limiter = FixedWindowLimiter::new(5, WINDOW);
        let t0 = Instant::now();

        for _ in 0..6 {
            limiter.check_at("c", t0);
        }
        let later = t0 + WINDOW;
        assert!(limiter.check_at("c", later));

        let entry = limiter.entry("c").unwrap();
        assert_eq!(entry.count, 1);
        assert_eq!(entry.window_start, later);
    }

    #[test]
    fn clients_are_counted_separately() {
        let limiter = FixedWindowLimiter::new(1, WINDOW);
        let t0 = Instant::now();

        assert!(limiter.check_at("a", t0));
        assert!(!limiter.check_at("a", t0));
        assert!(limiter.check_at("b", t0));
        assert_eq!(limiter.len(), 2);
    }

    #[test]
    fn sweep_only_drops_expired_windows() {
        let limiter = FixedWindowLimiter::new(5, WINDOW);
        let t0 = Instant::now();

        limiter.check_at("old", t0);
        limiter.check_at("fresh", t0 + Duration::from_secs(30));

        assert_eq!(limiter.sweep(t0 + Duration::from_secs(61)), 1);
        assert!(limiter.entry("old").is_none());
        assert!(limiter.entry("fresh").is_some());
    }

    #[test]
    fn concurrent_checks_never_exceed_limit() {
        let limiter = Arc::new(FixedWindowLimiter::new(50, WINDOW));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let limiter = Arc::clone(&limiter);
                std::thread::spawn(move || (0..25).filter(|_| limiter.check("same")).count())
            })
            .collect();

        let allowed: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(allowed, 50);
    }

    #[test]
    fn sweep_survives_concurrent_inserts() {
        let limiter = Arc::new(FixedWindowLimiter::new(5, Duration::from_millis(1)));
        let writers: Vec<_> = (0..4)
            .map(|t| {
                let limiter = Arc::clone(&limiter);
                std::thread::spawn(move || {
                    for i in 0..2_000 {
                        limiter.check(&format!("{t}-{i}"));
                    }
                })
            })
            .collect();

        let mut removed = 0;
        while writers.iter().any(|w| !w.is_finished()) {
            removed += limiter.sweep(Instant::now());
        }
        for w in writers {
            w.join().unwrap();
        }
        std::thread::sleep(Duration::from_millis(5));
        removed += limiter.sweep(Instant::now());

        assert_eq!(removed, 8_000);
        assert!(limiter.is_empty());
    }

    #[tokio::test]
    async fn unreachable_redis_falls_back_to_local_counter() {
        // nothing listens on port 1
        let client = redis::Client::open("redis://127.0.0.1:1/").unwrap();
        let limiter = RateLimiter::with_redis(client, 5, WINDOW);

        for _ in 0..5 {
            assert!(limiter.check("203.0.113.1").await);
        }
        assert!(!limiter.check("203.0.113.1").await);
        assert_eq!(limiter.local().entry("203.0.113.1").unwrap().count, 5);
    }

    #[tokio::test]
    async fn silent_redis_times_out_and_falls_back() {
        // accepts connections but never answers
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let client = redis::Client::open(format!("redis://{addr}/")).unwrap();
        let shared = RedisLimiter::new(client, 2, WINDOW).with_timeout(Duration::from_millis(100));
        assert!(matches!(
            shared.check("k").await,
            Err(SharedLimitError::Timeout(_))
        ));

        let limiter = RateLimiter::with_shared(shared, 2, WINDOW);
        let started = Instant::now();
        assert!(limiter.check("k").await);
        assert!(limiter.check("k").await);
        assert!(!limiter.check("k").await);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn in_memory_limiter_counts_attempts() {
        let limiter = RateLimiter::in_memory(2, WINDOW);
        assert!(limiter.check("x").await);
        assert!(limiter.check("x").await);
        assert!(!limiter.check("x").await);
    }

    #[test]
    fn identifier_from_forwarded_for() {
        let mut headers = HeaderMap::new();
        assert_eq!(client_identifier(&headers), UNKNOWN_CLIENT);

        headers.insert("x-forwarded-for", HeaderValue::from_static(" 203.0.113.7 , 10.0.0.1"));
        assert_eq!(client_identifier(&headers), "203.0.113.7");

        headers.insert("x-forwarded-for", HeaderValue::from_static(" , "));
        assert_eq!(client_identifier(&headers), UNKNOWN_CLIENT);
    }
}

//! Per-client token buckets, one per route group

use dashmap::DashMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::warn;

use crate::cache::Clock;

const WINDOW: Duration = Duration::from_secs(60);
/// Buckets idle this long are dropped by [`RateLimiter::cleanup`]
const IDLE_EVICTION: Duration = Duration::from_secs(10 * 60);

/// Route groups limited independently
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RouteGroup {
    /// `/api/*` and `/addressbook/api/*`
    General,
    /// `/admin/api/*` and `/review/api/*`
    Admin,
    /// `/user/api/*`
    User,
    /// `/api/health`
    Health,
    /// `/copilot/api/*`, which fans out to GitHub
    External,
}

impl RouteGroup {
    /// Group a request path belongs to, `None` for unlimited paths
    pub fn for_path(path: &str) -> Option<Self> {
        if path == "/api/health" {
            Some(Self::Health)
        } else if path.starts_with("/admin/api/") || path.starts_with("/review/api/") {
            Some(Self::Admin)
        } else if path.starts_with("/user/api/") {
            Some(Self::User)
        } else if path.starts_with("/copilot/api/") {
            Some(Self::External)
        } else if path.starts_with("/api/") || path.starts_with("/addressbook/api/") {
            Some(Self::General)
        } else {
            None
        }
    }

    /// Body text of the 429 response
    pub fn message(&self) -> &'static str {
        match self {
            Self::General | Self::User => "Too many requests from this IP, please try again later.",
            Self::Admin => "Too many admin requests from this IP, please try again later.",
            Self::Health => "Too many health check requests.",
            Self::External => "Too many requests to external APIs, please try again later.",
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

pub struct RateLimiter {
    buckets: DashMap<(IpAddr, RouteGroup), Bucket>,
    capacity: f64,
    refill_per_sec: f64,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    /// `per_minute` requests per client per group, refilled continuously
    pub fn new(per_minute: u32, clock: Arc<dyn Clock>) -> Self {
        let capacity = f64::from(per_minute.max(1));
        Self {
            buckets: DashMap::new(),
            capacity,
            refill_per_sec: capacity / WINDOW.as_secs_f64(),
            clock,
        }
    }

    /// Take a token; false when the client is over its limit
    pub fn allow(&self, ip: IpAddr, group: RouteGroup) -> bool {
        let now = self.clock.now();
        let mut bucket = self.buckets.entry((ip, group)).or_insert(Bucket {
            tokens: self.capacity,
            last_refill: now,
        });
        let elapsed = now.saturating_duration_since(bucket.last_refill).as_secs_f64();
        bucket.last_refill = now;
        bucket.tokens = (bucket.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            warn!(%ip, group = ?group, "Rate limit exceeded");
            false
        }
    }

    /// Drop idle buckets, returning how many were removed
    pub fn cleanup(&self) -> usize {
        let now = self.clock.now();
        let before = self.buckets.len();
        self.buckets
            .retain(|_, b| now.saturating_duration_since(b.last_refill) < IDLE_EVICTION);
        before - self.buckets.len()
    }
}

/// Periodically evict idle buckets
pub fn spawn_cleanup_task(limiter: Arc<RateLimiter>, interval: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            limiter.cleanup();
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ManualClock;

    fn ip(last: u8) -> IpAddr {
        IpAddr::from([10, 0, 0, last])
    }

    #[test]
    fn test_route_groups() {
        assert_eq!(RouteGroup::for_path("/api/health"), Some(RouteGroup::Health));
        assert_eq!(RouteGroup::for_path("/api/json"), Some(RouteGroup::General));
        assert_eq!(RouteGroup::for_path("/review/api/tech-radar/update"), Some(RouteGroup::Admin));
        assert_eq!(RouteGroup::for_path("/copilot/api/seats"), Some(RouteGroup::External));
        assert_eq!(RouteGroup::for_path("/user/api/info"), Some(RouteGroup::User));
        assert_eq!(RouteGroup::for_path("/favicon.ico"), None);
    }

    #[test]
    fn test_limits_per_client_and_group() {
        let clock = Arc::new(ManualClock::new());
        let limiter = RateLimiter::new(3, clock.clone());

        for _ in 0..3 {
            assert!(limiter.allow(ip(1), RouteGroup::General));
        }
        assert!(!limiter.allow(ip(1), RouteGroup::General));
        assert!(limiter.allow(ip(2), RouteGroup::General));
        assert!(limiter.allow(ip(1), RouteGroup::Admin));

        // one token every 20s at 3/minute
        clock.advance(Duration::from_secs(21));
        assert!(limiter.allow(ip(1), RouteGroup::General));
        assert!(!limiter.allow(ip(1), RouteGroup::General));
    }

    #[test]
    fn test_cleanup_drops_idle_buckets() {
        let clock = Arc::new(ManualClock::new());
        let limiter = RateLimiter::new(60, clock.clone());
        limiter.allow(ip(1), RouteGroup::General);
        assert_eq!(limiter.cleanup(), 0);
        clock.advance(IDLE_EVICTION);
        assert_eq!(limiter.cleanup(), 1);
    }
}

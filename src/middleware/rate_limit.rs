//! Per-client-IP rate limiting for the `/api/*` routes.
//!
//! Fixed window per IP with a burst allowance on top of the base limit.

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{header, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use parking_lot::Mutex;
use serde_json::json;
use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::warn;

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Requests allowed per window before burst is consumed.
    pub max_requests: u32,
    pub window: Duration,
    /// Extra requests tolerated above `max_requests` before rejecting.
    pub burst: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 60,
            window: Duration::from_secs(60),
            burst: 20,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allowed { remaining: u32 },
    Burst { remaining: u32 },
    Rejected { retry_after: Duration },
}

struct ClientWindow {
    count: u32,
    started: Instant,
}

#[derive(Clone)]
pub struct ClientRateLimiter {
    config: RateLimitConfig,
    clients: Arc<Mutex<HashMap<IpAddr, ClientWindow>>>,
}

impl ClientRateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            clients: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn check(&self, ip: IpAddr) -> RateDecision {
        self.check_at(ip, Instant::now())
    }

    pub fn check_at(&self, ip: IpAddr, now: Instant) -> RateDecision {
        let mut clients = self.clients.lock();
        let window = clients.entry(ip).or_insert(ClientWindow {
            count: 0,
            started: now,
        });

        if now.saturating_duration_since(window.started) >= self.config.window {
            window.count = 0;
            window.started = now;
        }
        window.count = window.count.saturating_add(1);

        let hard_limit = self.config.max_requests.saturating_add(self.config.burst);
        let remaining = hard_limit.saturating_sub(window.count);
        if window.count > hard_limit {
            let resets_at = window.started + self.config.window;
            RateDecision::Rejected {
                retry_after: resets_at.saturating_duration_since(now),
            }
        } else if window.count > self.config.max_requests {
            RateDecision::Burst { remaining }
        } else {
            RateDecision::Allowed { remaining }
        }
    }

    /// Drops clients idle for more than two windows.
    pub fn prune(&self) {
        self.prune_at(Instant::now())
    }

    pub fn prune_at(&self, now: Instant) {
        let horizon = self.config.window * 2;
        self.clients
            .lock()
            .retain(|_, w| now.saturating_duration_since(w.started) < horizon);
    }

    pub fn tracked_clients(&self) -> usize {
        self.clients.lock().len()
    }

    pub fn window(&self) -> Duration {
        self.config.window
    }
}

pub async fn rate_limit(
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(limiter): State<ClientRateLimiter>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if !request.uri().path().starts_with("/api/") {
        return next.run(request).await;
    }
    let ip = addr.ip();
    match limiter.check(ip) {
        RateDecision::Allowed { .. } | RateDecision::Burst { .. } => next.run(request).await,
        RateDecision::Rejected { retry_after } => {
            let retry_secs = retry_after.as_secs().max(1);
            warn!(
                ip = %ip,
                path = %request.uri().path(),
                retry_after_secs = retry_secs,
                "rate limit exceeded"
            );
            (
                StatusCode::TOO_MANY_REQUESTS,
                [(header::RETRY_AFTER, retry_secs.to_string())],
                Json(json!({
                    "error": "Too many requests, slow down",
                    "retryAfterSeconds": retry_secs,
                })),
            )
                .into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(max_requests: u32, burst: u32) -> ClientRateLimiter {
        ClientRateLimiter::new(RateLimitConfig {
            max_requests,
            window: Duration::from_secs(60),
            burst,
        })
    }

    #[test]
    fn test_allowed_then_burst_then_rejected() {
        let limiter = limiter(3, 2);
        let ip: IpAddr = "10.0.0.1".parse().unwrap();
        let now = Instant::now();

        for expected_remaining in [4, 3, 2] {
            assert_eq!(
                limiter.check_at(ip, now),
                RateDecision::Allowed {
                    remaining: expected_remaining
                }
            );
        }
        assert_eq!(limiter.check_at(ip, now), RateDecision::Burst { remaining: 1 });
        assert_eq!(limiter.check_at(ip, now), RateDecision::Burst { remaining: 0 });
        match limiter.check_at(ip, now + Duration::from_secs(20)) {
            RateDecision::Rejected { retry_after } => assert_eq!(retry_after, Duration::from_secs(40)),
            other => panic!("expected rejection, got {:?}", other),
        }
    }

    #[test]
    fn test_window_resets() {
        let limiter = limiter(1, 0);
        let ip: IpAddr = "10.0.0.2".parse().unwrap();
        let now = Instant::now();
        assert!(matches!(limiter.check_at(ip, now), RateDecision::Allowed { .. }));
        assert!(matches!(limiter.check_at(ip, now), RateDecision::Rejected { .. }));
        assert!(matches!(
            limiter.check_at(ip, now + Duration::from_secs(61)),
            RateDecision::Allowed { .. }
        ));
    }

    #[test]
    fn test_clients_are_independent() {
        let limiter = limiter(1, 0);
        let now = Instant::now();
        let a: IpAddr = "10.0.0.3".parse().unwrap();
        let b: IpAddr = "10.0.0.4".parse().unwrap();
        limiter.check_at(a, now);
        assert!(matches!(limiter.check_at(a, now), RateDecision::Rejected { .. }));
        assert!(matches!(limiter.check_at(b, now), RateDecision::Allowed { .. }));
    }

    #[test]
    fn test_prune_drops_idle_clients() {
        let limiter = limiter(10, 0);
        let now = Instant::now();
        limiter.check_at("10.0.0.5".parse().unwrap(), now);
        limiter.check_at("10.0.0.6".parse().unwrap(), now + Duration::from_secs(100));
        limiter.prune_at(now + Duration::from_secs(130));
        assert_eq!(limiter.tracked_clients(), 1);
    }
}

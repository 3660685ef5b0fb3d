//! Security middleware for API authentication and rate limiting.

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{Request, StatusCode},
    middleware::Next,
    response::Response,
};
use std::{
    collections::HashMap,
    net::{IpAddr, Ipv4Addr, SocketAddr},
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};

/// Default requests per minute when rate limiting is active.
const DEFAULT_RATE_LIMIT: u32 = 100;

/// Security configuration loaded from environment variables.
#[derive(Clone, Debug)]
pub struct SecurityConfig {
    /// API key for authentication (from COHORT_API_KEY)
    pub api_key: Option<String>,
    /// Allowed CORS origins (from COHORT_CORS_ORIGINS, comma-separated)
    pub cors_origins: Option<Vec<String>>,
    /// Rate limiter instance
    pub rate_limiter: Option<RateLimiter>,
}

impl SecurityConfig {
    /// Load security configuration from environment variables.
    pub fn from_env() -> Self {
        let api_key = std::env::var("COHORT_API_KEY")
            .ok()
            .filter(|k| !k.is_empty());

        let cors_origins = std::env::var("COHORT_CORS_ORIGINS").ok().map(|s| {
            s.split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        });

        let rate_limit = std::env::var("COHORT_RATE_LIMIT")
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(DEFAULT_RATE_LIMIT);

        let trust_proxy = std::env::var("COHORT_TRUST_PROXY")
            .map(|s| matches!(s.trim(), "1" | "true" | "yes"))
            .unwrap_or(false);

        // Rate limiting only matters for shared deployments, which use a key
        let rate_limiter = api_key.as_ref().map(|_| {
            let limiter = RateLimiter::new(rate_limit, Duration::from_secs(60));
            if trust_proxy {
                limiter.trusting_forwarded_headers()
            } else {
                limiter
            }
        });

        Self {
            api_key,
            cors_origins,
            rate_limiter,
        }
    }

    /// Create a config with no authentication (for local development/testing).
    pub fn disabled() -> Self {
        Self {
            api_key: None,
            cors_origins: None,
            rate_limiter: None,
        }
    }

    /// Create a config with authentication enabled.
    pub fn with_api_key(key: impl Into<String>) -> Self {
        Self {
            api_key: Some(key.into()),
            ..Self::disabled()
        }
    }

    /// Create a config with rate limiting enabled.
    pub fn with_rate_limit(max_requests: u32) -> Self {
        Self {
            rate_limiter: Some(RateLimiter::new(max_requests, Duration::from_secs(60))),
            ..Self::disabled()
        }
    }
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

/// Simple in-memory rate limiter using sliding window.
///
/// Clients with no request inside the window are dropped at most one window
/// after their last request, so the table only holds recently active clients.
#[derive(Clone, Debug)]
pub struct RateLimiter {
    max_requests: u32,
    window: Duration,
    trust_forwarded: bool,
    state: Arc<Mutex<LimiterState>>,
}

#[derive(Debug)]
struct LimiterState {
    clients: HashMap<IpAddr, Vec<Instant>>,
    last_sweep: Instant,
}

impl RateLimiter {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            trust_forwarded: false,
            state: Arc::new(Mutex::new(LimiterState {
                clients: HashMap::new(),
                last_sweep: Instant::now(),
            })),
        }
    }

    /// Key clients by `X-Forwarded-For` / `X-Real-IP` instead of the socket
    /// address. Only enable behind a reverse proxy that overwrites them.
    pub fn trusting_forwarded_headers(mut self) -> Self {
        self.trust_forwarded = true;
        self
    }

    /// Returns true if a request from `ip` is allowed, recording it.
    pub fn check(&self, ip: IpAddr) -> bool {
        let now = Instant::now();
        let cutoff = now.checked_sub(self.window);

        let mut state = self.state.lock().expect("rate limiter lock poisoned");
        if now.duration_since(state.last_sweep) >= self.window {
            state.sweep(cutoff);
            state.last_sweep = now;
        }

        let entry = state.clients.entry(ip).or_default();
        if let Some(cutoff) = cutoff {
            entry.retain(|&t| t > cutoff);
        }

        if entry.len() < self.max_requests as usize {
            entry.push(now);
            true
        } else {
            false
        }
    }

    /// Drop every client with no request inside the window.
    pub fn sweep(&self) {
        let cutoff = Instant::now().checked_sub(self.window);
        let mut state = self.state.lock().expect("rate limiter lock poisoned");
        state.sweep(cutoff);
        state.last_sweep = Instant::now();
    }

    /// Number of clients currently tracked.
    pub fn tracked_clients(&self) -> usize {
        self.state
            .lock()
            .expect("rate limiter lock poisoned")
            .clients
            .len()
    }
}

impl LimiterState {
    fn sweep(&mut self, cutoff: Option<Instant>) {
        let Some(cutoff) = cutoff else { return };
        self.clients.retain(|_, times| {
            times.retain(|&t| t > cutoff);
            !times.is_empty()
        });
    }
}

/// Authentication middleware that checks for a valid bearer API key.
pub async fn auth_middleware(
    State(config): State<SecurityConfig>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    let expected_key = match &config.api_key {
        Some(key) => key,
        None => return Ok(next.run(request).await),
    };

    let auth_header = request
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok());

    match auth_header.and_then(|h| h.strip_prefix("Bearer ")) {
        Some(token) if token == expected_key => Ok(next.run(request).await),
        Some(_) => {
            tracing::warn!("Invalid API key provided");
            Err(StatusCode::UNAUTHORIZED)
        }
        None => {
            tracing::warn!("Missing or malformed Authorization header");
            Err(StatusCode::UNAUTHORIZED)
        }
    }
}

/// Rate limiting middleware.
pub async fn rate_limit_middleware(
    State(rate_limiter): State<RateLimiter>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    let ip = extract_client_ip(&request, rate_limiter.trust_forwarded);

    if rate_limiter.check(ip) {
        Ok(next.run(request).await)
    } else {
        tracing::warn!("Rate limit exceeded for IP: {}", ip);
        Err(StatusCode::TOO_MANY_REQUESTS)
    }
}

/// Client address for rate limiting.
///
/// Forwarded headers are client-controlled, so they are read only when
/// `trust_forwarded` is set. Otherwise the peer address recorded by
/// `into_make_service_with_connect_info` is used, falling back to localhost
/// when the server was built without it.
fn extract_client_ip(request: &Request<Body>, trust_forwarded: bool) -> IpAddr {
    let header_ip = |name: &str| {
        request
            .headers()
            .get(name)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .and_then(|v| v.trim().parse::<IpAddr>().ok())
    };
    let forwarded = || {
        trust_forwarded
            .then(|| header_ip("X-Forwarded-For").or_else(|| header_ip("X-Real-IP")))
            .flatten()
    };
    let peer = || {
        request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip())
    };

    forwarded()
        .or_else(peer)
        .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limiter_blocks_requests_over_limit() {
        let limiter = RateLimiter::new(3, Duration::from_secs(60));
        let ip: IpAddr = "192.168.1.1".parse().unwrap();

        assert!(limiter.check(ip));
        assert!(limiter.check(ip));
        assert!(limiter.check(ip));
        assert!(!limiter.check(ip));
    }

    #[test]
    fn rate_limiter_tracks_ips_independently() {
        let limiter = RateLimiter::new(1, Duration::from_secs(60));
        let ip1: IpAddr = "192.168.1.1".parse().unwrap();
        let ip2: IpAddr = "192.168.1.2".parse().unwrap();

        assert!(limiter.check(ip1));
        assert!(!limiter.check(ip1));
        assert!(limiter.check(ip2));
    }

    #[test]
    fn rate_limiter_forgets_idle_clients() {
        let limiter = RateLimiter::new(5, Duration::from_millis(20));
        for n in 1..=3u8 {
            assert!(limiter.check(IpAddr::V4(Ipv4Addr::new(10, 0, 0, n))));
        }
        assert_eq!(limiter.tracked_clients(), 3);

        std::thread::sleep(Duration::from_millis(40));
        assert!(limiter.check("10.0.0.9".parse().unwrap()));
        assert_eq!(limiter.tracked_clients(), 1);

        std::thread::sleep(Duration::from_millis(40));
        limiter.sweep();
        assert_eq!(limiter.tracked_clients(), 0);
    }

    #[test]
    fn forwarded_headers_are_ignored_unless_trusted() {
        let request = Request::builder()
            .header("X-Forwarded-For", "10.0.0.5, 10.0.0.1")
            .body(Body::empty())
            .unwrap();
        assert_eq!(
            extract_client_ip(&request, false),
            IpAddr::V4(Ipv4Addr::LOCALHOST)
        );
        assert_eq!(
            extract_client_ip(&request, true),
            "10.0.0.5".parse::<IpAddr>().unwrap()
        );
    }

    #[test]
    fn client_ip_comes_from_the_connection_by_default() {
        let peer: SocketAddr = "203.0.113.7:4242".parse().unwrap();
        let mut request = Request::builder()
            .header("X-Real-IP", "10.0.0.5")
            .body(Body::empty())
            .unwrap();
        request.extensions_mut().insert(ConnectInfo(peer));

        assert_eq!(extract_client_ip(&request, false), peer.ip());

        let bare = Request::builder().body(Body::empty()).unwrap();
        assert_eq!(extract_client_ip(&bare, true), IpAddr::V4(Ipv4Addr::LOCALHOST));
    }

    #[test]
    fn security_config_with_api_key_has_no_limiter() {
        let config = SecurityConfig::with_api_key("test-key");
        assert_eq!(config.api_key, Some("test-key".to_string()));
        assert!(config.rate_limiter.is_none());
    }
}

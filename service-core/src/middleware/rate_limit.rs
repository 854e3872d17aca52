use crate::error::AppError;
use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::Response,
};
use governor::{
    Quota, RateLimiter,
    clock::{Clock, DefaultClock},
    state::keyed::DashMapStateStore,
};
use std::{
    hash::Hash,
    net::{IpAddr, SocketAddr},
    num::NonZeroU32,
    sync::Arc,
    time::Duration,
};

/// Rate limiter keyed by an arbitrary caller identity.
pub type KeyedRateLimiter<K> = Arc<RateLimiter<K, DashMapStateStore<K>, DefaultClock>>;

/// Rate limiter keyed by client IP address.
pub type IpRateLimiter = KeyedRateLimiter<IpAddr>;

/// `attempts` requests per `window_seconds`, replenished evenly across the
/// window with the full allowance available as a burst.
pub fn create_keyed_rate_limiter<K>(
    attempts: u32,
    window_seconds: u64,
) -> Result<KeyedRateLimiter<K>, AppError>
where
    K: Hash + Eq + Clone,
{
    let burst = NonZeroU32::new(attempts).ok_or_else(|| {
        AppError::ConfigError(anyhow::anyhow!("rate limit attempts must be non-zero"))
    })?;
    let period = Duration::from_millis((window_seconds * 1000) / u64::from(attempts));
    let quota = Quota::with_period(period)
        .ok_or_else(|| AppError::ConfigError(anyhow::anyhow!("rate limit window must be non-zero")))?
        .allow_burst(burst);

    Ok(Arc::new(RateLimiter::dashmap(quota)))
}

pub fn create_ip_rate_limiter(attempts: u32, window_seconds: u64) -> Result<IpRateLimiter, AppError> {
    create_keyed_rate_limiter(attempts, window_seconds)
}

/// Charge one request to `key`. On refusal, returns how long until the next
/// request would be allowed.
pub fn charge<K>(limiter: &KeyedRateLimiter<K>, key: &K) -> Result<(), Duration>
where
    K: Hash + Eq + Clone,
{
    limiter
        .check_key(key)
        .map(|_| ())
        .map_err(|negative| negative.wait_time_from(DefaultClock::default().now()))
}

/// Per-IP limit for browser-facing endpoints.
///
/// The peer address comes from `ConnectInfo`. `X-Forwarded-For` is only read
/// when the peer is one of `trusted_proxies`, and then the nearest hop those
/// proxies did not add themselves is used.
#[derive(Clone)]
pub struct IpRateLimit {
    limiter: IpRateLimiter,
    trusted_proxies: Arc<[IpAddr]>,
}

impl IpRateLimit {
    pub fn new(limiter: IpRateLimiter, trusted_proxies: &[IpAddr]) -> Self {
        Self {
            limiter,
            trusted_proxies: trusted_proxies.into(),
        }
    }

    fn client_ip(&self, request: &Request) -> Option<IpAddr> {
        let peer = request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip())?;

        if !self.trusted_proxies.contains(&peer) {
            return Some(peer);
        }

        let hops: Vec<IpAddr> = request
            .headers()
            .get_all("x-forwarded-for")
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(','))
            .filter_map(|s| s.trim().parse::<IpAddr>().ok())
            .collect();

        hops.into_iter()
            .rev()
            .find(|hop| !self.trusted_proxies.contains(hop))
            .or(Some(peer))
    }
}

pub async fn ip_rate_limit_middleware(
    State(limit): State<IpRateLimit>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let Some(ip) = limit.client_ip(&request) else {
        tracing::warn!("Could not determine IP for rate limiting");
        return Ok(next.run(request).await);
    };

    match charge(&limit.limiter, &ip) {
        Ok(()) => Ok(next.run(request).await),
        Err(wait_time) => {
            tracing::warn!(%ip, path = %request.uri().path(), "Rate limit exceeded");
            Err(AppError::TooManyRequests(
                "Too many requests from this IP. Please try again later.".to_string(),
                Some(wait_time.as_secs().max(1)),
            ))
        }
    }
}

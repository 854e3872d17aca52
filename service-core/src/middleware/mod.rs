pub mod metrics;
pub mod rate_limit;
pub mod security_headers;
pub mod tracing;

pub use self::metrics::metrics_middleware;
pub use self::rate_limit::{
    IpRateLimit, IpRateLimiter, KeyedRateLimiter, charge, create_ip_rate_limiter,
    create_keyed_rate_limiter, ip_rate_limit_middleware,
};
pub use self::security_headers::security_headers_middleware;
pub use self::tracing::{REQUEST_ID_HEADER, RequestId, request_id_middleware};

//! Per-tenant/per-IP rate limiting on the inbound HTTP surface
//! (§4.6 ambient supplement), built on `governor` the way the teacher's
//! `oagw` rate limiter guards outbound upstream calls.

use std::num::NonZeroU32;
use std::sync::Arc;

use axum::extract::Request;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use governor::clock::{Clock, DefaultClock};
use governor::{DefaultKeyedRateLimiter, Quota, RateLimiter as GovernorLimiter};
use http::StatusCode;

/// Keyed by tenant id when known, else by remote address, so anonymous
/// bearer-token traffic cannot starve a single shared bucket.
#[derive(Clone)]
pub struct RateLimiterLayer {
    limiter: Arc<DefaultKeyedRateLimiter<String>>,
}

impl RateLimiterLayer {
    /// `burst` must be non-zero; `rps` of `0` is treated as `1` (the
    /// minimum quota `governor` accepts).
    #[must_use]
    pub fn new(rps: u32, burst: u32) -> Self {
        let rps = NonZeroU32::new(rps.max(1)).unwrap_or(NonZeroU32::MIN);
        let burst = NonZeroU32::new(burst.max(1)).unwrap_or(NonZeroU32::MIN);
        let quota = Quota::per_second(rps).allow_burst(burst);
        Self {
            limiter: Arc::new(GovernorLimiter::keyed(quota)),
        }
    }

    fn check(&self, key: &str) -> Result<(), u64> {
        self.limiter.check_key(&key.to_owned()).map_err(|not_until| {
            not_until
                .wait_time_from(DefaultClock::default().now())
                .as_secs()
        })
    }
}

/// Keyed by `X-Tenant-Id` when present, else by the peer address
/// `axum::serve`'s connect-info layer records; anonymous, direct-dial
/// traffic with neither falls into one shared `"unknown"` bucket.
///
/// Reads the [`RateLimiterLayer`] from request extensions (inserted by
/// `engine_http::wrap_router`) rather than axum `State`, so this layer
/// composes onto a state-free `Router<()>` like every module router.
pub async fn rate_limit_middleware(req: Request, next: Next) -> Response {
    let Some(layer) = req.extensions().get::<RateLimiterLayer>().cloned() else {
        return next.run(req).await;
    };

    let key = req
        .headers()
        .get("x-tenant-id")
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned)
        .or_else(|| {
            req.extensions()
                .get::<axum::extract::ConnectInfo<std::net::SocketAddr>>()
                .map(|ci| ci.0.ip().to_string())
        })
        .unwrap_or_else(|| "unknown".to_owned());

    match layer.check(&key) {
        Ok(()) => next.run(req).await,
        Err(retry_after_secs) => {
            let mut response = StatusCode::TOO_MANY_REQUESTS.into_response();
            if let Ok(value) = http::HeaderValue::from_str(&retry_after_secs.to_string()) {
                response.headers_mut().insert(http::header::RETRY_AFTER, value);
            }
            response
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn burst_allows_then_throttles() {
        let layer = RateLimiterLayer::new(1, 2);
        assert!(layer.check("tenant-a").is_ok());
        assert!(layer.check("tenant-a").is_ok());
        assert!(layer.check("tenant-a").is_err());
    }

    #[test]
    fn separate_keys_have_independent_buckets() {
        let layer = RateLimiterLayer::new(1, 1);
        assert!(layer.check("tenant-a").is_ok());
        assert!(layer.check("tenant-b").is_ok());
    }
}

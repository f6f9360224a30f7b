//! Governor-based rate limiting for the credential endpoints.
//!
//! Each client IP gets its own bucket, so one noisy client cannot lock
//! everyone else out of login and registration.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::num::NonZeroU32;
use std::sync::Arc;

use axum::extract::{ConnectInfo, State};
use axum::http::{Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use governor::clock::DefaultClock;
use governor::state::keyed::DefaultKeyedStateStore;
use governor::{Quota, RateLimiter};
use serde_json::json;

use crate::context::AppContext;

/// Per-IP limiter shared by all credential routes.
pub type SharedLimiter = Arc<RateLimiter<IpAddr, DefaultKeyedStateStore<IpAddr>, DefaultClock>>;

const FALLBACK_PER_MINUTE: NonZeroU32 = match NonZeroU32::new(60) {
    Some(n) => n,
    None => unreachable!(),
};

/// Requests without a peer address (in-process routers) share this key.
const UNKNOWN_PEER: IpAddr = IpAddr::V4(Ipv4Addr::UNSPECIFIED);

/// Create a limiter allowing `requests_per_minute` per client IP.
/// Zero falls back to 60.
pub fn create_limiter(requests_per_minute: u32) -> SharedLimiter {
    let per_minute = NonZeroU32::new(requests_per_minute).unwrap_or(FALLBACK_PER_MINUTE);
    Arc::new(RateLimiter::keyed(Quota::per_minute(per_minute)))
}

fn client_ip<B>(request: &Request<B>) -> IpAddr {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
        .unwrap_or(UNKNOWN_PEER)
}

/// Answers 429 once the caller's bucket is exhausted.
pub async fn rate_limit_middleware(
    State(ctx): State<AppContext>,
    request: Request<axum::body::Body>,
    next: Next,
) -> Response {
    let ip = client_ip(&request);
    if ctx.auth_limiter.check_key(&ip).is_err() {
        tracing::warn!(%ip, path = %request.uri().path(), "Rate limit exceeded");
        return (
            StatusCode::TOO_MANY_REQUESTS,
            Json(json!({ "error": "Request was throttled. Please try again later." })),
        )
            .into_response();
    }

    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(last: u8) -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(10, 0, 0, last))
    }

    #[test]
    fn each_client_has_its_own_bucket() {
        let limiter = create_limiter(2);
        assert!(limiter.check_key(&ip(1)).is_ok());
        assert!(limiter.check_key(&ip(1)).is_ok());
        assert!(limiter.check_key(&ip(1)).is_err());

        assert!(limiter.check_key(&ip(2)).is_ok());
        assert!(limiter.check_key(&ip(2)).is_ok());
    }

    #[test]
    fn zero_quota_falls_back() {
        let limiter = create_limiter(0);
        for _ in 0..60 {
            assert!(limiter.check_key(&ip(3)).is_ok());
        }
        assert!(limiter.check_key(&ip(3)).is_err());
    }

    #[test]
    fn peer_address_comes_from_connect_info() {
        let mut request = Request::new(());
        assert_eq!(client_ip(&request), UNKNOWN_PEER);

        let peer: SocketAddr = "192.0.2.7:51000".parse().unwrap();
        request.extensions_mut().insert(ConnectInfo(peer));
        assert_eq!(client_ip(&request), peer.ip());
    }
}

//! Rate limiting for authentication endpoints.
//!
//! Uses a token bucket algorithm with per-IP tracking to prevent brute force attacks.

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use governor::{clock::DefaultClock, state::keyed::DefaultKeyedStateStore, Quota, RateLimiter};
use std::{num::NonZeroU32, sync::Arc};

use crate::pipeline::ip::extract_client_ip;
use crate::pipeline::state::AppState;

/// Per-IP rate limiter for stricter endpoint-specific limiting.
pub type IpLimiter = RateLimiter<String, DefaultKeyedStateStore<String>, DefaultClock>;

/// Rate limiting configuration for authentication endpoints.
#[derive(Clone)]
pub struct RateLimitConfig {
    /// Per-IP limiter for `/auth/v1/signup` (strict: 3 requests per minute).
    pub signup: Arc<IpLimiter>,
    /// Per-IP limiter for `/auth/v1/token` (prevents password brute force).
    pub password_grant: Arc<IpLimiter>,
    /// Per-IP limiter for `/auth/v1/recover` and `/auth/v1/magiclink`.
    pub recover: Arc<IpLimiter>,
}

impl RateLimitConfig {
    /// Create rate limiters with default configuration.
    /// In test mode, limits are much higher to allow rapid test execution.
    pub fn new() -> Self {
        #[cfg(feature = "test-mode")]
        const SIGNUP_PER_MIN: u32 = 1000;
        #[cfg(not(feature = "test-mode"))]
        const SIGNUP_PER_MIN: u32 = 3;

        #[cfg(feature = "test-mode")]
        const PASSWORD_GRANT_PER_SEC: u32 = 1000;
        #[cfg(not(feature = "test-mode"))]
        const PASSWORD_GRANT_PER_SEC: u32 = 1;

        #[cfg(feature = "test-mode")]
        const PASSWORD_GRANT_BURST: u32 = 1000;
        #[cfg(not(feature = "test-mode"))]
        const PASSWORD_GRANT_BURST: u32 = 5;

        #[cfg(feature = "test-mode")]
        const RECOVER_PER_MIN: u32 = 1000;
        #[cfg(not(feature = "test-mode"))]
        const RECOVER_PER_MIN: u32 = 3;

        Self {
            signup: Arc::new(RateLimiter::keyed(Quota::per_minute(
                NonZeroU32::new(SIGNUP_PER_MIN).unwrap(),
            ))),
            password_grant: Arc::new(RateLimiter::keyed(
                Quota::per_second(NonZeroU32::new(PASSWORD_GRANT_PER_SEC).unwrap())
                    .allow_burst(NonZeroU32::new(PASSWORD_GRANT_BURST).unwrap()),
            )),
            recover: Arc::new(RateLimiter::keyed(Quota::per_minute(
                NonZeroU32::new(RECOVER_PER_MIN).unwrap(),
            ))),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self::new()
    }
}

async fn limited(
    limiter: &IpLimiter,
    request: Request,
    next: Next,
    rejection_message: &'static str,
) -> Response {
    let ip = match extract_client_ip(&request) {
        Some(ip) => ip,
        None => return (StatusCode::FORBIDDEN, "unable to determine client IP").into_response(),
    };

    match limiter.check_key(&ip) {
        Ok(_) => next.run(request).await,
        Err(_) => (StatusCode::TOO_MANY_REQUESTS, rejection_message).into_response(),
    }
}

/// Middleware for rate limiting `/auth/v1/signup`.
pub async fn rate_limit_signup(State(state): State<AppState>, request: Request, next: Next) -> Response {
    limited(&state.rate_limit.signup, request, next, "too many signup attempts, please wait before trying again").await
}

/// Middleware for rate limiting `/auth/v1/token` (password grant brute force).
pub async fn rate_limit_password_grant(State(state): State<AppState>, request: Request, next: Next) -> Response {
    limited(
        &state.rate_limit.password_grant,
        request,
        next,
        "too many authentication attempts, please wait before trying again",
    )
    .await
}

/// Middleware for rate limiting `/auth/v1/recover` and `/auth/v1/magiclink`.
pub async fn rate_limit_recover(State(state): State<AppState>, request: Request, next: Next) -> Response {
    limited(&state.rate_limit.recover, request, next, "too many requests, please wait before trying again").await
}

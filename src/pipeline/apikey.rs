//! `apikey` validator middleware (§4.9): required on `/rest/v1/*` and
//! `/admin/v1/*`, sets the request principal to `anon` or `service_role`.
//! Missing/invalid is a 401.

use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::http::error::ApiError;
use crate::pipeline::state::AppState;
use crate::rls::Principal;

fn extract_key(req: &Request) -> Option<String> {
    if let Some(key) = req.headers().get("apikey").and_then(|v| v.to_str().ok()) {
        return Some(key.to_string());
    }
    req.headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::to_string)
}

pub async fn require_api_key(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    let Some(key) = extract_key(&req) else {
        return ApiError::unauthorized("missing apikey").into_response();
    };

    match state.auth.validate_api_key(&key) {
        Ok(role) => {
            req.extensions_mut().insert(Principal {
                user_id: None,
                role,
                claims: serde_json::json!({}),
            });
            next.run(req).await
        }
        Err(_) => ApiError::unauthorized("invalid apikey").into_response(),
    }
}

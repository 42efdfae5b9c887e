//! Optional bearer-token upgrade (§4.9): runs after `apikey`, swaps the
//! `anon`/`service_role` principal for the authenticated user's own
//! principal when `Authorization: Bearer` carries a valid access token.
//! Absent header: pass through unchanged. Present-but-invalid: 401.

use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::http::error::ApiError;
use crate::pipeline::state::AppState;
use crate::rls::Principal;

fn bearer_token(req: &Request) -> Option<&str> {
    req.headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

pub async fn upgrade_bearer_principal(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Response {
    let Some(token) = bearer_token(&req) else {
        return next.run(req).await;
    };

    match state.auth.validate_access_token(token) {
        Ok(claims) => {
            req.extensions_mut().insert(Principal {
                user_id: Some(claims.sub),
                role: claims.role,
                claims: serde_json::json!({
                    "email": claims.email,
                    "app_metadata": claims.app_metadata,
                    "user_metadata": claims.user_metadata,
                    "is_anonymous": claims.is_anonymous,
                }),
            });
            next.run(req).await
        }
        Err(_) => ApiError::unauthorized("invalid or expired access token").into_response(),
    }
}

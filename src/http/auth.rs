//! `/auth/v1/*` handlers (§4.11): signup, token exchange, recovery,
//! verification, magic links, resend, logout, profile, invites, identity
//! linking, and the OAuth authorize/callback redirects.

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Redirect, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::auth::TokenPair;
use crate::db::{User, VerificationTokenType};
use crate::error::Error;
use crate::http::error::{ApiError, ResultExt};
use crate::mail::Message;
use crate::pipeline::state::AppState;
use crate::rls::Principal;

#[derive(Serialize)]
struct TokenResponse {
    access_token: String,
    token_type: &'static str,
    expires_in: u64,
    refresh_token: String,
    user: User,
}

impl From<TokenPair> for TokenResponse {
    fn from(pair: TokenPair) -> Self {
        Self {
            access_token: pair.access_token,
            token_type: "bearer",
            expires_in: pair.expires_in,
            refresh_token: pair.refresh_token,
            user: pair.user,
        }
    }
}

/// A response body that never varies regardless of whether the target
/// email exists, per the enumeration-safety requirement on
/// recover/magiclink/resend.
#[derive(Serialize)]
struct GenericMessage {
    message: &'static str,
}

const GENERIC_MESSAGE: GenericMessage = GenericMessage {
    message: "If an account with that email exists, an email has been sent.",
};

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

fn require_principal(principal: &Principal) -> Result<&str, ApiError> {
    principal
        .user_id
        .as_deref()
        .ok_or_else(|| ApiError::from(Error::Authentication))
}

fn site_url(state: &AppState) -> String {
    state
        .config
        .site_url
        .clone()
        .unwrap_or_else(|| "http://localhost:8080".to_string())
}

fn callback_url(state: &AppState) -> String {
    format!("{}/auth/v1/callback", site_url(state))
}

async fn send_verification_email(
    state: &AppState,
    user: &User,
    token: &str,
    token_type: &str,
) {
    let email = match &user.email {
        Some(e) => e.clone(),
        None => return,
    };

    let mut vars = std::collections::HashMap::new();
    vars.insert("SiteURL", site_url(state));
    vars.insert(
        "ConfirmationURL",
        format!("{}/auth/v1/verify?type={token_type}&token={token}", site_url(state)),
    );
    vars.insert("Email", email.clone());
    vars.insert("Token", token.to_string());
    vars.insert("ExpiresIn", "3600".to_string());

    let rendered = match crate::mail::render_template(&state.db, token_type, &vars).await {
        Ok(r) => r,
        Err(e) => {
            tracing::error!(error = %e, "failed to render mail template");
            return;
        }
    };

    let message = Message {
        to: email,
        from: state.config.mail_from.clone(),
        subject: rendered.subject,
        body_html: Some(rendered.body_html),
        body_text: rendered.body_text,
        email_type: token_type.to_string(),
        user_id: Some(user.id.clone()),
        metadata: serde_json::json!({}),
    };

    if let Err(e) = state.mailer.send(message).await {
        tracing::error!(error = %e, "failed to send verification email");
    }
}

#[derive(Deserialize)]
pub struct SignupRequest {
    email: Option<String>,
    password: Option<String>,
    data: Option<serde_json::Value>,
}

pub async fn signup(State(state): State<AppState>, Json(body): Json<SignupRequest>) -> Response {
    match signup_inner(state, body).await {
        Ok(resp) => resp,
        Err(e) => e.into_response(),
    }
}

async fn signup_inner(state: AppState, body: SignupRequest) -> Result<Response, ApiError> {
    let user = match (body.email.as_deref(), body.password.as_deref()) {
        (Some(email), Some(password)) => {
            let user = state.auth.create_user(email, password, body.data).await.api_err()?;
            let token = state
                .auth
                .create_verification_token(&user.id, VerificationTokenType::Confirmation, email)
                .await
                .api_err()?;
            send_verification_email(&state, &user, &token, "confirmation").await;
            user
        }
        (None, None) => state.auth.create_anonymous_user(body.data).await.api_err()?,
        _ => {
            return Err(ApiError::from(Error::Validation(
                "signup requires both email and password, or neither for an anonymous user".into(),
            )));
        }
    };

    Ok((StatusCode::OK, Json(user)).into_response())
}

#[derive(Deserialize)]
pub struct TokenGrant {
    grant_type: String,
}

#[derive(Deserialize)]
struct PasswordGrant {
    email: String,
    password: String,
}

#[derive(Deserialize)]
struct RefreshGrant {
    refresh_token: String,
}

pub async fn token(
    State(state): State<AppState>,
    Query(grant): Query<TokenGrant>,
    body: axum::body::Bytes,
) -> Response {
    match token_inner(state, grant, body).await {
        Ok(resp) => resp,
        Err(e) => e.into_response(),
    }
}

async fn token_inner(state: AppState, grant: TokenGrant, body: axum::body::Bytes) -> Result<Response, ApiError> {
    let pair = match grant.grant_type.as_str() {
        "password" => {
            let req: PasswordGrant = serde_json::from_slice(&body)
                .map_err(|e| ApiError::from(Error::InvalidJson(e.to_string())))?;
            let user = state
                .auth
                .db()
                .users()
                .get_by_email(&req.email)
                .await
                .map_err(Error::from)
                .api_err()?
                .ok_or(Error::Authentication)
                .api_err()?;
            if !state.auth.validate_password(&user, &req.password).await.api_err()? {
                return Err(ApiError::from(Error::Authentication));
            }
            state.auth.create_session(&user).await.api_err()?
        }
        "refresh_token" => {
            let req: RefreshGrant = serde_json::from_slice(&body)
                .map_err(|e| ApiError::from(Error::InvalidJson(e.to_string())))?;
            state.auth.refresh_session(&req.refresh_token).await.api_err()?
        }
        "id_token" => {
            return Err(ApiError::from(Error::Validation(
                "grant_type=id_token is not enabled on this deployment".into(),
            )));
        }
        other => {
            return Err(ApiError::from(Error::Validation(format!(
                "unsupported grant_type: {other}"
            ))));
        }
    };

    Ok((StatusCode::OK, Json(TokenResponse::from(pair))).into_response())
}

#[derive(Deserialize)]
pub struct RecoverRequest {
    email: String,
}

pub async fn recover(State(state): State<AppState>, Json(body): Json<RecoverRequest>) -> Response {
    if let Ok(Some(user)) = state.auth.db().users().get_by_email(&body.email).await {
        if let Ok(token) = state
            .auth
            .create_verification_token(&user.id, VerificationTokenType::Recovery, &body.email)
            .await
        {
            send_verification_email(&state, &user, &token, "recovery").await;
        }
    }
    Json(GENERIC_MESSAGE).into_response()
}

#[derive(Deserialize)]
pub struct MagiclinkRequest {
    email: String,
}

pub async fn magiclink(State(state): State<AppState>, Json(body): Json<MagiclinkRequest>) -> Response {
    if let Ok(Some(user)) = state.auth.db().users().get_by_email(&body.email).await {
        if let Ok(token) = state
            .auth
            .create_verification_token(&user.id, VerificationTokenType::Magiclink, &body.email)
            .await
        {
            send_verification_email(&state, &user, &token, "magiclink").await;
        }
    }
    Json(GENERIC_MESSAGE).into_response()
}

#[derive(Deserialize)]
pub struct ResendRequest {
    email: String,
    #[serde(rename = "type")]
    token_type: Option<String>,
}

pub async fn resend(State(state): State<AppState>, Json(body): Json<ResendRequest>) -> Response {
    let token_type = body
        .token_type
        .as_deref()
        .and_then(VerificationTokenType::from_str)
        .unwrap_or(VerificationTokenType::Confirmation);

    let token_type_str = token_type.as_str();
    if let Ok(Some(user)) = state.auth.db().users().get_by_email(&body.email).await {
        if let Ok(token) = state
            .auth
            .create_verification_token(&user.id, token_type, &body.email)
            .await
        {
            send_verification_email(&state, &user, &token, token_type_str).await;
        }
    }
    Json(GENERIC_MESSAGE).into_response()
}

#[derive(Deserialize)]
pub struct VerifyRequest {
    #[serde(rename = "type")]
    token_type: String,
    token: String,
}

pub async fn verify(State(state): State<AppState>, Query(query): Query<VerifyRequest>) -> Response {
    match verify_inner(state, query).await {
        Ok(resp) => resp,
        Err(e) => e.into_response(),
    }
}

async fn verify_inner(state: AppState, query: VerifyRequest) -> Result<Response, ApiError> {
    let expected = VerificationTokenType::from_str(&query.token_type)
        .ok_or_else(|| ApiError::from(Error::Validation(format!("unknown verification type: {}", query.token_type))))?;

    let consumed = state.auth.consume_verification_token(&query.token, expected).await.api_err()?;

    let user = state
        .auth
        .db()
        .users()
        .get_by_id(&consumed.user_id)
        .await
        .map_err(Error::from)
        .api_err()?
        .ok_or_else(|| ApiError::from(Error::NotFound("user not found".into())))?;

    match consumed.token_type {
        VerificationTokenType::Confirmation | VerificationTokenType::Invite => {
            state.auth.db().users().set_email_confirmed(&user.id).await.map_err(Error::from).api_err()?;
        }
        VerificationTokenType::EmailChange => {
            // The new address traveled in the token itself.
            state.auth.db().users().set_email(&user.id, &consumed.email).await.map_err(Error::from).api_err()?;
            state.auth.db().users().set_email_confirmed(&user.id).await.map_err(Error::from).api_err()?;
        }
        VerificationTokenType::Recovery | VerificationTokenType::Magiclink => {}
    }

    let refreshed = state
        .auth
        .db()
        .users()
        .get_by_id(&user.id)
        .await
        .map_err(Error::from)
        .api_err()?
        .ok_or_else(|| ApiError::from(Error::NotFound("user not found".into())))?;

    let pair = state.auth.create_session(&refreshed).await.api_err()?;
    Ok((StatusCode::OK, Json(TokenResponse::from(pair))).into_response())
}

pub async fn logout(State(state): State<AppState>, headers: HeaderMap) -> Response {
    match logout_inner(state, headers).await {
        Ok(_) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => e.into_response(),
    }
}

async fn logout_inner(state: AppState, headers: HeaderMap) -> Result<(), ApiError> {
    let token = bearer_token(&headers).ok_or_else(|| ApiError::from(Error::Authentication))?;
    let claims = state.auth.validate_access_token(token).api_err()?;
    state.auth.logout(&claims.session_id).await.api_err()?;
    Ok(())
}

pub async fn get_user(
    State(state): State<AppState>,
    axum::Extension(principal): axum::Extension<Principal>,
) -> Response {
    match get_user_inner(state, principal).await {
        Ok(resp) => resp,
        Err(e) => e.into_response(),
    }
}

async fn get_user_inner(state: AppState, principal: Principal) -> Result<Response, ApiError> {
    let user_id = require_principal(&principal)?;
    let user = state
        .db
        .users()
        .get_by_id(user_id)
        .await
        .map_err(Error::from)
        .api_err()?
        .ok_or_else(|| ApiError::from(Error::NotFound("user not found".into())))?;
    Ok(Json(user).into_response())
}

#[derive(Deserialize)]
pub struct UpdateUserRequest {
    email: Option<String>,
    password: Option<String>,
    data: Option<serde_json::Value>,
}

pub async fn update_user(
    State(state): State<AppState>,
    axum::Extension(principal): axum::Extension<Principal>,
    Json(body): Json<UpdateUserRequest>,
) -> Response {
    match update_user_inner(state, principal, body).await {
        Ok(resp) => resp,
        Err(e) => e.into_response(),
    }
}

async fn update_user_inner(
    state: AppState,
    principal: Principal,
    body: UpdateUserRequest,
) -> Result<Response, ApiError> {
    let user_id = require_principal(&principal)?.to_string();
    let mut user = state
        .db
        .users()
        .get_by_id(&user_id)
        .await
        .map_err(Error::from)
        .api_err()?
        .ok_or_else(|| ApiError::from(Error::NotFound("user not found".into())))?;

    if let Some(password) = &body.password {
        crate::auth::password::validate_strength(password).api_err()?;
        let hashed = crate::auth::password::hash(password).api_err()?;
        state.db.users().set_password(&user_id, &hashed).await.map_err(Error::from).api_err()?;
    }

    if let Some(data) = &body.data {
        state
            .db
            .users()
            .set_metadata(&user_id, &user.app_metadata, data)
            .await
            .map_err(Error::from)
            .api_err()?;
    }

    if let Some(email) = &body.email {
        if Some(email.as_str()) != user.email.as_deref() {
            let token = state
                .auth
                .create_verification_token(&user_id, VerificationTokenType::EmailChange, email)
                .await
                .api_err()?;
            send_verification_email(&state, &user, &token, "email_change").await;
        }
    }

    user = state
        .db
        .users()
        .get_by_id(&user_id)
        .await
        .map_err(Error::from)
        .api_err()?
        .ok_or_else(|| ApiError::from(Error::NotFound("user not found".into())))?;

    Ok(Json(user).into_response())
}

#[derive(Deserialize)]
pub struct InviteRequest {
    email: String,
    data: Option<serde_json::Value>,
}

pub async fn invite(
    State(state): State<AppState>,
    axum::Extension(principal): axum::Extension<Principal>,
    Json(body): Json<InviteRequest>,
) -> Response {
    match invite_inner(state, principal, body).await {
        Ok(resp) => resp,
        Err(e) => e.into_response(),
    }
}

async fn invite_inner(state: AppState, principal: Principal, body: InviteRequest) -> Result<Response, ApiError> {
    if !principal.is_service_role() {
        return Err(ApiError::from(Error::Authentication));
    }

    let id = uuid::Uuid::new_v4().to_string();
    let app_metadata = serde_json::json!({"provider": "email", "providers": ["email"]});
    let user_metadata = body.data.unwrap_or_else(|| serde_json::json!({}));

    state
        .db
        .users()
        .create(&id, Some(&body.email), None, None, &app_metadata, &user_metadata, false)
        .await
        .map_err(Error::from)
        .api_err()?;

    let user = state
        .db
        .users()
        .get_by_id(&id)
        .await
        .map_err(Error::from)
        .api_err()?
        .ok_or_else(|| ApiError::from(Error::NotFound("user vanished after creation".into())))?;

    let token = state
        .auth
        .create_verification_token(&id, VerificationTokenType::Invite, &body.email)
        .await
        .api_err()?;
    send_verification_email(&state, &user, &token, "invite").await;

    Ok((StatusCode::OK, Json(user)).into_response())
}

pub async fn list_identities(
    State(state): State<AppState>,
    axum::Extension(principal): axum::Extension<Principal>,
) -> Response {
    match list_identities_inner(state, principal).await {
        Ok(resp) => resp,
        Err(e) => e.into_response(),
    }
}

async fn list_identities_inner(state: AppState, principal: Principal) -> Result<Response, ApiError> {
    let user_id = require_principal(&principal)?;
    let identities = state.db.identities().list_for_user(user_id).await.map_err(Error::from).api_err()?;
    Ok(Json(identities).into_response())
}

pub async fn unlink_identity(
    State(state): State<AppState>,
    axum::Extension(principal): axum::Extension<Principal>,
    Path(provider): Path<String>,
) -> Response {
    match unlink_identity_inner(state, principal, provider).await {
        Ok(_) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => e.into_response(),
    }
}

async fn unlink_identity_inner(state: AppState, principal: Principal, provider: String) -> Result<(), ApiError> {
    let user_id = require_principal(&principal)?;
    state.oauth.unlink(user_id, &provider).await.api_err()?;
    Ok(())
}

#[derive(Deserialize)]
pub struct AuthorizeQuery {
    provider: String,
    redirect_to: String,
}

pub async fn authorize(State(state): State<AppState>, Query(query): Query<AuthorizeQuery>) -> Response {
    let callback = callback_url(&state);
    match state.oauth.authorize(&query.provider, &query.redirect_to, &callback).await {
        Ok(url) => Redirect::to(&url).into_response(),
        Err(e) => ApiError::from(e).into_response(),
    }
}

#[derive(Deserialize)]
pub struct CallbackQuery {
    state: String,
    code: String,
}

pub async fn callback(State(state): State<AppState>, Query(query): Query<CallbackQuery>, headers: HeaderMap) -> Response {
    let callback = callback_url(&state);

    let upgrading = bearer_token(&headers)
        .and_then(|t| state.auth.validate_access_token(t).ok())
        .filter(|claims| claims.is_anonymous)
        .map(|claims| claims.sub);

    match state
        .oauth
        .callback(&query.state, &query.code, &callback, upgrading.as_deref())
        .await
    {
        Ok((pair, redirect_to)) => {
            let fragment = format!(
                "access_token={}&refresh_token={}&expires_in={}&token_type=bearer",
                pair.access_token, pair.refresh_token, pair.expires_in
            );
            Redirect::to(&format!("{redirect_to}#{fragment}")).into_response()
        }
        Err(e) => ApiError::from(e).into_response(),
    }
}

pub async fn settings(State(state): State<AppState>) -> Response {
    let external: serde_json::Map<String, serde_json::Value> = state
        .config
        .oauth_providers
        .iter()
        .map(|(name, cfg)| (name.clone(), serde_json::json!(cfg.enabled)))
        .collect();

    Json(serde_json::json!({ "external": external })).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_response_carries_bearer_type() {
        let pair = TokenPair {
            access_token: "a".into(),
            refresh_token: "v1.b".into(),
            expires_in: 3600,
            user: User {
                id: "u1".into(),
                email: Some("a@b.co".into()),
                encrypted_password: None,
                email_confirmed_at: None,
                last_sign_in_at: None,
                app_metadata: serde_json::json!({}),
                user_metadata: serde_json::json!({}),
                role: crate::db::UserRole::Authenticated,
                is_anonymous: false,
                is_super_admin: false,
                created_at: "now".into(),
                updated_at: "now".into(),
                deleted_at: None,
            },
        };
        let response = TokenResponse::from(pair);
        assert_eq!(response.token_type, "bearer");
        assert_eq!(response.expires_in, 3600);
    }
}

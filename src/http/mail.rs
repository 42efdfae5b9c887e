//! `/mail/*` viewer endpoints: inspect messages captured by the catch-mode
//! mailer. Present regardless of `MAIL_MODE`, but only ever populated when
//! catch mode is active.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

use crate::error::Error;
use crate::http::error::{ApiError, ResultExt};
use crate::pipeline::state::AppState;

pub async fn list(State(state): State<AppState>) -> Response {
    match state.db.emails().list().await.map_err(Error::from).api_err() {
        Ok(emails) => Json(emails).into_response(),
        Err(e) => e.into_response(),
    }
}

pub async fn get(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match get_inner(state, id).await {
        Ok(resp) => resp,
        Err(e) => e.into_response(),
    }
}

async fn get_inner(state: AppState, id: String) -> Result<Response, ApiError> {
    let email = state
        .db
        .emails()
        .get(&id)
        .await
        .map_err(Error::from)
        .api_err()?
        .ok_or_else(|| ApiError::from(Error::NotFound(format!("no such message: {id}"))))?;
    Ok(Json(email).into_response())
}

pub async fn delete(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match delete_inner(state, id).await {
        Ok(found) if found => StatusCode::NO_CONTENT.into_response(),
        Ok(_) => ApiError::from(Error::NotFound("no such message".into())).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn delete_inner(state: AppState, id: String) -> Result<bool, ApiError> {
    state.db.emails().delete(&id).await.map_err(Error::from).api_err()
}

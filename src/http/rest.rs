//! `/rest/v1/{table}` verbs (§4.10): Query Parser → RLS engine → SQL
//! Builder → Store, scanning rows through the tagged `Row` type.

use axum::{
    body::Bytes,
    extract::{Path, RawQuery, State},
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use std::collections::HashMap;

use crate::error::Error;
use crate::http::error::{ApiError, ResultExt};
use crate::pipeline::state::AppState;
use crate::query::builder::{self, Param};
use crate::query::row::scan_row;
use crate::query::{ParsedQuery, Prefer, Return};
use crate::rls::{Command, Enforcement, Principal};
use crate::types::PgType;

async fn table_columns(
    state: &AppState,
    table: &str,
) -> Result<HashMap<String, PgType>, ApiError> {
    let cols = state.db.columns().columns_for_table(table).await.api_err()?;
    if cols.is_empty() {
        return Err(ApiError::from(Error::NotFound(format!("unknown table: {table}"))));
    }
    Ok(cols.into_iter().map(|c| (c.column_name, c.pg_type)).collect())
}

async fn enforce(
    state: &AppState,
    table: &str,
    command: Command,
    principal: &Principal,
    columns: &HashMap<String, PgType>,
) -> Result<Option<(String, Vec<Param>)>, ApiError> {
    match state.rls.enforce(table, command, principal, columns).await.api_err()? {
        Enforcement::Bypass => Ok(None),
        Enforcement::Predicate(sql, params) => Ok(Some((sql, params))),
        Enforcement::Deny => Err(ApiError::from(Error::RlsDenied)),
    }
}

fn parse_query(raw_query: Option<&str>) -> Result<ParsedQuery, ApiError> {
    ParsedQuery::parse(raw_query.unwrap_or("")).api_err()
}

/// Borrow the RLS predicate for a builder call without consuming it, since
/// several call sites need it for both a data statement and a count/select
/// companion statement.
fn borrow_extra_where(extra_where: &Option<(String, Vec<Param>)>) -> Option<(&str, Vec<Param>)> {
    extra_where.as_ref().map(|(sql, params)| (sql.as_str(), params.clone()))
}

pub async fn select(
    State(state): State<AppState>,
    Path(table): Path<String>,
    RawQuery(raw_query): RawQuery,
    headers: HeaderMap,
    axum::Extension(principal): axum::Extension<Principal>,
) -> Response {
    match select_inner(state, table, raw_query, headers, principal).await {
        Ok(resp) => resp,
        Err(e) => e.into_response(),
    }
}

async fn select_inner(
    state: AppState,
    table: String,
    raw_query: Option<String>,
    headers: HeaderMap,
    principal: Principal,
) -> Result<Response, ApiError> {
    let columns = table_columns(&state, &table).await?;
    let query = parse_query(raw_query.as_deref())?;
    let prefer = Prefer::parse(headers.get("prefer").and_then(|v| v.to_str().ok()));

    let extra_where = enforce(&state, &table, Command::Select, &principal, &columns).await?;

    let stmt = builder::select(&table, &columns, &query, borrow_extra_where(&extra_where))
        .map_err(ApiError::from)?;
    let mut q = sqlx::query(&stmt.sql);
    for param in stmt.params {
        q = param.bind(q);
    }
    let rows = q.fetch_all(state.db.pool()).await.map_err(Error::from).api_err()?;

    let body: Vec<serde_json::Value> = rows.iter().map(|r| scan_row(r, &columns).into_json()).collect();

    let row_count = body.len();
    let mut response = Json(body).into_response();

    if prefer.count_exact {
        let count_stmt = builder::count(&table, &columns, &query, borrow_extra_where(&extra_where)).map_err(ApiError::from)?;
        let mut cq = sqlx::query_scalar::<_, i64>(&count_stmt.sql);
        for param in count_stmt.params {
            cq = bind_scalar(cq, param);
        }
        let total: i64 = cq.fetch_one(state.db.pool()).await.map_err(Error::from).api_err()?;
        let hi = row_count.saturating_sub(1);
        let value = format!("0-{hi}/{total}");
        if let Ok(header) = HeaderValue::from_str(&value) {
            response.headers_mut().insert("content-range", header);
        }
    }

    Ok(response)
}

pub async fn head(
    state: State<AppState>,
    path: Path<String>,
    query: RawQuery,
    headers: HeaderMap,
    principal: axum::Extension<Principal>,
) -> Response {
    match select_inner(state.0, path.0, query.0, headers, principal.0).await {
        Ok(resp) => {
            let (parts, _) = resp.into_parts();
            Response::from_parts(parts, axum::body::Body::empty())
        }
        Err(e) => e.into_response(),
    }
}

fn bind_scalar<'q>(
    query: sqlx::query::QueryScalar<'q, sqlx::Sqlite, i64, sqlx::sqlite::SqliteArguments<'q>>,
    param: Param,
) -> sqlx::query::QueryScalar<'q, sqlx::Sqlite, i64, sqlx::sqlite::SqliteArguments<'q>> {
    match param {
        Param::Null => query.bind(None::<String>),
        Param::Int(i) => query.bind(i),
        Param::Float(f) => query.bind(f),
        Param::Text(s) => query.bind(s),
        Param::Blob(b) => query.bind(b),
    }
}

fn parse_body_rows(bytes: &[u8]) -> Result<Vec<serde_json::Map<String, serde_json::Value>>, ApiError> {
    let value: serde_json::Value = serde_json::from_slice(bytes)
        .map_err(|e| ApiError::from(Error::InvalidJson(e.to_string())))?;

    match value {
        serde_json::Value::Array(items) => items
            .into_iter()
            .map(|v| {
                v.as_object()
                    .cloned()
                    .ok_or_else(|| ApiError::from(Error::InvalidJson("expected an array of objects".into())))
            })
            .collect(),
        serde_json::Value::Object(obj) => Ok(vec![obj]),
        _ => Err(ApiError::from(Error::InvalidJson("expected a JSON object or array".into()))),
    }
}

fn validate_rows(
    columns: &HashMap<String, PgType>,
    rows: &[serde_json::Map<String, serde_json::Value>],
) -> Result<(), ApiError> {
    for row in rows {
        for (col, value) in row {
            let pg_type = columns
                .get(col)
                .ok_or_else(|| ApiError::from(Error::UnknownColumn(col.clone())))?;
            crate::types::validate(*pg_type, value).api_err()?;
        }
    }
    Ok(())
}

pub async fn insert(
    State(state): State<AppState>,
    Path(table): Path<String>,
    headers: HeaderMap,
    axum::Extension(principal): axum::Extension<Principal>,
    body: Bytes,
) -> Response {
    match insert_inner(state, table, headers, principal, body).await {
        Ok(resp) => resp,
        Err(e) => e.into_response(),
    }
}

async fn insert_inner(
    state: AppState,
    table: String,
    headers: HeaderMap,
    principal: Principal,
    body: Bytes,
) -> Result<Response, ApiError> {
    let columns = table_columns(&state, &table).await?;
    let prefer = Prefer::parse(headers.get("prefer").and_then(|v| v.to_str().ok()));
    let rows = parse_body_rows(&body)?;
    validate_rows(&columns, &rows)?;

    let stmt = builder::insert(&table, &columns, &rows).map_err(ApiError::from)?;

    let mut tx = state.db.begin().await.map_err(Error::from).api_err()?;
    let mut q = sqlx::query(&stmt.sql);
    for param in stmt.params {
        q = param.bind(q);
    }
    q.execute(&mut *tx).await.map_err(Error::from).api_err()?;

    // Evaluate per-row WITH CHECK against the caller-supplied values —
    // sufficient since the row's persisted shape equals what was inserted.
    for row in &rows {
        let mut scanned = std::collections::BTreeMap::new();
        for (col, pg_type) in &columns {
            let value = row.get(col).cloned().unwrap_or(serde_json::Value::Null);
            scanned.insert(col.clone(), json_to_row_value(*pg_type, &value));
        }
        state
            .rls
            .check_row(&table, Command::Insert, &principal, &columns, &crate::query::row::Row(scanned))
            .await
            .api_err()?;
    }

    tx.commit().await.map_err(Error::from).api_err()?;

    if prefer.return_ == Return::Representation {
        let body: Vec<serde_json::Value> = rows.into_iter().map(serde_json::Value::Object).collect();
        Ok((StatusCode::CREATED, Json(body)).into_response())
    } else {
        Ok(StatusCode::CREATED.into_response())
    }
}

fn json_to_row_value(pg_type: PgType, value: &serde_json::Value) -> crate::query::row::Value {
    use crate::query::row::Value;
    if value.is_null() {
        return Value::Null;
    }
    match pg_type {
        PgType::Integer => Value::Int(value.as_i64().unwrap_or_default()),
        PgType::Numeric => value
            .as_f64()
            .map(Value::Float)
            .unwrap_or_else(|| Value::Text(value.as_str().unwrap_or_default().to_string())),
        PgType::Boolean => Value::Bool(value.as_bool().unwrap_or(value.as_i64().unwrap_or(0) != 0)),
        PgType::Jsonb => Value::Json(value.clone()),
        _ => Value::Text(value.as_str().unwrap_or_default().to_string()),
    }
}

pub async fn update(
    State(state): State<AppState>,
    Path(table): Path<String>,
    RawQuery(raw_query): RawQuery,
    headers: HeaderMap,
    axum::Extension(principal): axum::Extension<Principal>,
    body: Bytes,
) -> Response {
    match update_inner(state, table, raw_query, headers, principal, body).await {
        Ok(resp) => resp,
        Err(e) => e.into_response(),
    }
}

async fn update_inner(
    state: AppState,
    table: String,
    raw_query: Option<String>,
    headers: HeaderMap,
    principal: Principal,
    body: Bytes,
) -> Result<Response, ApiError> {
    let columns = table_columns(&state, &table).await?;
    let query = parse_query(raw_query.as_deref())?;
    let prefer = Prefer::parse(headers.get("prefer").and_then(|v| v.to_str().ok()));

    let value: serde_json::Value = serde_json::from_slice(&body)
        .map_err(|e| ApiError::from(Error::InvalidJson(e.to_string())))?;
    let set = value
        .as_object()
        .cloned()
        .ok_or_else(|| ApiError::from(Error::InvalidJson("expected a JSON object".into())))?;
    for (col, v) in &set {
        let pg_type = columns.get(col).ok_or_else(|| ApiError::from(Error::UnknownColumn(col.clone())))?;
        crate::types::validate(*pg_type, v).api_err()?;
    }

    let extra_where = enforce(&state, &table, Command::Update, &principal, &columns).await?;
    let stmt = builder::update(&table, &columns, &set, &query, borrow_extra_where(&extra_where)).map_err(ApiError::from)?;

    let mut tx = state.db.begin().await.map_err(Error::from).api_err()?;
    let mut q = sqlx::query(&stmt.sql);
    for param in stmt.params {
        q = param.bind(q);
    }
    q.execute(&mut *tx).await.map_err(Error::from).api_err()?;

    // Re-select the affected rows within the same transaction to run
    // WITH CHECK against the post-image and, when requested, echo them.
    let select_stmt = builder::select(&table, &columns, &query, None).map_err(ApiError::from)?;
    let mut sq = sqlx::query(&select_stmt.sql);
    for param in select_stmt.params {
        sq = param.bind(sq);
    }
    let rows = sq.fetch_all(&mut *tx).await.map_err(Error::from).api_err()?;
    let scanned: Vec<_> = rows.iter().map(|r| scan_row(r, &columns)).collect();

    for row in &scanned {
        state
            .rls
            .check_row(&table, Command::Update, &principal, &columns, row)
            .await
            .api_err()?;
    }

    tx.commit().await.map_err(Error::from).api_err()?;

    if prefer.return_ == Return::Representation {
        let body: Vec<serde_json::Value> = scanned.into_iter().map(|r| r.into_json()).collect();
        Ok(Json(body).into_response())
    } else {
        Ok(StatusCode::NO_CONTENT.into_response())
    }
}

pub async fn delete(
    State(state): State<AppState>,
    Path(table): Path<String>,
    RawQuery(raw_query): RawQuery,
    headers: HeaderMap,
    axum::Extension(principal): axum::Extension<Principal>,
) -> Response {
    match delete_inner(state, table, raw_query, headers, principal).await {
        Ok(resp) => resp,
        Err(e) => e.into_response(),
    }
}

async fn delete_inner(
    state: AppState,
    table: String,
    raw_query: Option<String>,
    headers: HeaderMap,
    principal: Principal,
) -> Result<Response, ApiError> {
    let columns = table_columns(&state, &table).await?;
    let query = parse_query(raw_query.as_deref())?;
    let prefer = Prefer::parse(headers.get("prefer").and_then(|v| v.to_str().ok()));

    if query.filters.is_empty() {
        return Err(ApiError::from(Error::Validation(
            "DELETE requires at least one filter".into(),
        )));
    }

    let extra_where = enforce(&state, &table, Command::Delete, &principal, &columns).await?;

    let representation = if prefer.return_ == Return::Representation {
        let select_stmt = builder::select(&table, &columns, &query, borrow_extra_where(&extra_where)).map_err(ApiError::from)?;
        let mut sq = sqlx::query(&select_stmt.sql);
        for param in select_stmt.params {
            sq = param.bind(sq);
        }
        let rows = sq.fetch_all(state.db.pool()).await.map_err(Error::from).api_err()?;
        Some(rows.iter().map(|r| scan_row(r, &columns).into_json()).collect::<Vec<_>>())
    } else {
        None
    };

    let stmt = builder::delete(&table, &columns, &query, borrow_extra_where(&extra_where)).map_err(ApiError::from)?;
    let mut q = sqlx::query(&stmt.sql);
    for param in stmt.params {
        q = param.bind(q);
    }
    q.execute(state.db.pool()).await.map_err(Error::from).api_err()?;

    match representation {
        Some(body) => Ok(Json(body).into_response()),
        None => Ok(StatusCode::NO_CONTENT.into_response()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::AuthCore;
    use crate::config::Config;
    use crate::jwt::JwtConfig;
    use crate::oauth::OAuthFlow;
    use crate::rls::RlsEngine;
    use crate::types::ColumnMeta;
    use sqlx::Executor;
    use std::collections::HashMap;
    use std::sync::Arc;

    async fn test_state() -> AppState {
        let db = crate::db::Database::open(":memory:").await.unwrap();
        db.pool()
            .execute("CREATE TABLE widgets (id TEXT PRIMARY KEY, name TEXT NOT NULL, qty INTEGER)")
            .await
            .unwrap();

        let columns = [
            ColumnMeta {
                table_name: "widgets".into(),
                column_name: "id".into(),
                pg_type: PgType::Uuid,
                is_nullable: false,
                default_value: None,
                is_primary: true,
            },
            ColumnMeta {
                table_name: "widgets".into(),
                column_name: "name".into(),
                pg_type: PgType::Text,
                is_nullable: false,
                default_value: None,
                is_primary: false,
            },
            ColumnMeta {
                table_name: "widgets".into(),
                column_name: "qty".into(),
                pg_type: PgType::Integer,
                is_nullable: true,
                default_value: None,
                is_primary: false,
            },
        ];
        for col in &columns {
            db.columns().register(col).await.unwrap();
        }

        let jwt = JwtConfig::new(b"test-secret-at-least-32-bytes-long!", "sblite-test");
        let auth = AuthCore::new(db.clone(), jwt);
        let rls = RlsEngine::new(db.clone());
        let config = Arc::new(Config {
            jwt_secret: b"test-secret-at-least-32-bytes-long!".to_vec(),
            db_path: ":memory:".into(),
            host: "0.0.0.0".into(),
            port: 0,
            site_url: None,
            mail_mode: crate::config::MailMode::Log,
            mail_from: "noreply@localhost".into(),
            smtp: None,
            oauth_providers: HashMap::new(),
            oauth_redirect_urls: Vec::new(),
        });
        let oauth = Arc::new(OAuthFlow::new(db.clone(), auth.clone(), config.clone(), HashMap::new()));
        let mailer = crate::mail::build_mailer(&config, db.clone());

        AppState {
            db,
            auth,
            rls,
            oauth,
            mailer,
            config,
            rate_limit: Arc::new(crate::rate_limit::RateLimitConfig::new()),
        }
    }

    #[tokio::test]
    async fn insert_rejects_mistyped_column() {
        let state = test_state().await;
        let headers = HeaderMap::new();
        let body = Bytes::from(r#"{"id": "11111111-1111-1111-1111-111111111111", "name": "gear", "qty": "not-a-number"}"#);

        let err = insert_inner(state, "widgets".into(), headers, Principal::service_role(), body)
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn insert_accepts_well_typed_row() {
        let state = test_state().await;
        let headers = HeaderMap::new();
        let body = Bytes::from(r#"{"id": "11111111-1111-1111-1111-111111111111", "name": "gear", "qty": 3}"#);

        let resp = insert_inner(state, "widgets".into(), headers, Principal::service_role(), body)
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::CREATED);
    }

    #[tokio::test]
    async fn delete_without_filter_is_rejected() {
        let state = test_state().await;
        let headers = HeaderMap::new();

        let err = delete_inner(state, "widgets".into(), None, headers, Principal::service_role())
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn select_against_unknown_table_is_not_found() {
        let state = test_state().await;
        let headers = HeaderMap::new();

        let err = select_inner(state, "no_such_table".into(), None, headers, Principal::service_role())
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }
}

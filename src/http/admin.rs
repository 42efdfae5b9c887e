//! `/admin/v1/*` handlers (§4.12): table DDL management over the Type
//! Catalog, plus the supplemented user listing. `service_role` only.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use sqlx::Executor;
use std::sync::LazyLock;

use crate::error::Error;
use crate::http::error::{ApiError, ResultExt};
use crate::pipeline::state::AppState;
use crate::rls::Principal;
use crate::types::{ColumnMeta, PgType};

static IDENT_RE: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r"^[a-zA-Z_][a-zA-Z0-9_]*$").unwrap());

fn check_ident(name: &str) -> Result<(), ApiError> {
    if IDENT_RE.is_match(name) {
        Ok(())
    } else {
        Err(ApiError::from(Error::Validation(format!(
            "invalid identifier: {name}"
        ))))
    }
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn require_service_role(principal: &Principal) -> Result<(), ApiError> {
    if principal.is_service_role() {
        Ok(())
    } else {
        Err(ApiError::from(Error::Authentication))
    }
}

#[derive(Deserialize)]
pub struct ColumnDef {
    name: String,
    #[serde(rename = "type")]
    pg_type: String,
    nullable: Option<bool>,
    default: Option<String>,
    primary: Option<bool>,
}

#[derive(Deserialize)]
pub struct CreateTableRequest {
    name: String,
    columns: Vec<ColumnDef>,
}

#[derive(Serialize)]
pub struct TableDescription {
    name: String,
    columns: Vec<ColumnMeta>,
}

fn build_create_table_sql(table: &str, defs: &[ColumnDef]) -> Result<(String, Vec<ColumnMeta>), ApiError> {
    check_ident(table)?;
    if defs.is_empty() {
        return Err(ApiError::from(Error::Validation(
            "a table needs at least one column".into(),
        )));
    }

    let mut lines = Vec::with_capacity(defs.len());
    let mut primary_keys = Vec::new();
    let mut metas = Vec::with_capacity(defs.len());

    for def in defs {
        check_ident(&def.name)?;
        let pg_type = PgType::parse(&def.pg_type)
            .ok_or_else(|| ApiError::from(Error::Validation(format!("unknown column type: {}", def.pg_type))))?;
        let is_nullable = def.nullable.unwrap_or(true);
        let is_primary = def.primary.unwrap_or(false);

        let mut line = format!("{} {}", quote_ident(&def.name), pg_type.storage_class());
        if !is_nullable {
            line.push_str(" NOT NULL");
        }
        if let Some(default) = &def.default {
            line.push_str(&format!(
                " DEFAULT {}",
                crate::types::translate_default_for_engine(default)
            ));
        }
        if pg_type == PgType::Jsonb {
            line.push_str(&format!(" CHECK (json_valid({}))", quote_ident(&def.name)));
        }
        lines.push(line);
        if is_primary {
            primary_keys.push(quote_ident(&def.name));
        }

        metas.push(ColumnMeta {
            table_name: table.to_string(),
            column_name: def.name.clone(),
            pg_type,
            is_nullable,
            default_value: def.default.clone(),
            is_primary,
        });
    }

    if !primary_keys.is_empty() {
        lines.push(format!("PRIMARY KEY ({})", primary_keys.join(", ")));
    }

    let sql = format!("CREATE TABLE {} (\n  {}\n)", quote_ident(table), lines.join(",\n  "));
    Ok((sql, metas))
}

pub async fn create_table(
    State(state): State<AppState>,
    axum::Extension(principal): axum::Extension<Principal>,
    Json(body): Json<CreateTableRequest>,
) -> Response {
    match create_table_inner(state, principal, body).await {
        Ok(resp) => resp,
        Err(e) => e.into_response(),
    }
}

async fn create_table_inner(
    state: AppState,
    principal: Principal,
    body: CreateTableRequest,
) -> Result<Response, ApiError> {
    require_service_role(&principal)?;
    let (sql, metas) = build_create_table_sql(&body.name, &body.columns)?;

    let mut tx = state.db.begin().await.map_err(Error::from).api_err()?;
    (&mut *tx).execute(sql.as_str()).await.map_err(Error::from).api_err()?;
    for meta in &metas {
        state.db.columns().register_tx(&mut tx, meta).await.map_err(Error::from).api_err()?;
    }
    tx.commit().await.map_err(Error::from).api_err()?;

    Ok((
        StatusCode::CREATED,
        Json(TableDescription { name: body.name, columns: metas }),
    )
        .into_response())
}

pub async fn list_tables(
    State(state): State<AppState>,
    axum::Extension(principal): axum::Extension<Principal>,
) -> Response {
    match list_tables_inner(state, principal).await {
        Ok(resp) => resp,
        Err(e) => e.into_response(),
    }
}

async fn list_tables_inner(state: AppState, principal: Principal) -> Result<Response, ApiError> {
    require_service_role(&principal)?;
    let names = state.db.columns().list_tables().await.map_err(Error::from).api_err()?;

    let mut tables = Vec::with_capacity(names.len());
    for name in names {
        let columns = state.db.columns().columns_for_table(&name).await.map_err(Error::from).api_err()?;
        tables.push(TableDescription { name, columns });
    }
    Ok(Json(tables).into_response())
}

pub async fn get_table(
    State(state): State<AppState>,
    axum::Extension(principal): axum::Extension<Principal>,
    Path(name): Path<String>,
) -> Response {
    match get_table_inner(state, principal, name).await {
        Ok(resp) => resp,
        Err(e) => e.into_response(),
    }
}

async fn get_table_inner(state: AppState, principal: Principal, name: String) -> Result<Response, ApiError> {
    require_service_role(&principal)?;
    let columns = state.db.columns().columns_for_table(&name).await.map_err(Error::from).api_err()?;
    if columns.is_empty() {
        return Err(ApiError::from(Error::NotFound(format!("unknown table: {name}"))));
    }
    Ok(Json(TableDescription { name, columns }).into_response())
}

pub async fn drop_table(
    State(state): State<AppState>,
    axum::Extension(principal): axum::Extension<Principal>,
    Path(name): Path<String>,
) -> Response {
    match drop_table_inner(state, principal, name).await {
        Ok(_) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => e.into_response(),
    }
}

async fn drop_table_inner(state: AppState, principal: Principal, name: String) -> Result<(), ApiError> {
    require_service_role(&principal)?;
    check_ident(&name)?;

    let columns = state.db.columns().columns_for_table(&name).await.map_err(Error::from).api_err()?;
    if columns.is_empty() {
        return Err(ApiError::from(Error::NotFound(format!("unknown table: {name}"))));
    }

    let mut tx = state.db.begin().await.map_err(Error::from).api_err()?;
    let sql = format!("DROP TABLE {}", quote_ident(&name));
    (&mut *tx).execute(sql.as_str()).await.map_err(Error::from).api_err()?;
    state.db.columns().drop_table_tx(&mut tx, &name).await.map_err(Error::from).api_err()?;
    tx.commit().await.map_err(Error::from).api_err()?;
    Ok(())
}

pub async fn list_users(
    State(state): State<AppState>,
    axum::Extension(principal): axum::Extension<Principal>,
) -> Response {
    match list_users_inner(state, principal).await {
        Ok(resp) => resp,
        Err(e) => e.into_response(),
    }
}

async fn list_users_inner(state: AppState, principal: Principal) -> Result<Response, ApiError> {
    require_service_role(&principal)?;
    let users = state.db.users().list().await.map_err(Error::from).api_err()?;
    Ok(Json(users).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn col(name: &str, ty: &str, nullable: bool, primary: bool) -> ColumnDef {
        ColumnDef {
            name: name.to_string(),
            pg_type: ty.to_string(),
            nullable: Some(nullable),
            default: None,
            primary: Some(primary),
        }
    }

    #[test]
    fn rejects_bad_table_identifier() {
        let defs = vec![col("id", "uuid", false, true)];
        assert!(build_create_table_sql("bad name", &defs).is_err());
    }

    #[test]
    fn builds_primary_key_clause() {
        let defs = vec![col("id", "uuid", false, true), col("note", "text", true, false)];
        let (sql, metas) = build_create_table_sql("widgets", &defs).unwrap();
        assert!(sql.contains("PRIMARY KEY (\"id\")"));
        assert!(sql.contains("\"note\" TEXT"));
        assert_eq!(metas.len(), 2);
    }

    #[test]
    fn rejects_unknown_column_type() {
        let defs = vec![col("id", "not-a-type", false, true)];
        assert!(build_create_table_sql("widgets", &defs).is_err());
    }

    #[test]
    fn jsonb_columns_get_a_json_valid_check() {
        let defs = vec![col("id", "uuid", false, true), col("data", "jsonb", true, false)];
        let (sql, _) = build_create_table_sql("widgets", &defs).unwrap();
        assert!(sql.contains("CHECK (json_valid(\"data\"))"));
    }
}

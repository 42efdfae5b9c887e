//! RLS enforcement (§4.6): decides whether a table/command/principal
//! combination bypasses, is predicate-gated, or is denied outright, and
//! compiles the matching policies into a conjoinable SQL fragment.

use super::cache::PolicyCache;
use super::expr;
use super::principal::Principal;
use crate::db::{Database, RlsPolicy};
use crate::error::{Error, Result};
use crate::query::builder::Param;
use crate::query::row::Row;
use crate::types::PgType;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Select,
    Insert,
    Update,
    Delete,
}

impl Command {
    fn as_str(&self) -> &'static str {
        match self {
            Command::Select => "SELECT",
            Command::Insert => "INSERT",
            Command::Update => "UPDATE",
            Command::Delete => "DELETE",
        }
    }
}

pub enum Enforcement {
    /// No predicate needed: RLS disabled for this table, or the principal
    /// is `service_role`.
    Bypass,
    /// Conjoin this predicate (SQL fragment + its params) with the caller's
    /// own filters.
    Predicate(String, Vec<Param>),
    /// RLS enabled, but no policy matches this command/role — deny all.
    Deny,
}

#[derive(Clone)]
pub struct RlsEngine {
    db: Database,
    cache: PolicyCache,
}

impl RlsEngine {
    pub fn new(db: Database) -> Self {
        Self { db, cache: PolicyCache::new() }
    }

    pub fn cache(&self) -> &PolicyCache {
        &self.cache
    }

    pub async fn set_enabled(&self, table: &str, enabled: bool) -> Result<()> {
        self.db.rls().set_enabled(table, enabled).await?;
        self.cache.invalidate_all();
        Ok(())
    }

    pub async fn upsert_policy(&self, policy: &RlsPolicy) -> Result<()> {
        self.db.rls().upsert_policy(policy).await?;
        self.cache.invalidate_all();
        Ok(())
    }

    async fn policies_for(&self, table: &str) -> Result<Vec<RlsPolicy>> {
        if let Some(cached) = self.cache.get(table) {
            return Ok(cached);
        }
        let policies = self.db.rls().policies_for_table(table).await?;
        self.cache.put(table, policies.clone());
        Ok(policies)
    }

    fn matches(policy: &RlsPolicy, command: Command, principal: &Principal) -> bool {
        let command_matches = policy.command.eq_ignore_ascii_case(command.as_str())
            || policy.command.eq_ignore_ascii_case("ALL");
        let role_matches = match &policy.roles {
            None => true,
            Some(roles) => roles.iter().any(|r| r == principal.role_str()),
        };
        command_matches && role_matches
    }

    /// Step 1–4 of §4.6: bypass, deny, or a conjoinable predicate for reads
    /// and UPDATE/DELETE filtering.
    pub async fn enforce(
        &self,
        table: &str,
        command: Command,
        principal: &Principal,
        columns: &HashMap<String, PgType>,
    ) -> Result<Enforcement> {
        if principal.is_service_role() {
            return Ok(Enforcement::Bypass);
        }
        if !self.db.rls().is_enabled(table).await? {
            return Ok(Enforcement::Bypass);
        }

        let policies = self.policies_for(table).await?;
        let matching: Vec<&RlsPolicy> = policies
            .iter()
            .filter(|p| Self::matches(p, command, principal) && p.using_expr.is_some())
            .collect();

        if matching.is_empty() {
            return Ok(Enforcement::Deny);
        }

        let mut clauses = Vec::new();
        let mut params = Vec::new();
        for policy in matching {
            let using_expr = policy.using_expr.as_deref().unwrap();
            let compiled = expr::compile(using_expr, columns, principal)?;
            clauses.push(compiled.sql);
            params.extend(compiled.params);
        }

        Ok(Enforcement::Predicate(clauses.join(" OR "), params))
    }

    /// Step 5 of §4.6: after an INSERT/UPDATE, evaluate the matching
    /// `check_expr`s (OR-combined, mirroring `using_expr`'s permissive
    /// semantics) against the resulting row. No matching check policy means
    /// no additional constraint.
    pub async fn check_row(
        &self,
        table: &str,
        command: Command,
        principal: &Principal,
        columns: &HashMap<String, PgType>,
        row: &Row,
    ) -> Result<()> {
        if principal.is_service_role() {
            return Ok(());
        }
        if !self.db.rls().is_enabled(table).await? {
            return Ok(());
        }

        let policies = self.policies_for(table).await?;
        let checks: Vec<&RlsPolicy> = policies
            .iter()
            .filter(|p| Self::matches(p, command, principal) && p.check_expr.is_some())
            .collect();

        if checks.is_empty() {
            return Ok(());
        }

        let mut compiled_clauses = Vec::new();
        let mut expr_params = Vec::new();
        for policy in checks {
            let check_expr = policy.check_expr.as_deref().unwrap();
            let compiled = expr::compile(check_expr, columns, principal)?;
            compiled_clauses.push(compiled.sql);
            expr_params.extend(compiled.params);
        }
        let predicate = compiled_clauses.join(" OR ");

        let mut row_cols: Vec<&String> = row.0.keys().collect();
        row_cols.sort();
        let select_list = row_cols
            .iter()
            .map(|c| format!("? AS \"{}\"", c.replace('"', "\"\"")))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!("SELECT CASE WHEN ({predicate}) THEN 1 ELSE 0 END AS ok FROM (SELECT {select_list})");

        let mut query = sqlx::query_scalar::<_, i64>(&sql);
        for col in &row_cols {
            query = bind_row_value(query, row.0.get(*col).unwrap());
        }
        for param in expr_params {
            query = bind_param(query, param);
        }

        let ok: i64 = query.fetch_one(self.db.pool()).await?;
        if ok == 0 {
            return Err(Error::RlsDenied);
        }
        Ok(())
    }
}

fn bind_row_value<'q>(
    query: sqlx::query::QueryScalar<'q, sqlx::Sqlite, i64, sqlx::sqlite::SqliteArguments<'q>>,
    value: &'q crate::query::row::Value,
) -> sqlx::query::QueryScalar<'q, sqlx::Sqlite, i64, sqlx::sqlite::SqliteArguments<'q>> {
    use crate::query::row::Value;
    match value {
        Value::Null => query.bind(None::<String>),
        Value::Bool(b) => query.bind(*b as i64),
        Value::Int(i) => query.bind(*i),
        Value::Float(f) => query.bind(*f),
        Value::Text(s) => query.bind(s),
        Value::Bytes(b) => query.bind(b),
        Value::Json(v) => query.bind(v.to_string()),
    }
}

fn bind_param<'q>(
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

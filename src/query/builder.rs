//! Safe parameterized SQL builder. Identifiers are double-quoted only after
//! allow-list validation against the Type Catalog; values are never
//! interpolated. Produces the four statement shapes from §4.5.

use super::{FilterOp, ParsedQuery, SortDirection};
use crate::error::{Error, Result};
use crate::types::PgType;
use std::collections::HashMap;

/// A value already translated into its SQLite storage representation,
/// ready to bind positionally.
#[derive(Debug, Clone)]
pub enum Param {
    Null,
    Int(i64),
    Float(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl Param {
    pub fn bind<'q>(
        self,
        query: sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>>,
    ) -> sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>>
    where
        Self: 'q,
    {
        match self {
            Param::Null => query.bind(None::<String>),
            Param::Int(i) => query.bind(i),
            Param::Float(f) => query.bind(f),
            Param::Text(s) => query.bind(s),
            Param::Blob(b) => query.bind(b),
        }
    }

    /// A raw filter-value string from the query grammar, translated per the
    /// column's declared type (filters arrive as strings regardless of the
    /// underlying column type: `price=gte.10`, `active=eq.true`).
    pub fn from_filter_value(pg_type: PgType, raw: &str) -> Result<Param> {
        Ok(match pg_type {
            PgType::Integer => Param::Int(
                raw.parse()
                    .map_err(|_| Error::Validation(format!("invalid integer filter value: {raw}")))?,
            ),
            PgType::Numeric => Param::Float(
                raw.parse()
                    .map_err(|_| Error::Validation(format!("invalid numeric filter value: {raw}")))?,
            ),
            PgType::Boolean => Param::Int(match raw {
                "true" | "1" => 1,
                "false" | "0" => 0,
                other => {
                    return Err(Error::Validation(format!("invalid boolean filter value: {other}")));
                }
            }),
            _ => Param::Text(raw.to_string()),
        })
    }

    /// A JSON body value, translated per the column's declared type. Assumes
    /// the value already passed `types::validate`.
    pub fn from_json_value(pg_type: PgType, value: &serde_json::Value) -> Result<Param> {
        if value.is_null() {
            return Ok(Param::Null);
        }
        Ok(match pg_type {
            PgType::Integer => Param::Int(value.as_i64().unwrap_or_default()),
            PgType::Numeric => match value.as_f64() {
                Some(f) => Param::Float(f),
                None => Param::Text(value.as_str().unwrap_or_default().to_string()),
            },
            PgType::Boolean => Param::Int(match value {
                serde_json::Value::Bool(b) => *b as i64,
                serde_json::Value::Number(n) => n.as_i64().unwrap_or(0),
                _ => 0,
            }),
            PgType::Jsonb => Param::Text(
                value
                    .as_str()
                    .map(str::to_string)
                    .unwrap_or_else(|| value.to_string()),
            ),
            PgType::Bytea => {
                use base64::Engine;
                let s = value.as_str().unwrap_or_default();
                Param::Blob(
                    base64::engine::general_purpose::STANDARD
                        .decode(s)
                        .map_err(|_| Error::Validation("invalid base64 in bytea column".into()))?,
                )
            }
            PgType::Uuid | PgType::Text | PgType::Timestamptz => {
                Param::Text(value.as_str().unwrap_or_default().to_string())
            }
        })
    }
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn check_column(columns: &HashMap<String, PgType>, name: &str) -> Result<()> {
    if columns.contains_key(name) {
        Ok(())
    } else {
        Err(Error::UnknownColumn(name.to_string()))
    }
}

/// Render the filter list as a conjunction, returning the WHERE fragment
/// (without the `WHERE` keyword) and its bound params in order.
fn render_filters(
    filters: &[super::Filter],
    columns: &HashMap<String, PgType>,
) -> Result<(Vec<String>, Vec<Param>)> {
    let mut clauses = Vec::new();
    let mut params = Vec::new();

    for filter in filters {
        check_column(columns, &filter.column)?;
        let pg_type = columns[&filter.column];
        let ident = quote_ident(&filter.column);

        match filter.op {
            FilterOp::IsNull => clauses.push(format!("{ident} IS NULL")),
            FilterOp::IsNotNull => clauses.push(format!("{ident} IS NOT NULL")),
            op => {
                clauses.push(format!("{ident} {} ?", op.sql_operator()));
                params.push(Param::from_filter_value(pg_type, &filter.value)?);
            }
        }
    }

    Ok((clauses, params))
}

pub struct SelectStatement {
    pub sql: String,
    pub params: Vec<Param>,
}

/// `extra_where` is the RLS-compiled predicate (SQL fragment plus its own
/// params), conjoined with the caller's filters.
pub fn select(
    table: &str,
    columns: &HashMap<String, PgType>,
    query: &ParsedQuery,
    extra_where: Option<(&str, Vec<Param>)>,
) -> Result<SelectStatement> {
    let select_list = if query.select == ["*"] {
        "*".to_string()
    } else {
        for col in &query.select {
            check_column(columns, col)?;
        }
        query
            .select
            .iter()
            .map(|c| quote_ident(c))
            .collect::<Vec<_>>()
            .join(", ")
    };

    let (mut clauses, mut params) = render_filters(&query.filters, columns)?;
    if let Some((extra_sql, extra_params)) = extra_where {
        clauses.push(format!("({extra_sql})"));
        params.extend(extra_params);
    }

    let mut sql = format!("SELECT {select_list} FROM {}", quote_ident(table));
    if !clauses.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&clauses.join(" AND "));
    }

    if !query.order.is_empty() {
        let mut order_parts = Vec::new();
        for spec in &query.order {
            check_column(columns, &spec.column)?;
            let dir = match spec.direction {
                SortDirection::Asc => "ASC",
                SortDirection::Desc => "DESC",
            };
            order_parts.push(format!("{} {dir}", quote_ident(&spec.column)));
        }
        sql.push_str(" ORDER BY ");
        sql.push_str(&order_parts.join(", "));
    }

    if let Some(limit) = query.limit {
        sql.push_str(&format!(" LIMIT {limit}"));
    }
    if let Some(offset) = query.offset {
        sql.push_str(&format!(" OFFSET {offset}"));
    }

    Ok(SelectStatement { sql, params })
}

pub fn count(
    table: &str,
    columns: &HashMap<String, PgType>,
    query: &ParsedQuery,
    extra_where: Option<(&str, Vec<Param>)>,
) -> Result<SelectStatement> {
    let (mut clauses, mut params) = render_filters(&query.filters, columns)?;
    if let Some((extra_sql, extra_params)) = extra_where {
        clauses.push(format!("({extra_sql})"));
        params.extend(extra_params);
    }

    let mut sql = format!("SELECT COUNT(*) FROM {}", quote_ident(table));
    if !clauses.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&clauses.join(" AND "));
    }

    Ok(SelectStatement { sql, params })
}

pub struct InsertStatement {
    pub sql: String,
    pub params: Vec<Param>,
    pub columns: Vec<String>,
}

/// Bulk inserts share one statement: `INSERT INTO t (cols) VALUES (?,…),(?,…)`.
pub fn insert(
    table: &str,
    columns: &HashMap<String, PgType>,
    rows: &[serde_json::Map<String, serde_json::Value>],
) -> Result<InsertStatement> {
    if rows.is_empty() {
        return Err(Error::Validation("insert requires at least one row".into()));
    }

    let mut col_order: Vec<String> = rows[0].keys().cloned().collect();
    col_order.sort();
    for col in &col_order {
        check_column(columns, col)?;
    }

    let mut params = Vec::new();
    let mut value_groups = Vec::new();

    for row in rows {
        let mut placeholders = Vec::new();
        for col in &col_order {
            let value = row.get(col).cloned().unwrap_or(serde_json::Value::Null);
            params.push(Param::from_json_value(columns[col], &value)?);
            placeholders.push("?".to_string());
        }
        value_groups.push(format!("({})", placeholders.join(", ")));
    }

    let col_list = col_order
        .iter()
        .map(|c| quote_ident(c))
        .collect::<Vec<_>>()
        .join(", ");

    let sql = format!(
        "INSERT INTO {} ({col_list}) VALUES {}",
        quote_ident(table),
        value_groups.join(", ")
    );

    Ok(InsertStatement {
        sql,
        params,
        columns: col_order,
    })
}

pub struct UpdateStatement {
    pub sql: String,
    pub params: Vec<Param>,
}

pub fn update(
    table: &str,
    columns: &HashMap<String, PgType>,
    set: &serde_json::Map<String, serde_json::Value>,
    query: &ParsedQuery,
    extra_where: Option<(&str, Vec<Param>)>,
) -> Result<UpdateStatement> {
    if set.is_empty() {
        return Err(Error::Validation("update requires at least one column".into()));
    }

    let mut set_order: Vec<String> = set.keys().cloned().collect();
    set_order.sort();
    for col in &set_order {
        check_column(columns, col)?;
    }

    let mut params = Vec::new();
    let mut set_parts = Vec::new();
    for col in &set_order {
        params.push(Param::from_json_value(columns[col], &set[col])?);
        set_parts.push(format!("{} = ?", quote_ident(col)));
    }
    let set_clause = set_parts.join(", ");

    let (mut clauses, filter_params) = render_filters(&query.filters, columns)?;
    if let Some((extra_sql, extra_params)) = extra_where {
        clauses.push(format!("({extra_sql})"));
        params.extend(extra_params);
    }
    params.extend(filter_params);

    let sql = finish_update(table, &set_clause, &clauses);
    Ok(UpdateStatement { sql, params })
}

fn finish_update(table: &str, set_clause: &str, clauses: &[String]) -> String {
    let mut sql = format!("UPDATE {} SET {set_clause}", quote_ident(table));
    if !clauses.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&clauses.join(" AND "));
    }
    sql
}

pub struct DeleteStatement {
    pub sql: String,
    pub params: Vec<Param>,
}

/// Rejecting a filterless delete is the handler's responsibility (§4.5); the
/// builder itself will happily build `DELETE FROM t` if asked.
pub fn delete(
    table: &str,
    columns: &HashMap<String, PgType>,
    query: &ParsedQuery,
    extra_where: Option<(&str, Vec<Param>)>,
) -> Result<DeleteStatement> {
    let (mut clauses, mut params) = render_filters(&query.filters, columns)?;
    if let Some((extra_sql, extra_params)) = extra_where {
        clauses.push(format!("({extra_sql})"));
        params.extend(extra_params);
    }

    let mut sql = format!("DELETE FROM {}", quote_ident(table));
    if !clauses.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&clauses.join(" AND "));
    }

    Ok(DeleteStatement { sql, params })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{Filter, FilterOp};

    fn cols() -> HashMap<String, PgType> {
        let mut m = HashMap::new();
        m.insert("id".to_string(), PgType::Uuid);
        m.insert("price".to_string(), PgType::Numeric);
        m.insert("active".to_string(), PgType::Boolean);
        m
    }

    #[test]
    fn select_rejects_unknown_column() {
        let query = ParsedQuery {
            select: vec!["bogus".to_string()],
            ..Default::default()
        };
        assert!(matches!(select("t", &cols(), &query, None), Err(Error::UnknownColumn(_))));
    }

    #[test]
    fn is_null_filter_has_no_param() {
        let query = ParsedQuery {
            filters: vec![Filter {
                column: "price".to_string(),
                op: FilterOp::IsNull,
                value: String::new(),
            }],
            ..Default::default()
        };
        let stmt = select("t", &cols(), &query, None).unwrap();
        assert!(stmt.sql.contains("IS NULL"));
        assert!(stmt.params.is_empty());
    }

    #[test]
    fn delete_without_filter_still_builds_but_handler_must_reject() {
        let query = ParsedQuery::default();
        let stmt = delete("t", &cols(), &query, None).unwrap();
        assert_eq!(stmt.sql, "DELETE FROM \"t\"");
    }

    #[test]
    fn insert_builds_bulk_values() {
        let mut row1 = serde_json::Map::new();
        row1.insert("id".into(), serde_json::json!("550e8400-e29b-41d4-a716-446655440000"));
        row1.insert("price".into(), serde_json::json!(1.5));
        let mut row2 = row1.clone();
        row2.insert("price".into(), serde_json::json!(2.5));

        let stmt = insert("products", &cols(), &[row1, row2]).unwrap();
        assert!(stmt.sql.contains("VALUES (?, ?), (?, ?)"));
        assert_eq!(stmt.params.len(), 4);
    }
}

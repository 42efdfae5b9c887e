//! A semantic `Row` wrapping a mapping from column name to a tagged value,
//! per the design note on avoiding untyped runtime maps at API boundaries.

use crate::types::PgType;
use sqlx::{Column, Row as _, TypeInfo, ValueRef};
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    Json(serde_json::Value),
}

impl Value {
    pub fn into_json(self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(b),
            Value::Int(i) => serde_json::Value::Number(i.into()),
            Value::Float(f) => serde_json::Number::from_f64(f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::Text(s) => serde_json::Value::String(s),
            Value::Bytes(b) => {
                use base64::Engine;
                serde_json::Value::String(base64::engine::general_purpose::STANDARD.encode(b))
            }
            Value::Json(v) => v,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Row(pub BTreeMap<String, Value>);

impl Row {
    pub fn into_json(self) -> serde_json::Value {
        serde_json::Value::Object(
            self.0
                .into_iter()
                .map(|(k, v)| (k, v.into_json()))
                .collect(),
        )
    }
}

/// Scan a `sqlx::sqlite::SqliteRow` into a `Row`, mapping SQLite's dynamic
/// storage classes onto the tagged `Value`. The catalog's jsonb columns are
/// distinguished by a trailing `CHECK (json_valid(...))`; the column's
/// declared `pg_type` (when known) decides whether text is re-parsed as
/// JSON and whether an INTEGER-affinity value is a boolean, leaving
/// untyped ad-hoc tables to fall back on raw SQLite affinity.
pub fn scan_row(row: &sqlx::sqlite::SqliteRow, columns: &HashMap<String, PgType>) -> Row {
    let mut out = BTreeMap::new();

    for column in row.columns() {
        let name = column.name().to_string();
        let pg_type = columns.get(&name).copied();
        let raw = row.try_get_raw(column.ordinal());
        let value = match raw {
            Ok(raw) if raw.is_null() => Value::Null,
            Ok(_) => match column.type_info().name() {
                "INTEGER" | "BIGINT" => {
                    let n = row.try_get::<i64, _>(column.ordinal()).unwrap_or_default();
                    if pg_type == Some(PgType::Boolean) {
                        Value::Bool(n != 0)
                    } else {
                        Value::Int(n)
                    }
                }
                "REAL" | "FLOAT" | "DOUBLE" => row
                    .try_get::<f64, _>(column.ordinal())
                    .map(Value::Float)
                    .unwrap_or(Value::Null),
                "BLOB" => row
                    .try_get::<Vec<u8>, _>(column.ordinal())
                    .map(Value::Bytes)
                    .unwrap_or(Value::Null),
                _ => {
                    let text = row.try_get::<String, _>(column.ordinal()).unwrap_or_default();
                    if pg_type == Some(PgType::Jsonb) {
                        match serde_json::from_str(&text) {
                            Ok(v) => Value::Json(v),
                            Err(_) => Value::Text(text),
                        }
                    } else {
                        Value::Text(text)
                    }
                }
            },
            Err(_) => Value::Null,
        };
        out.insert(name, value);
    }

    Row(out)
}

//! Type Catalog: the `_columns` registry that ascribes PostgreSQL semantic
//! types to columns of the underlying SQLite-family store, validates writes
//! against them, and exports PostgreSQL DDL for migration.

mod ddl;
mod validate;

pub use ddl::export_table_ddl;
pub use validate::validate;

use serde::{Deserialize, Serialize};
use std::fmt;

/// PostgreSQL semantic type a column is declared as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PgType {
    Uuid,
    Text,
    Integer,
    Numeric,
    Boolean,
    Timestamptz,
    Jsonb,
    Bytea,
}

impl PgType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PgType::Uuid => "uuid",
            PgType::Text => "text",
            PgType::Integer => "integer",
            PgType::Numeric => "numeric",
            PgType::Boolean => "boolean",
            PgType::Timestamptz => "timestamptz",
            PgType::Jsonb => "jsonb",
            PgType::Bytea => "bytea",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "uuid" => PgType::Uuid,
            "text" => PgType::Text,
            "integer" => PgType::Integer,
            "numeric" => PgType::Numeric,
            "boolean" => PgType::Boolean,
            "timestamptz" => PgType::Timestamptz,
            "jsonb" => PgType::Jsonb,
            "bytea" => PgType::Bytea,
            _ => return None,
        })
    }

    /// Underlying SQLite storage class used when the core creates a table.
    pub fn storage_class(&self) -> &'static str {
        match self {
            PgType::Integer => "INTEGER",
            PgType::Boolean => "INTEGER",
            PgType::Numeric => "TEXT",
            PgType::Bytea => "BLOB",
            PgType::Uuid | PgType::Text | PgType::Timestamptz | PgType::Jsonb => "TEXT",
        }
    }
}

impl fmt::Display for PgType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Column metadata as registered in the catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnMeta {
    pub table_name: String,
    pub column_name: String,
    pub pg_type: PgType,
    pub is_nullable: bool,
    pub default_value: Option<String>,
    pub is_primary: bool,
}

/// Translates a symbolic default expression between the storage engine and
/// PostgreSQL export. Adding a new symbolic default means adding one arm
/// here and one in `ddl::translate_default_for_export`.
pub fn translate_default_for_engine(default: &str) -> String {
    match default {
        "gen_uuid()" => "(lower(hex(randomblob(4))) || '-' || lower(hex(randomblob(2))) || '-4' || substr(lower(hex(randomblob(2))),2) || '-' || substr('89ab',abs(random()) % 4 + 1, 1) || substr(lower(hex(randomblob(2))),2) || '-' || lower(hex(randomblob(6))))".to_string(),
        "now()" => "(strftime('%Y-%m-%dT%H:%M:%fZ','now'))".to_string(),
        "true" => "1".to_string(),
        "false" => "0".to_string(),
        other => other.to_string(),
    }
}

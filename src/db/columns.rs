use crate::types::{ColumnMeta, PgType};
use sqlx::sqlite::SqlitePool;

#[derive(sqlx::FromRow)]
struct ColumnRow {
    table_name: String,
    column_name: String,
    pg_type: String,
    is_nullable: i64,
    default_value: Option<String>,
    is_primary: i64,
}

impl TryFrom<ColumnRow> for ColumnMeta {
    type Error = String;

    fn try_from(r: ColumnRow) -> Result<Self, Self::Error> {
        let pg_type = PgType::parse(&r.pg_type).ok_or_else(|| format!("unknown pg_type {}", r.pg_type))?;
        Ok(ColumnMeta {
            table_name: r.table_name,
            column_name: r.column_name,
            pg_type,
            is_nullable: r.is_nullable != 0,
            default_value: r.default_value,
            is_primary: r.is_primary != 0,
        })
    }
}

/// Storage for the `_columns` registry. Type validation and DDL rendering
/// live in `crate::types`; this store only persists the catalog rows.
#[derive(Clone)]
pub struct ColumnStore {
    pool: SqlitePool,
}

impl ColumnStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn register(&self, col: &ColumnMeta) -> Result<(), sqlx::Error> {
        self.register_tx(&mut *self.pool.begin().await?, col).await?;
        Ok(())
    }

    pub async fn register_tx(
        &self,
        tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
        col: &ColumnMeta,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO _columns (table_name, column_name, pg_type, is_nullable, default_value, is_primary)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT (table_name, column_name) DO UPDATE SET
               pg_type = excluded.pg_type,
               is_nullable = excluded.is_nullable,
               default_value = excluded.default_value,
               is_primary = excluded.is_primary",
        )
        .bind(&col.table_name)
        .bind(&col.column_name)
        .bind(col.pg_type.as_str())
        .bind(col.is_nullable as i64)
        .bind(&col.default_value)
        .bind(col.is_primary as i64)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    pub async fn columns_for_table(&self, table_name: &str) -> Result<Vec<ColumnMeta>, sqlx::Error> {
        let rows: Vec<ColumnRow> = sqlx::query_as(
            "SELECT table_name, column_name, pg_type, is_nullable, default_value, is_primary
             FROM _columns WHERE table_name = ? ORDER BY rowid",
        )
        .bind(table_name)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().filter_map(|r| r.try_into().ok()).collect())
    }

    pub async fn list_tables(&self) -> Result<Vec<String>, sqlx::Error> {
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT DISTINCT table_name FROM _columns ORDER BY table_name")
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().map(|r| r.0).collect())
    }

    pub async fn drop_table_tx(
        &self,
        tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
        table_name: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM _columns WHERE table_name = ?")
            .bind(table_name)
            .execute(&mut **tx)
            .await?;
        Ok(())
    }
}

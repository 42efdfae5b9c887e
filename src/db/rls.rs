use sqlx::sqlite::SqlitePool;

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct RlsPolicy {
    pub table_name: String,
    pub policy_name: String,
    pub command: String,
    pub using_expr: Option<String>,
    pub check_expr: Option<String>,
    pub roles: Option<Vec<String>>,
}

#[derive(sqlx::FromRow)]
struct RlsPolicyRow {
    table_name: String,
    policy_name: String,
    command: String,
    using_expr: Option<String>,
    check_expr: Option<String>,
    roles: Option<String>,
}

impl From<RlsPolicyRow> for RlsPolicy {
    fn from(r: RlsPolicyRow) -> Self {
        Self {
            table_name: r.table_name,
            policy_name: r.policy_name,
            command: r.command,
            using_expr: r.using_expr,
            check_expr: r.check_expr,
            roles: r.roles.and_then(|s| serde_json::from_str(&s).ok()),
        }
    }
}

/// Storage for the RLS registry: per-table enablement and per-policy
/// predicates. Enforcement lives in `crate::rls`.
#[derive(Clone)]
pub struct RlsStore {
    pool: SqlitePool,
}

impl RlsStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn set_enabled(&self, table_name: &str, enabled: bool) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO rls_tables (table_name, enabled) VALUES (?, ?)
             ON CONFLICT (table_name) DO UPDATE SET enabled = excluded.enabled",
        )
        .bind(table_name)
        .bind(enabled as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn is_enabled(&self, table_name: &str) -> Result<bool, sqlx::Error> {
        let row: Option<(i64,)> = sqlx::query_as("SELECT enabled FROM rls_tables WHERE table_name = ?")
            .bind(table_name)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| r.0 != 0).unwrap_or(false))
    }

    pub async fn upsert_policy(&self, policy: &RlsPolicy) -> Result<(), sqlx::Error> {
        let roles = policy
            .roles
            .as_ref()
            .map(|r| serde_json::to_string(r).unwrap_or_default());
        sqlx::query(
            "INSERT INTO rls_policies (table_name, policy_name, command, using_expr, check_expr, roles)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT (table_name, policy_name) DO UPDATE SET
               command = excluded.command,
               using_expr = excluded.using_expr,
               check_expr = excluded.check_expr,
               roles = excluded.roles",
        )
        .bind(&policy.table_name)
        .bind(&policy.policy_name)
        .bind(&policy.command)
        .bind(&policy.using_expr)
        .bind(&policy.check_expr)
        .bind(roles)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn policies_for_table(&self, table_name: &str) -> Result<Vec<RlsPolicy>, sqlx::Error> {
        let rows: Vec<RlsPolicyRow> = sqlx::query_as(
            "SELECT table_name, policy_name, command, using_expr, check_expr, roles
             FROM rls_policies WHERE table_name = ?",
        )
        .bind(table_name)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(RlsPolicy::from).collect())
    }
}

use sqlx::sqlite::SqlitePool;

#[derive(Debug, Clone, serde::Serialize)]
pub struct Identity {
    pub id: String,
    pub user_id: String,
    pub provider: String,
    pub provider_id: String,
    pub identity_data: serde_json::Value,
    pub last_sign_in_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(sqlx::FromRow)]
struct IdentityRow {
    id: String,
    user_id: String,
    provider: String,
    provider_id: String,
    identity_data: String,
    last_sign_in_at: Option<String>,
    created_at: String,
    updated_at: String,
}

impl From<IdentityRow> for Identity {
    fn from(r: IdentityRow) -> Self {
        Self {
            id: r.id,
            user_id: r.user_id,
            provider: r.provider,
            provider_id: r.provider_id,
            identity_data: serde_json::from_str(&r.identity_data).unwrap_or_default(),
            last_sign_in_at: r.last_sign_in_at,
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

const IDENTITY_COLUMNS: &str =
    "id, user_id, provider, provider_id, identity_data, last_sign_in_at, created_at, updated_at";

#[derive(Clone)]
pub struct IdentityStore {
    pool: SqlitePool,
}

impl IdentityStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(
        &self,
        id: &str,
        user_id: &str,
        provider: &str,
        provider_id: &str,
        identity_data: &serde_json::Value,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO identities (id, user_id, provider, provider_id, identity_data, last_sign_in_at)
             VALUES (?, ?, ?, ?, ?, strftime('%Y-%m-%dT%H:%M:%fZ','now'))",
        )
        .bind(id)
        .bind(user_id)
        .bind(provider)
        .bind(provider_id)
        .bind(identity_data.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_by_provider(
        &self,
        provider: &str,
        provider_id: &str,
    ) -> Result<Option<Identity>, sqlx::Error> {
        let row: Option<IdentityRow> = sqlx::query_as(&format!(
            "SELECT {IDENTITY_COLUMNS} FROM identities WHERE provider = ? AND provider_id = ?"
        ))
        .bind(provider)
        .bind(provider_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Identity::from))
    }

    pub async fn list_for_user(&self, user_id: &str) -> Result<Vec<Identity>, sqlx::Error> {
        let rows: Vec<IdentityRow> = sqlx::query_as(&format!(
            "SELECT {IDENTITY_COLUMNS} FROM identities WHERE user_id = ? ORDER BY created_at"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Identity::from).collect())
    }

    pub async fn touch_last_sign_in(&self, id: &str) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE identities SET last_sign_in_at = strftime('%Y-%m-%dT%H:%M:%fZ','now'), updated_at = strftime('%Y-%m-%dT%H:%M:%fZ','now') WHERE id = ?",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn delete(&self, user_id: &str, provider: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM identities WHERE user_id = ? AND provider = ?")
            .bind(user_id)
            .bind(provider)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn count_for_user(&self, user_id: &str) -> Result<i64, sqlx::Error> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM identities WHERE user_id = ?")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.0)
    }
}

use sqlx::sqlite::SqlitePool;

/// OAuth PKCE flow state, the canonical (persistent, not in-memory) record
/// of an in-flight authorization so the process can restart safely.
#[derive(Debug, Clone)]
pub struct FlowState {
    pub state: String,
    pub provider: String,
    pub code_verifier: String,
    pub redirect_to: String,
    pub created_at: String,
    pub expires_at: String,
}

#[derive(sqlx::FromRow)]
struct FlowStateRow {
    state: String,
    provider: String,
    code_verifier: String,
    redirect_to: String,
    created_at: String,
    expires_at: String,
}

impl From<FlowStateRow> for FlowState {
    fn from(r: FlowStateRow) -> Self {
        Self {
            state: r.state,
            provider: r.provider,
            code_verifier: r.code_verifier,
            redirect_to: r.redirect_to,
            created_at: r.created_at,
            expires_at: r.expires_at,
        }
    }
}

#[derive(Clone)]
pub struct FlowStateStore {
    pool: SqlitePool,
}

impl FlowStateStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(
        &self,
        state: &str,
        provider: &str,
        code_verifier: &str,
        redirect_to: &str,
    ) -> Result<(), sqlx::Error> {
        let expires_at = chrono::Utc::now() + chrono::Duration::minutes(10);
        sqlx::query(
            "INSERT INTO flow_states (state, provider, code_verifier, redirect_to, expires_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(state)
        .bind(provider)
        .bind(code_verifier)
        .bind(redirect_to)
        .bind(expires_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Look up and consume (single-use) a flow state in one step.
    pub async fn take(&self, state: &str) -> Result<Option<FlowState>, sqlx::Error> {
        let row: Option<FlowStateRow> = sqlx::query_as(
            "SELECT state, provider, code_verifier, redirect_to, created_at, expires_at FROM flow_states WHERE state = ?",
        )
        .bind(state)
        .fetch_optional(&self.pool)
        .await?;
        sqlx::query("DELETE FROM flow_states WHERE state = ?")
            .bind(state)
            .execute(&self.pool)
            .await?;
        Ok(row.map(FlowState::from))
    }

    pub async fn delete_expired(&self) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "DELETE FROM flow_states WHERE expires_at < strftime('%Y-%m-%dT%H:%M:%fZ','now')",
        )
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}

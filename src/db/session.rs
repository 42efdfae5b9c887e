use sqlx::sqlite::SqlitePool;

#[derive(Debug, Clone, serde::Serialize)]
pub struct Session {
    pub id: String,
    pub user_id: String,
    pub aal: String,
    pub created_at: String,
    pub not_after: Option<String>,
}

#[derive(sqlx::FromRow)]
struct SessionRow {
    id: String,
    user_id: String,
    aal: String,
    created_at: String,
    not_after: Option<String>,
}

impl From<SessionRow> for Session {
    fn from(r: SessionRow) -> Self {
        Self {
            id: r.id,
            user_id: r.user_id,
            aal: r.aal,
            created_at: r.created_at,
            not_after: r.not_after,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RefreshToken {
    pub token: String,
    pub user_id: String,
    pub session_id: String,
    pub revoked: bool,
    pub created_at: String,
}

#[derive(sqlx::FromRow)]
struct RefreshTokenRow {
    token: String,
    user_id: String,
    session_id: String,
    revoked: i64,
    created_at: String,
}

impl From<RefreshTokenRow> for RefreshToken {
    fn from(r: RefreshTokenRow) -> Self {
        Self {
            token: r.token,
            user_id: r.user_id,
            session_id: r.session_id,
            revoked: r.revoked != 0,
            created_at: r.created_at,
        }
    }
}

#[derive(Clone)]
pub struct SessionStore {
    pool: SqlitePool,
}

impl SessionStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a session plus its first refresh token, atomically.
    pub async fn create(&self, session_id: &str, user_id: &str, token: &str) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("INSERT INTO sessions (id, user_id) VALUES (?, ?)")
            .bind(session_id)
            .bind(user_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("INSERT INTO refresh_tokens (token, user_id, session_id) VALUES (?, ?, ?)")
            .bind(token)
            .bind(user_id)
            .bind(session_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    pub async fn get(&self, id: &str) -> Result<Option<Session>, sqlx::Error> {
        let row: Option<SessionRow> =
            sqlx::query_as("SELECT id, user_id, aal, created_at, not_after FROM sessions WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(Session::from))
    }

    pub async fn delete(&self, id: &str) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM sessions WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn delete_all_for_user(&self, user_id: &str) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM sessions WHERE user_id = ?")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn get_refresh_token(&self, token: &str) -> Result<Option<RefreshToken>, sqlx::Error> {
        let row: Option<RefreshTokenRow> = sqlx::query_as(
            "SELECT token, user_id, session_id, revoked, created_at FROM refresh_tokens WHERE token = ?",
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(RefreshToken::from))
    }

    /// Rotate a refresh token: revoke `old_token` and insert `new_token`
    /// against the same session, in a single transaction so a double-spend
    /// under concurrent refresh can never produce two live successors.
    pub async fn rotate_refresh_token(
        &self,
        old_token: &str,
        new_token: &str,
        user_id: &str,
        session_id: &str,
    ) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        let result = sqlx::query("UPDATE refresh_tokens SET revoked = 1 WHERE token = ? AND revoked = 0")
            .bind(old_token)
            .execute(&mut *tx)
            .await?;
        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Err(sqlx::Error::RowNotFound);
        }
        sqlx::query("INSERT INTO refresh_tokens (token, user_id, session_id) VALUES (?, ?, ?)")
            .bind(new_token)
            .bind(user_id)
            .bind(session_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    pub async fn revoke_refresh_token(&self, token: &str) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE refresh_tokens SET revoked = 1 WHERE token = ?")
            .bind(token)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationTokenType {
    Confirmation,
    Recovery,
    Magiclink,
    EmailChange,
    Invite,
}

impl VerificationTokenType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Confirmation => "confirmation",
            Self::Recovery => "recovery",
            Self::Magiclink => "magiclink",
            Self::EmailChange => "email_change",
            Self::Invite => "invite",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        Some(match s {
            "confirmation" => Self::Confirmation,
            "recovery" => Self::Recovery,
            "magiclink" => Self::Magiclink,
            "email_change" => Self::EmailChange,
            "invite" => Self::Invite,
            _ => return None,
        })
    }

    /// Default TTL per §4.7.
    pub fn default_ttl(&self) -> chrono::Duration {
        match self {
            Self::Confirmation => chrono::Duration::hours(24),
            Self::Recovery => chrono::Duration::hours(1),
            Self::Magiclink => chrono::Duration::hours(1),
            Self::EmailChange => chrono::Duration::hours(24),
            Self::Invite => chrono::Duration::days(7),
        }
    }
}

#[derive(Debug, Clone)]
pub struct VerificationToken {
    pub id: String,
    pub user_id: String,
    pub token_type: VerificationTokenType,
    pub email: String,
    pub expires_at: String,
    pub used_at: Option<String>,
    pub created_at: String,
}

#[derive(sqlx::FromRow)]
struct VerificationTokenRow {
    id: String,
    user_id: String,
    #[sqlx(rename = "type")]
    token_type: String,
    email: String,
    expires_at: String,
    used_at: Option<String>,
    created_at: String,
}

impl From<VerificationTokenRow> for VerificationToken {
    fn from(r: VerificationTokenRow) -> Self {
        Self {
            id: r.id,
            user_id: r.user_id,
            token_type: VerificationTokenType::from_str(&r.token_type)
                .unwrap_or(VerificationTokenType::Recovery),
            email: r.email,
            expires_at: r.expires_at,
            used_at: r.used_at,
            created_at: r.created_at,
        }
    }
}

#[derive(Clone)]
pub struct VerificationTokenStore {
    pool: SqlitePool,
}

impl VerificationTokenStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(
        &self,
        id: &str,
        user_id: &str,
        token_type: VerificationTokenType,
        email: &str,
    ) -> Result<(), sqlx::Error> {
        let expires_at = chrono::Utc::now() + token_type.default_ttl();
        sqlx::query(
            "INSERT INTO verification_tokens (id, user_id, type, email, expires_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(id)
        .bind(user_id)
        .bind(token_type.as_str())
        .bind(email)
        .bind(expires_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get(&self, id: &str) -> Result<Option<VerificationToken>, sqlx::Error> {
        let row: Option<VerificationTokenRow> = sqlx::query_as(
            "SELECT id, user_id, type, email, expires_at, used_at, created_at FROM verification_tokens WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(VerificationToken::from))
    }

    pub async fn mark_used(&self, id: &str) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE verification_tokens SET used_at = strftime('%Y-%m-%dT%H:%M:%fZ','now') WHERE id = ?",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn delete_expired(&self) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "DELETE FROM verification_tokens WHERE expires_at < strftime('%Y-%m-%dT%H:%M:%fZ','now')",
        )
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}

use sqlx::sqlite::SqlitePool;

/// A catch-mode mail artifact.
#[derive(Debug, Clone, serde::Serialize)]
pub struct Email {
    pub id: String,
    pub to_addr: String,
    pub from_addr: String,
    pub subject: String,
    pub body_html: Option<String>,
    pub body_text: Option<String>,
    pub email_type: String,
    pub user_id: Option<String>,
    pub metadata: serde_json::Value,
    pub created_at: String,
}

#[derive(sqlx::FromRow)]
struct EmailRow {
    id: String,
    to_addr: String,
    from_addr: String,
    subject: String,
    body_html: Option<String>,
    body_text: Option<String>,
    #[sqlx(rename = "type")]
    email_type: String,
    user_id: Option<String>,
    metadata: String,
    created_at: String,
}

impl From<EmailRow> for Email {
    fn from(r: EmailRow) -> Self {
        Self {
            id: r.id,
            to_addr: r.to_addr,
            from_addr: r.from_addr,
            subject: r.subject,
            body_html: r.body_html,
            body_text: r.body_text,
            email_type: r.email_type,
            user_id: r.user_id,
            metadata: serde_json::from_str(&r.metadata).unwrap_or_default(),
            created_at: r.created_at,
        }
    }
}

const EMAIL_COLUMNS: &str =
    "id, to_addr, from_addr, subject, body_html, body_text, type, user_id, metadata, created_at";

#[derive(Clone)]
pub struct EmailStore {
    pool: SqlitePool,
}

impl EmailStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn create(
        &self,
        id: &str,
        to_addr: &str,
        from_addr: &str,
        subject: &str,
        body_html: Option<&str>,
        body_text: Option<&str>,
        email_type: &str,
        user_id: Option<&str>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO emails (id, to_addr, from_addr, subject, body_html, body_text, type, user_id)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(id)
        .bind(to_addr)
        .bind(from_addr)
        .bind(subject)
        .bind(body_html)
        .bind(body_text)
        .bind(email_type)
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn list(&self) -> Result<Vec<Email>, sqlx::Error> {
        let rows: Vec<EmailRow> = sqlx::query_as(&format!(
            "SELECT {EMAIL_COLUMNS} FROM emails ORDER BY created_at DESC"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Email::from).collect())
    }

    pub async fn get(&self, id: &str) -> Result<Option<Email>, sqlx::Error> {
        let row: Option<EmailRow> = sqlx::query_as(&format!(
            "SELECT {EMAIL_COLUMNS} FROM emails WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Email::from))
    }

    pub async fn delete(&self, id: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM emails WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

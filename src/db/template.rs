use sqlx::sqlite::SqlitePool;

#[derive(Debug, Clone, serde::Serialize)]
pub struct Template {
    pub template_type: String,
    pub subject: String,
    pub body_html: String,
    pub body_text: Option<String>,
    pub updated_at: String,
}

#[derive(sqlx::FromRow)]
struct TemplateRow {
    #[sqlx(rename = "type")]
    template_type: String,
    subject: String,
    body_html: String,
    body_text: Option<String>,
    updated_at: String,
}

impl From<TemplateRow> for Template {
    fn from(r: TemplateRow) -> Self {
        Self {
            template_type: r.template_type,
            subject: r.subject,
            body_html: r.body_html,
            body_text: r.body_text,
            updated_at: r.updated_at,
        }
    }
}

/// Storage for customizable mail templates, keyed by verification-token
/// type. The in-process read-biased cache sits in `crate::mail::template`.
#[derive(Clone)]
pub struct TemplateStore {
    pool: SqlitePool,
}

impl TemplateStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, template_type: &str) -> Result<Option<Template>, sqlx::Error> {
        let row: Option<TemplateRow> = sqlx::query_as(
            "SELECT type, subject, body_html, body_text, updated_at FROM templates WHERE type = ?",
        )
        .bind(template_type)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Template::from))
    }

    pub async fn upsert(
        &self,
        template_type: &str,
        subject: &str,
        body_html: &str,
        body_text: Option<&str>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO templates (type, subject, body_html, body_text, updated_at)
             VALUES (?, ?, ?, ?, strftime('%Y-%m-%dT%H:%M:%fZ','now'))
             ON CONFLICT (type) DO UPDATE SET
               subject = excluded.subject,
               body_html = excluded.body_html,
               body_text = excluded.body_text,
               updated_at = excluded.updated_at",
        )
        .bind(template_type)
        .bind(subject)
        .bind(body_html)
        .bind(body_text)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

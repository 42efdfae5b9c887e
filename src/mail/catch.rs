use super::{Mailer, Message};
use crate::db::Database;
use async_trait::async_trait;

/// Persists every message to the `emails` table instead of sending it, for
/// inspection via the `/mail/*` viewer endpoints. Intended for integration
/// tests and local development against a real SMTP-shaped client.
pub struct CatchMailer {
    db: Database,
}

impl CatchMailer {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl Mailer for CatchMailer {
    async fn send(&self, message: Message) -> Result<(), crate::error::Error> {
        let id = uuid::Uuid::new_v4().to_string();
        self.db
            .emails()
            .create(
                &id,
                &message.to,
                &message.from,
                &message.subject,
                message.body_html.as_deref(),
                message.body_text.as_deref(),
                &message.email_type,
                message.user_id.as_deref(),
            )
            .await
            .map_err(crate::error::Error::from)
    }
}

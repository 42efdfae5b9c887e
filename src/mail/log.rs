use super::{Mailer, Message};
use async_trait::async_trait;

/// Default mode: writes the rendered message to the structured log instead
/// of sending it. Never fails — intended for local development.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, message: Message) -> Result<(), crate::error::Error> {
        tracing::info!(
            to = %message.to,
            from = %message.from,
            subject = %message.subject,
            r#type = %message.email_type,
            user_id = ?message.user_id,
            body = %message.body_text.as_deref().unwrap_or_else(|| message.body_html.as_deref().unwrap_or("")),
            "mail (log mode)"
        );
        Ok(())
    }
}

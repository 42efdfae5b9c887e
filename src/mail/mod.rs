//! Mail Core (§5/§6): a `Mailer` trait with log/catch/smtp implementations,
//! selected at startup by `Config::mail_mode`, plus template rendering.

mod catch;
mod log;
mod smtp;
pub mod template;

pub use template::render_template;

use crate::config::{Config, MailMode};
use crate::db::Database;
use async_trait::async_trait;
use std::sync::Arc;

/// A single outbound message, already rendered. `email_type` is the
/// verification-token/event type that produced it (e.g. `signup`,
/// `recovery`, `magiclink`), used for the catch-mode viewer and templating.
#[derive(Debug, Clone)]
pub struct Message {
    pub to: String,
    pub from: String,
    pub subject: String,
    pub body_html: Option<String>,
    pub body_text: Option<String>,
    pub email_type: String,
    pub user_id: Option<String>,
    pub metadata: serde_json::Value,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, message: Message) -> Result<(), crate::error::Error>;
}

pub fn build_mailer(config: &Config, db: Database) -> Arc<dyn Mailer> {
    match config.mail_mode {
        MailMode::Log => Arc::new(log::LogMailer),
        MailMode::Catch => Arc::new(catch::CatchMailer::new(db)),
        MailMode::Smtp => {
            let smtp_config = config
                .smtp
                .clone()
                .expect("MAIL_MODE=smtp requires SMTP_HOST to be set");
            Arc::new(smtp::SmtpMailer::new(smtp_config))
        }
    }
}

use super::{Mailer, Message};
use crate::config::SmtpConfig;
use async_trait::async_trait;
use lettre::message::{header::ContentType, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message as LettreMessage, Tokio1Executor};
use std::time::Duration;

const DIAL_TIMEOUT: Duration = Duration::from_secs(10);

pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpMailer {
    pub fn new(config: SmtpConfig) -> Self {
        let builder = if config.user.is_empty() {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
                .expect("invalid SMTP host")
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
                .expect("invalid SMTP host")
                .credentials(Credentials::new(config.user.clone(), config.pass.clone()))
        };

        let transport = builder
            .port(config.port)
            .timeout(Some(DIAL_TIMEOUT))
            .build();

        Self { transport }
    }
}

fn body_part(message: &Message) -> Result<MultiPart, crate::error::Error> {
    let text = message
        .body_text
        .clone()
        .unwrap_or_else(|| "This message requires an HTML-capable mail client.".to_string());

    let html = message.body_html.clone();

    let built = match html {
        Some(html) => MultiPart::alternative()
            .singlepart(SinglePart::builder().header(ContentType::TEXT_PLAIN).body(text))
            .singlepart(SinglePart::builder().header(ContentType::TEXT_HTML).body(html)),
        None => MultiPart::mixed()
            .singlepart(SinglePart::builder().header(ContentType::TEXT_PLAIN).body(text)),
    };
    Ok(built)
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, message: Message) -> Result<(), crate::error::Error> {
        let to: Mailbox = message
            .to
            .parse()
            .map_err(|_| crate::error::Error::Validation("invalid recipient address".into()))?;
        let from: Mailbox = message
            .from
            .parse()
            .map_err(|_| crate::error::Error::Validation("invalid sender address".into()))?;

        let body = body_part(&message)?;

        let email = LettreMessage::builder()
            .from(from)
            .to(to)
            .subject(message.subject.clone())
            .multipart(body)
            .map_err(crate::error::Error::internal)?;

        self.transport
            .send(email)
            .await
            .map_err(crate::error::Error::internal)?;
        Ok(())
    }
}

//! Process configuration, read from the closed set of environment variables
//! plus CLI overrides, validated at startup rather than lazily panicking.

use std::collections::HashMap;

const MIN_JWT_SECRET_LENGTH: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum MailMode {
    #[default]
    Log,
    Catch,
    Smtp,
}

#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub pass: String,
}

#[derive(Debug, Clone)]
pub struct OauthProviderConfig {
    pub client_id: String,
    pub client_secret: String,
    pub enabled: bool,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub jwt_secret: Vec<u8>,
    pub db_path: String,
    pub host: String,
    pub port: u16,
    pub site_url: Option<String>,
    pub mail_mode: MailMode,
    pub mail_from: String,
    pub smtp: Option<SmtpConfig>,
    pub oauth_providers: HashMap<String, OauthProviderConfig>,
    pub oauth_redirect_urls: Vec<String>,
}

impl Config {
    /// Load from environment variables, with `None` on any validation
    /// failure (the caller logs and exits, mirroring the teacher's
    /// `load_jwt_secret`/`validate_rp_origin` pattern).
    pub fn from_env() -> Option<Self> {
        let jwt_secret = Self::load_jwt_secret()?;

        let db_path = std::env::var("DB_PATH").unwrap_or_else(|_| "sblite.db".to_string());
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = std::env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(8080);
        let site_url = std::env::var("SITE_URL").ok();

        let mail_mode = match std::env::var("MAIL_MODE").as_deref() {
            Ok("catch") => MailMode::Catch,
            Ok("smtp") => MailMode::Smtp,
            Ok("log") | Err(_) => MailMode::Log,
            Ok(other) => {
                tracing::error!(mode = %other, "invalid MAIL_MODE, expected log|catch|smtp");
                return None;
            }
        };
        let mail_from =
            std::env::var("MAIL_FROM").unwrap_or_else(|_| "noreply@localhost".to_string());

        let smtp = if mail_mode == MailMode::Smtp {
            let host = std::env::var("SMTP_HOST").ok()?;
            let port = std::env::var("SMTP_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(587);
            let user = std::env::var("SMTP_USER").unwrap_or_default();
            let pass = std::env::var("SMTP_PASS").unwrap_or_default();
            Some(SmtpConfig {
                host,
                port,
                user,
                pass,
            })
        } else {
            None
        };

        let mut oauth_providers = HashMap::new();
        for provider in ["google", "github", "gitlab", "discord"] {
            let prefix = provider.to_uppercase();
            let client_id = std::env::var(format!("OAUTH_{prefix}_CLIENT_ID")).unwrap_or_default();
            let client_secret =
                std::env::var(format!("OAUTH_{prefix}_CLIENT_SECRET")).unwrap_or_default();
            let enabled = std::env::var(format!("OAUTH_{prefix}_ENABLED"))
                .map(|v| v == "true" || v == "1")
                .unwrap_or(false);
            if enabled {
                oauth_providers.insert(
                    provider.to_string(),
                    OauthProviderConfig {
                        client_id,
                        client_secret,
                        enabled,
                    },
                );
            }
        }

        let oauth_redirect_urls = std::env::var("OAUTH_REDIRECT_URLS")
            .map(|s| s.split(',').map(|s| s.trim().to_string()).collect())
            .unwrap_or_default();

        Some(Self {
            jwt_secret,
            db_path,
            host,
            port,
            site_url,
            mail_mode,
            mail_from,
            smtp,
            oauth_providers,
            oauth_redirect_urls,
        })
    }

    fn load_jwt_secret() -> Option<Vec<u8>> {
        let secret = match std::env::var("JWT_SECRET") {
            Ok(s) => s,
            Err(_) => {
                tracing::error!("JWT_SECRET environment variable is required");
                return None;
            }
        };

        if secret.len() < MIN_JWT_SECRET_LENGTH {
            tracing::error!(
                "JWT_SECRET is shorter than {} bytes",
                MIN_JWT_SECRET_LENGTH
            );
            return None;
        }

        Some(secret.into_bytes())
    }

    pub fn oauth_redirect_allowed(&self, redirect_to: &str) -> bool {
        self.oauth_redirect_urls.iter().any(|u| u == redirect_to)
    }
}

//! OAuth provider contract (§6, external collaborator): authorize URL
//! construction, code exchange, and user-info lookup. Four adapters are
//! built in (google, github, gitlab, discord); all share the same
//! authorization-code + PKCE shape.

use crate::error::{Error, Result};
use std::time::Duration;

const EXCHANGE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct ProviderTokens {
    pub access_token: String,
}

#[derive(Debug, Clone)]
pub struct ProviderUserInfo {
    pub provider_id: String,
    pub email: Option<String>,
    pub name: Option<String>,
    pub avatar_url: Option<String>,
    pub email_verified: bool,
}

#[async_trait::async_trait]
pub trait Provider: Send + Sync {
    fn name(&self) -> &'static str;

    fn auth_url(&self, state: &str, challenge: &str, redirect_uri: &str) -> String;

    async fn exchange_code(
        &self,
        code: &str,
        verifier: &str,
        redirect_uri: &str,
    ) -> Result<ProviderTokens>;

    async fn get_user_info(&self, access_token: &str) -> Result<ProviderUserInfo>;
}

struct Endpoints {
    authorize: &'static str,
    token: &'static str,
    userinfo: &'static str,
    scope: &'static str,
}

macro_rules! oauth_provider {
    ($struct_name:ident, $name:literal, $endpoints:expr) => {
        pub struct $struct_name {
            client_id: String,
            client_secret: String,
            http: reqwest::Client,
        }

        impl $struct_name {
            pub fn new(client_id: String, client_secret: String) -> Self {
                Self {
                    client_id,
                    client_secret,
                    http: reqwest::Client::new(),
                }
            }
        }

        #[async_trait::async_trait]
        impl Provider for $struct_name {
            fn name(&self) -> &'static str {
                $name
            }

            fn auth_url(&self, state: &str, challenge: &str, redirect_uri: &str) -> String {
                let endpoints: Endpoints = $endpoints;
                format!(
                    "{}?client_id={}&redirect_uri={}&response_type=code&scope={}&state={}&code_challenge={}&code_challenge_method=S256",
                    endpoints.authorize,
                    urlencoding_component(&self.client_id),
                    urlencoding_component(redirect_uri),
                    urlencoding_component(endpoints.scope),
                    urlencoding_component(state),
                    urlencoding_component(challenge),
                )
            }

            async fn exchange_code(
                &self,
                code: &str,
                verifier: &str,
                redirect_uri: &str,
            ) -> Result<ProviderTokens> {
                let endpoints: Endpoints = $endpoints;
                let resp = self
                    .http
                    .post(endpoints.token)
                    .timeout(EXCHANGE_TIMEOUT)
                    .header("Accept", "application/json")
                    .form(&[
                        ("client_id", self.client_id.as_str()),
                        ("client_secret", self.client_secret.as_str()),
                        ("code", code),
                        ("code_verifier", verifier),
                        ("redirect_uri", redirect_uri),
                        ("grant_type", "authorization_code"),
                    ])
                    .send()
                    .await
                    .map_err(Error::internal)?;

                let body: serde_json::Value = resp.json().await.map_err(Error::internal)?;
                let access_token = body
                    .get("access_token")
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| Error::Validation("provider did not return access_token".into()))?
                    .to_string();

                Ok(ProviderTokens { access_token })
            }

            async fn get_user_info(&self, access_token: &str) -> Result<ProviderUserInfo> {
                let endpoints: Endpoints = $endpoints;
                let body: serde_json::Value = self
                    .http
                    .get(endpoints.userinfo)
                    .timeout(EXCHANGE_TIMEOUT)
                    .bearer_auth(access_token)
                    .header("User-Agent", "sblite")
                    .send()
                    .await
                    .map_err(Error::internal)?
                    .json()
                    .await
                    .map_err(Error::internal)?;

                Ok(parse_user_info($name, &body))
            }
        }
    };
}

fn urlencoding_component(s: &str) -> String {
    url::form_urlencoded::byte_serialize(s.as_bytes()).collect()
}

fn parse_user_info(provider: &str, body: &serde_json::Value) -> ProviderUserInfo {
    match provider {
        "google" => ProviderUserInfo {
            provider_id: body.get("sub").and_then(|v| v.as_str()).unwrap_or_default().to_string(),
            email: body.get("email").and_then(|v| v.as_str()).map(str::to_string),
            name: body.get("name").and_then(|v| v.as_str()).map(str::to_string),
            avatar_url: body.get("picture").and_then(|v| v.as_str()).map(str::to_string),
            email_verified: body.get("email_verified").and_then(|v| v.as_bool()).unwrap_or(false),
        },
        "github" => ProviderUserInfo {
            provider_id: body.get("id").map(|v| v.to_string()).unwrap_or_default(),
            email: body.get("email").and_then(|v| v.as_str()).map(str::to_string),
            name: body.get("name").and_then(|v| v.as_str()).map(str::to_string),
            avatar_url: body.get("avatar_url").and_then(|v| v.as_str()).map(str::to_string),
            email_verified: body.get("email").and_then(|v| v.as_str()).is_some(),
        },
        "gitlab" => ProviderUserInfo {
            provider_id: body.get("sub").and_then(|v| v.as_str()).unwrap_or_default().to_string(),
            email: body.get("email").and_then(|v| v.as_str()).map(str::to_string),
            name: body.get("name").and_then(|v| v.as_str()).map(str::to_string),
            avatar_url: body.get("avatar_url").and_then(|v| v.as_str()).map(str::to_string),
            email_verified: body.get("email_verified").and_then(|v| v.as_bool()).unwrap_or(false),
        },
        "discord" => {
            let id = body.get("id").and_then(|v| v.as_str()).unwrap_or_default().to_string();
            let avatar = body.get("avatar").and_then(|v| v.as_str());
            ProviderUserInfo {
                provider_id: id.clone(),
                email: body.get("email").and_then(|v| v.as_str()).map(str::to_string),
                name: body.get("username").and_then(|v| v.as_str()).map(str::to_string),
                avatar_url: avatar.map(|a| format!("https://cdn.discordapp.com/avatars/{id}/{a}.png")),
                email_verified: body.get("verified").and_then(|v| v.as_bool()).unwrap_or(false),
            }
        }
        _ => ProviderUserInfo {
            provider_id: String::new(),
            email: None,
            name: None,
            avatar_url: None,
            email_verified: false,
        },
    }
}

oauth_provider!(GoogleProvider, "google", Endpoints {
    authorize: "https://accounts.google.com/o/oauth2/v2/auth",
    token: "https://oauth2.googleapis.com/token",
    userinfo: "https://openidconnect.googleapis.com/v1/userinfo",
    scope: "openid email profile",
});

oauth_provider!(GithubProvider, "github", Endpoints {
    authorize: "https://github.com/login/oauth/authorize",
    token: "https://github.com/login/oauth/access_token",
    userinfo: "https://api.github.com/user",
    scope: "read:user user:email",
});

oauth_provider!(GitlabProvider, "gitlab", Endpoints {
    authorize: "https://gitlab.com/oauth/authorize",
    token: "https://gitlab.com/oauth/token",
    userinfo: "https://gitlab.com/oauth/userinfo",
    scope: "read_user openid email",
});

oauth_provider!(DiscordProvider, "discord", Endpoints {
    authorize: "https://discord.com/api/oauth2/authorize",
    token: "https://discord.com/api/oauth2/token",
    userinfo: "https://discord.com/api/users/@me",
    scope: "identify email",
});

//! Authorize/Callback/Unlink orchestration (§4.8). FlowState is persisted,
//! not in-memory, so the process can restart mid-flow.

use super::pkce;
use super::provider::Provider;
use crate::auth::{AuthCore, TokenPair};
use crate::config::Config;
use crate::db::Database;
use crate::error::{Error, Result};
use std::collections::HashMap;
use std::sync::Arc;

pub struct OAuthFlow {
    db: Database,
    auth: AuthCore,
    config: Arc<Config>,
    providers: HashMap<String, Arc<dyn Provider>>,
}

impl OAuthFlow {
    pub fn new(
        db: Database,
        auth: AuthCore,
        config: Arc<Config>,
        providers: HashMap<String, Arc<dyn Provider>>,
    ) -> Self {
        Self { db, auth, config, providers }
    }

    fn provider(&self, name: &str) -> Result<&Arc<dyn Provider>> {
        if !self.config.oauth_providers.get(name).is_some_and(|p| p.enabled) {
            return Err(Error::Validation(format!("oauth provider not enabled: {name}")));
        }
        self.providers
            .get(name)
            .ok_or_else(|| Error::Validation(format!("unknown oauth provider: {name}")))
    }

    /// Persists flow state and returns the provider's authorization URL to
    /// redirect the client to.
    pub async fn authorize(&self, provider_name: &str, redirect_to: &str, callback_url: &str) -> Result<String> {
        if !self.config.oauth_redirect_allowed(redirect_to) {
            return Err(Error::Validation("redirect_to not in allow-list".into()));
        }
        let provider = self.provider(provider_name)?;

        let state = uuid::Uuid::new_v4().to_string();
        let verifier = pkce::generate_verifier();
        let challenge = pkce::challenge(&verifier);

        self.db
            .flow_states()
            .create(&state, provider_name, &verifier, redirect_to)
            .await?;

        Ok(provider.auth_url(&state, &challenge, callback_url))
    }

    /// Exchanges `code` for tokens, fetches user info, and links/creates
    /// the user per §4.8's three-way match. `upgrading` carries the
    /// anonymous principal's id, if the caller was already signed in
    /// anonymously before starting the flow.
    pub async fn callback(
        &self,
        state: &str,
        code: &str,
        callback_url: &str,
        upgrading: Option<&str>,
    ) -> Result<(TokenPair, String)> {
        let flow = self
            .db
            .flow_states()
            .take(state)
            .await?
            .ok_or_else(|| Error::Validation("oauth state missing or expired".into()))?;

        let expires_at = chrono::DateTime::parse_from_rfc3339(&flow.expires_at).map_err(Error::internal)?;
        if chrono::Utc::now() > expires_at {
            return Err(Error::Validation("oauth state expired".into()));
        }

        let provider = self.provider(&flow.provider)?;
        let tokens = provider.exchange_code(code, &flow.code_verifier, callback_url).await?;
        let info = provider.get_user_info(&tokens.access_token).await?;

        if info.provider_id.is_empty() {
            return Err(Error::Validation("provider did not return a stable id".into()));
        }

        let user = self.resolve_user(&flow.provider, &info, upgrading).await?;
        let pair = self.auth.create_session(&user).await?;

        Ok((pair, flow.redirect_to))
    }

    async fn resolve_user(
        &self,
        provider_name: &str,
        info: &super::provider::ProviderUserInfo,
        upgrading: Option<&str>,
    ) -> Result<crate::db::User> {
        if let Some(identity) = self
            .db
            .identities()
            .get_by_provider(provider_name, &info.provider_id)
            .await?
        {
            self.db.identities().touch_last_sign_in(&identity.id).await?;
            return self
                .db
                .users()
                .get_by_id(&identity.user_id)
                .await?
                .ok_or_else(|| Error::NotFound("user not found for identity".into()));
        }

        if let Some(email) = &info.email {
            if let Some(existing) = self.db.users().get_by_email(email).await? {
                self.link_identity(&existing.id, provider_name, info).await?;
                let mut providers = existing
                    .app_metadata
                    .get("providers")
                    .and_then(|v| v.as_array())
                    .map(|a| a.iter().filter_map(|v| v.as_str().map(str::to_string)).collect::<Vec<_>>())
                    .unwrap_or_default();
                if !providers.iter().any(|p| p == provider_name) {
                    providers.push(provider_name.to_string());
                }
                let mut app_metadata = existing.app_metadata.clone();
                app_metadata["providers"] = serde_json::json!(providers);
                self.db.users().set_metadata(&existing.id, &app_metadata, &existing.user_metadata).await?;
                return self
                    .db
                    .users()
                    .get_by_id(&existing.id)
                    .await?
                    .ok_or_else(|| Error::NotFound("user vanished mid-link".into()));
            }
        }

        let target_id = if let Some(anon_id) = upgrading {
            let anon = self
                .db
                .users()
                .get_by_id(anon_id)
                .await?
                .ok_or_else(|| Error::Authentication)?;
            self.db
                .users()
                .set_email_confirmed(&anon.id)
                .await?;
            self.db.users().set_anonymous(&anon.id, false).await?;
            anon.id
        } else {
            let id = uuid::Uuid::new_v4().to_string();
            let app_metadata = serde_json::json!({"provider": provider_name, "providers": [provider_name]});
            let user_metadata = serde_json::json!({
                "name": info.name,
                "avatar_url": info.avatar_url,
            });
            self.db
                .users()
                .create(
                    &id,
                    info.email.as_deref(),
                    None,
                    Some(chrono::Utc::now()),
                    &app_metadata,
                    &user_metadata,
                    false,
                )
                .await?;
            id
        };

        self.link_identity(&target_id, provider_name, info).await?;
        self.db
            .users()
            .get_by_id(&target_id)
            .await?
            .ok_or_else(|| Error::NotFound("user vanished after creation".into()))
    }

    async fn link_identity(
        &self,
        user_id: &str,
        provider_name: &str,
        info: &super::provider::ProviderUserInfo,
    ) -> Result<()> {
        let identity_data = serde_json::json!({
            "email": info.email,
            "name": info.name,
            "avatar_url": info.avatar_url,
            "email_verified": info.email_verified,
        });
        let id = uuid::Uuid::new_v4().to_string();
        self.db
            .identities()
            .create(&id, user_id, provider_name, &info.provider_id, &identity_data)
            .await?;
        Ok(())
    }

    /// Rejects removal if it would leave the user with zero auth methods.
    pub async fn unlink(&self, user_id: &str, provider_name: &str) -> Result<()> {
        let user = self
            .db
            .users()
            .get_by_id(user_id)
            .await?
            .ok_or_else(|| Error::NotFound("user not found".into()))?;

        let identity_count = self.db.identities().count_for_user(user_id).await?;
        let has_password = user.encrypted_password.is_some();

        if !has_password && identity_count <= 1 {
            return Err(Error::Validation(
                "cannot remove the last authentication method".into(),
            ));
        }

        self.db.identities().delete(user_id, provider_name).await?;
        Ok(())
    }
}

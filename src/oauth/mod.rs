//! OAuth Core (§4.8): PKCE, provider adapters, and flow-state-driven
//! Authorize/Callback/Unlink orchestration.

pub mod flow;
pub mod pkce;
pub mod provider;

pub use flow::OAuthFlow;
pub use provider::{DiscordProvider, GithubProvider, GitlabProvider, GoogleProvider, Provider};

use crate::config::Config;
use std::collections::HashMap;
use std::sync::Arc;

/// Build the provider registry from configuration — only enabled providers
/// are instantiated.
pub fn build_providers(config: &Config) -> HashMap<String, Arc<dyn Provider>> {
    let mut providers: HashMap<String, Arc<dyn Provider>> = HashMap::new();

    for (name, cfg) in &config.oauth_providers {
        if !cfg.enabled {
            continue;
        }
        let provider: Arc<dyn Provider> = match name.as_str() {
            "google" => Arc::new(GoogleProvider::new(cfg.client_id.clone(), cfg.client_secret.clone())),
            "github" => Arc::new(GithubProvider::new(cfg.client_id.clone(), cfg.client_secret.clone())),
            "gitlab" => Arc::new(GitlabProvider::new(cfg.client_id.clone(), cfg.client_secret.clone())),
            "discord" => Arc::new(DiscordProvider::new(cfg.client_id.clone(), cfg.client_secret.clone())),
            _ => continue,
        };
        providers.insert(name.clone(), provider);
    }

    providers
}

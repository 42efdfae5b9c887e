//! Shared application state, cloned (cheaply, via `Arc`/pool handles) into
//! every handler and middleware.

use crate::auth::AuthCore;
use crate::config::Config;
use crate::db::Database;
use crate::mail::Mailer;
use crate::oauth::OAuthFlow;
use crate::rate_limit::RateLimitConfig;
use crate::rls::RlsEngine;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub auth: AuthCore,
    pub rls: RlsEngine,
    pub oauth: Arc<OAuthFlow>,
    pub mailer: Arc<dyn Mailer>,
    pub config: Arc<Config>,
    pub rate_limit: Arc<RateLimitConfig>,
}

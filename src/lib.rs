pub mod auth;
pub mod cleanup;
pub mod cli;
pub mod config;
pub mod db;
pub mod error;
pub mod http;
pub mod jwt;
pub mod mail;
pub mod migrator;
pub mod oauth;
pub mod pipeline;
pub mod query;
pub mod rate_limit;
pub mod rls;
pub mod types;

use auth::AuthCore;
use axum::Router;
use config::Config;
use db::Database;
use jwt::JwtConfig;
use pipeline::AppState;
use rate_limit::RateLimitConfig;
use rls::RlsEngine;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::{catch_panic::CatchPanicLayer, request_id::MakeRequestUuid, trace::TraceLayer, ServiceBuilderExt};

/// Build the shared application state: open stores, JWT signer, mailer, and
/// OAuth provider registry, all wired from `Config`.
pub fn build_state(config: Config, db: Database) -> AppState {
    let config = Arc::new(config);
    let jwt = JwtConfig::new(&config.jwt_secret, "sblite");
    let auth = AuthCore::new(db.clone(), jwt);
    let rls = RlsEngine::new(db.clone());
    let providers = oauth::build_providers(&config);
    let oauth = Arc::new(oauth::OAuthFlow::new(db.clone(), auth.clone(), config.clone(), providers));
    let mailer = mail::build_mailer(&config, db.clone());

    AppState {
        db,
        auth,
        rls,
        oauth,
        mailer,
        config,
        rate_limit: Arc::new(RateLimitConfig::new()),
    }
}

/// Create the application router with the given state. Wraps `http::router`
/// with the outer layers common to every request: request IDs, tracing,
/// panic recovery, and CORS.
pub fn create_app(state: AppState, enable_mail: bool) -> Router {
    let cors = pipeline::cors::layer();

    let middleware = tower::ServiceBuilder::new()
        .set_x_request_id(MakeRequestUuid)
        .layer(TraceLayer::new_for_http())
        .layer(CatchPanicLayer::new())
        .propagate_x_request_id()
        .layer(cors);

    http::router(state, enable_mail).layer(middleware)
}

/// Run cleanup tasks and spawn the hourly background scheduler.
/// Call this before starting the server.
pub async fn init_cleanup(db: &Database) {
    cleanup::run_cleanup(db).await;
    cleanup::spawn_cleanup_scheduler(db.clone());
}

/// Run the server on the given listener. This function blocks until the server exits.
/// Call `init_cleanup` before this to run cleanup on startup.
pub async fn run_server(state: AppState, enable_mail: bool, listener: TcpListener) -> Result<(), std::io::Error> {
    let app = create_app(state, enable_mail);
    let make_service = app.into_make_service_with_connect_info::<SocketAddr>();
    axum::serve(listener, make_service).await
}

//! Route assembly for the request pipeline (§4.9): `/rest/v1/*`,
//! `/auth/v1/*`, `/admin/v1/*`, `/mail/*`, `/health`.

pub mod admin;
pub mod auth;
pub mod error;
pub mod health;
pub mod mail;
pub mod rest;

use axum::{
    middleware,
    routing::{delete, get, post},
    Router,
};

use crate::pipeline::{self, AppState};
use crate::rate_limit;

fn rest_router(state: AppState) -> Router<AppState> {
    Router::new()
        .route(
            "/{table}",
            get(rest::select)
                .head(rest::head)
                .post(rest::insert)
                .patch(rest::update)
                .delete(rest::delete),
        )
        .layer(middleware::from_fn_with_state(
            state.clone(),
            pipeline::jwt_mw::upgrade_bearer_principal,
        ))
        .layer(middleware::from_fn_with_state(state, pipeline::apikey::require_api_key))
}

fn admin_router(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/tables", get(admin::list_tables).post(admin::create_table))
        .route("/tables/{name}", get(admin::get_table).delete(admin::drop_table))
        .route("/users", get(admin::list_users))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            pipeline::jwt_mw::upgrade_bearer_principal,
        ))
        .layer(middleware::from_fn_with_state(state, pipeline::apikey::require_api_key))
}

fn auth_router(state: AppState) -> Router<AppState> {
    let signup = Router::new()
        .route("/signup", post(auth::signup))
        .route_layer(middleware::from_fn_with_state(state.clone(), rate_limit::rate_limit_signup));

    let token = Router::new()
        .route("/token", post(auth::token))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit::rate_limit_password_grant,
        ));

    let recover = Router::new()
        .route("/recover", post(auth::recover))
        .route("/magiclink", post(auth::magiclink))
        .route_layer(middleware::from_fn_with_state(state.clone(), rate_limit::rate_limit_recover));

    let public = Router::new()
        .merge(signup)
        .merge(token)
        .merge(recover)
        .route("/resend", post(auth::resend))
        .route("/verify", get(auth::verify).post(auth::verify))
        .route("/authorize", get(auth::authorize))
        .route("/callback", get(auth::callback))
        .route("/settings", get(auth::settings))
        .layer(middleware::from_fn_with_state(state.clone(), pipeline::apikey::require_api_key));

    let identified = Router::new()
        .route("/logout", post(auth::logout))
        .route("/user", get(auth::get_user).put(auth::update_user))
        .route("/invite", post(auth::invite))
        .route("/user/identities", get(auth::list_identities))
        .route("/user/identities/{provider}", delete(auth::unlink_identity))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            pipeline::jwt_mw::upgrade_bearer_principal,
        ))
        .layer(middleware::from_fn_with_state(state, pipeline::apikey::require_api_key));

    public.merge(identified)
}

fn mail_router() -> Router<AppState> {
    Router::new()
        .route("/", get(mail::list))
        .route("/{id}", get(mail::get).delete(mail::delete))
}

/// Assemble the full router. `enable_mail` gates the `/mail/*` viewer, which
/// is useful in every mode but most meaningful with `MAIL_MODE=catch`.
pub fn router(state: AppState, enable_mail: bool) -> Router {
    let mut app = Router::new()
        .route("/health", get(health::health))
        .nest("/rest/v1", rest_router(state.clone()))
        .nest("/admin/v1", admin_router(state.clone()))
        .nest("/auth/v1", auth_router(state.clone()));

    if enable_mail {
        app = app.nest("/mail", mail_router());
    }

    app.with_state(state)
}

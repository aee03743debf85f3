use std::path::Path;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post, put},
};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::auth::{self, AppState};
use crate::middleware::require_auth;
use crate::{friends, messages, users};

/// Build the full HTTP surface. `avatar_dir` is served under `/avatars`.
pub fn app(state: AppState, avatar_dir: &Path) -> Router {
    let public_routes = Router::new()
        .route("/api/auth/signup", post(auth::signup))
        .route("/api/auth/login", post(auth::login))
        .route("/api/auth/logout", post(auth::logout))
        .with_state(state.clone());

    let protected_routes = Router::new()
        .route("/api/users/me", get(users::me).patch(users::update_profile))
        .route(
            "/api/users/me/avatar",
            put(users::update_avatar).layer(DefaultBodyLimit::max(users::MAX_AVATAR_BYTES)),
        )
        .route("/api/friends", get(friends::get_friends))
        .route("/api/friends/requests", get(friends::get_requests))
        .route("/api/friends/{user_id}/request", post(friends::send_request))
        .route("/api/friends/{user_id}/accept", post(friends::accept))
        .route("/api/friends/{user_id}/reject", post(friends::reject))
        .route("/api/friends/{user_id}/block", post(friends::block))
        .route(
            "/api/messages/{friend_id}",
            get(messages::get_messages).post(messages::send_message),
        )
        .route("/api/messages/{friend_id}/read", post(messages::mark_read))
        .layer(middleware::from_fn_with_state(state.clone(), require_auth))
        .with_state(state);

    Router::new()
        .route("/health", get(|| async { "ok" }))
        .merge(public_routes)
        .merge(protected_routes)
        .nest_service("/avatars", ServeDir::new(avatar_dir))
        .layer(TraceLayer::new_for_http())
}

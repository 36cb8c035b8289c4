use axum::extract::DefaultBodyLimit;
use axum::{routing::get, routing::patch, routing::post, Router};
use tower_http::limit::RequestBodyLimitLayer;

use crate::http::handlers;
use crate::AppState;

// Room for multipart boundaries and headers around the file itself.
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

pub fn health() -> Router<AppState> {
    Router::new().route("/health", get(handlers::health))
}

pub fn auth() -> Router<AppState> {
    Router::new()
        .route("/auth/login", post(handlers::login))
        .route("/auth/logout", post(handlers::logout))
}

pub fn users() -> Router<AppState> {
    Router::new()
        .route("/users", post(handlers::create_user))
        .route("/users/:id", get(handlers::get_user))
        .route("/users/:id/posts", get(handlers::list_user_posts))
        .route("/users/:id/follow", post(handlers::follow_user))
        .route("/users/:id/unfollow", post(handlers::unfollow_user))
}

pub fn account() -> Router<AppState> {
    Router::new().route(
        "/account/privacy",
        get(handlers::get_privacy_defaults).put(handlers::update_privacy_default),
    )
}

pub fn posts() -> Router<AppState> {
    Router::new()
        .route("/posts", post(handlers::create_post))
        .route(
            "/posts/:id",
            get(handlers::get_post).delete(handlers::delete_post),
        )
        .route("/posts/:id/privacy", patch(handlers::update_post_privacy))
        .route(
            "/posts/:id/like",
            post(handlers::like_post).delete(handlers::unlike_post),
        )
}

pub fn media(state: &AppState) -> Router<AppState> {
    let limit = state.upload_options.max_bytes + MULTIPART_OVERHEAD_BYTES;
    Router::new()
        .route("/media/photos", post(handlers::upload_photo))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(limit))
}

pub fn notifications() -> Router<AppState> {
    Router::new()
        .route("/notifications", get(handlers::list_notifications))
        .route(
            "/notifications/:id/read",
            post(handlers::mark_notification_read),
        )
}

use std::sync::Arc;

use axum::{
    body::Body,
    http::{HeaderMap, Request},
    middleware::{from_fn, Next},
    response::IntoResponse,
    routing::{get, post},
    Router,
};

pub mod auth;
pub mod reply;
pub mod routes;
pub mod store;

use reply::ReplyOracle;
use store::Store;

#[derive(Clone)]
pub struct AppState {
    pub store: Store,
    pub oracle: Arc<dyn ReplyOracle>,
}

/// The application router, minus the outer transport layers (CORS, rate
/// limiting, tracing) that the binary adds.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        // Auth routes
        .route("/auth/signup", post(auth::signup))
        .route("/auth/login", post(auth::login))
        .route("/auth/logout", post(auth::logout))
        // API routes
        .route("/api/me", get(auth::me))
        .route(
            "/api/items",
            get(routes::items::list_items).post(routes::items::create_item),
        )
        .route("/api/items/mine", get(routes::items::my_items))
        .route("/api/items/{id}", get(routes::items::get_item))
        .route("/api/items/{id}/chat", post(routes::chat::open_item_chat))
        .route("/api/items/{id}/donated", post(routes::items::mark_donated))
        .route("/api/chat/{thread_id}", get(routes::chat::get_thread))
        .route(
            "/api/chat/{thread_id}/messages",
            post(routes::chat::send_message),
        )
        .layer(from_fn(require_auth))
        .with_state(state)
}

async fn require_auth(req: Request<Body>, next: Next) -> impl IntoResponse {
    // Guard only API endpoints here; /auth and /health stay open.
    let path = req.uri().path();
    if req.method() == axum::http::Method::OPTIONS || !path.starts_with("/api/") {
        return next.run(req).await;
    }

    let headers: &HeaderMap = req.headers();
    if auth::request_is_authenticated(headers) {
        return next.run(req).await;
    }

    (axum::http::StatusCode::UNAUTHORIZED, "Unauthorized").into_response()
}

async fn health_check() -> &'static str {
    "OK"
}

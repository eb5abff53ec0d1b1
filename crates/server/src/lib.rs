pub mod bootstrap;
pub mod chat;
pub mod health;

use std::time::Duration;

use axum::{
    http::{header, HeaderValue, Method},
    routing::{get, post},
    Router,
};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing::warn;

use crate::chat::AppState;

/// `/chat` and `/health`, everything else answers with the JSON 404 body.
pub fn router(state: AppState, allowed_origins: &[String]) -> Router {
    Router::new()
        .route("/chat", post(chat::chat))
        .route("/health", get(health::health))
        .fallback(chat::not_found)
        .layer(cors_layer(allowed_origins))
        .with_state(state)
}

pub fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE])
        .max_age(Duration::from_secs(600));

    if allowed_origins.iter().any(|origin| origin.trim() == "*") {
        return layer.allow_origin(Any);
    }

    let origins = allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin.trim()) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(event_name = "http.cors.invalid_origin", origin = %origin, "ignoring origin");
                None
            }
        })
        .collect::<Vec<_>>();
    layer.allow_origin(AllowOrigin::list(origins))
}

use axum::{extract::State, Json};
use serde::Serialize;

use crate::chat::AppState;

pub const SERVICE_NAME: &str = "shopping-assistant-chatbot";

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub active_sessions: usize,
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        service: SERVICE_NAME,
        active_sessions: state.processor.active_sessions().await,
    })
}

//! Single-attempt HTTP access to the product/cart backend.
//!
//! Every failure is returned as a [`GatewayError`] value; nothing in here panics or bubbles
//! transport errors upward. Retry policy belongs to callers.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use serde_json::{json, Value};
use shopassist_core::config::BackendConfig;
use shopassist_core::errors::ErrorCategory;
use thiserror::Error;
use tracing::{error, info, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GatewayErrorKind {
    Network,
    Api,
    Unknown,
}

impl GatewayErrorKind {
    pub fn category(self) -> ErrorCategory {
        match self {
            Self::Network => ErrorCategory::Network,
            Self::Api => ErrorCategory::Api,
            Self::Unknown => ErrorCategory::Unknown,
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct GatewayError {
    pub kind: GatewayErrorKind,
    pub message: String,
    pub status: Option<u16>,
}

impl GatewayError {
    pub fn network(message: impl Into<String>) -> Self {
        Self { kind: GatewayErrorKind::Network, message: message.into(), status: None }
    }

    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self { kind: GatewayErrorKind::Api, message: message.into(), status: Some(status) }
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self { kind: GatewayErrorKind::Unknown, message: message.into(), status: None }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind == GatewayErrorKind::Api && self.status == Some(StatusCode::NOT_FOUND.as_u16())
    }
}

pub type GatewayResult = Result<Value, GatewayError>;

#[async_trait]
pub trait Backend: Send + Sync {
    async fn request(&self, method: Method, path: &str, body: Option<Value>) -> GatewayResult;
}

#[derive(Clone, Debug)]
pub struct HttpGateway {
    client: Client,
    base_url: String,
}

impl HttpGateway {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| GatewayError::unknown(format!("Unexpected error: {error}")))?;

        Ok(Self { client, base_url: base_url.trim_end_matches('/').to_string() })
    }

    pub fn from_config(config: &BackendConfig) -> Result<Self, GatewayError> {
        Self::new(&config.base_url, Duration::from_secs(config.timeout_secs))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }
}

#[async_trait]
impl Backend for HttpGateway {
    async fn request(&self, method: Method, path: &str, body: Option<Value>) -> GatewayResult {
        let url = self.url(path);
        info!(
            event_name = "backend.request",
            method = %method,
            url = %url,
            "calling product backend"
        );

        let mut request = self.client.request(method.clone(), &url);
        if let Some(body) = &body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|error| transport_error(&url, error))?;
        let status = response.status();
        let text = response.text().await.map_err(|error| transport_error(&url, error))?;

        if !status.is_success() {
            let message = api_error_message(status, &text);
            warn!(
                event_name = "backend.response.error",
                method = %method,
                url = %url,
                status = status.as_u16(),
                error = %message,
                "backend returned a failure status"
            );
            return Err(GatewayError::api(status.as_u16(), message));
        }

        Ok(serde_json::from_str::<Value>(&text)
            .unwrap_or_else(|_| json!({ "message": "Success", "status_code": status.as_u16() })))
    }
}

fn transport_error(url: &str, error: reqwest::Error) -> GatewayError {
    let mapped = if error.is_timeout() {
        GatewayError::network(format!("Request to {url} timed out"))
    } else if error.is_connect() {
        GatewayError::network(format!("Could not connect to backend API at {url}"))
    } else {
        GatewayError::unknown(format!("Unexpected error: {error}"))
    };

    error!(
        event_name = "backend.transport.error",
        url = %url,
        category = mapped.kind.category().as_str(),
        error = %error,
        "backend request failed before a response was read"
    );
    mapped
}

fn api_error_message(status: StatusCode, body: &str) -> String {
    let fallback = format!("API returned error: {}", status.as_u16());
    if body.trim().is_empty() {
        return fallback;
    }

    match serde_json::from_str::<Value>(body) {
        Ok(value) => value
            .get("error")
            .and_then(Value::as_str)
            .map(ToString::to_string)
            .unwrap_or(fallback),
        Err(_) => body.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::{http::StatusCode, routing::get, Json, Router};
    use reqwest::Method;
    use serde_json::json;

    use super::{api_error_message, Backend, GatewayErrorKind, HttpGateway};

    async fn spawn_backend(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind listener");
        let address = listener.local_addr().expect("local address");
        tokio::spawn(async move {
            axum::serve(listener, router).await.expect("stub backend should serve");
        });
        format!("http://{address}")
    }

    fn stub_router() -> Router {
        Router::new()
            .route(
                "/api/products",
                get(|| async { Json(json!([{ "id": 1, "name": "Lamp", "price": 12.5 }])) }),
            )
            .route(
                "/api/products/{id}",
                get(|| async {
                    (StatusCode::NOT_FOUND, Json(json!({ "error": "Product not found" })))
                }),
            )
            .route(
                "/api/slow",
                get(|| async {
                    tokio::time::sleep(Duration::from_millis(500)).await;
                    Json(json!([]))
                }),
            )
            .route(
                "/api/plain",
                get(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "database offline") }),
            )
            .route("/api/empty-error", get(|| async { StatusCode::SERVICE_UNAVAILABLE }))
            .route(
                "/api/cart/{id}",
                axum::routing::delete(|| async { StatusCode::NO_CONTENT }),
            )
    }

    #[tokio::test]
    async fn success_returns_parsed_body() {
        let base_url = spawn_backend(stub_router()).await;
        let gateway = HttpGateway::new(&base_url, Duration::from_secs(2)).expect("gateway");

        let value = gateway.request(Method::GET, "/api/products", None).await.expect("success");

        assert_eq!(value[0]["name"], "Lamp");
    }

    #[tokio::test]
    async fn unparseable_success_body_becomes_status_marker() {
        let base_url = spawn_backend(stub_router()).await;
        let gateway = HttpGateway::new(&base_url, Duration::from_secs(2)).expect("gateway");

        let value = gateway.request(Method::DELETE, "/api/cart/5", None).await.expect("success");

        assert_eq!(value, json!({ "message": "Success", "status_code": 204 }));
    }

    #[tokio::test]
    async fn not_found_preserves_status_and_error_field() {
        let base_url = spawn_backend(stub_router()).await;
        let gateway = HttpGateway::new(&base_url, Duration::from_secs(2)).expect("gateway");

        let error =
            gateway.request(Method::GET, "/api/products/999", None).await.expect_err("404");

        assert_eq!(error.kind, GatewayErrorKind::Api);
        assert_eq!(error.status, Some(404));
        assert_eq!(error.message, "Product not found");
        assert!(error.is_not_found());
    }

    #[tokio::test]
    async fn non_json_error_body_is_used_verbatim() {
        let base_url = spawn_backend(stub_router()).await;
        let gateway = HttpGateway::new(&base_url, Duration::from_secs(2)).expect("gateway");

        let error = gateway.request(Method::GET, "/api/plain", None).await.expect_err("500");

        assert_eq!(error.kind, GatewayErrorKind::Api);
        assert_eq!(error.status, Some(500));
        assert_eq!(error.message, "database offline");
        assert!(!error.is_not_found());
    }

    #[tokio::test]
    async fn empty_error_body_uses_generic_message() {
        let base_url = spawn_backend(stub_router()).await;
        let gateway = HttpGateway::new(&base_url, Duration::from_secs(2)).expect("gateway");

        let error =
            gateway.request(Method::GET, "/api/empty-error", None).await.expect_err("503");

        assert_eq!(error.message, "API returned error: 503");
    }

    #[tokio::test]
    async fn timeout_is_reported_as_network_failure() {
        let base_url = spawn_backend(stub_router()).await;
        let gateway = HttpGateway::new(&base_url, Duration::from_millis(100)).expect("gateway");

        let error = gateway.request(Method::GET, "/api/slow", None).await.expect_err("timeout");

        assert_eq!(error.kind, GatewayErrorKind::Network);
        assert!(error.message.contains("timed out"));
        assert!(error.message.contains("/api/slow"));
    }

    #[tokio::test]
    async fn refused_connection_is_reported_as_network_failure() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind listener");
        let address = listener.local_addr().expect("local address");
        drop(listener);

        let gateway =
            HttpGateway::new(&format!("http://{address}"), Duration::from_secs(2)).expect("gateway");
        let error = gateway.request(Method::GET, "/api/cart", None).await.expect_err("refused");

        assert_eq!(error.kind, GatewayErrorKind::Network);
        assert!(error.message.contains("Could not connect"));
    }

    #[test]
    fn json_error_body_without_error_field_falls_back() {
        let message = api_error_message(reqwest::StatusCode::BAD_REQUEST, r#"{"detail":"x"}"#);

        assert_eq!(message, "API returned error: 400");
    }
}

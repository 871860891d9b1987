//! Administrative HTTP surface
//!
//! Thin axum layer over the dispatcher for internal callers and operators.
//!
//! ## Endpoints
//!
//! - `POST /api/v1/complete` — dispatch one completion (JSON)
//! - `GET  /api/v1/providers` — provider status report
//! - `POST /api/v1/providers/reset` — re-enable all credentialed providers
//! - `GET  /health` — liveness check
//!
//! Requires the `web-api` Cargo feature.

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::status::StatusReport;
use crate::{DispatchError, Dispatcher};

/// Configuration for the admin HTTP server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// IP address or hostname to bind to (e.g. `"0.0.0.0"` for all interfaces).
    pub host: String,
    /// TCP port the server listens on.
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

/// JSON body for `POST /api/v1/complete`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompleteRequest {
    /// The prompt text to complete.
    pub prompt: String,
    /// Optional system prompt.
    #[serde(default)]
    pub system_prompt: Option<String>,
}

/// JSON response for `POST /api/v1/complete`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompleteResponse {
    /// The completion text.
    pub content: String,
    /// Name of the provider that served the request.
    pub provider: String,
}

/// Dispatch errors mapped onto HTTP statuses.
#[derive(Debug)]
struct ApiError(DispatchError);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            DispatchError::NoProviderAvailable => StatusCode::SERVICE_UNAVAILABLE,
            DispatchError::Provider { .. } => StatusCode::BAD_GATEWAY,
            DispatchError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (
            status,
            Json(serde_json::json!({ "error": self.0.to_string() })),
        )
            .into_response()
    }
}

/// Build the admin router over a shared dispatcher.
pub fn router(dispatcher: Arc<Dispatcher>) -> Router {
    Router::new()
        .route("/api/v1/complete", post(complete_handler))
        .route("/api/v1/providers", get(providers_handler))
        .route("/api/v1/providers/reset", post(reset_handler))
        .route("/health", get(health_handler))
        .layer(CorsLayer::permissive())
        .with_state(dispatcher)
}

/// Start the admin HTTP server. Blocks until the server shuts down.
///
/// # Errors
///
/// Returns an error if the address cannot be bound or the server fails.
pub async fn start_server(
    config: ServerConfig,
    dispatcher: Arc<Dispatcher>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let addr = format!("{}:{}", config.host, config.port);
    info!("starting admin API on http://{addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, router(dispatcher)).await?;

    Ok(())
}

/// `GET /health` — liveness check.
async fn health_handler() -> &'static str {
    "ok"
}

/// `GET /api/v1/providers` — current status of every provider.
async fn providers_handler(State(dispatcher): State<Arc<Dispatcher>>) -> Json<StatusReport> {
    Json(dispatcher.status().await)
}

/// `POST /api/v1/providers/reset` — re-enable all credentialed providers.
async fn reset_handler(State(dispatcher): State<Arc<Dispatcher>>) -> Json<serde_json::Value> {
    dispatcher.reset_providers().await;
    Json(serde_json::json!({ "success": true }))
}

/// `POST /api/v1/complete` — dispatch one completion.
async fn complete_handler(
    State(dispatcher): State<Arc<Dispatcher>>,
    Json(body): Json<CompleteRequest>,
) -> Result<Json<CompleteResponse>, ApiError> {
    let completion = dispatcher
        .complete(&body.prompt, body.system_prompt.as_deref())
        .await
        .map_err(ApiError)?;

    Ok(Json(CompleteResponse {
        content: completion.content,
        provider: completion.provider,
    }))
}

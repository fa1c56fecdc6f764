/**
HTTP surface over the cluster cache

Thin JSON handlers; all caching decisions live in the gateway and poller.
*/
mod cache;
mod cluster;
mod health;

use crate::app::ClusterCache;
use crate::error::Error;
use axum::Json;
use axum::Router;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use k8s_openapi::serde_json::json;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

pub type AppState = Arc<ClusterCache>;

/// Service name reported by the health and status endpoints
pub const SERVICE_NAME: &str = env!("CARGO_PKG_NAME");

/// Error body returned as `{"error": "..."}` with a chosen status.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    #[must_use]
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        let message = match &e {
            Error::Fetch(fetch) => fetch.to_string(),
            other => other.to_string(),
        };
        error!("❌ Request failed: {}", message);
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

pub type ApiResult<T> = core::result::Result<T, ApiError>;

pub fn router(state: AppState) -> Router {
    Router::new()
        .merge(health::routes())
        .merge(cluster::routes())
        .merge(cache::routes())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serve `router` on `addr` until `shutdown` resolves.
///
/// # Errors
///
/// Will return `Err` if the address cannot be bound or the server fails
pub async fn serve(
    router: Router,
    addr: SocketAddr,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> crate::error::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("🌐 Listening on {}", listener.local_addr()?);
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

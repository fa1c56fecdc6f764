use super::{ApiError, ApiResult, AppState};
use crate::cache::PollerStatus;
use crate::events::CacheEvent;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use k8s_openapi::serde_json::{Value, json};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/cache/stats", get(stats))
        .route("/api/cache/refresh", post(refresh))
        .route("/api/cache/invalidate", post(invalidate))
}

async fn stats(State(cache): State<AppState>) -> Json<PollerStatus> {
    Json(cache.status())
}

async fn refresh(State(cache): State<AppState>) -> ApiResult<Json<Value>> {
    if !cache.poller().force_update() {
        return Err(ApiError::new(
            StatusCode::SERVICE_UNAVAILABLE,
            "interrogator not available",
        ));
    }

    cache.announce(CacheEvent::RefreshTriggered);
    Ok(Json(json!({ "status": "cache refresh triggered" })))
}

async fn invalidate(State(cache): State<AppState>) -> Json<Value> {
    cache.store().invalidate();
    cache.announce(CacheEvent::Invalidated);
    Json(json!({ "status": "cache invalidated" }))
}

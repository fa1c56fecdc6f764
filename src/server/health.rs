use super::{AppState, SERVICE_NAME};
use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use k8s_openapi::serde_json::{Value, json};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/api/status", get(status))
}

async fn health(State(cache): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": SERVICE_NAME,
        "timestamp": Utc::now().timestamp_millis(),
        "services": {
            "kubernetes": cache.poller().last_tick_ok(),
            "cache": cache.store().is_valid(),
            "nats": cache.events_enabled(),
            "interrogator": cache.poller().is_running(),
        },
        "cache_stats": cache.store().stats(),
    }))
}

async fn status(State(cache): State<AppState>) -> Json<Value> {
    let kubernetes = if cache.poller().last_tick_ok() {
        "connected"
    } else {
        "unreachable"
    };
    let nats = if cache.events_enabled() {
        "connected"
    } else {
        "disabled"
    };

    Json(json!({
        "service": SERVICE_NAME,
        "timestamp": Utc::now().timestamp_millis(),
        "uptime": cache.uptime().as_secs_f64(),
        "services": {
            "kubernetes": { "status": kubernetes },
            "cache": cache.store().stats(),
            "interrogator": cache.status(),
            "nats": { "status": nats },
        },
    }))
}

use super::{ApiResult, AppState};
use crate::cache::CacheRead;
use crate::cache::store::age_ms;
use crate::events::CacheEvent;
use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};
use k8s_openapi::serde_json::{Map, Value, json};
use serde::Deserialize;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/cluster/info", get(cluster_info))
        .route("/api/cluster/pods", get(pods))
        .route("/api/cluster/deployments", get(deployments))
}

#[derive(Debug, Default, Deserialize)]
struct InfoQuery {
    force: Option<String>,
}

impl InfoQuery {
    fn force_refresh(&self) -> bool {
        self.force
            .as_deref()
            .is_some_and(|force| force.eq_ignore_ascii_case("true"))
    }
}

async fn cluster_info(
    State(cache): State<AppState>,
    Query(query): Query<InfoQuery>,
) -> ApiResult<Json<Value>> {
    let read = cache
        .gateway()
        .get(query.force_refresh(), cache.max_age())
        .await?;

    cache.announce(CacheEvent::ClusterInfoAccessed {
        pod_count: read.snapshot.get("podCount").and_then(Value::as_u64),
        from_cache: read.from_cache(),
    });

    let mut body = (*read.snapshot).clone().into_json_map();
    body.insert("source".to_string(), json!(read.source));
    if read.from_cache() {
        body.insert("cacheAge".to_string(), json!(age_ms(read.age)));
    }
    Ok(Json(Value::Object(body)))
}

// One list from the snapshot with its size and origin.
fn listing(read: &CacheRead, key: &str) -> Value {
    let items = read.snapshot.get(key).cloned().unwrap_or_else(|| json!([]));
    let count = items.as_array().map_or(0, Vec::len);

    let mut body = Map::new();
    body.insert(key.to_string(), items);
    body.insert("count".to_string(), json!(count));
    body.insert("source".to_string(), json!(read.source));
    Value::Object(body)
}

async fn pods(State(cache): State<AppState>) -> ApiResult<Json<Value>> {
    let read = cache.gateway().get(false, cache.max_age()).await?;
    Ok(Json(listing(&read, "pods")))
}

async fn deployments(State(cache): State<AppState>) -> ApiResult<Json<Value>> {
    let read = cache.gateway().get(false, cache.max_age()).await?;
    Ok(Json(listing(&read, "deployments")))
}

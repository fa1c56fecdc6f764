/**
Fire-and-forget event publishing

Cache-state changes are announced on a message bus so other services can react.
Nothing in the cache depends on a publish succeeding: sinks log failures and
move on.
*/
use crate::cache::config::EVENT_SOURCE;
use crate::error::Result;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use k8s_openapi::serde_json::{self, Value, json};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Subject for cache and access notifications
pub const EVENTS_SUBJECT: &str = "k8s.events";

/// Subject for cluster counters published after every successful tick
pub const METRICS_SUBJECT: &str = "k8s.metrics";

#[async_trait]
pub trait EventSink: Send + Sync {
    async fn publish(&self, subject: &str, payload: Value);

    /// False for sinks that drop everything.
    fn is_enabled(&self) -> bool {
        true
    }
}

/// Discards everything; used when no bus is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopEventSink;

#[async_trait]
impl EventSink for NoopEventSink {
    async fn publish(&self, subject: &str, _payload: Value) {
        debug!("📭 Event dropped (no sink): {}", subject);
    }

    fn is_enabled(&self) -> bool {
        false
    }
}

/// Publishes JSON payloads over NATS core.
#[derive(Debug, Clone)]
pub struct NatsEventSink {
    client: async_nats::Client,
}

impl NatsEventSink {
    /// Connect to the NATS server at `url`
    ///
    /// # Errors
    ///
    /// Will return `Err` if the initial connection cannot be established
    pub async fn connect(url: &str) -> Result<Self> {
        let client = async_nats::ConnectOptions::new()
            .name(EVENT_SOURCE)
            .connection_timeout(Duration::from_secs(5))
            .connect(url)
            .await?;
        info!("📡 Connected to NATS at {}", url);
        Ok(Self { client })
    }

    #[must_use]
    pub const fn from_client(client: async_nats::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl EventSink for NatsEventSink {
    async fn publish(&self, subject: &str, payload: Value) {
        let body = match serde_json::to_vec(&payload) {
            Ok(body) => Bytes::from(body),
            Err(e) => {
                warn!("⚠️  Could not encode event for {}: {}", subject, e);
                return;
            }
        };

        if let Err(e) = self.client.publish(subject.to_string(), body).await {
            warn!("⚠️  Failed to publish to {}: {}", subject, e);
        }
    }
}

/// Things worth announcing on [`EVENTS_SUBJECT`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheEvent {
    ServiceStarted,
    RefreshTriggered,
    Invalidated,
    ClusterInfoAccessed { pod_count: Option<u64>, from_cache: bool },
}

impl CacheEvent {
    #[must_use]
    pub const fn action(&self) -> &'static str {
        match self {
            Self::ServiceStarted => "service_started",
            Self::RefreshTriggered => "cache_refresh_triggered",
            Self::Invalidated => "cache_invalidated",
            Self::ClusterInfoAccessed { .. } => "cluster_info_accessed",
        }
    }

    #[must_use]
    pub fn to_payload(&self) -> Value {
        let mut payload = json!({
            "action": self.action(),
            "source": EVENT_SOURCE,
            "timestamp": Utc::now().timestamp_millis(),
        });
        if let Self::ClusterInfoAccessed {
            pod_count,
            from_cache,
        } = self
        {
            payload["podCount"] = json!(pod_count);
            payload["fromCache"] = json!(from_cache);
        }
        payload
    }
}

/// Payload for [`METRICS_SUBJECT`] built from a cluster snapshot.
#[must_use]
pub fn metrics_payload(pod_count: Option<&Value>, deployment_count: Option<&Value>) -> Value {
    json!({
        "podCount": pod_count,
        "deploymentCount": deployment_count,
        "timestamp": Utc::now().timestamp_millis(),
        "source": EVENT_SOURCE,
    })
}

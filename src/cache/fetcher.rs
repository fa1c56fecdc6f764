use super::snapshot::Snapshot;
use async_trait::async_trait;
use k8s_openapi::serde_json;
use std::sync::Arc;
use thiserror::Error;

/// Failure of a single fetch against the external resource.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("kubernetes api error: {0}")]
    Kube(#[from] kube::Error),

    #[error("could not decode cluster object: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("fetch source unavailable: {0}")]
    Unavailable(String),
}

/// Source of cluster snapshots.
///
/// Timeouts and retries are the implementor's business; callers treat every
/// error as final for that attempt.
#[async_trait]
pub trait FetchClient: Send + Sync {
    async fn fetch(&self) -> Result<Snapshot, FetchError>;
}

#[async_trait]
impl<T: FetchClient + ?Sized> FetchClient for Arc<T> {
    async fn fetch(&self) -> Result<Snapshot, FetchError> {
        (**self).fetch().await
    }
}

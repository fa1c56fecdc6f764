use crate::cache::{FetchClient, FetchError, Snapshot};
use async_trait::async_trait;
use chrono::Utc;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Pod;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use k8s_openapi::serde_json::{self, json};
use kube::api::{ListParams, ObjectList};
use kube::{Api, Client};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, info};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PodInfo {
    pub name: String,
    pub namespace: String,
    pub status: String,
    pub creation_timestamp: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentInfo {
    pub name: String,
    pub namespace: String,
    pub replicas: Option<i32>,
    pub ready_replicas: Option<i32>,
    pub creation_timestamp: Option<String>,
}

// Render through serde so the format matches what the API server sent.
fn timestamp(time: Option<&Time>) -> Option<String> {
    time.and_then(|t| serde_json::to_value(t).ok())
        .and_then(|v| v.as_str().map(ToString::to_string))
}

impl From<&Pod> for PodInfo {
    fn from(pod: &Pod) -> Self {
        Self {
            name: pod.metadata.name.clone().unwrap_or_default(),
            namespace: pod.metadata.namespace.clone().unwrap_or_default(),
            status: pod
                .status
                .as_ref()
                .and_then(|status| status.phase.clone())
                .unwrap_or_else(|| "Unknown".to_string()),
            creation_timestamp: timestamp(pod.metadata.creation_timestamp.as_ref()),
        }
    }
}

impl From<&Deployment> for DeploymentInfo {
    fn from(deployment: &Deployment) -> Self {
        Self {
            name: deployment.metadata.name.clone().unwrap_or_default(),
            namespace: deployment.metadata.namespace.clone().unwrap_or_default(),
            replicas: deployment.spec.as_ref().and_then(|spec| spec.replicas),
            ready_replicas: deployment
                .status
                .as_ref()
                .and_then(|status| status.ready_replicas),
            creation_timestamp: timestamp(deployment.metadata.creation_timestamp.as_ref()),
        }
    }
}

/// Pods and deployments as seen in one listing pass.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ClusterObjects {
    pub pods: Vec<PodInfo>,
    pub deployments: Vec<DeploymentInfo>,
}

impl ClusterObjects {
    /// Flatten into the cache layout: `pods`, `deployments`, `podCount`,
    /// `deploymentCount` and `fetchTimestamp` (epoch ms).
    ///
    /// # Errors
    ///
    /// Will return `Err` if an entry cannot be encoded as JSON
    pub fn into_snapshot(self) -> Result<Snapshot, FetchError> {
        let pod_count = self.pods.len();
        let deployment_count = self.deployments.len();

        Ok([
            ("pods", serde_json::to_value(self.pods)?),
            ("deployments", serde_json::to_value(self.deployments)?),
            ("podCount", json!(pod_count)),
            ("deploymentCount", json!(deployment_count)),
            ("fetchTimestamp", json!(Utc::now().timestamp_millis())),
        ]
        .into_iter()
        .collect())
    }
}

/// Lists pods and deployments across all namespaces.
#[derive(Clone)]
pub struct KubeFetchClient {
    client: Client,
}

impl KubeFetchClient {
    #[must_use]
    pub const fn new(client: Client) -> Self {
        Self { client }
    }

    /// # Errors
    ///
    /// Will return `Err` if data can not be retrieved from k8s cluster api
    pub async fn list_objects(&self) -> Result<ClusterObjects, kube::Error> {
        let lp = ListParams::default();

        let pod_list: ObjectList<Pod> = Api::all(self.client.clone()).list(&lp).await?;
        let deployment_list: ObjectList<Deployment> =
            Api::all(self.client.clone()).list(&lp).await?;

        Ok(ClusterObjects {
            pods: pod_list.items.iter().map(PodInfo::from).collect(),
            deployments: deployment_list.items.iter().map(DeploymentInfo::from).collect(),
        })
    }
}

#[async_trait]
impl FetchClient for KubeFetchClient {
    async fn fetch(&self) -> Result<Snapshot, FetchError> {
        let start = Instant::now();
        debug!("Fetching cluster data from Kubernetes API...");

        let objects = self.list_objects().await?;
        info!(
            "Cluster data fetch completed in {:.2}s - {} pods, {} deployments",
            start.elapsed().as_secs_f64(),
            objects.pods.len(),
            objects.deployments.len()
        );

        objects.into_snapshot()
    }
}

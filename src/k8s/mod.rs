pub mod client;
pub mod cluster;

pub use cluster::{ClusterObjects, DeploymentInfo, KubeFetchClient, PodInfo};

/// Default user agent for cluster API calls - automatically uses the package version
///
/// Can be overridden via the `CLUSTERCACHE_USER_AGENT` environment variable.
pub const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// Environment variable consulted before falling back to [`USER_AGENT`]
pub const USER_AGENT_ENV: &str = "CLUSTERCACHE_USER_AGENT";

// Client creation with custom user-agent support for kube 2.x
use super::{USER_AGENT, USER_AGENT_ENV};
use crate::error::Result;
use hyper::http::{HeaderName, HeaderValue};
use kube::{Client, Config};
use tracing::warn;

/// Resolve the user agent: explicit value, then the environment override,
/// then the package default.
#[must_use]
pub fn resolve_user_agent(custom_user_agent: Option<&str>) -> String {
    custom_user_agent.map_or_else(
        || std::env::var(USER_AGENT_ENV).unwrap_or_else(|_| USER_AGENT.to_string()),
        ToString::to_string,
    )
}

/// Push a `user-agent` header onto `config`.
///
/// Returns `false` and leaves the config alone when the value is not a valid
/// header; the kube default user agent is used then.
pub fn add_user_agent_header(config: &mut Config, user_agent: &str) -> bool {
    match HeaderValue::from_str(user_agent) {
        Ok(header_value) => {
            config
                .headers
                .push((HeaderName::from_static("user-agent"), header_value));
            true
        }
        Err(e) => {
            warn!("Ignoring invalid user agent {:?}: {}", user_agent, e);
            false
        }
    }
}

/// Create a new k8s client to interact with k8s cluster api
///
/// # Errors
///
/// Will return `Err` if no kubeconfig or in-cluster configuration can be inferred
pub async fn new(custom_user_agent: Option<&str>) -> Result<Client> {
    let mut config = Config::infer().await?;
    add_user_agent_header(&mut config, &resolve_user_agent(custom_user_agent));
    let client = Client::try_from(config)?;
    Ok(client)
}

use anyhow::Context;
use clap::Parser;
use clustercache::app::{CacheSettings, ClusterCache};
use clustercache::cache::PollerConfig;
use clustercache::cache::config::{
    DEFAULT_MAX_AGE_SECS, DEFAULT_POLL_INTERVAL_SECS, DEFAULT_STOP_GRACE_SECS,
};
use clustercache::events::{EventSink, NatsEventSink, NoopEventSink};
use clustercache::k8s::{self, KubeFetchClient};
use clustercache::server;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Port for the HTTP API
    #[arg(short, long, env = "PORT", default_value_t = 8080)]
    port: u16,

    /// Address to bind
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    host: IpAddr,

    /// Seconds between background cluster polls
    #[arg(long, env = "POLL_INTERVAL_SECS", default_value_t = DEFAULT_POLL_INTERVAL_SECS)]
    interval_secs: u64,

    /// Oldest snapshot readers accept before fetching inline
    #[arg(long, env = "CACHE_MAX_AGE_SECS", default_value_t = DEFAULT_MAX_AGE_SECS)]
    max_age_secs: u64,

    /// How long shutdown waits for an in-flight poll
    #[arg(long, env = "STOP_GRACE_SECS", default_value_t = DEFAULT_STOP_GRACE_SECS)]
    stop_grace_secs: u64,

    /// NATS server for cache events; events are dropped when unset
    #[arg(long, env = "NATS_URL")]
    nats_url: Option<String>,

    /// Custom user agent for Kubernetes API requests
    #[arg(long)]
    user_agent: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();

    let settings = CacheSettings {
        poller: PollerConfig::new(args.interval_secs, args.stop_grace_secs)
            .context("invalid poller configuration")?,
        max_age: Duration::from_secs(args.max_age_secs),
    };

    let client = k8s::client::new(args.user_agent.as_deref())
        .await
        .context("failed to create Kubernetes client")?;
    let fetcher = Arc::new(KubeFetchClient::new(client));
    let events = connect_events(args.nats_url.as_deref()).await;

    let cache = Arc::new(ClusterCache::new(fetcher, events, settings));
    cache.initialize();

    let addr = SocketAddr::new(args.host, args.port);
    let served = server::serve(server::router(cache.clone()), addr, shutdown_signal()).await;

    cache.shutdown().await;
    served.context("HTTP server failed")?;

    info!("👋 Shutdown complete");
    Ok(())
}

async fn connect_events(url: Option<&str>) -> Arc<dyn EventSink> {
    let Some(url) = url else {
        info!("📭 NATS_URL not set, cache events disabled");
        return Arc::new(NoopEventSink);
    };

    match NatsEventSink::connect(url).await {
        Ok(sink) => Arc::new(sink),
        Err(e) => {
            warn!("⚠️  NATS unavailable at {}, cache events disabled: {}", url, e);
            Arc::new(NoopEventSink)
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("⚠️  Failed to listen for ctrl-c: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("⚠️  Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    info!("🛑 Shutdown signal received");
}

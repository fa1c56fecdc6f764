pub mod config;
pub mod fetcher;
pub mod gateway;
pub mod poller;
pub mod snapshot;
pub mod status;
pub mod store;

pub use config::PollerConfig;
pub use fetcher::{FetchClient, FetchError};
pub use gateway::{AccessGateway, CacheRead, ReadSource};
pub use poller::Poller;
pub use snapshot::Snapshot;
pub use status::PollerStatus;
pub use store::{CacheStats, SnapshotStore};

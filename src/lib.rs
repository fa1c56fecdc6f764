pub mod app;
pub mod cache;
pub mod error;
pub mod events;
pub mod k8s;
pub mod server;

//! Sink forwarding
//!
//! A [`Forwarder`] pushes a single record to the external indexing sink.
//! Failures are returned to the caller, which logs and drops them.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

use crate::config::SinkConfig;
use crate::errors::ForwardResult;
use crate::models::Record;

pub mod zinc;

pub use zinc::ZincForwarder;

/// Environment variable consulted when `sink.password` is not configured.
pub const SINK_PASSWORD_ENV: &str = "ZINC_API_PWD";

#[async_trait]
pub trait Forwarder: Send + Sync {
    async fn forward(&self, record: &Record) -> ForwardResult<()>;
}

/// Forwarder used when the sink is disabled.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopForwarder;

#[async_trait]
impl Forwarder for NoopForwarder {
    async fn forward(&self, _record: &Record) -> ForwardResult<()> {
        Ok(())
    }
}

/// Build the forwarder described by the `[sink]` section.
pub fn from_config(config: &SinkConfig) -> Arc<dyn Forwarder> {
    if !config.enabled {
        info!("Sink forwarding disabled");
        return Arc::new(NoopForwarder);
    }

    let password = config
        .password
        .clone()
        .or_else(|| std::env::var(SINK_PASSWORD_ENV).ok());

    info!("Forwarding records to {}", config.url);
    Arc::new(ZincForwarder::new(
        &config.url,
        &config.username,
        password,
        std::time::Duration::from_secs(config.timeout_secs),
    ))
}

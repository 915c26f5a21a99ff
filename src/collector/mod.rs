pub mod archive;
pub mod registry;
pub mod scheduler;
pub mod store;

use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::info;

pub use archive::StoreArchiver;
pub use registry::{ServiceHandle, ServiceRegistry};
pub use scheduler::{RunningService, Scheduler, SchedulerSettings};
pub use store::{CycleReport, Store};

/// Log one line per registered service. Returns the number reported.
pub async fn report_health(registry: &ServiceRegistry) -> usize {
    let handles = registry.list().await;
    info!("Health check: {} service(s) registered", handles.len());

    for handle in &handles {
        let summary = handle.summary().await;
        info!(
            service = %summary.sanitized_name,
            id = %summary.id,
            "phase={:?} records={} errors={} iterations={} emptied={} elapsed={}s",
            summary.phase,
            summary.record_count,
            summary.error_count,
            summary.counters.iteration_count,
            summary.counters.emptied_count,
            summary.elapsed_seconds
        );
    }

    handles.len()
}

/// Periodically run [`report_health`] until `token` is cancelled.
pub fn spawn_health_reporter(
    registry: ServiceRegistry,
    every: Duration,
    token: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(every.max(Duration::from_secs(1)));
        // first tick completes immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = ticker.tick() => {
                    report_health(&registry).await;
                }
            }
        }
    })
}

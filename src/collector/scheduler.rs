//! Service scheduler
//!
//! Drives one service through `Validating -> Waiting/Running -> Rotating ->
//! Terminated`. Every run owns its store; the registry only hands out shared
//! references for readers. Worker calls and sink forwarding run on their own
//! tasks so neither can hold up or take down the driver.

use chrono::Utc;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::archive::StoreArchiver;
use super::registry::{ServiceHandle, ServiceRegistry};
use super::store::DEFAULT_ROTATION_THRESHOLD;
use crate::config::Config;
use crate::errors::{ServiceError, SourceResult};
use crate::forwarder::Forwarder;
use crate::models::{Record, ServiceErrorKind, ServicePhase, ServiceSpec};
use crate::sources::Worker;
use crate::utils::time::DailyTrigger;

/// Records waiting for the sink beyond this are dropped.
pub const FORWARD_QUEUE_CAPACITY: usize = 64;

#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    pub rotation_threshold: usize,
    /// Upper bound on a single worker invocation.
    pub worker_timeout: Duration,
    pub archive_dir: Option<PathBuf>,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            rotation_threshold: DEFAULT_ROTATION_THRESHOLD,
            worker_timeout: Duration::from_secs(30),
            archive_dir: None,
        }
    }
}

impl SchedulerSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            rotation_threshold: config.storage.rotation_threshold,
            worker_timeout: Duration::from_secs(config.scheduler.worker_timeout_secs),
            archive_dir: config.storage.archive_dir.clone(),
        }
    }
}

/// A service started in the background with [`Scheduler::start`].
#[derive(Debug)]
pub struct RunningService {
    pub id: Uuid,
    pub task: JoinHandle<()>,
}

#[derive(Clone)]
pub struct Scheduler {
    registry: ServiceRegistry,
    forwarder: Arc<dyn Forwarder>,
    archiver: Option<StoreArchiver>,
    settings: SchedulerSettings,
}

impl Scheduler {
    pub fn new(
        registry: ServiceRegistry,
        forwarder: Arc<dyn Forwarder>,
        settings: SchedulerSettings,
    ) -> Self {
        let archiver = settings.archive_dir.as_ref().map(StoreArchiver::new);
        Self {
            registry,
            forwarder,
            archiver,
            settings,
        }
    }

    pub fn registry(&self) -> &ServiceRegistry {
        &self.registry
    }

    /// Run a service to completion on the current task.
    ///
    /// Returns the id the service was registered under; by the time this
    /// returns the id has been removed from the registry again.
    pub async fn run(&self, spec: ServiceSpec, worker: Arc<dyn Worker>) -> Result<Uuid, ServiceError> {
        let (handle, trigger) = self.admit(spec).await?;
        let id = handle.id();
        self.drive(handle, trigger, worker).await;
        Ok(id)
    }

    /// Validate and register a service, then drive it on its own task.
    pub async fn start(
        &self,
        spec: ServiceSpec,
        worker: Arc<dyn Worker>,
    ) -> Result<RunningService, ServiceError> {
        let (handle, trigger) = self.admit(spec).await?;
        let id = handle.id();

        let scheduler = self.clone();
        let task = tokio::spawn(async move {
            scheduler.drive(handle, trigger, worker).await;
        });

        Ok(RunningService { id, task })
    }

    async fn admit(
        &self,
        spec: ServiceSpec,
    ) -> Result<(Arc<ServiceHandle>, Option<DailyTrigger>), ServiceError> {
        let trigger = match spec.validate() {
            Ok(trigger) => trigger,
            Err(e) => {
                error!("Rejected service '{}': {}", spec.name, e);
                return Err(e);
            }
        };

        let handle = Arc::new(ServiceHandle::new(spec, self.settings.rotation_threshold));
        self.registry.register(handle.clone()).await;
        info!(
            service = %handle.sanitized_name(),
            id = %handle.id(),
            "Registered service '{}'",
            handle.name()
        );

        Ok((handle, trigger))
    }

    async fn drive(
        &self,
        handle: Arc<ServiceHandle>,
        trigger: Option<DailyTrigger>,
        worker: Arc<dyn Worker>,
    ) {
        let mut guard = DeregisterGuard::new(self.registry.clone(), handle.clone());
        let token = handle.cancellation_token().clone();
        let rerun = handle.spec().rerun;
        let (forwards, forward_task) = self.spawn_forward_task(&handle);
        let mut windows = 0u64;

        loop {
            if let Some(trigger) = &trigger {
                handle.set_phase(ServicePhase::Waiting).await;
                if !wait_for_trigger(&handle, trigger, &token).await {
                    break;
                }
            }

            handle.set_phase(ServicePhase::Running).await;
            self.run_window(&handle, &worker, &token, &forwards).await;
            windows += 1;

            if token.is_cancelled() || !rerun {
                break;
            }

            handle.set_phase(ServicePhase::Rotating).await;
            debug!(
                service = %handle.sanitized_name(),
                "Window {} complete, rerunning",
                windows
            );
        }

        // closing the queue lets the forward task deliver what is left; a
        // cancelled token makes it stop right away instead
        drop(forwards);
        if let Err(e) = forward_task.await {
            warn!(
                service = %handle.sanitized_name(),
                "Forward task ended abnormally: {}",
                e
            );
        }

        handle.set_phase(ServicePhase::Terminated).await;
        self.registry.remove(handle.id()).await;
        guard.disarm();

        if token.is_cancelled() {
            info!(
                service = %handle.sanitized_name(),
                id = %handle.id(),
                "Service cancelled after {} window(s)",
                windows
            );
        } else {
            info!(
                service = %handle.sanitized_name(),
                id = %handle.id(),
                "Service finished after {} window(s)",
                windows
            );
        }
    }

    /// One forwarding task per service, fed in order from a bounded queue.
    fn spawn_forward_task(&self, handle: &ServiceHandle) -> (mpsc::Sender<Record>, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::channel::<Record>(FORWARD_QUEUE_CAPACITY);
        let forwarder = self.forwarder.clone();
        let token = handle.cancellation_token().clone();
        let service = handle.sanitized_name().to_string();

        let task = tokio::spawn(async move {
            loop {
                let record = tokio::select! {
                    _ = token.cancelled() => break,
                    record = rx.recv() => match record {
                        Some(record) => record,
                        None => break,
                    },
                };

                tokio::select! {
                    _ = token.cancelled() => break,
                    result = forwarder.forward(&record) => {
                        if let Err(e) = result {
                            warn!(service = %service, "Failed to forward record: {}", e);
                        }
                    }
                }
            }
        });

        (tx, task)
    }

    /// Poll the worker every `refresh` until `runtime` has elapsed.
    async fn run_window(
        &self,
        handle: &Arc<ServiceHandle>,
        worker: &Arc<dyn Worker>,
        token: &CancellationToken,
        forwards: &mpsc::Sender<Record>,
    ) {
        let runtime = handle.spec().runtime();
        let refresh = handle.spec().refresh();
        let started = Instant::now();

        while started.elapsed() < runtime {
            if token.is_cancelled() {
                break;
            }

            self.run_cycle(handle, worker, forwards).await;

            tokio::select! {
                _ = token.cancelled() => break,
                _ = sleep(refresh) => {}
            }
        }
    }

    async fn run_cycle(
        &self,
        handle: &Arc<ServiceHandle>,
        worker: &Arc<dyn Worker>,
        forwards: &mpsc::Sender<Record>,
    ) {
        let service = handle.sanitized_name();
        let index = &handle.spec().index;

        let mut fetch: JoinHandle<SourceResult<Record>> = {
            let worker = worker.clone();
            tokio::spawn(async move { worker.fetch().await })
        };
        let outcome = timeout(self.settings.worker_timeout, &mut fetch).await;

        let report = {
            let mut store = handle.store().write().await;
            match outcome {
                Ok(Ok(Ok(mut record))) => {
                    if !index.is_empty() {
                        record.index = index.clone();
                    }
                    store.append(record);
                }
                Ok(Ok(Err(e))) => {
                    warn!(service = %service, "Worker '{}' failed: {}", worker.name(), e);
                    store.record_error(ServiceErrorKind::WorkerFailed, e.to_string());
                }
                Ok(Err(e)) => {
                    error!(service = %service, "Worker '{}' crashed: {}", worker.name(), e);
                    store.record_error(
                        ServiceErrorKind::WorkerFailed,
                        format!("worker task failed: {}", e),
                    );
                }
                Err(_) => {
                    fetch.abort();
                    warn!(
                        service = %service,
                        "Worker '{}' timed out after {:?}",
                        worker.name(),
                        self.settings.worker_timeout
                    );
                    store.record_error(
                        ServiceErrorKind::WorkerTimeout,
                        format!("no response within {:?}", self.settings.worker_timeout),
                    );
                }
            }
            store.complete_cycle()
        };

        if report.stalled {
            warn!(service = %service, "Store did not grow this cycle");
        }

        if let Some(record) = report.forward {
            match forwards.try_send(record) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!(service = %service, "Forward queue full, dropping record");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    warn!(service = %service, "Forward task gone, dropping record");
                }
            }
        }

        if let Some(rotated) = report.rotated {
            info!(
                service = %service,
                "Rotated store ({} records) at {}",
                rotated.len(),
                Utc::now().to_rfc3339()
            );
            if let Some(archiver) = &self.archiver {
                archiver.archive(service, &rotated).await;
            }
        }
    }
}

/// Removes a service from the registry if its driver exits without doing so.
struct DeregisterGuard {
    registry: ServiceRegistry,
    handle: Arc<ServiceHandle>,
    armed: bool,
}

impl DeregisterGuard {
    fn new(registry: ServiceRegistry, handle: Arc<ServiceHandle>) -> Self {
        Self {
            registry,
            handle,
            armed: true,
        }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for DeregisterGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let registry = self.registry.clone();
        let handle = self.handle.clone();
        warn!(
            service = %handle.sanitized_name(),
            id = %handle.id(),
            "Service driver exited unexpectedly, deregistering"
        );
        runtime.spawn(async move {
            handle.cancel();
            handle.set_phase(ServicePhase::Terminated).await;
            registry.remove(handle.id()).await;
        });
    }
}

/// Sleep until the next trigger. Returns `false` when cancelled first.
async fn wait_for_trigger(
    handle: &ServiceHandle,
    trigger: &DailyTrigger,
    token: &CancellationToken,
) -> bool {
    let now = Utc::now();
    let wait = trigger.duration_until_next(now);
    info!(
        service = %handle.sanitized_name(),
        "Next run at {} ({}s)",
        trigger.next_after(now),
        wait.as_secs()
    );

    tokio::select! {
        _ = token.cancelled() => false,
        _ = sleep(wait) => true,
    }
}

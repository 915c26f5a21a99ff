//! Process-wide registry of running services.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::store::Store;
use crate::models::{ServicePhase, ServiceSpec, ServiceSummary, StoreSnapshot};

/// Live state of one registered service.
///
/// The owning scheduler task is the only writer of the store; API readers go
/// through the same lock.
#[derive(Debug)]
pub struct ServiceHandle {
    id: Uuid,
    spec: ServiceSpec,
    sanitized_name: String,
    registered_at: DateTime<Utc>,
    cancel: CancellationToken,
    phase: RwLock<ServicePhase>,
    store: RwLock<Store>,
}

impl ServiceHandle {
    pub fn new(spec: ServiceSpec, rotation_threshold: usize) -> Self {
        Self {
            id: Uuid::new_v4(),
            sanitized_name: spec.sanitized_name(),
            spec,
            registered_at: Utc::now(),
            cancel: CancellationToken::new(),
            phase: RwLock::new(ServicePhase::Validating),
            store: RwLock::new(Store::new(rotation_threshold)),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn spec(&self) -> &ServiceSpec {
        &self.spec
    }

    pub fn name(&self) -> &str {
        &self.spec.name
    }

    pub fn sanitized_name(&self) -> &str {
        &self.sanitized_name
    }

    pub fn registered_at(&self) -> DateTime<Utc> {
        self.registered_at
    }

    /// Seconds since the service was registered.
    pub fn elapsed_seconds(&self) -> i64 {
        Utc::now()
            .signed_duration_since(self.registered_at)
            .num_seconds()
    }

    /// Signal cancellation. Safe to call any number of times from any task.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub async fn phase(&self) -> ServicePhase {
        *self.phase.read().await
    }

    pub async fn set_phase(&self, phase: ServicePhase) {
        *self.phase.write().await = phase;
    }

    pub fn store(&self) -> &RwLock<Store> {
        &self.store
    }

    pub async fn store_snapshot(&self) -> StoreSnapshot {
        self.store.read().await.snapshot()
    }

    pub async fn summary(&self) -> ServiceSummary {
        let phase = self.phase().await;
        let store = self.store.read().await;

        ServiceSummary {
            id: self.id,
            name: self.spec.name.clone(),
            sanitized_name: self.sanitized_name.clone(),
            index: self.spec.index.clone(),
            phase,
            rerun: self.spec.rerun,
            scheduled: self.spec.scheduled,
            registered_at: self.registered_at,
            elapsed_seconds: self.elapsed_seconds(),
            record_count: store.len(),
            error_count: store.errors().len(),
            counters: store.counters().clone(),
        }
    }
}

#[derive(Debug, Default)]
struct RegistryMaps {
    services: HashMap<Uuid, Arc<ServiceHandle>>,
    names: HashMap<String, Uuid>,
}

/// Concurrent map of running services, keyed by id and by sanitized name.
#[derive(Clone, Default)]
pub struct ServiceRegistry {
    inner: Arc<RwLock<RegistryMaps>>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a service under its id and its sanitized name.
    ///
    /// A later service with the same name takes over the name entry.
    pub async fn register(&self, handle: Arc<ServiceHandle>) {
        let mut maps = self.inner.write().await;
        maps.names
            .insert(handle.sanitized_name().to_string(), handle.id());
        maps.services.insert(handle.id(), handle);
    }

    /// Remove a service and every name entry that points at it.
    pub async fn remove(&self, id: Uuid) -> Option<Arc<ServiceHandle>> {
        let mut maps = self.inner.write().await;
        let removed = maps.services.remove(&id);
        maps.names.retain(|_, target| *target != id);
        removed
    }

    pub async fn get(&self, id: Uuid) -> Option<Arc<ServiceHandle>> {
        self.inner.read().await.services.get(&id).cloned()
    }

    /// Look up a service by display or sanitized name.
    pub async fn find_by_name(&self, name: &str) -> Option<Arc<ServiceHandle>> {
        let key = crate::utils::sanitize_name(name);
        let maps = self.inner.read().await;
        maps.names
            .get(&key)
            .and_then(|id| maps.services.get(id))
            .cloned()
    }

    pub async fn list(&self) -> Vec<Arc<ServiceHandle>> {
        self.inner.read().await.services.values().cloned().collect()
    }

    pub async fn names(&self) -> HashMap<String, Uuid> {
        self.inner.read().await.names.clone()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.services.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.services.is_empty()
    }

    /// Signal cancellation for one service. Returns `false` if the id is not
    /// registered.
    pub async fn cancel(&self, id: Uuid) -> bool {
        match self.get(id).await {
            Some(handle) => {
                handle.cancel();
                true
            }
            None => false,
        }
    }

    pub async fn cancel_all(&self) -> usize {
        let handles = self.list().await;
        for handle in &handles {
            handle.cancel();
        }
        handles.len()
    }
}

impl std::fmt::Debug for ServiceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceRegistry")
            .field(
                "service_count",
                &self.inner.try_read().map(|m| m.services.len()).unwrap_or(0),
            )
            .finish_non_exhaustive()
    }
}

//! Data source workers
//!
//! A [`Worker`] performs one fetch-and-parse cycle against an external source
//! and yields exactly one [`Record`]. Workers are looked up by service name
//! from a [`WorkerTable`] built at startup.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::config::WorkersConfig;
use crate::errors::{ServiceError, SourceResult};
use crate::models::Record;
use crate::utils::sanitize_name;

pub mod cpu;
pub mod http_json;

pub use cpu::CpuWorker;
pub use http_json::HttpJsonWorker;

#[async_trait]
pub trait Worker: Send + Sync {
    /// Short identifier used in logs.
    fn name(&self) -> &str;

    /// Run one fetch cycle.
    async fn fetch(&self) -> SourceResult<Record>;
}

/// Named registry of worker implementations, keyed by sanitized service name.
#[derive(Clone, Default)]
pub struct WorkerTable {
    workers: HashMap<String, Arc<dyn Worker>>,
}

impl WorkerTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the table from the `[workers]` configuration section.
    pub fn from_config(config: &WorkersConfig) -> Self {
        let mut table = Self::new();

        for cpu in &config.cpu {
            table.register(
                &cpu.name,
                CpuWorker::new(&cpu.index)
                    .with_sample_interval(Duration::from_secs(cpu.sample_secs))
                    .with_stat_path(&cpu.stat_path),
            );
        }

        for http in &config.http {
            table.register(
                &http.name,
                HttpJsonWorker::new(
                    &http.index,
                    http.urls.clone(),
                    Duration::from_secs(http.timeout_secs),
                ),
            );
        }

        debug!("Worker table built with {} workers", table.len());
        table
    }

    pub fn register<W: Worker + 'static>(&mut self, name: &str, worker: W) {
        self.register_arc(name, Arc::new(worker));
    }

    pub fn register_arc(&mut self, name: &str, worker: Arc<dyn Worker>) {
        self.workers.insert(sanitize_name(name), worker);
    }

    pub fn with_worker<W: Worker + 'static>(mut self, name: &str, worker: W) -> Self {
        self.register(name, worker);
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Worker>> {
        self.workers.get(&sanitize_name(name)).cloned()
    }

    /// Like [`get`](Self::get) but reports a missing worker as an error.
    pub fn resolve(&self, name: &str) -> Result<Arc<dyn Worker>, ServiceError> {
        self.get(name).ok_or_else(|| ServiceError::UnknownWorker {
            name: name.to_string(),
        })
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.workers.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }
}

impl std::fmt::Debug for WorkerTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerTable")
            .field("workers", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CpuWorkerConfig, HttpWorkerConfig};

    struct Fixed;

    #[async_trait]
    impl Worker for Fixed {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn fetch(&self) -> SourceResult<Record> {
            Ok(Record::new("fixed"))
        }
    }

    #[test]
    fn test_lookup_uses_sanitized_names() {
        let table = WorkerTable::new().with_worker("cpu monitor", Fixed);
        assert!(table.get("cpu monitor").is_some());
        assert!(table.get("cpu_monitor").is_some());
        assert!(table.get("gpu monitor").is_none());
        assert_eq!(table.names(), vec!["cpu_monitor".to_string()]);
    }

    #[test]
    fn test_resolve_unknown_worker() {
        let table = WorkerTable::new();
        assert!(matches!(
            table.resolve("weather"),
            Err(ServiceError::UnknownWorker { name }) if name == "weather"
        ));
    }

    #[test]
    fn test_from_config() {
        let config = WorkersConfig {
            cpu: vec![CpuWorkerConfig {
                name: "cpu monitor".to_string(),
                index: "cpuMon".to_string(),
                sample_secs: 1,
                stat_path: "/proc/stat".into(),
            }],
            http: vec![HttpWorkerConfig {
                name: "weather".to_string(),
                index: "weather".to_string(),
                urls: vec!["http://127.0.0.1:9/current.json".to_string()],
                timeout_secs: 5,
            }],
        };

        let table = WorkerTable::from_config(&config);
        assert_eq!(table.len(), 2);
        assert_eq!(table.get("weather").unwrap().name(), "http_json");
        assert_eq!(table.get("cpu monitor").unwrap().name(), "cpu");
    }
}

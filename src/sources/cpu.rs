//! CPU utilisation worker
//!
//! Samples `/proc/stat` twice, `sample_interval` apart, and reports the busy
//! percentage of every `cpu*` line as one entry.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::trace;

use super::Worker;
use crate::errors::{SourceError, SourceResult};
use crate::models::Record;

pub const DEFAULT_STAT_PATH: &str = "/proc/stat";
pub const DEFAULT_SAMPLE_INTERVAL: Duration = Duration::from_secs(2);

/// Cumulative jiffies for one `cpu*` line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CpuTimes {
    pub total: u64,
    pub idle: u64,
}

impl CpuTimes {
    /// Busy percentage between two samples of the same CPU.
    pub fn usage_since(&self, earlier: &CpuTimes) -> f64 {
        let total = self.total.saturating_sub(earlier.total);
        let idle = self.idle.saturating_sub(earlier.idle);
        if total == 0 {
            return 0.0;
        }
        100.0 * (total.saturating_sub(idle)) as f64 / total as f64
    }
}

/// Parse the `cpu*` lines of a `/proc/stat` dump.
///
/// Idle time is `idle + iowait` (fields 4 and 5).
pub fn parse_proc_stat(content: &str) -> SourceResult<BTreeMap<String, CpuTimes>> {
    let mut usage = BTreeMap::new();

    for line in content.lines() {
        let mut fields = line.split_whitespace();
        let Some(label) = fields.next() else {
            continue;
        };
        if !label.starts_with("cpu") {
            continue;
        }

        let mut times = CpuTimes::default();
        for (position, field) in fields.enumerate() {
            let value: u64 = field.parse().map_err(|_| {
                SourceError::parse_error("proc_stat", format!("bad field '{}' in {}", field, label))
            })?;
            times.total += value;
            // position 3 is idle, 4 is iowait
            if position == 3 || position == 4 {
                times.idle += value;
            }
        }
        usage.insert(label.to_string(), times);
    }

    if usage.is_empty() {
        return Err(SourceError::parse_error("proc_stat", "no cpu lines found"));
    }
    Ok(usage)
}

pub struct CpuWorker {
    index: String,
    sample_interval: Duration,
    stat_path: PathBuf,
}

impl CpuWorker {
    pub fn new<I: Into<String>>(index: I) -> Self {
        Self {
            index: index.into(),
            sample_interval: DEFAULT_SAMPLE_INTERVAL,
            stat_path: PathBuf::from(DEFAULT_STAT_PATH),
        }
    }

    pub fn with_sample_interval(mut self, interval: Duration) -> Self {
        self.sample_interval = interval;
        self
    }

    pub fn with_stat_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.stat_path = path.as_ref().to_path_buf();
        self
    }

    async fn sample(&self) -> SourceResult<BTreeMap<String, CpuTimes>> {
        let content = tokio::fs::read_to_string(&self.stat_path).await?;
        parse_proc_stat(&content)
    }
}

#[async_trait]
impl Worker for CpuWorker {
    fn name(&self) -> &str {
        "cpu"
    }

    async fn fetch(&self) -> SourceResult<Record> {
        let sampled_at = Utc::now();
        let first = self.sample().await?;
        tokio::time::sleep(self.sample_interval).await;
        let second = self.sample().await?;

        let mut record = Record::new(&self.index);
        for (name, later) in &second {
            let Some(earlier) = first.get(name) else {
                continue;
            };
            record.push_entry(json!({
                "name": name,
                "usage": later.usage_since(earlier),
                "time": sampled_at.to_rfc3339(),
            }));
        }

        trace!("cpu worker sampled {} cpus", record.entries.len());
        Ok(record)
    }
}

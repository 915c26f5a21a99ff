use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;
use uuid::Uuid;

use crate::errors::ServiceError;
use crate::utils::sanitize_name;
use crate::utils::time::DailyTrigger;

/// Configuration for one background collection service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServiceSpec {
    pub name: String,
    /// Sink routing key stamped onto every record this service produces.
    #[serde(default)]
    pub index: String,
    /// Length of one runtime window, in seconds.
    #[serde(rename = "runtime")]
    pub runtime_secs: u64,
    /// Delay between worker invocations, in seconds.
    #[serde(rename = "refresh")]
    pub refresh_secs: u64,
    #[serde(default)]
    pub rerun: bool,
    #[serde(default)]
    pub scheduled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_at: Option<StartAt>,
}

/// Daily start time for scheduled services.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StartAt {
    pub time: String,
    pub timezone: String,
}

impl ServiceSpec {
    pub fn new<N: Into<String>, I: Into<String>>(
        name: N,
        index: I,
        runtime_secs: u64,
        refresh_secs: u64,
    ) -> Self {
        Self {
            name: name.into(),
            index: index.into(),
            runtime_secs,
            refresh_secs,
            rerun: false,
            scheduled: false,
            start_at: None,
        }
    }

    pub fn with_rerun(mut self, rerun: bool) -> Self {
        self.rerun = rerun;
        self
    }

    pub fn scheduled_at<T: Into<String>, Z: Into<String>>(mut self, time: T, timezone: Z) -> Self {
        self.scheduled = true;
        self.start_at = Some(StartAt {
            time: time.into(),
            timezone: timezone.into(),
        });
        self
    }

    pub fn sanitized_name(&self) -> String {
        sanitize_name(&self.name)
    }

    pub fn runtime(&self) -> Duration {
        Duration::from_secs(self.runtime_secs)
    }

    pub fn refresh(&self) -> Duration {
        Duration::from_secs(self.refresh_secs)
    }

    /// Check the spec and resolve its daily trigger.
    ///
    /// Returns `Ok(None)` for immediate services and `Ok(Some(trigger))` for
    /// scheduled ones.
    pub fn validate(&self) -> Result<Option<DailyTrigger>, ServiceError> {
        if self.runtime_secs < 1 || self.refresh_secs < 1 {
            return Err(ServiceError::invalid_spec(
                &self.name,
                "runtime or refresh set to zero in config",
            ));
        }

        if !self.scheduled {
            return Ok(None);
        }

        let start_at = self.start_at.as_ref().ok_or_else(|| {
            ServiceError::invalid_spec(&self.name, "scheduled service has no start_at")
        })?;

        DailyTrigger::parse(&start_at.time, &start_at.timezone)
            .map(Some)
            .map_err(|message| ServiceError::invalid_spec(&self.name, message))
    }
}

/// One fetch result: an index label plus zero or more entries.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Record {
    pub index: String,
    #[serde(rename = "records", default)]
    pub entries: Vec<Map<String, Value>>,
}

impl Record {
    pub fn new<I: Into<String>>(index: I) -> Self {
        Self {
            index: index.into(),
            entries: Vec::new(),
        }
    }

    /// Append one entry. Non-object values are wrapped as `{"value": ...}`.
    pub fn push_entry(&mut self, value: Value) {
        match value {
            Value::Object(map) => self.entries.push(map),
            other => {
                let mut map = Map::new();
                map.insert("value".to_string(), other);
                self.entries.push(map);
            }
        }
    }

    pub fn with_entry(mut self, value: Value) -> Self {
        self.push_entry(value);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Lifecycle phase of a registered service.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ServicePhase {
    Validating,
    Waiting,
    Running,
    Rotating,
    Terminated,
}

/// Kinds of non-fatal faults recorded in a service's error log.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ServiceErrorKind {
    /// A cycle completed without the store growing.
    Stalled,
    /// The worker returned an error.
    WorkerFailed,
    /// The worker did not answer within the configured timeout.
    WorkerTimeout,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServiceErrorEntry {
    pub kind: ServiceErrorKind,
    pub message: String,
    pub iteration: u64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoreCounters {
    pub started_at: DateTime<Utc>,
    pub emptied_count: u64,
    pub iteration_count: u64,
    /// Store length as of the last cycle that saw growth.
    pub signature: usize,
}

/// Owned copy of a store, handed to API readers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreSnapshot {
    pub records: Vec<Record>,
    pub errors: Vec<ServiceErrorEntry>,
    pub counters: StoreCounters,
}

/// API view of one registered service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceSummary {
    pub id: Uuid,
    pub name: String,
    pub sanitized_name: String,
    pub index: String,
    pub phase: ServicePhase,
    pub rerun: bool,
    pub scheduled: bool,
    pub registered_at: DateTime<Utc>,
    pub elapsed_seconds: i64,
    pub record_count: usize,
    pub error_count: usize,
    pub counters: StoreCounters,
}

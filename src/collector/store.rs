//! Per-service record store: accumulation, stall detection and rotation.

use chrono::Utc;

use crate::models::{
    Record, ServiceErrorEntry, ServiceErrorKind, StoreCounters, StoreSnapshot,
};

/// Store length above which accumulated records are discarded.
pub const DEFAULT_ROTATION_THRESHOLD: usize = 200;

/// Oldest error entries are dropped beyond this many.
pub const ERROR_LOG_CAPACITY: usize = 1000;

/// What the scheduler has to do after a cycle has been handled.
#[derive(Debug, Default)]
pub struct CycleReport {
    /// Newest record, present when the store grew this cycle.
    pub forward: Option<Record>,
    pub stalled: bool,
    /// Records discarded by rotation.
    pub rotated: Option<Vec<Record>>,
}

#[derive(Debug)]
pub struct Store {
    records: Vec<Record>,
    errors: Vec<ServiceErrorEntry>,
    counters: StoreCounters,
    rotation_threshold: usize,
}

impl Store {
    pub fn new(rotation_threshold: usize) -> Self {
        Self {
            records: Vec::new(),
            errors: Vec::new(),
            counters: StoreCounters {
                started_at: Utc::now(),
                emptied_count: 0,
                iteration_count: 0,
                signature: 0,
            },
            rotation_threshold,
        }
    }

    pub fn append(&mut self, record: Record) {
        self.records.push(record);
    }

    pub fn record_error<M: Into<String>>(&mut self, kind: ServiceErrorKind, message: M) {
        self.errors.push(ServiceErrorEntry {
            kind,
            message: message.into(),
            iteration: self.counters.iteration_count,
            occurred_at: Utc::now(),
        });

        if self.errors.len() > ERROR_LOG_CAPACITY {
            let excess = self.errors.len() - ERROR_LOG_CAPACITY;
            self.errors.drain(..excess);
        }
    }

    /// Close the current cycle: compare the length against the signature,
    /// pick the record to forward and rotate if the threshold is exceeded.
    ///
    /// Forwarding is decided before rotation, so the record that triggers a
    /// rotation is still forwarded.
    pub fn complete_cycle(&mut self) -> CycleReport {
        self.counters.iteration_count += 1;
        let mut report = CycleReport::default();
        let len = self.records.len();

        if len > self.counters.signature {
            self.counters.signature = len;
            report.forward = self.records.last().cloned();
        } else {
            report.stalled = true;
            self.record_error(
                ServiceErrorKind::Stalled,
                format!("store did not grow (length {})", len),
            );
        }

        if len > self.rotation_threshold {
            report.rotated = Some(std::mem::take(&mut self.records));
            self.counters.emptied_count += 1;
            self.counters.signature = 0;
        }

        report
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn errors(&self) -> &[ServiceErrorEntry] {
        &self.errors
    }

    pub fn counters(&self) -> &StoreCounters {
        &self.counters
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn snapshot(&self) -> StoreSnapshot {
        StoreSnapshot {
            records: self.records.clone(),
            errors: self.errors.clone(),
            counters: self.counters.clone(),
        }
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new(DEFAULT_ROTATION_THRESHOLD)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(n: usize) -> Record {
        Record::new("test").with_entry(json!({ "n": n }))
    }

    #[test]
    fn test_growth_updates_signature_and_forwards_newest() {
        let mut store = Store::new(10);
        store.append(record(1));
        let report = store.complete_cycle();

        assert!(!report.stalled);
        assert_eq!(report.forward, Some(record(1)));
        assert_eq!(store.counters().signature, 1);
        assert_eq!(store.counters().iteration_count, 1);

        store.append(record(2));
        let report = store.complete_cycle();
        assert_eq!(report.forward, Some(record(2)));
        assert_eq!(store.counters().signature, 2);
    }

    #[test]
    fn test_no_growth_is_recorded_as_stall() {
        let mut store = Store::new(10);
        store.append(record(1));
        store.complete_cycle();

        let report = store.complete_cycle();
        assert!(report.stalled);
        assert!(report.forward.is_none());
        assert_eq!(store.errors().len(), 1);
        assert_eq!(store.errors()[0].kind, ServiceErrorKind::Stalled);
        assert_eq!(store.errors()[0].iteration, 2);
        assert_eq!(store.counters().signature, 1);
    }

    #[test]
    fn test_threshold_plus_one_rotates_exactly_once() {
        let threshold = 5;
        let mut store = Store::new(threshold);
        let mut rotations = 0;
        let mut forwarded = 0;

        for n in 0..=threshold {
            store.append(record(n));
            let report = store.complete_cycle();
            if report.forward.is_some() {
                forwarded += 1;
            }
            if let Some(rotated) = report.rotated {
                rotations += 1;
                assert_eq!(rotated.len(), threshold + 1);
            }
        }

        assert_eq!(rotations, 1);
        assert_eq!(forwarded, threshold + 1);
        assert!(store.is_empty());
        assert_eq!(store.counters().emptied_count, 1);
        assert_eq!(store.counters().signature, 0);
    }

    #[test]
    fn test_first_cycle_after_rotation_is_not_a_stall() {
        let mut store = Store::new(1);
        store.append(record(1));
        store.complete_cycle();
        store.append(record(2));
        assert!(store.complete_cycle().rotated.is_some());

        store.append(record(3));
        let report = store.complete_cycle();
        assert!(!report.stalled);
        assert_eq!(store.counters().signature, 1);
    }

    #[test]
    fn test_error_log_is_bounded() {
        let mut store = Store::new(10);
        for _ in 0..(ERROR_LOG_CAPACITY + 5) {
            store.record_error(ServiceErrorKind::WorkerTimeout, "timed out");
        }
        assert_eq!(store.errors().len(), ERROR_LOG_CAPACITY);
    }
}

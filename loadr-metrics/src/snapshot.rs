use std::collections::BTreeMap;
use std::time::Duration;

use crate::outcome::ErrorKind;
use crate::trend::Trend;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestStats {
    pub count: u64,
    pub success: u64,
    pub failure: u64,
    pub bytes_received: u64,
    pub bytes_sent: u64,
    /// Latency of every outcome that reached the transport (script errors excluded).
    pub latency: Trend,
}

impl RequestStats {
    /// Failed / total; `None` until the first outcome is recorded.
    pub fn failure_rate(&self) -> Option<f64> {
        (self.count > 0).then(|| self.failure as f64 / self.count as f64)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct IterationStats {
    pub count: u64,
    pub script_errors: u64,
    pub duration: Trend,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckTally {
    pub name: String,
    pub passes: u64,
    pub fails: u64,
}

impl CheckTally {
    pub fn total(&self) -> u64 {
        self.passes.saturating_add(self.fails)
    }
}

/// Point-in-time copy of everything the recorder has accumulated.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricSnapshot {
    /// Time since the run clock started (zero if it never started).
    pub elapsed: Duration,
    pub requests: RequestStats,
    pub iterations: IterationStats,
    /// Sorted by name.
    pub checks: Vec<CheckTally>,
    pub errors_by_kind: BTreeMap<ErrorKind, u64>,
    pub status_codes: BTreeMap<u16, u64>,
}

impl MetricSnapshot {
    pub fn checks_passed(&self) -> u64 {
        self.checks.iter().map(|c| c.passes).sum()
    }

    pub fn checks_failed(&self) -> u64 {
        self.checks.iter().map(|c| c.fails).sum()
    }

    /// Pass ratio across all checks; `None` when no check ran.
    pub fn checks_rate(&self) -> Option<f64> {
        let passes = self.checks_passed();
        let total = passes.saturating_add(self.checks_failed());
        (total > 0).then(|| passes as f64 / total as f64)
    }

    pub fn errors_of(&self, kind: ErrorKind) -> u64 {
        self.errors_by_kind.get(&kind).copied().unwrap_or(0)
    }

    /// True when requests were attempted and not a single one reached the target.
    pub fn no_connection_established(&self) -> bool {
        let attempts = self
            .requests
            .count
            .saturating_sub(self.errors_of(ErrorKind::ScriptError));
        attempts > 0 && self.errors_of(ErrorKind::Connect) == attempts
    }

    /// Per-second rate of `value` over the snapshot's elapsed time.
    pub fn per_second(&self, value: u64) -> Option<f64> {
        let secs = self.elapsed.as_secs_f64();
        (secs > 0.0).then(|| value as f64 / secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_rate_is_none_without_requests() {
        let s = MetricSnapshot::default();
        assert_eq!(s.requests.failure_rate(), None);
        assert_eq!(s.checks_rate(), None);
        assert_eq!(s.per_second(10), None);
    }

    #[test]
    fn no_connection_ignores_script_errors() {
        let mut s = MetricSnapshot::default();
        s.requests.count = 5;
        s.requests.failure = 5;
        s.errors_by_kind.insert(ErrorKind::Connect, 3);
        s.errors_by_kind.insert(ErrorKind::ScriptError, 2);
        assert!(s.no_connection_established());

        s.errors_by_kind.insert(ErrorKind::Connect, 2);
        s.errors_by_kind.insert(ErrorKind::Status, 1);
        assert!(!s.no_connection_established());
    }

    #[test]
    fn checks_rate_counts_passes_over_total() {
        let s = MetricSnapshot {
            checks: vec![
                CheckTally {
                    name: "a".to_string(),
                    passes: 3,
                    fails: 1,
                },
                CheckTally {
                    name: "b".to_string(),
                    passes: 4,
                    fails: 0,
                },
            ],
            ..MetricSnapshot::default()
        };
        assert_eq!(s.checks_failed(), 1);
        assert_eq!(s.checks_rate(), Some(7.0 / 8.0));
    }
}

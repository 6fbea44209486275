use std::time::Duration;

use loadr_metrics::MetricSnapshot;

use crate::signal::StopReason;
use crate::thresholds::ThresholdVerdict;

/// A condition that fails the run regardless of thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum FatalCondition {
    /// Requests were attempted but none of them ever reached the target.
    NoConnectionEstablished,
}

/// Facts about the run that only the scheduler knows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunInfo {
    pub stop_reason: StopReason,
    pub incomplete_iterations: u64,
    pub elapsed: Duration,
    pub max_active_vus: u64,
}

#[derive(Debug, Clone)]
pub struct RunResult {
    pub snapshot: MetricSnapshot,
    pub verdicts: Vec<ThresholdVerdict>,
    pub passed: bool,
    pub stop_reason: StopReason,
    pub fatal: Option<FatalCondition>,
    /// Iterations still in flight when the grace period ran out.
    pub incomplete_iterations: u64,
    pub elapsed: Duration,
    pub max_active_vus: u64,
}

impl RunResult {
    pub fn thresholds_passed(&self) -> bool {
        self.verdicts.iter().all(|v| v.passed)
    }

    pub fn failed_verdicts(&self) -> impl Iterator<Item = &ThresholdVerdict> {
        self.verdicts.iter().filter(|v| !v.passed)
    }
}

/// Overall = every verdict passed and no fatal condition was hit.
pub fn finalize(
    snapshot: MetricSnapshot,
    verdicts: Vec<ThresholdVerdict>,
    info: RunInfo,
) -> RunResult {
    let fatal = snapshot
        .no_connection_established()
        .then_some(FatalCondition::NoConnectionEstablished);
    let passed = fatal.is_none() && verdicts.iter().all(|v| v.passed);

    RunResult {
        snapshot,
        verdicts,
        passed,
        stop_reason: info.stop_reason,
        fatal,
        incomplete_iterations: info.incomplete_iterations,
        elapsed: info.elapsed,
        max_active_vus: info.max_active_vus,
    }
}

#[cfg(test)]
mod tests {
    use loadr_metrics::{ErrorKind, Recorder, RequestOutcome};

    use super::*;
    use crate::thresholds::{ThresholdSpec, evaluate};

    fn info() -> RunInfo {
        RunInfo {
            stop_reason: StopReason::DurationElapsed,
            incomplete_iterations: 0,
            elapsed: Duration::from_secs(1),
            max_active_vus: 1,
        }
    }

    fn spec(raw: &str) -> ThresholdSpec {
        ThresholdSpec::parse(raw).unwrap_or_else(|e| panic!("{e}"))
    }

    #[test]
    fn no_thresholds_and_healthy_traffic_passes() {
        let rec = Recorder::with_shards(1);
        rec.record(&RequestOutcome::from_status(Duration::from_millis(2), 200, 10, 10));

        let result = finalize(rec.snapshot(), Vec::new(), info());
        assert!(result.passed);
        assert!(result.fatal.is_none());
    }

    #[test]
    fn no_requests_at_all_is_not_fatal() {
        let result = finalize(MetricSnapshot::default(), Vec::new(), info());
        assert!(result.passed);
    }

    #[test]
    fn all_connect_errors_is_fatal() {
        let rec = Recorder::with_shards(1);
        for _ in 0..3 {
            rec.record(&RequestOutcome::from_error(
                Duration::from_millis(1),
                ErrorKind::Connect,
                40,
            ));
        }
        let snapshot = rec.snapshot();
        let verdicts = evaluate(&snapshot, &[spec("http_reqs: count>0")]);

        let result = finalize(snapshot, verdicts, info());
        assert!(result.thresholds_passed());
        assert_eq!(result.fatal, Some(FatalCondition::NoConnectionEstablished));
        assert!(!result.passed);
    }

    #[test]
    fn any_failing_verdict_fails_the_run() {
        let rec = Recorder::with_shards(1);
        rec.record(&RequestOutcome::from_status(Duration::from_millis(50), 200, 10, 10));
        let snapshot = rec.snapshot();
        let verdicts = evaluate(
            &snapshot,
            &[spec("http_req_duration: p(95)<1"), spec("http_reqs: count>=1")],
        );

        let result = finalize(snapshot, verdicts, info());
        assert!(!result.passed);
        assert_eq!(result.failed_verdicts().count(), 1);
    }
}

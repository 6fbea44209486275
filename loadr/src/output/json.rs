use serde::Serialize;
use std::collections::BTreeMap;
use std::io::Write as _;
use std::sync::Arc;

use loadr_core::metrics::{Trend, TrendSummary};

use super::{OutputFormatter, RunHeader};

pub(crate) struct JsonOutput;

impl OutputFormatter for JsonOutput {
    fn print_header(&self, _header: &RunHeader<'_>) {}

    fn progress(&self) -> Option<loadr_core::ProgressFn> {
        Some(Arc::new(move |u: loadr_core::ProgressUpdate| {
            let line = build_progress_line(&u);
            emit_json_line(&line);
        }))
    }

    fn print_summary(&self, result: &loadr_core::RunResult) -> anyhow::Result<()> {
        let line = build_summary_line(result);
        emit_json_line(&line);
        Ok(())
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonProgressLine {
    pub kind: &'static str,
    pub elapsed_secs: f64,
    pub interval_secs: f64,
    pub active_vus: u64,
    pub target_vus: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<usize>,

    pub requests_per_sec: f64,
    pub iterations_per_sec: f64,
    pub bytes_received_per_sec: f64,
    pub bytes_sent_per_sec: f64,
    pub error_rate: f64,

    pub total_requests: u64,
    pub total_failed_requests: u64,
    pub total_bytes_received: u64,
    pub total_bytes_sent: u64,
    pub checks_failed_total: u64,

    pub latency_p50: Option<f64>,
    pub latency_p95: Option<f64>,
    pub latency_max: Option<f64>,

    pub req_per_sec_avg: f64,
    pub req_per_sec_stdev: f64,
    pub req_per_sec_max: f64,
}

fn build_progress_line(u: &loadr_core::ProgressUpdate) -> JsonProgressLine {
    let snap = &u.snapshot;
    let latency = &snap.requests.latency;

    JsonProgressLine {
        kind: "progress",
        elapsed_secs: u.elapsed.as_secs_f64(),
        interval_secs: u.interval.as_secs_f64(),
        active_vus: u.active_vus,
        target_vus: u.target_vus,
        stage: u.stage.as_ref().map(|s| s.index + 1),

        requests_per_sec: u.rates.requests_per_sec,
        iterations_per_sec: u.rates.iterations_per_sec,
        bytes_received_per_sec: u.rates.bytes_received_per_sec,
        bytes_sent_per_sec: u.rates.bytes_sent_per_sec,
        error_rate: u.rates.error_rate,

        total_requests: snap.requests.count,
        total_failed_requests: snap.requests.failure,
        total_bytes_received: snap.requests.bytes_received,
        total_bytes_sent: snap.requests.bytes_sent,
        checks_failed_total: snap.checks_failed(),

        latency_p50: latency.percentile_ms(50.0),
        latency_p95: latency.percentile_ms(95.0),
        latency_max: latency.max_ms(),

        req_per_sec_avg: u.rates.rps_avg,
        req_per_sec_stdev: u.rates.rps_stdev,
        req_per_sec_max: u.rates.rps_max,
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonSummaryLine {
    pub kind: &'static str,
    pub passed: bool,
    pub stop_reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aborted_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fatal: Option<String>,
    pub elapsed_secs: f64,
    pub max_active_vus: u64,
    pub incomplete_iterations: u64,

    pub totals: JsonTotals,
    pub http_req_duration: JsonTrend,
    pub iteration_duration: JsonTrend,
    pub status_codes: BTreeMap<u16, u64>,
    pub errors: BTreeMap<String, u64>,
    pub checks: Vec<JsonCheck>,
    pub thresholds: Vec<JsonThreshold>,
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonTotals {
    pub requests_total: u64,
    pub failed_requests_total: u64,
    pub bytes_received_total: u64,
    pub bytes_sent_total: u64,
    pub iterations_total: u64,
    pub script_errors_total: u64,
    pub checks_failed_total: u64,
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonTrend {
    pub avg: Option<f64>,
    pub min: Option<f64>,
    pub med: Option<f64>,
    pub p90: Option<f64>,
    pub p95: Option<f64>,
    pub p99: Option<f64>,
    pub max: Option<f64>,
    pub stdev: Option<f64>,
    pub count: u64,
}

impl From<&Trend> for JsonTrend {
    fn from(trend: &Trend) -> Self {
        let TrendSummary {
            p50,
            p90,
            p95,
            p99,
            min,
            max,
            mean,
            stdev,
            count,
        } = trend.summary();

        Self {
            avg: mean,
            min,
            med: p50,
            p90,
            p95,
            p99,
            max,
            stdev,
            count,
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonCheck {
    pub name: String,
    pub passes: u64,
    pub fails: u64,
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonThreshold {
    pub metric: String,
    pub expression: String,
    pub abort_on_fail: bool,
    pub observed: Option<f64>,
    pub passed: bool,
}

fn build_summary_line(result: &loadr_core::RunResult) -> JsonSummaryLine {
    let snap = &result.snapshot;

    let aborted_by = match &result.stop_reason {
        loadr_core::StopReason::ThresholdAbort { threshold } => Some(threshold.clone()),
        _ => None,
    };

    JsonSummaryLine {
        kind: "summary",
        passed: result.passed,
        stop_reason: result.stop_reason.to_string(),
        aborted_by,
        fatal: result.fatal.map(|f| f.to_string()),
        elapsed_secs: result.elapsed.as_secs_f64(),
        max_active_vus: result.max_active_vus,
        incomplete_iterations: result.incomplete_iterations,

        totals: JsonTotals {
            requests_total: snap.requests.count,
            failed_requests_total: snap.requests.failure,
            bytes_received_total: snap.requests.bytes_received,
            bytes_sent_total: snap.requests.bytes_sent,
            iterations_total: snap.iterations.count,
            script_errors_total: snap.iterations.script_errors,
            checks_failed_total: snap.checks_failed(),
        },
        http_req_duration: JsonTrend::from(&snap.requests.latency),
        iteration_duration: JsonTrend::from(&snap.iterations.duration),
        status_codes: snap.status_codes.clone(),
        errors: snap
            .errors_by_kind
            .iter()
            .map(|(kind, n)| (kind.to_string(), *n))
            .collect(),
        checks: snap
            .checks
            .iter()
            .map(|c| JsonCheck {
                name: c.name.clone(),
                passes: c.passes,
                fails: c.fails,
            })
            .collect(),
        thresholds: result
            .verdicts
            .iter()
            .map(|v| JsonThreshold {
                metric: v.spec.metric.to_string(),
                expression: v.spec.source.clone(),
                abort_on_fail: v.spec.abort_on_fail,
                observed: v.observed,
                passed: v.passed,
            })
            .collect(),
    }
}

fn emit_json_line<T: Serialize>(line: &T) {
    let mut out = std::io::stdout().lock();
    if serde_json::to_writer(&mut out, line).is_ok() {
        let _ = writeln!(out);
        let _ = out.flush();
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use loadr_core::metrics::{Recorder, RequestOutcome};
    use loadr_core::{RunInfo, StopReason, ThresholdSpec, evaluate, finalize};
    use serde_json::Value;

    use super::*;

    #[test]
    fn summary_line_has_kind_totals_and_verdicts() {
        let rec = Recorder::with_shards(1);
        rec.record(&RequestOutcome::from_status(Duration::from_millis(5), 200, 64, 32));
        rec.record_check("status is 200", true);
        let snapshot = rec.snapshot();
        let specs =
            vec![ThresholdSpec::parse("http_reqs: count>=1").unwrap_or_else(|e| panic!("{e}"))];
        let verdicts = evaluate(&snapshot, &specs);

        let result = finalize(
            snapshot,
            verdicts,
            RunInfo {
                stop_reason: StopReason::ThresholdAbort {
                    threshold: "http_reqs: count>=1".to_string(),
                },
                incomplete_iterations: 1,
                elapsed: Duration::from_secs(1),
                max_active_vus: 2,
            },
        );

        let v: Value = serde_json::to_value(build_summary_line(&result))
            .unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(v["kind"], "summary");
        assert_eq!(v["passed"], true);
        assert_eq!(v["stop_reason"], "threshold_abort");
        assert_eq!(v["aborted_by"], "http_reqs: count>=1");
        assert!(v.get("fatal").is_none());
        assert_eq!(v["incomplete_iterations"], 1);
        assert_eq!(v["totals"]["requests_total"], 1);
        assert_eq!(v["totals"]["bytes_sent_total"], 32);
        assert_eq!(v["status_codes"]["200"], 1);
        assert_eq!(v["checks"][0]["name"], "status is 200");
        assert_eq!(v["thresholds"][0]["metric"], "http_reqs");
        assert_eq!(v["thresholds"][0]["observed"], 1.0);
        assert_eq!(v["http_req_duration"]["count"], 1);
    }
}

use std::fmt::Write as _;

use loadr_core::RunResult;
use loadr_core::metrics::Trend;

use super::format::{format_bytes, format_elapsed, format_ms, format_percent, format_rate};

pub(crate) fn render(result: &RunResult) -> String {
    let mut out = String::new();
    let snap = &result.snapshot;
    let req = &snap.requests;

    out.push_str("summary\n");
    writeln!(
        &mut out,
        "  stopped: {} after {} (max vus {})",
        result.stop_reason,
        format_elapsed(result.elapsed),
        result.max_active_vus
    )
    .ok();
    if let loadr_core::StopReason::ThresholdAbort { threshold } = &result.stop_reason {
        writeln!(&mut out, "  aborted by: {threshold}").ok();
    }

    writeln!(
        &mut out,
        "  requests: {} (failed {}, {})",
        req.count,
        req.failure,
        format_percent(req.failure_rate().unwrap_or(0.0))
    )
    .ok();
    writeln!(
        &mut out,
        "  iterations: {} (script errors {}, incomplete {})",
        snap.iterations.count, snap.iterations.script_errors, result.incomplete_iterations
    )
    .ok();
    writeln!(
        &mut out,
        "  bytes: recv {} sent {}",
        format_bytes(req.bytes_received),
        format_bytes(req.bytes_sent)
    )
    .ok();

    let secs = result.elapsed.as_secs_f64().max(1e-9);
    let throughput = req.bytes_received.saturating_add(req.bytes_sent);
    writeln!(
        &mut out,
        "  rates: rps={} tps={}/s",
        format_rate(req.count as f64 / secs),
        format_bytes((throughput as f64 / secs).round() as u64)
    )
    .ok();

    render_trend("http_req_duration", &req.latency, &mut out);
    render_trend("iteration_duration", &snap.iterations.duration, &mut out);

    if !snap.status_codes.is_empty() {
        let codes = snap
            .status_codes
            .iter()
            .map(|(code, n)| format!("{code}={n}"))
            .collect::<Vec<_>>()
            .join(" ");
        writeln!(&mut out, "  status: {codes}").ok();
    }

    if !snap.errors_by_kind.is_empty() {
        let errors = snap
            .errors_by_kind
            .iter()
            .map(|(kind, n)| format!("{kind}={n}"))
            .collect::<Vec<_>>()
            .join(" ");
        writeln!(&mut out, "  errors: {errors}").ok();
    }

    if !snap.checks.is_empty() {
        out.push_str("\nchecks\n");
        for c in &snap.checks {
            let mark = if c.fails == 0 { "ok  " } else { "FAIL" };
            let ratio = c.passes as f64 / c.total().max(1) as f64;
            writeln!(
                &mut out,
                "  {mark} {}: {} ({}/{})",
                c.name,
                format_percent(ratio),
                c.passes,
                c.total()
            )
            .ok();
        }
    }

    if !result.verdicts.is_empty() {
        out.push_str("\nthresholds\n");
        for v in &result.verdicts {
            let mark = if v.passed { "ok  " } else { "FAIL" };
            match v.observed {
                Some(obs) => writeln!(&mut out, "  {mark} {} (observed {obs:.4})", v.spec).ok(),
                None => writeln!(&mut out, "  {mark} {} (no samples)", v.spec).ok(),
            };
        }
    }

    out.push('\n');
    match (&result.fatal, result.passed) {
        (Some(fatal), _) => writeln!(&mut out, "result: FAILED ({fatal})").ok(),
        (None, true) => writeln!(&mut out, "result: PASSED").ok(),
        (None, false) => writeln!(
            &mut out,
            "result: FAILED ({} of {} thresholds)",
            result.failed_verdicts().count(),
            result.verdicts.len()
        )
        .ok(),
    };

    out
}

fn render_trend(name: &str, trend: &Trend, out: &mut String) {
    if trend.is_empty() {
        writeln!(out, "  {name}: n/a").ok();
        return;
    }

    let s = trend.summary();
    writeln!(
        out,
        "  {name}: avg={} min={} med={} p90={} p95={} p99={} max={} (n={})",
        format_ms(s.mean),
        format_ms(s.min),
        format_ms(s.p50),
        format_ms(s.p90),
        format_ms(s.p95),
        format_ms(s.p99),
        format_ms(s.max),
        s.count
    )
    .ok();
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use loadr_core::metrics::{ErrorKind, Recorder, RequestOutcome};
    use loadr_core::{RunInfo, StopReason, ThresholdSpec, evaluate, finalize};

    use super::*;

    fn info() -> RunInfo {
        RunInfo {
            stop_reason: StopReason::DurationElapsed,
            incomplete_iterations: 0,
            elapsed: Duration::from_secs(2),
            max_active_vus: 3,
        }
    }

    #[test]
    fn renders_checks_thresholds_and_verdict() {
        let rec = Recorder::with_shards(1);
        rec.record(&RequestOutcome::from_status(Duration::from_millis(20), 200, 100, 50));
        rec.record(&RequestOutcome::from_status(Duration::from_millis(30), 500, 100, 50));
        rec.record_check("status is 200", true);
        rec.record_check("status is 200", false);

        let snapshot = rec.snapshot();
        let specs = vec![
            ThresholdSpec::parse("http_req_failed: rate<0.01").unwrap_or_else(|e| panic!("{e}")),
        ];
        let verdicts = evaluate(&snapshot, &specs);
        let text = render(&finalize(snapshot, verdicts, info()));

        assert!(text.contains("requests: 2 (failed 1, 50.00%)"), "{text}");
        assert!(text.contains("status: 200=1 500=1"), "{text}");
        assert!(text.contains("FAIL status is 200: 50.00% (1/2)"), "{text}");
        assert!(text.contains("FAIL http_req_failed: rate<0.01 (observed 0.5000)"), "{text}");
        assert!(text.contains("result: FAILED (1 of 1 thresholds)"), "{text}");
    }

    #[test]
    fn fatal_condition_is_named() {
        let rec = Recorder::with_shards(1);
        rec.record(&RequestOutcome::from_error(
            Duration::from_millis(1),
            ErrorKind::Connect,
            0,
        ));

        let text = render(&finalize(rec.snapshot(), Vec::new(), info()));
        assert!(text.contains("errors: connect=1"), "{text}");
        assert!(text.contains("result: FAILED (no_connection_established)"), "{text}");
        assert!(text.contains("http_req_duration"), "{text}");
    }
}

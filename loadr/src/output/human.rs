use std::sync::Arc;

mod format;
mod progress;
mod summary;

use format::{format_bytes, format_elapsed, format_rate};
use progress::HumanProgress;
use summary::render;

use super::{OutputFormatter, RunHeader};

pub(crate) struct HumanReadableOutput {
    progress: Arc<HumanProgress>,
}

impl HumanReadableOutput {
    pub(crate) fn new() -> Self {
        Self {
            progress: Arc::new(HumanProgress::new()),
        }
    }
}

impl OutputFormatter for HumanReadableOutput {
    fn print_header(&self, header: &RunHeader<'_>) {
        let plan = header.plan;
        println!("target: {}", header.target);
        println!(
            "vus: max={} duration={} stages={} ramp={} grace={}",
            plan.max_vus(),
            format_elapsed(plan.total_duration()),
            plan.schedule.stages().len(),
            plan.schedule.mode(),
            format_elapsed(plan.grace_period),
        );
        for spec in &plan.thresholds {
            let abort = if spec.abort_on_fail { " (abort on fail)" } else { "" };
            println!("threshold: {spec}{abort}");
        }
        println!();
    }

    fn progress(&self) -> Option<loadr_core::ProgressFn> {
        let progress = self.progress.clone();

        Some(Arc::new(move |u: loadr_core::ProgressUpdate| {
            let failed_total = u.snapshot.requests.failure;
            let failed_delta =
                (u.rates.failed_per_sec * u.interval.as_secs_f64()).round() as u64;
            let throughput = u.rates.bytes_received_per_sec + u.rates.bytes_sent_per_sec;

            let mut message = format!(
                "vus={}/{} elapsed={} iters/s={} rps={} tps={}/s errors={failed_delta}/{failed_total}",
                u.active_vus,
                u.target_vus,
                format_elapsed(u.elapsed),
                format_rate(u.rates.iterations_per_sec),
                format_rate(u.rates.requests_per_sec),
                format_bytes(throughput.round() as u64),
            );

            let checks_failed = u.snapshot.checks_failed();
            if checks_failed > 0 {
                message.push_str(&format!(" checks_failed={checks_failed}"));
            }

            if let Some(stage) = u.stage.as_ref().filter(|s| s.count > 1) {
                message = format!(
                    "stage={}/{} target={} {message}",
                    stage.index + 1,
                    stage.count,
                    stage.current_target
                );
            }

            progress.update(u.total_duration, u.elapsed, message);
        }))
    }

    fn print_summary(&self, result: &loadr_core::RunResult) -> anyhow::Result<()> {
        self.progress.finish();
        print!("{}", render(result));
        Ok(())
    }
}

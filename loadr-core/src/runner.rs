use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::time::{Duration, Instant};

use futures::FutureExt as _;
use loadr_metrics::{IterationOutcome, IterationStatus, RequestOutcome};

use crate::iteration::Iteration;
use crate::vu::{VuContext, VuState};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IterationReport {
    pub status: IterationStatus,
    pub duration: Duration,
    /// Request outcomes recorded by this iteration.
    pub requests: u64,
    pub error: Option<String>,
}

/// Runs `iteration` once for `vu`. Failures and panics inside user code are
/// recorded as `script_error` and never propagate.
pub async fn run_iteration(vu: &VuContext, iteration: &dyn Iteration) -> IterationReport {
    let _ = vu.take_request_count();
    let started = Instant::now();

    let result = AssertUnwindSafe(iteration.call(vu.clone()))
        .catch_unwind()
        .await;
    let duration = started.elapsed();

    let error = match result {
        Ok(Ok(())) => None,
        Ok(Err(e)) => Some(e.0),
        Err(panic) => Some(format!("panic: {}", panic_message(panic.as_ref()))),
    };

    let status = if let Some(message) = &error {
        tracing::debug!(vu = vu.vu_id(), error = %message, "iteration failed");
        vu.recorder().record(&RequestOutcome::script_error(duration));
        IterationStatus::ScriptError
    } else {
        IterationStatus::Completed
    };

    vu.recorder()
        .record_iteration(&IterationOutcome { duration, status });

    IterationReport {
        status,
        duration,
        requests: vu.take_request_count(),
        error,
    }
}

/// The VU loop: iterate back to back until a stop is requested, checked
/// between iterations only.
pub(crate) async fn run_vu(vu: VuContext, iteration: std::sync::Arc<dyn Iteration>) {
    vu.virtual_user().set_state(VuState::Running);
    while !vu.is_stopping() {
        run_iteration(&vu, iteration.as_ref()).await;
    }
    vu.virtual_user().set_state(VuState::Stopped);
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown panic payload"
    }
}

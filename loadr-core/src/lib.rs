mod config;
mod error;
mod iteration;
mod progress;
mod runner;
mod schedule;
mod scheduler;
mod signal;
mod summary;
mod thresholds;
mod vu;

pub mod http;

pub use config::{
    DEFAULT_GRACE_PERIOD, DEFAULT_THRESHOLD_INTERVAL, RampMode, RunOptions, RunPlan,
    SCHEDULING_QUANTUM, Stage,
};
pub use error::{Error, Result};
pub use iteration::{Iteration, IterationFuture, ScriptError};
pub use progress::{ProgressFn, ProgressUpdate};
pub use runner::{IterationReport, run_iteration};
pub use schedule::{StageSnapshot, VuSchedule};
pub use scheduler::{RunStatus, Scheduler, run};
pub use signal::{StopReason, StopSignal};
pub use summary::{FatalCondition, RunInfo, RunResult, finalize};
pub use thresholds::{
    MetricKind, MetricName, ThresholdAgg, ThresholdExpr, ThresholdOp, ThresholdSpec,
    ThresholdVerdict, abort_triggers, evaluate, parse_threshold_expr,
};
pub use vu::{VirtualUser, VuContext, VuState};

pub use loadr_metrics as metrics;

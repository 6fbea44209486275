mod live;
mod outcome;
mod recorder;
mod snapshot;
mod trend;

pub use live::{LiveRates, LiveWindow, RunningStats, per_sec};
pub use outcome::{ErrorKind, IterationOutcome, IterationStatus, RequestOutcome};
pub use recorder::Recorder;
pub use snapshot::{CheckTally, IterationStats, MetricSnapshot, RequestStats};
pub use trend::{Trend, TrendSummary};

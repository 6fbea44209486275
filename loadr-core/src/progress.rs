use std::sync::Arc;
use std::time::Duration;

use loadr_metrics::{LiveRates, MetricSnapshot};

use crate::schedule::StageSnapshot;

#[derive(Debug, Clone)]
pub struct ProgressUpdate {
    /// 1-based tick counter.
    pub tick: u64,
    pub elapsed: Duration,
    pub interval: Duration,
    pub total_duration: Duration,
    pub active_vus: u64,
    pub target_vus: u64,
    pub stage: Option<StageSnapshot>,
    pub rates: LiveRates,
    pub snapshot: MetricSnapshot,
}

pub type ProgressFn = Arc<dyn Fn(ProgressUpdate) + Send + Sync + 'static>;

use std::time::Duration;

use crate::config::{RampMode, Stage};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageSnapshot {
    pub index: usize,
    pub count: usize,
    pub stage_elapsed: Duration,
    pub stage_remaining: Duration,
    pub start_target: u64,
    pub end_target: u64,
    pub current_target: u64,
}

/// Target VU count as a function of elapsed run time.
///
/// Stage `i` covers the half-open interval `[end(i-1), end(i))`.
#[derive(Debug, Clone)]
pub struct VuSchedule {
    start: u64,
    mode: RampMode,
    stages: Vec<Stage>,
    cumulative_ends: Vec<Duration>,
}

impl VuSchedule {
    pub fn new(start: u64, stages: Vec<Stage>, mode: RampMode) -> Self {
        let mut cumulative_ends = Vec::with_capacity(stages.len());
        let mut acc = Duration::ZERO;
        for s in &stages {
            acc = acc.saturating_add(s.duration);
            cumulative_ends.push(acc);
        }

        Self {
            start,
            mode,
            stages,
            cumulative_ends,
        }
    }

    /// A flat schedule: `vus` for `duration`.
    pub fn constant(vus: u64, duration: Duration) -> Self {
        Self::new(
            vus,
            vec![Stage {
                target: vus,
                duration,
            }],
            RampMode::Stepped,
        )
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn mode(&self) -> RampMode {
        self.mode
    }

    pub fn total_duration(&self) -> Duration {
        self.cumulative_ends
            .last()
            .copied()
            .unwrap_or(Duration::ZERO)
    }

    pub fn max_target(&self) -> u64 {
        self.stages
            .iter()
            .map(|s| s.target)
            .fold(self.start, u64::max)
    }

    fn stage_index(&self, elapsed: Duration) -> Option<usize> {
        let idx = self.cumulative_ends.partition_point(|end| *end <= elapsed);
        (idx < self.stages.len()).then_some(idx)
    }

    fn stage_start(&self, idx: usize) -> Duration {
        if idx == 0 {
            Duration::ZERO
        } else {
            self.cumulative_ends[idx - 1]
        }
    }

    fn start_target(&self, idx: usize) -> u64 {
        if idx == 0 {
            self.start
        } else {
            self.stages[idx - 1].target
        }
    }

    pub fn target_at(&self, elapsed: Duration) -> u64 {
        let Some(idx) = self.stage_index(elapsed) else {
            return self.stages.last().map(|s| s.target).unwrap_or(self.start);
        };

        let stage = &self.stages[idx];
        match self.mode {
            RampMode::Stepped => stage.target,
            RampMode::Linear => {
                if stage.duration.is_zero() {
                    return stage.target;
                }

                let start_i = self.start_target(idx) as i128;
                let end_i = stage.target as i128;
                let delta = end_i - start_i;

                let num = elapsed.saturating_sub(self.stage_start(idx)).as_nanos() as i128;
                let den = stage.duration.as_nanos() as i128;

                let cur = start_i + (delta.saturating_mul(num) / den.max(1));
                cur.clamp(0, u64::MAX as i128) as u64
            }
        }
    }

    pub fn stage_snapshot_at(&self, elapsed: Duration) -> Option<StageSnapshot> {
        if self.stages.is_empty() {
            return None;
        }

        let total = self.total_duration();
        let idx = self
            .stage_index(elapsed)
            .unwrap_or(self.stages.len().saturating_sub(1));

        let stage_start = self.stage_start(idx);
        let stage_duration = self.stages[idx].duration;
        let stage_elapsed = elapsed.min(total).saturating_sub(stage_start);

        Some(StageSnapshot {
            index: idx,
            count: self.stages.len(),
            stage_elapsed,
            stage_remaining: stage_duration.saturating_sub(stage_elapsed),
            start_target: self.start_target(idx),
            end_target: self.stages[idx].target,
            current_target: self.target_at(elapsed),
        })
    }
}

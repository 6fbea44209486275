use std::time::Duration;

use crate::error::{Error, Result};
use crate::schedule::VuSchedule;
use crate::thresholds::ThresholdSpec;

pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(30);
pub const DEFAULT_THRESHOLD_INTERVAL: Duration = Duration::from_secs(1);
pub const SCHEDULING_QUANTUM: Duration = Duration::from_millis(10);
/// Upper bound for run and grace durations; keeps every deadline representable.
pub const MAX_DURATION: Duration = Duration::from_secs(365 * 24 * 60 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stage {
    pub target: u64,
    pub duration: Duration,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, strum::EnumString, strum::Display)]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum RampMode {
    /// Jump to each stage's target when the stage begins.
    #[default]
    Stepped,
    /// Interpolate from the previous target across the stage.
    Linear,
}

impl RampMode {
    pub fn parse(raw: &str) -> Result<Self> {
        raw.trim()
            .parse()
            .map_err(|_| Error::InvalidRampMode(raw.to_string()))
    }
}

/// Unvalidated run options as gathered from flags, files or code.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Constant VU count, or the starting target when `stages` is set.
    pub vus: Option<u64>,
    pub duration: Option<Duration>,
    pub stages: Vec<Stage>,
    pub ramp_mode: RampMode,
    pub thresholds: Vec<ThresholdSpec>,
    pub grace_period: Option<Duration>,
    pub threshold_interval: Option<Duration>,
}

/// Validated, immutable input to the scheduler.
#[derive(Debug, Clone)]
pub struct RunPlan {
    pub schedule: VuSchedule,
    pub thresholds: Vec<ThresholdSpec>,
    pub grace_period: Duration,
    pub threshold_interval: Duration,
}

impl RunPlan {
    pub fn from_options(opts: RunOptions) -> Result<Self> {
        let schedule = if opts.stages.is_empty() {
            let vus = opts.vus.unwrap_or(1);
            if vus == 0 {
                return Err(Error::InvalidVus);
            }
            let duration = opts.duration.ok_or(Error::InvalidDuration)?;
            if duration.is_zero() {
                return Err(Error::InvalidDuration);
            }
            VuSchedule::constant(vus, duration)
        } else {
            if opts.stages.iter().any(|s| s.duration.is_zero()) {
                return Err(Error::InvalidStages);
            }
            if opts.stages.iter().all(|s| s.target == 0) {
                return Err(Error::NoActiveStage);
            }
            let schedule = VuSchedule::new(opts.vus.unwrap_or(0), opts.stages, opts.ramp_mode);
            if let Some(duration) = opts.duration
                && duration != schedule.total_duration()
            {
                return Err(Error::DurationMismatch {
                    duration,
                    stages: schedule.total_duration(),
                });
            }
            schedule
        };

        let threshold_interval = opts
            .threshold_interval
            .unwrap_or(DEFAULT_THRESHOLD_INTERVAL);
        if threshold_interval.is_zero() {
            return Err(Error::InvalidPollInterval);
        }

        let grace_period = opts.grace_period.unwrap_or(DEFAULT_GRACE_PERIOD);
        check_bound("duration", schedule.total_duration())?;
        check_bound("grace_period", grace_period)?;
        check_bound("threshold_interval", threshold_interval)?;

        Ok(Self {
            schedule,
            thresholds: opts.thresholds,
            grace_period,
            threshold_interval,
        })
    }

    pub fn total_duration(&self) -> Duration {
        self.schedule.total_duration()
    }

    pub fn max_vus(&self) -> u64 {
        self.schedule.max_target()
    }
}

fn check_bound(field: &'static str, value: Duration) -> Result<()> {
    if value > MAX_DURATION {
        return Err(Error::DurationTooLong {
            field,
            value,
            max: MAX_DURATION,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stage(target: u64, secs: u64) -> Stage {
        Stage {
            target,
            duration: Duration::from_secs(secs),
        }
    }

    #[test]
    fn constant_plan_uses_defaults() {
        let plan = RunPlan::from_options(RunOptions {
            vus: Some(5),
            duration: Some(Duration::from_secs(30)),
            ..RunOptions::default()
        })
        .unwrap_or_else(|e| panic!("{e}"));

        assert_eq!(plan.total_duration(), Duration::from_secs(30));
        assert_eq!(plan.max_vus(), 5);
        assert_eq!(plan.grace_period, DEFAULT_GRACE_PERIOD);
        assert_eq!(plan.threshold_interval, DEFAULT_THRESHOLD_INTERVAL);
    }

    #[test]
    fn stage_plan_total_is_sum_of_stages() {
        let plan = RunPlan::from_options(RunOptions {
            stages: vec![stage(2, 5), stage(0, 5)],
            ..RunOptions::default()
        })
        .unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(plan.total_duration(), Duration::from_secs(10));
        assert_eq!(plan.schedule.mode(), RampMode::Stepped);
    }

    #[test]
    fn explicit_duration_must_match_stage_sum() {
        let err = RunPlan::from_options(RunOptions {
            duration: Some(Duration::from_secs(11)),
            stages: vec![stage(2, 5), stage(0, 5)],
            ..RunOptions::default()
        })
        .err();
        assert!(matches!(err, Some(Error::DurationMismatch { .. })));

        let ok = RunPlan::from_options(RunOptions {
            duration: Some(Duration::from_secs(10)),
            stages: vec![stage(2, 5), stage(0, 5)],
            ..RunOptions::default()
        });
        assert!(ok.is_ok());
    }

    #[test]
    fn rejects_invalid_options() {
        let cases = [
            RunOptions {
                vus: Some(0),
                duration: Some(Duration::from_secs(1)),
                ..RunOptions::default()
            },
            RunOptions {
                vus: Some(1),
                ..RunOptions::default()
            },
            RunOptions {
                stages: vec![stage(1, 0)],
                ..RunOptions::default()
            },
            RunOptions {
                stages: vec![stage(0, 1)],
                ..RunOptions::default()
            },
            RunOptions {
                vus: Some(1),
                duration: Some(Duration::from_secs(1)),
                threshold_interval: Some(Duration::ZERO),
                ..RunOptions::default()
            },
        ];

        for opts in cases {
            assert!(
                RunPlan::from_options(opts.clone()).is_err(),
                "expected error for {opts:?}"
            );
        }
    }

    #[test]
    fn rejects_durations_past_the_bound() {
        let huge = Duration::from_secs(u64::MAX);

        let grace = RunPlan::from_options(RunOptions {
            vus: Some(1),
            duration: Some(Duration::from_millis(100)),
            grace_period: Some(huge),
            ..RunOptions::default()
        })
        .err();
        assert!(matches!(
            grace,
            Some(Error::DurationTooLong {
                field: "grace_period",
                ..
            })
        ));

        let duration = RunPlan::from_options(RunOptions {
            vus: Some(1),
            duration: Some(huge),
            ..RunOptions::default()
        })
        .err();
        assert!(matches!(
            duration,
            Some(Error::DurationTooLong {
                field: "duration",
                ..
            })
        ));

        // Saturating stage sums land past the bound as well.
        let stages = RunPlan::from_options(RunOptions {
            stages: vec![
                Stage {
                    target: 1,
                    duration: huge,
                },
                Stage {
                    target: 1,
                    duration: huge,
                },
            ],
            ..RunOptions::default()
        })
        .err();
        assert!(matches!(stages, Some(Error::DurationTooLong { .. })));

        let at_bound = RunPlan::from_options(RunOptions {
            vus: Some(1),
            duration: Some(MAX_DURATION),
            grace_period: Some(MAX_DURATION),
            ..RunOptions::default()
        });
        assert!(at_bound.is_ok());
    }

    #[test]
    fn ramp_mode_parses_case_insensitively() {
        assert_eq!(RampMode::parse("Linear").ok(), Some(RampMode::Linear));
        assert_eq!(RampMode::parse("stepped").ok(), Some(RampMode::Stepped));
        assert!(matches!(
            RampMode::parse("wavy"),
            Err(Error::InvalidRampMode(_))
        ));
    }
}

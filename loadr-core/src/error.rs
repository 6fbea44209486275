use std::time::Duration;

pub type Result<T> = std::result::Result<T, Error>;

/// Configuration errors. All of them are raised before any VU is spawned.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("`vus` must be a positive integer")]
    InvalidVus,

    #[error("`duration` must be a positive duration")]
    InvalidDuration,

    #[error("`stages` must be a non-empty array of {{ target, duration }} with positive durations")]
    InvalidStages,

    #[error("at least one stage must target a positive number of VUs")]
    NoActiveStage,

    #[error("`duration` ({duration:?}) must equal the sum of stage durations ({stages:?})")]
    DurationMismatch { duration: Duration, stages: Duration },

    #[error("`{field}` ({value:?}) exceeds the maximum of {max:?}")]
    DurationTooLong {
        field: &'static str,
        value: Duration,
        max: Duration,
    },

    #[error("threshold poll interval must be a positive duration")]
    InvalidPollInterval,

    #[error("unknown metric `{0}`")]
    UnknownMetric(String),

    #[error("invalid threshold `{raw}`: {reason}")]
    InvalidThreshold { raw: String, reason: String },

    #[error("invalid ramp mode `{0}` (expected `stepped` or `linear`)")]
    InvalidRampMode(String),
}

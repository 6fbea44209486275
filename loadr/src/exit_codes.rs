use loadr_core::RunResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    Success = 0,

    /// One or more thresholds failed.
    ThresholdsFailed = 11,

    /// The run hit a fatal condition (e.g. the target was never reachable).
    Aborted = 13,

    /// Invalid CLI/config/options (bad flags, invalid durations, invalid thresholds syntax, etc.).
    InvalidInput = 30,

    /// Internal/runtime error (IO errors, unexpected invariants, panics caught at top-level).
    RuntimeError = 40,
}

impl ExitCode {
    #[must_use]
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// A fatal condition wins over threshold failures.
    #[must_use]
    pub fn from_result(result: &RunResult) -> Self {
        if result.fatal.is_some() {
            Self::Aborted
        } else if !result.thresholds_passed() {
            Self::ThresholdsFailed
        } else {
            Self::Success
        }
    }
}

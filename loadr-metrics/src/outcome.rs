use std::time::{Duration, SystemTime};

/// Why a request (or the iteration that issued it) did not succeed.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    strum::Display,
    strum::EnumString,
    strum::IntoStaticStr,
)]
#[strum(serialize_all = "snake_case")]
pub enum ErrorKind {
    /// TCP connect / DNS failure: the target was never reached.
    Connect,
    Timeout,
    InvalidUrl,
    Request,
    BodyRead,
    /// The exchange completed but the status code signals failure (>= 400).
    Status,
    /// The iteration function itself failed or panicked.
    #[strum(to_string = "script_error", serialize = "script-error")]
    ScriptError,
}

/// One request/response exchange as observed by a virtual user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestOutcome {
    pub timestamp: SystemTime,
    /// Dispatch to full response (or error) receipt.
    pub duration: Duration,
    pub status: Option<u16>,
    pub error: Option<ErrorKind>,
    pub bytes_received: u64,
    pub bytes_sent: u64,
}

impl RequestOutcome {
    #[must_use]
    pub fn from_status(
        duration: Duration,
        status: u16,
        bytes_received: u64,
        bytes_sent: u64,
    ) -> Self {
        let error = (status >= 400).then_some(ErrorKind::Status);
        Self {
            timestamp: SystemTime::now(),
            duration,
            status: Some(status),
            error,
            bytes_received,
            bytes_sent,
        }
    }

    #[must_use]
    pub fn from_error(duration: Duration, kind: ErrorKind, bytes_sent: u64) -> Self {
        Self {
            timestamp: SystemTime::now(),
            duration,
            status: None,
            error: Some(kind),
            bytes_received: 0,
            bytes_sent,
        }
    }

    #[must_use]
    pub fn script_error(duration: Duration) -> Self {
        Self::from_error(duration, ErrorKind::ScriptError, 0)
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// Script errors are counted as failed outcomes but carry no request latency.
    #[must_use]
    pub(crate) fn has_latency(&self) -> bool {
        self.error != Some(ErrorKind::ScriptError)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum IterationStatus {
    Completed,
    ScriptError,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IterationOutcome {
    pub duration: Duration,
    pub status: IterationStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_at_or_above_400_are_failures() {
        let ok = RequestOutcome::from_status(Duration::from_millis(5), 200, 10, 10);
        assert!(ok.is_success());

        let redirect = RequestOutcome::from_status(Duration::from_millis(5), 302, 10, 10);
        assert!(redirect.is_success());

        let bad = RequestOutcome::from_status(Duration::from_millis(5), 503, 10, 10);
        assert!(!bad.is_success());
        assert_eq!(bad.error, Some(ErrorKind::Status));
        assert_eq!(bad.status, Some(503));
    }

    #[test]
    fn error_kind_parses_both_script_error_spellings() {
        assert_eq!("script-error".parse::<ErrorKind>(), Ok(ErrorKind::ScriptError));
        assert_eq!("script_error".parse::<ErrorKind>(), Ok(ErrorKind::ScriptError));
        assert_eq!(ErrorKind::Connect.to_string(), "connect");
    }
}

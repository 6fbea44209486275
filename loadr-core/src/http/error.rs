use std::time::Duration;

use loadr_metrics::ErrorKind;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid url: {0}")]
    InvalidUrl(String),

    #[error("only http:// URLs are supported: {0}")]
    OnlyHttpSupported(String),

    #[error("http request build failed: {0}")]
    RequestBuild(#[from] http::Error),

    #[error("invalid http header name: {0}")]
    HeaderName(#[from] http::header::InvalidHeaderName),

    #[error("invalid http header value: {0}")]
    HeaderValue(#[from] http::header::InvalidHeaderValue),

    #[error("http request failed: {0}")]
    Request(#[from] hyper_util::client::legacy::Error),

    #[error("http request timed out after {0:?}")]
    Timeout(Duration),

    #[error("failed to read response body: {0}")]
    BodyRead(#[from] hyper::Error),
}

impl Error {
    /// Classification used for the `errors_by_kind` tally.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidUrl(_) | Self::OnlyHttpSupported(_) => ErrorKind::InvalidUrl,
            Self::RequestBuild(_) | Self::HeaderName(_) | Self::HeaderValue(_) => {
                ErrorKind::Request
            }
            Self::Request(e) if e.is_connect() => ErrorKind::Connect,
            Self::Request(_) => ErrorKind::Request,
            Self::Timeout(_) => ErrorKind::Timeout,
            Self::BodyRead(_) => ErrorKind::BodyRead,
        }
    }
}

use std::sync::Arc;
use std::time::Duration;

use loadr_core::http::HttpResponse;
use loadr_core::{ScriptError, VuContext};

pub(crate) const DEFAULT_BASE_URL: &str = "http://127.0.0.1:80";
pub(crate) const DEFAULT_PATH: &str = "/";
pub(crate) const DEFAULT_EXPECT_STATUS: u16 = 200;
pub(crate) const DEFAULT_SLEEP: Duration = Duration::from_secs(1);

/// The built-in iteration: `GET url`, check the status and optional body marker, pause.
#[derive(Debug, Clone)]
pub(crate) struct SmokeIteration {
    url: Arc<str>,
    expect_status: u16,
    expect_body: Option<Arc<str>>,
    sleep: Duration,
    status_label: Arc<str>,
    body_label: Option<Arc<str>>,
}

impl SmokeIteration {
    pub(crate) fn new(
        url: String,
        expect_status: u16,
        expect_body: Option<String>,
        sleep: Duration,
    ) -> Self {
        let body_label = expect_body
            .as_ref()
            .map(|marker| Arc::from(format!("body contains {marker:?}")));

        Self {
            url: url.into(),
            expect_status,
            expect_body: expect_body.map(Arc::from),
            sleep,
            status_label: format!("status is {expect_status}").into(),
            body_label,
        }
    }

    pub(crate) fn url(&self) -> &str {
        &self.url
    }

    pub(crate) async fn run(&self, vu: VuContext) -> Result<(), ScriptError> {
        let res = vu.get(&self.url).await;

        let expect_status = self.expect_status;
        let status_ok = move |r: &HttpResponse| r.status == expect_status;

        match (&self.body_label, &self.expect_body) {
            (Some(body_label), Some(marker)) => {
                let body_ok =
                    |r: &HttpResponse| r.body_utf8().is_some_and(|b| b.contains(&**marker));
                vu.check(
                    &res,
                    &[(&*self.status_label, &status_ok), (&**body_label, &body_ok)],
                );
            }
            _ => {
                vu.check(&res, &[(&*self.status_label, &status_ok)]);
            }
        }

        if !self.sleep.is_zero() {
            vu.sleep(self.sleep).await;
        }
        Ok(())
    }
}

/// Joins `base` and `path` with exactly one slash between them.
pub(crate) fn target_url(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    let path = path.trim();
    if path.is_empty() {
        return format!("{base}/");
    }
    if path.starts_with('/') {
        format!("{base}{path}")
    } else {
        format!("{base}/{path}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_url_normalises_slashes() {
        assert_eq!(target_url("http://h:80", "/"), "http://h:80/");
        assert_eq!(target_url("http://h:80/", "/"), "http://h:80/");
        assert_eq!(target_url("http://h:80/", "health"), "http://h:80/health");
        assert_eq!(target_url("http://h:80", ""), "http://h:80/");
        assert_eq!(target_url("http://h/api/", "/v1"), "http://h/api/v1");
    }

    #[test]
    fn labels_describe_the_expectations() {
        let smoke = SmokeIteration::new(
            "http://h/".to_string(),
            204,
            Some("ok".to_string()),
            Duration::ZERO,
        );
        assert_eq!(&*smoke.status_label, "status is 204");
        assert_eq!(smoke.body_label.as_deref(), Some("body contains \"ok\""));
        assert_eq!(smoke.url(), "http://h/");
    }
}

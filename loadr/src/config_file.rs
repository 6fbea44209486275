use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use anyhow::Context as _;
use loadr_core::{RampMode, Stage, ThresholdSpec};
use serde::Deserialize;

/// Run options read from `--config`. Every field is optional; flags win.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub(crate) struct ConfigFile {
    pub vus: Option<u64>,
    pub duration: Option<YamlDuration>,
    #[serde(default)]
    pub stages: Vec<StageYaml>,
    pub ramp_mode: Option<String>,
    pub grace_period: Option<YamlDuration>,
    pub request_timeout: Option<YamlDuration>,

    /// Metric name to one or more threshold expressions.
    #[serde(default)]
    pub thresholds: BTreeMap<String, ThresholdsYaml>,

    pub base_url: Option<String>,
    pub path: Option<String>,
    pub expect_status: Option<u16>,
    pub expect_body: Option<String>,
    pub sleep: Option<YamlDuration>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub(crate) struct StageYaml {
    pub target: u64,
    pub duration: YamlDuration,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum ThresholdsYaml {
    One(ThresholdYaml),
    Many(Vec<ThresholdYaml>),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum ThresholdYaml {
    Expr(String),
    Detailed(DetailedThresholdYaml),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub(crate) struct DetailedThresholdYaml {
    pub threshold: String,
    #[serde(default)]
    pub abort_on_fail: bool,
    pub delay_abort_eval: Option<YamlDuration>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct YamlDuration(Duration);

impl YamlDuration {
    pub(crate) fn into_inner(self) -> Duration {
        self.0
    }
}

impl<'de> Deserialize<'de> for YamlDuration {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct V;

        impl serde::de::Visitor<'_> for V {
            type Value = YamlDuration;

            fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                f.write_str("duration as string (e.g. 10s), integer seconds, or float seconds")
            }

            fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                Ok(YamlDuration(Duration::from_secs(v)))
            }

            fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                u64::try_from(v)
                    .map(|secs| YamlDuration(Duration::from_secs(secs)))
                    .map_err(|_| E::custom("duration must not be negative"))
            }

            fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                if !v.is_finite() || v < 0.0 {
                    return Err(E::custom("duration must be a non-negative, finite number"));
                }
                Ok(YamlDuration(Duration::from_secs_f64(v)))
            }

            fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                crate::cli::parse_duration(v)
                    .map(YamlDuration)
                    .map_err(E::custom)
            }
        }

        deserializer.deserialize_any(V)
    }
}

impl ConfigFile {
    pub(crate) async fn load(path: &Path) -> anyhow::Result<Self> {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("failed to read config: {}", path.display()))?;
        Self::parse(&bytes).with_context(|| format!("invalid config: {}", path.display()))
    }

    pub(crate) fn parse(bytes: &[u8]) -> anyhow::Result<Self> {
        // An empty document deserializes as YAML null.
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_slice(bytes)?)
    }

    pub(crate) fn stages(&self) -> Vec<Stage> {
        self.stages
            .iter()
            .map(|s| Stage {
                target: s.target,
                duration: s.duration.into_inner(),
            })
            .collect()
    }

    pub(crate) fn ramp_mode(&self) -> loadr_core::Result<Option<RampMode>> {
        self.ramp_mode.as_deref().map(RampMode::parse).transpose()
    }

    /// Specs in metric-name order, preserving the listed order per metric.
    pub(crate) fn thresholds(&self) -> loadr_core::Result<Vec<ThresholdSpec>> {
        let mut out = Vec::new();
        for (metric, entries) in &self.thresholds {
            let entries = match entries {
                ThresholdsYaml::One(one) => std::slice::from_ref(one),
                ThresholdsYaml::Many(many) => many.as_slice(),
            };

            for entry in entries {
                let spec = match entry {
                    ThresholdYaml::Expr(expr) => ThresholdSpec::new(metric, expr)?,
                    ThresholdYaml::Detailed(d) => ThresholdSpec::new(metric, &d.threshold)?
                        .with_abort_on_fail(d.abort_on_fail)
                        .with_delay_abort_eval(d.delay_abort_eval.map(YamlDuration::into_inner)),
                };
                out.push(spec);
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use loadr_core::{MetricName, ThresholdAgg, ThresholdOp};

    fn parse(yaml: &str) -> ConfigFile {
        ConfigFile::parse(yaml.as_bytes()).unwrap_or_else(|e| panic!("{e:#}"))
    }

    #[test]
    fn empty_document_is_all_defaults() {
        let cfg = parse("");
        assert!(cfg.vus.is_none());
        assert!(cfg.thresholds.is_empty());
    }

    #[test]
    fn parses_camel_case_keys_and_durations() {
        let cfg = parse(
            r#"
vus: 3
duration: 1m
rampMode: linear
gracePeriod: 5
requestTimeout: 2.5
stages:
  - target: 10
    duration: 30s
  - target: 0
    duration: 10s
baseUrl: http://127.0.0.1:8080
path: /health
expectStatus: 204
expectBody: ok
sleep: 250ms
"#,
        );

        assert_eq!(cfg.vus, Some(3));
        assert_eq!(cfg.duration.map(YamlDuration::into_inner), Some(Duration::from_secs(60)));
        assert_eq!(
            cfg.grace_period.map(YamlDuration::into_inner),
            Some(Duration::from_secs(5))
        );
        assert_eq!(
            cfg.request_timeout.map(YamlDuration::into_inner),
            Some(Duration::from_millis(2500))
        );
        assert_eq!(cfg.ramp_mode().ok().flatten(), Some(RampMode::Linear));
        assert_eq!(
            cfg.stages(),
            vec![
                Stage {
                    target: 10,
                    duration: Duration::from_secs(30)
                },
                Stage {
                    target: 0,
                    duration: Duration::from_secs(10)
                },
            ]
        );
        assert_eq!(cfg.base_url.as_deref(), Some("http://127.0.0.1:8080"));
        assert_eq!(cfg.path.as_deref(), Some("/health"));
        assert_eq!(cfg.expect_status, Some(204));
        assert_eq!(cfg.expect_body.as_deref(), Some("ok"));
        assert_eq!(cfg.sleep.map(YamlDuration::into_inner), Some(Duration::from_millis(250)));
    }

    #[test]
    fn thresholds_accept_strings_lists_and_objects() {
        let cfg = parse(
            r#"
thresholds:
  http_req_failed: rate<0.01
  http_req_duration:
    - p(95)<500
    - threshold: p(99)<1500
      abortOnFail: true
      delayAbortEval: 10s
  checks:
    threshold: rate==1
"#,
        );

        let specs = cfg.thresholds().unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(specs.len(), 4);

        // BTreeMap order: checks, http_req_duration, http_req_failed.
        assert_eq!(specs[0].metric, MetricName::Checks);
        assert!(!specs[0].abort_on_fail);

        assert_eq!(specs[1].metric, MetricName::HttpReqDuration);
        assert_eq!(specs[1].expr.agg, Some(ThresholdAgg::P(95.0)));

        assert_eq!(specs[2].source, "p(99)<1500");
        assert!(specs[2].abort_on_fail);
        assert_eq!(specs[2].delay_abort_eval, Some(Duration::from_secs(10)));

        assert_eq!(specs[3].metric, MetricName::HttpReqFailed);
        assert_eq!(specs[3].expr.op, ThresholdOp::Lt);
    }

    #[test]
    fn unknown_metric_is_rejected() {
        let cfg = parse("thresholds:\n  http_req_speed: avg<1\n");
        assert!(cfg.thresholds().is_err());
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(ConfigFile::parse(b"vu: 3\n").is_err());
    }

    #[test]
    fn bad_ramp_mode_is_reported() {
        let cfg = parse("rampMode: sideways\n");
        assert!(cfg.ramp_mode().is_err());
    }
}

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use loadr_metrics::MetricSnapshot;

use crate::error::{Error, Result};

/// Built-in metrics a threshold can reference.
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
pub enum MetricName {
    HttpReqs,
    HttpReqFailed,
    HttpReqDuration,
    Iterations,
    IterationDuration,
    Checks,
    DataReceived,
    DataSent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum MetricKind {
    Counter,
    Rate,
    Trend,
}

impl MetricName {
    #[must_use]
    pub fn kind(self) -> MetricKind {
        match self {
            Self::HttpReqs | Self::Iterations | Self::DataReceived | Self::DataSent => {
                MetricKind::Counter
            }
            Self::HttpReqFailed | Self::Checks => MetricKind::Rate,
            Self::HttpReqDuration | Self::IterationDuration => MetricKind::Trend,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThresholdOp {
    Lt,
    Lte,
    Gt,
    Gte,
    Eq,
    NotEq,
}

impl ThresholdOp {
    fn as_str(self) -> &'static str {
        match self {
            Self::Lt => "<",
            Self::Lte => "<=",
            Self::Gt => ">",
            Self::Gte => ">=",
            Self::Eq => "==",
            Self::NotEq => "!=",
        }
    }

    fn compare(self, observed: f64, expected: f64) -> bool {
        match self {
            Self::Lt => observed < expected,
            Self::Lte => observed <= expected,
            Self::Gt => observed > expected,
            Self::Gte => observed >= expected,
            Self::Eq => observed == expected,
            Self::NotEq => observed != expected,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ThresholdAgg {
    Avg,
    Min,
    Max,
    Med,
    Count,
    Rate,
    /// Percentile in `(0, 100]`.
    P(f64),
}

impl ThresholdAgg {
    fn default_for(kind: MetricKind) -> Self {
        match kind {
            MetricKind::Trend => Self::Avg,
            MetricKind::Rate => Self::Rate,
            MetricKind::Counter => Self::Count,
        }
    }

    fn supported_by(self, kind: MetricKind) -> bool {
        match self {
            Self::Count => true,
            Self::Rate => kind != MetricKind::Trend,
            Self::Avg | Self::Min | Self::Max | Self::Med | Self::P(_) => {
                kind == MetricKind::Trend
            }
        }
    }
}

impl fmt::Display for ThresholdAgg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Avg => f.write_str("avg"),
            Self::Min => f.write_str("min"),
            Self::Max => f.write_str("max"),
            Self::Med => f.write_str("med"),
            Self::Count => f.write_str("count"),
            Self::Rate => f.write_str("rate"),
            Self::P(p) => write!(f, "p({p})"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThresholdExpr {
    /// `None` when the expression omitted it; resolved against the metric kind.
    pub agg: Option<ThresholdAgg>,
    pub op: ThresholdOp,
    pub value: f64,
}

impl fmt::Display for ThresholdExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(agg) = self.agg {
            write!(f, "{agg}")?;
        }
        write!(f, "{}{}", self.op.as_str(), self.value)
    }
}

/// Parses `[agg] op value`, e.g. `p(95)<500`, `rate < 0.01`, `<200`.
pub fn parse_threshold_expr(raw: &str) -> std::result::Result<ThresholdExpr, String> {
    let s: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
    if s.is_empty() {
        return Err("empty threshold".to_string());
    }

    let ops = [
        ("<=", ThresholdOp::Lte),
        (">=", ThresholdOp::Gte),
        ("==", ThresholdOp::Eq),
        ("!=", ThresholdOp::NotEq),
        ("<", ThresholdOp::Lt),
        (">", ThresholdOp::Gt),
    ];
    let (op_pos, op_len, op) = ops
        .iter()
        .find_map(|(tok, op)| s.find(tok).map(|pos| (pos, tok.len(), *op)))
        .ok_or_else(|| "missing comparison operator".to_string())?;

    let (left, right_with_op) = s.split_at(op_pos);
    let right = &right_with_op[op_len..];
    if right.is_empty() {
        return Err("missing threshold value".to_string());
    }

    let agg = if left.is_empty() {
        None
    } else if left.eq_ignore_ascii_case("avg") {
        Some(ThresholdAgg::Avg)
    } else if left.eq_ignore_ascii_case("min") {
        Some(ThresholdAgg::Min)
    } else if left.eq_ignore_ascii_case("max") {
        Some(ThresholdAgg::Max)
    } else if left.eq_ignore_ascii_case("med") {
        Some(ThresholdAgg::Med)
    } else if left.eq_ignore_ascii_case("count") {
        Some(ThresholdAgg::Count)
    } else if left.eq_ignore_ascii_case("rate") {
        Some(ThresholdAgg::Rate)
    } else if let Some(inner) = left.strip_prefix("p(").and_then(|v| v.strip_suffix(')')) {
        let p: f64 = inner
            .parse()
            .map_err(|_| format!("invalid percentile `{inner}`"))?;
        if !(p > 0.0 && p <= 100.0) {
            return Err(format!(
                "percentile out of range `{inner}` (expected 0 < p <= 100)"
            ));
        }
        Some(ThresholdAgg::P(p))
    } else {
        return Err(format!("unknown aggregation `{left}`"));
    };

    let value: f64 = right
        .parse()
        .map_err(|_| format!("invalid numeric value `{right}`"))?;
    if !value.is_finite() {
        return Err(format!("invalid numeric value `{right}`"));
    }

    Ok(ThresholdExpr { agg, op, value })
}

/// One assertion over one metric. Immutable for the duration of a run.
#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdSpec {
    pub metric: MetricName,
    pub expr: ThresholdExpr,
    /// Expression as written by the user.
    pub source: String,
    pub abort_on_fail: bool,
    /// Aborts are suppressed until the run has been going for this long.
    pub delay_abort_eval: Option<Duration>,
}

impl ThresholdSpec {
    pub fn new(metric: &str, expr: &str) -> Result<Self> {
        let metric = metric.trim();
        let metric_name =
            MetricName::from_str(metric).map_err(|_| Error::UnknownMetric(metric.to_string()))?;

        let invalid = |reason: String| Error::InvalidThreshold {
            raw: format!("{metric}: {}", expr.trim()),
            reason,
        };

        let parsed = parse_threshold_expr(expr).map_err(invalid)?;
        if let Some(agg) = parsed.agg
            && !agg.supported_by(metric_name.kind())
        {
            return Err(invalid(format!(
                "aggregation `{agg}` is not available for {} metric `{metric_name}`",
                metric_name.kind()
            )));
        }

        Ok(Self {
            metric: metric_name,
            expr: parsed,
            source: expr.trim().to_string(),
            abort_on_fail: false,
            delay_abort_eval: None,
        })
    }

    /// Parses `metric: expr` or `metric expr`.
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        let split = raw
            .split_once(':')
            .or_else(|| raw.split_once(char::is_whitespace));
        let Some((metric, expr)) = split else {
            return Err(Error::InvalidThreshold {
                raw: raw.to_string(),
                reason: "expected `metric: expression`".to_string(),
            });
        };
        Self::new(metric, expr)
    }

    #[must_use]
    pub fn with_abort_on_fail(mut self, abort: bool) -> Self {
        self.abort_on_fail = abort;
        self
    }

    #[must_use]
    pub fn with_delay_abort_eval(mut self, delay: Option<Duration>) -> Self {
        self.delay_abort_eval = delay;
        self
    }

    /// Aggregation after applying the metric kind's default.
    #[must_use]
    pub fn aggregation(&self) -> ThresholdAgg {
        self.expr
            .agg
            .unwrap_or_else(|| ThresholdAgg::default_for(self.metric.kind()))
    }

    /// True when a failing verdict at `elapsed` should stop the run.
    #[must_use]
    pub fn aborts_at(&self, elapsed: Duration) -> bool {
        self.abort_on_fail && self.delay_abort_eval.is_none_or(|delay| elapsed >= delay)
    }
}

impl fmt::Display for ThresholdSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.metric, self.source)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdVerdict {
    pub spec: ThresholdSpec,
    /// `None` when the metric had no observations yet.
    pub observed: Option<f64>,
    pub passed: bool,
}

/// Evaluates each spec independently against `snapshot`. A spec whose statistic
/// is unavailable fails.
pub fn evaluate(snapshot: &MetricSnapshot, specs: &[ThresholdSpec]) -> Vec<ThresholdVerdict> {
    specs
        .iter()
        .map(|spec| {
            let observed = observed_value(snapshot, spec.metric, spec.aggregation());
            ThresholdVerdict {
                spec: spec.clone(),
                observed,
                passed: observed.is_some_and(|v| spec.expr.op.compare(v, spec.expr.value)),
            }
        })
        .collect()
}

/// Specs that are failing and allowed to abort the run at `elapsed`.
pub fn abort_triggers<'a>(
    verdicts: &'a [ThresholdVerdict],
    elapsed: Duration,
) -> impl Iterator<Item = &'a ThresholdVerdict> {
    verdicts
        .iter()
        .filter(move |v| !v.passed && v.spec.aborts_at(elapsed))
}

fn observed_value(
    snapshot: &MetricSnapshot,
    metric: MetricName,
    agg: ThresholdAgg,
) -> Option<f64> {
    let trend = match metric {
        MetricName::HttpReqDuration => &snapshot.requests.latency,
        MetricName::IterationDuration => &snapshot.iterations.duration,
        MetricName::HttpReqs => return counter(snapshot, snapshot.requests.count, agg),
        MetricName::Iterations => return counter(snapshot, snapshot.iterations.count, agg),
        MetricName::DataReceived => {
            return counter(snapshot, snapshot.requests.bytes_received, agg);
        }
        MetricName::DataSent => return counter(snapshot, snapshot.requests.bytes_sent, agg),
        MetricName::HttpReqFailed => {
            return match agg {
                ThresholdAgg::Rate => snapshot.requests.failure_rate(),
                ThresholdAgg::Count => Some(snapshot.requests.failure as f64),
                _ => None,
            };
        }
        MetricName::Checks => {
            return match agg {
                ThresholdAgg::Rate => snapshot.checks_rate(),
                ThresholdAgg::Count => Some(snapshot.checks_passed() as f64),
                _ => None,
            };
        }
    };

    match agg {
        ThresholdAgg::Avg => trend.mean_ms(),
        ThresholdAgg::Min => trend.min_ms(),
        ThresholdAgg::Max => trend.max_ms(),
        ThresholdAgg::Med => trend.percentile_ms(50.0),
        ThresholdAgg::P(p) => trend.percentile_ms(p),
        ThresholdAgg::Count => Some(trend.count() as f64),
        ThresholdAgg::Rate => None,
    }
}

fn counter(snapshot: &MetricSnapshot, value: u64, agg: ThresholdAgg) -> Option<f64> {
    match agg {
        ThresholdAgg::Count => Some(value as f64),
        ThresholdAgg::Rate => snapshot.per_second(value),
        _ => None,
    }
}

use std::time::Duration;

use hdrhistogram::Histogram;

/// Highest trackable value: 1 hour in microseconds.
const MAX_MICROS: u64 = 3_600_000_000;

/// Significant digits kept by the histogram. Three digits bound the relative error of any
/// reported quantile to 0.1%.
const SIGFIG: u8 = 3;

pub(crate) fn new_default_histogram() -> Histogram<u64> {
    match Histogram::<u64>::new_with_bounds(1, MAX_MICROS, SIGFIG) {
        Ok(h) => h,
        Err(err) => panic!("failed to create histogram: {err}"),
    }
}

pub(crate) fn duration_to_micros(d: Duration) -> u64 {
    let us: u64 = d.as_micros().try_into().unwrap_or(u64::MAX);
    us.clamp(1, MAX_MICROS)
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrendSummary {
    pub p50: Option<f64>,
    pub p90: Option<f64>,
    pub p95: Option<f64>,
    pub p99: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub mean: Option<f64>,
    pub stdev: Option<f64>,
    pub count: u64,
}

/// Latency distribution in microseconds; all accessors report milliseconds.
#[derive(Debug, Clone)]
pub struct Trend {
    hist: Histogram<u64>,
}

impl Default for Trend {
    fn default() -> Self {
        Self {
            hist: new_default_histogram(),
        }
    }
}

impl PartialEq for Trend {
    fn eq(&self, other: &Self) -> bool {
        self.hist.len() == other.hist.len()
            && self
                .hist
                .iter_recorded()
                .map(|v| (v.value_iterated_to(), v.count_at_value()))
                .eq(other
                    .hist
                    .iter_recorded()
                    .map(|v| (v.value_iterated_to(), v.count_at_value())))
    }
}

#[inline]
fn micros_to_ms(us: u64) -> f64 {
    us as f64 / 1000.0
}

impl Trend {
    pub(crate) fn record(&mut self, d: Duration) {
        let _ = self.hist.record(duration_to_micros(d));
    }

    pub(crate) fn merge(&mut self, other: &Trend) {
        let _ = self.hist.add(&other.hist);
    }

    pub fn count(&self) -> u64 {
        self.hist.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hist.is_empty()
    }

    pub fn min_ms(&self) -> Option<f64> {
        (!self.is_empty()).then(|| micros_to_ms(self.hist.min()))
    }

    pub fn max_ms(&self) -> Option<f64> {
        (!self.is_empty()).then(|| micros_to_ms(self.hist.max()))
    }

    pub fn mean_ms(&self) -> Option<f64> {
        (!self.is_empty()).then(|| self.hist.mean() / 1000.0)
    }

    pub fn stdev_ms(&self) -> Option<f64> {
        (!self.is_empty()).then(|| self.hist.stdev() / 1000.0)
    }

    /// `p` is a percentile in `(0, 100]`.
    pub fn percentile_ms(&self, p: f64) -> Option<f64> {
        if self.is_empty() || !(p > 0.0 && p <= 100.0) {
            return None;
        }
        Some(micros_to_ms(self.hist.value_at_percentile(p)))
    }

    pub fn summary(&self) -> TrendSummary {
        TrendSummary {
            p50: self.percentile_ms(50.0),
            p90: self.percentile_ms(90.0),
            p95: self.percentile_ms(95.0),
            p99: self.percentile_ms(99.0),
            min: self.min_ms(),
            max: self.max_ms(),
            mean: self.mean_ms(),
            stdev: self.stdev_ms(),
            count: self.count(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_trend_has_no_stats() {
        let t = Trend::default();
        let s = t.summary();
        assert_eq!(s.count, 0);
        assert!(s.p50.is_none());
        assert!(s.min.is_none());
        assert!(s.max.is_none());
        assert!(s.mean.is_none());
        assert!(s.stdev.is_none());
    }

    #[test]
    fn trend_reports_milliseconds() {
        let mut t = Trend::default();
        t.record(Duration::from_millis(10));
        t.record(Duration::from_millis(20));
        t.record(Duration::from_millis(30));

        let s = t.summary();
        assert_eq!(s.count, 3);

        let min = s.min.unwrap_or_else(|| panic!("expected min"));
        let max = s.max.unwrap_or_else(|| panic!("expected max"));
        assert!((min - 10.0).abs() < 0.05, "min={min}");
        assert!((max - 30.0).abs() < 0.05, "max={max}");

        let p50 = s.p50.unwrap_or_else(|| panic!("expected p50"));
        assert!((p50 - 20.0).abs() < 0.05, "p50={p50}");
    }

    #[test]
    fn percentile_rejects_out_of_range() {
        let mut t = Trend::default();
        t.record(Duration::from_millis(1));
        assert!(t.percentile_ms(0.0).is_none());
        assert!(t.percentile_ms(100.5).is_none());
        assert!(t.percentile_ms(100.0).is_some());
    }

    #[test]
    fn percentile_error_is_bounded() {
        let mut t = Trend::default();
        for ms in 1..=1000u64 {
            t.record(Duration::from_millis(ms));
        }

        let p95 = t.percentile_ms(95.0).unwrap_or_else(|| panic!("expected p95"));
        // 3 significant digits => within 0.1% of the exact value.
        assert!((p95 - 950.0).abs() <= 950.0 * 0.001 + 1e-9, "p95={p95}");
    }

    #[test]
    fn sub_microsecond_durations_clamp_to_one() {
        assert_eq!(duration_to_micros(Duration::from_nanos(10)), 1);
        assert_eq!(duration_to_micros(Duration::from_secs(7200)), MAX_MICROS);
    }
}

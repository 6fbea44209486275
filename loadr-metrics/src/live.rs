use std::time::Duration;

use crate::snapshot::MetricSnapshot;

#[derive(Debug, Default, Clone, Copy)]
pub struct RunningStats {
    n: u64,
    mean: f64,
    m2: f64,
    max: f64,
}

impl RunningStats {
    pub fn push(&mut self, x: f64) {
        self.n = self.n.saturating_add(1);
        let n_f = self.n as f64;

        let delta = x - self.mean;
        self.mean += delta / n_f;
        let delta2 = x - self.mean;
        self.m2 += delta * delta2;

        if x > self.max {
            self.max = x;
        }
    }

    pub fn mean(&self) -> f64 {
        self.mean
    }

    pub fn stdev(&self) -> f64 {
        if self.n < 2 {
            return 0.0;
        }
        (self.m2 / (self.n as f64 - 1.0)).sqrt()
    }

    pub fn max(&self) -> f64 {
        self.max
    }
}

#[inline]
pub fn per_sec(delta: u64, dt_secs: f64) -> f64 {
    let dt = dt_secs.max(1e-9);
    delta as f64 / dt
}

/// Rates observed between two consecutive snapshots.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LiveRates {
    pub requests_per_sec: f64,
    pub failed_per_sec: f64,
    pub iterations_per_sec: f64,
    pub bytes_received_per_sec: f64,
    pub bytes_sent_per_sec: f64,
    /// Failed / total over the interval (0 when idle).
    pub error_rate: f64,

    pub rps_avg: f64,
    pub rps_stdev: f64,
    pub rps_max: f64,
}

#[derive(Debug, Clone, Copy, Default)]
struct Totals {
    requests: u64,
    failed: u64,
    iterations: u64,
    bytes_received: u64,
    bytes_sent: u64,
}

impl Totals {
    fn of(s: &MetricSnapshot) -> Self {
        Self {
            requests: s.requests.count,
            failed: s.requests.failure,
            iterations: s.iterations.count,
            bytes_received: s.requests.bytes_received,
            bytes_sent: s.requests.bytes_sent,
        }
    }
}

/// Turns a sequence of cumulative snapshots into per-interval rates.
#[derive(Debug, Default)]
pub struct LiveWindow {
    prev: Option<Totals>,
    rps: RunningStats,
}

impl LiveWindow {
    pub fn advance(&mut self, snapshot: &MetricSnapshot, interval: Duration) -> LiveRates {
        let cur = Totals::of(snapshot);
        let prev = self.prev.replace(cur).unwrap_or_default();
        let dt = interval.as_secs_f64();

        let requests = cur.requests.saturating_sub(prev.requests);
        let failed = cur.failed.saturating_sub(prev.failed);

        let requests_per_sec = per_sec(requests, dt);
        self.rps.push(requests_per_sec);

        LiveRates {
            requests_per_sec,
            failed_per_sec: per_sec(failed, dt),
            iterations_per_sec: per_sec(cur.iterations.saturating_sub(prev.iterations), dt),
            bytes_received_per_sec: per_sec(
                cur.bytes_received.saturating_sub(prev.bytes_received),
                dt,
            ),
            bytes_sent_per_sec: per_sec(cur.bytes_sent.saturating_sub(prev.bytes_sent), dt),
            error_rate: if requests > 0 {
                failed as f64 / requests as f64
            } else {
                0.0
            },
            rps_avg: self.rps.mean(),
            rps_stdev: self.rps.stdev(),
            rps_max: self.rps.max(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn running_stats_tracks_mean_and_max() {
        let mut s = RunningStats::default();
        s.push(2.0);
        s.push(4.0);
        s.push(6.0);
        assert!((s.mean() - 4.0).abs() < 1e-9);
        assert!((s.stdev() - 2.0).abs() < 1e-9);
        assert_eq!(s.max(), 6.0);
    }

    #[test]
    fn per_sec_clamps_zero_interval() {
        let v = per_sec(3, 0.0);
        assert!(v.is_finite());
    }

    #[test]
    fn window_reports_deltas_between_snapshots() {
        let mut w = LiveWindow::default();
        let mut s = MetricSnapshot::default();
        s.requests.count = 10;
        s.requests.failure = 1;

        let first = w.advance(&s, Duration::from_secs(1));
        assert!((first.requests_per_sec - 10.0).abs() < 1e-9);
        assert!((first.error_rate - 0.1).abs() < 1e-9);

        s.requests.count = 30;
        s.requests.failure = 1;
        let second = w.advance(&s, Duration::from_secs(2));
        assert!((second.requests_per_sec - 10.0).abs() < 1e-9);
        assert_eq!(second.error_rate, 0.0);
        assert!((second.rps_max - 10.0).abs() < 1e-9);
    }
}

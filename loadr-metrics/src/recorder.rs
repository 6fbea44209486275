use std::sync::OnceLock;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use ahash::AHashMap;
use parking_lot::{Mutex, MutexGuard};

use crate::outcome::{ErrorKind, IterationOutcome, IterationStatus, RequestOutcome};
use crate::snapshot::{CheckTally, IterationStats, MetricSnapshot, RequestStats};
use crate::trend::Trend;

static NEXT_SHARD_SEED: AtomicUsize = AtomicUsize::new(0);

thread_local! {
    // Runtime worker threads get distinct seeds, so concurrent VUs mostly hit distinct shards.
    static SHARD_SEED: usize = NEXT_SHARD_SEED.fetch_add(1, Ordering::Relaxed);
}

#[derive(Debug, Default, Clone, Copy)]
struct CheckCounts {
    passes: u64,
    fails: u64,
}

#[derive(Debug, Default)]
struct Shard {
    requests: u64,
    failed: u64,
    bytes_received: u64,
    bytes_sent: u64,
    latency: Trend,
    errors: AHashMap<ErrorKind, u64>,
    statuses: AHashMap<u16, u64>,

    iterations: u64,
    script_errors: u64,
    iteration_duration: Trend,

    checks: AHashMap<Box<str>, CheckCounts>,
}

impl Shard {
    fn record_request(&mut self, outcome: &RequestOutcome) {
        self.requests = self.requests.saturating_add(1);
        if !outcome.is_success() {
            self.failed = self.failed.saturating_add(1);
        }
        self.bytes_received = self.bytes_received.saturating_add(outcome.bytes_received);
        self.bytes_sent = self.bytes_sent.saturating_add(outcome.bytes_sent);

        if outcome.has_latency() {
            self.latency.record(outcome.duration);
        }
        if let Some(kind) = outcome.error {
            *self.errors.entry(kind).or_insert(0) += 1;
        }
        if let Some(status) = outcome.status {
            *self.statuses.entry(status).or_insert(0) += 1;
        }
    }

    fn record_iteration(&mut self, outcome: &IterationOutcome) {
        self.iterations = self.iterations.saturating_add(1);
        if outcome.status == IterationStatus::ScriptError {
            self.script_errors = self.script_errors.saturating_add(1);
        }
        self.iteration_duration.record(outcome.duration);
    }

    fn record_check(&mut self, name: &str, passed: bool) {
        if !self.checks.contains_key(name) {
            self.checks.insert(Box::from(name), CheckCounts::default());
        }
        let Some(counts) = self.checks.get_mut(name) else {
            return;
        };
        if passed {
            counts.passes = counts.passes.saturating_add(1);
        } else {
            counts.fails = counts.fails.saturating_add(1);
        }
    }
}

/// Shared accumulator for every outcome produced during a run.
///
/// State is split across independently locked shards; a writer only ever holds one shard
/// lock for the duration of a single `record_*` call. [`Recorder::snapshot`] takes every shard
/// lock (always in index order) before reading, which makes the snapshot a linearizable cut:
/// every call that returned before the snapshot started is included, and no call is ever
/// observed half-applied.
#[derive(Debug)]
pub struct Recorder {
    shards: Box<[Mutex<Shard>]>,
    started: OnceLock<Instant>,
}

impl Default for Recorder {
    fn default() -> Self {
        let shards = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4)
            .saturating_mul(2);
        Self::with_shards(shards)
    }
}

impl Recorder {
    #[must_use]
    pub fn with_shards(shards: usize) -> Self {
        let shards = (0..shards.max(1))
            .map(|_| Mutex::new(Shard::default()))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self {
            shards,
            started: OnceLock::new(),
        }
    }

    /// Starts the clock used for `MetricSnapshot::elapsed`. Only the first call has an effect.
    pub fn start_clock(&self, at: Instant) {
        let _ = self.started.set(at);
    }

    pub fn elapsed(&self) -> Duration {
        self.started
            .get()
            .map(Instant::elapsed)
            .unwrap_or(Duration::ZERO)
    }

    fn shard(&self) -> MutexGuard<'_, Shard> {
        let seed = SHARD_SEED.with(|s| *s);
        self.shards[seed % self.shards.len()].lock()
    }

    pub fn record(&self, outcome: &RequestOutcome) {
        self.shard().record_request(outcome);
    }

    pub fn record_iteration(&self, outcome: &IterationOutcome) {
        self.shard().record_iteration(outcome);
    }

    pub fn record_check(&self, name: &str, passed: bool) {
        self.shard().record_check(name, passed);
    }

    pub fn snapshot(&self) -> MetricSnapshot {
        let guards: Vec<MutexGuard<'_, Shard>> = self.shards.iter().map(|s| s.lock()).collect();
        let elapsed = self.elapsed();

        let mut requests = RequestStats::default();
        let mut iterations = IterationStats::default();
        let mut checks: AHashMap<&str, CheckCounts> = AHashMap::new();
        let mut snapshot = MetricSnapshot {
            elapsed,
            ..MetricSnapshot::default()
        };

        for shard in &guards {
            requests.count = requests.count.saturating_add(shard.requests);
            requests.failure = requests.failure.saturating_add(shard.failed);
            requests.bytes_received = requests.bytes_received.saturating_add(shard.bytes_received);
            requests.bytes_sent = requests.bytes_sent.saturating_add(shard.bytes_sent);
            requests.latency.merge(&shard.latency);

            for (kind, n) in &shard.errors {
                *snapshot.errors_by_kind.entry(*kind).or_insert(0) += n;
            }
            for (status, n) in &shard.statuses {
                *snapshot.status_codes.entry(*status).or_insert(0) += n;
            }

            iterations.count = iterations.count.saturating_add(shard.iterations);
            iterations.script_errors = iterations
                .script_errors
                .saturating_add(shard.script_errors);
            iterations.duration.merge(&shard.iteration_duration);

            for (name, c) in &shard.checks {
                let acc = checks.entry(name.as_ref()).or_default();
                acc.passes = acc.passes.saturating_add(c.passes);
                acc.fails = acc.fails.saturating_add(c.fails);
            }
        }

        let mut tallies: Vec<CheckTally> = checks
            .into_iter()
            .map(|(name, c)| CheckTally {
                name: name.to_string(),
                passes: c.passes,
                fails: c.fails,
            })
            .collect();
        drop(guards);

        tallies.sort_by(|a, b| a.name.cmp(&b.name));
        requests.success = requests.count.saturating_sub(requests.failure);

        snapshot.requests = requests;
        snapshot.iterations = iterations;
        snapshot.checks = tallies;
        snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn ok(ms: u64) -> RequestOutcome {
        RequestOutcome::from_status(Duration::from_millis(ms), 200, 100, 50)
    }

    #[test]
    fn concurrent_records_are_never_lost() {
        let recorder = Arc::new(Recorder::with_shards(4));
        let threads = 8;
        let per_thread = 2_000u64;

        let handles: Vec<_> = (0..threads)
            .map(|t| {
                let recorder = recorder.clone();
                std::thread::spawn(move || {
                    for i in 0..per_thread {
                        if (i + t) % 10 == 0 {
                            recorder.record(&RequestOutcome::from_error(
                                Duration::from_millis(1),
                                ErrorKind::Timeout,
                                10,
                            ));
                        } else {
                            recorder.record(&ok(2));
                        }
                        recorder.record_check("status is 200", i % 2 == 0);
                    }
                })
            })
            .collect();

        for h in handles {
            if h.join().is_err() {
                panic!("recorder thread panicked");
            }
        }

        let snap = recorder.snapshot();
        let total = threads * per_thread;
        assert_eq!(snap.requests.count, total);
        assert_eq!(snap.requests.success + snap.requests.failure, total);
        assert_eq!(snap.requests.latency.count(), total);
        assert_eq!(snap.errors_of(ErrorKind::Timeout), snap.requests.failure);
        assert_eq!(snap.checks.len(), 1);
        assert_eq!(snap.checks[0].total(), total);
    }

    #[test]
    fn snapshots_during_writes_never_see_partial_records() {
        use std::sync::Barrier;
        use std::sync::atomic::AtomicBool;

        let recorder = Arc::new(Recorder::with_shards(4));
        let writers = 6;
        let per_writer = 5_000u64;
        let start = Arc::new(Barrier::new(writers + 1));
        let done = Arc::new(AtomicBool::new(false));

        let handles: Vec<_> = (0..writers)
            .map(|w| {
                let recorder = recorder.clone();
                let start = start.clone();
                std::thread::spawn(move || {
                    start.wait();
                    for i in 0..per_writer {
                        if (i + w as u64) % 7 == 0 {
                            recorder.record(&RequestOutcome::from_error(
                                Duration::from_millis(1),
                                ErrorKind::Timeout,
                                10,
                            ));
                        } else {
                            recorder.record(&ok(2));
                        }
                    }
                })
            })
            .collect();

        let watcher = {
            let done = done.clone();
            let recorder = recorder.clone();
            std::thread::spawn(move || {
                let mut last = 0u64;
                let mut seen = 0u64;
                loop {
                    let finished = done.load(Ordering::Acquire);
                    let snap = recorder.snapshot();
                    let req = &snap.requests;

                    assert!(req.count >= last, "count went back: {} < {last}", req.count);
                    assert_eq!(req.success + req.failure, req.count);
                    assert_eq!(req.latency.count(), req.count);
                    assert_eq!(snap.errors_of(ErrorKind::Timeout), req.failure);
                    assert_eq!(
                        snap.status_codes.get(&200).copied().unwrap_or(0),
                        req.success
                    );
                    assert_eq!(req.bytes_received, req.success * 100);
                    assert_eq!(req.bytes_sent, req.success * 50 + req.failure * 10);

                    last = req.count;
                    seen += 1;
                    if finished {
                        return (last, seen);
                    }
                }
            })
        };

        start.wait();
        for h in handles {
            if h.join().is_err() {
                panic!("recorder thread panicked");
            }
        }
        done.store(true, Ordering::Release);

        let (final_count, seen) = watcher
            .join()
            .unwrap_or_else(|_| panic!("snapshot thread panicked"));
        assert_eq!(final_count, writers as u64 * per_writer);
        assert!(seen > 1);
    }

    #[test]
    fn snapshot_is_idempotent_without_writes() {
        let recorder = Recorder::with_shards(3);
        recorder.record(&ok(5));
        recorder.record(&ok(7));
        recorder.record_iteration(&IterationOutcome {
            duration: Duration::from_millis(12),
            status: IterationStatus::Completed,
        });
        recorder.record_check("body", true);

        let a = recorder.snapshot();
        let b = recorder.snapshot();
        assert_eq!(a, b);
    }

    #[test]
    fn snapshot_is_a_copy() {
        let recorder = Recorder::with_shards(2);
        recorder.record(&ok(5));
        let before = recorder.snapshot();
        recorder.record(&ok(5));
        let after = recorder.snapshot();

        assert_eq!(before.requests.count, 1);
        assert_eq!(after.requests.count, 2);
    }

    #[test]
    fn script_errors_count_as_failures_without_latency() {
        let recorder = Recorder::with_shards(1);
        recorder.record(&RequestOutcome::script_error(Duration::from_millis(3)));
        recorder.record_iteration(&IterationOutcome {
            duration: Duration::from_millis(3),
            status: IterationStatus::ScriptError,
        });

        let snap = recorder.snapshot();
        assert_eq!(snap.requests.count, 1);
        assert_eq!(snap.requests.failure, 1);
        assert!(snap.requests.latency.is_empty());
        assert_eq!(snap.iterations.script_errors, 1);
        assert_eq!(snap.errors_of(ErrorKind::ScriptError), 1);
    }

    #[test]
    fn status_codes_are_tallied() {
        let recorder = Recorder::with_shards(2);
        recorder.record(&ok(1));
        recorder.record(&RequestOutcome::from_status(Duration::from_millis(1), 500, 0, 0));

        let snap = recorder.snapshot();
        assert_eq!(snap.status_codes.get(&200), Some(&1));
        assert_eq!(snap.status_codes.get(&500), Some(&1));
        assert_eq!(snap.requests.failure_rate(), Some(0.5));
    }

    #[test]
    fn zero_shards_is_clamped() {
        let recorder = Recorder::with_shards(0);
        assert_eq!(recorder.shards.len(), 1);
        recorder.record(&ok(1));
        assert_eq!(recorder.snapshot().requests.count, 1);
    }
}

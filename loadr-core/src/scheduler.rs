use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use loadr_metrics::{LiveWindow, Recorder};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::config::{MAX_DURATION, RunPlan, SCHEDULING_QUANTUM};
use crate::http::HttpClient;
use crate::iteration::Iteration;
use crate::progress::{ProgressFn, ProgressUpdate};
use crate::runner::run_vu;
use crate::schedule::VuSchedule;
use crate::signal::{StopReason, StopSignal};
use crate::summary::{RunInfo, RunResult, finalize};
use crate::thresholds::{ThresholdSpec, abort_triggers, evaluate};
use crate::vu::{VirtualUser, VuContext};

/// Live counters readable while a run is in progress.
#[derive(Debug, Default)]
pub struct RunStatus {
    active_vus: AtomicU64,
    target_vus: AtomicU64,
}

impl RunStatus {
    pub fn active_vus(&self) -> u64 {
        self.active_vus.load(Ordering::Relaxed)
    }

    pub fn target_vus(&self) -> u64 {
        self.target_vus.load(Ordering::Relaxed)
    }
}

/// Owns the VU pool for one run. The only component that changes the target
/// VU count or issues stop signals.
pub struct Scheduler {
    plan: RunPlan,
    client: Arc<HttpClient>,
    recorder: Arc<Recorder>,
    stop: Arc<StopSignal>,
    status: Arc<RunStatus>,
    progress: Option<(ProgressFn, Duration)>,
}

impl Scheduler {
    pub fn new(plan: RunPlan) -> Self {
        Self {
            plan,
            client: Arc::new(HttpClient::default()),
            recorder: Arc::new(Recorder::default()),
            stop: Arc::new(StopSignal::new()),
            status: Arc::new(RunStatus::default()),
            progress: None,
        }
    }

    #[must_use]
    pub fn with_client(mut self, client: HttpClient) -> Self {
        self.client = Arc::new(client);
        self
    }

    #[must_use]
    pub fn with_progress(mut self, progress: ProgressFn, interval: Duration) -> Self {
        self.progress = Some((progress, interval.max(SCHEDULING_QUANTUM)));
        self
    }

    pub fn recorder(&self) -> Arc<Recorder> {
        self.recorder.clone()
    }

    /// Raising this signal stops the run through the same path as the timeout.
    pub fn stop_handle(&self) -> Arc<StopSignal> {
        self.stop.clone()
    }

    pub fn status(&self) -> Arc<RunStatus> {
        self.status.clone()
    }

    pub async fn run<I: Iteration>(self, iteration: I) -> RunResult {
        let Self {
            plan,
            client,
            recorder,
            stop,
            status,
            progress,
        } = self;

        let total = plan.total_duration();
        let started = Instant::now();
        recorder.start_clock(started.into_std());

        tracing::info!(
            max_vus = plan.max_vus(),
            duration = ?total,
            stages = plan.schedule.stages().len(),
            ramp = %plan.schedule.mode(),
            thresholds = plan.thresholds.len(),
            "run started"
        );

        let evaluator = (!plan.thresholds.is_empty()).then(|| {
            tokio::spawn(watch_thresholds(
                recorder.clone(),
                plan.thresholds.clone(),
                plan.threshold_interval,
                stop.clone(),
            ))
        });

        let reporter = progress.map(|(callback, interval)| {
            tokio::spawn(report_progress(ProgressReporter {
                callback,
                interval,
                recorder: recorder.clone(),
                status: status.clone(),
                schedule: plan.schedule.clone(),
                started,
            }))
        });

        let mut pool = VuPool {
            active: Vec::new(),
            retiring: Vec::new(),
            next_id: 1,
            incomplete: 0,
            max_active: 0,
            grace: plan.grace_period,
            iteration: Arc::new(iteration),
            run_stop: stop.clone(),
            client,
            recorder: recorder.clone(),
        };

        let mut ticker = tokio::time::interval(SCHEDULING_QUANTUM);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let timeout = tokio::time::sleep_until(deadline_after(started, total));
        tokio::pin!(timeout);

        let mut last_target: Option<u64> = None;
        loop {
            tokio::select! {
                biased;
                _ = stop.wait() => break,
                _ = &mut timeout => {
                    stop.stop(StopReason::DurationElapsed);
                    break;
                }
                _ = ticker.tick() => {}
            }

            let elapsed = started.elapsed();
            let target = plan.schedule.target_at(elapsed);
            if last_target != Some(target) {
                tracing::debug!(
                    target_vus = target,
                    active_vus = pool.active.len(),
                    elapsed = ?elapsed,
                    "ramping"
                );
                last_target = Some(target);
            }

            status.target_vus.store(target, Ordering::Relaxed);
            pool.scale_to(target);
            pool.reap();
            status
                .active_vus
                .store(pool.active.len() as u64, Ordering::Relaxed);
        }

        let stop_reason = stop
            .reason()
            .cloned()
            .unwrap_or(StopReason::DurationElapsed);
        tracing::info!(
            reason = %stop_reason,
            elapsed = ?started.elapsed(),
            "stopping virtual users"
        );

        status.target_vus.store(0, Ordering::Relaxed);
        let max_active_vus = pool.max_active;
        let incomplete_iterations = pool.shutdown().await;
        status.active_vus.store(0, Ordering::Relaxed);

        for task in evaluator.into_iter().chain(reporter) {
            task.abort();
        }

        let elapsed = started.elapsed();
        let snapshot = recorder.snapshot();
        let verdicts = evaluate(&snapshot, &plan.thresholds);
        let result = finalize(
            snapshot,
            verdicts,
            RunInfo {
                stop_reason,
                incomplete_iterations,
                elapsed,
                max_active_vus,
            },
        );

        tracing::info!(
            passed = result.passed,
            requests = result.snapshot.requests.count,
            iterations = result.snapshot.iterations.count,
            incomplete = result.incomplete_iterations,
            fatal = ?result.fatal,
            elapsed = ?elapsed,
            "run finished"
        );
        result
    }
}

/// Runs `plan` with the default client and recorder.
pub async fn run<I: Iteration>(plan: RunPlan, iteration: I) -> RunResult {
    Scheduler::new(plan).run(iteration).await
}

/// `from + after`, clamped so an oversized duration never overflows the clock.
fn deadline_after(from: Instant, after: Duration) -> Instant {
    from.checked_add(after)
        .or_else(|| from.checked_add(MAX_DURATION))
        .unwrap_or(from)
}

struct VuHandle {
    vu: Arc<VirtualUser>,
    task: JoinHandle<()>,
}

struct Retiring {
    handle: VuHandle,
    deadline: Instant,
}

struct VuPool {
    /// Ordered by id; ramp-down pops from the back.
    active: Vec<VuHandle>,
    retiring: Vec<Retiring>,
    next_id: u64,
    incomplete: u64,
    max_active: u64,
    grace: Duration,
    iteration: Arc<dyn Iteration>,
    run_stop: Arc<StopSignal>,
    client: Arc<HttpClient>,
    recorder: Arc<Recorder>,
}

impl VuPool {
    fn scale_to(&mut self, target: u64) {
        let current = self.active.len() as u64;

        if target > current {
            for _ in current..target {
                self.spawn();
            }
        } else if target < current {
            let deadline = deadline_after(Instant::now(), self.grace);
            while self.active.len() as u64 > target {
                let Some(handle) = self.active.pop() else {
                    break;
                };
                handle.vu.request_stop();
                self.retiring.push(Retiring { handle, deadline });
            }
        }

        self.max_active = self.max_active.max(self.active.len() as u64);
    }

    fn spawn(&mut self) {
        let id = self.next_id;
        self.next_id = self.next_id.saturating_add(1);

        let vu = Arc::new(VirtualUser::new(id));
        let ctx = VuContext::new(
            vu.clone(),
            self.run_stop.clone(),
            self.client.clone(),
            self.recorder.clone(),
        );
        let task = tokio::spawn(run_vu(ctx, self.iteration.clone()));
        self.active.push(VuHandle { vu, task });
    }

    /// Drops retired VUs that finished; aborts those past their grace deadline.
    fn reap(&mut self) {
        let now = Instant::now();
        let mut abandoned = 0_u64;
        self.retiring.retain(|r| {
            if r.handle.task.is_finished() {
                return false;
            }
            if now >= r.deadline {
                tracing::warn!(
                    vu = r.handle.vu.id(),
                    "retired VU exceeded grace period, aborting"
                );
                r.handle.task.abort();
                abandoned += 1;
                return false;
            }
            true
        });
        self.incomplete = self.incomplete.saturating_add(abandoned);
    }

    /// Stops every VU and waits for them, bounded by the grace period.
    /// Returns the number of abandoned in-flight iterations.
    async fn shutdown(mut self) -> u64 {
        for handle in &self.active {
            handle.vu.request_stop();
        }

        let deadline = deadline_after(Instant::now(), self.grace);
        let pending = self
            .active
            .drain(..)
            .map(|handle| (handle, deadline))
            .chain(
                self.retiring
                    .drain(..)
                    .map(|r| (r.handle, r.deadline.min(deadline))),
            )
            .collect::<Vec<_>>();

        let mut abandoned = Vec::new();
        for (mut handle, deadline) in pending {
            match tokio::time::timeout_at(deadline, &mut handle.task).await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    tracing::warn!(vu = handle.vu.id(), error = %err, "VU task failed");
                }
                Err(_) => {
                    handle.task.abort();
                    abandoned.push(handle.vu.id());
                }
            }
        }

        if !abandoned.is_empty() {
            tracing::warn!(
                count = abandoned.len(),
                vus = ?abandoned,
                grace = ?self.grace,
                "VUs still running after grace period were abandoned"
            );
        }
        self.incomplete.saturating_add(abandoned.len() as u64)
    }
}

async fn watch_thresholds(
    recorder: Arc<Recorder>,
    specs: Vec<ThresholdSpec>,
    interval: Duration,
    stop: Arc<StopSignal>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately; nothing has been recorded yet.
    ticker.tick().await;

    loop {
        ticker.tick().await;
        if stop.is_stopped() {
            return;
        }

        let snapshot = recorder.snapshot();
        let verdicts = evaluate(&snapshot, &specs);
        if let Some(verdict) = abort_triggers(&verdicts, snapshot.elapsed).next() {
            tracing::warn!(
                threshold = %verdict.spec,
                observed = ?verdict.observed,
                "threshold failed, aborting run"
            );
            stop.stop(StopReason::ThresholdAbort {
                threshold: verdict.spec.to_string(),
            });
            return;
        }
    }
}

struct ProgressReporter {
    callback: ProgressFn,
    interval: Duration,
    recorder: Arc<Recorder>,
    status: Arc<RunStatus>,
    schedule: VuSchedule,
    started: Instant,
}

async fn report_progress(reporter: ProgressReporter) {
    let mut ticker = tokio::time::interval(reporter.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.tick().await;

    let mut window = LiveWindow::default();
    let mut tick: u64 = 0;
    let mut last_at = reporter.started;

    loop {
        ticker.tick().await;

        tick = tick.saturating_add(1);
        let now = Instant::now();
        let dt = now.duration_since(last_at);
        last_at = now;

        let elapsed = reporter.started.elapsed();
        let snapshot = reporter.recorder.snapshot();
        let rates = window.advance(&snapshot, dt);

        (reporter.callback)(ProgressUpdate {
            tick,
            elapsed,
            interval: dt,
            total_duration: reporter.schedule.total_duration(),
            active_vus: reporter.status.active_vus(),
            target_vus: reporter.status.target_vus(),
            stage: reporter.schedule.stage_snapshot_at(elapsed),
            rates,
            snapshot,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{RunOptions, Stage};
    use crate::iteration::ScriptError;

    fn plan(opts: RunOptions) -> RunPlan {
        RunPlan::from_options(opts).unwrap_or_else(|e| panic!("{e}"))
    }

    #[test]
    fn deadline_after_clamps_oversized_durations() {
        let now = Instant::now();
        assert_eq!(
            deadline_after(now, Duration::from_secs(1)),
            now + Duration::from_secs(1)
        );

        let far = deadline_after(now, Duration::from_secs(u64::MAX));
        assert!(far > now);
    }

    #[tokio::test]
    async fn runs_until_duration_elapses() {
        let plan = plan(RunOptions {
            vus: Some(2),
            duration: Some(Duration::from_millis(300)),
            ..RunOptions::default()
        });

        let result = run(plan, |vu: VuContext| async move {
            vu.sleep(Duration::from_millis(10)).await;
            Ok::<_, ScriptError>(())
        })
        .await;

        assert_eq!(result.stop_reason, StopReason::DurationElapsed);
        assert_eq!(result.max_active_vus, 2);
        assert_eq!(result.incomplete_iterations, 0);
        assert!(result.snapshot.iterations.count >= 2);
        assert!(result.elapsed >= Duration::from_millis(300));
        assert!(result.passed);
    }

    #[tokio::test]
    async fn stuck_iterations_are_abandoned_after_grace() {
        let plan = plan(RunOptions {
            vus: Some(3),
            duration: Some(Duration::from_millis(100)),
            grace_period: Some(Duration::from_millis(100)),
            ..RunOptions::default()
        });

        // Plain tokio sleep: does not wake up on stop.
        let result = run(plan, |_vu: VuContext| async move {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok::<_, ScriptError>(())
        })
        .await;

        assert_eq!(result.incomplete_iterations, 3);
        assert_eq!(result.snapshot.iterations.count, 0);
        assert!(result.elapsed < Duration::from_secs(5));
        assert!(result.passed, "abandoned iterations are not failures");
    }

    #[tokio::test]
    async fn ramp_down_retires_vus() {
        let plan = plan(RunOptions {
            stages: vec![
                Stage {
                    target: 4,
                    duration: Duration::from_millis(300),
                },
                Stage {
                    target: 1,
                    duration: Duration::from_millis(300),
                },
            ],
            ..RunOptions::default()
        });

        let scheduler = Scheduler::new(plan);
        let status = scheduler.status();
        let handle = tokio::spawn(scheduler.run(|vu: VuContext| async move {
            vu.sleep(Duration::from_millis(5)).await;
            Ok::<_, ScriptError>(())
        }));

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(status.active_vus(), 4);
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(status.active_vus(), 1);

        let result = handle.await.unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(result.max_active_vus, 4);
        assert_eq!(status.active_vus(), 0);
    }

    #[tokio::test]
    async fn external_stop_ends_the_run_early() {
        let plan = plan(RunOptions {
            vus: Some(1),
            duration: Some(Duration::from_secs(30)),
            ..RunOptions::default()
        });

        let scheduler = Scheduler::new(plan);
        let stop = scheduler.stop_handle();
        let handle = tokio::spawn(scheduler.run(|vu: VuContext| async move {
            vu.sleep(Duration::from_millis(20)).await;
            Ok::<_, ScriptError>(())
        }));

        tokio::time::sleep(Duration::from_millis(100)).await;
        stop.stop(StopReason::Interrupted);

        let result = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap_or_else(|_| panic!("run did not stop"))
            .unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(result.stop_reason, StopReason::Interrupted);
        assert!(result.elapsed < Duration::from_secs(5));
    }
}

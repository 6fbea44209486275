use std::pin::pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU64, Ordering};
use std::time::{Duration, Instant, SystemTime};

use loadr_metrics::{Recorder, RequestOutcome};
use tokio::sync::Notify;

use crate::http::{HttpClient, HttpRequest, HttpResponse};
use crate::signal::StopSignal;

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
#[repr(u8)]
pub enum VuState {
    Idle = 0,
    Running = 1,
    Stopping = 2,
    Stopped = 3,
}

impl VuState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Idle,
            1 => Self::Running,
            2 => Self::Stopping,
            _ => Self::Stopped,
        }
    }
}

/// Scheduler-side handle on one VU. Only the scheduler requests stops; only the
/// VU's own runner moves it to `Running` and `Stopped`.
#[derive(Debug)]
pub struct VirtualUser {
    id: u64,
    state: AtomicU8,
    stop: AtomicBool,
    notify: Notify,
}

impl VirtualUser {
    pub(crate) fn new(id: u64) -> Self {
        Self {
            id,
            state: AtomicU8::new(VuState::Idle as u8),
            stop: AtomicBool::new(false),
            notify: Notify::new(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn state(&self) -> VuState {
        VuState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub(crate) fn set_state(&self, state: VuState) {
        self.state.store(state as u8, Ordering::Release);
    }

    /// Cooperative: the current iteration finishes first.
    pub(crate) fn request_stop(&self) {
        self.stop.store(true, Ordering::Release);
        // Idle VUs have not started a loop yet; leave the transition to the runner.
        let _ = self.state.compare_exchange(
            VuState::Running as u8,
            VuState::Stopping as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
        self.notify.notify_waiters();
    }

    pub(crate) fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }
}

/// Everything an iteration gets to talk to: HTTP, checks, pauses.
///
/// Cloning is cheap; all clones refer to the same VU.
#[derive(Debug, Clone)]
pub struct VuContext {
    vu: Arc<VirtualUser>,
    run_stop: Arc<StopSignal>,
    client: Arc<HttpClient>,
    recorder: Arc<Recorder>,
    requests: Arc<AtomicU64>,
}

impl VuContext {
    pub(crate) fn new(
        vu: Arc<VirtualUser>,
        run_stop: Arc<StopSignal>,
        client: Arc<HttpClient>,
        recorder: Arc<Recorder>,
    ) -> Self {
        Self {
            vu,
            run_stop,
            client,
            recorder,
            requests: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn vu_id(&self) -> u64 {
        self.vu.id()
    }

    /// True once this VU was retired or the whole run was told to stop.
    pub fn is_stopping(&self) -> bool {
        self.vu.stop_requested() || self.run_stop.is_stopped()
    }

    pub(crate) fn virtual_user(&self) -> &VirtualUser {
        &self.vu
    }

    pub(crate) fn recorder(&self) -> &Recorder {
        &self.recorder
    }

    /// Requests sent since the last call.
    pub(crate) fn take_request_count(&self) -> u64 {
        self.requests.swap(0, Ordering::AcqRel)
    }

    /// Sends `req` and records exactly one outcome before returning. Transport
    /// failures are reported through `HttpResponse::error`, never as `Err`.
    pub async fn request(&self, req: HttpRequest) -> HttpResponse {
        let bytes_sent_estimate = HttpClient::estimate_sent(&req);
        let timestamp = SystemTime::now();
        let started = Instant::now();
        let result = self.client.request(req).await;
        let duration = started.elapsed();

        let (outcome, response) = match result {
            Ok(mut res) => {
                res.duration = duration;
                let outcome = RequestOutcome::from_status(
                    duration,
                    res.status,
                    res.bytes_received,
                    res.bytes_sent,
                );
                (outcome, res)
            }
            Err(err) => {
                let kind = err.kind();
                tracing::trace!(vu = self.vu_id(), error = %err, %kind, "request failed");
                let outcome = RequestOutcome::from_error(duration, kind, bytes_sent_estimate);
                let res =
                    HttpResponse::failed(duration, bytes_sent_estimate, kind, err.to_string());
                (outcome, res)
            }
        };

        self.recorder.record(&RequestOutcome {
            timestamp,
            ..outcome
        });
        self.requests.fetch_add(1, Ordering::Relaxed);
        response
    }

    pub async fn get(&self, url: &str) -> HttpResponse {
        self.request(HttpRequest::get(url)).await
    }

    /// Runs every labelled predicate against `value`, tallying each label.
    /// Returns `true` only if all of them passed.
    pub fn check<T: ?Sized>(&self, value: &T, checks: &[(&str, &dyn Fn(&T) -> bool)]) -> bool {
        let mut all = true;
        for (name, predicate) in checks {
            let passed = predicate(value);
            self.recorder.record_check(name, passed);
            all &= passed;
        }
        all
    }

    /// Pauses this VU only. Returns early when the VU or the run is stopping.
    pub async fn sleep(&self, duration: Duration) {
        let mut vu_stop = pin!(self.vu.notify.notified());
        vu_stop.as_mut().enable();
        if self.is_stopping() {
            return;
        }

        tokio::select! {
            _ = tokio::time::sleep(duration) => {}
            _ = &mut vu_stop => {}
            _ = self.run_stop.wait() => {}
        }
    }
}

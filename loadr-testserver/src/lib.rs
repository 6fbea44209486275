use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::time::{Duration, sleep};

pub const PATH_ROOT: &str = "/";
pub const PATH_SLOW: &str = "/slow";
pub const PATH_FAIL: &str = "/fail";
pub const PATH_STALL: &str = "/stall";
pub const PATH_ECHO: &str = "/echo";

/// Body served from `/`, matching what a healthy backend behind the proxy returns.
pub const ROOT_BODY: &str = "hello from varnish backend\n";

pub const SLOW_DELAY: Duration = Duration::from_millis(50);
pub const STALL_DELAY: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Default)]
pub struct TestServerStats {
    requests_total: Arc<AtomicU64>,
}

impl TestServerStats {
    fn inc_requests_total(&self) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn requests_total(&self) -> u64 {
        self.requests_total.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Clone)]
pub struct TestServerUrls {
    pub base_url: String,
    pub root: String,
    pub slow: String,
    pub fail: String,
    pub stall: String,
    pub echo: String,
}

impl TestServerUrls {
    pub fn new(base_url: String) -> Self {
        Self {
            root: format!("{base_url}{PATH_ROOT}"),
            slow: format!("{base_url}{PATH_SLOW}"),
            fail: format!("{base_url}{PATH_FAIL}"),
            stall: format!("{base_url}{PATH_STALL}"),
            echo: format!("{base_url}{PATH_ECHO}"),
            base_url,
        }
    }
}

async fn handle_root(State(stats): State<TestServerStats>) -> &'static str {
    stats.inc_requests_total();
    ROOT_BODY
}

async fn handle_slow(State(stats): State<TestServerStats>) -> &'static str {
    stats.inc_requests_total();
    sleep(SLOW_DELAY).await;
    "slow"
}

async fn handle_fail(State(stats): State<TestServerStats>) -> (StatusCode, &'static str) {
    stats.inc_requests_total();
    (StatusCode::INTERNAL_SERVER_ERROR, "failure")
}

async fn handle_stall(State(stats): State<TestServerStats>) -> &'static str {
    stats.inc_requests_total();
    sleep(STALL_DELAY).await;
    "stalled"
}

async fn handle_echo(State(stats): State<TestServerStats>, body: Bytes) -> Bytes {
    stats.inc_requests_total();
    body
}

pub fn router(stats: TestServerStats) -> Router {
    Router::new()
        .route(PATH_ROOT, get(handle_root))
        .route(PATH_SLOW, get(handle_slow))
        .route(PATH_FAIL, get(handle_fail))
        .route(PATH_STALL, get(handle_stall))
        .route(PATH_ECHO, post(handle_echo))
        .with_state(stats)
}

pub struct TestServer {
    addr: SocketAddr,
    urls: TestServerUrls,
    stats: TestServerStats,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: Option<tokio::task::JoinHandle<()>>,
}

impl TestServer {
    pub async fn start() -> std::io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let stats = TestServerStats::default();
        let app = router(stats.clone());

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            let serve = axum::serve(listener, app).with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            });
            let _ = serve.await;
        });

        Ok(Self {
            addr,
            urls: TestServerUrls::new(format!("http://{addr}")),
            stats,
            shutdown_tx: Some(shutdown_tx),
            task: Some(task),
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn base_url(&self) -> &str {
        &self.urls.base_url
    }

    pub fn urls(&self) -> &TestServerUrls {
        &self.urls
    }

    pub fn stats(&self) -> &TestServerStats {
        &self.stats
    }

    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        // Graceful shutdown waits for in-flight requests; `/stall` would hold it for a minute.
        if let Some(task) = self.task.take() {
            let _ = tokio::time::timeout(Duration::from_secs(1), task).await;
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

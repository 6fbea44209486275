use std::sync::Arc;
use std::time::Duration;

use loadr_core::http::HttpClient;
use loadr_core::{RunOptions, RunPlan, Scheduler, StopReason, ThresholdSpec, VuContext};

use crate::cli::RunArgs;
use crate::config_file::{ConfigFile, YamlDuration};
use crate::exit_codes::ExitCode;
use crate::output::{self, RunHeader};
use crate::run_error::RunError;
use crate::smoke::{
    DEFAULT_BASE_URL, DEFAULT_EXPECT_STATUS, DEFAULT_PATH, DEFAULT_SLEEP, SmokeIteration,
    target_url,
};

const DEFAULT_VUS: u64 = 5;
const DEFAULT_DURATION: Duration = Duration::from_secs(30);
const DEFAULT_THRESHOLDS: [&str; 2] = [
    "http_req_failed: rate<0.01",
    "http_req_duration: p(95)<500",
];

const CONNECT_TIMEOUT: Duration = Duration::from_secs(3);
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
const PROGRESS_INTERVAL: Duration = Duration::from_secs(1);

/// Everything a run needs after flags, the config file and defaults are merged.
#[derive(Debug)]
struct Settings {
    options: RunOptions,
    url: String,
    expect_status: u16,
    expect_body: Option<String>,
    sleep: Duration,
    request_timeout: Duration,
}

pub async fn run(args: RunArgs) -> Result<ExitCode, RunError> {
    let out = output::formatter(args.output);

    let file = match &args.config {
        Some(path) => ConfigFile::load(path)
            .await
            .map_err(RunError::InvalidInput)?,
        None => ConfigFile::default(),
    };

    let settings = resolve(&args, &file)?;
    let plan = RunPlan::from_options(settings.options)?;

    out.print_header(&RunHeader {
        target: &settings.url,
        plan: &plan,
    });
    tracing::debug!(
        url = %settings.url,
        expect_status = settings.expect_status,
        sleep = ?settings.sleep,
        request_timeout = ?settings.request_timeout,
        "smoke iteration configured"
    );

    let client = HttpClient::new(Some(CONNECT_TIMEOUT), Some(settings.request_timeout));
    let mut scheduler = Scheduler::new(plan).with_client(client);
    if let Some(progress) = out.progress() {
        scheduler = scheduler.with_progress(progress, PROGRESS_INTERVAL);
    }

    let stop = scheduler.stop_handle();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() && stop.stop(StopReason::Interrupted) {
            tracing::warn!("interrupted, waiting for virtual users to finish");
        }
    });

    let smoke = Arc::new(SmokeIteration::new(
        settings.url,
        settings.expect_status,
        settings.expect_body,
        settings.sleep,
    ));
    let result = scheduler
        .run(move |vu: VuContext| {
            let smoke = smoke.clone();
            async move { smoke.run(vu).await }
        })
        .await;
    interrupt.abort();

    out.print_summary(&result).map_err(RunError::RuntimeError)?;

    let code = ExitCode::from_result(&result);
    tracing::debug!(exit_code = code.as_i32(), passed = result.passed, "run finished");
    Ok(code)
}

/// Flags win over the file, the file wins over defaults.
fn resolve(args: &RunArgs, file: &ConfigFile) -> Result<Settings, RunError> {
    let stages = if args.stages.is_empty() {
        file.stages()
    } else {
        args.stages.clone()
    };

    let mut vus = args.vus.or(file.vus);
    let mut duration = args
        .duration
        .or_else(|| file.duration.map(YamlDuration::into_inner));
    if stages.is_empty() {
        vus = vus.or(Some(DEFAULT_VUS));
        duration = duration.or(Some(DEFAULT_DURATION));
    }

    let ramp_mode = match args.ramp {
        Some(mode) => mode,
        None => file.ramp_mode()?.unwrap_or_default(),
    };

    let base_url = args
        .base_url
        .as_deref()
        .or(file.base_url.as_deref())
        .unwrap_or(DEFAULT_BASE_URL);
    let path = args
        .path
        .as_deref()
        .or(file.path.as_deref())
        .unwrap_or(DEFAULT_PATH);

    Ok(Settings {
        options: RunOptions {
            vus,
            duration,
            stages,
            ramp_mode,
            thresholds: thresholds(args, file)?,
            grace_period: args
                .grace_period
                .or_else(|| file.grace_period.map(YamlDuration::into_inner)),
            threshold_interval: None,
        },
        url: target_url(base_url, path),
        expect_status: args
            .expect_status
            .or(file.expect_status)
            .unwrap_or(DEFAULT_EXPECT_STATUS),
        expect_body: args
            .expect_body
            .clone()
            .or_else(|| file.expect_body.clone()),
        sleep: args
            .sleep
            .or_else(|| file.sleep.map(YamlDuration::into_inner))
            .unwrap_or(DEFAULT_SLEEP),
        request_timeout: args
            .request_timeout
            .or_else(|| file.request_timeout.map(YamlDuration::into_inner))
            .unwrap_or(DEFAULT_REQUEST_TIMEOUT),
    })
}

/// Thresholds given as flags replace the file's; the defaults apply only when neither has any.
fn thresholds(args: &RunArgs, file: &ConfigFile) -> loadr_core::Result<Vec<ThresholdSpec>> {
    if !args.thresholds.is_empty() || !args.abort_thresholds.is_empty() {
        let mut specs = args
            .thresholds
            .iter()
            .map(|raw| ThresholdSpec::parse(raw))
            .collect::<loadr_core::Result<Vec<_>>>()?;
        for raw in &args.abort_thresholds {
            specs.push(ThresholdSpec::parse(raw)?.with_abort_on_fail(true));
        }
        return Ok(specs);
    }

    let from_file = file.thresholds()?;
    if !from_file.is_empty() {
        return Ok(from_file);
    }

    DEFAULT_THRESHOLDS
        .iter()
        .map(|raw| ThresholdSpec::parse(raw))
        .collect()
}

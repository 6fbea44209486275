use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

use loadr_core::{RampMode, Stage};

/// Bare integers are seconds; anything else goes through `humantime` (`250ms`, `1m30s`).
pub(crate) fn parse_duration(input: &str) -> Result<Duration, String> {
    let s = input.trim();
    if s.is_empty() {
        return Err("duration cannot be empty (expected e.g. 10s, 250ms, 1m)".to_string());
    }

    if s.bytes().all(|b| b.is_ascii_digit()) {
        return s
            .parse::<u64>()
            .map(Duration::from_secs)
            .map_err(|_| format!("duration '{s}' is too large"));
    }

    humantime::parse_duration(s)
        .map_err(|err| format!("invalid duration '{s}' ({err}; expected e.g. 10s, 250ms, 1m)"))
}

/// `TARGET:DURATION`, e.g. `10:30s`.
fn parse_stage(input: &str) -> Result<Stage, String> {
    let Some((target, duration)) = input.trim().split_once(':') else {
        return Err(format!(
            "invalid stage '{input}' (expected TARGET:DURATION, e.g. 10:30s)"
        ));
    };

    let target = target
        .trim()
        .parse::<u64>()
        .map_err(|_| format!("invalid stage target '{target}' (expected a VU count)"))?;
    let duration = parse_duration(duration)?;

    Ok(Stage { target, duration })
}

fn parse_ramp(input: &str) -> Result<RampMode, String> {
    RampMode::parse(input).map_err(|e| e.to_string())
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable progress on stderr and a summary on stdout.
    HumanReadable,
    /// Emit JSON progress and summary lines (NDJSON) to stdout.
    Json,
}

#[derive(Debug, Parser)]
#[command(
    name = "loadr",
    author,
    version,
    about = "HTTP load testing with declarative thresholds",
    long_about = "loadr drives virtual users against an HTTP target, records every request outcome and \
evaluates thresholds over the aggregated metrics.\n\nThe built-in iteration sends `GET {base-url}{path}`, \
checks the status (and optionally a body marker) and pauses before the next iteration.",
    after_help = "Examples:\n  loadr run --base-url http://127.0.0.1:8080\n  loadr run --vus 50 --duration 30s --threshold 'http_req_duration: p(95)<200'\n  loadr run --stage 10:30s --stage 50:1m --stage 0:10s --ramp linear\n  BASE_URL=http://varnish:80 loadr run --config smoke.yaml --output json"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run a load test against the target
    #[command(
        long_about = "Run the built-in smoke iteration with the configured virtual users.\n\nCLI flags override values from the --config file."
    )]
    Run(RunArgs),
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// YAML file with run options (flags override its values)
    #[arg(long, short = 'c', value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Target base URL [default: http://127.0.0.1:80]
    #[arg(long, env = "BASE_URL", value_name = "URL")]
    pub base_url: Option<String>,

    /// Request path appended to the base URL [default: /]
    #[arg(long)]
    pub path: Option<String>,

    /// Number of virtual users (starting target when stages are given)
    #[arg(long)]
    pub vus: Option<u64>,

    /// Test duration (e.g. 10s, 250ms, 1m)
    #[arg(long, value_parser = parse_duration)]
    pub duration: Option<Duration>,

    /// Ramp stage as TARGET:DURATION (repeatable, in order)
    #[arg(long = "stage", value_name = "TARGET:DURATION", value_parser = parse_stage)]
    pub stages: Vec<Stage>,

    /// How targets move between stages: stepped | linear
    #[arg(long, value_name = "MODE", value_parser = parse_ramp)]
    pub ramp: Option<RampMode>,

    /// Threshold as 'metric: expression' (repeatable)
    #[arg(long = "threshold", value_name = "EXPR")]
    pub thresholds: Vec<String>,

    /// Threshold that stops the run as soon as it fails (repeatable)
    #[arg(long = "abort-threshold", value_name = "EXPR")]
    pub abort_thresholds: Vec<String>,

    /// How long stopping VUs may finish their iteration [default: 30s]
    #[arg(long, value_parser = parse_duration)]
    pub grace_period: Option<Duration>,

    /// Per-request timeout, body included [default: 60s]
    #[arg(long, value_parser = parse_duration)]
    pub request_timeout: Option<Duration>,

    /// Status code the status check expects [default: 200]
    #[arg(long)]
    pub expect_status: Option<u16>,

    /// Text the response body must contain; without it no body check runs
    #[arg(long, value_name = "TEXT")]
    pub expect_body: Option<String>,

    /// Pause at the end of every iteration [default: 1s]
    #[arg(long, value_parser = parse_duration)]
    pub sleep: Option<Duration>,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::HumanReadable)]
    pub output: OutputFormat,
}

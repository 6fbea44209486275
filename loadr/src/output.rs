use crate::cli::OutputFormat;

mod human;
mod json;

/// What the run is about to do, shown before the first VU starts.
pub(crate) struct RunHeader<'a> {
    pub target: &'a str,
    pub plan: &'a loadr_core::RunPlan,
}

pub(crate) trait OutputFormatter: Send + Sync {
    fn print_header(&self, header: &RunHeader<'_>);
    fn progress(&self) -> Option<loadr_core::ProgressFn>;
    fn print_summary(&self, result: &loadr_core::RunResult) -> anyhow::Result<()>;
}

pub(crate) fn formatter(format: OutputFormat) -> Box<dyn OutputFormatter> {
    match format {
        OutputFormat::HumanReadable => Box::new(human::HumanReadableOutput::new()),
        OutputFormat::Json => Box::new(json::JsonOutput),
    }
}

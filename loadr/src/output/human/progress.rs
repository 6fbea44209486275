use std::time::Duration;

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

/// Live status on stderr. A redrawn bar on a terminal, one plain line per update otherwise.
pub(crate) struct HumanProgress {
    bar: ProgressBar,
}

impl HumanProgress {
    pub(crate) fn new() -> Self {
        let bar = ProgressBar::with_draw_target(Some(0), ProgressDrawTarget::stderr_with_hz(5));
        bar.set_style(bar_style());

        Self { bar }
    }

    pub(crate) fn update(&self, total: Duration, elapsed: Duration, message: String) {
        if self.bar.is_hidden() {
            eprintln!("{message}");
            return;
        }

        let total_ms = total.as_millis() as u64;
        let elapsed_ms = elapsed.as_millis() as u64;
        self.bar.set_length(total_ms);
        self.bar.set_position(elapsed_ms.min(total_ms));
        self.bar.set_message(message);
    }

    pub(crate) fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

fn bar_style() -> ProgressStyle {
    ProgressStyle::with_template("[ {bar:20.cyan/blue} ] {percent:>3}% {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█░")
}

#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Terminal plumbing for the `telecom_sites` binary: a per-stage progress
//! bar for the proximity pipeline and logger setup that keeps log lines
//! from tearing through the bar.

use std::sync::Arc;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use telecom_sites_proximity::progress::ProgressCallback;

pub use indicatif::MultiProgress;

/// Terminal bar for one pipeline run.
///
/// The same bar is reused for every stage of a run: each
/// [`ProgressCallback::set_total`] call rewinds it and shows the new
/// stage's site count.
pub struct IndicatifProgress {
    bar: ProgressBar,
    counting: ProgressStyle,
}

impl IndicatifProgress {
    /// Adds a bar labelled `message` to `multi`. It spins until the first
    /// stage announces its site count.
    #[must_use]
    pub fn stage_bar(multi: &MultiProgress, message: &str) -> Arc<dyn ProgressCallback> {
        let waiting = ProgressStyle::with_template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner());
        let counting =
            ProgressStyle::with_template("{msg:<28} [{bar:40.green/white}] {pos}/{len} sites")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=> ");

        let bar = multi.add(ProgressBar::new_spinner().with_style(waiting));
        bar.set_message(message.to_string());
        bar.enable_steady_tick(Duration::from_millis(120));

        Arc::new(Self { bar, counting })
    }
}

impl ProgressCallback for IndicatifProgress {
    fn set_total(&self, total: u64) {
        self.bar.reset();
        self.bar.set_length(total);
        self.bar.set_style(self.counting.clone());
    }

    fn inc(&self, delta: u64) {
        self.bar.inc(delta);
    }

    fn set_message(&self, msg: String) {
        self.bar.set_message(msg);
    }

    fn finish(&self, msg: String) {
        self.bar.set_message(msg);
        self.bar.tick();
    }
}

impl Drop for IndicatifProgress {
    fn drop(&mut self) {
        self.bar.finish();
    }
}

/// Installs `pretty_env_logger` (filtered by `RUST_LOG`) behind
/// `indicatif-log-bridge`, and returns the [`MultiProgress`] every stage
/// bar has to join for log output to stay readable.
#[must_use]
pub fn init_logger() -> MultiProgress {
    let multi = MultiProgress::new();

    let logger = pretty_env_logger::formatted_builder()
        .parse_env("RUST_LOG")
        .build();
    let level = logger.filter();

    if let Err(e) = indicatif_log_bridge::LogWrapper::new(multi.clone(), logger).try_init() {
        // Keep whichever logger got there first.
        log::debug!("Logger was already installed: {e}");
    }
    log::set_max_level(level);

    multi
}

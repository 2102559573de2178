//! Progress hooks for the per-site pipeline stages.
//!
//! The pipeline reports through [`ProgressCallback`] and never draws
//! anything itself. The CLI plugs in terminal bars; library callers and
//! tests pass [`null_progress`].

use std::sync::Arc;

/// Receives progress from [`crate::pipeline`].
///
/// Each stage calls `set_total` with its site count, then `inc` once per
/// site, possibly from several rayon workers at once.
pub trait ProgressCallback: Send + Sync {
    /// Starts a stage of `total` sites.
    fn set_total(&self, total: u64);

    fn inc(&self, delta: u64);

    /// Names the running stage.
    fn set_message(&self, msg: String);

    /// Ends the current stage with a summary line.
    fn finish(&self, msg: String);
}

/// Discards all progress.
pub struct NullProgress;

impl ProgressCallback for NullProgress {
    fn set_total(&self, _total: u64) {}
    fn inc(&self, _delta: u64) {}
    fn set_message(&self, _msg: String) {}
    fn finish(&self, _msg: String) {}
}

#[must_use]
pub fn null_progress() -> Arc<dyn ProgressCallback> {
    Arc::new(NullProgress)
}

//! Scheduled-task surface exposed to the host.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use dvx_core::Result;

use crate::catalog::Catalog;

/// When the host should run a task without being asked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskTrigger {
    /// At host startup.
    Startup,
    /// Daily at the given hour (0-23, host-local time).
    Daily { hour: u8 },
    /// Every `minutes` minutes.
    Interval { minutes: u32 },
}

/// Progress callback handed to a running task.
///
/// Reports a percentage in `0.0..=100.0` plus a short step label. Cloning is
/// cheap; tasks may hand clones to helpers.
#[derive(Clone)]
pub struct Progress {
    sender: Arc<dyn Fn(f32, &str) + Send + Sync>,
}

impl Progress {
    pub fn new(sender: impl Fn(f32, &str) + Send + Sync + 'static) -> Self {
        Self {
            sender: Arc::new(sender),
        }
    }

    /// A sink that drops all reports, for callers that don't track progress.
    pub fn noop() -> Self {
        Self::new(|_, _| {})
    }

    pub fn report(&self, percent: f32, step: &str) {
        (self.sender)(percent.clamp(0.0, 100.0), step);
    }
}

impl std::fmt::Debug for Progress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Progress").finish_non_exhaustive()
    }
}

/// A unit of scheduled work the host can trigger.
#[async_trait]
pub trait ScheduledTask: Send + Sync {
    /// Human-readable task name.
    fn name(&self) -> &'static str;

    /// Stable key the host uses to identify the task across restarts.
    fn key(&self) -> &'static str;

    /// Grouping label shown in the host's task UI.
    fn category(&self) -> &'static str {
        "Dolby Vision"
    }

    fn description(&self) -> &'static str;

    /// Triggers the host should install by default. Empty means manual-only.
    fn default_triggers(&self) -> Vec<TaskTrigger> {
        Vec::new()
    }

    /// Run the task to completion or cancellation.
    ///
    /// Per-item failures are handled inside; an `Err` return means the run
    /// itself could not proceed. `Canceled` is a distinguished outcome the
    /// host must not log as a failure.
    async fn execute(
        &self,
        catalog: &dyn Catalog,
        progress: &Progress,
        cancel: &CancellationToken,
    ) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn progress_clamps_and_delivers() {
        let seen: Arc<Mutex<Vec<(f32, String)>>> = Arc::default();
        let sink = seen.clone();
        let progress = Progress::new(move |pct, step| {
            sink.lock().unwrap().push((pct, step.to_string()));
        });

        progress.report(50.0, "halfway");
        progress.report(150.0, "over");
        progress.report(-3.0, "under");

        let seen = seen.lock().unwrap();
        assert_eq!(seen[0], (50.0, "halfway".to_string()));
        assert_eq!(seen[1].0, 100.0);
        assert_eq!(seen[2].0, 0.0);
    }

    #[test]
    fn noop_progress_does_not_panic() {
        Progress::noop().report(10.0, "x");
    }
}

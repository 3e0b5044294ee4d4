//! Course and exam orchestration over the API client.
//!
//! Each runner lists its pending items through the `Paginator`, acts on
//! them one at a time and reports every step. An item that fails is
//! reported and skipped; only a failed listing stops a runner early.

pub mod course;
pub mod exam;

pub use course::CourseRunner;
pub use exam::ExamRunner;

use crate::config::Config;

/// Tally of one runner's pass over its list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TaskSummary {
    pub found: usize,
    pub completed: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Share of `done` out of `total`, in percent.
pub(crate) fn percent(done: usize, total: usize) -> f64 {
    if total == 0 {
        return 100.0;
    }
    done as f64 * 100.0 / total as f64
}

/// Inter-step delay between portal calls, if configured.
pub(crate) async fn pause(config: &Config) {
    let delay = config.step_delay();
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
}

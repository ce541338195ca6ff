//! Optional exam time limit.

use std::time::Duration;

use tokio::time::Instant;

/// Countdown for one session. `None` limit means the exam is untimed.
#[derive(Debug, Clone, Copy)]
pub struct ExamClock {
    started: Instant,
    limit: Option<Duration>,
}

impl ExamClock {
    pub fn start(limit: Option<Duration>) -> Self {
        Self {
            started: Instant::now(),
            limit,
        }
    }

    pub fn limit(&self) -> Option<Duration> {
        self.limit
    }

    pub fn remaining(&self) -> Option<Duration> {
        self.limit
            .map(|limit| limit.saturating_sub(self.started.elapsed()))
    }

    /// `HH:MM:SS` for the timer label; `None` when untimed.
    pub fn remaining_label(&self) -> Option<String> {
        self.remaining().map(|left| {
            let secs = left.as_secs();
            format!("{:02}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
        })
    }
}

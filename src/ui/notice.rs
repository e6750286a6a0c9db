//! Transient user-visible error notices.
//!
//! Failures surfaced to the user auto-dismiss after a fixed delay and never
//! block the application. The clock is passed in so expiry is testable.

use std::time::{Duration, Instant};

pub const NOTICE_TTL: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct Notice {
    pub message: String,
    posted_at: Instant,
}

/// Holds the currently visible notices for one session.
#[derive(Debug, Default)]
pub struct NoticeBoard {
    notices: Vec<Notice>,
}

impl NoticeBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn post(&mut self, message: impl Into<String>) {
        self.post_at(message, Instant::now());
    }

    pub fn post_at(&mut self, message: impl Into<String>, now: Instant) {
        self.notices.push(Notice {
            message: message.into(),
            posted_at: now,
        });
    }

    /// Messages still within their display window, oldest first.
    pub fn visible(&self, now: Instant) -> Vec<&str> {
        self.notices
            .iter()
            .filter(|notice| now.duration_since(notice.posted_at) < NOTICE_TTL)
            .map(|notice| notice.message.as_str())
            .collect()
    }

    /// Drop expired notices. Safe to call on every UI tick.
    pub fn sweep(&mut self, now: Instant) {
        self.notices
            .retain(|notice| now.duration_since(notice.posted_at) < NOTICE_TTL);
    }
}

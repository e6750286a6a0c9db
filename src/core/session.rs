//! Per-session mutable state outside the transcript.
//!
//! Holds the pieces the UI pokes at between turns: staged attachments,
//! transient notices, and the cancellation token for the in-flight turn.

use std::time::Instant;

use tokio_util::sync::CancellationToken;

use crate::core::attachments::AttachmentBuffer;
use crate::ui::notice::NoticeBoard;

pub struct Session {
    pub attachments: AttachmentBuffer,
    pub notices: NoticeBoard,
    cancel: CancellationToken,
}

impl Session {
    pub fn new(max_attachments: usize) -> Self {
        Self {
            attachments: AttachmentBuffer::new(max_attachments),
            notices: NoticeBoard::new(),
            cancel: CancellationToken::new(),
        }
    }

    /// Arm a fresh token for the next turn. A cancel issued during a previous
    /// turn never leaks into this one.
    pub fn reset_cancel(&mut self) -> CancellationToken {
        self.cancel = CancellationToken::new();
        self.cancel.clone()
    }

    /// Request that the in-flight turn stop at the next increment boundary.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Post an error notice with the standard auto-dismiss window.
    pub fn notify_error(&mut self, message: impl Into<String>) {
        self.notices.post_at(message, Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_disarms_a_previous_cancel() {
        let mut session = Session::new(10);
        session.cancel();
        assert!(session.is_cancelled());

        let token = session.reset_cancel();
        assert!(!session.is_cancelled());
        assert!(!token.is_cancelled());

        session.cancel();
        assert!(token.is_cancelled());
    }
}

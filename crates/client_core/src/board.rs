use std::sync::{
    atomic::{AtomicU64, Ordering},
    Mutex, PoisonError,
};

use shared::{
    protocol::UploadOutcome,
    render::{render, ResultLine},
};

/// Ticket handed out when a submission starts. Later submissions get larger
/// tickets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Submission(u64);

#[derive(Debug, Default)]
struct Shown {
    ticket: u64,
    lines: Vec<ResultLine>,
}

/// The result area: one set of lines, owned by the newest completed
/// submission.
#[derive(Debug, Default)]
pub struct ResultBoard {
    issued: AtomicU64,
    shown: Mutex<Shown>,
}

impl ResultBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&self) -> Submission {
        Submission(self.issued.fetch_add(1, Ordering::SeqCst) + 1)
    }

    /// Replaces the displayed lines with the rendering of `outcome`.
    ///
    /// Returns `false` and leaves the board untouched when a newer
    /// submission has already been displayed.
    pub fn complete(&self, submission: Submission, outcome: &UploadOutcome) -> bool {
        let mut shown = self.shown.lock().unwrap_or_else(PoisonError::into_inner);
        if submission.0 < shown.ticket {
            return false;
        }
        shown.ticket = submission.0;
        shown.lines = render(outcome);
        true
    }

    pub fn lines(&self) -> Vec<ResultLine> {
        self.shown
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .lines
            .clone()
    }
}

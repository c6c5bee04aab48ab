//! Entry state machine for the in-memory message queue.

use serde::{Deserialize, Serialize};

/// Entry state.
///
/// State transitions:
/// - Queued -> Running -> Completed
/// - Queued -> Running -> RetryScheduled -> Queued (loop until max_attempts)
/// - Queued -> Running -> Dead (when max_attempts is reached)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntryState {
    /// Ready to hand out.
    Queued,

    /// Leased by a consumer.
    Running,

    /// Acknowledged.
    Completed,

    /// Waiting out the backoff delay.
    RetryScheduled,

    /// Dead-lettered.
    Dead,
}

impl EntryState {
    pub fn is_terminal(self) -> bool {
        matches!(self, EntryState::Completed | EntryState::Dead)
    }
}

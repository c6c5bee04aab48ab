//! Entry record: metadata + value.

use tokio::time::Instant;

use super::EntryState;

/// Metadata + value for one message in the queue.
///
/// This is the single source of truth for entry state. The ready and
/// scheduled structures hold ids only.
#[derive(Debug, Clone)]
pub struct EntryRecord<T> {
    pub value: T,
    pub state: EntryState,

    /// Deliveries so far (including the current one if Running).
    pub attempts: u32,

    pub max_attempts: u32,

    pub last_error: Option<String>,

    /// Set while RetryScheduled.
    pub next_run_at: Option<Instant>,

    pub created_at: Instant,
    pub updated_at: Instant,
}

impl<T> EntryRecord<T> {
    pub fn new(value: T, max_attempts: u32) -> Self {
        let now = Instant::now();
        Self {
            value,
            state: EntryState::Queued,
            attempts: 0,
            max_attempts: max_attempts.max(1),
            last_error: None,
            next_run_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn start_attempt(&mut self) {
        self.state = EntryState::Running;
        self.attempts += 1;
        self.updated_at = Instant::now();
    }

    pub fn mark_completed(&mut self) {
        self.state = EntryState::Completed;
        self.updated_at = Instant::now();
    }

    pub fn mark_dead(&mut self, error: String) {
        self.state = EntryState::Dead;
        self.last_error = Some(error);
        self.updated_at = Instant::now();
    }

    pub fn schedule_retry(&mut self, next_run_at: Instant, error: String) {
        self.state = EntryState::RetryScheduled;
        self.next_run_at = Some(next_run_at);
        self.last_error = Some(error);
        self.updated_at = Instant::now();
    }

    /// RetryScheduled -> Queued.
    pub fn requeue(&mut self) {
        self.state = EntryState::Queued;
        self.next_run_at = None;
        self.updated_at = Instant::now();
    }

    pub fn attempts_exhausted(&self) -> bool {
        self.attempts >= self.max_attempts
    }
}

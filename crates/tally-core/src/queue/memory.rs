//! In-memory message queue.
//!
//! Completed entries are dropped from the table and only counted. Dead
//! letters are kept for inspection up to a fixed capacity, oldest first out.

use std::collections::{BinaryHeap, HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;
use tracing::{debug, warn};

use super::{EntryRecord, EntryState, RetryPolicy};
use crate::domain::TallyError;
use crate::ports::{MessageQueue, QueueCounts, QueueEntry};

/// Dead letters retained by default.
pub const DEFAULT_DEAD_LETTER_CAPACITY: usize = 10_000;

/// Recorded on entries whose lease was dropped without `ack` or `fail`.
const ABANDONED_LEASE: &str = "lease dropped before ack or fail";

/// Scheduled entry for the retry heap.
///
/// Reverse ordering so BinaryHeap acts as a min-heap (earliest first).
#[derive(Debug, Clone, PartialEq, Eq)]
struct ScheduledEntry {
    next_run_at: Instant,
    entry_id: u64,
}

impl PartialOrd for ScheduledEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScheduledEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        other
            .next_run_at
            .cmp(&self.next_run_at)
            .then_with(|| other.entry_id.cmp(&self.entry_id))
    }
}

/// A message that ran out of attempts.
#[derive(Debug, Clone)]
pub struct DeadLetter<T> {
    pub id: String,
    pub value: T,
    pub attempts: u32,
    pub last_error: Option<String>,
}

struct QueueState<T> {
    /// Single source of truth for live and dead entries.
    records: HashMap<u64, EntryRecord<T>>,

    ready: VecDeque<u64>,

    /// Retry backoff.
    scheduled: BinaryHeap<ScheduledEntry>,

    /// Dead entry ids, oldest first.
    dead_order: VecDeque<u64>,
    dead_letter_capacity: usize,

    completed_total: usize,
    dead_total: usize,

    next_entry_id: u64,

    retry_policy: RetryPolicy,
}

impl<T> QueueState<T> {
    fn new(retry_policy: RetryPolicy) -> Self {
        Self {
            records: HashMap::new(),
            ready: VecDeque::new(),
            scheduled: BinaryHeap::new(),
            dead_order: VecDeque::new(),
            dead_letter_capacity: DEFAULT_DEAD_LETTER_CAPACITY,
            completed_total: 0,
            dead_total: 0,
            next_entry_id: 1,
            retry_policy,
        }
    }

    fn allocate_entry_id(&mut self) -> u64 {
        let id = self.next_entry_id;
        self.next_entry_id += 1;
        id
    }

    /// Move entries whose backoff has elapsed from scheduled to ready.
    fn promote_scheduled(&mut self) {
        let now = Instant::now();
        while let Some(entry) = self.scheduled.peek() {
            if entry.next_run_at > now {
                break;
            }
            let entry_id = entry.entry_id;
            self.scheduled.pop();
            if let Some(record) = self.records.get_mut(&entry_id)
                && record.state == EntryState::RetryScheduled
            {
                record.requeue();
                self.ready.push_back(entry_id);
            }
        }
    }

    fn complete(&mut self, entry_id: u64) -> Result<(), TallyError> {
        let record = self
            .records
            .get_mut(&entry_id)
            .ok_or_else(|| TallyError::not_found("queue entry", entry_name(entry_id)))?;
        record.mark_completed();
        self.records.remove(&entry_id);
        self.completed_total += 1;
        Ok(())
    }

    /// Schedule a retry, or bury the entry once its attempts are used up.
    ///
    /// Returns true when a retry was scheduled.
    fn settle_failure(&mut self, entry_id: u64, error: String) -> Result<bool, TallyError> {
        let name = entry_name(entry_id);
        let record = self
            .records
            .get_mut(&entry_id)
            .ok_or_else(|| TallyError::not_found("queue entry", &name))?;
        if record.state != EntryState::Running {
            return Ok(false);
        }

        if record.attempts_exhausted() {
            warn!(
                entry = %name,
                attempts = record.attempts,
                error = %error,
                "queue entry dead-lettered"
            );
            record.mark_dead(error);
            self.bury(entry_id);
            return Ok(false);
        }

        let delay = self.retry_policy.next_delay(record.attempts);
        let next_run_at = Instant::now() + delay;
        debug!(
            entry = %name,
            attempts = record.attempts,
            delay_ms = delay.as_millis() as u64,
            "queue entry scheduled for retry"
        );
        record.schedule_retry(next_run_at, error);
        self.scheduled.push(ScheduledEntry {
            next_run_at,
            entry_id,
        });
        Ok(true)
    }

    fn bury(&mut self, entry_id: u64) {
        self.dead_total += 1;
        self.dead_order.push_back(entry_id);
        while self.dead_order.len() > self.dead_letter_capacity {
            if let Some(evicted) = self.dead_order.pop_front() {
                self.records.remove(&evicted);
            }
        }
    }

    fn counts(&self) -> QueueCounts {
        let mut counts = QueueCounts {
            completed: self.completed_total,
            dead: self.dead_total,
            ..QueueCounts::default()
        };
        for record in self.records.values() {
            match record.state {
                EntryState::Queued => counts.queued += 1,
                EntryState::Running => counts.running += 1,
                EntryState::RetryScheduled => counts.retry_scheduled += 1,
                EntryState::Completed | EntryState::Dead => {}
            }
        }
        counts
    }
}

fn entry_name(id: u64) -> String {
    format!("msg-{id}")
}

/// At-least-once queue with exponential backoff and dead-lettering.
pub struct InMemoryMessageQueue<T> {
    state: Arc<Mutex<QueueState<T>>>,
    notify: Arc<Notify>,
}

impl<T> InMemoryMessageQueue<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new(retry_policy: RetryPolicy) -> Self {
        Self::with_dead_letter_capacity(retry_policy, DEFAULT_DEAD_LETTER_CAPACITY)
    }

    pub fn with_dead_letter_capacity(retry_policy: RetryPolicy, capacity: usize) -> Self {
        let mut state = QueueState::new(retry_policy);
        state.dead_letter_capacity = capacity.max(1);
        Self {
            state: Arc::new(Mutex::new(state)),
            notify: Arc::new(Notify::new()),
        }
    }

    /// Retained dead letters, oldest first.
    pub async fn dead_letters(&self) -> Vec<DeadLetter<T>> {
        let state = self.state.lock().await;
        state
            .dead_order
            .iter()
            .filter_map(|id| state.records.get(id).map(|record| (*id, record)))
            .map(|(id, record)| DeadLetter {
                id: entry_name(id),
                value: record.value.clone(),
                attempts: record.attempts,
                last_error: record.last_error.clone(),
            })
            .collect()
    }
}

impl<T> Default for InMemoryMessageQueue<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new(RetryPolicy::default())
    }
}

#[async_trait]
impl<T> MessageQueue<T> for InMemoryMessageQueue<T>
where
    T: Clone + Send + Sync + 'static,
{
    async fn enqueue(&self, value: T) -> Result<String, TallyError> {
        let id = {
            let mut state = self.state.lock().await;
            let id = state.allocate_entry_id();
            let record = EntryRecord::new(value, state.retry_policy.max_attempts);
            state.records.insert(id, record);
            state.ready.push_back(id);
            id
        };
        self.notify.notify_one();
        Ok(entry_name(id))
    }

    async fn dequeue(&self) -> Option<Box<dyn QueueEntry<T>>> {
        loop {
            let next_wake = {
                let mut state = self.state.lock().await;
                state.promote_scheduled();

                if let Some(entry_id) = state.ready.pop_front()
                    && let Some(record) = state.records.get_mut(&entry_id)
                {
                    record.start_attempt();
                    let lease = InMemoryLease {
                        entry_id,
                        name: entry_name(entry_id),
                        value: record.value.clone(),
                        attempts: record.attempts,
                        settled: false,
                        queue: Arc::clone(&self.state),
                        notify: Arc::clone(&self.notify),
                    };
                    return Some(Box::new(lease));
                }

                state.scheduled.peek().map(|entry| entry.next_run_at)
            };

            // Wait for an enqueue or the next backoff to elapse.
            if let Some(wake_time) = next_wake {
                tokio::select! {
                    _ = self.notify.notified() => {},
                    _ = tokio::time::sleep_until(wake_time) => {},
                }
            } else {
                self.notify.notified().await;
            }
        }
    }

    async fn counts(&self) -> Result<QueueCounts, TallyError> {
        let state = self.state.lock().await;
        Ok(state.counts())
    }
}

/// One delivery of an entry.
///
/// A lease dropped without `ack` or `fail` (a panicking handler, a cancelled
/// consumer) counts as a failed attempt, so the entry is redelivered or
/// dead-lettered like any other failure.
struct InMemoryLease<T: Send + 'static> {
    entry_id: u64,
    name: String,
    value: T,
    attempts: u32,
    settled: bool,
    queue: Arc<Mutex<QueueState<T>>>,
    notify: Arc<Notify>,
}

#[async_trait]
impl<T> QueueEntry<T> for InMemoryLease<T>
where
    T: Send + Sync + 'static,
{
    fn id(&self) -> &str {
        &self.name
    }

    fn value(&self) -> &T {
        &self.value
    }

    fn attempts(&self) -> u32 {
        self.attempts
    }

    async fn ack(self: Box<Self>) -> Result<(), TallyError> {
        let mut lease = self;
        lease.settled = true;
        let mut state = lease.queue.lock().await;
        state.complete(lease.entry_id)
    }

    async fn fail(self: Box<Self>, error: String) -> Result<(), TallyError> {
        let mut lease = self;
        lease.settled = true;
        let retry_scheduled = {
            let mut state = lease.queue.lock().await;
            state.settle_failure(lease.entry_id, error)?
        };

        // Notify outside the lock.
        if retry_scheduled {
            lease.notify.notify_one();
        }
        Ok(())
    }
}

impl<T: Send + 'static> Drop for InMemoryLease<T> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        warn!(entry = %self.name, attempts = self.attempts, "lease dropped unsettled");

        let entry_id = self.entry_id;
        if let Ok(mut state) = self.queue.try_lock() {
            let retry_scheduled = state.settle_failure(entry_id, ABANDONED_LEASE.to_string());
            drop(state);
            if matches!(retry_scheduled, Ok(true)) {
                self.notify.notify_one();
            }
            return;
        }

        // The queue is busy; settle from a task instead of blocking in drop.
        let queue = Arc::clone(&self.queue);
        let notify = Arc::clone(&self.notify);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    let retry_scheduled = queue
                        .lock()
                        .await
                        .settle_failure(entry_id, ABANDONED_LEASE.to_string());
                    if matches!(retry_scheduled, Ok(true)) {
                        notify.notify_one();
                    }
                });
            }
            Err(_) => warn!(entry = %self.name, "no runtime to settle dropped lease"),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    async fn lease<T: Clone + Send + Sync + 'static>(
        queue: &InMemoryMessageQueue<T>,
    ) -> Box<dyn QueueEntry<T>> {
        tokio::time::timeout(Duration::from_millis(500), queue.dequeue())
            .await
            .unwrap()
            .unwrap()
    }

    #[tokio::test]
    async fn enqueue_and_counts() {
        let queue = InMemoryMessageQueue::new(RetryPolicy::default());
        let id = queue.enqueue("hello").await.unwrap();
        assert_eq!(id, "msg-1");

        let counts = queue.counts().await.unwrap();
        assert_eq!(counts.queued, 1);
        assert_eq!(counts.running, 0);
        assert!(!counts.is_drained());
    }

    #[tokio::test]
    async fn dequeue_transitions_to_running() {
        let queue = InMemoryMessageQueue::new(RetryPolicy::default());
        queue.enqueue("hello").await.unwrap();

        let entry = lease(&queue).await;
        assert_eq!(*entry.value(), "hello");
        assert_eq!(entry.attempts(), 1);

        let counts = queue.counts().await.unwrap();
        assert_eq!(counts.queued, 0);
        assert_eq!(counts.running, 1);
    }

    #[tokio::test]
    async fn ack_marks_completed() {
        let queue = InMemoryMessageQueue::new(RetryPolicy::default());
        queue.enqueue(7u32).await.unwrap();
        lease(&queue).await.ack().await.unwrap();

        let counts = queue.counts().await.unwrap();
        assert_eq!(counts.completed, 1);
        assert!(counts.is_drained());
    }

    #[tokio::test]
    async fn failed_entry_is_redelivered_then_dead_lettered() {
        let queue = InMemoryMessageQueue::new(RetryPolicy::immediate(2));
        queue.enqueue("doomed").await.unwrap();

        let first = lease(&queue).await;
        first.fail("boom".into()).await.unwrap();
        let counts = queue.counts().await.unwrap();
        assert_eq!(counts.retry_scheduled, 1);

        let second = lease(&queue).await;
        assert_eq!(second.attempts(), 2);
        second.fail("boom again".into()).await.unwrap();

        let counts = queue.counts().await.unwrap();
        assert_eq!(counts.dead, 1);
        assert!(counts.is_drained());

        let dead = queue.dead_letters().await;
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].value, "doomed");
        assert_eq!(dead[0].attempts, 2);
        assert_eq!(dead[0].last_error.as_deref(), Some("boom again"));
    }

    #[tokio::test(start_paused = true)]
    async fn retry_waits_for_backoff() {
        let queue = InMemoryMessageQueue::new(RetryPolicy::new(Duration::from_secs(2), 2.0, 5));
        queue.enqueue(1u8).await.unwrap();
        lease(&queue).await.fail("later".into()).await.unwrap();

        let early = tokio::time::timeout(Duration::from_secs(1), queue.dequeue()).await;
        assert!(early.is_err());

        let entry = tokio::time::timeout(Duration::from_secs(5), queue.dequeue())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(entry.attempts(), 2);
    }

    #[tokio::test]
    async fn dropped_lease_is_redelivered() {
        let queue = InMemoryMessageQueue::new(RetryPolicy::immediate(3));
        queue.enqueue("orphan").await.unwrap();

        drop(lease(&queue).await);
        let counts = queue.counts().await.unwrap();
        assert_eq!(counts.running, 0);
        assert_eq!(counts.retry_scheduled, 1);

        let again = lease(&queue).await;
        assert_eq!(*again.value(), "orphan");
        assert_eq!(again.attempts(), 2);
        again.ack().await.unwrap();
        assert!(queue.counts().await.unwrap().is_drained());
    }

    #[tokio::test]
    async fn dropped_lease_on_last_attempt_is_dead_lettered() {
        let queue = InMemoryMessageQueue::new(RetryPolicy::immediate(1));
        queue.enqueue("orphan").await.unwrap();

        drop(lease(&queue).await);

        let counts = queue.counts().await.unwrap();
        assert_eq!(counts.dead, 1);
        assert!(counts.is_drained());
        let dead = queue.dead_letters().await;
        assert_eq!(dead[0].last_error.as_deref(), Some(ABANDONED_LEASE));
    }

    #[tokio::test]
    async fn lease_dropped_while_queue_is_locked_is_settled_later() {
        let queue = InMemoryMessageQueue::new(RetryPolicy::immediate(3));
        queue.enqueue("busy").await.unwrap();
        let entry = lease(&queue).await;

        {
            let _held = queue.state.lock().await;
            drop(entry);
        }

        let again = lease(&queue).await;
        assert_eq!(again.attempts(), 2);
    }

    #[tokio::test]
    async fn completed_entries_leave_only_a_count() {
        let queue = InMemoryMessageQueue::new(RetryPolicy::default());
        for n in 0..3u32 {
            queue.enqueue(n).await.unwrap();
        }
        for _ in 0..3 {
            lease(&queue).await.ack().await.unwrap();
        }

        assert!(queue.state.lock().await.records.is_empty());
        let counts = queue.counts().await.unwrap();
        assert_eq!(counts.completed, 3);
        assert!(counts.is_drained());
    }

    #[tokio::test]
    async fn dead_letters_beyond_capacity_drop_the_oldest() {
        let queue = InMemoryMessageQueue::with_dead_letter_capacity(RetryPolicy::immediate(1), 2);
        for value in ["a", "b", "c"] {
            queue.enqueue(value).await.unwrap();
        }
        for _ in 0..3 {
            lease(&queue).await.fail("boom".into()).await.unwrap();
        }

        let dead: Vec<_> = queue
            .dead_letters()
            .await
            .into_iter()
            .map(|d| d.value)
            .collect();
        assert_eq!(dead, vec!["b", "c"]);
        assert_eq!(queue.state.lock().await.records.len(), 2);

        let counts = queue.counts().await.unwrap();
        assert_eq!(counts.dead, 3);
        assert!(counts.is_drained());
    }
}

//! MessageQueue port - 少なくとも一回配送（at-least-once）のキュー
//!
//! 取り出したエントリは consumer が所有し、必ず `ack` か `fail` を返します。
//! `fail` 後の再配送・dead-letter の判断はキュー側の方針です。

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::TallyError;

/// A leased message.
///
/// Design intent:
/// - Queue manages state transitions (Queued -> Running -> ...).
/// - The consumer executes side effects and reports the result.
/// - The value is exposed as an immutable reference to avoid accidental mutation.
#[async_trait]
pub trait QueueEntry<T>: Send {
    fn id(&self) -> &str;

    fn value(&self) -> &T;

    /// Deliveries so far, including this one.
    fn attempts(&self) -> u32;

    /// Mark success.
    async fn ack(self: Box<Self>) -> Result<(), TallyError>;

    /// Mark failure (queue decides retry/dead policy).
    async fn fail(self: Box<Self>, error: String) -> Result<(), TallyError>;
}

#[async_trait]
pub trait MessageQueue<T>: Send + Sync {
    /// Returns the entry id.
    async fn enqueue(&self, value: T) -> Result<String, TallyError>;

    /// Lease one ready entry (waits until one is available).
    async fn dequeue(&self) -> Option<Box<dyn QueueEntry<T>>>;

    async fn counts(&self) -> Result<QueueCounts, TallyError>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueCounts {
    pub queued: usize,
    pub running: usize,
    pub completed: usize,
    pub retry_scheduled: usize,
    pub dead: usize,
}

impl QueueCounts {
    /// Nothing left to hand out now or later.
    pub fn is_drained(&self) -> bool {
        self.queued == 0 && self.running == 0 && self.retry_scheduled == 0
    }
}

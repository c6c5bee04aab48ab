//! ConsumerGroup - キューを並行に消費する consumer の集まり
//!
//! # 設計原則
//! - `shutdown_tx` に true を送ると、各 consumer は新しいエントリを取らなくなる
//! - 処理中のエントリは最後まで処理される（途中で中断しない）
//! - ack / fail の判断は [`QueueJob`] 側、再配送の判断はキュー側

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::domain::JobResult;
use crate::ports::{MessageQueue, QueueEntry};

/// Processes one leased entry and must settle it with `ack` or `fail`.
#[async_trait]
pub trait QueueJob<T>: Send + Sync {
    async fn handle(&self, entry: Box<dyn QueueEntry<T>>) -> JobResult;
}

/// Consumer group handle.
/// - `request_shutdown()` で全 consumer が止まる
/// - `shutdown_and_join()` で全 consumer の終了を待てる
pub struct ConsumerGroup {
    shutdown_tx: watch::Sender<bool>,
    joins: Vec<JoinHandle<()>>,
}

impl ConsumerGroup {
    /// Spawn `n` consumers.
    pub fn spawn<T>(n: usize, queue: Arc<dyn MessageQueue<T>>, job: Arc<dyn QueueJob<T>>) -> Self
    where
        T: Send + 'static,
    {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let mut joins = Vec::with_capacity(n);
        for consumer_id in 0..n {
            let q = Arc::clone(&queue);
            let j = Arc::clone(&job);
            let mut rx = shutdown_rx.clone();

            joins.push(tokio::spawn(async move {
                consumer_loop(consumer_id, q, j, &mut rx).await;
            }));
        }
        info!(consumers = n, "consumer group started");

        Self { shutdown_tx, joins }
    }

    pub fn len(&self) -> usize {
        self.joins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.joins.is_empty()
    }

    /// Stop taking new entries. In-flight entries still finish.
    pub fn request_shutdown(&self) {
        // receivers may already be gone
        let _ = self.shutdown_tx.send(true);
    }

    pub async fn shutdown_and_join(self) {
        self.request_shutdown();
        for (consumer, join) in self.joins.into_iter().enumerate() {
            if let Err(err) = join.await {
                error!(consumer, error = %err, "consumer task ended abnormally");
            }
        }
        info!("consumer group stopped");
    }
}

async fn consumer_loop<T>(
    consumer_id: usize,
    queue: Arc<dyn MessageQueue<T>>,
    job: Arc<dyn QueueJob<T>>,
    shutdown_rx: &mut watch::Receiver<bool>,
) where
    T: Send + 'static,
{
    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        // dequeue may wait, so race it against shutdown
        let entry = tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                continue;
            }
            entry = queue.dequeue() => entry,
        };

        let Some(entry) = entry else {
            tokio::task::yield_now().await;
            continue;
        };

        let result = job.handle(entry).await;
        debug!(consumer = consumer_id, kind = ?result.kind, "entry handled");
    }
    debug!(consumer = consumer_id, "consumer stopped");
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;
    use crate::queue::{InMemoryMessageQueue, RetryPolicy};

    #[derive(Default)]
    struct Counting {
        seen: AtomicUsize,
    }

    #[async_trait]
    impl QueueJob<u32> for Counting {
        async fn handle(&self, entry: Box<dyn QueueEntry<u32>>) -> JobResult {
            self.seen.fetch_add(1, Ordering::SeqCst);
            if *entry.value() % 2 == 0 {
                entry.ack().await.unwrap();
                JobResult::success()
            } else {
                entry.fail("odd".into()).await.unwrap();
                JobResult::failure("odd")
            }
        }
    }

    async fn wait_drained(queue: &InMemoryMessageQueue<u32>) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !queue.counts().await.unwrap().is_drained() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn group_drains_queue_and_stops() {
        let queue = Arc::new(InMemoryMessageQueue::new(RetryPolicy::immediate(2)));
        for n in 0..10u32 {
            queue.enqueue(n).await.unwrap();
        }
        let job = Arc::new(Counting::default());

        let group = ConsumerGroup::spawn(3, queue.clone(), job.clone());
        assert_eq!(group.len(), 3);
        wait_drained(&queue).await;
        group.shutdown_and_join().await;

        let counts = queue.counts().await.unwrap();
        assert_eq!(counts.completed, 5);
        assert_eq!(counts.dead, 5);
        // odd values were delivered twice
        assert_eq!(job.seen.load(Ordering::SeqCst), 15);
    }

    #[tokio::test]
    async fn idle_group_shuts_down_promptly() {
        let queue: Arc<InMemoryMessageQueue<u32>> =
            Arc::new(InMemoryMessageQueue::new(RetryPolicy::default()));
        let group = ConsumerGroup::spawn(2, queue, Arc::new(Counting::default()));
        tokio::time::timeout(Duration::from_secs(1), group.shutdown_and_join())
            .await
            .unwrap();
    }

    /// Panics on the first delivery of every entry.
    struct PanicsOnce;

    #[async_trait]
    impl QueueJob<u32> for PanicsOnce {
        async fn handle(&self, entry: Box<dyn QueueEntry<u32>>) -> JobResult {
            if entry.attempts() == 1 {
                panic!("handler blew up on {}", entry.id());
            }
            entry.ack().await.unwrap();
            JobResult::success()
        }
    }

    #[tokio::test]
    async fn entry_held_by_a_panicking_consumer_is_redelivered() {
        let queue: Arc<InMemoryMessageQueue<u32>> =
            Arc::new(InMemoryMessageQueue::new(RetryPolicy::immediate(3)));
        queue.enqueue(1).await.unwrap();

        let group = ConsumerGroup::spawn(2, queue.clone(), Arc::new(PanicsOnce));
        wait_drained(&queue).await;
        tokio::time::timeout(Duration::from_secs(1), group.shutdown_and_join())
            .await
            .unwrap();

        let counts = queue.counts().await.unwrap();
        assert_eq!(counts.completed, 1);
        assert_eq!(counts.dead, 0);
    }
}

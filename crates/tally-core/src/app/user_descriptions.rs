//! UserDescriptionJob - ユーザー記述を保存済みイベントへマージする consumer
//!
//! # 失敗の分類
//! - NotFound: 参照 ID のイベントがまだ index されていない／削除済み
//! - それ以外: ストア障害など
//!
//! どちらもエントリを `fail` し、再配送・dead-letter はキューに任せます。

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, error, info, warn};

use crate::app::QueueJob;
use crate::domain::{Event, EventUserDescription, JobResult, TallyError};
use crate::ports::{EventRepository, QueueEntry};

pub struct UserDescriptionJob {
    events: Arc<dyn EventRepository>,
}

impl UserDescriptionJob {
    pub fn new(events: Arc<dyn EventRepository>) -> Self {
        Self { events }
    }

    /// Resolve the event by reference id and merge the description into it.
    ///
    /// The store is not touched when the reference does not resolve.
    pub async fn process(&self, message: &EventUserDescription) -> Result<Event, TallyError> {
        let event = self
            .events
            .get_by_reference_id(message.project_id, &message.reference_id)
            .await?
            .ok_or_else(|| TallyError::not_found("event", &message.reference_id))?;

        self.events
            .merge_user_description(event.id, message.to_user_description())
            .await
    }
}

#[async_trait]
impl QueueJob<EventUserDescription> for UserDescriptionJob {
    async fn handle(&self, entry: Box<dyn QueueEntry<EventUserDescription>>) -> JobResult {
        debug!(entry = entry.id(), attempts = entry.attempts(), "processing user description");

        let outcome = self.process(entry.value()).await;
        match outcome {
            Ok(event) => {
                info!(entry = entry.id(), event = %event.id, "processed user description");
                if let Err(err) = entry.ack().await {
                    error!(error = %err, "ack failed");
                }
                JobResult::success()
            }
            Err(err) => {
                if err.is_not_found() {
                    warn!(
                        entry = entry.id(),
                        reference_id = %entry.value().reference_id,
                        "event with this reference id has not been processed yet or was deleted"
                    );
                } else {
                    error!(entry = entry.id(), error = %err, kind = ?err.kind(), "user description failed");
                }
                let reason = err.to_string();
                if let Err(fail_err) = entry.fail(reason.clone()).await {
                    error!(error = %fail_err, "fail report failed");
                }
                JobResult::failure(reason)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{EventId, OrganizationId, ProjectId, StackId};
    use crate::impls::InMemoryEventRepository;
    use crate::ports::{MessageQueue, Paging};
    use crate::queue::{InMemoryMessageQueue, RetryPolicy};
    use chrono::Utc;
    use serde_json::json;

    async fn seeded(reference_id: &str) -> (Arc<InMemoryEventRepository>, Event) {
        let events = Arc::new(InMemoryEventRepository::new());
        let event = Event::new(
            EventId::generate(),
            OrganizationId::generate(),
            ProjectId::generate(),
            StackId::generate(),
            Utc::now(),
        )
        .with_reference_id(reference_id);
        events.add(event.clone()).await.unwrap();
        (events, event)
    }

    #[tokio::test]
    async fn merges_data_and_replaces_description() {
        let (events, event) = seeded("ref-1").await;
        let job = UserDescriptionJob::new(events.clone());

        job.process(
            &EventUserDescription::new(event.project_id, "ref-1", "a@example.com", "first")
                .with_data("a", json!(1)),
        )
        .await
        .unwrap();
        let merged = job
            .process(
                &EventUserDescription::new(event.project_id, "ref-1", "b@example.com", "second")
                    .with_data("b", json!(2)),
            )
            .await
            .unwrap();

        assert_eq!(merged.data.get("a"), Some(&json!(1)));
        assert_eq!(merged.data.get("b"), Some(&json!(2)));
        let description = merged.user_description.unwrap();
        assert_eq!(description.email_address, "b@example.com");
        assert_eq!(description.description, "second");
    }

    #[tokio::test]
    async fn unknown_reference_is_not_found_and_mutates_nothing() {
        let (events, event) = seeded("ref-1").await;
        let job = UserDescriptionJob::new(events.clone());

        let err = job
            .process(&EventUserDescription::new(
                event.project_id,
                "ref-missing",
                "a@example.com",
                "hello",
            ))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(events.get_by_id(event.id).await.unwrap(), Some(event));
    }

    #[tokio::test]
    async fn handle_acks_success_and_fails_not_found() {
        let (events, event) = seeded("ref-1").await;
        let job = UserDescriptionJob::new(events.clone());
        let queue = InMemoryMessageQueue::new(RetryPolicy::immediate(1));

        queue
            .enqueue(EventUserDescription::new(event.project_id, "ref-1", "a@example.com", "ok"))
            .await
            .unwrap();
        queue
            .enqueue(EventUserDescription::new(event.project_id, "nope", "a@example.com", "lost"))
            .await
            .unwrap();

        let first = job.handle(queue.dequeue().await.unwrap()).await;
        assert!(first.is_success());
        let second = job.handle(queue.dequeue().await.unwrap()).await;
        assert!(!second.is_ok());

        let counts = queue.counts().await.unwrap();
        assert_eq!(counts.completed, 1);
        assert_eq!(counts.dead, 1);
        let page = events
            .find_by_project_in_window(
                event.project_id,
                crate::domain::SummaryWindow::new(
                    event.occurrence_date - chrono::Duration::hours(1),
                    event.occurrence_date + chrono::Duration::hours(1),
                ),
                Paging::default(),
            )
            .await
            .unwrap();
        assert_eq!(page.total, 1);
    }
}

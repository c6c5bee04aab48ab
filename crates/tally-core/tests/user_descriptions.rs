//! User descriptions flowing through the queue into the event store.

use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use serde_json::json;

use tally_core::app::{ConsumerGroup, QueueJob, UserDescriptionJob};
use tally_core::domain::{
    Event, EventId, EventUserDescription, OrganizationId, ProjectId, StackId,
};
use tally_core::impls::{InMemoryEventRepository, RefreshPolicy};
use tally_core::ports::{EventRepository, MessageQueue, QueueCounts};
use tally_core::queue::{InMemoryMessageQueue, RetryPolicy};

struct Fixture {
    events: Arc<InMemoryEventRepository>,
    queue: Arc<InMemoryMessageQueue<EventUserDescription>>,
    project: ProjectId,
}

impl Fixture {
    fn new(events: InMemoryEventRepository, policy: RetryPolicy) -> Self {
        Self {
            events: Arc::new(events),
            queue: Arc::new(InMemoryMessageQueue::new(policy)),
            project: ProjectId::generate(),
        }
    }

    async fn stored_event(&self, reference_id: &str) -> Event {
        let at = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        let event = Event::new(
            EventId::generate(),
            OrganizationId::generate(),
            self.project,
            StackId::generate(),
            at,
        )
        .with_reference_id(reference_id);
        self.events.add(event).await.unwrap()
    }

    fn consumers(&self, n: usize) -> ConsumerGroup {
        let job: Arc<dyn QueueJob<EventUserDescription>> =
            Arc::new(UserDescriptionJob::new(self.events.clone()));
        ConsumerGroup::spawn(n, self.queue.clone(), job)
    }

    async fn wait_until(&self, done: impl Fn(&QueueCounts) -> bool) -> QueueCounts {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let counts = self.queue.counts().await.unwrap();
                if done(&counts) {
                    return counts;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap()
    }
}

#[tokio::test]
async fn descriptions_for_one_event_are_merged_in_order() {
    let fx = Fixture::new(InMemoryEventRepository::new(), RetryPolicy::immediate(3));
    let event = fx.stored_event("ref-1").await;

    fx.queue
        .enqueue(
            EventUserDescription::new(fx.project, "ref-1", "first@example.com", "crashed on save")
                .with_data("a", json!(1)),
        )
        .await
        .unwrap();
    fx.queue
        .enqueue(
            EventUserDescription::new(fx.project, "ref-1", "second@example.com", "again")
                .with_data("b", json!(2)),
        )
        .await
        .unwrap();

    let group = fx.consumers(1);
    let counts = fx.wait_until(|c| c.completed == 2).await;
    group.shutdown_and_join().await;
    assert_eq!(counts.dead, 0);

    let stored = fx.events.get_by_id(event.id).await.unwrap().unwrap();
    assert_eq!(stored.data.get("a"), Some(&json!(1)));
    assert_eq!(stored.data.get("b"), Some(&json!(2)));
    let description = stored.user_description.unwrap();
    assert_eq!(description.email_address, "second@example.com");
    assert_eq!(description.description, "again");
}

#[tokio::test]
async fn unresolved_reference_is_dead_lettered_without_writes() {
    let fx = Fixture::new(InMemoryEventRepository::new(), RetryPolicy::immediate(3));
    let bystander = fx.stored_event("ref-known").await;

    fx.queue
        .enqueue(EventUserDescription::new(
            fx.project,
            "ref-missing",
            "a@example.com",
            "never indexed",
        ))
        .await
        .unwrap();

    let group = fx.consumers(2);
    let counts = fx.wait_until(|c| c.dead == 1).await;
    group.shutdown_and_join().await;
    assert_eq!(counts.completed, 0);

    let dead = fx.queue.dead_letters().await;
    assert_eq!(dead.len(), 1);
    assert_eq!(dead[0].attempts, 3);
    assert_eq!(dead[0].value.reference_id, "ref-missing");
    assert!(dead[0].last_error.as_deref().unwrap().contains("not found"));

    assert_eq!(fx.events.len().await, 1);
    let untouched = fx.events.get_by_id(bystander.id).await.unwrap().unwrap();
    assert_eq!(untouched, bystander);
}

#[tokio::test]
async fn reference_from_another_project_does_not_resolve() {
    let fx = Fixture::new(InMemoryEventRepository::new(), RetryPolicy::immediate(1));
    fx.stored_event("ref-1").await;

    let job = UserDescriptionJob::new(fx.events.clone());
    let err = job
        .process(&EventUserDescription::new(
            ProjectId::generate(),
            "ref-1",
            "a@example.com",
            "wrong project",
        ))
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn redelivery_succeeds_once_the_event_is_indexed() {
    let fx = Fixture::new(
        InMemoryEventRepository::with_options(RefreshPolicy::Manual, 10),
        RetryPolicy::new(Duration::from_millis(30), 1.0, 20),
    );
    let event = fx.stored_event("ref-late").await;

    fx.queue
        .enqueue(EventUserDescription::new(
            fx.project,
            "ref-late",
            "a@example.com",
            "late",
        ))
        .await
        .unwrap();

    let group = fx.consumers(1);
    // first attempt cannot see the unrefreshed event
    fx.wait_until(|c| c.retry_scheduled == 1).await;
    fx.events.refresh().await;
    let counts = fx.wait_until(|c| c.completed == 1).await;
    group.shutdown_and_join().await;
    assert_eq!(counts.dead, 0);

    let stored = fx.events.get_by_id(event.id).await.unwrap().unwrap();
    assert_eq!(stored.user_description.unwrap().description, "late");
}

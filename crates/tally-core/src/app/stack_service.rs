//! StackService - stack 集計と signature キャッシュの整合
//!
//! Stack を変更する操作はすべてここを通し、変更後に
//! `(project, signature_hash)` のキャッシュエントリを無効化します。
//! 読み取り中に変更が挟まった場合、読み取り側が入れたエントリも捨てます。

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::domain::{
    OrganizationId, ProjectId, Stack, StackId, SummaryWindow, TallyError,
    stack::signature_cache_key,
};
use crate::ports::{EventRepository, StackCache, StackRepository};

pub struct StackService {
    stacks: Arc<dyn StackRepository>,
    cache: Arc<dyn StackCache>,
    events: Arc<dyn EventRepository>,
    /// Bumped after every stack write, before its invalidation.
    mutations: AtomicU64,
}

impl StackService {
    pub fn new(
        stacks: Arc<dyn StackRepository>,
        cache: Arc<dyn StackCache>,
        events: Arc<dyn EventRepository>,
    ) -> Self {
        Self {
            stacks,
            cache,
            events,
            mutations: AtomicU64::new(0),
        }
    }

    pub async fn get_by_id(&self, id: StackId) -> Result<Option<Stack>, TallyError> {
        self.stacks.get_by_id(id).await
    }

    /// Cache-backed dedup lookup used at ingestion time.
    pub async fn get_by_signature_hash(
        &self,
        project_id: ProjectId,
        signature_hash: &str,
    ) -> Result<Option<Stack>, TallyError> {
        let key = signature_cache_key(project_id, signature_hash);
        if let Some(stack) = self.cache.get(&key).await {
            return Ok(Some(stack));
        }

        let seen = self.mutations.load(Ordering::SeqCst);
        let stack = self
            .stacks
            .get_by_signature_hash(project_id, signature_hash)
            .await?;
        if let Some(stack) = &stack {
            self.cache.set(&key, stack.clone()).await;
            // a write landed since the read; the entry may be stale
            if self.mutations.load(Ordering::SeqCst) != seen {
                debug!(key = %key, "stack cache fill discarded");
                self.cache.remove(&key).await;
            }
        }
        Ok(stack)
    }

    pub async fn increment_event_counter(
        &self,
        organization_id: OrganizationId,
        project_id: ProjectId,
        stack_id: StackId,
        min_occurrence: DateTime<Utc>,
        max_occurrence: DateTime<Utc>,
        count: u64,
    ) -> Result<Stack, TallyError> {
        let stack = self
            .stacks
            .increment_event_counter(
                organization_id,
                project_id,
                stack_id,
                min_occurrence,
                max_occurrence,
                count,
            )
            .await?;
        self.invalidate(&stack).await;
        Ok(stack)
    }

    pub async fn mark_as_regressed(&self, stack_id: StackId) -> Result<Stack, TallyError> {
        let stack = self.stacks.mark_as_regressed(stack_id).await?;
        info!(stack = %stack_id, "stack regressed");
        self.invalidate(&stack).await;
        Ok(stack)
    }

    /// Marks the stack fixed and flags all of its events.
    pub async fn mark_as_fixed(
        &self,
        stack_id: StackId,
        at: DateTime<Utc>,
    ) -> Result<Stack, TallyError> {
        let stack = self.stacks.mark_as_fixed(stack_id, at).await?;
        self.invalidate(&stack).await;
        let touched = self
            .events
            .update_fixed_by_stack(stack.organization_id, stack.id, true)
            .await?;
        info!(stack = %stack_id, events = touched, "stack fixed");
        Ok(stack)
    }

    pub async fn get_new(
        &self,
        project_id: ProjectId,
        window: SummaryWindow,
        limit: usize,
    ) -> Result<Vec<Stack>, TallyError> {
        self.stacks.get_new(project_id, window, limit).await
    }

    pub async fn count_new(
        &self,
        project_id: ProjectId,
        window: SummaryWindow,
    ) -> Result<u64, TallyError> {
        self.stacks.count_new(project_id, window).await
    }

    async fn invalidate(&self, stack: &Stack) {
        self.mutations.fetch_add(1, Ordering::SeqCst);
        let key = stack.cache_key();
        debug!(key = %key, "stack cache invalidated");
        self.cache.remove(&key).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Event, EventId};
    use crate::impls::{InMemoryEventRepository, InMemoryStackCache, InMemoryStackRepository};
    use chrono::TimeZone;

    struct Harness {
        service: StackService,
        stacks: Arc<InMemoryStackRepository>,
        cache: Arc<InMemoryStackCache>,
        events: Arc<InMemoryEventRepository>,
        stack: Stack,
    }

    async fn harness() -> Harness {
        let stacks = Arc::new(InMemoryStackRepository::new());
        let cache = Arc::new(InMemoryStackCache::new());
        let events = Arc::new(InMemoryEventRepository::new());
        let stack = Stack::new(
            StackId::generate(),
            OrganizationId::generate(),
            ProjectId::generate(),
            "sig",
        );
        stacks.add(stack.clone()).await.unwrap();
        let service = StackService::new(stacks.clone(), cache.clone(), events.clone());
        Harness {
            service,
            stacks,
            cache,
            events,
            stack,
        }
    }

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, hour, 0, 0).unwrap()
    }

    async fn warm(h: &Harness) {
        h.service
            .get_by_signature_hash(h.stack.project_id, "sig")
            .await
            .unwrap();
        assert!(!h.cache.is_empty().await);
    }

    #[tokio::test]
    async fn signature_lookup_fills_the_cache() {
        let h = harness().await;
        let found = h
            .service
            .get_by_signature_hash(h.stack.project_id, "sig")
            .await
            .unwrap();
        assert_eq!(found.as_ref().map(|s| s.id), Some(h.stack.id));
        assert_eq!(h.cache.get(&h.stack.cache_key()).await, found);

        assert!(h
            .service
            .get_by_signature_hash(h.stack.project_id, "missing")
            .await
            .unwrap()
            .is_none());
        assert_eq!(h.cache.len().await, 1);
    }

    #[tokio::test]
    async fn every_mutation_invalidates_the_cache() {
        let h = harness().await;
        let s = &h.stack;

        warm(&h).await;
        let counted = h
            .service
            .increment_event_counter(s.organization_id, s.project_id, s.id, at(1), at(2), 4)
            .await
            .unwrap();
        assert!(h.cache.is_empty().await);

        // a fresh lookup sees the new totals
        let fresh = h
            .service
            .get_by_signature_hash(s.project_id, "sig")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fresh.total_occurrences, counted.total_occurrences);

        h.service.mark_as_fixed(s.id, at(3)).await.unwrap();
        assert!(h.cache.is_empty().await);

        warm(&h).await;
        h.service.mark_as_regressed(s.id).await.unwrap();
        assert!(h.cache.is_empty().await);
    }

    #[tokio::test]
    async fn fixing_flags_the_stack_events() {
        let h = harness().await;
        let s = &h.stack;
        for minute in 0..3 {
            h.events
                .add(Event::new(
                    EventId::generate(),
                    s.organization_id,
                    s.project_id,
                    s.id,
                    at(1) + chrono::Duration::minutes(minute),
                ))
                .await
                .unwrap();
        }

        let fixed = h.service.mark_as_fixed(s.id, at(5)).await.unwrap();
        assert_eq!(fixed.date_fixed, Some(at(5)));

        let window = SummaryWindow::new(at(0), at(6));
        let page = h
            .events
            .find_by_project_in_window(s.project_id, window, crate::ports::Paging::limit(10))
            .await
            .unwrap();
        assert_eq!(page.documents.len(), 3);
        assert!(page.documents.iter().all(|ev| ev.is_fixed));
        assert!(h.stacks.get_by_id(s.id).await.unwrap().unwrap().is_fixed());
    }

    #[tokio::test]
    async fn unknown_stack_errors_without_touching_cache() {
        let h = harness().await;
        h.service
            .get_by_signature_hash(h.stack.project_id, "sig")
            .await
            .unwrap();
        let err = h
            .service
            .mark_as_regressed(StackId::generate())
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(h.cache.len().await, 1);
    }

    /// Holds every `set` until the test lets it through.
    struct GatedCache {
        inner: InMemoryStackCache,
        arrived: tokio::sync::Notify,
        gate: tokio::sync::Notify,
    }

    #[async_trait::async_trait]
    impl StackCache for GatedCache {
        async fn get(&self, key: &str) -> Option<Stack> {
            self.inner.get(key).await
        }

        async fn set(&self, key: &str, stack: Stack) {
            self.arrived.notify_one();
            self.gate.notified().await;
            self.inner.set(key, stack).await;
        }

        async fn remove(&self, key: &str) {
            self.inner.remove(key).await;
        }
    }

    #[tokio::test]
    async fn fill_racing_a_mutation_does_not_keep_the_stale_stack() {
        let h = harness().await;
        let s = h.stack.clone();
        let cache = Arc::new(GatedCache {
            inner: InMemoryStackCache::new(),
            arrived: tokio::sync::Notify::new(),
            gate: tokio::sync::Notify::new(),
        });
        let service = Arc::new(StackService::new(
            h.stacks.clone(),
            cache.clone(),
            h.events.clone(),
        ));

        let project_id = s.project_id;
        let reader = tokio::spawn({
            let service = Arc::clone(&service);
            async move {
                service
                    .get_by_signature_hash(project_id, "sig")
                    .await
                    .unwrap()
            }
        });

        // the reader holds the pre-increment stack and is about to cache it
        cache.arrived.notified().await;
        service
            .increment_event_counter(s.organization_id, s.project_id, s.id, at(1), at(2), 7)
            .await
            .unwrap();
        cache.gate.notify_one();

        let stale = reader.await.unwrap().unwrap();
        assert_eq!(stale.total_occurrences, 0);
        assert_eq!(cache.inner.get(&s.cache_key()).await, None);

        cache.gate.notify_one();
        let fresh = service
            .get_by_signature_hash(s.project_id, "sig")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fresh.total_occurrences, 7);
    }
}

//! InMemoryEventRepository - 開発用・テスト用のイベントストア
//!
//! 本番の検索 index が持つ 2 つの性質を再現します:
//! - **refresh 遅延**: [`RefreshPolicy::Manual`] では追加したイベントは
//!   [`InMemoryEventRepository::refresh`] まで検索・件数に現れない
//! - **ページング一括更新**: 呼び出し時点で一致した id 集合に対し、
//!   `page_size` 件ずつ複数パスで更新する

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::debug;

use crate::domain::{
    Event, EventFilter, EventId, OrganizationId, ProjectId, StackId, SummaryWindow, TallyError,
    UserDescription,
};
use crate::ports::{EventRepository, FindResults, Paging};

/// Default number of documents touched per bulk-update pass.
pub const DEFAULT_PAGE_SIZE: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RefreshPolicy {
    /// New events are searchable at once.
    #[default]
    Immediate,
    /// New events become searchable on the next `refresh()`.
    Manual,
}

#[derive(Debug, Clone)]
struct StoredEvent {
    event: Event,
    /// Write order, used to pick the authoritative event per reference id.
    seq: u64,
    visible: bool,
}

#[derive(Default)]
struct EventStoreState {
    docs: HashMap<EventId, StoredEvent>,
    next_seq: u64,
}

impl EventStoreState {
    fn visible(&self) -> impl Iterator<Item = &StoredEvent> {
        self.docs.values().filter(|doc| doc.visible)
    }
}

pub struct InMemoryEventRepository {
    state: Arc<RwLock<EventStoreState>>,
    refresh_policy: RefreshPolicy,
    page_size: usize,
}

impl InMemoryEventRepository {
    pub fn new() -> Self {
        Self::with_options(RefreshPolicy::Immediate, DEFAULT_PAGE_SIZE)
    }

    pub fn with_options(refresh_policy: RefreshPolicy, page_size: usize) -> Self {
        Self {
            state: Arc::new(RwLock::new(EventStoreState::default())),
            refresh_policy,
            page_size: page_size.max(1),
        }
    }

    /// Make every stored event searchable.
    pub async fn refresh(&self) {
        let mut state = self.state.write().await;
        for doc in state.docs.values_mut() {
            doc.visible = true;
        }
    }

    /// Total stored documents, searchable or not.
    pub async fn len(&self) -> usize {
        self.state.read().await.docs.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Apply `patch` to every stored event matching `predicate`.
    ///
    /// The id set is fixed before the first pass; each pass takes the write
    /// lock for one page only.
    async fn patch_matching(
        &self,
        op: &'static str,
        predicate: impl Fn(&Event) -> bool + Send,
        patch: impl Fn(&mut Event) + Send,
    ) -> u64 {
        let mut ids: Vec<EventId> = {
            let state = self.state.read().await;
            state
                .docs
                .values()
                .filter(|doc| predicate(&doc.event))
                .map(|doc| doc.event.id)
                .collect()
        };
        ids.sort();

        let mut touched = 0u64;
        for (pass, page) in ids.chunks(self.page_size).enumerate() {
            let mut state = self.state.write().await;
            for id in page {
                if let Some(doc) = state.docs.get_mut(id) {
                    patch(&mut doc.event);
                    touched += 1;
                }
            }
            debug!(op, pass, page_len = page.len(), "bulk update pass");
        }
        touched
    }

    async fn remove_matching(&self, predicate: impl Fn(&Event) -> bool + Send) -> u64 {
        let mut state = self.state.write().await;
        let before = state.docs.len();
        state.docs.retain(|_, doc| !predicate(&doc.event));
        (before - state.docs.len()) as u64
    }

    async fn neighbor(
        &self,
        id: EventId,
        filter: Option<&EventFilter>,
        direction: Direction,
    ) -> Result<Option<EventId>, TallyError> {
        let state = self.state.read().await;
        let Some(current) = state.docs.get(&id) else {
            return Ok(None);
        };
        let key = current.event.order_key();
        let stack_id = current.event.stack_id;

        let candidates = state
            .visible()
            .map(|doc| &doc.event)
            .filter(|ev| ev.stack_id == stack_id)
            .filter(|ev| filter.is_none_or(|f| f.matches(ev)));

        let found = match direction {
            Direction::Previous => candidates
                .filter(|ev| ev.order_key() < key)
                .max_by_key(|ev| ev.order_key()),
            Direction::Next => candidates
                .filter(|ev| ev.order_key() > key)
                .min_by_key(|ev| ev.order_key()),
        };
        Ok(found.map(|ev| ev.id))
    }

    async fn count_where(&self, predicate: impl Fn(&Event) -> bool + Send) -> u64 {
        let state = self.state.read().await;
        state.visible().filter(|doc| predicate(&doc.event)).count() as u64
    }
}

impl Default for InMemoryEventRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy)]
enum Direction {
    Previous,
    Next,
}

#[async_trait]
impl EventRepository for InMemoryEventRepository {
    async fn add(&self, event: Event) -> Result<Event, TallyError> {
        let mut state = self.state.write().await;
        let seq = state.next_seq;
        state.next_seq += 1;
        state.docs.insert(
            event.id,
            StoredEvent {
                event: event.clone(),
                seq,
                visible: self.refresh_policy == RefreshPolicy::Immediate,
            },
        );
        Ok(event)
    }

    async fn get_by_id(&self, id: EventId) -> Result<Option<Event>, TallyError> {
        let state = self.state.read().await;
        Ok(state.docs.get(&id).map(|doc| doc.event.clone()))
    }

    async fn get_by_reference_id(
        &self,
        project_id: ProjectId,
        reference_id: &str,
    ) -> Result<Option<Event>, TallyError> {
        let state = self.state.read().await;
        Ok(state
            .visible()
            .filter(|doc| {
                doc.event.project_id == project_id
                    && doc.event.reference_id.as_deref() == Some(reference_id)
            })
            .max_by_key(|doc| doc.seq)
            .map(|doc| doc.event.clone()))
    }

    async fn previous_event_id(
        &self,
        id: EventId,
        filter: Option<&EventFilter>,
    ) -> Result<Option<EventId>, TallyError> {
        self.neighbor(id, filter, Direction::Previous).await
    }

    async fn next_event_id(
        &self,
        id: EventId,
        filter: Option<&EventFilter>,
    ) -> Result<Option<EventId>, TallyError> {
        self.neighbor(id, filter, Direction::Next).await
    }

    async fn find_by_project_in_window(
        &self,
        project_id: ProjectId,
        window: SummaryWindow,
        paging: Paging,
    ) -> Result<FindResults<Event>, TallyError> {
        let state = self.state.read().await;
        let mut matches: Vec<&Event> = state
            .visible()
            .map(|doc| &doc.event)
            .filter(|ev| ev.project_id == project_id && window.contains(ev.occurrence_date))
            .collect();
        matches.sort_by_key(|ev| std::cmp::Reverse(ev.order_key()));

        let total = matches.len() as u64;
        let documents = matches
            .into_iter()
            .skip(paging.offset())
            .take(paging.limit)
            .cloned()
            .collect();
        Ok(FindResults { documents, total })
    }

    async fn count_by_project(&self, project_id: ProjectId) -> Result<u64, TallyError> {
        Ok(self.count_where(|ev| ev.project_id == project_id).await)
    }

    async fn count_by_stack(&self, stack_id: StackId) -> Result<u64, TallyError> {
        Ok(self.count_where(|ev| ev.stack_id == stack_id).await)
    }

    async fn count_by_organization(
        &self,
        organization_id: OrganizationId,
    ) -> Result<u64, TallyError> {
        Ok(self
            .count_where(|ev| ev.organization_id == organization_id)
            .await)
    }

    async fn update_fixed_by_stack(
        &self,
        organization_id: OrganizationId,
        stack_id: StackId,
        value: bool,
    ) -> Result<u64, TallyError> {
        Ok(self
            .patch_matching(
                "update_fixed_by_stack",
                |ev| ev.organization_id == organization_id && ev.stack_id == stack_id,
                |ev| ev.is_fixed = value,
            )
            .await)
    }

    async fn update_hidden_by_stack(
        &self,
        organization_id: OrganizationId,
        stack_id: StackId,
        value: bool,
    ) -> Result<u64, TallyError> {
        Ok(self
            .patch_matching(
                "update_hidden_by_stack",
                |ev| ev.organization_id == organization_id && ev.stack_id == stack_id,
                |ev| ev.is_hidden = value,
            )
            .await)
    }

    async fn hide_all_by_client_ip_and_date(
        &self,
        organization_id: OrganizationId,
        client_ip: &str,
        utc_start: DateTime<Utc>,
        utc_end: DateTime<Utc>,
    ) -> Result<u64, TallyError> {
        let (utc_start, utc_end) = if utc_start <= utc_end {
            (utc_start, utc_end)
        } else {
            (utc_end, utc_start)
        };
        Ok(self
            .patch_matching(
                "hide_all_by_client_ip_and_date",
                |ev| {
                    ev.organization_id == organization_id
                        && ev.client_ip() == Some(client_ip)
                        && utc_start <= ev.occurrence_date
                        && ev.occurrence_date <= utc_end
                },
                |ev| ev.is_hidden = true,
            )
            .await)
    }

    async fn merge_user_description(
        &self,
        id: EventId,
        description: UserDescription,
    ) -> Result<Event, TallyError> {
        let mut state = self.state.write().await;
        let doc = state
            .docs
            .get_mut(&id)
            .ok_or_else(|| TallyError::not_found("event", id))?;
        doc.event.merge_user_description(description);
        Ok(doc.event.clone())
    }

    async fn remove_all_by_date(
        &self,
        organization_id: OrganizationId,
        utc_cutoff: DateTime<Utc>,
    ) -> Result<u64, TallyError> {
        Ok(self
            .remove_matching(|ev| {
                ev.organization_id == organization_id && ev.occurrence_date < utc_cutoff
            })
            .await)
    }

    async fn remove_oldest_events(
        &self,
        stack_id: StackId,
        max_events_per_stack: usize,
    ) -> Result<u64, TallyError> {
        let mut state = self.state.write().await;
        let mut keys: Vec<_> = state
            .docs
            .values()
            .filter(|doc| doc.event.stack_id == stack_id)
            .map(|doc| doc.event.order_key())
            .collect();
        if keys.len() <= max_events_per_stack {
            return Ok(0);
        }
        keys.sort();
        let excess = keys.len() - max_events_per_stack;
        for key in &keys[..excess] {
            state.docs.remove(&key.id);
        }
        Ok(excess as u64)
    }
}

//! EventRepository port - イベントの永続化と検索
//!
//! 下層のストア（検索 index）は結果整合です。書き込み直後のイベントは
//! 一時的に検索・件数に現れないことがあります。呼び出し側は鮮度にのみ
//! 依存し、正しさには依存しません。

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{
    Event, EventFilter, EventId, OrganizationId, ProjectId, StackId, SummaryWindow, TallyError,
    UserDescription,
};

/// 1-based page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Paging {
    pub page: usize,
    pub limit: usize,
}

impl Paging {
    pub fn new(page: usize, limit: usize) -> Self {
        Self {
            page: page.max(1),
            limit,
        }
    }

    pub fn limit(limit: usize) -> Self {
        Self::new(1, limit)
    }

    pub fn offset(&self) -> usize {
        (self.page - 1) * self.limit
    }
}

impl Default for Paging {
    fn default() -> Self {
        Self::limit(10)
    }
}

/// One page of documents plus the total number of matches.
#[derive(Debug, Clone, PartialEq)]
pub struct FindResults<T> {
    pub documents: Vec<T>,
    pub total: u64,
}

impl<T> FindResults<T> {
    pub fn empty() -> Self {
        Self {
            documents: Vec::new(),
            total: 0,
        }
    }

    pub fn has_more(&self, paging: &Paging) -> bool {
        ((paging.offset() + self.documents.len()) as u64) < self.total
    }
}

/// EventRepository はイベントの正本
///
/// # 設計原則
/// - 近傍検索は stack 内の順序キー (occurrence_date, id) に従う
/// - 一括更新はページングされていても呼び出し時点の全件を対象にする
/// - 参照 ID 検索は 0 件を `Ok(None)` で返す（エラーではない）
#[async_trait]
pub trait EventRepository: Send + Sync {
    /// Ingestion seam; creating events is not this core's job.
    async fn add(&self, event: Event) -> Result<Event, TallyError>;

    async fn get_by_id(&self, id: EventId) -> Result<Option<Event>, TallyError>;

    async fn get_by_reference_id(
        &self,
        project_id: ProjectId,
        reference_id: &str,
    ) -> Result<Option<Event>, TallyError>;

    async fn previous_event_id(
        &self,
        id: EventId,
        filter: Option<&EventFilter>,
    ) -> Result<Option<EventId>, TallyError>;

    async fn next_event_id(
        &self,
        id: EventId,
        filter: Option<&EventFilter>,
    ) -> Result<Option<EventId>, TallyError>;

    /// Events of a project inside the window, newest first.
    async fn find_by_project_in_window(
        &self,
        project_id: ProjectId,
        window: SummaryWindow,
        paging: Paging,
    ) -> Result<FindResults<Event>, TallyError>;

    async fn count_by_project(&self, project_id: ProjectId) -> Result<u64, TallyError>;

    async fn count_by_stack(&self, stack_id: StackId) -> Result<u64, TallyError>;

    async fn count_by_organization(&self, organization_id: OrganizationId)
    -> Result<u64, TallyError>;

    /// Returns how many events were touched.
    async fn update_fixed_by_stack(
        &self,
        organization_id: OrganizationId,
        stack_id: StackId,
        value: bool,
    ) -> Result<u64, TallyError>;

    async fn update_hidden_by_stack(
        &self,
        organization_id: OrganizationId,
        stack_id: StackId,
        value: bool,
    ) -> Result<u64, TallyError>;

    /// Hides every event from `client_ip` with `utc_start <= date <= utc_end`.
    ///
    /// Both ends are inclusive, unlike [`crate::domain::SummaryWindow`].
    async fn hide_all_by_client_ip_and_date(
        &self,
        organization_id: OrganizationId,
        client_ip: &str,
        utc_start: DateTime<Utc>,
        utc_end: DateTime<Utc>,
    ) -> Result<u64, TallyError>;

    /// Merge a user description into a stored event in one store-side step.
    async fn merge_user_description(
        &self,
        id: EventId,
        description: UserDescription,
    ) -> Result<Event, TallyError>;

    async fn remove_all_by_date(
        &self,
        organization_id: OrganizationId,
        utc_cutoff: DateTime<Utc>,
    ) -> Result<u64, TallyError>;

    async fn remove_oldest_events(
        &self,
        stack_id: StackId,
        max_events_per_stack: usize,
    ) -> Result<u64, TallyError>;
}

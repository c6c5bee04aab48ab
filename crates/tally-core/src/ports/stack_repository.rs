//! StackRepository port - stack 単位の集計カウンタ
//!
//! カウンタ更新は水平スケールした多数の ingestion worker から届きます。
//! プロセス内ロックでは守れないので、min/max/sum の更新は
//! ストア側で原子的に行う契約です。

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{
    OrganizationId, ProjectId, Stack, StackId, SummaryWindow, TallyError,
};

#[async_trait]
pub trait StackRepository: Send + Sync {
    /// Ingestion seam.
    async fn add(&self, stack: Stack) -> Result<Stack, TallyError>;

    async fn get_by_id(&self, id: StackId) -> Result<Option<Stack>, TallyError>;

    async fn get_by_signature_hash(
        &self,
        project_id: ProjectId,
        signature_hash: &str,
    ) -> Result<Option<Stack>, TallyError>;

    /// Atomically: `total += count`, `first = min`, `last = max`.
    ///
    /// Returns the stack as it is after the update.
    async fn increment_event_counter(
        &self,
        organization_id: OrganizationId,
        project_id: ProjectId,
        stack_id: StackId,
        min_occurrence: DateTime<Utc>,
        max_occurrence: DateTime<Utc>,
        count: u64,
    ) -> Result<Stack, TallyError>;

    /// `is_regressed = true`, `date_fixed = None`.
    async fn mark_as_regressed(&self, stack_id: StackId) -> Result<Stack, TallyError>;

    /// `date_fixed = at`, `is_regressed = false`.
    async fn mark_as_fixed(&self, stack_id: StackId, at: DateTime<Utc>)
    -> Result<Stack, TallyError>;

    /// Stacks first seen inside the window, newest first.
    async fn get_new(
        &self,
        project_id: ProjectId,
        window: SummaryWindow,
        limit: usize,
    ) -> Result<Vec<Stack>, TallyError>;

    async fn count_new(&self, project_id: ProjectId, window: SummaryWindow)
    -> Result<u64, TallyError>;
}

/// StackCache は signature hash → Stack のキャッシュ
///
/// ingestion 時の重複排除で使われます。Stack を変更したら必ず該当エントリを
/// 無効化すること（[`crate::app::StackService`] が担当）。
#[async_trait]
pub trait StackCache: Send + Sync {
    async fn get(&self, key: &str) -> Option<Stack>;

    async fn set(&self, key: &str, stack: Stack);

    async fn remove(&self, key: &str);
}

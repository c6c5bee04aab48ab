//! ProjectRepository / OrganizationRepository / UserRepository ports
//!
//! Summary job が読む側のリポジトリです。Project のカウンタ
//! (`next_summary_end_of_day_ticks`) を書き換えるのは claim だけです。

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{
    Organization, OrganizationId, Project, ProjectId, SummaryClaim, TallyError, User, UserId,
};

#[async_trait]
pub trait ProjectRepository: Send + Sync {
    async fn get_by_id(&self, id: ProjectId) -> Result<Option<Project>, TallyError>;

    /// Claim up to `limit` projects whose boundary plus `offset_hours` has passed.
    ///
    /// For every returned claim the project's counter has already been
    /// advanced by one day, compare-and-swap against the value observed while
    /// selecting. A project advanced concurrently by someone else is left out.
    async fn claim_due_summaries(
        &self,
        now: DateTime<Utc>,
        offset_hours: u32,
        limit: usize,
    ) -> Result<Vec<SummaryClaim>, TallyError>;
}

#[async_trait]
pub trait OrganizationRepository: Send + Sync {
    async fn get_by_id(&self, id: OrganizationId) -> Result<Option<Organization>, TallyError>;
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Unknown ids are left out of the result.
    async fn get_by_ids(&self, ids: &[UserId]) -> Result<Vec<User>, TallyError>;
}

/// BillingPlans は plan の参照（読み取り専用）
///
/// summary を free plan としてタグ付けするためだけに使います。
pub trait BillingPlans: Send + Sync {
    fn is_free_plan(&self, plan_id: &str) -> bool;
}

//! InMemoryProjectRepository ほか - summary job が読むストアの開発用実装
//!
//! # 実装詳細
//! - claim は「読み取りロックで候補を選ぶ → 書き込みロックで compare-and-swap」
//!   の 2 段階。本番ストアの条件付き更新と同じく、選択後に他の runner が
//!   先に進めた project は結果から外れる
//! - Organization / User は HashMap を読むだけ

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::debug;

use crate::domain::{
    EndOfDayTicks, Organization, OrganizationId, Project, ProjectId, SummaryClaim, TallyError,
    User, UserId,
};
use crate::ports::{BillingPlans, OrganizationRepository, ProjectRepository, UserRepository};

#[derive(Default)]
pub struct InMemoryProjectRepository {
    projects: Arc<RwLock<HashMap<ProjectId, Project>>>,
}

impl InMemoryProjectRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add(&self, project: Project) -> Project {
        self.projects
            .write()
            .await
            .insert(project.id, project.clone());
        project
    }

    async fn select_due(
        &self,
        now: DateTime<Utc>,
        offset_hours: u32,
        limit: usize,
    ) -> Vec<(ProjectId, EndOfDayTicks)> {
        let projects = self.projects.read().await;
        let mut due: Vec<_> = projects
            .values()
            .filter(|p| p.next_summary_end_of_day_ticks.is_due(now, offset_hours))
            .map(|p| (p.id, p.next_summary_end_of_day_ticks))
            .collect();
        due.sort_by_key(|(_, ticks)| *ticks);
        due.truncate(limit);
        due
    }
}

#[async_trait]
impl ProjectRepository for InMemoryProjectRepository {
    async fn get_by_id(&self, id: ProjectId) -> Result<Option<Project>, TallyError> {
        Ok(self.projects.read().await.get(&id).cloned())
    }

    async fn claim_due_summaries(
        &self,
        now: DateTime<Utc>,
        offset_hours: u32,
        limit: usize,
    ) -> Result<Vec<SummaryClaim>, TallyError> {
        let candidates = self.select_due(now, offset_hours, limit).await;
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let mut projects = self.projects.write().await;
        let mut claims = Vec::with_capacity(candidates.len());
        for (project_id, observed) in candidates {
            let Some(project) = projects.get_mut(&project_id) else {
                continue;
            };
            if project.next_summary_end_of_day_ticks != observed {
                debug!(project = %project_id, "claim lost to a concurrent runner");
                continue;
            }
            project.next_summary_end_of_day_ticks = observed.advance();
            claims.push(SummaryClaim::new(project_id, observed));
        }
        Ok(claims)
    }
}

#[derive(Default)]
pub struct InMemoryOrganizationRepository {
    organizations: Arc<RwLock<HashMap<OrganizationId, Organization>>>,
}

impl InMemoryOrganizationRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add(&self, organization: Organization) -> Organization {
        self.organizations
            .write()
            .await
            .insert(organization.id, organization.clone());
        organization
    }
}

#[async_trait]
impl OrganizationRepository for InMemoryOrganizationRepository {
    async fn get_by_id(&self, id: OrganizationId) -> Result<Option<Organization>, TallyError> {
        Ok(self.organizations.read().await.get(&id).cloned())
    }
}

#[derive(Default)]
pub struct InMemoryUserRepository {
    users: Arc<RwLock<HashMap<UserId, User>>>,
}

impl InMemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add(&self, user: User) -> User {
        self.users.write().await.insert(user.id, user.clone());
        user
    }
}

#[async_trait]
impl UserRepository for InMemoryUserRepository {
    async fn get_by_ids(&self, ids: &[UserId]) -> Result<Vec<User>, TallyError> {
        let users = self.users.read().await;
        Ok(ids.iter().filter_map(|id| users.get(id).cloned()).collect())
    }
}

/// Plan lookup backed by a fixed set of free plan ids.
#[derive(Debug, Clone, Default)]
pub struct StaticBillingPlans {
    free_plan_ids: HashSet<String>,
}

impl StaticBillingPlans {
    pub const FREE_PLAN_ID: &'static str = "EX_FREE";

    pub fn new<I, S>(free_plan_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            free_plan_ids: free_plan_ids.into_iter().map(Into::into).collect(),
        }
    }

    pub fn with_default_free_plan() -> Self {
        Self::new([Self::FREE_PLAN_ID])
    }
}

impl BillingPlans for StaticBillingPlans {
    fn is_free_plan(&self, plan_id: &str) -> bool {
        self.free_plan_ids.contains(plan_id)
    }
}

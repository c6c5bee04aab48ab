//! InMemoryBackend - 全 port のインメモリ実装をまとめたもの
//!
//! テストと CLI で同じワイヤリングを使うための入口です。具体型の Arc を
//! 公開しているので、シードや検証は各ストアへ直接行えます。

use std::sync::Arc;

use crate::app::AppBuilder;
use crate::ports::Clock;

use super::{
    InMemoryEventRepository, InMemoryLockProvider, InMemoryOrganizationRepository,
    InMemoryProjectRepository, InMemoryStackCache, InMemoryStackRepository,
    InMemoryUserRepository, RecordingMailer, RefreshPolicy, StaticBillingPlans,
};

pub struct InMemoryBackend {
    pub events: Arc<InMemoryEventRepository>,
    pub stacks: Arc<InMemoryStackRepository>,
    pub stack_cache: Arc<InMemoryStackCache>,
    pub projects: Arc<InMemoryProjectRepository>,
    pub organizations: Arc<InMemoryOrganizationRepository>,
    pub users: Arc<InMemoryUserRepository>,
    pub locks: Arc<InMemoryLockProvider>,
    pub plans: Arc<StaticBillingPlans>,
    pub mailer: Arc<RecordingMailer>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::with_mailer(RecordingMailer::new())
    }

    pub fn with_mailer(mailer: RecordingMailer) -> Self {
        Self {
            events: Arc::new(InMemoryEventRepository::new()),
            stacks: Arc::new(InMemoryStackRepository::new()),
            stack_cache: Arc::new(InMemoryStackCache::new()),
            projects: Arc::new(InMemoryProjectRepository::new()),
            organizations: Arc::new(InMemoryOrganizationRepository::new()),
            users: Arc::new(InMemoryUserRepository::new()),
            locks: Arc::new(InMemoryLockProvider::new()),
            plans: Arc::new(StaticBillingPlans::with_default_free_plan()),
            mailer: Arc::new(mailer),
        }
    }

    pub fn with_event_store(mut self, refresh_policy: RefreshPolicy, page_size: usize) -> Self {
        self.events = Arc::new(InMemoryEventRepository::with_options(
            refresh_policy,
            page_size,
        ));
        self
    }

    /// Builder with every port wired, the recording mailer included.
    pub fn app_builder(&self, clock: Arc<dyn Clock>) -> AppBuilder {
        self.app_builder_without_mailer(clock)
            .mailer(self.mailer.clone())
    }

    pub fn app_builder_without_mailer(&self, clock: Arc<dyn Clock>) -> AppBuilder {
        AppBuilder::new()
            .events(self.events.clone())
            .stacks(self.stacks.clone(), self.stack_cache.clone())
            .projects(
                self.projects.clone(),
                self.organizations.clone(),
                self.users.clone(),
            )
            .locks(self.locks.clone())
            .billing_plans(self.plans.clone())
            .clock(clock)
    }
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

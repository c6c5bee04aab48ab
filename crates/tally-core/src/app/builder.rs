//! AppBuilder - アプリケーションの構築とワイヤリング
//!
//! # 学習ポイント
//! - Builder パターンの実装
//! - 起動時検証（Fail-fast 設計）
//! - 開発体験の改善（明確なエラーメッセージ）

use std::sync::Arc;

use crate::app::{DailySummaryJob, EventStats, StackService, UserDescriptionJob};
use crate::config::SummaryConfig;
use crate::ports::{
    BillingPlans, Clock, EventRepository, LockProvider, Mailer, OrganizationRepository,
    ProjectRepository, StackCache, StackRepository, SystemClock, UserRepository,
};

/// AppBuilder はアプリケーションを構築
///
/// # 使用例
/// ```ignore
/// let app = AppBuilder::new()
///     .events(events)
///     .stacks(stacks, cache)
///     .projects(projects, organizations, users)
///     .locks(locks)
///     .billing_plans(plans)
///     .mailer(mailer)
///     .build()?;
/// ```
///
/// # Fail-fast 設計
/// - 必須の port が 1 つでも欠けていれば build() が BuildError を返す
/// - mailer は任意（無ければ summary job は何もせず成功を返す）
/// - clock は省略時 SystemClock
#[derive(Default)]
pub struct AppBuilder {
    events: Option<Arc<dyn EventRepository>>,
    stacks: Option<Arc<dyn StackRepository>>,
    stack_cache: Option<Arc<dyn StackCache>>,
    projects: Option<Arc<dyn ProjectRepository>>,
    organizations: Option<Arc<dyn OrganizationRepository>>,
    users: Option<Arc<dyn UserRepository>>,
    locks: Option<Arc<dyn LockProvider>>,
    plans: Option<Arc<dyn BillingPlans>>,
    mailer: Option<Arc<dyn Mailer>>,
    clock: Option<Arc<dyn Clock>>,
    summary_config: SummaryConfig,
}

/// BuildError はアプリケーション構築時のエラー
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("Missing ports: {0:?}. These ports must be provided before build().")]
    MissingPorts(Vec<&'static str>),
}

impl AppBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(mut self, events: Arc<dyn EventRepository>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn stacks(mut self, stacks: Arc<dyn StackRepository>, cache: Arc<dyn StackCache>) -> Self {
        self.stacks = Some(stacks);
        self.stack_cache = Some(cache);
        self
    }

    pub fn projects(
        mut self,
        projects: Arc<dyn ProjectRepository>,
        organizations: Arc<dyn OrganizationRepository>,
        users: Arc<dyn UserRepository>,
    ) -> Self {
        self.projects = Some(projects);
        self.organizations = Some(organizations);
        self.users = Some(users);
        self
    }

    pub fn locks(mut self, locks: Arc<dyn LockProvider>) -> Self {
        self.locks = Some(locks);
        self
    }

    pub fn billing_plans(mut self, plans: Arc<dyn BillingPlans>) -> Self {
        self.plans = Some(plans);
        self
    }

    pub fn mailer(mut self, mailer: Arc<dyn Mailer>) -> Self {
        self.mailer = Some(mailer);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn summary_config(mut self, config: SummaryConfig) -> Self {
        self.summary_config = config;
        self
    }

    /// AppBuilder を構築して App を生成
    ///
    /// # 検証
    /// - 必須 port が全て設定されているかチェック
    /// - 不足があれば BuildError::MissingPorts に不足分を全て列挙して返す
    pub fn build(self) -> Result<App, BuildError> {
        let mut missing = Vec::new();
        if self.events.is_none() {
            missing.push("events");
        }
        if self.stacks.is_none() {
            missing.push("stacks");
        }
        if self.stack_cache.is_none() {
            missing.push("stack_cache");
        }
        if self.projects.is_none() {
            missing.push("projects");
        }
        if self.organizations.is_none() {
            missing.push("organizations");
        }
        if self.users.is_none() {
            missing.push("users");
        }
        if self.locks.is_none() {
            missing.push("locks");
        }
        if self.plans.is_none() {
            missing.push("billing_plans");
        }

        let (
            Some(events),
            Some(stacks),
            Some(stack_cache),
            Some(projects),
            Some(organizations),
            Some(users),
            Some(locks),
            Some(plans),
        ) = (
            self.events,
            self.stacks,
            self.stack_cache,
            self.projects,
            self.organizations,
            self.users,
            self.locks,
            self.plans,
        )
        else {
            return Err(BuildError::MissingPorts(missing));
        };

        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let stack_service = Arc::new(StackService::new(
            Arc::clone(&stacks),
            stack_cache,
            Arc::clone(&events),
        ));

        let daily_summary = DailySummaryJob {
            projects,
            organizations,
            users,
            events: Arc::clone(&events),
            stacks: Arc::clone(&stack_service),
            stats: EventStats::new(Arc::clone(&events), stacks),
            mailer: self.mailer,
            locks,
            plans,
            clock,
            config: self.summary_config,
        };

        Ok(App {
            events: Arc::clone(&events),
            stacks: stack_service,
            daily_summary: Arc::new(daily_summary),
            user_descriptions: Arc::new(UserDescriptionJob::new(events)),
        })
    }
}

/// App はワイヤリング済みのジョブとサービス
pub struct App {
    pub events: Arc<dyn EventRepository>,
    pub stacks: Arc<StackService>,
    pub daily_summary: Arc<DailySummaryJob>,
    pub user_descriptions: Arc<UserDescriptionJob>,
}

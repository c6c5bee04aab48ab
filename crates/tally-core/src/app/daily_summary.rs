//! DailySummaryJob - project ごとの日次サマリ配信
//!
//! # 状態遷移（1 回の実行）
//! ```text
//! ACQUIRE_LOCK → (ABORT_NONFATAL | CLAIM_BATCH) → {SKIP_STALE | PROCESS}*
//!              → (EMPTY_BATCH → DONE | CONTINUE → CLAIM_BATCH)
//! ```
//!
//! # 設計原則
//! - claim は処理の前に project のカウンタを進める（同じウィンドウは二度処理しない）
//! - キャンセルはバッチの境界でのみ確認する（1 project の配信は途中で止めない）
//! - 1 project / 1 宛先の失敗は報告に積み、実行全体は止めない

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::app::{EventStats, StackService};
use crate::config::SummaryConfig;
use crate::domain::{
    DailySummary, JobResult, Organization, Project, ProjectId, StackSummary, SummaryClaim,
    SummaryWindow, TallyError, User,
};
use crate::ports::{
    BillingPlans, Clock, EventRepository, LockProvider, Mailer, OrganizationRepository,
    ProjectRepository, UserRepository,
};

/// Name of the global lock serializing summary runs.
pub const DAILY_SUMMARY_LOCK: &str = "daily-summary";

/// Newest stacks listed in one summary.
const NEW_STACKS_LIMIT: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryFailure {
    pub project_id: ProjectId,
    pub email_address: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectFailure {
    pub project_id: ProjectId,
    pub error: String,
}

/// What one run did; attached to the [`JobResult`] as details.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryRunReport {
    pub batches: u32,
    pub projects_claimed: usize,
    pub processed: usize,
    pub skipped_stale: usize,
    pub skipped_no_recipients: usize,
    pub deliveries_sent: usize,
    pub delivery_failures: Vec<DeliveryFailure>,
    pub project_failures: Vec<ProjectFailure>,
    pub cancelled: bool,
}

pub struct DailySummaryJob {
    pub(crate) projects: Arc<dyn ProjectRepository>,
    pub(crate) organizations: Arc<dyn OrganizationRepository>,
    pub(crate) users: Arc<dyn UserRepository>,
    pub(crate) events: Arc<dyn EventRepository>,
    pub(crate) stacks: Arc<StackService>,
    pub(crate) stats: EventStats,
    pub(crate) mailer: Option<Arc<dyn Mailer>>,
    pub(crate) locks: Arc<dyn LockProvider>,
    pub(crate) plans: Arc<dyn BillingPlans>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) config: SummaryConfig,
}

impl DailySummaryJob {
    pub fn config(&self) -> &SummaryConfig {
        &self.config
    }

    /// One invocation of the state machine.
    ///
    /// Expected skips come back as `Ok`; only lock or claim infrastructure
    /// failures are errors.
    pub async fn run(&self, shutdown: &watch::Receiver<bool>) -> Result<JobResult, TallyError> {
        if !self.config.enabled {
            return Ok(JobResult::success_with_message(
                "Summary notifications are disabled.",
            ));
        }
        let Some(mailer) = self.mailer.as_deref() else {
            return Ok(JobResult::success_with_message(
                "Summary notifications are disabled: no mailer configured.",
            ));
        };

        let Some(_lock) = self
            .locks
            .acquire(DAILY_SUMMARY_LOCK, self.config.lock_wait)
            .await?
        else {
            info!(lock = DAILY_SUMMARY_LOCK, "summary run skipped: lock held elsewhere");
            return Ok(JobResult::skipped("Daily summary is already running."));
        };

        let mut report = SummaryRunReport::default();
        loop {
            if *shutdown.borrow() {
                info!(batches = report.batches, "summary run cancelled");
                report.cancelled = true;
                break;
            }

            let now = self.clock.now();
            let claims = self
                .projects
                .claim_due_summaries(now, self.config.trigger_offset_hours, self.config.batch_size)
                .await?;
            if claims.is_empty() {
                break;
            }
            report.batches += 1;
            report.projects_claimed += claims.len();
            info!(count = claims.len(), "claimed projects for daily summary");

            for claim in claims {
                if claim.window.is_stale(now, self.config.stale_after) {
                    info!(
                        project = %claim.project_id,
                        start = %claim.window.utc_start,
                        "skipping stale daily summary"
                    );
                    report.skipped_stale += 1;
                    continue;
                }

                if let Err(err) = self.process(&claim, mailer, &mut report).await {
                    error!(project = %claim.project_id, error = %err, "daily summary failed");
                    report.project_failures.push(ProjectFailure {
                        project_id: claim.project_id,
                        error: err.to_string(),
                    });
                }
            }
        }

        let message = if report.cancelled {
            "Summary run cancelled between batches."
        } else {
            "Successfully sent summary notifications."
        };
        Ok(JobResult::success_with_message(message).with_details(serde_json::to_value(&report)?))
    }

    /// Periodic driver; returns once `shutdown` flips to true or its sender is gone.
    pub async fn run_forever(&self, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
            }
            if *shutdown.borrow() {
                break;
            }

            match self.run(&shutdown).await {
                Ok(result) => info!(
                    kind = ?result.kind,
                    message = result.message.as_deref().unwrap_or_default(),
                    "daily summary run finished"
                ),
                Err(err) => error!(error = %err, kind = ?err.kind(), "daily summary run failed"),
            }
        }
        info!("daily summary scheduler stopped");
    }

    async fn process(
        &self,
        claim: &SummaryClaim,
        mailer: &dyn Mailer,
        report: &mut SummaryRunReport,
    ) -> Result<(), TallyError> {
        let project = self
            .projects
            .get_by_id(claim.project_id)
            .await?
            .ok_or_else(|| TallyError::not_found("project", claim.project_id))?;
        let organization = self
            .organizations
            .get_by_id(project.organization_id)
            .await?
            .ok_or_else(|| TallyError::not_found("organization", project.organization_id))?;

        let recipients = self.recipients(&project, &organization).await?;
        if recipients.is_empty() {
            info!(project = %project.id, "project has no users to send summary to");
            report.skipped_no_recipients += 1;
            return Ok(());
        }

        info!(users = recipients.len(), project = %project.id, "sending daily summary");
        let summary = self
            .build_summary(&project, &organization, claim.window)
            .await?;

        for user in &recipients {
            match mailer.send_daily_summary(&user.email_address, &summary).await {
                Ok(()) => report.deliveries_sent += 1,
                Err(err) => {
                    warn!(project = %project.id, error = %err, "daily summary delivery failed");
                    report.delivery_failures.push(DeliveryFailure {
                        project_id: project.id,
                        email_address: err.address,
                        reason: err.reason,
                    });
                }
            }
        }
        report.processed += 1;

        info!(
            users = recipients.len(),
            project = %project.id,
            events = summary.total,
            "done sending daily summary"
        );
        Ok(())
    }

    async fn recipients(
        &self,
        project: &Project,
        organization: &Organization,
    ) -> Result<Vec<User>, TallyError> {
        let subscribers = project.daily_summary_subscribers();
        if subscribers.is_empty() {
            return Ok(Vec::new());
        }
        let users = self.users.get_by_ids(&subscribers).await?;
        Ok(users
            .into_iter()
            .filter(|user| user.can_receive_summary(organization.id))
            .collect())
    }

    async fn build_summary(
        &self,
        project: &Project,
        organization: &Organization,
        window: SummaryWindow,
    ) -> Result<DailySummary, TallyError> {
        let newest = self
            .stacks
            .get_new(project.id, window, NEW_STACKS_LIMIT)
            .await?;
        let stats = self.stats.window_stats(project.id, window).await?;

        let has_submitted_events = if stats.total > 0 {
            true
        } else {
            self.events.count_by_project(project.id).await? > 0
        };
        debug!(
            project = %project.id,
            total = stats.total,
            unique = stats.unique,
            new = stats.new,
            has_submitted_events,
            "window stats"
        );

        let hours = window.hours();
        let per_hour_average = if hours > 0.0 {
            stats.total as f64 / hours
        } else {
            0.0
        };

        Ok(DailySummary {
            project_id: project.id,
            project_name: project.name.clone(),
            start_date: window.utc_start,
            end_date: window.utc_end,
            total: stats.total,
            per_hour_average,
            new_total: stats.new,
            new: newest.iter().map(StackSummary::from).collect(),
            unique_total: stats.unique,
            most_frequent: Vec::new(),
            has_submitted_events,
            is_free_plan: self.plans.is_free_plan(&organization.plan_id),
        })
    }
}

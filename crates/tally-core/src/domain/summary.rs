//! Daily summary payload and the intermediate values used to build it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{ProjectId, StackId};
use super::stack::Stack;
use super::window::{EndOfDayTicks, SummaryWindow};

/// A project taken by one claim step.
///
/// `window` is the day that ended at the counter value observed before the
/// claim advanced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryClaim {
    pub project_id: ProjectId,
    pub claimed_ticks: EndOfDayTicks,
    pub window: SummaryWindow,
}

impl SummaryClaim {
    pub fn new(project_id: ProjectId, claimed_ticks: EndOfDayTicks) -> Self {
        Self {
            project_id,
            claimed_ticks,
            window: claimed_ticks.window(),
        }
    }
}

/// Event totals for one project inside one window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowStats {
    /// Events in the window.
    pub total: u64,
    /// Distinct stacks those events belong to.
    pub unique: u64,
    /// Stacks first seen inside the window.
    pub new: u64,
}

/// Stack line in a summary mail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StackSummary {
    pub id: StackId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exception_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    pub is_404: bool,
    pub total: u64,
    pub first: Option<DateTime<Utc>>,
    pub last: Option<DateTime<Utc>>,
}

impl From<&Stack> for StackSummary {
    fn from(stack: &Stack) -> Self {
        let info = |key: &str| stack.signature_info.get(key).cloned();
        Self {
            id: stack.id,
            title: stack.title.clone(),
            exception_type: info("ExceptionType"),
            method: info("Method"),
            path: info("Source"),
            is_404: stack.signature_info.get("Type").map(String::as_str) == Some("404"),
            total: stack.total_occurrences,
            first: stack.first_occurrence,
            last: stack.last_occurrence,
        }
    }
}

/// Notification payload handed to the mailer, one per project and window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailySummary {
    pub project_id: ProjectId,
    pub project_name: String,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub total: u64,
    pub per_hour_average: f64,
    pub new_total: u64,
    pub new: Vec<StackSummary>,
    pub unique_total: u64,
    /// Kept in the schema; not populated.
    pub most_frequent: Vec<StackSummary>,
    pub has_submitted_events: bool,
    pub is_free_plan: bool,
}

//! Projects, organizations and users as seen by the summary job.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use super::ids::{OrganizationId, ProjectId, UserId};
use super::window::EndOfDayTicks;

/// Per-user notification preferences for one project.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationSettings {
    #[serde(default)]
    pub send_daily_summary: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: ProjectId,
    pub organization_id: OrganizationId,
    pub name: String,
    #[serde(default)]
    pub notification_settings: HashMap<UserId, NotificationSettings>,
    pub next_summary_end_of_day_ticks: EndOfDayTicks,
}

impl Project {
    pub fn new(
        id: ProjectId,
        organization_id: OrganizationId,
        name: impl Into<String>,
        next_summary_end_of_day_ticks: EndOfDayTicks,
    ) -> Self {
        Self {
            id,
            organization_id,
            name: name.into(),
            notification_settings: HashMap::new(),
            next_summary_end_of_day_ticks,
        }
    }

    pub fn with_daily_summary_for(mut self, user_id: UserId) -> Self {
        self.notification_settings.insert(
            user_id,
            NotificationSettings {
                send_daily_summary: true,
            },
        );
        self
    }

    /// Users that opted into the daily summary for this project.
    pub fn daily_summary_subscribers(&self) -> Vec<UserId> {
        let mut ids: Vec<UserId> = self
            .notification_settings
            .iter()
            .filter(|(_, settings)| settings.send_daily_summary)
            .map(|(user_id, _)| *user_id)
            .collect();
        ids.sort();
        ids
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Organization {
    pub id: OrganizationId,
    pub name: String,
    pub plan_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub email_address: String,
    pub is_email_address_verified: bool,
    pub email_notifications_enabled: bool,
    #[serde(default)]
    pub organization_ids: BTreeSet<OrganizationId>,
}

impl User {
    /// Can this user receive a summary for a project of `organization_id`?
    pub fn can_receive_summary(&self, organization_id: OrganizationId) -> bool {
        self.is_email_address_verified
            && self.email_notifications_enabled
            && self.organization_ids.contains(&organization_id)
    }
}

//! Stored events, their ordering key, and the user-description merge.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{EventId, OrganizationId, ProjectId, StackId};

/// Key under which request metadata is stored in `Event::data`.
pub const REQUEST_INFO_KEY: &str = "@request";

/// Free-form event payload (keys are unique).
pub type DataMap = BTreeMap<String, serde_json::Value>;

/// A note left by an end user about one occurrence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserDescription {
    pub email_address: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "DataMap::is_empty")]
    pub data: DataMap,
}

impl UserDescription {
    pub fn new(email_address: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            email_address: email_address.into(),
            description: description.into(),
            data: DataMap::new(),
        }
    }

    pub fn with_data(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.data.insert(key.into(), value);
        self
    }
}

/// One recorded occurrence of an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub organization_id: OrganizationId,
    pub project_id: ProjectId,
    pub stack_id: StackId,
    pub occurrence_date: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_id: Option<String>,
    #[serde(default)]
    pub data: DataMap,
    #[serde(default)]
    pub is_fixed: bool,
    #[serde(default)]
    pub is_hidden: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_description: Option<UserDescription>,
}

impl Event {
    pub fn new(
        id: EventId,
        organization_id: OrganizationId,
        project_id: ProjectId,
        stack_id: StackId,
        occurrence_date: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            organization_id,
            project_id,
            stack_id,
            occurrence_date,
            reference_id: None,
            data: DataMap::new(),
            is_fixed: false,
            is_hidden: false,
            user_description: None,
        }
    }

    pub fn with_reference_id(mut self, reference_id: impl Into<String>) -> Self {
        self.reference_id = Some(reference_id.into());
        self
    }

    pub fn with_client_ip(mut self, ip: impl Into<String>) -> Self {
        self.data.insert(
            REQUEST_INFO_KEY.to_string(),
            serde_json::json!({ "client_ip_address": ip.into() }),
        );
        self
    }

    pub fn order_key(&self) -> OrderKey {
        OrderKey {
            occurrence_date: self.occurrence_date,
            id: self.id,
        }
    }

    /// Client IP recorded in the request info, if any.
    pub fn client_ip(&self) -> Option<&str> {
        self.data
            .get(REQUEST_INFO_KEY)?
            .get("client_ip_address")?
            .as_str()
    }

    /// Attach a user description.
    ///
    /// Extra data is unioned into the event data (incoming keys win) and the
    /// email/description pair replaces any earlier description.
    pub fn merge_user_description(&mut self, description: UserDescription) {
        let UserDescription {
            email_address,
            description,
            data,
        } = description;
        self.data.extend(data);
        self.user_description = Some(UserDescription {
            email_address,
            description,
            data: DataMap::new(),
        });
    }
}

/// Ordering key of events inside a stack: occurrence date, then id.
///
/// Ids are unique, so this is a total order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderKey {
    pub occurrence_date: DateTime<Utc>,
    pub id: EventId,
}

impl PartialOrd for OrderKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OrderKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.occurrence_date
            .cmp(&other.occurrence_date)
            .then_with(|| self.id.cmp(&other.id))
    }
}

/// Optional constraints for neighbor lookups.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventFilter {
    /// Inclusive lower bound on the occurrence date.
    pub utc_start: Option<DateTime<Utc>>,
    /// Exclusive upper bound on the occurrence date.
    pub utc_end: Option<DateTime<Utc>>,
    pub is_fixed: Option<bool>,
    pub is_hidden: Option<bool>,
}

impl EventFilter {
    pub fn between(utc_start: DateTime<Utc>, utc_end: DateTime<Utc>) -> Self {
        Self {
            utc_start: Some(utc_start),
            utc_end: Some(utc_end),
            ..Self::default()
        }
    }

    pub fn hidden(mut self, value: bool) -> Self {
        self.is_hidden = Some(value);
        self
    }

    pub fn fixed(mut self, value: bool) -> Self {
        self.is_fixed = Some(value);
        self
    }

    pub fn matches(&self, event: &Event) -> bool {
        if let Some(start) = self.utc_start
            && event.occurrence_date < start
        {
            return false;
        }
        if let Some(end) = self.utc_end
            && event.occurrence_date >= end
        {
            return false;
        }
        if let Some(fixed) = self.is_fixed
            && event.is_fixed != fixed
        {
            return false;
        }
        if let Some(hidden) = self.is_hidden
            && event.is_hidden != hidden
        {
            return false;
        }
        true
    }
}

//! Queue message carrying a user description for an already stored event.

use serde::{Deserialize, Serialize};

use super::event::{DataMap, UserDescription};
use super::ids::ProjectId;

/// Merge request for the event identified by `(project_id, reference_id)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventUserDescription {
    pub project_id: ProjectId,
    pub reference_id: String,
    pub email_address: String,
    pub description: String,
    #[serde(default)]
    pub data: DataMap,
}

impl EventUserDescription {
    pub fn new(
        project_id: ProjectId,
        reference_id: impl Into<String>,
        email_address: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            project_id,
            reference_id: reference_id.into(),
            email_address: email_address.into(),
            description: description.into(),
            data: DataMap::new(),
        }
    }

    pub fn with_data(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.data.insert(key.into(), value);
        self
    }

    pub fn to_user_description(&self) -> UserDescription {
        UserDescription {
            email_address: self.email_address.clone(),
            description: self.description.clone(),
            data: self.data.clone(),
        }
    }
}

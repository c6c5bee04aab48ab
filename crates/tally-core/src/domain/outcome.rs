//! Job result model: common result format for one job invocation.
//!
//! This module does not assume a scheduler or a queue. It only defines the
//! "shape" of results so runs can be logged and explained later.

use serde::{Deserialize, Serialize};

/// A unified classification of a job run.
///
/// Serialized as SCREAMING_SNAKE_CASE: SUCCESS / SKIPPED / FAILURE.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobResultKind {
    Success,
    /// Expected, non-fatal: the run did nothing on purpose (lock held elsewhere, ...).
    Skipped,
    Failure,
}

/// Result of one job invocation.
///
/// - `SUCCESS`: the run completed (possibly with a message explaining a no-op).
/// - `SKIPPED`: the run was not attempted; not an error.
/// - `FAILURE`: the run aborted; `reason` says why.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobResult {
    pub kind: JobResultKind,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Structured details (run report, counters).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl JobResult {
    pub fn success() -> Self {
        Self {
            kind: JobResultKind::Success,
            message: None,
            details: None,
        }
    }

    pub fn success_with_message(message: impl Into<String>) -> Self {
        Self {
            kind: JobResultKind::Success,
            message: Some(message.into()),
            details: None,
        }
    }

    pub fn skipped(message: impl Into<String>) -> Self {
        Self {
            kind: JobResultKind::Skipped,
            message: Some(message.into()),
            details: None,
        }
    }

    pub fn failure(reason: impl Into<String>) -> Self {
        Self {
            kind: JobResultKind::Failure,
            message: Some(reason.into()),
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn is_success(&self) -> bool {
        self.kind == JobResultKind::Success
    }

    /// Anything but a failure.
    pub fn is_ok(&self) -> bool {
        self.kind != JobResultKind::Failure
    }
}

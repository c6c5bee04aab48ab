//! Stack record: denormalized per-group counters and flags.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{OrganizationId, ProjectId, StackId};

/// Group of events sharing a common error signature.
///
/// Design:
/// - Counters change only through [`Stack::apply_occurrences`], which is
///   commutative and associative, so stores can apply concurrent increments
///   in any order.
/// - `first_occurrence` / `last_occurrence` are `None` until the first count.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stack {
    pub id: StackId,
    pub organization_id: OrganizationId,
    pub project_id: ProjectId,
    pub signature_hash: String,
    #[serde(default)]
    pub signature_info: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub total_occurrences: u64,
    pub first_occurrence: Option<DateTime<Utc>>,
    pub last_occurrence: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_fixed: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_regressed: bool,
    #[serde(default)]
    pub is_hidden: bool,
}

impl Stack {
    pub fn new(
        id: StackId,
        organization_id: OrganizationId,
        project_id: ProjectId,
        signature_hash: impl Into<String>,
    ) -> Self {
        Self {
            id,
            organization_id,
            project_id,
            signature_hash: signature_hash.into(),
            signature_info: BTreeMap::new(),
            title: None,
            total_occurrences: 0,
            first_occurrence: None,
            last_occurrence: None,
            date_fixed: None,
            is_regressed: false,
            is_hidden: false,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_signature(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.signature_info.insert(key.into(), value.into());
        self
    }

    /// Fold a batch of occurrences into the counters.
    ///
    /// `total += count`, `first = min(first, ..)`, `last = max(last, ..)`.
    /// Bounds arriving reversed are swapped.
    pub fn apply_occurrences(&mut self, first: DateTime<Utc>, last: DateTime<Utc>, count: u64) {
        let (first, last) = if first <= last { (first, last) } else { (last, first) };
        self.total_occurrences = self.total_occurrences.saturating_add(count);
        self.first_occurrence = Some(match self.first_occurrence {
            Some(current) => current.min(first),
            None => first,
        });
        self.last_occurrence = Some(match self.last_occurrence {
            Some(current) => current.max(last),
            None => last,
        });
    }

    /// A fixed stack saw a new occurrence.
    pub fn mark_regressed(&mut self) {
        self.is_regressed = true;
        self.date_fixed = None;
    }

    pub fn mark_fixed(&mut self, at: DateTime<Utc>) {
        self.date_fixed = Some(at);
        self.is_regressed = false;
    }

    pub fn is_fixed(&self) -> bool {
        self.date_fixed.is_some()
    }

    /// Key of the signature-hash cache entry for this stack.
    pub fn cache_key(&self) -> String {
        signature_cache_key(self.project_id, &self.signature_hash)
    }
}

pub fn signature_cache_key(project_id: ProjectId, signature_hash: &str) -> String {
    format!("stack:{project_id}:{signature_hash}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn stack() -> Stack {
        Stack::new(
            StackId::generate(),
            OrganizationId::generate(),
            ProjectId::generate(),
            "abc123",
        )
    }

    #[test]
    fn first_increment_adopts_bounds() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let mut s = stack();
        s.apply_occurrences(now, now, 1);

        assert_eq!(s.total_occurrences, 1);
        assert_eq!(s.first_occurrence, Some(now));
        assert_eq!(s.last_occurrence, Some(now));
    }

    #[test]
    fn increments_widen_bounds() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let mut s = stack();
        s.apply_occurrences(now, now, 1);
        s.apply_occurrences(now - Duration::days(1), now - Duration::days(1), 1);
        s.apply_occurrences(now + Duration::days(1), now + Duration::days(1), 1);

        assert_eq!(s.total_occurrences, 3);
        assert_eq!(s.first_occurrence, Some(now - Duration::days(1)));
        assert_eq!(s.last_occurrence, Some(now + Duration::days(1)));
    }

    #[test]
    fn regression_clears_date_fixed() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let mut s = stack();
        s.mark_fixed(now);
        assert!(s.is_fixed());
        assert!(!s.is_regressed);

        s.mark_regressed();
        assert!(!s.is_fixed());
        assert!(s.is_regressed);
    }

    #[test]
    fn cache_key_is_project_scoped() {
        let s = stack();
        assert!(s.cache_key().ends_with(":abc123"));
        assert!(s.cache_key().contains(&s.project_id.to_string()));
    }
}

//! Domain identifiers (strongly-typed IDs).
//!
//! # ULID ベースの ID + Phantom type
//! すべての ID は ULID (Universally Unique Lexicographically Sortable Identifier) です。
//! `Id<T>` の `T` は実行時には使わないマーカー型で、`EventId` と `StackId` を
//! コンパイル時に区別します。
//!
//! ## 並び順
//! ULID の文字列表現（Crockford base32, 26 文字）は数値順と辞書順が一致します。
//! したがって `Ord for Id<T>` はそのまま「id の辞書順」であり、
//! イベントの順序キーの tie-break に使えます。

use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;
use ulid::Ulid;

/// IdMarker は各 ID 型のマーカー trait
///
/// Display で使うプレフィックス（"evt-", "stack-" など）を提供します。
pub trait IdMarker: Send + Sync + 'static {
    fn prefix() -> &'static str;
}

/// ジェネリック ID 型
#[repr(transparent)]
#[derive(Serialize, Deserialize)]
#[serde(transparent)]
pub struct Id<T: IdMarker> {
    ulid: Ulid,
    #[serde(skip)]
    _marker: PhantomData<T>,
}

impl<T: IdMarker> Id<T> {
    pub fn from_ulid(ulid: Ulid) -> Self {
        Self {
            ulid,
            _marker: PhantomData,
        }
    }

    /// Fresh id stamped with the current wall clock.
    pub fn generate() -> Self {
        Self::from_ulid(Ulid::new())
    }

    pub fn as_ulid(&self) -> Ulid {
        self.ulid
    }
}

// derive は `T: Clone` などを要求してしまうので手で実装する
impl<T: IdMarker> Clone for Id<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T: IdMarker> Copy for Id<T> {}

impl<T: IdMarker> PartialEq for Id<T> {
    fn eq(&self, other: &Self) -> bool {
        self.ulid == other.ulid
    }
}

impl<T: IdMarker> Eq for Id<T> {}

impl<T: IdMarker> std::hash::Hash for Id<T> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.ulid.hash(state);
    }
}

impl<T: IdMarker> PartialOrd for Id<T> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl<T: IdMarker> Ord for Id<T> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.ulid.cmp(&other.ulid)
    }
}

impl<T: IdMarker> From<Ulid> for Id<T> {
    fn from(ulid: Ulid) -> Self {
        Self::from_ulid(ulid)
    }
}

impl<T: IdMarker> fmt::Debug for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", T::prefix(), self.ulid)
    }
}

impl<T: IdMarker> fmt::Display for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", T::prefix(), self.ulid)
    }
}

// ========================================
// マーカー型の定義
// ========================================

macro_rules! id_marker {
    ($marker:ident, $prefix:literal) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum $marker {}

        impl IdMarker for $marker {
            fn prefix() -> &'static str {
                $prefix
            }
        }
    };
}

id_marker!(Organization, "org-");
id_marker!(Project, "proj-");
id_marker!(Stack, "stack-");
id_marker!(Event, "evt-");
id_marker!(User, "user-");

/// Identifier of an Organization (billing / membership unit).
pub type OrganizationId = Id<Organization>;

/// Identifier of a Project (summary scheduling unit).
pub type ProjectId = Id<Project>;

/// Identifier of a Stack (group of events sharing a signature).
pub type StackId = Id<Stack>;

/// Identifier of a single stored Event.
pub type EventId = Id<Event>;

/// Identifier of a User (summary recipient).
pub type UserId = Id<User>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_distinct_types() {
        let ulid = Ulid::new();
        let event = EventId::from_ulid(ulid);
        let stack = StackId::from_ulid(ulid);

        assert_eq!(event.as_ulid(), stack.as_ulid());
        assert!(event.to_string().starts_with("evt-"));
        assert!(stack.to_string().starts_with("stack-"));
        // let _: EventId = stack; // <- does not compile
    }

    #[test]
    fn ordering_matches_lexical_order_of_rendered_ulid() {
        let ids: Vec<EventId> = (0..32u128)
            .map(|n| EventId::from_ulid(Ulid::from_parts(1_700_000_000_000, n * 7919)))
            .collect();

        let mut by_ord = ids.clone();
        by_ord.sort();

        let mut by_text = ids.clone();
        by_text.sort_by_key(|id| id.as_ulid().to_string());

        assert_eq!(by_ord, by_text);
    }

    #[test]
    fn ids_serialize_as_plain_ulid_string() {
        let ulid = Ulid::new();
        let id = ProjectId::from_ulid(ulid);

        let serialized = serde_json::to_string(&id).unwrap();
        assert_eq!(serialized, format!("\"{ulid}\""));

        let back: ProjectId = serde_json::from_str(&serialized).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn phantom_data_does_not_consume_memory() {
        use std::mem::size_of;
        assert_eq!(size_of::<EventId>(), size_of::<Ulid>());
        assert_eq!(size_of::<UserId>(), 16);
    }
}

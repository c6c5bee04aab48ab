//! IdGenerator port - ID 生成の抽象化
//!
//! # 実装
//! - **UlidGenerator**: Clock ベースの ULID 生成器

use crate::domain::ids::{EventId, Id, IdMarker, StackId};
use crate::ports::Clock;
use ulid::Ulid;

/// IdGenerator は分散システムで使える ID を生成
///
/// # ULID の特性
/// - 時刻でソート可能（順序キーの tie-break と整合する）
/// - 分散環境で生成可能（調整不要）
pub trait IdGenerator: Send + Sync {
    fn generate_event_id(&self) -> EventId;

    fn generate_stack_id(&self) -> StackId;
}

/// UlidGenerator は Clock の時刻を timestamp 部分に使う
///
/// テストでは FixedClock を渡すことで timestamp 部分を固定できます。
pub struct UlidGenerator<C> {
    clock: C,
}

impl<C: Clock> UlidGenerator<C> {
    pub fn new(clock: C) -> Self {
        Self { clock }
    }

    fn next<T: IdMarker>(&self) -> Id<T> {
        let timestamp_ms = self.clock.now().timestamp_millis().max(0) as u64;
        Id::from_ulid(Ulid::from_parts(timestamp_ms, rand::random()))
    }
}

impl<C: Clock> IdGenerator for UlidGenerator<C> {
    fn generate_event_id(&self) -> EventId {
        self.next()
    }

    fn generate_stack_id(&self) -> StackId {
        self.next()
    }
}

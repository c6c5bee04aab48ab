//! Ports - 抽象化レイヤー
//!
//! このモジュールは Hexagonal Architecture の「ポート」を定義します。
//! 各 trait は外部システム（検索ストア、メール、分散ロック、キュー、
//! 課金プラン）へのインターフェースを提供し、実装の詳細を隠蔽します。
//!
//! # 設計原則
//! - ストアは結果整合（直後の読み取りに新しい書き込みが見えなくてもよい）
//! - カウンタ・claim の原子性はストア側で保証する
//! - 配送・ロック・キューの失敗はこのコアではリトライしない

pub mod clock;
pub mod event_repository;
pub mod id_generator;
pub mod lock;
pub mod mailer;
pub mod message_queue;
pub mod project_repository;
pub mod stack_repository;

// 主要な trait を再エクスポート
pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::event_repository::{EventRepository, FindResults, Paging};
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::lock::{LockHandle, LockProvider};
pub use self::mailer::Mailer;
pub use self::message_queue::{MessageQueue, QueueCounts, QueueEntry};
pub use self::project_repository::{
    BillingPlans, OrganizationRepository, ProjectRepository, UserRepository,
};
pub use self::stack_repository::{StackCache, StackRepository};

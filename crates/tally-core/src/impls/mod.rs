//! Impls - 実装（開発用・テスト用）
//!
//! このモジュールには ports のインメモリ実装を含めます。
//!
//! # 含まれる実装
//! - **InMemoryEventRepository**: refresh 遅延とページング一括更新を再現するイベントストア
//! - **InMemoryStackRepository / InMemoryStackCache**: stack カウンタとキャッシュ
//! - **InMemoryProjectRepository**: compare-and-swap で claim する project ストア
//! - **InMemoryLockProvider**: プロセス内の名前付きロック
//! - **RecordingMailer**: 送信を記録するだけの Mailer
//! - **InMemoryBackend**: 上記をまとめて AppBuilder に配線する
//!
//! メッセージキューは [`crate::queue`] にあります。
//!
//! # 本番用実装
//! 検索 index・分散ロック・SMTP への実装は別クレートに配置します。

pub mod backend;
pub mod inmem_events;
pub mod inmem_lock;
pub mod inmem_projects;
pub mod inmem_stacks;
pub mod recording_mailer;

// 主要な型を再エクスポート
pub use self::backend::InMemoryBackend;
pub use self::inmem_events::{InMemoryEventRepository, RefreshPolicy};
pub use self::inmem_lock::InMemoryLockProvider;
pub use self::inmem_projects::{
    InMemoryOrganizationRepository, InMemoryProjectRepository, InMemoryUserRepository,
    StaticBillingPlans,
};
pub use self::inmem_stacks::{InMemoryStackCache, InMemoryStackRepository};
pub use self::recording_mailer::{RecordingMailer, SentSummary};

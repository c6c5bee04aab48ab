//! App - アプリケーション層
//!
//! このモジュールは、ports を組み合わせてジョブとサービスを実装します。
//!
//! # 主要コンポーネント
//! - **AppBuilder**: アプリケーションの構築とワイヤリング
//! - **StackService**: stack 集計と signature キャッシュの整合
//! - **EventStats**: ウィンドウ内のイベント集計
//! - **DailySummaryJob**: claim → 集計 → 配信のバッチジョブ
//! - **UserDescriptionJob**: ユーザー記述のマージ（キュー consumer）
//! - **ConsumerGroup**: キューを並行に消費する consumer 群

pub mod builder;
pub mod consumer;
pub mod daily_summary;
pub mod event_stats;
pub mod stack_service;
pub mod user_descriptions;

// 主要な型を再エクスポート
pub use self::builder::{App, AppBuilder, BuildError};
pub use self::consumer::{ConsumerGroup, QueueJob};
pub use self::daily_summary::{
    DAILY_SUMMARY_LOCK, DailySummaryJob, DeliveryFailure, ProjectFailure, SummaryRunReport,
};
pub use self::event_stats::EventStats;
pub use self::stack_service::StackService;
pub use self::user_descriptions::UserDescriptionJob;

//! tally-core
//!
//! Aggregation and delivery core of an error-tracking service.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, event, stack, project, window, summary, outcome, errors）
//! - **ports**: 抽象化レイヤー（EventRepository, StackRepository, ProjectRepository, Mailer, LockProvider, MessageQueue など）
//! - **app**: アプリケーションロジック（builder, stack_service, daily_summary, user_descriptions, consumer）
//! - **impls**: 実装（InMemoryEventRepository など開発用）
//! - **queue**: インメモリのメッセージキュー（retry / dead-letter）
//! - **config**: ジョブ設定（環境変数から読み込み）

pub mod app;
pub mod config;
pub mod domain;
pub mod impls;
pub mod ports;
pub mod queue;

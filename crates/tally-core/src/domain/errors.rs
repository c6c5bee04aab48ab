//! Errors - エラー型と分類
//!
//! 「想定内のスキップ」（機能無効・ロック取得失敗・古いウィンドウ・宛先なし）は
//! エラーではなく [`super::JobResult`] として返します。ここに来るのは
//! 作業単位を失敗させるものだけです。

use thiserror::Error;

/// ErrorKind は運用上の分類
///
/// - NotFound: 参照先がまだ index されていない／削除済み（再配送で解消しうる）
/// - Infrastructure: ストア・ロック・キューの障害
/// - Permanent: 恒久的なエラー（リトライ無意味）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Infrastructure,
    Permanent,
}

#[derive(Debug, Error)]
pub enum TallyError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("infrastructure: {0}")]
    Infrastructure(String),

    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
}

impl TallyError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn infrastructure(msg: impl Into<String>) -> Self {
        Self::Infrastructure(msg.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Infrastructure(_) => ErrorKind::Infrastructure,
            Self::Json(_) => ErrorKind::Permanent,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }
}

/// Delivery failure reported by a [`crate::ports::Mailer`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("mail delivery to {address} failed: {reason}")]
pub struct MailError {
    pub address: String,
    pub reason: String,
}

impl MailError {
    pub fn new(address: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            reason: reason.into(),
        }
    }
}

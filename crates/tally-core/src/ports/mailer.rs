//! Mailer port - メール配送チャネル
//!
//! テンプレート描画と SMTP は外部の責務です。このコアは再送しません。

use async_trait::async_trait;

use crate::domain::{DailySummary, MailError};

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_daily_summary(
        &self,
        email_address: &str,
        summary: &DailySummary,
    ) -> Result<(), MailError>;
}

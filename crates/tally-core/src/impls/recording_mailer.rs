//! RecordingMailer - 送信内容を記録するだけの Mailer
//!
//! テストと CLI のデモ用です。指定したアドレスへの送信は失敗させられます。

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::domain::{DailySummary, MailError};
use crate::ports::Mailer;

#[derive(Debug, Clone, PartialEq)]
pub struct SentSummary {
    pub email_address: String,
    pub summary: DailySummary,
}

#[derive(Default)]
pub struct RecordingMailer {
    sent: Arc<Mutex<Vec<SentSummary>>>,
    failing: HashSet<String>,
}

impl RecordingMailer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sends to `address` report a failure instead of being recorded.
    pub fn failing_for(mut self, address: impl Into<String>) -> Self {
        self.failing.insert(address.into());
        self
    }

    pub async fn sent(&self) -> Vec<SentSummary> {
        self.sent.lock().await.clone()
    }

    pub async fn sent_count(&self) -> usize {
        self.sent.lock().await.len()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send_daily_summary(
        &self,
        email_address: &str,
        summary: &DailySummary,
    ) -> Result<(), MailError> {
        if self.failing.contains(email_address) {
            return Err(MailError::new(email_address, "mailbox unavailable"));
        }
        self.sent.lock().await.push(SentSummary {
            email_address: email_address.to_string(),
            summary: summary.clone(),
        });
        Ok(())
    }
}

//! InMemoryLockProvider - プロセス内の名前付きロック
//!
//! # 実装詳細
//! - 名前ごとに `Arc<tokio::sync::Mutex<()>>` を持つ
//! - 取得は `lock_owned()` を `wait` でタイムアウトさせる
//! - 返す [`LockHandle`] が `OwnedMutexGuard` を保持し、drop で解放

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use crate::domain::TallyError;
use crate::ports::{LockHandle, LockProvider};

#[derive(Default)]
pub struct InMemoryLockProvider {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl InMemoryLockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    async fn lock_for(&self, name: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        Arc::clone(locks.entry(name.to_string()).or_default())
    }
}

#[async_trait]
impl LockProvider for InMemoryLockProvider {
    async fn acquire(&self, name: &str, wait: Duration) -> Result<Option<LockHandle>, TallyError> {
        let lock = self.lock_for(name).await;
        match tokio::time::timeout(wait, lock.lock_owned()).await {
            Ok(guard) => Ok(Some(LockHandle::new(name, guard))),
            Err(_) => {
                debug!(lock = name, wait_ms = wait.as_millis() as u64, "lock busy");
                Ok(None)
            }
        }
    }
}

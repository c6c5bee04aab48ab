//! LockProvider port - 分散ミューテックス
//!
//! 名前付きロックを取得し、スコープを抜けたら（drop で）解放します。
//! 取得できなかった場合は `Ok(None)` であり、エラーではありません。

use std::any::Any;
use std::fmt;
use std::time::Duration;

use async_trait::async_trait;

use crate::domain::TallyError;

/// Held lock. Dropping it releases the lock.
pub struct LockHandle {
    name: String,
    _release: Box<dyn Any + Send + Sync>,
}

impl LockHandle {
    /// `release` is whatever the provider needs dropped to free the lock.
    pub fn new(name: impl Into<String>, release: impl Send + Sync + 'static) -> Self {
        Self {
            name: name.into(),
            _release: Box::new(release),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for LockHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockHandle").field("name", &self.name).finish()
    }
}

#[async_trait]
pub trait LockProvider: Send + Sync {
    /// Waits up to `wait` for the lock.
    ///
    /// `Ok(None)` means someone else holds it.
    async fn acquire(&self, name: &str, wait: Duration) -> Result<Option<LockHandle>, TallyError>;
}

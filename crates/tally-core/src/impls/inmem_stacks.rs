//! InMemoryStackRepository / InMemoryStackCache - 開発用・テスト用の stack ストア
//!
//! # 実装詳細
//! - カウンタ更新は書き込みロックの内側で読み取り→min/max/sum→書き戻しを行う
//!   （本番ストアの scripted update に相当）
//! - cache は signature key → Stack の単純な HashMap

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::domain::{
    OrganizationId, ProjectId, Stack, StackId, SummaryWindow, TallyError,
};
use crate::ports::{StackCache, StackRepository};

#[derive(Default)]
pub struct InMemoryStackRepository {
    stacks: Arc<RwLock<HashMap<StackId, Stack>>>,
}

impl InMemoryStackRepository {
    pub fn new() -> Self {
        Self::default()
    }

    async fn update(
        &self,
        stack_id: StackId,
        apply: impl FnOnce(&mut Stack) + Send,
    ) -> Result<Stack, TallyError> {
        let mut stacks = self.stacks.write().await;
        let stack = stacks
            .get_mut(&stack_id)
            .ok_or_else(|| TallyError::not_found("stack", stack_id))?;
        apply(stack);
        Ok(stack.clone())
    }

    async fn new_in_window(&self, project_id: ProjectId, window: SummaryWindow) -> Vec<Stack> {
        let stacks = self.stacks.read().await;
        stacks
            .values()
            .filter(|s| s.project_id == project_id)
            .filter(|s| s.first_occurrence.is_some_and(|first| window.contains(first)))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl StackRepository for InMemoryStackRepository {
    async fn add(&self, stack: Stack) -> Result<Stack, TallyError> {
        self.stacks.write().await.insert(stack.id, stack.clone());
        Ok(stack)
    }

    async fn get_by_id(&self, id: StackId) -> Result<Option<Stack>, TallyError> {
        Ok(self.stacks.read().await.get(&id).cloned())
    }

    async fn get_by_signature_hash(
        &self,
        project_id: ProjectId,
        signature_hash: &str,
    ) -> Result<Option<Stack>, TallyError> {
        let stacks = self.stacks.read().await;
        Ok(stacks
            .values()
            .find(|s| s.project_id == project_id && s.signature_hash == signature_hash)
            .cloned())
    }

    async fn increment_event_counter(
        &self,
        organization_id: OrganizationId,
        project_id: ProjectId,
        stack_id: StackId,
        min_occurrence: DateTime<Utc>,
        max_occurrence: DateTime<Utc>,
        count: u64,
    ) -> Result<Stack, TallyError> {
        let mut stacks = self.stacks.write().await;
        let stack = stacks
            .get_mut(&stack_id)
            .filter(|s| s.organization_id == organization_id && s.project_id == project_id)
            .ok_or_else(|| TallyError::not_found("stack", stack_id))?;
        stack.apply_occurrences(min_occurrence, max_occurrence, count);
        Ok(stack.clone())
    }

    async fn mark_as_regressed(&self, stack_id: StackId) -> Result<Stack, TallyError> {
        self.update(stack_id, Stack::mark_regressed).await
    }

    async fn mark_as_fixed(
        &self,
        stack_id: StackId,
        at: DateTime<Utc>,
    ) -> Result<Stack, TallyError> {
        self.update(stack_id, |stack| stack.mark_fixed(at)).await
    }

    async fn get_new(
        &self,
        project_id: ProjectId,
        window: SummaryWindow,
        limit: usize,
    ) -> Result<Vec<Stack>, TallyError> {
        let mut stacks = self.new_in_window(project_id, window).await;
        stacks.sort_by(|a, b| {
            b.first_occurrence
                .cmp(&a.first_occurrence)
                .then_with(|| b.id.cmp(&a.id))
        });
        stacks.truncate(limit);
        Ok(stacks)
    }

    async fn count_new(
        &self,
        project_id: ProjectId,
        window: SummaryWindow,
    ) -> Result<u64, TallyError> {
        Ok(self.new_in_window(project_id, window).await.len() as u64)
    }
}

#[derive(Default)]
pub struct InMemoryStackCache {
    entries: Arc<RwLock<HashMap<String, Stack>>>,
}

impl InMemoryStackCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl StackCache for InMemoryStackCache {
    async fn get(&self, key: &str) -> Option<Stack> {
        self.entries.read().await.get(key).cloned()
    }

    async fn set(&self, key: &str, stack: Stack) {
        self.entries.write().await.insert(key.to_string(), stack);
    }

    async fn remove(&self, key: &str) {
        self.entries.write().await.remove(key);
    }
}

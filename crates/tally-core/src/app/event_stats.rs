//! EventStats - ウィンドウ内のイベント集計（total / unique / new）

use std::collections::HashSet;
use std::sync::Arc;

use crate::domain::{ProjectId, SummaryWindow, TallyError, WindowStats};
use crate::ports::{EventRepository, Paging, StackRepository};

const STATS_PAGE_SIZE: usize = 500;

pub struct EventStats {
    events: Arc<dyn EventRepository>,
    stacks: Arc<dyn StackRepository>,
}

impl EventStats {
    pub fn new(events: Arc<dyn EventRepository>, stacks: Arc<dyn StackRepository>) -> Self {
        Self { events, stacks }
    }

    /// Walks every page of the window; `new` counts stacks first seen inside it.
    pub async fn window_stats(
        &self,
        project_id: ProjectId,
        window: SummaryWindow,
    ) -> Result<WindowStats, TallyError> {
        let mut paging = Paging::limit(STATS_PAGE_SIZE);
        let mut stacks = HashSet::new();

        let total = loop {
            let page = self
                .events
                .find_by_project_in_window(project_id, window, paging)
                .await?;
            stacks.extend(page.documents.iter().map(|ev| ev.stack_id));
            if page.documents.is_empty() || !page.has_more(&paging) {
                break page.total;
            }
            paging.page += 1;
        };

        let new = if total == 0 {
            0
        } else {
            self.stacks.count_new(project_id, window).await?
        };

        Ok(WindowStats {
            total,
            unique: stacks.len() as u64,
            new,
        })
    }
}

use chrono::{DateTime, Utc};
use hatch_core::{SessionRecord, SessionState, SessionStatus, ViewScope};
use hatch_probe::RepositoryInfo;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRow {
    pub record: SessionRecord,
    pub status: SessionStatus,
}

impl SessionRow {
    pub fn new(record: SessionRecord, status: SessionStatus) -> Self {
        Self { record, status }
    }

    pub fn is_stale(&self) -> bool {
        self.status.state == SessionState::Stale
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableView {
    Repository,
    Global,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum View {
    Repository,
    Global,
    Log { previous: TableView },
}

impl View {
    pub fn table(self) -> TableView {
        match self {
            View::Repository => TableView::Repository,
            View::Global => TableView::Global,
            View::Log { previous } => previous,
        }
    }

    pub fn is_log(self) -> bool {
        matches!(self, View::Log { .. })
    }
}

impl From<TableView> for View {
    fn from(table: TableView) -> Self {
        match table {
            TableView::Repository => View::Repository,
            TableView::Global => View::Global,
        }
    }
}

/// Resolves the table view to a scope. Without a repository context only the
/// global scope exists.
pub fn scope_for(table: TableView, repository: Option<&RepositoryInfo>) -> ViewScope {
    match (table, repository) {
        (TableView::Repository, Some(repo)) => ViewScope::Repository {
            root: repo.root.clone(),
        },
        _ => ViewScope::Global,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AutoRefresh {
    Enabled,
    DisabledByError,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogView {
    pub session: SessionRecord,
    pub content: String,
    pub scroll_offset: usize,
    /// Nothing has been received yet.
    pub loading: bool,
    pub refreshing: bool,
    /// A refresh was requested while the gate was busy.
    pub pending_refresh: bool,
    pub error_message: Option<String>,
    pub max_size_bytes: usize,
    pub auto_refresh: AutoRefresh,
    pub last_updated: Option<DateTime<Utc>>,
    pub generation: u64,
}

impl LogView {
    pub fn new(session: SessionRecord, generation: u64, max_size_bytes: usize) -> Self {
        Self {
            session,
            content: String::new(),
            scroll_offset: 0,
            loading: true,
            refreshing: false,
            pending_refresh: false,
            error_message: None,
            max_size_bytes,
            auto_refresh: AutoRefresh::Enabled,
            last_updated: None,
            generation,
        }
    }

    pub fn line_count(&self) -> usize {
        self.content.lines().count()
    }

    pub fn max_scroll(&self) -> usize {
        self.line_count().saturating_sub(1)
    }

    pub fn scroll_by(&mut self, delta: isize) {
        let next = if delta.is_negative() {
            self.scroll_offset.saturating_sub(delta.unsigned_abs())
        } else {
            self.scroll_offset.saturating_add(delta.unsigned_abs())
        };
        self.scroll_offset = next.min(self.max_scroll());
    }

    pub fn scroll_to_top(&mut self) {
        self.scroll_offset = 0;
    }

    pub fn scroll_to_bottom(&mut self, viewport_height: usize) {
        self.scroll_offset = self.line_count().saturating_sub(viewport_height.max(1));
    }

    pub fn set_content(&mut self, content: String) {
        self.content = content;
        self.scroll_offset = self.scroll_offset.min(self.max_scroll());
    }

    pub fn visible_lines(&self, height: usize) -> Vec<&str> {
        self.content
            .lines()
            .skip(self.scroll_offset)
            .take(height)
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingConfirmation {
    Cleanup(Vec<SessionRecord>),
    Stop(SessionRecord),
}

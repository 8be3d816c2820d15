use chrono::Utc;
use crossterm::event::KeyEvent;
use hatch_core::{CleanupReport, HatchConfig, SessionId, SessionRecord, ViewScope};
use hatch_probe::RepositoryInfo;
use std::time::Duration;
use tracing::debug;

use crate::action::{map_key_to_command, KeyContext, UiCommand};
use crate::gate::RefreshGate;
use crate::message::{AppMessage, Effect, LogFailure};
use crate::model::{scope_for, AutoRefresh, LogView, PendingConfirmation, SessionRow, TableView, View};

const DEFAULT_VIEWPORT_HEIGHT: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppSettings {
    pub status_tracking: bool,
    pub log_refresh_interval: Duration,
    pub log_max_output_bytes: usize,
}

impl AppSettings {
    pub fn from_config(config: &HatchConfig) -> Self {
        Self {
            status_tracking: config.status_refresh_interval().is_some(),
            log_refresh_interval: config.log_refresh_interval(),
            log_max_output_bytes: config.log_max_output_bytes,
        }
    }
}

impl Default for AppSettings {
    fn default() -> Self {
        Self::from_config(&HatchConfig::default())
    }
}

/// Dashboard state machine.
///
/// Only `handle_key_event` and `apply_message` change state, and both return
/// the work to run elsewhere as `Effect`s. The refresh gate is the one piece
/// of state shared with other threads.
#[derive(Debug)]
pub struct HatchApp {
    pub view: View,
    pub repository: Option<RepositoryInfo>,
    pub rows: Vec<SessionRow>,
    pub selected: usize,
    pub log: Option<LogView>,
    pub pending: Option<PendingConfirmation>,
    pub status_line: String,
    pub loading: bool,
    pub should_quit: bool,
    pub viewport_height: usize,
    settings: AppSettings,
    gate: RefreshGate,
    latest_request: u64,
    in_flight_request: Option<u64>,
    next_generation: u64,
    next_candidate_request: u64,
    candidate_request: Option<u64>,
}

impl HatchApp {
    pub fn new(
        settings: AppSettings,
        repository: Option<RepositoryInfo>,
        gate: RefreshGate,
        start_global: bool,
    ) -> Self {
        let view = if repository.is_some() && !start_global {
            View::Repository
        } else {
            View::Global
        };
        Self {
            view,
            repository,
            rows: Vec::new(),
            selected: 0,
            log: None,
            pending: None,
            status_line: String::new(),
            loading: false,
            should_quit: false,
            viewport_height: DEFAULT_VIEWPORT_HEIGHT,
            settings,
            gate,
            latest_request: 0,
            in_flight_request: None,
            next_generation: 0,
            next_candidate_request: 0,
            candidate_request: None,
        }
    }

    pub fn settings(&self) -> &AppSettings {
        &self.settings
    }

    pub fn gate(&self) -> RefreshGate {
        self.gate.clone()
    }

    pub fn scope(&self) -> ViewScope {
        scope_for(self.view.table(), self.repository.as_ref())
    }

    pub fn key_context(&self) -> KeyContext {
        if self.pending.is_some() {
            KeyContext::Dialog
        } else if self.view.is_log() {
            KeyContext::Log
        } else {
            KeyContext::Table
        }
    }

    pub fn selected_row(&self) -> Option<&SessionRow> {
        self.rows.get(self.selected)
    }

    /// Effects to run once before the first frame.
    pub fn start(&mut self) -> Vec<Effect> {
        vec![self.request_refresh()]
    }

    pub fn handle_key_event(&mut self, key: KeyEvent) -> Vec<Effect> {
        let context = self.key_context();
        let Some(command) = map_key_to_command(key, context) else {
            return Vec::new();
        };

        match context {
            KeyContext::Dialog => self.handle_dialog_command(command),
            KeyContext::Log => self.handle_log_command(command),
            KeyContext::Table => self.handle_table_command(command),
        }
    }

    pub fn apply_message(&mut self, message: AppMessage) -> Vec<Effect> {
        match message {
            AppMessage::SessionsLoaded { request_id, result } => {
                self.apply_sessions_loaded(request_id, result);
                Vec::new()
            }
            AppMessage::StatusTick => {
                if !self.settings.status_tracking || self.in_flight_request.is_some() {
                    return Vec::new();
                }
                vec![self.request_refresh()]
            }
            AppMessage::LogTick {
                session_id,
                generation,
            } => self.apply_log_tick(&session_id, generation),
            AppMessage::LogResult {
                session_id,
                generation,
                result,
            } => self.apply_log_result(&session_id, generation, result),
            AppMessage::CandidatesIdentified { request_id, result } => {
                self.apply_candidates_identified(request_id, result);
                Vec::new()
            }
            AppMessage::CleanupFinished { report } => {
                self.status_line = cleanup_status(&report);
                vec![self.request_refresh()]
            }
            AppMessage::StopFinished { session_id, report } => {
                self.status_line = stop_status(&session_id, &report);
                vec![self.request_refresh()]
            }
            AppMessage::AttachFinished { session_id, result } => {
                self.status_line = match result {
                    Ok(()) => format!("detached from {session_id}"),
                    Err(err) => format!("attach to {session_id} failed: {err}"),
                };
                vec![self.request_refresh()]
            }
        }
    }

    fn request_refresh(&mut self) -> Effect {
        self.latest_request += 1;
        self.in_flight_request = Some(self.latest_request);
        self.loading = true;
        Effect::LoadSessions {
            request_id: self.latest_request,
            scope: self.scope(),
        }
    }

    fn handle_table_command(&mut self, command: UiCommand) -> Vec<Effect> {
        match command {
            UiCommand::MoveDown => {
                if !self.rows.is_empty() {
                    self.selected = (self.selected + 1).min(self.rows.len() - 1);
                }
                Vec::new()
            }
            UiCommand::MoveUp => {
                self.selected = self.selected.saturating_sub(1);
                Vec::new()
            }
            UiCommand::ToggleScope => self.toggle_scope(),
            UiCommand::OpenLog => self.enter_log_view(),
            UiCommand::RequestCleanup => {
                self.next_candidate_request += 1;
                let request_id = self.next_candidate_request;
                self.candidate_request = Some(request_id);
                self.status_line = format!("looking for stale sessions in {} view", self.scope().label());
                vec![Effect::IdentifyStale {
                    request_id,
                    scope: self.scope(),
                }]
            }
            UiCommand::RequestStop => {
                match self.selected_row() {
                    Some(row) => {
                        let record = row.record.clone();
                        self.status_line = format!("confirm stop of {}", record.namespaced_id);
                        self.pending = Some(PendingConfirmation::Stop(record));
                    }
                    None => self.status_line = "no session selected".to_string(),
                }
                Vec::new()
            }
            UiCommand::Attach => match self.selected_row() {
                Some(row) => {
                    let record = row.record.clone();
                    self.status_line = format!("attaching to {}", record.multiplexer_session);
                    vec![Effect::Attach { record }]
                }
                None => {
                    self.status_line = "no session selected".to_string();
                    Vec::new()
                }
            },
            UiCommand::Refresh => {
                self.status_line = "refreshing sessions".to_string();
                vec![self.request_refresh()]
            }
            UiCommand::Quit => {
                self.should_quit = true;
                Vec::new()
            }
            UiCommand::PageDown
            | UiCommand::PageUp
            | UiCommand::Home
            | UiCommand::End
            | UiCommand::Back
            | UiCommand::Confirm
            | UiCommand::Cancel => Vec::new(),
        }
    }

    fn handle_dialog_command(&mut self, command: UiCommand) -> Vec<Effect> {
        match command {
            UiCommand::Confirm => match self.pending.take() {
                Some(PendingConfirmation::Cleanup(candidates)) => {
                    self.status_line = format!("cleaning up {} session(s)", candidates.len());
                    vec![Effect::RunCleanup { candidates }]
                }
                Some(PendingConfirmation::Stop(record)) => {
                    self.status_line = format!("stopping {}", record.namespaced_id);
                    vec![Effect::StopSession { record }]
                }
                None => Vec::new(),
            },
            UiCommand::Cancel => {
                self.pending = None;
                self.status_line = "cancelled".to_string();
                Vec::new()
            }
            _ => Vec::new(),
        }
    }

    fn handle_log_command(&mut self, command: UiCommand) -> Vec<Effect> {
        let viewport = self.viewport_height.max(1);
        let Some(log) = self.log.as_mut() else {
            return Vec::new();
        };
        match command {
            UiCommand::Back => self.exit_log_view(),
            UiCommand::Refresh => self.manual_log_refresh(),
            UiCommand::Quit => {
                self.should_quit = true;
                vec![Effect::StopLogTimer]
            }
            UiCommand::MoveDown => {
                log.scroll_by(1);
                Vec::new()
            }
            UiCommand::MoveUp => {
                log.scroll_by(-1);
                Vec::new()
            }
            UiCommand::PageDown => {
                log.scroll_by(viewport as isize);
                Vec::new()
            }
            UiCommand::PageUp => {
                log.scroll_by(-(viewport as isize));
                Vec::new()
            }
            UiCommand::Home => {
                log.scroll_to_top();
                Vec::new()
            }
            UiCommand::End => {
                log.scroll_to_bottom(viewport);
                Vec::new()
            }
            _ => Vec::new(),
        }
    }

    fn toggle_scope(&mut self) -> Vec<Effect> {
        if self.repository.is_none() {
            self.status_line = "no repository context: only the global view is available".to_string();
            return Vec::new();
        }
        self.view = match self.view.table() {
            TableView::Repository => View::Global,
            TableView::Global => View::Repository,
        };
        self.selected = 0;
        self.rows.clear();
        self.candidate_request = None;
        self.status_line = format!("scope: {}", self.scope().label());
        vec![self.request_refresh()]
    }

    fn enter_log_view(&mut self) -> Vec<Effect> {
        let Some(row) = self.selected_row() else {
            self.status_line = "no session selected".to_string();
            return Vec::new();
        };
        let record = row.record.clone();

        self.next_generation += 1;
        let generation = self.next_generation;
        self.view = View::Log {
            previous: self.view.table(),
        };
        self.status_line = format!("logs: {}", record.namespaced_id);
        let session_id = record.namespaced_id.clone();
        self.log = Some(LogView::new(
            record,
            generation,
            self.settings.log_max_output_bytes,
        ));

        let mut effects = vec![Effect::StartLogTimer {
            session_id,
            generation,
            interval: self.settings.log_refresh_interval,
        }];
        effects.extend(self.begin_log_refresh());
        effects
    }

    fn exit_log_view(&mut self) -> Vec<Effect> {
        if let View::Log { previous } = self.view {
            self.view = previous.into();
        }
        self.log = None;
        self.status_line.clear();
        vec![Effect::StopLogTimer]
    }

    fn manual_log_refresh(&mut self) -> Vec<Effect> {
        let interval = self.settings.log_refresh_interval;
        let Some(log) = self.log.as_mut() else {
            return Vec::new();
        };
        let mut effects = Vec::new();
        if log.auto_refresh == AutoRefresh::DisabledByError {
            log.auto_refresh = AutoRefresh::Enabled;
            effects.push(Effect::StartLogTimer {
                session_id: log.session.namespaced_id.clone(),
                generation: log.generation,
                interval,
            });
        }
        log.error_message = None;

        match self.begin_log_refresh() {
            Some(effect) => effects.push(effect),
            None => self.status_line = "log refresh already running, queued".to_string(),
        }
        effects
    }

    /// Claims the gate for an immediate execution, or queues the request
    /// until the running one reports back.
    fn begin_log_refresh(&mut self) -> Option<Effect> {
        let log = self.log.as_mut()?;
        if !self.gate.try_begin() {
            log.pending_refresh = true;
            return None;
        }
        log.refreshing = true;
        log.pending_refresh = false;
        Some(Effect::RunLogScript {
            session: log.session.clone(),
            generation: log.generation,
        })
    }

    fn apply_sessions_loaded(&mut self, request_id: u64, result: Result<Vec<SessionRow>, String>) {
        if request_id != self.latest_request {
            debug!(request_id, latest = self.latest_request, "ignoring superseded session load");
            return;
        }
        self.in_flight_request = None;
        self.loading = false;
        match result {
            Ok(rows) => {
                self.rows = rows;
                self.selected = self.selected.min(self.rows.len().saturating_sub(1));
            }
            Err(err) => {
                self.status_line = format!("failed to load sessions: {err} (press r to retry)");
            }
        }
    }

    // Only the latest scan counts, and only while the table it was requested
    // from is still showing.
    fn apply_candidates_identified(
        &mut self,
        request_id: u64,
        result: Result<Vec<SessionRecord>, String>,
    ) {
        if self.candidate_request != Some(request_id) {
            debug!(request_id, "ignoring superseded stale scan");
            return;
        }
        self.candidate_request = None;
        if self.view.is_log() || self.pending.is_some() {
            debug!(request_id, "table no longer active, dropping stale scan");
            return;
        }
        match result {
            Ok(candidates) if candidates.is_empty() => {
                self.status_line = format!("no stale sessions in {} view", self.scope().label());
            }
            Ok(candidates) => {
                self.status_line =
                    format!("confirm cleanup of {} stale session(s)", candidates.len());
                self.pending = Some(PendingConfirmation::Cleanup(candidates));
            }
            Err(err) => {
                self.status_line =
                    format!("failed to look for stale sessions: {err} (press c to retry)");
            }
        }
    }

    fn is_current_log(&self, session_id: &SessionId, generation: u64) -> bool {
        self.view.is_log()
            && self
                .log
                .as_ref()
                .is_some_and(|log| log.generation == generation && &log.session.namespaced_id == session_id)
    }

    // The timer claimed the gate before sending the tick; a tick that does
    // not start an execution must hand it back.
    fn apply_log_tick(&mut self, session_id: &SessionId, generation: u64) -> Vec<Effect> {
        let current = self.is_current_log(session_id, generation);
        match self.log.as_mut() {
            Some(log) if current && log.auto_refresh == AutoRefresh::Enabled => {
                log.refreshing = true;
                log.pending_refresh = false;
                vec![Effect::RunLogScript {
                    session: log.session.clone(),
                    generation,
                }]
            }
            _ => {
                debug!(%session_id, generation, "dropping log tick for inactive view");
                self.gate.release();
                if self.log.as_ref().is_some_and(|log| log.pending_refresh) {
                    return self.begin_log_refresh().into_iter().collect();
                }
                Vec::new()
            }
        }
    }

    fn apply_log_result(
        &mut self,
        session_id: &SessionId,
        generation: u64,
        result: Result<String, LogFailure>,
    ) -> Vec<Effect> {
        let mut effects = Vec::new();
        if !self.is_current_log(session_id, generation) {
            debug!(%session_id, generation, "ignoring log result for inactive view");
            if self.log.as_ref().is_some_and(|log| log.pending_refresh) {
                effects.extend(self.begin_log_refresh());
            }
            return effects;
        }

        let Some(log) = self.log.as_mut() else {
            return effects;
        };
        log.refreshing = false;
        log.loading = false;
        log.last_updated = Some(Utc::now());
        match result {
            Ok(content) => {
                log.set_content(content);
                log.error_message = None;
            }
            Err(failure) => {
                if !failure.output.is_empty() {
                    log.set_content(failure.output);
                }
                if failure.terminal && log.auto_refresh == AutoRefresh::Enabled {
                    log.auto_refresh = AutoRefresh::DisabledByError;
                    log.pending_refresh = false;
                    log.error_message = Some(format!(
                        "{}; auto-refresh paused (press r to retry)",
                        failure.message
                    ));
                    effects.push(Effect::StopLogTimer);
                } else {
                    log.error_message = Some(format!("{} (press r to retry)", failure.message));
                }
            }
        }

        if log.pending_refresh {
            effects.extend(self.begin_log_refresh());
        }
        effects
    }
}

fn cleanup_status(report: &CleanupReport) -> String {
    let mut status = report.summary();
    if let Some(failure) = report.errors.first() {
        status.push_str(&format!(
            "; {}: {} (press c to retry)",
            failure.session_id, failure.message
        ));
    }
    status
}

fn stop_status(session_id: &SessionId, report: &CleanupReport) -> String {
    if let Some(failure) = report.errors.first() {
        return format!("failed to stop {session_id}: {} (press x to retry)", failure.message);
    }
    if let Some(skipped) = report.skipped.first() {
        return format!("{session_id} not stopped: {}", skipped.reason);
    }
    format!("stopped {session_id}")
}

#[cfg(test)]
mod tests {
    use super::{AppSettings, HatchApp};
    use crate::action::KeyContext;
    use crate::gate::RefreshGate;
    use crate::message::{AppMessage, Effect, LogFailure};
    use crate::model::{AutoRefresh, PendingConfirmation, SessionRow, View};
    use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
    use hatch_core::{
        CleanupFailure, CleanupReport, CleanupStage, SessionId, SessionRecord, SessionState,
        SessionStatus, ViewScope,
    };
    use hatch_probe::RepositoryInfo;
    use std::path::PathBuf;

    fn press(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn repo() -> RepositoryInfo {
        RepositoryInfo {
            root: PathBuf::from("/src/repo"),
            name: "repo".to_string(),
        }
    }

    fn mk_row(id: &str, state: SessionState) -> SessionRow {
        let record = SessionRecord {
            namespaced_id: SessionId::new(id),
            issue_number: 42,
            issue_title: format!("Issue for {id}"),
            repository_name: "repo".to_string(),
            repository_root: PathBuf::from("/src/repo"),
            branch: format!("issue/{id}"),
            worktree_path: PathBuf::from(format!("/tmp/wt/{id}")),
            multiplexer_session: id.to_string(),
            sandbox_name: None,
            last_activity: "2026-01-01T00:00:00Z".to_string(),
        };
        let status = SessionStatus {
            state,
            time_delta: "5m ago".to_string(),
            multiplexer_alive: state != SessionState::Stale,
            sandbox_alive: state == SessionState::Active,
        };
        SessionRow::new(record, status)
    }

    fn app_with_rows(rows: Vec<SessionRow>) -> HatchApp {
        let mut app = HatchApp::new(AppSettings::default(), Some(repo()), RefreshGate::new(), false);
        let effects = app.start();
        let Effect::LoadSessions { request_id, .. } = effects[0].clone() else {
            panic!("expected initial load, got {effects:?}");
        };
        app.apply_message(AppMessage::SessionsLoaded {
            request_id,
            result: Ok(rows),
        });
        app
    }

    fn open_log(app: &mut HatchApp) -> u64 {
        let effects = app.handle_key_event(press(KeyCode::Char('l')));
        assert!(matches!(effects.first(), Some(Effect::StartLogTimer { .. })));
        app.log.as_ref().expect("log view").generation
    }

    fn stale_records(app: &HatchApp) -> Vec<SessionRecord> {
        app.rows
            .iter()
            .filter(|row| row.is_stale())
            .map(|row| row.record.clone())
            .collect()
    }

    // Presses `c` and answers the scan the way the worker would.
    fn request_cleanup(app: &mut HatchApp, found: Vec<SessionRecord>) -> Vec<Effect> {
        let effects = app.handle_key_event(press(KeyCode::Char('c')));
        let [Effect::IdentifyStale { request_id, .. }] = effects.as_slice() else {
            panic!("expected stale scan, got {effects:?}");
        };
        app.apply_message(AppMessage::CandidatesIdentified {
            request_id: *request_id,
            result: Ok(found),
        })
    }

    fn failure(message: &str, terminal: bool) -> LogFailure {
        LogFailure {
            output: String::new(),
            message: message.to_string(),
            terminal,
            timed_out: false,
        }
    }

    #[test]
    fn initial_view_follows_repository_context() {
        let mut app = HatchApp::new(AppSettings::default(), Some(repo()), RefreshGate::new(), false);
        assert_eq!(app.view, View::Repository);
        assert_eq!(
            app.start(),
            vec![Effect::LoadSessions {
                request_id: 1,
                scope: ViewScope::Repository {
                    root: PathBuf::from("/src/repo")
                }
            }]
        );

        let app = HatchApp::new(AppSettings::default(), None, RefreshGate::new(), false);
        assert_eq!(app.view, View::Global);
        let app = HatchApp::new(AppSettings::default(), Some(repo()), RefreshGate::new(), true);
        assert_eq!(app.view, View::Global);
    }

    #[test]
    fn scope_toggle_resets_cursor_and_refreshes() {
        let mut app = app_with_rows(vec![
            mk_row("repo-1", SessionState::Active),
            mk_row("repo-2", SessionState::Active),
        ]);
        app.handle_key_event(press(KeyCode::Down));
        assert_eq!(app.selected, 1);

        let effects = app.handle_key_event(press(KeyCode::Char('g')));
        assert_eq!(app.view, View::Global);
        assert_eq!(app.selected, 0);
        assert!(matches!(
            effects.as_slice(),
            [Effect::LoadSessions { scope: ViewScope::Global, .. }]
        ));

        let mut no_repo = HatchApp::new(AppSettings::default(), None, RefreshGate::new(), false);
        assert!(no_repo.handle_key_event(press(KeyCode::Char('g'))).is_empty());
        assert_eq!(no_repo.view, View::Global);
        assert!(no_repo.status_line.contains("no repository context"));
    }

    #[test]
    fn superseded_session_load_is_ignored() {
        let mut app = app_with_rows(vec![mk_row("repo-1", SessionState::Active)]);
        let first = app.handle_key_event(press(KeyCode::Char('r')));
        let second = app.handle_key_event(press(KeyCode::Char('r')));
        let (Effect::LoadSessions { request_id: old, .. }, Effect::LoadSessions { request_id: new, .. }) =
            (first[0].clone(), second[0].clone())
        else {
            panic!("expected two loads");
        };

        app.apply_message(AppMessage::SessionsLoaded {
            request_id: old,
            result: Ok(Vec::new()),
        });
        assert_eq!(app.rows.len(), 1);
        assert!(app.loading);

        app.apply_message(AppMessage::SessionsLoaded {
            request_id: new,
            result: Ok(vec![
                mk_row("repo-1", SessionState::Active),
                mk_row("repo-2", SessionState::Stale),
            ]),
        });
        assert_eq!(app.rows.len(), 2);
        assert!(!app.loading);
    }

    #[test]
    fn load_failure_renders_retry_hint() {
        let mut app = HatchApp::new(AppSettings::default(), None, RefreshGate::new(), false);
        app.start();
        app.apply_message(AppMessage::SessionsLoaded {
            request_id: 1,
            result: Err("failed to parse session store".to_string()),
        });
        assert!(app.status_line.contains("failed to parse session store"));
        assert!(app.status_line.contains("press r to retry"));
    }

    #[test]
    fn cleanup_without_stale_sessions_raises_no_dialog() {
        let mut app = app_with_rows(vec![mk_row("repo-1", SessionState::Active)]);
        let effects = request_cleanup(&mut app, Vec::new());
        assert!(effects.is_empty());
        assert!(app.pending.is_none());
        assert!(app.status_line.starts_with("no stale sessions"));
    }

    #[test]
    fn cleanup_scans_the_current_scope_instead_of_cached_rows() {
        let mut app = app_with_rows(vec![mk_row("repo-1", SessionState::Active)]);
        let effects = app.handle_key_event(press(KeyCode::Char('c')));
        assert_eq!(
            effects,
            vec![Effect::IdentifyStale {
                request_id: 1,
                scope: ViewScope::Repository {
                    root: PathBuf::from("/src/repo")
                }
            }]
        );
        assert!(app.pending.is_none());

        // The cached row still says active; the fresh scan decides.
        let gone_stale = mk_row("repo-1", SessionState::Stale).record;
        app.apply_message(AppMessage::CandidatesIdentified {
            request_id: 1,
            result: Ok(vec![gone_stale]),
        });
        assert!(matches!(&app.pending, Some(PendingConfirmation::Cleanup(c)) if c.len() == 1));
    }

    #[test]
    fn superseded_or_orphaned_scan_raises_no_dialog() {
        let mut app = app_with_rows(vec![mk_row("repo-1", SessionState::Stale)]);
        let found = stale_records(&app);

        app.handle_key_event(press(KeyCode::Char('c')));
        app.handle_key_event(press(KeyCode::Char('c')));
        app.apply_message(AppMessage::CandidatesIdentified {
            request_id: 1,
            result: Ok(found.clone()),
        });
        assert!(app.pending.is_none());

        // Scope switched while the scan ran.
        app.handle_key_event(press(KeyCode::Char('g')));
        app.apply_message(AppMessage::CandidatesIdentified {
            request_id: 2,
            result: Ok(found.clone()),
        });
        assert!(app.pending.is_none());

        let effects = app.handle_key_event(press(KeyCode::Char('c')));
        assert!(matches!(effects.as_slice(), [Effect::IdentifyStale { request_id: 3, .. }]));
        app.apply_message(AppMessage::CandidatesIdentified {
            request_id: 3,
            result: Err("failed to parse session store".to_string()),
        });
        assert!(app.pending.is_none());
        assert!(app.status_line.contains("press c to retry"));
    }

    #[test]
    fn cleanup_dialog_holds_only_stale_candidates_and_confirms() {
        let mut app = app_with_rows(vec![
            mk_row("repo-1", SessionState::Active),
            mk_row("repo-2", SessionState::Stale),
            mk_row("repo-3", SessionState::Stopped),
        ]);
        let found = stale_records(&app);
        request_cleanup(&mut app, found);
        let Some(PendingConfirmation::Cleanup(candidates)) = &app.pending else {
            panic!("expected cleanup dialog");
        };
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].namespaced_id, SessionId::new("repo-2"));
        assert_eq!(app.key_context(), KeyContext::Dialog);

        let effects = app.handle_key_event(press(KeyCode::Char('y')));
        assert!(app.pending.is_none());
        assert!(matches!(effects.as_slice(), [Effect::RunCleanup { candidates }] if candidates.len() == 1));
    }

    #[test]
    fn dialog_captures_all_input() {
        let mut app = app_with_rows(vec![
            mk_row("repo-1", SessionState::Stale),
            mk_row("repo-2", SessionState::Stale),
        ]);
        let found = stale_records(&app);
        request_cleanup(&mut app, found);

        for code in [KeyCode::Char('q'), KeyCode::Char('j'), KeyCode::Char('l'), KeyCode::Char('g')] {
            assert!(app.handle_key_event(press(code)).is_empty());
        }
        assert!(!app.should_quit);
        assert_eq!(app.selected, 0);
        assert_eq!(app.view, View::Repository);
        assert!(app.pending.is_some());

        app.handle_key_event(press(KeyCode::Esc));
        assert!(app.pending.is_none());
        assert!(!app.should_quit);
        assert_eq!(app.status_line, "cancelled");
    }

    #[test]
    fn stop_and_attach_target_selected_session() {
        let mut app = app_with_rows(vec![
            mk_row("repo-1", SessionState::Active),
            mk_row("repo-2", SessionState::Stopped),
        ]);
        app.handle_key_event(press(KeyCode::Char('j')));

        let effects = app.handle_key_event(press(KeyCode::Enter));
        assert!(matches!(effects.as_slice(), [Effect::Attach { record }] if record.namespaced_id == SessionId::new("repo-2")));

        app.handle_key_event(press(KeyCode::Char('x')));
        assert!(matches!(&app.pending, Some(PendingConfirmation::Stop(record)) if record.multiplexer_session == "repo-2"));
        let effects = app.handle_key_event(press(KeyCode::Enter));
        assert!(matches!(effects.as_slice(), [Effect::StopSession { .. }]));

        let effects = app.apply_message(AppMessage::StopFinished {
            session_id: SessionId::new("repo-2"),
            report: CleanupReport {
                cleaned_count: 1,
                ..CleanupReport::default()
            },
        });
        assert_eq!(app.status_line, "stopped repo-2");
        assert!(matches!(effects.as_slice(), [Effect::LoadSessions { .. }]));
    }

    #[test]
    fn entering_log_view_starts_timer_and_immediate_run() {
        let mut app = app_with_rows(vec![mk_row("repo-1", SessionState::Active)]);
        let gate = app.gate();
        let effects = app.handle_key_event(press(KeyCode::Char('l')));

        assert_eq!(app.key_context(), KeyContext::Log);
        assert!(matches!(
            effects.as_slice(),
            [Effect::StartLogTimer { .. }, Effect::RunLogScript { generation: 1, .. }]
        ));
        assert!(gate.is_busy());
        let log = app.log.as_ref().expect("log view");
        assert!(log.loading);
        assert!(log.refreshing);

        let effects = app.handle_key_event(press(KeyCode::Esc));
        assert_eq!(effects, vec![Effect::StopLogTimer]);
        assert_eq!(app.view, View::Repository);
        assert!(app.log.is_none());
    }

    #[test]
    fn log_result_after_leaving_log_view_is_ignored() {
        let mut app = app_with_rows(vec![mk_row("repo-1", SessionState::Active)]);
        let generation = open_log(&mut app);
        app.handle_key_event(press(KeyCode::Esc));
        app.gate().release();

        let effects = app.apply_message(AppMessage::LogResult {
            session_id: SessionId::new("repo-1"),
            generation,
            result: Ok("late output\n".to_string()),
        });
        assert!(effects.is_empty());
        assert_eq!(app.view, View::Repository);
        assert!(app.log.is_none());
    }

    #[test]
    fn result_from_previous_generation_does_not_touch_new_view() {
        let mut app = app_with_rows(vec![mk_row("repo-1", SessionState::Active)]);
        let old_generation = open_log(&mut app);
        app.handle_key_event(press(KeyCode::Esc));
        app.gate().release();
        let new_generation = open_log(&mut app);
        assert_ne!(old_generation, new_generation);
        app.gate().release();

        app.apply_message(AppMessage::LogResult {
            session_id: SessionId::new("repo-1"),
            generation: old_generation,
            result: Ok("stale\n".to_string()),
        });
        let log = app.log.as_ref().expect("log view");
        assert!(log.content.is_empty());
        assert!(log.loading);

        app.apply_message(AppMessage::LogResult {
            session_id: SessionId::new("repo-1"),
            generation: new_generation,
            result: Ok("fresh\n".to_string()),
        });
        let log = app.log.as_ref().expect("log view");
        assert_eq!(log.content, "fresh\n");
        assert!(!log.loading);
        assert!(log.last_updated.is_some());
    }

    #[test]
    fn tick_for_inactive_view_hands_back_the_gate() {
        let mut app = app_with_rows(vec![mk_row("repo-1", SessionState::Active)]);
        let generation = open_log(&mut app);
        app.handle_key_event(press(KeyCode::Esc));
        let gate = app.gate();
        gate.release();

        assert!(gate.try_begin(), "timer claims the gate before ticking");
        let effects = app.apply_message(AppMessage::LogTick {
            session_id: SessionId::new("repo-1"),
            generation,
        });
        assert!(effects.is_empty());
        assert!(!gate.is_busy());
    }

    #[test]
    fn dropped_old_tick_starts_refresh_queued_by_reopened_log() {
        let mut app = app_with_rows(vec![mk_row("repo-1", SessionState::Active)]);
        let old_generation = open_log(&mut app);
        let gate = app.gate();
        gate.release();
        assert!(gate.try_begin(), "old timer claims the gate");

        app.handle_key_event(press(KeyCode::Esc));
        let effects = app.handle_key_event(press(KeyCode::Char('l')));
        assert!(matches!(effects.as_slice(), [Effect::StartLogTimer { .. }]));
        let new_generation = app.log.as_ref().expect("log view").generation;
        assert!(app.log.as_ref().expect("log view").pending_refresh);

        let effects = app.apply_message(AppMessage::LogTick {
            session_id: SessionId::new("repo-1"),
            generation: old_generation,
        });
        assert!(matches!(
            effects.as_slice(),
            [Effect::RunLogScript { generation, .. }] if *generation == new_generation
        ));
        assert!(gate.is_busy());
        let log = app.log.as_ref().expect("log view");
        assert!(!log.pending_refresh);
        assert!(log.refreshing);
    }

    #[test]
    fn terminal_error_pauses_auto_refresh_until_manual_retry() {
        let mut app = app_with_rows(vec![mk_row("repo-1", SessionState::Active)]);
        let generation = open_log(&mut app);
        let gate = app.gate();
        gate.release();

        let effects = app.apply_message(AppMessage::LogResult {
            session_id: SessionId::new("repo-1"),
            generation,
            result: Err(LogFailure {
                output: "No log script found at /tmp/wt/repo-1/.hooks/log\n".to_string(),
                ..failure("log script not found at /tmp/wt/repo-1/.hooks/log", true)
            }),
        });
        assert_eq!(effects, vec![Effect::StopLogTimer]);
        let log = app.log.as_ref().expect("log view");
        assert_eq!(log.auto_refresh, AutoRefresh::DisabledByError);
        assert!(log.content.contains(".hooks/log"));
        assert!(log.error_message.as_deref().unwrap_or("").contains("press r to retry"));

        // A tick already in the queue must not execute.
        assert!(gate.try_begin());
        let effects = app.apply_message(AppMessage::LogTick {
            session_id: SessionId::new("repo-1"),
            generation,
        });
        assert!(effects.is_empty());
        assert!(!gate.is_busy());

        let effects = app.handle_key_event(press(KeyCode::Char('r')));
        assert!(matches!(
            effects.as_slice(),
            [Effect::StartLogTimer { .. }, Effect::RunLogScript { .. }]
        ));
        assert_eq!(app.log.as_ref().expect("log view").auto_refresh, AutoRefresh::Enabled);
    }

    #[test]
    fn timeout_keeps_partial_output_and_auto_refresh() {
        let mut app = app_with_rows(vec![mk_row("repo-1", SessionState::Active)]);
        let generation = open_log(&mut app);
        app.gate().release();

        let effects = app.apply_message(AppMessage::LogResult {
            session_id: SessionId::new("repo-1"),
            generation,
            result: Err(LogFailure {
                output: "partial\n".to_string(),
                timed_out: true,
                ..failure("log script timed out after 30s", false)
            }),
        });
        assert!(effects.is_empty());
        let log = app.log.as_ref().expect("log view");
        assert_eq!(log.content, "partial\n");
        assert_eq!(log.auto_refresh, AutoRefresh::Enabled);
        assert!(log.error_message.as_deref().unwrap_or("").contains("timed out"));
    }

    #[test]
    fn manual_refresh_while_busy_is_queued_not_doubled() {
        let mut app = app_with_rows(vec![mk_row("repo-1", SessionState::Active)]);
        let generation = open_log(&mut app);
        let gate = app.gate();
        assert!(gate.is_busy());

        let effects = app.handle_key_event(press(KeyCode::Char('r')));
        assert!(effects.is_empty());
        assert!(app.log.as_ref().expect("log view").pending_refresh);

        gate.release();
        let effects = app.apply_message(AppMessage::LogResult {
            session_id: SessionId::new("repo-1"),
            generation,
            result: Ok("one\n".to_string()),
        });
        assert!(matches!(effects.as_slice(), [Effect::RunLogScript { .. }]));
        assert!(gate.is_busy());
        assert!(!app.log.as_ref().expect("log view").pending_refresh);
    }

    #[test]
    fn status_tick_skips_while_load_in_flight() {
        let mut app = app_with_rows(vec![mk_row("repo-1", SessionState::Active)]);
        let effects = app.apply_message(AppMessage::StatusTick);
        assert!(matches!(effects.as_slice(), [Effect::LoadSessions { .. }]));
        assert!(app.apply_message(AppMessage::StatusTick).is_empty());

        let settings = AppSettings {
            status_tracking: false,
            ..AppSettings::default()
        };
        let mut untracked = HatchApp::new(settings, None, RefreshGate::new(), false);
        assert!(untracked.apply_message(AppMessage::StatusTick).is_empty());
    }

    #[test]
    fn cleanup_report_errors_surface_in_status_line() {
        let mut app = app_with_rows(vec![mk_row("repo-1", SessionState::Stale)]);
        let effects = app.apply_message(AppMessage::CleanupFinished {
            report: CleanupReport {
                cleaned_count: 1,
                dry_run: false,
                skipped: Vec::new(),
                errors: vec![CleanupFailure {
                    session_id: SessionId::new("repo-9"),
                    stage: CleanupStage::Sandbox,
                    message: "failed to delete sandbox hatch-repo-9".to_string(),
                }],
            },
        });
        assert!(app.status_line.starts_with("cleaned 1 session(s), 1 failed"));
        assert!(app.status_line.contains("repo-9"));
        assert!(matches!(effects.as_slice(), [Effect::LoadSessions { .. }]));
    }

    #[test]
    fn log_view_scrolls_with_page_keys() {
        let mut app = app_with_rows(vec![mk_row("repo-1", SessionState::Active)]);
        let generation = open_log(&mut app);
        app.gate().release();
        app.viewport_height = 3;
        let content: String = (0..10).map(|n| format!("line {n}\n")).collect();
        app.apply_message(AppMessage::LogResult {
            session_id: SessionId::new("repo-1"),
            generation,
            result: Ok(content),
        });

        app.handle_key_event(press(KeyCode::PageDown));
        assert_eq!(app.log.as_ref().expect("log").scroll_offset, 3);
        app.handle_key_event(press(KeyCode::End));
        assert_eq!(app.log.as_ref().expect("log").scroll_offset, 7);
        app.handle_key_event(press(KeyCode::Home));
        assert_eq!(app.log.as_ref().expect("log").scroll_offset, 0);
        app.handle_key_event(press(KeyCode::Char('j')));
        assert_eq!(app.log.as_ref().expect("log").scroll_offset, 1);
    }

    #[test]
    fn attach_result_reports_and_refreshes() {
        let mut app = app_with_rows(vec![mk_row("repo-1", SessionState::Active)]);
        let effects = app.apply_message(AppMessage::AttachFinished {
            session_id: SessionId::new("repo-1"),
            result: Err("tmux exited with status 1".to_string()),
        });
        assert!(app.status_line.contains("attach to repo-1 failed"));
        assert_eq!(effects.len(), 1);
    }
}

use chrono::{DateTime, Local, Utc};
use hatch_core::{render_candidate_summary, SessionRecord, SessionState, ViewScope};
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Clear, Paragraph, Wrap};
use ratatui::Frame;

use crate::action::key_hints;
use crate::app::HatchApp;
use crate::model::{AutoRefresh, LogView, PendingConfirmation, SessionRow};

const ACCENT: Color = Color::Cyan;
const HEADER_FG: Color = Color::White;
const DIM: Color = Color::DarkGray;
const SELECTED_BG: Color = Color::Indexed(236);
const BORDER_NORMAL: Color = Color::DarkGray;
const BORDER_FOCUSED: Color = Color::Cyan;
const MUTED: Color = Color::Gray;
const HEADER_HEIGHT: u16 = 3;
const FOOTER_HEIGHT: u16 = 4;
const LOG_META_HEIGHT: u16 = 2;

fn state_color(state: SessionState) -> Color {
    match state {
        SessionState::Active => Color::Green,
        SessionState::Stopped => Color::Yellow,
        SessionState::Stale => Color::Red,
    }
}

fn status_line_color(message: &str) -> Color {
    let lower = message.to_ascii_lowercase();
    if lower.contains("failed") || lower.contains("error") || lower.contains("crashed") {
        Color::Red
    } else if lower.contains("confirm") || lower.contains("queued") {
        Color::Yellow
    } else if lower.starts_with("cleaned") || lower.starts_with("stopped") {
        Color::Green
    } else {
        MUTED
    }
}

fn normal_block(title: &str) -> Block<'_> {
    Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(BORDER_NORMAL))
        .title(Span::styled(
            format!(" {title} "),
            Style::default().fg(ACCENT).add_modifier(Modifier::BOLD),
        ))
}

fn focused_block(title: &str) -> Block<'_> {
    Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(BORDER_FOCUSED).add_modifier(Modifier::BOLD))
        .title(Span::styled(
            format!(" {title} "),
            Style::default().fg(Color::White).add_modifier(Modifier::BOLD),
        ))
}

/// Rows of log text visible for a terminal `height` rows tall.
pub fn log_viewport_height(height: u16) -> usize {
    usize::from(height.saturating_sub(HEADER_HEIGHT + FOOTER_HEIGHT + LOG_META_HEIGHT + 2)).max(1)
}

pub fn render_dashboard(frame: &mut Frame<'_>, app: &HatchApp) {
    let root = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(HEADER_HEIGHT),
            Constraint::Min(3),
            Constraint::Length(FOOTER_HEIGHT),
        ])
        .split(frame.area());

    render_header(frame, root[0], app);
    match &app.log {
        Some(log) if app.view.is_log() => render_log_view(frame, root[1], log),
        _ => render_session_table(frame, root[1], app),
    }
    render_footer(frame, root[2], app);

    if let Some(pending) = &app.pending {
        render_confirm_modal(frame, pending);
    }
}

fn render_header(frame: &mut Frame<'_>, area: Rect, app: &HatchApp) {
    let repository = app
        .repository
        .as_ref()
        .map(|repo| repo.name.as_str())
        .unwrap_or("-");
    let stale = app.rows.iter().filter(|row| row.is_stale()).count();

    let mut spans = vec![
        Span::styled(" hatch ", Style::default().fg(ACCENT).add_modifier(Modifier::BOLD)),
        Span::styled(" scope:", Style::default().fg(DIM)),
        Span::styled(app.scope().label(), Style::default().fg(ACCENT)),
        Span::styled("  repo:", Style::default().fg(DIM)),
        Span::styled(repository.to_string(), Style::default().fg(HEADER_FG)),
        Span::styled("  sessions:", Style::default().fg(DIM)),
        Span::styled(app.rows.len().to_string(), Style::default().fg(HEADER_FG)),
        Span::styled("  stale:", Style::default().fg(DIM)),
        Span::styled(
            stale.to_string(),
            Style::default().fg(if stale > 0 { Color::Red } else { HEADER_FG }),
        ),
    ];
    if app.loading {
        spans.push(Span::styled("  refreshing", Style::default().fg(Color::Yellow)));
    }

    let widget = Paragraph::new(Line::from(spans)).block(normal_block("Sessions"));
    frame.render_widget(widget, area);
}

fn render_session_table(frame: &mut Frame<'_>, area: Rect, app: &HatchApp) {
    let global = app.scope() == ViewScope::Global;
    let mut lines = Vec::new();

    let columns = if global {
        " id | issue | repository | branch | state | tmux/sbx | activity"
    } else {
        " id | issue | branch | state | tmux/sbx | activity"
    };
    lines.push(Line::from(Span::styled(
        columns,
        Style::default().fg(DIM).add_modifier(Modifier::BOLD),
    )));
    lines.push(Line::from(Span::styled(
        "\u{2500}".repeat(usize::from(area.width.saturating_sub(2))),
        Style::default().fg(DIM),
    )));

    for (idx, row) in app.rows.iter().enumerate() {
        lines.push(format_session_row(idx == app.selected, row, global));
    }

    if app.rows.is_empty() {
        let empty = if app.loading {
            " loading sessions".to_string()
        } else {
            format!(" no sessions in {} view", app.scope().label())
        };
        lines.push(Line::from(Span::styled(empty, Style::default().fg(DIM))));
    }

    let title = format!("{} sessions", app.scope().label());
    frame.render_widget(Paragraph::new(lines).block(normal_block(&title)), area);
}

fn render_log_view(frame: &mut Frame<'_>, area: Rect, log: &LogView) {
    let parts = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(LOG_META_HEIGHT), Constraint::Min(1)])
        .split(area);

    frame.render_widget(Paragraph::new(log_meta_lines(log)), parts[0]);

    let height = usize::from(parts[1].height.saturating_sub(2));
    let lines: Vec<Line<'_>> = if log.loading && log.content.is_empty() {
        vec![Line::from(Span::styled(" running log script", Style::default().fg(DIM)))]
    } else {
        log.visible_lines(height)
            .into_iter()
            .map(|line| Line::from(Span::raw(line)))
            .collect()
    };
    let title = format!("Logs: {}", log.session.namespaced_id);
    frame.render_widget(Paragraph::new(lines).block(focused_block(&title)), parts[1]);
}

fn log_meta_lines(log: &LogView) -> Vec<Line<'static>> {
    let updated = log
        .last_updated
        .map(to_local_time)
        .unwrap_or_else(|| "never".to_string());
    let refresh = match log.auto_refresh {
        AutoRefresh::Enabled => Span::styled("auto-refresh on", Style::default().fg(Color::Green)),
        AutoRefresh::DisabledByError => {
            Span::styled("auto-refresh paused", Style::default().fg(Color::Yellow))
        }
    };

    let mut meta = vec![
        Span::styled(
            format!(" {} ", log.session.worktree_path.display()),
            Style::default().fg(MUTED),
        ),
        Span::styled(" updated:", Style::default().fg(DIM)),
        Span::styled(updated, Style::default().fg(HEADER_FG)),
        Span::styled("  ", Style::default()),
        refresh,
        Span::styled(
            format!("  lines:{}", log.line_count()),
            Style::default().fg(DIM),
        ),
    ];
    if log.refreshing {
        meta.push(Span::styled("  running", Style::default().fg(Color::Yellow)));
    }

    let second = match &log.error_message {
        Some(message) => Line::from(Span::styled(
            format!(" {message}"),
            Style::default().fg(Color::Red),
        )),
        None => Line::from(""),
    };
    vec![Line::from(meta), second]
}

fn render_footer(frame: &mut Frame<'_>, area: Rect, app: &HatchApp) {
    let status = if app.status_line.is_empty() {
        Line::from(Span::styled(" ready", Style::default().fg(DIM)))
    } else {
        Line::from(Span::styled(
            format!(" {}", app.status_line),
            Style::default().fg(status_line_color(&app.status_line)),
        ))
    };
    let hints = Line::from(Span::styled(
        format!(" {}", key_hints(app.key_context())),
        Style::default().fg(DIM),
    ));

    let widget = Paragraph::new(vec![status, hints])
        .block(Block::default().borders(Borders::TOP).border_style(Style::default().fg(BORDER_NORMAL)))
        .wrap(Wrap { trim: true });
    frame.render_widget(widget, area);
}

fn confirm_lines(pending: &PendingConfirmation) -> (String, Vec<Line<'static>>) {
    match pending {
        PendingConfirmation::Cleanup(candidates) => {
            let lines = render_candidate_summary(candidates)
                .lines()
                .map(|line| Line::from(line.to_string()))
                .collect();
            ("Clean Up Stale Sessions".to_string(), lines)
        }
        PendingConfirmation::Stop(record) => {
            ("Stop Session".to_string(), stop_summary(record))
        }
    }
}

fn stop_summary(record: &SessionRecord) -> Vec<Line<'static>> {
    vec![
        Line::from(Span::styled(
            format!("Stop session {}?", record.namespaced_id),
            Style::default().fg(Color::White).add_modifier(Modifier::BOLD),
        )),
        Line::from(""),
        Line::from(format!("Kills multiplexer session {}.", record.multiplexer_session)),
        Line::from(format!("Deletes sandbox {}.", record.effective_sandbox_name())),
        Line::from("Removes the session record. The worktree is left in place."),
    ]
}

fn render_confirm_modal(frame: &mut Frame<'_>, pending: &PendingConfirmation) {
    let area = centered_rect(64, 40, frame.area());
    let (title, mut lines) = confirm_lines(pending);
    lines.push(Line::from(""));
    lines.push(Line::from(Span::styled(
        "Enter/Y = confirm    N/Esc = cancel",
        Style::default().fg(DIM),
    )));

    let widget = Paragraph::new(lines)
        .block(focused_block(&title))
        .wrap(Wrap { trim: true });
    frame.render_widget(Clear, area);
    frame.render_widget(widget, area);
}

fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(area);
    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(vertical[1])[1]
}

fn liveness(alive: bool) -> &'static str {
    if alive {
        "up"
    } else {
        "down"
    }
}

pub fn format_session_row(is_selected: bool, row: &SessionRow, show_repository: bool) -> Line<'_> {
    let record = &row.record;
    let base_style = if is_selected {
        Style::default().bg(SELECTED_BG).fg(Color::White)
    } else {
        Style::default().fg(MUTED)
    };
    let separator = || Span::styled(" | ", Style::default().fg(DIM));

    let mut spans = vec![
        Span::styled(
            if is_selected { "\u{25B6} " } else { "  " },
            Style::default().fg(if is_selected { ACCENT } else { DIM }),
        ),
        Span::styled(
            record.namespaced_id.to_string(),
            if is_selected {
                base_style.add_modifier(Modifier::BOLD)
            } else {
                Style::default().fg(Color::White)
            },
        ),
        separator(),
        Span::styled(format!("#{} {}", record.issue_number, record.issue_title), base_style),
    ];
    if show_repository {
        spans.push(separator());
        spans.push(Span::styled(record.repository_name.as_str(), base_style));
    }
    spans.extend([
        separator(),
        Span::styled(record.branch.as_str(), base_style),
        separator(),
        Span::styled(
            row.status.state.as_str(),
            Style::default()
                .fg(state_color(row.status.state))
                .add_modifier(Modifier::BOLD),
        ),
        separator(),
        Span::styled(
            format!(
                "{}/{}",
                liveness(row.status.multiplexer_alive),
                liveness(row.status.sandbox_alive)
            ),
            base_style,
        ),
        separator(),
        Span::styled(row.status.time_delta.as_str(), Style::default().fg(DIM)),
    ]);
    Line::from(spans)
}

fn to_local_time(value: DateTime<Utc>) -> String {
    value.with_timezone(&Local).format("%H:%M:%S").to_string()
}

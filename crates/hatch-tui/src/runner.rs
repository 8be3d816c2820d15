use std::io;
use std::process::Command;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use crossterm::event::{self, Event as CEvent};
use crossterm::execute;
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use hatch_core::SessionRecord;
use ratatui::backend::CrosstermBackend;
use ratatui::Terminal;
use tracing::{info, warn};

use crate::app::HatchApp;
use crate::context::AppContext;
use crate::error::TuiError;
use crate::message::{AppMessage, Effect};
use crate::scheduler::Ticker;
use crate::ui::{log_viewport_height, render_dashboard};
use crate::worker::EffectExecutor;

type Term = Terminal<CrosstermBackend<io::Stdout>>;

pub fn run_tui(app: &mut HatchApp, ctx: Arc<AppContext>, tick_rate: Duration) -> Result<(), TuiError> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let run_result = run_loop(&mut terminal, app, ctx, tick_rate);

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    run_result
}

fn run_loop(
    terminal: &mut Term,
    app: &mut HatchApp,
    ctx: Arc<AppContext>,
    tick_rate: Duration,
) -> Result<(), TuiError> {
    let (tx, rx) = mpsc::channel();
    let mut executor = EffectExecutor::new(ctx.clone(), tx.clone(), app.gate());
    let _status_ticker = ctx.config.status_refresh_interval().map(|interval| {
        Ticker::spawn("status", interval, tx.clone(), || Some(AppMessage::StatusTick))
    });

    let effects = app.start();
    dispatch(terminal, &mut executor, &ctx, &tx, effects)?;

    while !app.should_quit {
        app.viewport_height = log_viewport_height(terminal.size()?.height);
        terminal.draw(|frame| render_dashboard(frame, app))?;

        if event::poll(tick_rate)? {
            let effects = handle_terminal_event(app, event::read()?);
            dispatch(terminal, &mut executor, &ctx, &tx, effects)?;
        }
        drain_messages(terminal, app, &mut executor, &ctx, &tx, &rx)?;
    }
    Ok(())
}

fn drain_messages(
    terminal: &mut Term,
    app: &mut HatchApp,
    executor: &mut EffectExecutor,
    ctx: &AppContext,
    tx: &Sender<AppMessage>,
    rx: &Receiver<AppMessage>,
) -> Result<(), TuiError> {
    while let Ok(message) = rx.try_recv() {
        let effects = app.apply_message(message);
        dispatch(terminal, executor, ctx, tx, effects)?;
    }
    Ok(())
}

fn dispatch(
    terminal: &mut Term,
    executor: &mut EffectExecutor,
    ctx: &AppContext,
    tx: &Sender<AppMessage>,
    effects: Vec<Effect>,
) -> Result<(), TuiError> {
    for effect in effects {
        if let Some(record) = executor.execute(effect) {
            let message = attach_session(terminal, ctx, &record)?;
            let _ = tx.send(message);
        }
    }
    Ok(())
}

/// Hands the terminal to the multiplexer client until it detaches.
fn attach_session(
    terminal: &mut Term,
    ctx: &AppContext,
    record: &SessionRecord,
) -> Result<AppMessage, TuiError> {
    let mut command = ctx.multiplexer.attach_command(&record.multiplexer_session);
    let rendered = render_command(&command);
    info!(session = %record.namespaced_id, command = %rendered, "attaching");

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    let status = command.status();

    enable_raw_mode()?;
    execute!(terminal.backend_mut(), EnterAlternateScreen)?;
    terminal.clear()?;

    let result = match status {
        Ok(status) if status.success() => {
            if let Err(err) = ctx.store.touch(&record.namespaced_id, Utc::now()) {
                warn!(session = %record.namespaced_id, error = %err, "failed to record activity");
            }
            Ok(())
        }
        Ok(status) => Err(format!("{rendered} exited with {status}")),
        Err(source) => Err(TuiError::Attach {
            command: rendered,
            source,
        }
        .to_string()),
    };
    Ok(AppMessage::AttachFinished {
        session_id: record.namespaced_id.clone(),
        result,
    })
}

fn render_command(command: &Command) -> String {
    std::iter::once(command.get_program())
        .chain(command.get_args())
        .map(|part| part.to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join(" ")
}

fn handle_terminal_event(app: &mut HatchApp, event: CEvent) -> Vec<Effect> {
    match event {
        CEvent::Key(key) => app.handle_key_event(key),
        CEvent::Resize(_, height) => {
            app.viewport_height = log_viewport_height(height);
            Vec::new()
        }
        _ => Vec::new(),
    }
}

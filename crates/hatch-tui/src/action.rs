use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use serde::{Deserialize, Serialize};

/// Which key table is active. The confirmation dialog shadows both views.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyContext {
    Table,
    Log,
    Dialog,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UiCommand {
    MoveDown,
    MoveUp,
    PageDown,
    PageUp,
    Home,
    End,
    ToggleScope,
    OpenLog,
    RequestCleanup,
    RequestStop,
    Attach,
    Refresh,
    Back,
    Confirm,
    Cancel,
    Quit,
}

pub fn map_key_to_command(key: KeyEvent, context: KeyContext) -> Option<UiCommand> {
    if key.kind != KeyEventKind::Press {
        return None;
    }

    let ctrl_c = key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c');
    match context {
        KeyContext::Dialog => match key.code {
            _ if ctrl_c => None,
            KeyCode::Char('y') | KeyCode::Char('Y') | KeyCode::Enter => Some(UiCommand::Confirm),
            KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => Some(UiCommand::Cancel),
            _ => None,
        },
        KeyContext::Log => match key.code {
            _ if ctrl_c => Some(UiCommand::Quit),
            KeyCode::Esc | KeyCode::Char('q') => Some(UiCommand::Back),
            KeyCode::Char('r') => Some(UiCommand::Refresh),
            KeyCode::Char('j') | KeyCode::Down => Some(UiCommand::MoveDown),
            KeyCode::Char('k') | KeyCode::Up => Some(UiCommand::MoveUp),
            KeyCode::PageDown => Some(UiCommand::PageDown),
            KeyCode::PageUp => Some(UiCommand::PageUp),
            KeyCode::Home => Some(UiCommand::Home),
            KeyCode::End => Some(UiCommand::End),
            _ => None,
        },
        KeyContext::Table => match key.code {
            _ if ctrl_c => Some(UiCommand::Quit),
            KeyCode::Esc | KeyCode::Char('q') => Some(UiCommand::Quit),
            KeyCode::Char('j') | KeyCode::Down => Some(UiCommand::MoveDown),
            KeyCode::Char('k') | KeyCode::Up => Some(UiCommand::MoveUp),
            KeyCode::Char('g') => Some(UiCommand::ToggleScope),
            KeyCode::Char('l') => Some(UiCommand::OpenLog),
            KeyCode::Char('c') => Some(UiCommand::RequestCleanup),
            KeyCode::Char('x') => Some(UiCommand::RequestStop),
            KeyCode::Enter => Some(UiCommand::Attach),
            KeyCode::Char('r') => Some(UiCommand::Refresh),
            _ => None,
        },
    }
}

/// Footer hint for each key table.
pub fn key_hints(context: KeyContext) -> &'static str {
    match context {
        KeyContext::Table => {
            "j/k move  enter attach  l logs  x stop  c clean stale  g scope  r refresh  q quit"
        }
        KeyContext::Log => "j/k scroll  pgup/pgdn page  home/end jump  r retry  esc back",
        KeyContext::Dialog => "y/enter confirm  n/esc cancel",
    }
}

use crate::app::InputMode;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Quit,
    Down,
    Up,
    Top,
    Bottom,
    ToggleHelp,
    Refresh,
    CycleStatusFilter,
    CycleSort,
    ToggleOwnership,
    Delete,
    OpenShell,
    ViewDocument,
    OpenConfigs,
    Select,
    Apply,
    Save,
    BulkEdit,
    CycleNext,
    CyclePrev,
    Back,
    ConfirmYes,
    ConfirmNo,
    Dismiss,
    SubmitInput,
    CancelInput,
    Backspace,
    InputChar(char),
}

pub fn map_key(mode: InputMode, key: KeyEvent) -> Option<Action> {
    match mode {
        InputMode::Normal => map_normal_mode_key(key),
        InputMode::Confirm => map_confirm_key(key),
        InputMode::Notice => map_notice_key(key),
        InputMode::ConfigList => map_config_list_key(key),
        InputMode::ConfigEdit => map_config_edit_key(key),
        InputMode::Text => map_text_key(key),
    }
}

fn map_navigation_key(key: KeyEvent) -> Option<Action> {
    match key.code {
        KeyCode::Char('j') if key.modifiers.is_empty() => Some(Action::Down),
        KeyCode::Down => Some(Action::Down),
        KeyCode::Char('k') if key.modifiers.is_empty() => Some(Action::Up),
        KeyCode::Up => Some(Action::Up),
        _ => None,
    }
}

fn map_normal_mode_key(key: KeyEvent) -> Option<Action> {
    if let Some(action) = map_navigation_key(key) {
        return Some(action);
    }

    match key.code {
        KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => Some(Action::Quit),
        KeyCode::Char('q') => Some(Action::Quit),
        KeyCode::Char('g') | KeyCode::Home => Some(Action::Top),
        KeyCode::Char('G') | KeyCode::End => Some(Action::Bottom),
        KeyCode::Char('?') => Some(Action::ToggleHelp),
        KeyCode::Char('r') | KeyCode::F(5) => Some(Action::Refresh),
        KeyCode::Char('f') => Some(Action::CycleStatusFilter),
        KeyCode::Char('s') => Some(Action::CycleSort),
        KeyCode::Char('h') => Some(Action::ToggleOwnership),
        KeyCode::Char('d') => Some(Action::Delete),
        KeyCode::Char('e') => Some(Action::OpenShell),
        KeyCode::Char('c') => Some(Action::ViewDocument),
        KeyCode::Char('n') => Some(Action::OpenConfigs),
        _ => None,
    }
}

fn map_confirm_key(key: KeyEvent) -> Option<Action> {
    match key.code {
        KeyCode::Char('y') | KeyCode::Char('Y') | KeyCode::Enter => Some(Action::ConfirmYes),
        KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => Some(Action::ConfirmNo),
        _ => None,
    }
}

fn map_notice_key(key: KeyEvent) -> Option<Action> {
    match key.code {
        KeyCode::Enter | KeyCode::Esc | KeyCode::Char(' ') | KeyCode::Char('q') => {
            Some(Action::Dismiss)
        }
        _ => None,
    }
}

fn map_config_list_key(key: KeyEvent) -> Option<Action> {
    if let Some(action) = map_navigation_key(key) {
        return Some(action);
    }

    match key.code {
        KeyCode::Enter => Some(Action::Select),
        KeyCode::Char('d') => Some(Action::Delete),
        KeyCode::Char('a') => Some(Action::Apply),
        KeyCode::Esc | KeyCode::Char('q') => Some(Action::Back),
        _ => None,
    }
}

fn map_config_edit_key(key: KeyEvent) -> Option<Action> {
    if let Some(action) = map_navigation_key(key) {
        return Some(action);
    }

    match key.code {
        KeyCode::Char('s') if key.modifiers.contains(KeyModifiers::CONTROL) => Some(Action::Save),
        KeyCode::Tab => Some(Action::Down),
        KeyCode::BackTab => Some(Action::Up),
        KeyCode::Enter => Some(Action::Select),
        KeyCode::Right | KeyCode::Char('l') => Some(Action::CycleNext),
        KeyCode::Left | KeyCode::Char('h') => Some(Action::CyclePrev),
        KeyCode::Char('e') => Some(Action::BulkEdit),
        KeyCode::Char('a') | KeyCode::F(5) => Some(Action::Apply),
        KeyCode::Esc => Some(Action::Back),
        _ => None,
    }
}

fn map_text_key(key: KeyEvent) -> Option<Action> {
    match key.code {
        KeyCode::Esc => Some(Action::CancelInput),
        KeyCode::Enter => Some(Action::SubmitInput),
        KeyCode::Backspace => Some(Action::Backspace),
        KeyCode::Char(c)
            if !key.modifiers.contains(KeyModifiers::CONTROL)
                && !key.modifiers.contains(KeyModifiers::ALT) =>
        {
            Some(Action::InputChar(c))
        }
        _ => None,
    }
}

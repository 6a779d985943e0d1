use crate::editor::ParameterForm;
use crate::input::Action;
use crate::model::{FilterState, WorkloadRecord, WorkloadStatus};
use crate::projection::project;
use crate::store::validate_name;
use crate::template::ParameterSet;
use chrono::Local;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum InputMode {
    Normal,
    Confirm,
    Notice,
    ConfigList,
    ConfigEdit,
    Text,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum View {
    Main,
    ConfirmDelete,
    ConfigList,
    ConfigEdit,
    SaveName,
    ShellSession,
    ConfigViewerSession,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppCommand {
    None,
    Refresh,
    DeleteWorkload { name: String },
    OpenShell { name: String },
    ViewDocument { name: String },
    LoadConfigList,
    OpenBaseConfig,
    OpenNamedConfig { name: String },
    DeleteNamedConfig { name: String },
    SaveNamedConfig { name: String, params: ParameterSet },
    ApplyParameters { params: ParameterSet },
    ApplyNamedConfig { name: String },
    BulkEdit { params: ParameterSet },
}

#[derive(Debug, Clone)]
struct PendingConfirmation {
    prompt: String,
    command: AppCommand,
    return_view: View,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Notice {
    pub title: String,
    pub message: String,
}

/// Settings the dispatcher needs from the resolved configuration.
#[derive(Debug, Clone)]
pub struct AppOptions {
    pub identity: String,
    pub namespace: String,
    pub context: String,
    pub refresh_interval: Duration,
    pub gpu_parameter: String,
    pub gpu_models: Vec<String>,
}

pub const NEW_CONFIG_ENTRY: &str = "+ new from base template";

pub struct App {
    running: bool,
    options: AppOptions,
    view: View,
    show_help: bool,
    status: String,
    notice: Option<Notice>,
    pending_confirmation: Option<PendingConfirmation>,
    snapshot: Vec<WorkloadRecord>,
    rows: Vec<WorkloadRecord>,
    selected: usize,
    filter: FilterState,
    last_refresh: Option<Instant>,
    refreshed_at: Option<String>,
    configs: Vec<String>,
    config_selected: usize,
    form: Option<ParameterForm>,
    discard_armed: bool,
    name_input: String,
}

impl App {
    pub fn new(options: AppOptions) -> Self {
        Self {
            running: true,
            options,
            view: View::Main,
            show_help: false,
            status: "Press r to refresh, n for configurations, ? for help".to_string(),
            notice: None,
            pending_confirmation: None,
            snapshot: Vec::new(),
            rows: Vec::new(),
            selected: 0,
            filter: FilterState::default(),
            last_refresh: None,
            refreshed_at: None,
            configs: Vec::new(),
            config_selected: 0,
            form: None,
            discard_armed: false,
            name_input: String::new(),
        }
    }

    pub fn running(&self) -> bool {
        self.running
    }

    pub fn mode(&self) -> InputMode {
        if self.notice.is_some() {
            return InputMode::Notice;
        }
        match self.view {
            View::ConfirmDelete => InputMode::Confirm,
            View::ConfigList => InputMode::ConfigList,
            View::ConfigEdit => match self.form.as_ref().and_then(ParameterForm::editing) {
                Some(_) => InputMode::Text,
                None => InputMode::ConfigEdit,
            },
            View::SaveName => InputMode::Text,
            View::Main | View::ShellSession | View::ConfigViewerSession => InputMode::Normal,
        }
    }

    pub fn view(&self) -> View {
        self.view
    }

    pub fn identity(&self) -> &str {
        &self.options.identity
    }

    pub fn namespace(&self) -> &str {
        &self.options.namespace
    }

    pub fn context(&self) -> &str {
        &self.options.context
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn show_help(&self) -> bool {
        self.show_help
    }

    pub fn notice(&self) -> Option<&Notice> {
        self.notice.as_ref()
    }

    pub fn pending_confirmation_prompt(&self) -> Option<&str> {
        self.pending_confirmation
            .as_ref()
            .map(|pending| pending.prompt.as_str())
    }

    pub fn filter(&self) -> &FilterState {
        &self.filter
    }

    pub fn rows(&self) -> &[WorkloadRecord] {
        &self.rows
    }

    pub fn snapshot_len(&self) -> usize {
        self.snapshot.len()
    }

    pub fn selected_index(&self) -> Option<usize> {
        (!self.rows.is_empty()).then_some(self.selected)
    }

    pub fn selected_record(&self) -> Option<&WorkloadRecord> {
        self.rows.get(self.selected)
    }

    pub fn refreshed_at(&self) -> Option<&str> {
        self.refreshed_at.as_deref()
    }

    /// Entries of the configuration list, the "new" entry first.
    pub fn config_entries(&self) -> Vec<String> {
        std::iter::once(NEW_CONFIG_ENTRY.to_string())
            .chain(self.configs.iter().cloned())
            .collect()
    }

    pub fn config_selected(&self) -> usize {
        self.config_selected
    }

    pub fn form(&self) -> Option<&ParameterForm> {
        self.form.as_ref()
    }

    pub fn name_input(&self) -> &str {
        &self.name_input
    }

    pub fn set_status(&mut self, status: impl Into<String>) {
        self.status = status.into();
    }

    /// Raises a notice that must be dismissed before any other input is handled.
    pub fn show_error(&mut self, title: impl Into<String>, message: impl Into<String>) {
        self.notice = Some(Notice {
            title: title.into(),
            message: message.into(),
        });
    }

    pub fn set_snapshot(&mut self, records: Vec<WorkloadRecord>) {
        self.snapshot = records;
        self.last_refresh = Some(Instant::now());
        self.refreshed_at = Some(Local::now().format("%H:%M:%S").to_string());
        self.reproject();
        self.status = format!(
            "Loaded {} jobs ({} shown)",
            self.snapshot.len(),
            self.rows.len()
        );
    }

    pub fn set_config_list(&mut self, names: Vec<String>) {
        self.configs = names;
        self.config_selected = self.config_selected.min(self.configs.len());
        self.form = None;
        self.view = View::ConfigList;
    }

    pub fn open_form(&mut self, params: ParameterSet, source: Option<String>) {
        self.status = match source.as_deref() {
            Some(name) => format!("Editing configuration {name}"),
            None => "Editing new configuration from base template".to_string(),
        };
        self.form = Some(ParameterForm::new(
            params,
            source,
            self.options.gpu_parameter.clone(),
            self.options.gpu_models.clone(),
        ));
        self.discard_armed = false;
        self.view = View::ConfigEdit;
    }

    /// Takes the text returned by the bulk editor. A rejected document leaves
    /// the form exactly as it was.
    pub fn apply_bulk_edit(&mut self, text: &str) {
        let Some(form) = self.form.as_mut() else {
            return;
        };
        match form.replace_from_bulk(text) {
            Ok(()) => self.status = "Bulk edit applied".to_string(),
            Err(error) => self.show_error("Bulk edit rejected", error.to_string()),
        }
    }

    pub fn finish_save(&mut self, name: &str) {
        if let Some(form) = self.form.as_mut() {
            form.mark_saved();
            form.set_source(Some(name.to_string()));
        }
        self.name_input.clear();
        self.view = View::ConfigEdit;
        self.status = format!("Saved configuration {name}");
    }

    pub fn finish_apply(&mut self, summary: impl Into<String>) {
        self.form = None;
        self.view = View::Main;
        self.status = summary.into();
    }

    pub fn finish_session(&mut self) {
        self.view = View::Main;
    }

    pub fn apply_action(&mut self, action: Action) -> AppCommand {
        if self.notice.is_some() {
            if matches!(action, Action::Dismiss) {
                self.notice = None;
            }
            return AppCommand::None;
        }

        if let Some(pending) = self.pending_confirmation.take() {
            match action {
                Action::ConfirmYes => {
                    self.view = pending.return_view;
                    self.status = format!("Confirmed: {}", pending.prompt);
                    return pending.command;
                }
                Action::ConfirmNo => {
                    self.view = pending.return_view;
                    self.status = "Action cancelled".to_string();
                    return AppCommand::None;
                }
                _ => {
                    self.pending_confirmation = Some(pending);
                    self.status =
                        "Pending confirmation: press y to confirm or n to cancel".to_string();
                    return AppCommand::None;
                }
            }
        }

        if self.show_help && !matches!(action, Action::ToggleHelp) {
            self.show_help = false;
        }

        match self.view {
            View::Main => self.apply_main_action(action),
            View::ConfigList => self.apply_config_list_action(action),
            View::ConfigEdit => self.apply_config_edit_action(action),
            View::SaveName => self.apply_save_name_action(action),
            View::ConfirmDelete | View::ShellSession | View::ConfigViewerSession => {
                AppCommand::None
            }
        }
    }

    fn apply_main_action(&mut self, action: Action) -> AppCommand {
        match action {
            Action::Quit => {
                self.running = false;
                self.status = "Exit requested".to_string();
                AppCommand::None
            }
            Action::Down => {
                self.move_selection(1);
                AppCommand::None
            }
            Action::Up => {
                self.move_selection(-1);
                AppCommand::None
            }
            Action::Top => {
                self.selected = 0;
                AppCommand::None
            }
            Action::Bottom => {
                self.selected = self.rows.len().saturating_sub(1);
                AppCommand::None
            }
            Action::ToggleHelp => {
                self.show_help = !self.show_help;
                AppCommand::None
            }
            Action::Refresh => self.request_refresh(Instant::now()),
            Action::CycleStatusFilter => {
                self.filter.status = self.filter.status.next();
                self.reproject();
                self.status = format!("Status filter: {}", self.filter.status.title());
                AppCommand::None
            }
            Action::CycleSort => {
                self.filter.sort = self.filter.sort.next();
                self.reproject();
                self.status = format!("Sort: {}", self.filter.sort.title());
                AppCommand::None
            }
            Action::ToggleOwnership => {
                self.filter.only_mine = !self.filter.only_mine;
                self.reproject();
                self.status = if self.filter.only_mine {
                    format!("Showing jobs of {}", self.options.identity)
                } else {
                    "Showing all jobs".to_string()
                };
                AppCommand::None
            }
            Action::Delete => self.prepare_delete_confirmation(),
            Action::OpenShell => self.prepare_shell(),
            Action::ViewDocument => {
                let Some(record) = self.selected_record() else {
                    self.status = "No job selected".to_string();
                    return AppCommand::None;
                };
                let name = record.name.clone();
                self.view = View::ConfigViewerSession;
                AppCommand::ViewDocument { name }
            }
            Action::OpenConfigs => AppCommand::LoadConfigList,
            _ => AppCommand::None,
        }
    }

    /// Manual refresh; ignored until the interval since the last successful
    /// refresh has passed.
    fn request_refresh(&mut self, now: Instant) -> AppCommand {
        if let Some(last) = self.last_refresh {
            let elapsed = now.saturating_duration_since(last);
            if elapsed < self.options.refresh_interval {
                let wait = self.options.refresh_interval - elapsed;
                self.status = format!("Refresh skipped, try again in {:.1}s", wait.as_secs_f32());
                return AppCommand::None;
            }
        }
        self.status = "Refreshing…".to_string();
        AppCommand::Refresh
    }

    fn prepare_delete_confirmation(&mut self) -> AppCommand {
        let Some(record) = self.selected_record() else {
            self.status = "No job selected".to_string();
            return AppCommand::None;
        };
        if !record.owned_by(&self.options.identity) {
            let message = ownership_message("delete", record, &self.options.identity);
            self.show_error("Delete rejected", message);
            return AppCommand::None;
        }

        let name = record.name.clone();
        let prompt = format!(
            "Delete job {}/{} (status: {}, owner: {})",
            self.options.namespace,
            name,
            record.status,
            record.owner.as_deref().unwrap_or("-")
        );
        self.pending_confirmation = Some(PendingConfirmation {
            prompt: prompt.clone(),
            command: AppCommand::DeleteWorkload { name },
            return_view: View::Main,
        });
        self.view = View::ConfirmDelete;
        self.status = format!("{prompt}? [y/n]");
        AppCommand::None
    }

    fn prepare_shell(&mut self) -> AppCommand {
        let Some(record) = self.selected_record() else {
            self.status = "No job selected".to_string();
            return AppCommand::None;
        };
        if record.status != WorkloadStatus::Running {
            let message = format!(
                "{} is {}; a shell needs a running job",
                record.name, record.status
            );
            self.show_error("Shell unavailable", message);
            return AppCommand::None;
        }
        if !record.owned_by(&self.options.identity) {
            let message = ownership_message("open a shell in", record, &self.options.identity);
            self.show_error("Shell rejected", message);
            return AppCommand::None;
        }

        let name = record.name.clone();
        self.view = View::ShellSession;
        AppCommand::OpenShell { name }
    }

    fn apply_config_list_action(&mut self, action: Action) -> AppCommand {
        match action {
            Action::Down => {
                self.config_selected = (self.config_selected + 1).min(self.configs.len());
                AppCommand::None
            }
            Action::Up => {
                self.config_selected = self.config_selected.saturating_sub(1);
                AppCommand::None
            }
            Action::Select => match self.selected_config_name() {
                Some(name) => AppCommand::OpenNamedConfig { name },
                None => AppCommand::OpenBaseConfig,
            },
            Action::Delete => {
                let Some(name) = self.selected_config_name() else {
                    self.status = "Select a stored configuration to delete".to_string();
                    return AppCommand::None;
                };
                let prompt = format!("Delete configuration {name}");
                self.pending_confirmation = Some(PendingConfirmation {
                    prompt: prompt.clone(),
                    command: AppCommand::DeleteNamedConfig { name },
                    return_view: View::ConfigList,
                });
                self.view = View::ConfirmDelete;
                self.status = format!("{prompt}? [y/n]");
                AppCommand::None
            }
            Action::Apply => match self.selected_config_name() {
                Some(name) => AppCommand::ApplyNamedConfig { name },
                None => {
                    self.status = "Select a stored configuration to apply".to_string();
                    AppCommand::None
                }
            },
            Action::Back | Action::Quit => {
                self.view = View::Main;
                self.status = "Back to jobs".to_string();
                AppCommand::None
            }
            _ => AppCommand::None,
        }
    }

    fn selected_config_name(&self) -> Option<String> {
        self.config_selected
            .checked_sub(1)
            .and_then(|index| self.configs.get(index))
            .cloned()
    }

    fn apply_config_edit_action(&mut self, action: Action) -> AppCommand {
        let Some(form) = self.form.as_mut() else {
            self.view = View::ConfigList;
            return AppCommand::None;
        };

        if form.editing().is_some() {
            match action {
                Action::InputChar(ch) => form.push_char(ch),
                Action::Backspace => form.pop_char(),
                Action::CancelInput => form.cancel_edit(),
                Action::SubmitInput => {
                    if let Err(error) = form.commit_edit() {
                        self.show_error("Edit rejected", error.to_string());
                    }
                }
                _ => {}
            }
            return AppCommand::None;
        }

        if !matches!(action, Action::Back) {
            self.discard_armed = false;
        }

        match action {
            Action::Down => form.select_next(),
            Action::Up => form.select_previous(),
            Action::Select => {
                if !form.begin_edit()
                    && let Err(error) = form.cycle_choice(true)
                {
                    self.show_error("Edit rejected", error.to_string());
                }
            }
            Action::CycleNext | Action::CyclePrev => {
                if let Err(error) = form.cycle_choice(matches!(action, Action::CycleNext)) {
                    self.show_error("Edit rejected", error.to_string());
                }
            }
            Action::BulkEdit => {
                return AppCommand::BulkEdit {
                    params: form.params().clone(),
                };
            }
            Action::Save => {
                self.name_input = form.source().unwrap_or_default().to_string();
                self.view = View::SaveName;
                self.status = "Enter a configuration name".to_string();
            }
            Action::Apply => {
                return AppCommand::ApplyParameters {
                    params: form.params().clone(),
                };
            }
            Action::Back => {
                if form.modified() && !self.discard_armed {
                    self.discard_armed = true;
                    self.status = "Unsaved changes: press Esc again to discard".to_string();
                    return AppCommand::None;
                }
                self.discard_armed = false;
                self.form = None;
                self.view = View::ConfigList;
                return AppCommand::LoadConfigList;
            }
            _ => {}
        }
        AppCommand::None
    }

    fn apply_save_name_action(&mut self, action: Action) -> AppCommand {
        match action {
            Action::InputChar(ch) => self.name_input.push(ch),
            Action::Backspace => {
                self.name_input.pop();
            }
            Action::CancelInput => {
                self.view = View::ConfigEdit;
                self.status = "Save cancelled".to_string();
            }
            Action::SubmitInput => {
                let name = self.name_input.clone();
                if let Err(error) = validate_name(&name) {
                    self.show_error("Invalid name", error.to_string());
                    return AppCommand::None;
                }
                let Some(form) = self.form.as_ref() else {
                    self.view = View::ConfigList;
                    return AppCommand::None;
                };
                return AppCommand::SaveNamedConfig {
                    name,
                    params: form.params().clone(),
                };
            }
            _ => {}
        }
        AppCommand::None
    }

    fn move_selection(&mut self, delta: isize) {
        if self.rows.is_empty() {
            self.selected = 0;
            return;
        }
        let max = self.rows.len() - 1;
        self.selected = self.selected.saturating_add_signed(delta).min(max);
    }

    fn reproject(&mut self) {
        let previous = self.selected_record().map(|record| record.name.clone());
        self.rows = project(&self.snapshot, &self.filter, &self.options.identity);
        self.selected = previous
            .and_then(|name| self.rows.iter().position(|record| record.name == name))
            .unwrap_or(0)
            .min(self.rows.len().saturating_sub(1));
    }
}

fn ownership_message(verb: &str, record: &WorkloadRecord, identity: &str) -> String {
    match record.owner.as_deref() {
        Some(owner) => format!(
            "Cannot {verb} {}: it belongs to {owner}, you are {identity}",
            record.name
        ),
        None => format!(
            "Cannot {verb} {}: it has no owner label, you are {identity}",
            record.name
        ),
    }
}

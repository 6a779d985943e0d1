mod app;
mod cli;
mod config;
mod editor;
mod input;
mod k8s;
mod model;
mod projection;
mod snapshot;
mod store;
mod summary;
mod template;
mod ui;

use anyhow::{Context, Result, bail};
use app::{App, AppCommand, AppOptions};
use clap::Parser;
use cli::CliArgs;
use config::Settings;
use crossterm::event::{
    Event, EventStream, KeyEventKind, KeyboardEnhancementFlags, PopKeyboardEnhancementFlags,
    PushKeyboardEnhancementFlags,
};
use crossterm::execute;
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
    supports_keyboard_enhancement,
};
use futures::StreamExt;
use k8s::{ClusterClient, KubeCluster};
use k8s_openapi::jiff::Timestamp;
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use snapshot::{build_snapshot, running_pod_for};
use std::fs::{self, OpenOptions};
use std::io::{self, Stdout, Write};
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::sync::Mutex;
use store::ConfigStore;
use template::ParameterSet;
use tokio::process::Command as TokioCommand;
use tracing::{Subscriber, debug, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::MakeWriter;

type TuiTerminal = Terminal<CrosstermBackend<Stdout>>;

const AUDIT_TARGET: &str = "jobdeck::audit";

/// Everything a command may touch outside the dispatcher.
struct Services {
    cluster: KubeCluster,
    store: ConfigStore,
    settings: Settings,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = CliArgs::parse();
    let settings = Settings::load(&args)?;
    init_tracing(&settings.log_filter, settings.log_file.as_deref())?;
    if let Some(source) = &settings.source {
        debug!("loaded settings from {}", source.display());
    }

    let cluster = KubeCluster::connect(settings.namespace.clone(), settings.cluster_timeout)
        .await
        .context("failed to connect to the cluster")?;
    let store = ConfigStore::open(&settings.config_dir)?;
    if let Some(template) = &settings.base_template {
        store.install_base_template(template)?;
    }

    let mut app = App::new(AppOptions {
        identity: settings.identity.clone(),
        namespace: cluster.namespace().to_string(),
        context: cluster.context().to_string(),
        refresh_interval: settings.refresh_interval,
        gpu_parameter: settings.gpu_parameter.clone(),
        gpu_models: settings.gpu_models.clone(),
    });
    info!(
        "starting as {} in {}/{}",
        settings.identity,
        cluster.context(),
        cluster.namespace()
    );

    let services = Services {
        cluster,
        store,
        settings,
    };
    run(&mut app, &services).await
}

fn init_tracing(level_filter: &str, log_file: Option<&Path>) -> Result<()> {
    let filter = EnvFilter::try_new(level_filter)
        .or_else(|_| EnvFilter::try_new("info"))
        .context("failed to initialize tracing filter")?;

    match log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("failed to open log file {}", path.display()))?;
            let _ = tracing::subscriber::set_global_default(file_subscriber(
                filter,
                Mutex::new(file),
            ));
        }
        None => {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_target(false)
                .compact()
                .with_writer(std::io::sink)
                .try_init();
        }
    }

    Ok(())
}

/// File output keeps event targets so audit lines stand apart.
fn file_subscriber<W>(filter: EnvFilter, writer: W) -> impl Subscriber + Send + Sync
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_ansi(false)
        .compact()
        .with_writer(writer)
        .finish()
}

fn audit(action: &str, identity: &str, namespace: &str, subject: &str) {
    info!(
        target: AUDIT_TARGET,
        audit = true,
        identity,
        namespace,
        subject,
        "{action}"
    );
}

async fn run(app: &mut App, services: &Services) -> Result<()> {
    let (mut terminal, keyboard_enhanced) = init_terminal()?;
    let run_result = run_loop(&mut terminal, app, services).await;
    let restore_result = restore_terminal(&mut terminal, keyboard_enhanced);

    match (run_result, restore_result) {
        (Err(run_error), Err(restore_error)) => Err(anyhow::anyhow!(
            "{run_error:#}\nterminal restore error: {restore_error:#}"
        )),
        (Err(error), _) => Err(error),
        (_, Err(error)) => Err(error),
        (Ok(()), Ok(())) => Ok(()),
    }
}

fn init_terminal() -> Result<(TuiTerminal, bool)> {
    enable_raw_mode().context("failed to enable raw mode")?;
    let mut stdout = io::stdout();
    let keyboard_enhanced = matches!(supports_keyboard_enhancement(), Ok(true));
    if keyboard_enhanced {
        execute!(
            stdout,
            EnterAlternateScreen,
            PushKeyboardEnhancementFlags(
                KeyboardEnhancementFlags::DISAMBIGUATE_ESCAPE_CODES
                    | KeyboardEnhancementFlags::REPORT_EVENT_TYPES
            )
        )
        .context("failed to enter alternate screen with keyboard enhancement")?;
    } else {
        execute!(stdout, EnterAlternateScreen).context("failed to enter alternate screen")?;
    }
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("failed to create terminal backend")?;
    terminal.clear().context("failed to clear terminal")?;
    Ok((terminal, keyboard_enhanced))
}

fn restore_terminal(terminal: &mut TuiTerminal, keyboard_enhanced: bool) -> Result<()> {
    if keyboard_enhanced {
        execute!(terminal.backend_mut(), PopKeyboardEnhancementFlags)
            .context("failed to pop keyboard enhancement flags")?;
    }
    disable_raw_mode().context("failed to disable raw mode")?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)
        .context("failed to leave alternate screen")?;
    terminal.show_cursor().context("failed to show cursor")?;
    Ok(())
}

async fn run_loop(terminal: &mut TuiTerminal, app: &mut App, services: &Services) -> Result<()> {
    app.set_status("Loading jobs…");
    terminal
        .draw(|frame| ui::render(frame, app))
        .context("failed to render terminal frame")?;
    refresh_jobs(app, services).await;

    let mut reader = EventStream::new();

    loop {
        terminal
            .draw(|frame| ui::render(frame, app))
            .context("failed to render terminal frame")?;

        if !app.running() {
            break;
        }

        match reader.next().await {
            Some(Ok(Event::Key(key))) if key.kind == KeyEventKind::Press => {
                if let Some(action) = input::map_key(app.mode(), key) {
                    debug!("action={action:?}");
                    let command = app.apply_action(action);
                    terminal
                        .draw(|frame| ui::render(frame, app))
                        .context("failed to render terminal frame")?;
                    execute_app_command(terminal, app, services, command).await;
                }
            }
            Some(Ok(_)) => {}
            Some(Err(error)) => {
                app.set_status(format!("terminal event error: {error}"));
            }
            None => {
                app.set_status("terminal event stream closed");
                break;
            }
        }
    }

    Ok(())
}

async fn execute_app_command(
    terminal: &mut TuiTerminal,
    app: &mut App,
    services: &Services,
    command: AppCommand,
) {
    match command {
        AppCommand::None => {}
        AppCommand::Refresh => refresh_jobs(app, services).await,
        AppCommand::DeleteWorkload { name } => {
            match services.cluster.delete_job(&name).await {
                Ok(()) => {
                    audit(
                        "job deleted",
                        app.identity(),
                        services.cluster.namespace(),
                        &name,
                    );
                    app.set_status(format!("Deleted job {name}"));
                    refresh_jobs(app, services).await;
                }
                Err(error) => {
                    warn!("delete of {name} failed: {error:#}");
                    app.show_error("Delete failed", compact_error(&error));
                }
            }
        }
        AppCommand::OpenShell { name } => {
            let result = open_shell(terminal, app, services, &name).await;
            app.finish_session();
            match result {
                Ok(status) => {
                    if !status.success() {
                        debug!("shell into {name} exited with {status}");
                    }
                    app.set_status(shell_end_status(&name, status));
                    refresh_jobs(app, services).await;
                }
                Err(error) => {
                    warn!("shell into {name} failed: {error:#}");
                    refresh_jobs(app, services).await;
                    app.show_error("Shell failed", compact_error(&error));
                }
            }
        }
        AppCommand::ViewDocument { name } => {
            let result = view_job_document(terminal, services, &name).await;
            app.finish_session();
            match result {
                Ok(()) => app.set_status(format!("Closed {name}")),
                Err(error) => app.show_error("Viewer failed", compact_error(&error)),
            }
        }
        AppCommand::LoadConfigList => match services.store.list() {
            Ok(names) => {
                app.set_status(format!("{} stored configurations", names.len()));
                app.set_config_list(names);
            }
            Err(error) => app.show_error("Configurations unavailable", compact_error(&error)),
        },
        AppCommand::OpenBaseConfig => match services.store.base_template() {
            Ok(template) => app.open_form(template.extract_parameters(), None),
            Err(error) => app.show_error("Base template unavailable", compact_error(&error)),
        },
        AppCommand::OpenNamedConfig { name } => {
            let loaded = services.store.base_template().and_then(|template| {
                services
                    .store
                    .load_reconciled(&name, &template.extract_parameters())
            });
            match loaded {
                Ok(params) => app.open_form(params, Some(name)),
                Err(error) => app.show_error("Configuration unavailable", compact_error(&error)),
            }
        }
        AppCommand::DeleteNamedConfig { name } => {
            let result = services
                .store
                .delete(&name)
                .and_then(|()| services.store.list());
            match result {
                Ok(names) => {
                    info!("deleted configuration {name}");
                    app.set_config_list(names);
                    app.set_status(format!("Deleted configuration {name}"));
                }
                Err(error) => app.show_error("Delete failed", compact_error(&error)),
            }
        }
        AppCommand::SaveNamedConfig { name, params } => {
            match services.store.save(&name, &params) {
                Ok(()) => app.finish_save(&name),
                Err(error) => app.show_error("Save failed", compact_error(&error)),
            }
        }
        AppCommand::ApplyParameters { params } => {
            apply_and_refresh(app, services, &params, None).await;
        }
        AppCommand::ApplyNamedConfig { name } => {
            let loaded = services.store.base_template().and_then(|template| {
                services
                    .store
                    .load_reconciled(&name, &template.extract_parameters())
            });
            match loaded {
                Ok(params) => apply_and_refresh(app, services, &params, Some(&name)).await,
                Err(error) => app.show_error("Configuration unavailable", compact_error(&error)),
            }
        }
        AppCommand::BulkEdit { params } => {
            match bulk_edit(terminal, &services.settings.editor, &params).await {
                Ok(text) => app.apply_bulk_edit(&text),
                Err(error) => app.show_error("Bulk edit failed", compact_error(&error)),
            }
        }
    }
}

/// Rebuilds the snapshot; a failure keeps the previous rows on screen.
async fn refresh_jobs(app: &mut App, services: &Services) {
    let now = Timestamp::now().as_second();
    match build_snapshot(&services.cluster, &services.settings.owner_label, now).await {
        Ok(records) => {
            debug!("snapshot holds {} jobs", records.len());
            app.set_snapshot(records);
        }
        Err(error) => {
            warn!("refresh failed: {error:#}");
            app.set_status("Refresh failed");
            app.show_error("Refresh failed", compact_error(&error));
        }
    }
}

async fn open_shell(
    terminal: &mut TuiTerminal,
    app: &App,
    services: &Services,
    name: &str,
) -> Result<ExitStatus> {
    let pods = services.cluster.list_pods().await?;
    let Some(pod_name) = running_pod_for(&pods, name) else {
        bail!("job {name} has no running pod");
    };

    audit(
        "shell entered",
        app.identity(),
        services.cluster.namespace(),
        &format!("{name} pod={pod_name}"),
    );
    run_kubectl_shell(
        terminal,
        services.cluster.namespace(),
        &pod_name,
        &services.settings.shell,
    )
    .await
}

async fn view_job_document(
    terminal: &mut TuiTerminal,
    services: &Services,
    name: &str,
) -> Result<()> {
    let mut job = services.cluster.get_job(name).await?;
    job.metadata.managed_fields = None;
    let yaml = serde_yaml::to_string(&job).context("failed to serialize job")?;

    let mut file = tempfile::Builder::new()
        .prefix(&format!("jobdeck-{name}-"))
        .suffix(".yaml")
        .tempfile()
        .context("failed to create temporary file")?;
    file.write_all(yaml.as_bytes())
        .context("failed to write temporary file")?;

    run_local_editor(terminal, &services.settings.viewer, file.path()).await
}

/// Hands the parameters to the external editor and returns the edited text.
async fn bulk_edit(
    terminal: &mut TuiTerminal,
    editor: &str,
    params: &ParameterSet,
) -> Result<String> {
    let yaml = params.to_yaml()?;
    let mut file = tempfile::Builder::new()
        .prefix("jobdeck-params-")
        .suffix(".yaml")
        .tempfile()
        .context("failed to create temporary file")?;
    file.write_all(yaml.as_bytes())
        .context("failed to write temporary file")?;

    run_local_editor(terminal, editor, file.path()).await?;
    fs::read_to_string(file.path()).context("failed to read edited parameters")
}

/// Renders the base template with `params` and applies every document in
/// order. Nothing reaches the cluster unless the whole template renders.
async fn apply_and_refresh(
    app: &mut App,
    services: &Services,
    params: &ParameterSet,
    config_name: Option<&str>,
) {
    let documents = match services.store.base_template().and_then(|template| {
        template
            .normalize()
            .materialize(params)
            .context("failed to render base template")
    }) {
        Ok(documents) => documents,
        Err(error) => {
            app.show_error("Apply aborted", compact_error(&error));
            return;
        }
    };

    let total = documents.len();
    let mut applied = Vec::with_capacity(total);
    for document in &documents {
        match services.cluster.apply_document(document).await {
            Ok(resource) => applied.push(resource),
            Err(error) => {
                warn!("apply failed after {} of {total} documents: {error:#}", applied.len());
                refresh_jobs(app, services).await;
                app.show_error(
                    "Apply failed",
                    format!(
                        "applied {} of {total} documents\n{}",
                        applied.len(),
                        compact_error(&error)
                    ),
                );
                return;
            }
        }
    }

    audit(
        "configuration applied",
        app.identity(),
        services.cluster.namespace(),
        &format!(
            "{} resources={}",
            config_name.unwrap_or("unsaved"),
            applied.join(",")
        ),
    );
    app.finish_apply(format!("Applied {}", applied.join(", ")));
    refresh_jobs(app, services).await;
}

/// Returns the remote shell's exit status; only a failed launch is an error.
async fn run_kubectl_shell(
    terminal: &mut TuiTerminal,
    namespace: &str,
    pod_name: &str,
    shell: &str,
) -> Result<ExitStatus> {
    suspend_terminal_for_subprocess(terminal)?;

    let mut cmd = TokioCommand::new("kubectl");
    cmd.arg("exec")
        .arg("-it")
        .arg("-n")
        .arg(namespace)
        .arg(pod_name)
        .arg("--")
        .arg(shell)
        .stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit());

    let run_result = cmd
        .status()
        .await
        .with_context(|| format!("failed to run kubectl shell for {namespace}/{pod_name}"));
    let restore_result = resume_terminal_after_subprocess(terminal);

    let status = match (run_result, restore_result) {
        (Err(run_error), Err(restore_error)) => {
            return Err(anyhow::anyhow!(
                "{run_error:#}\nterminal resume error: {restore_error:#}"
            ));
        }
        (Err(error), _) => return Err(error),
        (_, Err(error)) => return Err(error),
        (Ok(status), Ok(())) => status,
    };

    Ok(status)
}

fn shell_end_status(name: &str, status: ExitStatus) -> String {
    match status.code() {
        Some(0) => format!("Shell session for {name} ended"),
        Some(code) => format!("Shell session for {name} ended (exit code {code})"),
        None => format!("Shell session for {name} ended ({status})"),
    }
}

/// Runs `command_line` (program plus arguments) on `path` in the foreground.
async fn run_local_editor(
    terminal: &mut TuiTerminal,
    command_line: &str,
    path: &Path,
) -> Result<()> {
    let mut parts = command_line.split_whitespace();
    let Some(program) = parts.next() else {
        bail!("no editor command configured");
    };

    suspend_terminal_for_subprocess(terminal)?;

    let mut cmd = TokioCommand::new(program);
    cmd.args(parts)
        .arg(path)
        .stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit());

    let run_result = cmd
        .status()
        .await
        .with_context(|| format!("failed to run {program} on {}", path.display()));
    let restore_result = resume_terminal_after_subprocess(terminal);

    let status = match (run_result, restore_result) {
        (Err(run_error), Err(restore_error)) => {
            return Err(anyhow::anyhow!(
                "{run_error:#}\nterminal resume error: {restore_error:#}"
            ));
        }
        (Err(error), _) => return Err(error),
        (_, Err(error)) => return Err(error),
        (Ok(status), Ok(())) => status,
    };

    if status.success() {
        Ok(())
    } else {
        Err(anyhow::anyhow!("{program} exited with {status}"))
    }
}

fn suspend_terminal_for_subprocess(terminal: &mut TuiTerminal) -> Result<()> {
    disable_raw_mode().context("failed to disable raw mode for subprocess")?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)
        .context("failed to leave alternate screen for subprocess")?;
    terminal
        .show_cursor()
        .context("failed to show cursor for subprocess")?;
    Ok(())
}

fn resume_terminal_after_subprocess(terminal: &mut TuiTerminal) -> Result<()> {
    enable_raw_mode().context("failed to re-enable raw mode after subprocess")?;
    execute!(terminal.backend_mut(), EnterAlternateScreen)
        .context("failed to re-enter alternate screen after subprocess")?;
    terminal
        .clear()
        .context("failed to clear terminal after subprocess")?;
    Ok(())
}

fn compact_error(error: &anyhow::Error) -> String {
    let mut out = Vec::new();
    for (index, cause) in error.chain().enumerate() {
        if index == 0 {
            out.push(cause.to_string());
        } else if index <= 2 {
            out.push(format!("caused by: {cause}"));
        } else {
            break;
        }
    }

    out.join("\n")
}

#[cfg(test)]
mod tests {
    use super::{audit, compact_error, file_subscriber, shell_end_status};
    use anyhow::anyhow;
    use std::io::{self, Write};
    use std::sync::{Arc, Mutex};
    use tracing_subscriber::EnvFilter;

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().expect("lock").extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn audit_lines_carry_target_and_marker() {
        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = file_subscriber(EnvFilter::new("info"), move || writer.clone());
        tracing::subscriber::with_default(subscriber, || {
            audit("job deleted", "alice", "research", "alice-train");
        });

        let output = String::from_utf8(captured.0.lock().expect("lock").clone()).expect("utf8");
        assert!(output.contains("jobdeck::audit"), "{output}");
        assert!(output.contains("audit=true"), "{output}");
        assert!(output.contains("job deleted"), "{output}");
        assert!(output.contains("alice-train"), "{output}");
    }

    #[cfg(unix)]
    #[test]
    fn nonzero_shell_exit_is_reported_as_status_only() {
        use std::os::unix::process::ExitStatusExt;
        use std::process::ExitStatus;

        assert_eq!(
            shell_end_status("alice-train", ExitStatus::from_raw(0)),
            "Shell session for alice-train ended"
        );
        assert_eq!(
            shell_end_status("alice-train", ExitStatus::from_raw(1 << 8)),
            "Shell session for alice-train ended (exit code 1)"
        );
    }

    #[test]
    fn compact_error_keeps_two_causes() {
        let error = anyhow!("root")
            .context("middle")
            .context("outer")
            .context("top");
        assert_eq!(
            compact_error(&error),
            "top\ncaused by: outer\ncaused by: middle"
        );
    }
}

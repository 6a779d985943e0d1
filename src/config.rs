use crate::cli::CliArgs;
use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_OWNER_LABEL: &str = "jobdeck/user";
const DEFAULT_REFRESH_INTERVAL_MS: u64 = 2_000;
const DEFAULT_CLUSTER_TIMEOUT_SECS: u64 = 5;
const DEFAULT_VIEWER: &str = "vim -R";
const DEFAULT_SHELL: &str = "bash";
const DEFAULT_GPU_PARAMETER: &str = "GPU_PRODUCT";
const DEFAULT_GPU_MODELS: [&str; 4] = [
    "NVIDIA-H200",
    "NVIDIA-H100-80GB-HBM3",
    "NVIDIA-A100-SXM4-80GB",
    "NVIDIA-A100-SXM4-40GB-MIG-3g.20gb",
];

/// Fully resolved settings: CLI flags over the settings file over defaults.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Settings {
    pub source: Option<PathBuf>,
    pub namespace: Option<String>,
    pub identity: String,
    pub owner_label: String,
    pub config_dir: PathBuf,
    pub base_template: Option<PathBuf>,
    pub refresh_interval: Duration,
    pub cluster_timeout: Duration,
    pub editor: String,
    pub viewer: String,
    pub shell: String,
    pub gpu_parameter: String,
    pub gpu_models: Vec<String>,
    pub log_filter: String,
    pub log_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
struct SettingsFile {
    namespace: Option<String>,
    identity: Option<String>,
    owner_label: Option<String>,
    config_dir: Option<PathBuf>,
    #[serde(alias = "refresh_ms")]
    refresh_interval_ms: Option<u64>,
    #[serde(alias = "timeout_secs")]
    cluster_timeout_secs: Option<u64>,
    editor: Option<String>,
    viewer: Option<String>,
    shell: Option<String>,
    gpu_parameter: Option<String>,
    gpu_models: Option<Vec<String>>,
    log_file: Option<PathBuf>,
}

/// Process environment values the resolution depends on.
#[derive(Debug, Clone, Default)]
struct Environment {
    user: Option<String>,
    home: Option<PathBuf>,
    editor: Option<String>,
}

impl Environment {
    fn current() -> Self {
        Self {
            user: non_empty_var("USER"),
            home: non_empty_var("HOME").map(PathBuf::from),
            editor: non_empty_var("EDITOR"),
        }
    }
}

impl Settings {
    pub fn load(args: &CliArgs) -> Result<Self> {
        let source = discover_config_path();
        let file = match &source {
            Some(path) => {
                let raw = fs::read_to_string(path)
                    .with_context(|| format!("failed to read settings {}", path.display()))?;
                parse_settings(&raw)
                    .with_context(|| format!("failed to parse settings {}", path.display()))?
            }
            None => SettingsFile::default(),
        };

        let mut settings = resolve(args, file, &Environment::current())?;
        settings.source = source;
        Ok(settings)
    }
}

fn parse_settings(raw: &str) -> Result<SettingsFile> {
    Ok(serde_yaml::from_str::<Option<SettingsFile>>(raw)?.unwrap_or_default())
}

fn resolve(args: &CliArgs, file: SettingsFile, env: &Environment) -> Result<Settings> {
    let identity = args
        .identity
        .clone()
        .or(file.identity)
        .or_else(|| env.user.clone())
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .context("cannot determine identity; pass --identity or set USER")?;

    let config_dir = match args.config_dir.clone().or(file.config_dir) {
        Some(dir) => dir,
        None => match &env.home {
            Some(home) => home.join(".jobdeck"),
            None => bail!("cannot locate config directory; pass --config-dir or set HOME"),
        },
    };

    let gpu_models = file
        .gpu_models
        .filter(|models| !models.is_empty())
        .unwrap_or_else(|| DEFAULT_GPU_MODELS.iter().map(|m| m.to_string()).collect());

    Ok(Settings {
        source: None,
        namespace: args.namespace.clone().or(file.namespace),
        identity,
        owner_label: file
            .owner_label
            .unwrap_or_else(|| DEFAULT_OWNER_LABEL.to_string()),
        config_dir,
        base_template: args.base_template.clone(),
        refresh_interval: Duration::from_millis(
            args.refresh_interval_ms
                .or(file.refresh_interval_ms)
                .unwrap_or(DEFAULT_REFRESH_INTERVAL_MS),
        ),
        cluster_timeout: Duration::from_secs(
            file.cluster_timeout_secs
                .unwrap_or(DEFAULT_CLUSTER_TIMEOUT_SECS)
                .max(1),
        ),
        editor: file
            .editor
            .or_else(|| env.editor.clone())
            .unwrap_or_else(|| "vim".to_string()),
        viewer: file.viewer.unwrap_or_else(|| DEFAULT_VIEWER.to_string()),
        shell: file.shell.unwrap_or_else(|| DEFAULT_SHELL.to_string()),
        gpu_parameter: file
            .gpu_parameter
            .unwrap_or_else(|| DEFAULT_GPU_PARAMETER.to_string()),
        gpu_models,
        log_filter: args.log_filter.clone(),
        log_file: args.log_file.clone().or(file.log_file),
    })
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .filter(|value| !value.trim().is_empty())
}

fn discover_config_path() -> Option<PathBuf> {
    if let Some(path) = non_empty_var("JOBDECK_CONFIG") {
        return Some(PathBuf::from(path));
    }

    let cwd_candidates = [
        PathBuf::from("jobdeck.yaml"),
        PathBuf::from("jobdeck.yml"),
        PathBuf::from(".jobdeck.yaml"),
    ];
    for candidate in cwd_candidates {
        if candidate.is_file() {
            return Some(candidate);
        }
    }

    if let Some(home) = non_empty_var("HOME") {
        let user_candidates = [
            PathBuf::from(&home).join(".config/jobdeck/config.yaml"),
            PathBuf::from(&home).join(".config/jobdeck/config.yml"),
        ];
        for candidate in user_candidates {
            if candidate.is_file() {
                return Some(candidate);
            }
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::{Environment, SettingsFile, parse_settings, resolve};
    use crate::cli::CliArgs;
    use std::path::PathBuf;
    use std::time::Duration;

    fn env() -> Environment {
        Environment {
            user: Some("alice".to_string()),
            home: Some(PathBuf::from("/home/alice")),
            editor: None,
        }
    }

    fn args() -> CliArgs {
        CliArgs {
            log_filter: "info".to_string(),
            ..CliArgs::default()
        }
    }

    #[test]
    fn defaults_come_from_environment() {
        let settings = resolve(&args(), SettingsFile::default(), &env()).expect("resolves");
        assert_eq!(settings.identity, "alice");
        assert_eq!(settings.config_dir, PathBuf::from("/home/alice/.jobdeck"));
        assert_eq!(settings.owner_label, "jobdeck/user");
        assert_eq!(settings.refresh_interval, Duration::from_millis(2_000));
        assert_eq!(settings.cluster_timeout, Duration::from_secs(5));
        assert_eq!(settings.editor, "vim");
        assert_eq!(settings.viewer, "vim -R");
        assert_eq!(settings.gpu_models.len(), 4);
        assert_eq!(settings.namespace, None);
    }

    #[test]
    fn cli_flags_override_file_values() {
        let file = parse_settings(
            "namespace: research\nidentity: bob\nrefresh_interval_ms: 5000\nconfig_dir: /srv/jobdeck\n",
        )
        .expect("parses");
        let cli = CliArgs {
            namespace: Some("sandbox".to_string()),
            refresh_interval_ms: Some(750),
            ..args()
        };
        let settings = resolve(&cli, file, &env()).expect("resolves");
        assert_eq!(settings.namespace.as_deref(), Some("sandbox"));
        assert_eq!(settings.identity, "bob");
        assert_eq!(settings.refresh_interval, Duration::from_millis(750));
        assert_eq!(settings.config_dir, PathBuf::from("/srv/jobdeck"));
    }

    #[test]
    fn file_customizes_gpu_choices_and_commands() {
        let file = parse_settings(
            "gpu_parameter: ACCELERATOR\ngpu_models: [NVIDIA-H200]\nshell: /bin/sh\neditor: nano\n",
        )
        .expect("parses");
        let settings = resolve(&args(), file, &env()).expect("resolves");
        assert_eq!(settings.gpu_parameter, "ACCELERATOR");
        assert_eq!(settings.gpu_models, vec!["NVIDIA-H200".to_string()]);
        assert_eq!(settings.shell, "/bin/sh");
        assert_eq!(settings.editor, "nano");
    }

    #[test]
    fn empty_settings_file_is_default() {
        let file = parse_settings("").expect("parses");
        assert!(file.namespace.is_none());
    }

    #[test]
    fn unknown_settings_keys_are_rejected() {
        assert!(parse_settings("refresh: 10\n").is_err());
    }

    #[test]
    fn missing_identity_is_an_error() {
        let environment = Environment {
            user: None,
            ..env()
        };
        assert!(resolve(&args(), SettingsFile::default(), &environment).is_err());
    }

    #[test]
    fn missing_home_requires_explicit_config_dir() {
        let environment = Environment {
            home: None,
            ..env()
        };
        assert!(resolve(&args(), SettingsFile::default(), &environment).is_err());

        let cli = CliArgs {
            config_dir: Some(PathBuf::from("/tmp/jobdeck")),
            ..args()
        };
        let settings = resolve(&cli, SettingsFile::default(), &environment).expect("resolves");
        assert_eq!(settings.config_dir, PathBuf::from("/tmp/jobdeck"));
    }
}

//! Startup settings: command line and environment first, then the optional
//! KDL config file, then built-in defaults.
//!
//! ```kdl
//! endpoint "vcenter.lab.local"
//! username "administrator@vsphere.local"
//! password "secret"
//! backend "vsphere"
//! insecure #true
//! task-timeout 300
//! shutdown-timeout 180
//! poll-interval 1
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::ValueEnum;
use kdl::{KdlDocument, KdlNode, KdlValue};
use miette::{IntoDiagnostic, Result};
use tracing::{debug, info};
use vc_manager::shutdown::{DEFAULT_DEADLINE, DEFAULT_POLL_INTERVAL};
use vc_manager::{Credentials, PowerExecutor, ShutdownPoller, TaskWaiter};

use crate::cli::{BackendKind, Cli};

/// Built-in endpoint used with `--default`: a local vSphere API simulator.
pub const DEFAULT_ENDPOINT: &str = "127.0.0.1:8989";
pub const DEFAULT_USERNAME: &str = "user";
pub const DEFAULT_PASSWORD: &str = "pass";

const DEFAULT_TASK_TIMEOUT: Duration = Duration::from_secs(300);

/// Values read from the config file. Every field is optional.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FileConfig {
    pub endpoint: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub backend: Option<BackendKind>,
    pub insecure: Option<bool>,
    pub inventory: Option<PathBuf>,
    pub task_timeout: Option<u64>,
    pub shutdown_timeout: Option<u64>,
    pub poll_interval: Option<u64>,
}

/// Fully resolved settings for one run.
#[derive(Debug, Clone)]
pub struct Settings {
    pub backend: BackendKind,
    pub credentials: Option<Credentials>,
    pub insecure: bool,
    pub inventory: Option<PathBuf>,
    pub executor: PowerExecutor,
}

fn default_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("vcctl").join("config.kdl"))
}

impl FileConfig {
    /// Load `explicit`, or the default location if it exists.
    pub async fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = match explicit {
            Some(path) => path.to_path_buf(),
            None => match default_path() {
                Some(path) if path.exists() => path,
                _ => {
                    debug!("no config file found, using defaults");
                    return Ok(Self::default());
                }
            },
        };

        let text = tokio::fs::read_to_string(&path)
            .await
            .into_diagnostic()
            .map_err(|e| e.wrap_err(format!("reading config {}", path.display())))?;
        let config = Self::parse(&text)
            .map_err(|e| e.wrap_err(format!("parsing config {}", path.display())))?;
        info!(path = %path.display(), "loaded config file");
        Ok(config)
    }

    pub fn parse(text: &str) -> Result<Self> {
        let doc: KdlDocument = text.parse()?;
        let mut config = Self::default();

        for node in doc.nodes() {
            let name = node.name().value();
            match name {
                "endpoint" => config.endpoint = Some(string_arg(node)?),
                "username" => config.username = Some(string_arg(node)?),
                "password" => config.password = Some(string_arg(node)?),
                "inventory" => config.inventory = Some(PathBuf::from(string_arg(node)?)),
                "insecure" => config.insecure = Some(bool_arg(node)?),
                "backend" => {
                    let value = string_arg(node)?;
                    config.backend = Some(
                        BackendKind::from_str(&value, true)
                            .map_err(|e| miette::miette!("backend: {e}"))?,
                    );
                }
                "task-timeout" => config.task_timeout = Some(secs_arg(node)?),
                "shutdown-timeout" => config.shutdown_timeout = Some(secs_arg(node)?),
                "poll-interval" => config.poll_interval = Some(secs_arg(node)?),
                other => miette::bail!("unknown config setting `{other}`"),
            }
        }

        Ok(config)
    }
}

fn first_arg(node: &KdlNode) -> Option<&KdlValue> {
    node.entries()
        .iter()
        .find(|e| e.name().is_none())
        .map(|e| e.value())
}

fn string_arg(node: &KdlNode) -> Result<String> {
    first_arg(node)
        .and_then(|v| v.as_string())
        .map(str::to_string)
        .ok_or_else(|| miette::miette!("`{}` needs a string value", node.name().value()))
}

fn bool_arg(node: &KdlNode) -> Result<bool> {
    first_arg(node)
        .and_then(|v| v.as_bool())
        .ok_or_else(|| miette::miette!("`{}` needs #true or #false", node.name().value()))
}

fn secs_arg(node: &KdlNode) -> Result<u64> {
    first_arg(node)
        .and_then(|v| v.as_integer())
        .and_then(|v| u64::try_from(v).ok())
        .ok_or_else(|| {
            miette::miette!(
                "`{}` needs a non-negative number of seconds",
                node.name().value()
            )
        })
}

impl Settings {
    pub fn resolve(cli: &Cli, file: FileConfig) -> Result<Self> {
        let backend = cli
            .backend
            .or(file.backend)
            .unwrap_or(BackendKind::Vsphere);

        let (credentials, insecure) = if cli.default {
            (
                Some(Credentials {
                    endpoint: DEFAULT_ENDPOINT.into(),
                    username: DEFAULT_USERNAME.into(),
                    password: DEFAULT_PASSWORD.into(),
                }),
                true,
            )
        } else {
            let endpoint = cli.ip.clone().or(file.endpoint);
            let username = cli.username.clone().or(file.username);
            let password = cli.password.clone().or(file.password);
            let credentials = match (endpoint, username, password) {
                (Some(endpoint), Some(username), Some(password)) => Some(Credentials {
                    endpoint,
                    username,
                    password,
                }),
                _ => None,
            };
            (credentials, cli.insecure || file.insecure.unwrap_or(false))
        };

        if backend == BackendKind::Vsphere && credentials.is_none() {
            return Err(miette::miette!(
                help = "pass --ip, --username and --password (or -ip=, -username=, -password=), \
                        set them in the config file, or use --default",
                "no endpoint credentials given"
            ));
        }

        let task_timeout = cli
            .task_timeout
            .or(file.task_timeout)
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_TASK_TIMEOUT);
        let deadline = cli
            .shutdown_timeout
            .or(file.shutdown_timeout)
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_DEADLINE);
        let interval = cli
            .poll_interval
            .or(file.poll_interval)
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_POLL_INTERVAL);

        let executor = PowerExecutor::new(
            TaskWaiter {
                timeout: task_timeout,
                ..TaskWaiter::default()
            },
            ShutdownPoller::new(interval, deadline)?,
        );

        Ok(Self {
            backend,
            credentials,
            insecure,
            inventory: cli.inventory.clone().or(file.inventory),
            executor,
        })
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    fn cli(args: &[&str]) -> Cli {
        Cli::parse_from(std::iter::once("vcctl").chain(args.iter().copied()))
    }

    #[test]
    fn parse_config_file() {
        let config = FileConfig::parse(
            r#"
endpoint "vc.lab.local"
username "admin"
password "pw"
backend "SIM"
insecure #true
task-timeout 60
poll-interval 2
"#,
        )
        .unwrap();
        assert_eq!(config.endpoint.as_deref(), Some("vc.lab.local"));
        assert_eq!(config.backend, Some(BackendKind::Sim));
        assert_eq!(config.insecure, Some(true));
        assert_eq!(config.task_timeout, Some(60));
        assert_eq!(config.poll_interval, Some(2));
        assert_eq!(config.shutdown_timeout, None);
    }

    #[test]
    fn parse_rejects_unknown_settings() {
        assert!(FileConfig::parse("colour \"blue\"").is_err());
        assert!(FileConfig::parse("task-timeout -5").is_err());
        assert!(FileConfig::parse("backend \"hyperv\"").is_err());
    }

    #[tokio::test]
    async fn load_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.kdl");
        tokio::fs::write(&path, "backend \"sim\"\nshutdown-timeout 30\n")
            .await
            .unwrap();

        let config = FileConfig::load(Some(&path)).await.unwrap();
        assert_eq!(config.backend, Some(BackendKind::Sim));
        assert_eq!(config.shutdown_timeout, Some(30));

        assert!(FileConfig::load(Some(&dir.path().join("missing.kdl"))).await.is_err());
    }

    #[test]
    fn command_line_wins_over_file() {
        let file = FileConfig {
            endpoint: Some("file.local".into()),
            username: Some("file-user".into()),
            password: Some("file-pw".into()),
            task_timeout: Some(10),
            ..FileConfig::default()
        };
        let settings = Settings::resolve(
            &cli(&["--ip", "10.0.0.5", "--task-timeout", "20"]),
            file,
        )
        .unwrap();

        let creds = settings.credentials.unwrap();
        assert_eq!(creds.endpoint, "10.0.0.5");
        assert_eq!(creds.username, "file-user");
        assert_eq!(settings.executor.waiter.timeout, Duration::from_secs(20));
        assert_eq!(settings.executor.shutdown.deadline(), DEFAULT_DEADLINE);
        assert_eq!(settings.executor.shutdown.interval(), DEFAULT_POLL_INTERVAL);
    }

    #[test]
    fn default_flag_replaces_supplied_credentials() {
        let settings = Settings::resolve(
            &cli(&["--ip", "10.0.0.5", "--username", "u", "--password", "p", "--default"]),
            FileConfig::default(),
        )
        .unwrap();
        let creds = settings.credentials.unwrap();
        assert_eq!(creds.endpoint, DEFAULT_ENDPOINT);
        assert_eq!(creds.username, DEFAULT_USERNAME);
        assert!(settings.insecure);
    }

    #[test]
    fn vsphere_needs_credentials_but_sim_does_not() {
        assert!(Settings::resolve(&cli(&["--ip", "10.0.0.5"]), FileConfig::default()).is_err());

        let settings = Settings::resolve(&cli(&["--backend", "sim"]), FileConfig::default()).unwrap();
        assert_eq!(settings.backend, BackendKind::Sim);
        assert!(settings.credentials.is_none());
    }

    #[test]
    fn zero_poll_interval_is_rejected() {
        assert!(
            Settings::resolve(
                &cli(&["--backend", "sim", "--poll-interval", "0"]),
                FileConfig::default()
            )
            .is_err()
        );
    }
}

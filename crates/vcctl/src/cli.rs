use std::ffi::OsString;
use std::path::PathBuf;

use clap::{ArgAction, Parser, ValueEnum};

/// Options that older scripts pass in single-dash `-name=value` form.
const LEGACY_OPTIONS: &[&str] = &["ip", "username", "password", "default"];

#[derive(Parser, Debug)]
#[command(
    name = "vcctl",
    about = "Interactive console for a virtualization management server",
    version
)]
pub struct Cli {
    /// Management server address (host or host:port)
    #[arg(long, env = "VCCTL_IP")]
    pub ip: Option<String>,

    /// Login user
    #[arg(long, env = "VCCTL_USERNAME")]
    pub username: Option<String>,

    /// Login password
    #[arg(long, env = "VCCTL_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Ignore --ip/--username/--password and use the built-in endpoint
    #[arg(
        long,
        action = ArgAction::Set,
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "true",
        default_value_t = false
    )]
    pub default: bool,

    /// Backend serving the session
    #[arg(long, value_enum)]
    pub backend: Option<BackendKind>,

    /// Inventory file for the sim backend
    #[arg(long)]
    pub inventory: Option<PathBuf>,

    /// Accept self-signed server certificates
    #[arg(long)]
    pub insecure: bool,

    /// Config file (defaults to <config dir>/vcctl/config.kdl)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Seconds to wait for a power-on/off task before giving up
    #[arg(long)]
    pub task_timeout: Option<u64>,

    /// Seconds to wait for a guest shutdown to power the VM off
    #[arg(long)]
    pub shutdown_timeout: Option<u64>,

    /// Seconds between power-state polls during a guest shutdown
    #[arg(long)]
    pub poll_interval: Option<u64>,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum BackendKind {
    Vsphere,
    Sim,
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse_from(normalize_legacy_args(std::env::args_os()))
    }
}

/// Rewrite `-ip=x`, `-username=x`, `-password=x` and `-default=b` into
/// their double-dash equivalents. Everything else passes through untouched.
pub fn normalize_legacy_args<I>(args: I) -> Vec<OsString>
where
    I: IntoIterator<Item = OsString>,
{
    args.into_iter()
        .map(|arg| {
            let rewritten = arg.to_str().and_then(|s| {
                let rest = s.strip_prefix('-').filter(|r| !r.starts_with('-'))?;
                let (name, _) = rest.split_once('=')?;
                LEGACY_OPTIONS
                    .contains(&name)
                    .then(|| OsString::from(format!("-{s}")))
            });
            rewritten.unwrap_or(arg)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::parse_from(normalize_legacy_args(args.iter().map(OsString::from)))
    }

    #[test]
    fn legacy_single_dash_options() {
        let cli = parse(&[
            "vcctl",
            "-ip=130.65.159.14",
            "-username=admin@vsphere.local",
            "-password=secret",
            "-default=false",
        ]);
        assert_eq!(cli.ip.as_deref(), Some("130.65.159.14"));
        assert_eq!(cli.username.as_deref(), Some("admin@vsphere.local"));
        assert_eq!(cli.password.as_deref(), Some("secret"));
        assert!(!cli.default);

        assert!(parse(&["vcctl", "-default=true"]).default);
    }

    #[test]
    fn default_flag_forms() {
        assert!(parse(&["vcctl", "--default"]).default);
        assert!(parse(&["vcctl", "--default=true"]).default);
        assert!(!parse(&["vcctl"]).default);
    }

    #[test]
    fn other_arguments_pass_through() {
        let args = normalize_legacy_args(
            ["vcctl", "--backend", "sim", "-x=1", "--ip=1.2.3.4", "plain"]
                .iter()
                .map(OsString::from),
        );
        assert_eq!(
            args,
            ["vcctl", "--backend", "sim", "-x=1", "--ip=1.2.3.4", "plain"]
                .iter()
                .map(OsString::from)
                .collect::<Vec<_>>()
        );
    }

    #[test]
    fn timing_options() {
        let cli = parse(&[
            "vcctl",
            "--backend",
            "sim",
            "--task-timeout",
            "60",
            "--shutdown-timeout",
            "30",
            "--poll-interval",
            "2",
        ]);
        assert_eq!(cli.backend, Some(BackendKind::Sim));
        assert_eq!(cli.task_timeout, Some(60));
        assert_eq!(cli.shutdown_timeout, Some(30));
        assert_eq!(cli.poll_interval, Some(2));
    }
}

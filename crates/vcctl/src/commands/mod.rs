pub mod help;
pub mod host;
pub mod vm;

use vc_manager::{Endpoint, PowerExecutor, Result};

pub const INVALID_COMMAND: &str = "Invalid command, try again!";
pub const ACCESS_PROBLEM: &str = "There was some problem in accessing the server";

/// One parsed line of operator input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Blank line; nothing to do.
    Empty,
    Help,
    Exit,
    ListVms,
    Vm { name: String, op: VmOp },
    ListHosts,
    Host { ip: String, op: HostOp },
    /// `host <ip> ...` where `<ip>` is not a dotted quad.
    InvalidHost { ip: String },
    Invalid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VmOp {
    Info,
    On,
    Off,
    Shutdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostOp {
    Info,
    Datastore,
    Network,
}

impl Command {
    pub fn parse(line: &str) -> Self {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        let Some(verb) = tokens.first() else {
            return Command::Empty;
        };

        match verb.to_ascii_lowercase().as_str() {
            "help" if tokens.len() == 1 => Command::Help,
            "exit" if tokens.len() == 1 => Command::Exit,
            "vm" => match tokens[1..] {
                [] => Command::ListVms,
                [name, op] => match VmOp::parse(op) {
                    Some(op) => Command::Vm {
                        name: name.to_string(),
                        op,
                    },
                    None => Command::Invalid,
                },
                _ => Command::Invalid,
            },
            "host" => match tokens[1..] {
                [] => Command::ListHosts,
                [ip, _] if !is_dotted_quad(ip) => Command::InvalidHost { ip: ip.to_string() },
                [ip, op] => match HostOp::parse(op) {
                    Some(op) => Command::Host {
                        ip: ip.to_string(),
                        op,
                    },
                    None => Command::Invalid,
                },
                _ => Command::Invalid,
            },
            _ => Command::Invalid,
        }
    }
}

impl VmOp {
    fn parse(token: &str) -> Option<Self> {
        match token.to_ascii_lowercase().as_str() {
            "info" => Some(VmOp::Info),
            "on" => Some(VmOp::On),
            "off" => Some(VmOp::Off),
            "shutdown" => Some(VmOp::Shutdown),
            _ => None,
        }
    }
}

impl HostOp {
    fn parse(token: &str) -> Option<Self> {
        match token.to_ascii_lowercase().as_str() {
            "info" => Some(HostOp::Info),
            "datastore" => Some(HostOp::Datastore),
            "network" => Some(HostOp::Network),
            _ => None,
        }
    }
}

/// Four dot-separated groups of one to three digits, each at most 255.
/// Leading zeros are accepted (`010.001.0.1`).
pub fn is_dotted_quad(s: &str) -> bool {
    let groups: Vec<&str> = s.split('.').collect();
    groups.len() == 4
        && groups.iter().all(|g| {
            (1..=3).contains(&g.len())
                && g.bytes().all(|b| b.is_ascii_digit())
                && g.parse::<u16>().is_ok_and(|n| n <= 255)
        })
}

/// Per-session state handed to every command: the endpoint capability and
/// the power-operation settings. Nothing in here changes between commands.
pub struct Session<E> {
    endpoint: E,
    executor: PowerExecutor,
}

impl<E: Endpoint> Session<E> {
    pub fn new(endpoint: E, executor: PowerExecutor) -> Self {
        Self { endpoint, executor }
    }

    pub fn endpoint(&self) -> &E {
        &self.endpoint
    }

    pub fn executor(&self) -> &PowerExecutor {
        &self.executor
    }

    /// Run one command and return the lines to show the operator.
    ///
    /// `Exit` and blank lines produce no output and touch nothing remote.
    pub async fn dispatch(&self, command: &Command) -> Result<Vec<String>> {
        match command {
            Command::Empty | Command::Exit => Ok(Vec::new()),
            Command::Help => Ok(help::lines()),
            Command::Invalid => Ok(vec![INVALID_COMMAND.to_string()]),
            Command::InvalidHost { ip } => Ok(vec![format!("Invalid Host IP Address {ip}")]),
            Command::ListVms => vm::list(self).await,
            Command::Vm { name, op } => vm::run(self, name, *op).await,
            Command::ListHosts => host::list(self).await,
            Command::Host { ip, op } => host::run(self, ip, *op).await,
        }
    }
}

use std::fmt;

use chrono::{DateTime, Utc};

/// Which backend implementation serves a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendTag {
    Sim,
    VSphere,
}

impl fmt::Display for BackendTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendTag::Sim => write!(f, "sim"),
            BackendTag::VSphere => write!(f, "vsphere"),
        }
    }
}

/// Inventory object type used for lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Host,
    VirtualMachine,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKind::Host => write!(f, "host"),
            EntityKind::VirtualMachine => write!(f, "virtual machine"),
        }
    }
}

/// Opaque reference to a remote host or VM.
///
/// Only valid within the session that produced it; callers look entities up
/// again for every command instead of holding on to these.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityRef {
    pub kind: EntityKind,
    /// Backend-specific identifier (e.g. `vm-42`).
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerState {
    PoweredOn,
    PoweredOff,
    Suspended,
}

impl fmt::Display for PowerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PowerState::PoweredOn => write!(f, "poweredOn"),
            PowerState::PoweredOff => write!(f, "poweredOff"),
            PowerState::Suspended => write!(f, "suspended"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolsRunningStatus {
    Running,
    NotRunning,
    ExecutingScripts,
}

impl fmt::Display for ToolsRunningStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ToolsRunningStatus::Running => write!(f, "guestToolsRunning"),
            ToolsRunningStatus::NotRunning => write!(f, "guestToolsNotRunning"),
            ToolsRunningStatus::ExecutingScripts => write!(f, "guestToolsExecutingScripts"),
        }
    }
}

/// Descriptive fields of a virtual machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VmDetails {
    pub name: String,
    pub guest_full_name: Option<String>,
    /// Guest OS run state as reported by the tools, e.g. `running` or `notRunning`.
    pub guest_state: String,
    pub ip_address: Option<String>,
    pub tools_status: ToolsRunningStatus,
    pub power_state: PowerState,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostDetails {
    pub name: String,
    pub product_full_name: String,
    pub cpu_cores: u32,
    pub memory_bytes: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatastoreSummary {
    pub name: String,
    pub capacity_bytes: u64,
    pub free_bytes: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkSummary {
    pub name: String,
}

/// Handle to an asynchronous remote operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskRef {
    pub id: String,
    /// Name of the entity the task operates on.
    pub entity: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Queued,
    Running,
    Success,
    Error,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskState::Success | TaskState::Error)
    }
}

/// Snapshot of a task record as held by the management endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskInfo {
    pub id: String,
    pub state: TaskState,
    pub error: Option<String>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Endpoint address and credentials for one session.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Host name or address, optionally with a port (`10.0.0.5`, `127.0.0.1:8989`).
    pub endpoint: String,
    pub username: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("endpoint", &self.endpoint)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

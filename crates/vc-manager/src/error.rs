use std::path::PathBuf;
use std::time::Duration;

use miette::Diagnostic;
use thiserror::Error;

use crate::types::{BackendTag, EntityKind, PowerState};

pub type Result<T> = std::result::Result<T, VmError>;

#[derive(Debug, Error, Diagnostic)]
pub enum VmError {
    #[error("cannot reach management endpoint {endpoint}: {detail}")]
    #[diagnostic(
        code(vc_manager::unreachable),
        help("check the endpoint address and that the management service is running")
    )]
    Unreachable { endpoint: String, detail: String },

    #[error("authentication failed for {username} at {endpoint}")]
    #[diagnostic(
        code(vc_manager::authentication_failed),
        help("check the username and password, or use --default for the built-in endpoint")
    )]
    AuthenticationFailed { endpoint: String, username: String },

    #[error("the session with {endpoint} is no longer valid")]
    #[diagnostic(
        code(vc_manager::session_expired),
        help("log in again to start a new session")
    )]
    SessionExpired { endpoint: String },

    #[error("operation {operation} is not allowed while VM '{name}' is {state}")]
    #[diagnostic(
        code(vc_manager::invalid_power_state),
        help(
            "after shutdown a virtual machine changes its state to powered off on its own. \
             Requesting a state (powered on, powered off or suspended) that the virtual \
             machine has already reached is rejected by the management service."
        )
    )]
    InvalidPowerState {
        name: String,
        state: PowerState,
        operation: &'static str,
    },

    #[error("guest tools are not running in VM '{name}'")]
    #[diagnostic(
        code(vc_manager::tools_not_running),
        help("guest operations need the guest tools running inside the virtual machine")
    )]
    ToolsNotRunning { name: String },

    #[error("'{name}' is a {actual}, expected a {expected}")]
    #[diagnostic(code(vc_manager::wrong_entity_kind))]
    WrongEntityKind {
        name: String,
        expected: EntityKind,
        actual: EntityKind,
    },

    #[error("{kind} '{name}' no longer exists")]
    #[diagnostic(code(vc_manager::entity_gone))]
    EntityGone { kind: EntityKind, name: String },

    #[error("unknown task {id}")]
    #[diagnostic(code(vc_manager::unknown_task))]
    UnknownTask { id: String },

    #[error("task {id} finished without a completion time")]
    #[diagnostic(code(vc_manager::incomplete_task_record))]
    IncompleteTaskRecord { id: String },

    #[error("remote fault ({status}) {error_type}: {message}")]
    #[diagnostic(code(vc_manager::remote_fault))]
    RemoteFault {
        status: u16,
        error_type: String,
        message: String,
    },

    #[error("malformed response from {endpoint}: {detail}")]
    #[diagnostic(code(vc_manager::malformed_response))]
    MalformedResponse { endpoint: String, detail: String },

    #[error("{operation} is not supported by the {backend} backend")]
    #[diagnostic(
        code(vc_manager::unsupported),
        help("the sim backend implements every operation")
    )]
    Unsupported {
        operation: &'static str,
        backend: BackendTag,
    },

    #[error("failed to load inventory {path}: {detail}")]
    #[diagnostic(code(vc_manager::inventory))]
    InventoryParse { path: PathBuf, detail: String },

    #[error("poll interval must be greater than zero (deadline {}s)", deadline.as_secs())]
    #[diagnostic(code(vc_manager::invalid_poll_interval))]
    InvalidPollInterval { deadline: Duration },

    #[error(transparent)]
    #[diagnostic(code(vc_manager::io))]
    Io(#[from] std::io::Error),
}

impl VmError {
    /// Errors after which the session cannot issue further commands.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            VmError::SessionExpired { .. } | VmError::AuthenticationFailed { .. }
        )
    }
}

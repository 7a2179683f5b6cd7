use tracing::{info, warn};

use crate::error::Result;
use crate::shutdown::{ShutdownOutcome, ShutdownPoller};
use crate::task::{TaskOutcome, TaskWaiter};
use crate::traits::Endpoint;
use crate::types::EntityRef;

/// Leading text of the message reported when a power task is rejected.
pub const INVALID_STATE_MESSAGE: &str =
    "The attempted operation cannot be performed in the current state";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerAction {
    On,
    Off,
}

impl PowerAction {
    /// Operator-facing name of the operation.
    pub fn label(self) -> &'static str {
        match self {
            PowerAction::On => "Power on VM",
            PowerAction::Off => "Power off VM",
        }
    }

    /// Fixed explanation used for every failed task of this action,
    /// whatever reason the endpoint gave.
    pub fn rejection(self) -> String {
        let state = match self {
            PowerAction::On => "Powered on",
            PowerAction::Off => "Powered off",
        };
        format!("{INVALID_STATE_MESSAGE} ({state}).")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PowerReport {
    pub vm: String,
    pub action: PowerAction,
    pub outcome: TaskOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShutdownReport {
    pub vm: String,
    pub outcome: ShutdownOutcome,
}

/// Issues power operations against a resolved VM and waits for them.
#[derive(Debug, Clone, Default)]
pub struct PowerExecutor {
    pub waiter: TaskWaiter,
    pub shutdown: ShutdownPoller,
}

impl PowerExecutor {
    pub fn new(waiter: TaskWaiter, shutdown: ShutdownPoller) -> Self {
        Self { waiter, shutdown }
    }

    pub async fn power_on<E: Endpoint>(&self, endpoint: &E, vm: &EntityRef) -> Result<PowerReport> {
        self.run(endpoint, vm, PowerAction::On).await
    }

    pub async fn power_off<E: Endpoint>(
        &self,
        endpoint: &E,
        vm: &EntityRef,
    ) -> Result<PowerReport> {
        self.run(endpoint, vm, PowerAction::Off).await
    }

    pub async fn shutdown_guest<E: Endpoint>(
        &self,
        endpoint: &E,
        vm: &EntityRef,
    ) -> Result<ShutdownReport> {
        let outcome = self.shutdown.run(endpoint, vm).await?;
        Ok(ShutdownReport {
            vm: vm.name.clone(),
            outcome,
        })
    }

    async fn run<E: Endpoint>(
        &self,
        endpoint: &E,
        vm: &EntityRef,
        action: PowerAction,
    ) -> Result<PowerReport> {
        let task = match action {
            PowerAction::On => endpoint.power_on(vm).await?,
            PowerAction::Off => endpoint.power_off(vm).await?,
        };
        info!(vm = %vm.name, task = %task.id, action = ?action, "power task issued");

        let outcome = self.waiter.wait(endpoint, &task).await?;
        if let TaskOutcome::Failed { reason, .. } = &outcome {
            warn!(vm = %vm.name, task = %task.id, reason = %reason, "power task failed");
        }

        Ok(PowerReport {
            vm: vm.name.clone(),
            action,
            outcome,
        })
    }
}

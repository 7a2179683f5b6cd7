//! Guest shutdown tracking.
//!
//! A guest shutdown request returns before the guest has done anything and
//! yields no task, so completion is observed by re-reading the VM's power
//! state until it reads `PoweredOff` or the deadline budget is spent.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::error::{Result, VmError};
use crate::traits::Endpoint;
use crate::types::{EntityRef, PowerState};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);
pub const DEFAULT_DEADLINE: Duration = Duration::from_secs(180);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownOutcome {
    /// The VM read `PoweredOff`; `at` is the endpoint's clock at that moment.
    Completed { at: DateTime<Utc>, polls: u32 },
    /// The budget ran out before the VM powered off.
    TimedOut { waited: Duration, polls: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShutdownPoller {
    interval: Duration,
    deadline: Duration,
}

impl Default for ShutdownPoller {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            deadline: DEFAULT_DEADLINE,
        }
    }
}

impl ShutdownPoller {
    pub fn new(interval: Duration, deadline: Duration) -> Result<Self> {
        if interval.is_zero() {
            return Err(VmError::InvalidPollInterval { deadline });
        }
        Ok(Self { interval, deadline })
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    /// Request a guest shutdown and wait for the VM to power off.
    ///
    /// Errors from the shutdown request itself (guest tools not running, VM
    /// not powered on) are returned before any polling starts.
    pub async fn run<E: Endpoint>(&self, endpoint: &E, vm: &EntityRef) -> Result<ShutdownOutcome> {
        endpoint.shutdown_guest(vm).await?;
        info!(vm = %vm.name, deadline_secs = self.deadline.as_secs(), "guest shutdown issued");

        let mut remaining = self.deadline;
        let mut polls = 0u32;
        loop {
            let state = endpoint.power_state(vm).await?;
            polls += 1;

            if state == PowerState::PoweredOff {
                let at = endpoint.current_time().await?;
                info!(vm = %vm.name, polls, "guest shutdown completed");
                return Ok(ShutdownOutcome::Completed { at, polls });
            }
            if remaining.is_zero() {
                warn!(vm = %vm.name, polls, "guest shutdown did not complete before the deadline");
                return Ok(ShutdownOutcome::TimedOut {
                    waited: self.deadline,
                    polls,
                });
            }

            debug!(vm = %vm.name, state = %state, remaining_secs = remaining.as_secs(), "waiting for power off");
            let step = self.interval.min(remaining);
            tokio::time::sleep(step).await;
            remaining -= step;
        }
    }
}

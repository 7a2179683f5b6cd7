use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::error::{Result, VmError};
use crate::traits::Endpoint;
use crate::types::{TaskInfo, TaskRef, TaskState};

/// Terminal result of waiting on a task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    Succeeded {
        completed_at: DateTime<Utc>,
    },
    Failed {
        reason: String,
        completed_at: DateTime<Utc>,
    },
    /// The task had not resolved when the client-side timeout ran out.
    /// It may still complete on the endpoint.
    TimedOut { waited: Duration },
}

/// Blocks until a remote task resolves, or gives up after `timeout`.
#[derive(Debug, Clone)]
pub struct TaskWaiter {
    pub timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for TaskWaiter {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(300),
            poll_interval: Duration::from_millis(500),
        }
    }
}

impl TaskWaiter {
    pub async fn wait<E: Endpoint>(&self, endpoint: &E, task: &TaskRef) -> Result<TaskOutcome> {
        let info = match tokio::time::timeout(self.timeout, self.poll(endpoint, task)).await {
            Ok(info) => info?,
            Err(_) => {
                warn!(
                    task = %task.id,
                    entity = %task.entity,
                    timeout_secs = self.timeout.as_secs(),
                    "task did not resolve before the timeout"
                );
                return Ok(TaskOutcome::TimedOut {
                    waited: self.timeout,
                });
            }
        };

        let completed_at = info
            .completed_at
            .ok_or_else(|| VmError::IncompleteTaskRecord {
                id: info.id.clone(),
            })?;

        Ok(match info.state {
            TaskState::Success => TaskOutcome::Succeeded { completed_at },
            _ => TaskOutcome::Failed {
                reason: info.error.unwrap_or_default(),
                completed_at,
            },
        })
    }

    async fn poll<E: Endpoint>(&self, endpoint: &E, task: &TaskRef) -> Result<TaskInfo> {
        loop {
            let info = endpoint.task_info(task).await?;
            if info.state.is_terminal() {
                debug!(task = %task.id, state = ?info.state, "task resolved");
                return Ok(info);
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::{SimBackend, SimOptions};
    use crate::inventory::{Inventory, SimVm};
    use crate::types::{EntityKind, PowerState};

    fn sim(latency: Duration) -> SimBackend {
        SimBackend::new(
            Inventory {
                hosts: vec![],
                vms: vec![
                    SimVm::new("off", PowerState::PoweredOff),
                    SimVm::new("on", PowerState::PoweredOn),
                ],
            },
            SimOptions {
                task_latency: latency,
            },
        )
    }

    #[tokio::test(start_paused = true)]
    async fn wait_reports_success_with_task_completion_time() {
        let sim = sim(Duration::from_secs(3));
        let vm = sim
            .find_one(EntityKind::VirtualMachine, "off")
            .await
            .unwrap()
            .unwrap();
        let task = sim.power_on(&vm).await.unwrap();

        let outcome = TaskWaiter::default().wait(&sim, &task).await.unwrap();
        let info = sim.task_info(&task).await.unwrap();
        assert_eq!(
            outcome,
            TaskOutcome::Succeeded {
                completed_at: info.completed_at.unwrap()
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn wait_reports_remote_failure() {
        let sim = sim(Duration::ZERO);
        let vm = sim
            .find_one(EntityKind::VirtualMachine, "on")
            .await
            .unwrap()
            .unwrap();
        let task = sim.power_on(&vm).await.unwrap();

        match TaskWaiter::default().wait(&sim, &task).await.unwrap() {
            TaskOutcome::Failed { reason, .. } => {
                assert!(reason.contains("current state"), "{reason}")
            }
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn wait_gives_up_after_timeout() {
        let sim = sim(Duration::from_secs(3600));
        let vm = sim
            .find_one(EntityKind::VirtualMachine, "off")
            .await
            .unwrap()
            .unwrap();
        let task = sim.power_on(&vm).await.unwrap();
        let waiter = TaskWaiter {
            timeout: Duration::from_secs(10),
            poll_interval: Duration::from_secs(1),
        };

        let started = tokio::time::Instant::now();
        let outcome = waiter.wait(&sim, &task).await.unwrap();
        assert_eq!(
            outcome,
            TaskOutcome::TimedOut {
                waited: Duration::from_secs(10)
            }
        );
        assert_eq!(started.elapsed(), Duration::from_secs(10));
    }
}

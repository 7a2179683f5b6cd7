use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::error::{Result, VmError};
use crate::inventory::{Inventory, SimHost, SimVm};
use crate::traits::Endpoint;
use crate::types::{
    DatastoreSummary, EntityKind, EntityRef, HostDetails, NetworkSummary, PowerState, TaskInfo,
    TaskRef, TaskState, ToolsRunningStatus, VmDetails,
};

const ENDPOINT: &str = "sim";

/// Tunables for the simulated endpoint.
#[derive(Debug, Clone)]
pub struct SimOptions {
    /// Time between a power request and its task resolving.
    pub task_latency: Duration,
}

impl Default for SimOptions {
    fn default() -> Self {
        Self {
            task_latency: Duration::from_millis(500),
        }
    }
}

/// In-process management endpoint for development, demos and tests.
///
/// Power tasks and guest shutdowns resolve on the tokio clock, so tests
/// running with paused time observe them deterministically.
#[derive(Debug, Clone)]
pub struct SimBackend {
    state: Arc<Mutex<SimState>>,
    options: SimOptions,
}

#[derive(Debug)]
struct SimState {
    hosts: Vec<SimHost>,
    vms: Vec<VmSlot>,
    tasks: HashMap<String, SimTask>,
    next_task: u64,
    reachable: bool,
    logged_in: bool,
}

#[derive(Debug)]
struct VmSlot {
    def: SimVm,
    power: PowerState,
    shutdown_due: Option<Instant>,
}

#[derive(Debug)]
struct SimTask {
    vm: usize,
    action: PowerAction,
    due: Instant,
    info: TaskInfo,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PowerAction {
    On,
    Off,
}

impl SimBackend {
    pub fn new(inventory: Inventory, options: SimOptions) -> Self {
        let vms = inventory
            .vms
            .into_iter()
            .map(|def| VmSlot {
                power: def.power_state,
                def,
                shutdown_due: None,
            })
            .collect();
        Self {
            state: Arc::new(Mutex::new(SimState {
                hosts: inventory.hosts,
                vms,
                tasks: HashMap::new(),
                next_task: 1,
                reachable: true,
                logged_in: true,
            })),
            options,
        }
    }

    pub fn demo() -> Self {
        Self::new(Inventory::demo(), SimOptions::default())
    }

    /// Simulate losing (or regaining) network connectivity to the endpoint.
    pub async fn set_reachable(&self, reachable: bool) {
        self.state.lock().await.reachable = reachable;
    }

    fn vm_id(index: usize) -> String {
        format!("vm-{}", index + 1)
    }

    fn host_id(index: usize) -> String {
        format!("host-{}", index + 1)
    }

    async fn request_power(&self, vm: &EntityRef, action: PowerAction) -> Result<TaskRef> {
        let mut st = self.state.lock().await;
        let now = st.enter()?;
        let index = st.vm_index(vm)?;

        let id = format!("task-{}", st.next_task);
        st.next_task += 1;
        st.tasks.insert(
            id.clone(),
            SimTask {
                vm: index,
                action,
                due: now + self.options.task_latency,
                info: TaskInfo {
                    id: id.clone(),
                    state: TaskState::Queued,
                    error: None,
                    completed_at: None,
                },
            },
        );
        info!(vm = %vm.name, task = %id, action = ?action, "sim: power task queued");

        Ok(TaskRef {
            id,
            entity: vm.name.clone(),
        })
    }
}

enum Event {
    Task(String),
    Shutdown(usize),
}

impl SimState {
    /// Check the session and bring simulated time up to now.
    fn enter(&mut self) -> Result<Instant> {
        if !self.reachable {
            return Err(VmError::Unreachable {
                endpoint: ENDPOINT.into(),
                detail: "simulated outage".into(),
            });
        }
        if !self.logged_in {
            return Err(VmError::SessionExpired {
                endpoint: ENDPOINT.into(),
            });
        }
        let now = Instant::now();
        self.settle(now);
        Ok(now)
    }

    /// Apply every task completion and guest power-off due at or before `now`,
    /// in the order they fall due.
    fn settle(&mut self, now: Instant) {
        let mut events: Vec<(Instant, Event)> = self
            .tasks
            .iter()
            .filter(|(_, t)| !t.info.state.is_terminal() && t.due <= now)
            .map(|(id, t)| (t.due, Event::Task(id.clone())))
            .chain(self.vms.iter().enumerate().filter_map(|(i, vm)| {
                vm.shutdown_due
                    .filter(|due| *due <= now)
                    .map(|due| (due, Event::Shutdown(i)))
            }))
            .collect();
        events.sort_by_key(|(due, _)| *due);

        for (_, event) in events {
            match event {
                Event::Task(id) => self.complete_task(&id),
                Event::Shutdown(i) => {
                    let vm = &mut self.vms[i];
                    vm.shutdown_due = None;
                    vm.power = PowerState::PoweredOff;
                    debug!(vm = %vm.def.name, "sim: guest shutdown finished");
                }
            }
        }

        for task in self.tasks.values_mut() {
            if task.info.state == TaskState::Queued {
                task.info.state = TaskState::Running;
            }
        }
    }

    fn complete_task(&mut self, id: &str) {
        let Some(task) = self.tasks.get_mut(id) else {
            return;
        };
        let vm = &mut self.vms[task.vm];
        let (target, label) = match task.action {
            PowerAction::On => (PowerState::PoweredOn, "Powered on"),
            PowerAction::Off => (PowerState::PoweredOff, "Powered off"),
        };

        if vm.power == target {
            task.info.state = TaskState::Error;
            task.info.error = Some(format!(
                "The attempted operation cannot be performed in the current state ({label})."
            ));
        } else {
            vm.power = target;
            vm.shutdown_due = None;
            task.info.state = TaskState::Success;
        }
        task.info.completed_at = Some(Utc::now());
        debug!(vm = %vm.def.name, task = %id, state = ?task.info.state, "sim: task finished");
    }

    fn vm_index(&self, vm: &EntityRef) -> Result<usize> {
        self.index(vm, EntityKind::VirtualMachine, self.vms.len(), SimBackend::vm_id)
    }

    fn host_index(&self, host: &EntityRef) -> Result<usize> {
        self.index(host, EntityKind::Host, self.hosts.len(), SimBackend::host_id)
    }

    fn index(
        &self,
        entity: &EntityRef,
        kind: EntityKind,
        len: usize,
        id_of: fn(usize) -> String,
    ) -> Result<usize> {
        if entity.kind != kind {
            return Err(VmError::WrongEntityKind {
                name: entity.name.clone(),
                expected: kind,
                actual: entity.kind,
            });
        }
        (0..len)
            .find(|i| id_of(*i) == entity.id)
            .ok_or_else(|| VmError::EntityGone {
                kind,
                name: entity.name.clone(),
            })
    }

    fn refs(&self, kind: EntityKind) -> Vec<EntityRef> {
        match kind {
            EntityKind::Host => self
                .hosts
                .iter()
                .enumerate()
                .map(|(i, h)| EntityRef {
                    kind,
                    id: SimBackend::host_id(i),
                    name: h.name.clone(),
                })
                .collect(),
            EntityKind::VirtualMachine => self
                .vms
                .iter()
                .enumerate()
                .map(|(i, vm)| EntityRef {
                    kind,
                    id: SimBackend::vm_id(i),
                    name: vm.def.name.clone(),
                })
                .collect(),
        }
    }
}

impl Endpoint for SimBackend {
    async fn find_all(&self, kind: EntityKind) -> Result<Vec<EntityRef>> {
        let mut st = self.state.lock().await;
        st.enter()?;
        Ok(st.refs(kind))
    }

    async fn find_one(&self, kind: EntityKind, name: &str) -> Result<Option<EntityRef>> {
        let mut st = self.state.lock().await;
        st.enter()?;
        Ok(st.refs(kind).into_iter().find(|e| e.name == name))
    }

    async fn vm_details(&self, vm: &EntityRef) -> Result<VmDetails> {
        let mut st = self.state.lock().await;
        st.enter()?;
        let slot = &st.vms[st.vm_index(vm)?];
        let guest_up = slot.power == PowerState::PoweredOn && slot.def.tools_installed;

        Ok(VmDetails {
            name: slot.def.name.clone(),
            guest_full_name: Some(slot.def.guest_full_name.clone()),
            guest_state: if guest_up { "running" } else { "notRunning" }.into(),
            ip_address: slot.def.ip_address.clone().filter(|_| guest_up),
            tools_status: if guest_up {
                ToolsRunningStatus::Running
            } else {
                ToolsRunningStatus::NotRunning
            },
            power_state: slot.power,
        })
    }

    async fn power_state(&self, vm: &EntityRef) -> Result<PowerState> {
        let mut st = self.state.lock().await;
        st.enter()?;
        Ok(st.vms[st.vm_index(vm)?].power)
    }

    async fn host_details(&self, host: &EntityRef) -> Result<HostDetails> {
        let mut st = self.state.lock().await;
        st.enter()?;
        let h = &st.hosts[st.host_index(host)?];
        Ok(HostDetails {
            name: h.name.clone(),
            product_full_name: h.product_full_name.clone(),
            cpu_cores: h.cpu_cores,
            memory_bytes: h.memory_bytes,
        })
    }

    async fn host_datastores(&self, host: &EntityRef) -> Result<Vec<DatastoreSummary>> {
        let mut st = self.state.lock().await;
        st.enter()?;
        Ok(st.hosts[st.host_index(host)?].datastores.clone())
    }

    async fn host_networks(&self, host: &EntityRef) -> Result<Vec<NetworkSummary>> {
        let mut st = self.state.lock().await;
        st.enter()?;
        Ok(st.hosts[st.host_index(host)?]
            .networks
            .iter()
            .map(|name| NetworkSummary { name: name.clone() })
            .collect())
    }

    async fn power_on(&self, vm: &EntityRef) -> Result<TaskRef> {
        self.request_power(vm, PowerAction::On).await
    }

    async fn power_off(&self, vm: &EntityRef) -> Result<TaskRef> {
        self.request_power(vm, PowerAction::Off).await
    }

    async fn task_info(&self, task: &TaskRef) -> Result<TaskInfo> {
        let mut st = self.state.lock().await;
        st.enter()?;
        st.tasks
            .get(&task.id)
            .map(|t| t.info.clone())
            .ok_or_else(|| VmError::UnknownTask {
                id: task.id.clone(),
            })
    }

    async fn shutdown_guest(&self, vm: &EntityRef) -> Result<()> {
        let mut st = self.state.lock().await;
        let now = st.enter()?;
        let index = st.vm_index(vm)?;
        let slot = &mut st.vms[index];

        if slot.power != PowerState::PoweredOn {
            return Err(VmError::InvalidPowerState {
                name: slot.def.name.clone(),
                state: slot.power,
                operation: "shutdown",
            });
        }
        if !slot.def.tools_installed {
            return Err(VmError::ToolsNotRunning {
                name: slot.def.name.clone(),
            });
        }

        if slot.shutdown_due.is_none() {
            // A delay past the clock's range never elapses.
            slot.shutdown_due = slot
                .def
                .shutdown_delay
                .and_then(|delay| now.checked_add(delay));
        }
        info!(vm = %slot.def.name, due = ?slot.def.shutdown_delay, "sim: guest shutdown requested");
        Ok(())
    }

    async fn current_time(&self) -> Result<DateTime<Utc>> {
        self.state.lock().await.enter()?;
        Ok(Utc::now())
    }

    async fn logout(&self) -> Result<()> {
        let mut st = self.state.lock().await;
        st.logged_in = false;
        info!("sim: logged out");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend(vms: Vec<SimVm>) -> SimBackend {
        SimBackend::new(
            Inventory {
                hosts: Inventory::demo().hosts,
                vms,
            },
            SimOptions {
                task_latency: Duration::from_secs(2),
            },
        )
    }

    async fn vm(sim: &SimBackend, name: &str) -> EntityRef {
        sim.find_one(EntityKind::VirtualMachine, name)
            .await
            .unwrap()
            .unwrap()
    }

    #[tokio::test]
    async fn lookup_distinguishes_missing_from_unreachable() {
        let sim = SimBackend::demo();
        assert!(
            sim.find_one(EntityKind::VirtualMachine, "nope")
                .await
                .unwrap()
                .is_none()
        );
        assert_eq!(sim.find_all(EntityKind::Host).await.unwrap().len(), 2);

        sim.set_reachable(false).await;
        let err = sim.find_all(EntityKind::VirtualMachine).await.unwrap_err();
        assert!(matches!(err, VmError::Unreachable { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn power_task_resolves_after_latency() {
        let sim = backend(vec![SimVm::new("a", PowerState::PoweredOff)]);
        let a = vm(&sim, "a").await;

        let task = sim.power_on(&a).await.unwrap();
        let info = sim.task_info(&task).await.unwrap();
        assert_eq!(info.state, TaskState::Running);
        assert_eq!(sim.power_state(&a).await.unwrap(), PowerState::PoweredOff);

        tokio::time::sleep(Duration::from_secs(2)).await;
        let info = sim.task_info(&task).await.unwrap();
        assert_eq!(info.state, TaskState::Success);
        assert!(info.completed_at.is_some());
        assert_eq!(sim.power_state(&a).await.unwrap(), PowerState::PoweredOn);
    }

    #[tokio::test(start_paused = true)]
    async fn power_on_when_already_on_fails_the_task() {
        let sim = backend(vec![SimVm::new("a", PowerState::PoweredOn)]);
        let a = vm(&sim, "a").await;

        let task = sim.power_on(&a).await.unwrap();
        tokio::time::sleep(Duration::from_secs(3)).await;
        let info = sim.task_info(&task).await.unwrap();
        assert_eq!(info.state, TaskState::Error);
        assert!(info.error.unwrap().contains("current state (Powered on)"));
        assert!(info.completed_at.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn guest_shutdown_powers_off_after_delay() {
        let sim = backend(vec![SimVm {
            shutdown_delay: Some(Duration::from_secs(4)),
            ..SimVm::new("a", PowerState::PoweredOn)
        }]);
        let a = vm(&sim, "a").await;

        sim.shutdown_guest(&a).await.unwrap();
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(sim.power_state(&a).await.unwrap(), PowerState::PoweredOn);
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(sim.power_state(&a).await.unwrap(), PowerState::PoweredOff);

        let err = sim.shutdown_guest(&a).await.unwrap_err();
        assert!(matches!(
            err,
            VmError::InvalidPowerState {
                state: PowerState::PoweredOff,
                ..
            }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn huge_shutdown_delay_never_completes() {
        let inventory =
            Inventory::parse("vm \"big\" {\n    power \"on\"\n    shutdown-delay 18446744073709551615\n}\n")
                .unwrap();
        let sim = SimBackend::new(inventory, SimOptions::default());
        let big = vm(&sim, "big").await;

        sim.shutdown_guest(&big).await.unwrap();
        tokio::time::sleep(Duration::from_secs(3600)).await;
        assert_eq!(sim.power_state(&big).await.unwrap(), PowerState::PoweredOn);
    }

    #[tokio::test]
    async fn guest_shutdown_needs_tools() {
        let sim = backend(vec![SimVm {
            tools_installed: false,
            ..SimVm::new("a", PowerState::PoweredOn)
        }]);
        let a = vm(&sim, "a").await;
        let err = sim.shutdown_guest(&a).await.unwrap_err();
        assert!(matches!(err, VmError::ToolsNotRunning { .. }));
    }

    #[tokio::test]
    async fn vm_details_hide_guest_fields_when_off() {
        let sim = SimBackend::demo();
        let demo = vm(&sim, "demo").await;
        let details = sim.vm_details(&demo).await.unwrap();
        assert_eq!(details.power_state, PowerState::PoweredOff);
        assert_eq!(details.tools_status, ToolsRunningStatus::NotRunning);
        assert_eq!(details.ip_address, None);

        let on = vm(&sim, "demo-centos7-123").await;
        let details = sim.vm_details(&on).await.unwrap();
        assert_eq!(details.guest_state, "running");
        assert_eq!(details.ip_address.as_deref(), Some("10.0.0.13"));
    }

    #[tokio::test]
    async fn host_queries_reject_vm_handles() {
        let sim = SimBackend::demo();
        let demo = vm(&sim, "demo").await;
        let err = sim.host_details(&demo).await.unwrap_err();
        assert!(matches!(err, VmError::WrongEntityKind { .. }));
    }

    #[tokio::test]
    async fn logout_expires_session() {
        let sim = SimBackend::demo();
        sim.logout().await.unwrap();
        let err = sim.find_all(EntityKind::Host).await.unwrap_err();
        assert!(err.is_fatal());
    }
}

use tracing::error;
use vc_manager::props::{self, format_timestamp};
use vc_manager::{
    Endpoint, EntityKind, PowerReport, Result, ShutdownOutcome, ShutdownReport, TaskOutcome,
};

use super::{ACCESS_PROBLEM, Session, VmOp};

pub async fn list<E: Endpoint>(session: &Session<E>) -> Result<Vec<String>> {
    let vms = session
        .endpoint()
        .find_all(EntityKind::VirtualMachine)
        .await?;

    if vms.is_empty() {
        return Ok(vec!["There are no virtual machines present".to_string()]);
    }
    Ok(vms
        .iter()
        .enumerate()
        .map(|(i, vm)| format!("vm[{i}]: Name = {}", vm.name))
        .collect())
}

pub async fn run<E: Endpoint>(session: &Session<E>, name: &str, op: VmOp) -> Result<Vec<String>> {
    let endpoint = session.endpoint();
    let Some(vm) = endpoint.find_one(EntityKind::VirtualMachine, name).await? else {
        error!(vm = %name, "virtual machine not found");
        return Ok(vec![ACCESS_PROBLEM.to_string()]);
    };

    let executor = session.executor();
    match op {
        VmOp::Info => Ok(props::vm_info_lines(&endpoint.vm_details(&vm).await?)),
        VmOp::On => Ok(power_lines(&executor.power_on(endpoint, &vm).await?)),
        VmOp::Off => Ok(power_lines(&executor.power_off(endpoint, &vm).await?)),
        VmOp::Shutdown => Ok(shutdown_lines(
            &executor.shutdown_guest(endpoint, &vm).await?,
        )),
    }
}

fn power_lines(report: &PowerReport) -> Vec<String> {
    let label = report.action.label();
    let status = match &report.outcome {
        TaskOutcome::Succeeded { completed_at } => format!(
            "{label}: status = success, completion time = {}",
            format_timestamp(completed_at)
        ),
        TaskOutcome::Failed { completed_at, .. } => format!(
            "{label}: status = {}, completion time = {}",
            report.action.rejection(),
            format_timestamp(completed_at)
        ),
        TaskOutcome::TimedOut { waited } => format!(
            "{label}: status = did not complete within {} seconds",
            waited.as_secs()
        ),
    };
    vec![format!("Name = {}", report.vm), status]
}

fn shutdown_lines(report: &ShutdownReport) -> Vec<String> {
    let status = match &report.outcome {
        ShutdownOutcome::Completed { at, .. } => {
            format!("Shutdown guest: completed, time = {}", format_timestamp(at))
        }
        ShutdownOutcome::TimedOut { waited, .. } => format!(
            "Shutdown guest: did not complete within {} seconds",
            waited.as_secs()
        ),
    };
    vec![format!("Name = {}", report.vm), status]
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use vc_manager::inventory::{Inventory, SimVm};
    use vc_manager::{
        PowerExecutor, PowerState, ShutdownPoller, SimBackend, SimOptions, TaskWaiter, VmError,
    };

    use super::*;
    use crate::commands::Command;

    fn demo_session() -> Session<SimBackend> {
        Session::new(SimBackend::demo(), PowerExecutor::default())
    }

    async fn exec(session: &Session<SimBackend>, line: &str) -> Vec<String> {
        session.dispatch(&Command::parse(line)).await.unwrap()
    }

    #[tokio::test]
    async fn list_numbers_vms() {
        let out = exec(&demo_session(), "vm").await;
        assert_eq!(out[0], "vm[0]: Name = demo");
        assert_eq!(out.len(), 3);
    }

    #[tokio::test]
    async fn list_reports_empty_inventory() {
        let session = Session::new(
            SimBackend::new(Inventory::default(), SimOptions::default()),
            PowerExecutor::default(),
        );
        assert_eq!(
            exec(&session, "vm").await,
            vec!["There are no virtual machines present"]
        );
    }

    #[tokio::test]
    async fn unknown_vm_is_an_access_problem() {
        assert_eq!(exec(&demo_session(), "vm ghost info").await, vec![ACCESS_PROBLEM]);
    }

    #[tokio::test(start_paused = true)]
    async fn power_on_twice() {
        let session = demo_session();

        let first = exec(&session, "vm demo on").await;
        assert_eq!(first[0], "Name = demo");
        assert!(
            first[1].starts_with("Power on VM: status = success, completion time = "),
            "{}",
            first[1]
        );

        let second = exec(&session, "vm demo on").await;
        assert_eq!(second[0], "Name = demo");
        assert!(
            second[1].starts_with(
                "Power on VM: status = The attempted operation cannot be performed in the current state (Powered on)., completion time = "
            ),
            "{}",
            second[1]
        );

        let info = exec(&session, "vm demo info").await;
        assert_eq!(info[5], "Power state = poweredOn");
    }

    #[tokio::test(start_paused = true)]
    async fn power_off_of_stopped_vm_uses_fixed_message() {
        let out = exec(&demo_session(), "vm demo off").await;
        assert!(
            out[1].contains("cannot be performed in the current state (Powered off)."),
            "{}",
            out[1]
        );
        assert!(out[1].contains("completion time = "));
    }

    #[tokio::test(start_paused = true)]
    async fn power_task_timeout_has_its_own_line() {
        let sim = SimBackend::new(
            Inventory {
                hosts: vec![],
                vms: vec![SimVm::new("slow", PowerState::PoweredOff)],
            },
            SimOptions {
                task_latency: Duration::from_secs(600),
            },
        );
        let session = Session::new(
            sim,
            PowerExecutor::new(
                TaskWaiter {
                    timeout: Duration::from_secs(30),
                    poll_interval: Duration::from_secs(1),
                },
                ShutdownPoller::default(),
            ),
        );

        let out = exec(&session, "vm slow on").await;
        assert_eq!(
            out,
            vec![
                "Name = slow",
                "Power on VM: status = did not complete within 30 seconds"
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_completes_and_then_is_rejected() {
        let session = demo_session();

        let out = exec(&session, "vm demo-centos7-123 shutdown").await;
        assert_eq!(out[0], "Name = demo-centos7-123");
        assert!(out[1].starts_with("Shutdown guest: completed, time = "), "{}", out[1]);

        let err = session
            .dispatch(&Command::parse("vm demo-centos7-123 shutdown"))
            .await
            .unwrap_err();
        assert!(matches!(err, VmError::InvalidPowerState { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_timeout_is_reported() {
        let sim = SimBackend::new(
            Inventory {
                hosts: vec![],
                vms: vec![SimVm {
                    shutdown_delay: None,
                    ..SimVm::new("hung", PowerState::PoweredOn)
                }],
            },
            SimOptions::default(),
        );
        let session = Session::new(
            sim,
            PowerExecutor::new(
                TaskWaiter::default(),
                ShutdownPoller::new(Duration::from_secs(1), Duration::from_secs(10)).unwrap(),
            ),
        );

        let out = exec(&session, "vm hung shutdown").await;
        assert_eq!(
            out,
            vec![
                "Name = hung",
                "Shutdown guest: did not complete within 10 seconds"
            ]
        );
    }

    #[tokio::test]
    async fn shutdown_without_tools_propagates() {
        let err = demo_session()
            .dispatch(&Command::parse("vm legacy-winxp shutdown"))
            .await
            .unwrap_err();
        assert!(matches!(err, VmError::ToolsNotRunning { .. }));
    }
}

use miette::{IntoDiagnostic, Result};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, warn};
use vc_manager::inventory::Inventory;
use vc_manager::{Endpoint, RouterEndpoint, SimBackend, SimOptions, VSphereBackend};

use crate::cli::BackendKind;
use crate::commands::{Command, Session};
use crate::config::Settings;
use crate::report;

pub const PROMPT: &str = "vcctl> ";

/// Open the endpoint selected by `settings`.
pub async fn connect(settings: &Settings) -> Result<RouterEndpoint> {
    match settings.backend {
        BackendKind::Sim => {
            let inventory = match &settings.inventory {
                Some(path) => Inventory::load(path).await?,
                None => Inventory::demo(),
            };
            info!(
                hosts = inventory.hosts.len(),
                vms = inventory.vms.len(),
                "starting simulated endpoint"
            );
            Ok(RouterEndpoint::Sim(SimBackend::new(
                inventory,
                SimOptions::default(),
            )))
        }
        BackendKind::Vsphere => {
            let Some(credentials) = &settings.credentials else {
                miette::bail!("no endpoint credentials given");
            };
            let backend = VSphereBackend::connect(credentials, settings.insecure).await?;
            Ok(RouterEndpoint::VSphere(backend))
        }
    }
}

async fn write_lines<W>(out: &mut W, lines: &[String]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    for line in lines {
        out.write_all(line.as_bytes()).await.into_diagnostic()?;
        out.write_all(b"\n").await.into_diagnostic()?;
    }
    Ok(())
}

/// Read commands from `input` until `exit` or end of input.
///
/// Per-command failures are printed as an error block and the loop goes on;
/// failures that invalidate the connection end it with an error.
pub async fn run<E, R, W>(session: &Session<E>, mut input: R, out: &mut W) -> Result<()>
where
    E: Endpoint,
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = Vec::new();

    loop {
        out.write_all(PROMPT.as_bytes()).await.into_diagnostic()?;
        out.flush().await.into_diagnostic()?;

        buf.clear();
        if input.read_until(b'\n', &mut buf).await.into_diagnostic()? == 0 {
            debug!("end of input");
            break;
        }
        // Undecodable bytes become U+FFFD.
        let line = String::from_utf8_lossy(&buf);

        let command = Command::parse(&line);
        if command == Command::Exit {
            break;
        }
        debug!(?command, "dispatching");

        match session.dispatch(&command).await {
            Ok(response) => write_lines(out, &response).await?,
            Err(err) => {
                warn!(error = %err, "command failed");
                let now = session.endpoint().current_time().await.ok();
                write_lines(out, &report::error_block(&err, now)).await?;
                if err.is_fatal() {
                    out.flush().await.into_diagnostic()?;
                    return Err(err.into());
                }
            }
        }
    }

    out.flush().await.into_diagnostic()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use vc_manager::PowerExecutor;

    use super::*;

    async fn drive(sim: SimBackend, script: &str) -> (Result<()>, String) {
        let session = Session::new(sim, PowerExecutor::default());
        let mut out = Vec::new();
        let result = run(&session, script.as_bytes(), &mut out).await;
        (result, String::from_utf8(out).unwrap())
    }

    #[tokio::test(start_paused = true)]
    async fn power_on_twice_end_to_end() {
        let (result, out) = drive(SimBackend::demo(), "vm demo on\nvm demo on\nexit\n").await;
        result.unwrap();

        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines[0], "vcctl> Name = demo");
        assert!(lines[1].starts_with("Power on VM: status = success, completion time = "));
        assert_eq!(lines[2], "vcctl> Name = demo");
        assert!(lines[3].contains("cannot be performed in the current state (Powered on)."));
        assert_eq!(lines[4], "vcctl> ");
    }

    #[tokio::test]
    async fn exit_stops_reading() {
        let (result, out) = drive(SimBackend::demo(), "exit\nvm\n").await;
        result.unwrap();
        assert_eq!(out, PROMPT);
    }

    #[tokio::test]
    async fn end_of_input_ends_the_session() {
        let (result, out) = drive(SimBackend::demo(), "bogus").await;
        result.unwrap();
        assert_eq!(
            out,
            format!("{PROMPT}{}\n{PROMPT}", crate::commands::INVALID_COMMAND)
        );
    }

    #[tokio::test]
    async fn command_error_prints_block_and_continues() {
        let (result, out) = drive(
            SimBackend::demo(),
            "vm legacy-winxp shutdown\nhost 1.2.3 info\n",
        )
        .await;
        result.unwrap();
        assert!(out.contains("\t\t\t\t  Error Found"));
        assert!(out.contains("guest tools are not running in VM 'legacy-winxp'"));
        assert!(out.contains(" when error occurred."));
        assert!(out.contains("Invalid Host IP Address 1.2.3"));
    }

    #[tokio::test]
    async fn undecodable_line_is_just_an_invalid_command() {
        let session = Session::new(SimBackend::demo(), PowerExecutor::default());
        let mut out = Vec::new();
        let input: &[u8] = b"vm \xff info\nhelp\n";
        run(&session, input, &mut out).await.unwrap();

        let out = String::from_utf8(out).unwrap();
        assert!(out.starts_with(&format!(
            "{PROMPT}{}\n",
            crate::commands::ACCESS_PROBLEM
        )));
        assert!(out.contains("List of Available Commands"));
    }

    #[tokio::test]
    async fn windows_line_endings_are_accepted() {
        let (result, out) = drive(SimBackend::demo(), "host\r\nexit\r\n").await;
        result.unwrap();
        assert!(out.starts_with(&format!("{PROMPT}host[0]: Name = 130.65.159.11\n")));
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_of_stopped_vm_explains_power_state() {
        let (result, out) = drive(SimBackend::demo(), "vm demo shutdown\n").await;
        result.unwrap();
        assert!(out.contains("Virtual Machine is in an invalid power state !!!"));
        assert!(out.contains("\t\t\t\t    Reason"));
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_not_fatal() {
        let sim = SimBackend::demo();
        sim.set_reachable(false).await;
        let (result, out) = drive(sim, "vm\nhelp\n").await;
        result.unwrap();
        assert!(out.contains("Time : unavailable when error occurred."));
        assert!(out.contains("List of Available Commands"));
    }

    #[tokio::test]
    async fn expired_session_ends_the_loop() {
        let sim = SimBackend::demo();
        sim.logout().await.unwrap();
        let (result, out) = drive(sim, "vm\nhelp\n").await;
        assert!(result.is_err());
        assert!(out.contains("Error Found"));
        assert!(!out.contains("List of Available Commands"));
    }
}

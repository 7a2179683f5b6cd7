use tracing::error;
use vc_manager::props;
use vc_manager::{Endpoint, EntityKind, Result};

use super::{ACCESS_PROBLEM, HostOp, Session};

pub async fn list<E: Endpoint>(session: &Session<E>) -> Result<Vec<String>> {
    let hosts = session.endpoint().find_all(EntityKind::Host).await?;

    if hosts.is_empty() {
        return Ok(vec!["There are no hosts present".to_string()]);
    }
    Ok(hosts
        .iter()
        .enumerate()
        .map(|(i, host)| format!("host[{i}]: Name = {}", host.name))
        .collect())
}

pub async fn run<E: Endpoint>(session: &Session<E>, ip: &str, op: HostOp) -> Result<Vec<String>> {
    let endpoint = session.endpoint();
    let Some(host) = endpoint.find_one(EntityKind::Host, ip).await? else {
        error!(host = %ip, "host not found");
        return Ok(vec![ACCESS_PROBLEM.to_string()]);
    };

    match op {
        HostOp::Info => Ok(props::host_info_lines(
            &endpoint.host_details(&host).await?,
        )),
        HostOp::Datastore => {
            let datastores = endpoint.host_datastores(&host).await?;
            let mut lines = vec![format!("Name = {ip}")];
            lines.extend(
                datastores
                    .iter()
                    .enumerate()
                    .map(|(i, ds)| props::datastore_line(i, ds)),
            );
            Ok(lines)
        }
        HostOp::Network => {
            let networks = endpoint.host_networks(&host).await?;
            let mut lines = vec![format!("Name = {ip}")];
            lines.extend(
                networks
                    .iter()
                    .enumerate()
                    .map(|(i, net)| props::network_line(i, net)),
            );
            Ok(lines)
        }
    }
}

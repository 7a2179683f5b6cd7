//! Inventory description for the simulated endpoint.
//!
//! An inventory file is a KDL document with `host` and `vm` nodes:
//!
//! ```kdl
//! host "130.65.159.11" {
//!     product "VMware ESXi 6.0.0 build-3620759"
//!     cpu-cores 8
//!     memory-gb 64
//!     datastore "datastore1" capacity-gb=500 free-gb=320
//!     network "VM Network"
//! }
//!
//! vm "demo" {
//!     guest "CentOS 4/5/6/7 (64-bit)"
//!     ip "10.0.0.12"
//!     power "off"
//!     tools #true
//!     shutdown-delay 3
//! }
//! ```
//!
//! `power` is one of `on`, `off` or `suspended`. A VM without `shutdown-delay`
//! completes a guest shutdown immediately; `shutdown-hangs #true` makes the
//! guest ignore shutdown requests.

use std::path::Path;
use std::time::Duration;

use kdl::{KdlDocument, KdlNode, KdlValue};
use tracing::info;

use crate::error::{Result, VmError};
use crate::types::{DatastoreSummary, PowerState};

const GIB: u64 = 1024 * 1024 * 1024;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Inventory {
    pub hosts: Vec<SimHost>,
    pub vms: Vec<SimVm>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SimHost {
    pub name: String,
    pub product_full_name: String,
    pub cpu_cores: u32,
    pub memory_bytes: u64,
    pub datastores: Vec<DatastoreSummary>,
    pub networks: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SimVm {
    pub name: String,
    pub guest_full_name: String,
    pub ip_address: Option<String>,
    pub tools_installed: bool,
    pub power_state: PowerState,
    /// How long the guest takes to power off after a shutdown request.
    /// `None` means the guest never completes the shutdown.
    pub shutdown_delay: Option<Duration>,
}

impl SimVm {
    pub fn new(name: impl Into<String>, power_state: PowerState) -> Self {
        Self {
            name: name.into(),
            guest_full_name: "Other Linux (64-bit)".into(),
            ip_address: None,
            tools_installed: true,
            power_state,
            shutdown_delay: Some(Duration::ZERO),
        }
    }
}

impl Inventory {
    /// Built-in lab used by `--backend sim` when no inventory file is given.
    pub fn demo() -> Self {
        let host = |name: &str, cores, memory_gb: u64| SimHost {
            name: name.into(),
            product_full_name: "VMware ESXi 6.0.0 build-3620759".into(),
            cpu_cores: cores,
            memory_bytes: memory_gb * GIB,
            datastores: vec![
                DatastoreSummary {
                    name: format!("datastore-{}", name.rsplit('.').next().unwrap_or(name)),
                    capacity_bytes: 500 * GIB,
                    free_bytes: 321 * GIB + 17,
                },
                DatastoreSummary {
                    name: "nfs-shared".into(),
                    capacity_bytes: 2048 * GIB,
                    free_bytes: 1200 * GIB,
                },
            ],
            networks: vec!["VM Network".into(), "Management".into()],
        };

        Self {
            hosts: vec![
                host("130.65.159.11", 8, 64),
                host("130.65.159.12", 16, 128),
            ],
            vms: vec![
                SimVm {
                    guest_full_name: "CentOS 4/5/6/7 (64-bit)".into(),
                    ip_address: Some("10.0.0.12".into()),
                    shutdown_delay: Some(Duration::from_secs(3)),
                    ..SimVm::new("demo", PowerState::PoweredOff)
                },
                SimVm {
                    guest_full_name: "CentOS 4/5/6/7 (64-bit)".into(),
                    ip_address: Some("10.0.0.13".into()),
                    shutdown_delay: Some(Duration::from_secs(5)),
                    ..SimVm::new("demo-centos7-123", PowerState::PoweredOn)
                },
                SimVm {
                    guest_full_name: "Microsoft Windows XP Professional (32-bit)".into(),
                    tools_installed: false,
                    ..SimVm::new("legacy-winxp", PowerState::PoweredOn)
                },
            ],
        }
    }

    pub async fn load(path: &Path) -> Result<Self> {
        let text = tokio::fs::read_to_string(path).await?;
        let inventory = Self::parse(&text).map_err(|detail| VmError::InventoryParse {
            path: path.into(),
            detail,
        })?;
        info!(
            path = %path.display(),
            hosts = inventory.hosts.len(),
            vms = inventory.vms.len(),
            "loaded inventory"
        );
        Ok(inventory)
    }

    pub fn parse(text: &str) -> std::result::Result<Self, String> {
        let doc = text
            .parse::<KdlDocument>()
            .map_err(|e| e.to_string())?;
        let mut inventory = Inventory::default();

        for node in doc.nodes() {
            match node.name().value() {
                "host" => inventory.hosts.push(parse_host(node)?),
                "vm" => inventory.vms.push(parse_vm(node)?),
                other => return Err(format!("unknown node `{other}`")),
            }
        }

        Ok(inventory)
    }
}

fn parse_host(node: &KdlNode) -> std::result::Result<SimHost, String> {
    let name = string_arg(node, "host")?;
    let mut host = SimHost {
        name,
        product_full_name: "VMware ESXi".into(),
        cpu_cores: 1,
        memory_bytes: 0,
        datastores: Vec::new(),
        networks: Vec::new(),
    };

    for child in children(node) {
        match child.name().value() {
            "product" => host.product_full_name = string_arg(child, "product")?,
            "cpu-cores" => {
                host.cpu_cores = u32::try_from(int_arg(child, "cpu-cores")?)
                    .map_err(|_| "cpu-cores out of range".to_string())?
            }
            "memory-gb" => host.memory_bytes = gib(int_arg(child, "memory-gb")?)?,
            "datastore" => host.datastores.push(DatastoreSummary {
                name: string_arg(child, "datastore")?,
                capacity_bytes: gib(int_prop(child, "capacity-gb")?)?,
                free_bytes: gib(int_prop(child, "free-gb")?)?,
            }),
            "network" => host.networks.push(string_arg(child, "network")?),
            other => return Err(format!("unknown host setting `{other}`")),
        }
    }

    Ok(host)
}

fn parse_vm(node: &KdlNode) -> std::result::Result<SimVm, String> {
    let mut vm = SimVm::new(string_arg(node, "vm")?, PowerState::PoweredOff);

    for child in children(node) {
        match child.name().value() {
            "guest" => vm.guest_full_name = string_arg(child, "guest")?,
            "ip" => vm.ip_address = Some(string_arg(child, "ip")?),
            "tools" => vm.tools_installed = bool_arg(child, "tools")?,
            "power" => {
                vm.power_state = match string_arg(child, "power")?.as_str() {
                    "on" => PowerState::PoweredOn,
                    "off" => PowerState::PoweredOff,
                    "suspended" => PowerState::Suspended,
                    other => return Err(format!("unknown power state `{other}`")),
                }
            }
            "shutdown-delay" => {
                let secs = u64::try_from(int_arg(child, "shutdown-delay")?)
                    .map_err(|_| "shutdown-delay must not be negative".to_string())?;
                vm.shutdown_delay = Some(Duration::from_secs(secs));
            }
            "shutdown-hangs" => {
                if bool_arg(child, "shutdown-hangs")? {
                    vm.shutdown_delay = None;
                }
            }
            other => return Err(format!("unknown vm setting `{other}`")),
        }
    }

    Ok(vm)
}

fn children(node: &KdlNode) -> impl Iterator<Item = &KdlNode> {
    node.children().into_iter().flat_map(|doc| doc.nodes())
}

fn first_arg(node: &KdlNode) -> Option<&KdlValue> {
    node.entries()
        .iter()
        .find(|e| e.name().is_none())
        .map(|e| e.value())
}

fn prop<'a>(node: &'a KdlNode, key: &str) -> Option<&'a KdlValue> {
    node.entries()
        .iter()
        .find(|e| e.name().map(|n| n.value()) == Some(key))
        .map(|e| e.value())
}

fn string_arg(node: &KdlNode, what: &str) -> std::result::Result<String, String> {
    first_arg(node)
        .and_then(|v| v.as_string())
        .map(str::to_string)
        .ok_or_else(|| format!("`{what}` needs a string argument"))
}

fn int_arg(node: &KdlNode, what: &str) -> std::result::Result<i128, String> {
    first_arg(node)
        .and_then(|v| v.as_integer())
        .ok_or_else(|| format!("`{what}` needs an integer argument"))
}

fn bool_arg(node: &KdlNode, what: &str) -> std::result::Result<bool, String> {
    first_arg(node)
        .and_then(|v| v.as_bool())
        .ok_or_else(|| format!("`{what}` needs a boolean argument"))
}

fn int_prop(node: &KdlNode, key: &str) -> std::result::Result<i128, String> {
    prop(node, key)
        .and_then(|v| v.as_integer())
        .ok_or_else(|| format!("`{}` needs an integer `{key}` property", node.name().value()))
}

fn gib(value: i128) -> std::result::Result<u64, String> {
    u64::try_from(value)
        .ok()
        .and_then(|v| v.checked_mul(GIB))
        .ok_or_else(|| format!("size {value} GB out of range"))
}

pub mod sim;
pub mod vsphere;

use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::traits::Endpoint;
use crate::types::{
    BackendTag, DatastoreSummary, EntityKind, EntityRef, HostDetails, NetworkSummary, PowerState,
    TaskInfo, TaskRef, VmDetails,
};

pub use sim::{SimBackend, SimOptions};
pub use vsphere::VSphereBackend;

/// Endpoint chosen at startup; forwards every call to the selected backend.
pub enum RouterEndpoint {
    Sim(SimBackend),
    VSphere(VSphereBackend),
}

impl RouterEndpoint {
    pub fn backend(&self) -> BackendTag {
        match self {
            RouterEndpoint::Sim(_) => BackendTag::Sim,
            RouterEndpoint::VSphere(_) => BackendTag::VSphere,
        }
    }
}

macro_rules! forward {
    ($self:ident, $method:ident ( $($arg:expr),* )) => {
        match $self {
            RouterEndpoint::Sim(b) => b.$method($($arg),*).await,
            RouterEndpoint::VSphere(b) => b.$method($($arg),*).await,
        }
    };
}

impl Endpoint for RouterEndpoint {
    async fn find_all(&self, kind: EntityKind) -> Result<Vec<EntityRef>> {
        forward!(self, find_all(kind))
    }

    async fn find_one(&self, kind: EntityKind, name: &str) -> Result<Option<EntityRef>> {
        forward!(self, find_one(kind, name))
    }

    async fn vm_details(&self, vm: &EntityRef) -> Result<VmDetails> {
        forward!(self, vm_details(vm))
    }

    async fn power_state(&self, vm: &EntityRef) -> Result<PowerState> {
        forward!(self, power_state(vm))
    }

    async fn host_details(&self, host: &EntityRef) -> Result<HostDetails> {
        forward!(self, host_details(host))
    }

    async fn host_datastores(&self, host: &EntityRef) -> Result<Vec<DatastoreSummary>> {
        forward!(self, host_datastores(host))
    }

    async fn host_networks(&self, host: &EntityRef) -> Result<Vec<NetworkSummary>> {
        forward!(self, host_networks(host))
    }

    async fn power_on(&self, vm: &EntityRef) -> Result<TaskRef> {
        forward!(self, power_on(vm))
    }

    async fn power_off(&self, vm: &EntityRef) -> Result<TaskRef> {
        forward!(self, power_off(vm))
    }

    async fn task_info(&self, task: &TaskRef) -> Result<TaskInfo> {
        forward!(self, task_info(task))
    }

    async fn shutdown_guest(&self, vm: &EntityRef) -> Result<()> {
        forward!(self, shutdown_guest(vm))
    }

    async fn current_time(&self) -> Result<DateTime<Utc>> {
        forward!(self, current_time())
    }

    async fn logout(&self) -> Result<()> {
        forward!(self, logout())
    }
}

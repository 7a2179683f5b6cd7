use std::future::Future;

use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::types::{
    DatastoreSummary, EntityKind, EntityRef, HostDetails, NetworkSummary, PowerState, TaskInfo,
    TaskRef, VmDetails,
};

/// A remote virtualization management endpoint, bound to one logged-in session.
///
/// Lookups report "not found" as an empty result; errors are reserved for
/// connectivity, permission and protocol failures.
pub trait Endpoint: Send + Sync {
    /// Every entity of the given kind in the inventory.
    fn find_all(&self, kind: EntityKind) -> impl Future<Output = Result<Vec<EntityRef>>> + Send;

    /// The entity of the given kind with exactly this name, if any.
    fn find_one(
        &self,
        kind: EntityKind,
        name: &str,
    ) -> impl Future<Output = Result<Option<EntityRef>>> + Send;

    fn vm_details(&self, vm: &EntityRef) -> impl Future<Output = Result<VmDetails>> + Send;

    /// Fresh read of the VM's runtime power state.
    fn power_state(&self, vm: &EntityRef) -> impl Future<Output = Result<PowerState>> + Send;

    fn host_details(&self, host: &EntityRef) -> impl Future<Output = Result<HostDetails>> + Send;

    fn host_datastores(
        &self,
        host: &EntityRef,
    ) -> impl Future<Output = Result<Vec<DatastoreSummary>>> + Send;

    fn host_networks(
        &self,
        host: &EntityRef,
    ) -> impl Future<Output = Result<Vec<NetworkSummary>>> + Send;

    /// Request power-on. Returns as soon as the task is registered.
    fn power_on(&self, vm: &EntityRef) -> impl Future<Output = Result<TaskRef>> + Send;

    /// Request power-off. Returns as soon as the task is registered.
    fn power_off(&self, vm: &EntityRef) -> impl Future<Output = Result<TaskRef>> + Send;

    fn task_info(&self, task: &TaskRef) -> impl Future<Output = Result<TaskInfo>> + Send;

    /// Ask the guest OS to shut down. Completion is only observable through
    /// [`Endpoint::power_state`].
    fn shutdown_guest(&self, vm: &EntityRef) -> impl Future<Output = Result<()>> + Send;

    /// The endpoint's current clock.
    fn current_time(&self) -> impl Future<Output = Result<DateTime<Utc>>> + Send;

    fn logout(&self) -> impl Future<Output = Result<()>> + Send;
}

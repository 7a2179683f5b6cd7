//! Display projections of remote entity properties.

use chrono::{DateTime, Utc};

use crate::types::{DatastoreSummary, HostDetails, NetworkSummary, VmDetails};

pub const BYTES_PER_GB: u64 = 1024 * 1024 * 1024;

/// Format used for every timestamp shown to the operator.
pub const TIMESTAMP_FORMAT: &str = "%m/%d/%Y %H:%M:%S";

/// Whole gigabytes, truncated toward zero.
pub fn bytes_to_gb(bytes: u64) -> u64 {
    bytes / BYTES_PER_GB
}

pub fn format_timestamp(at: &DateTime<Utc>) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

fn or_unset(value: Option<&str>) -> &str {
    value.unwrap_or("unavailable")
}

pub fn vm_info_lines(vm: &VmDetails) -> Vec<String> {
    vec![
        format!("Name = {}", vm.name),
        format!("GuestFullName = {}", or_unset(vm.guest_full_name.as_deref())),
        format!("GuestState = {}", vm.guest_state),
        format!("IP addr = {}", or_unset(vm.ip_address.as_deref())),
        format!("Tool running status = {}", vm.tools_status),
        format!("Power state = {}", vm.power_state),
    ]
}

pub fn host_info_lines(host: &HostDetails) -> Vec<String> {
    vec![
        format!("Name = {}", host.name),
        format!("Product Full Name  = {}", host.product_full_name),
        format!("CPU Cores  = {}", host.cpu_cores),
        format!("RAM  = {} GB.", bytes_to_gb(host.memory_bytes)),
    ]
}

pub fn datastore_line(index: usize, ds: &DatastoreSummary) -> String {
    format!(
        "Datastore[{index}]: Name = {}, Capacity = {} GB, FreeSpace = {} GB.",
        ds.name,
        bytes_to_gb(ds.capacity_bytes),
        bytes_to_gb(ds.free_bytes)
    )
}

pub fn network_line(index: usize, net: &NetworkSummary) -> String {
    format!("Network[{index}]: Name = {}", net.name)
}

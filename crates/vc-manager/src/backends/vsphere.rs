use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::{Method, StatusCode};
use serde::Deserialize;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{Result, VmError};
use crate::traits::Endpoint;
use crate::types::{
    BackendTag, Credentials, DatastoreSummary, EntityKind, EntityRef, HostDetails, NetworkSummary,
    PowerState, TaskInfo, TaskRef, TaskState, ToolsRunningStatus, VmDetails,
};

const SESSION_HEADER: &str = "vmware-api-session-id";

/// vSphere Automation REST backend.
///
/// The REST power endpoints answer only once the operation has finished, so
/// each power request runs as a background tokio task and is exposed through
/// [`Endpoint::task_info`] like a server-side task.
pub struct VSphereBackend {
    client: reqwest::Client,
    base_url: String,
    endpoint: String,
    session: String,
    tasks: TaskTable,
}

/// Power requests still in flight. An entry leaves the table once its
/// terminal result has been read; finished entries nobody read are dropped
/// when the next request is tracked.
#[derive(Default)]
struct TaskTable {
    running: Mutex<HashMap<String, JoinHandle<Result<TaskInfo>>>>,
}

impl TaskTable {
    async fn track(&self, id: String, handle: JoinHandle<Result<TaskInfo>>) {
        let mut running = self.running.lock().await;
        running.retain(|stale, h| {
            let keep = !h.is_finished();
            if !keep {
                debug!(task = %stale, "vsphere: dropping unread task result");
            }
            keep
        });
        running.insert(id, handle);
    }

    async fn poll(&self, task: &TaskRef) -> Result<TaskInfo> {
        let mut running = self.running.lock().await;
        let finished = running
            .get(&task.id)
            .ok_or_else(|| VmError::UnknownTask {
                id: task.id.clone(),
            })?
            .is_finished();

        if !finished {
            return Ok(TaskInfo {
                id: task.id.clone(),
                state: TaskState::Running,
                error: None,
                completed_at: None,
            });
        }

        match running.remove(&task.id) {
            Some(handle) => handle
                .await
                .map_err(|e| VmError::Io(std::io::Error::other(e)))?,
            None => Err(VmError::UnknownTask {
                id: task.id.clone(),
            }),
        }
    }

    #[cfg(test)]
    async fn len(&self) -> usize {
        self.running.lock().await.len()
    }
}

struct Reply {
    status: StatusCode,
    date: Option<DateTime<Utc>>,
    body: Vec<u8>,
}

#[derive(Deserialize)]
struct VmSummaryDto {
    vm: String,
    name: String,
}

#[derive(Deserialize)]
struct HostSummaryDto {
    host: String,
    name: String,
}

#[derive(Deserialize)]
struct PowerInfoDto {
    state: String,
}

#[derive(Deserialize)]
struct ToolsInfoDto {
    run_state: Option<String>,
}

#[derive(Deserialize)]
struct GuestIdentityDto {
    full_name: Option<LocalizableMessage>,
    ip_address: Option<String>,
}

#[derive(Deserialize)]
struct LocalizableMessage {
    default_message: String,
}

#[derive(Deserialize)]
struct ErrorDto {
    error_type: Option<String>,
    #[serde(default)]
    messages: Vec<LocalizableMessage>,
}

impl VSphereBackend {
    /// Log in to `https://<endpoint>/api/session` with basic credentials.
    pub async fn connect(credentials: &Credentials, accept_invalid_certs: bool) -> Result<Self> {
        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(accept_invalid_certs)
            .connect_timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| VmError::Unreachable {
                endpoint: credentials.endpoint.clone(),
                detail: e.to_string(),
            })?;
        let base_url = format!("https://{}", credentials.endpoint);

        info!(endpoint = %credentials.endpoint, username = %credentials.username, "vsphere: logging in");

        let response = client
            .post(format!("{base_url}/api/session"))
            .basic_auth(&credentials.username, Some(&credentials.password))
            .send()
            .await
            .map_err(|e| VmError::Unreachable {
                endpoint: credentials.endpoint.clone(),
                detail: e.to_string(),
            })?;

        match response.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                return Err(VmError::AuthenticationFailed {
                    endpoint: credentials.endpoint.clone(),
                    username: credentials.username.clone(),
                });
            }
            status if !status.is_success() => {
                return Err(VmError::RemoteFault {
                    status: status.as_u16(),
                    error_type: "LOGIN_FAILED".into(),
                    message: response.text().await.unwrap_or_default(),
                });
            }
            _ => {}
        }

        let body = response.bytes().await.map_err(|e| VmError::Unreachable {
            endpoint: credentials.endpoint.clone(),
            detail: e.to_string(),
        })?;
        let session: String =
            serde_json::from_slice(&body).map_err(|e| VmError::MalformedResponse {
                endpoint: credentials.endpoint.clone(),
                detail: format!("session token: {e}"),
            })?;

        info!(endpoint = %credentials.endpoint, "vsphere: session established");

        Ok(Self {
            client,
            base_url,
            endpoint: credentials.endpoint.clone(),
            session,
            tasks: TaskTable::default(),
        })
    }

    async fn call(&self, method: Method, path: &str, query: &[(&str, &str)]) -> Result<Reply> {
        debug!(method = %method, path, "vsphere: request");
        let response = self
            .client
            .request(method, format!("{}{path}", self.base_url))
            .header(SESSION_HEADER, &self.session)
            .query(query)
            .send()
            .await
            .map_err(|e| self.unreachable(e))?;
        read_reply(response, &self.endpoint).await
    }

    /// Successful GET decoded as JSON.
    async fn get_json<T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T> {
        let reply = self.call(Method::GET, path, query).await?;
        if !reply.status.is_success() {
            return Err(fault(&reply, &self.endpoint));
        }
        decode(&reply.body, &self.endpoint)
    }

    fn unreachable(&self, e: reqwest::Error) -> VmError {
        VmError::Unreachable {
            endpoint: self.endpoint.clone(),
            detail: e.to_string(),
        }
    }

    async fn list(&self, kind: EntityKind, names: &[(&str, &str)]) -> Result<Vec<EntityRef>> {
        Ok(match kind {
            EntityKind::VirtualMachine => self
                .get_json::<Vec<VmSummaryDto>>("/api/vcenter/vm", names)
                .await?
                .into_iter()
                .map(|vm| EntityRef {
                    kind,
                    id: vm.vm,
                    name: vm.name,
                })
                .collect(),
            EntityKind::Host => self
                .get_json::<Vec<HostSummaryDto>>("/api/vcenter/host", names)
                .await?
                .into_iter()
                .map(|host| EntityRef {
                    kind,
                    id: host.host,
                    name: host.name,
                })
                .collect(),
        })
    }

    async fn request_power(&self, vm: &EntityRef, action: &'static str) -> Result<TaskRef> {
        expect_kind(vm, EntityKind::VirtualMachine)?;
        let id = format!("rest-task-{}", uuid::Uuid::new_v4());
        let request = self
            .client
            .post(format!("{}/api/vcenter/vm/{}/power", self.base_url, vm.id))
            .header(SESSION_HEADER, &self.session)
            .query(&[("action", action)]);
        let endpoint = self.endpoint.clone();
        let task_id = id.clone();

        let handle = tokio::spawn(async move {
            let response = request.send().await.map_err(|e| VmError::Unreachable {
                endpoint: endpoint.clone(),
                detail: e.to_string(),
            })?;
            let reply = read_reply(response, &endpoint).await?;
            power_task_info(task_id, &reply, &endpoint)
        });

        info!(vm = %vm.name, task = %id, action, "vsphere: power request issued");
        self.tasks.track(id.clone(), handle).await;

        Ok(TaskRef {
            id,
            entity: vm.name.clone(),
        })
    }
}

async fn read_reply(response: reqwest::Response, endpoint: &str) -> Result<Reply> {
    let status = response.status();
    let date = response
        .headers()
        .get(reqwest::header::DATE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| DateTime::parse_from_rfc2822(v).ok())
        .map(|d| d.with_timezone(&Utc));
    let body = response
        .bytes()
        .await
        .map_err(|e| VmError::Unreachable {
            endpoint: endpoint.into(),
            detail: e.to_string(),
        })?
        .to_vec();

    if status == StatusCode::UNAUTHORIZED {
        return Err(VmError::SessionExpired {
            endpoint: endpoint.into(),
        });
    }
    Ok(Reply { status, date, body })
}

fn decode<T: for<'de> Deserialize<'de>>(body: &[u8], endpoint: &str) -> Result<T> {
    serde_json::from_slice(body).map_err(|e| VmError::MalformedResponse {
        endpoint: endpoint.into(),
        detail: e.to_string(),
    })
}

fn error_body(reply: &Reply) -> (String, String) {
    match serde_json::from_slice::<ErrorDto>(&reply.body) {
        Ok(err) => (
            err.error_type.unwrap_or_else(|| "ERROR".into()),
            err.messages
                .into_iter()
                .map(|m| m.default_message)
                .collect::<Vec<_>>()
                .join(" "),
        ),
        Err(_) => (
            "ERROR".into(),
            String::from_utf8_lossy(&reply.body).into_owned(),
        ),
    }
}

fn fault(reply: &Reply, endpoint: &str) -> VmError {
    let (error_type, message) = error_body(reply);
    warn!(endpoint, status = %reply.status, error_type = %error_type, "vsphere: request failed");
    VmError::RemoteFault {
        status: reply.status.as_u16(),
        error_type,
        message,
    }
}

/// Turn the reply of a power request into the task record it stands for.
fn power_task_info(id: String, reply: &Reply, endpoint: &str) -> Result<TaskInfo> {
    if reply.status.is_success() {
        return Ok(TaskInfo {
            id,
            state: TaskState::Success,
            error: None,
            completed_at: reply.date,
        });
    }

    let (error_type, message) = error_body(reply);
    match error_type.as_str() {
        "ALREADY_IN_DESIRED_STATE" | "NOT_ALLOWED_IN_CURRENT_STATE" => Ok(TaskInfo {
            id,
            state: TaskState::Error,
            error: Some(message),
            completed_at: reply.date,
        }),
        _ => Err(fault(reply, endpoint)),
    }
}

fn parse_power_state(state: &str, endpoint: &str) -> Result<PowerState> {
    match state {
        "POWERED_ON" => Ok(PowerState::PoweredOn),
        "POWERED_OFF" => Ok(PowerState::PoweredOff),
        "SUSPENDED" => Ok(PowerState::Suspended),
        other => Err(VmError::MalformedResponse {
            endpoint: endpoint.into(),
            detail: format!("unknown power state {other}"),
        }),
    }
}

fn guest_state_label(state: &str) -> &'static str {
    match state {
        "RUNNING" => "running",
        "SHUTTING_DOWN" => "shuttingDown",
        "RESETTING" => "resetting",
        "STANDBY" => "standby",
        "NOT_RUNNING" => "notRunning",
        _ => "unknown",
    }
}

fn expect_kind(entity: &EntityRef, kind: EntityKind) -> Result<()> {
    if entity.kind == kind {
        Ok(())
    } else {
        Err(VmError::WrongEntityKind {
            name: entity.name.clone(),
            expected: kind,
            actual: entity.kind,
        })
    }
}

impl Endpoint for VSphereBackend {
    async fn find_all(&self, kind: EntityKind) -> Result<Vec<EntityRef>> {
        self.list(kind, &[]).await
    }

    async fn find_one(&self, kind: EntityKind, name: &str) -> Result<Option<EntityRef>> {
        let found = self.list(kind, &[("names", name)]).await?;
        Ok(found.into_iter().find(|e| e.name == name))
    }

    async fn vm_details(&self, vm: &EntityRef) -> Result<VmDetails> {
        let power_state = self.power_state(vm).await?;
        let base = format!("/api/vcenter/vm/{}", vm.id);

        let tools_status = match self
            .get_json::<ToolsInfoDto>(&format!("{base}/tools"), &[])
            .await?
            .run_state
            .as_deref()
        {
            Some("RUNNING") => ToolsRunningStatus::Running,
            Some("EXECUTING_SCRIPTS") => ToolsRunningStatus::ExecutingScripts,
            _ => ToolsRunningStatus::NotRunning,
        };

        // The guest endpoints answer 503 while the tools are down.
        let guest_state = match self
            .get_json::<PowerInfoDto>(&format!("{base}/guest/power"), &[])
            .await
        {
            Ok(power) => guest_state_label(&power.state),
            Err(VmError::RemoteFault { status: 503, .. }) => "notRunning",
            Err(e) => return Err(e),
        };
        let identity = match self
            .get_json::<GuestIdentityDto>(&format!("{base}/guest/identity"), &[])
            .await
        {
            Ok(identity) => Some(identity),
            Err(VmError::RemoteFault { status: 503, .. }) => None,
            Err(e) => return Err(e),
        };
        let (guest_full_name, ip_address) = match identity {
            Some(id) => (id.full_name.map(|m| m.default_message), id.ip_address),
            None => (None, None),
        };

        Ok(VmDetails {
            name: vm.name.clone(),
            guest_full_name,
            guest_state: guest_state.into(),
            ip_address,
            tools_status,
            power_state,
        })
    }

    async fn power_state(&self, vm: &EntityRef) -> Result<PowerState> {
        expect_kind(vm, EntityKind::VirtualMachine)?;
        let info: PowerInfoDto = self
            .get_json(&format!("/api/vcenter/vm/{}/power", vm.id), &[])
            .await?;
        parse_power_state(&info.state, &self.endpoint)
    }

    async fn host_details(&self, host: &EntityRef) -> Result<HostDetails> {
        expect_kind(host, EntityKind::Host)?;
        Err(VmError::Unsupported {
            operation: "host hardware summary",
            backend: BackendTag::VSphere,
        })
    }

    async fn host_datastores(&self, host: &EntityRef) -> Result<Vec<DatastoreSummary>> {
        expect_kind(host, EntityKind::Host)?;
        Err(VmError::Unsupported {
            operation: "per-host datastore listing",
            backend: BackendTag::VSphere,
        })
    }

    async fn host_networks(&self, host: &EntityRef) -> Result<Vec<NetworkSummary>> {
        expect_kind(host, EntityKind::Host)?;
        Err(VmError::Unsupported {
            operation: "per-host network listing",
            backend: BackendTag::VSphere,
        })
    }

    async fn power_on(&self, vm: &EntityRef) -> Result<TaskRef> {
        self.request_power(vm, "start").await
    }

    async fn power_off(&self, vm: &EntityRef) -> Result<TaskRef> {
        self.request_power(vm, "stop").await
    }

    async fn task_info(&self, task: &TaskRef) -> Result<TaskInfo> {
        self.tasks.poll(task).await
    }

    async fn shutdown_guest(&self, vm: &EntityRef) -> Result<()> {
        expect_kind(vm, EntityKind::VirtualMachine)?;
        let reply = self
            .call(
                Method::POST,
                &format!("/api/vcenter/vm/{}/guest/power", vm.id),
                &[("action", "shutdown")],
            )
            .await?;
        if reply.status.is_success() {
            info!(vm = %vm.name, "vsphere: guest shutdown requested");
            return Ok(());
        }

        let (error_type, _) = error_body(&reply);
        match error_type.as_str() {
            "NOT_ALLOWED_IN_CURRENT_STATE" => Err(VmError::InvalidPowerState {
                name: vm.name.clone(),
                state: self.power_state(vm).await?,
                operation: "shutdown",
            }),
            "SERVICE_UNAVAILABLE" => Err(VmError::ToolsNotRunning {
                name: vm.name.clone(),
            }),
            _ => Err(fault(&reply, &self.endpoint)),
        }
    }

    async fn current_time(&self) -> Result<DateTime<Utc>> {
        let reply = self.call(Method::GET, "/api/session", &[]).await?;
        reply.date.ok_or_else(|| VmError::MalformedResponse {
            endpoint: self.endpoint.clone(),
            detail: "response carries no Date header".into(),
        })
    }

    async fn logout(&self) -> Result<()> {
        let reply = self.call(Method::DELETE, "/api/session", &[]).await?;
        if !reply.status.is_success() {
            return Err(fault(&reply, &self.endpoint));
        }
        info!(endpoint = %self.endpoint, "vsphere: logged out");
        Ok(())
    }
}

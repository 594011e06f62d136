use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use thiserror::Error;

use super::error::GatewayError;

/// Identifier of a VM on the configured node. Always positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct VmId(u32);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidVmId {
    #[error("VM id must be an integer, got {0:?}")]
    NotAnInteger(String),
    #[error("VM id must be a positive integer")]
    Zero,
}

impl VmId {
    pub fn get(self) -> u32 {
        self.0
    }
}

impl TryFrom<u32> for VmId {
    type Error = InvalidVmId;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        if value == 0 {
            Err(InvalidVmId::Zero)
        } else {
            Ok(Self(value))
        }
    }
}

impl FromStr for VmId {
    type Err = InvalidVmId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = s
            .trim()
            .parse::<u32>()
            .map_err(|_| InvalidVmId::NotAnInteger(s.to_string()))?;
        Self::try_from(value)
    }
}

impl fmt::Display for VmId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Power state of a VM as reported by the cluster.
///
/// Values the cluster defines beyond the common ones are kept verbatim in
/// [`VmStatus::Other`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VmStatus {
    Running,
    Stopped,
    Unknown,
    Other(String),
}

impl VmStatus {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "running" => Self::Running,
            "stopped" => Self::Stopped,
            "unknown" => Self::Unknown,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn is_stopped(&self) -> bool {
        matches!(self, Self::Stopped)
    }
}

impl fmt::Display for VmStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::Stopped => write!(f, "stopped"),
            Self::Unknown => write!(f, "unknown"),
            Self::Other(raw) => write!(f, "{raw}"),
        }
    }
}

/// Opaque handle (UPID) of an asynchronous task accepted by the cluster.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct TaskHandle(String);

impl TaskHandle {
    /// Returns `None` for an empty or blank UPID: such a task cannot be tracked.
    pub fn new(upid: impl Into<String>) -> Option<Self> {
        let upid = upid.into();
        if upid.trim().is_empty() {
            None
        } else {
            Some(Self(upid))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Progress of a tracked task.
///
/// `Succeeded` means the task *finished* cleanly. It is unrelated to
/// [`VmStatus::Stopped`], even though the API spells both "stopped".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskState {
    Pending,
    Succeeded,
    Failed(String),
}

/// One backup image in the backup storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackupArtifact {
    pub vmid: VmId,
    /// Volume id handed to the restore call as `archive`.
    pub volid: String,
    /// Creation time, comparable within one storage.
    pub ctime: i64,
}

/// The five remote operations recovery needs from the hypervisor.
///
/// Implementations perform I/O only: no retries, no waiting on tasks, no
/// policy. Asynchronous operations return `Ok(None)` when the cluster accepted
/// the request without handing back a UPID.
#[allow(async_fn_in_trait)]
pub trait Gateway {
    async fn vm_status(&self, vmid: VmId) -> Result<VmStatus, GatewayError>;

    async fn delete_vm(&self, vmid: VmId) -> Result<Option<TaskHandle>, GatewayError>;

    async fn start_restore(
        &self,
        vmid: VmId,
        target_storage: &str,
        volid: &str,
    ) -> Result<Option<TaskHandle>, GatewayError>;

    async fn task_status(&self, handle: &TaskHandle) -> Result<TaskState, GatewayError>;

    async fn list_backups(&self, storage: &str) -> Result<Vec<BackupArtifact>, GatewayError>;
}

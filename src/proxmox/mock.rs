//! Deterministic [`Gateway`] double with canned responses and a call log.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use tokio::time::Instant;

use super::error::GatewayError;
use super::gateway::{BackupArtifact, Gateway, TaskHandle, TaskState, VmId, VmStatus};

pub const DELETE_UPID: &str = "UPID:pve:00001000:0000A000:66000000:qmdestroy:42:root@pam!recovery:";
pub const RESTORE_UPID: &str = "UPID:pve:00001001:0000A001:66000010:qmrestore:42:root@pam!recovery:";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    VmStatus(VmId),
    DeleteVm(VmId),
    StartRestore {
        vmid: VmId,
        storage: String,
        volid: String,
    },
    TaskStatus(String),
    ListBackups(String),
}

/// Scripted failures are plain messages turned into a 500 API error.
type Scripted<T> = Result<T, String>;

fn fail(message: &str) -> GatewayError {
    GatewayError::Api {
        status: 500,
        message: message.to_string(),
    }
}

pub struct ScriptedGateway {
    status: Scripted<VmStatus>,
    delete: Scripted<Option<String>>,
    restore: Scripted<Option<String>>,
    backups: Scripted<Vec<BackupArtifact>>,
    // The last scripted state of each task repeats forever.
    tasks: Mutex<HashMap<String, VecDeque<Scripted<TaskState>>>>,
    calls: Mutex<Vec<Call>>,
    polls: Mutex<Vec<Instant>>,
}

impl ScriptedGateway {
    /// A stopped VM whose delete and restore tasks succeed on the first poll.
    pub fn new() -> Self {
        Self {
            status: Ok(VmStatus::Stopped),
            delete: Ok(Some(DELETE_UPID.to_string())),
            restore: Ok(Some(RESTORE_UPID.to_string())),
            backups: Ok(Vec::new()),
            tasks: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            polls: Mutex::new(Vec::new()),
        }
        .with_task(DELETE_UPID, vec![Ok(TaskState::Succeeded)])
        .with_task(RESTORE_UPID, vec![Ok(TaskState::Succeeded)])
    }

    pub fn with_status(mut self, status: Scripted<VmStatus>) -> Self {
        self.status = status;
        self
    }

    pub fn with_delete(mut self, upid: Scripted<Option<&str>>) -> Self {
        self.delete = upid.map(|u| u.map(str::to_string));
        self
    }

    pub fn with_restore(mut self, upid: Scripted<Option<&str>>) -> Self {
        self.restore = upid.map(|u| u.map(str::to_string));
        self
    }

    pub fn with_backups(mut self, backups: Scripted<Vec<BackupArtifact>>) -> Self {
        self.backups = backups;
        self
    }

    pub fn with_task(self, upid: &str, states: Vec<Scripted<TaskState>>) -> Self {
        self.tasks
            .lock()
            .unwrap()
            .insert(upid.to_string(), states.into());
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| pred(c)).count()
    }

    pub fn delete_calls(&self) -> usize {
        self.count(|c| matches!(c, Call::DeleteVm(_)))
    }

    pub fn restore_calls(&self) -> usize {
        self.count(|c| matches!(c, Call::StartRestore { .. }))
    }

    pub fn polls_of(&self, upid: &str) -> usize {
        self.count(|c| matches!(c, Call::TaskStatus(u) if u == upid))
    }

    /// Clock readings of every `task_status` call, in order.
    pub fn poll_times(&self) -> Vec<Instant> {
        self.polls.lock().unwrap().clone()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

impl Gateway for ScriptedGateway {
    async fn vm_status(&self, vmid: VmId) -> Result<VmStatus, GatewayError> {
        self.record(Call::VmStatus(vmid));
        self.status.clone().map_err(|m| fail(&m))
    }

    async fn delete_vm(&self, vmid: VmId) -> Result<Option<TaskHandle>, GatewayError> {
        self.record(Call::DeleteVm(vmid));
        self.delete
            .clone()
            .map(|u| u.and_then(TaskHandle::new))
            .map_err(|m| fail(&m))
    }

    async fn start_restore(
        &self,
        vmid: VmId,
        target_storage: &str,
        volid: &str,
    ) -> Result<Option<TaskHandle>, GatewayError> {
        self.record(Call::StartRestore {
            vmid,
            storage: target_storage.to_string(),
            volid: volid.to_string(),
        });
        self.restore
            .clone()
            .map(|u| u.and_then(TaskHandle::new))
            .map_err(|m| fail(&m))
    }

    async fn task_status(&self, handle: &TaskHandle) -> Result<TaskState, GatewayError> {
        self.record(Call::TaskStatus(handle.as_str().to_string()));
        self.polls.lock().unwrap().push(Instant::now());

        let mut tasks = self.tasks.lock().unwrap();
        let Some(queue) = tasks.get_mut(handle.as_str()) else {
            return Err(fail("no such task"));
        };
        let next = if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        };
        match next {
            Some(state) => state.map_err(|m| fail(&m)),
            None => Err(fail("no scripted state")),
        }
    }

    async fn list_backups(&self, storage: &str) -> Result<Vec<BackupArtifact>, GatewayError> {
        self.record(Call::ListBackups(storage.to_string()));
        self.backups.clone().map_err(|m| fail(&m))
    }
}

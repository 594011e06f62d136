use tracing::{error, info, warn};

use crate::proxmox::{BackupArtifact, Gateway, GatewayError, TaskHandle, VmId};
use crate::recovery::{
    FailureKind, RecoveryOutcome, RecoveryReport, RecoveryRun, Stage, StateMachine, Transition,
    VmDeletion,
};
use crate::tracker::{await_completion, PollPolicy, TaskCompletion};

/// Everything the orchestrator needs besides the gateway.
#[derive(Debug, Clone)]
pub struct RecoverySettings {
    /// Storage the VM is restored onto.
    pub target_storage: String,
    /// Storage holding the backups.
    pub backup_storage: String,
    pub delete_policy: PollPolicy,
    pub restore_policy: PollPolicy,
    /// List backups before deleting the VM and stop if none exist.
    pub verify_backup_first: bool,
}

/// Pick the newest backup of `vmid` by creation time.
///
/// Among backups sharing the newest `ctime`, the first one in listing order wins.
pub fn select_latest_backup(artifacts: &[BackupArtifact], vmid: VmId) -> Option<&BackupArtifact> {
    // max_by_key keeps the last maximum, so walk the listing backwards.
    artifacts
        .iter()
        .rev()
        .filter(|a| a.vmid == vmid)
        .max_by_key(|a| a.ctime)
}

/// Drives a single VM through the recovery stages.
pub struct RecoveryOrchestrator<G> {
    gateway: G,
    settings: RecoverySettings,
}

impl<G: Gateway> RecoveryOrchestrator<G> {
    pub fn new(gateway: G, settings: RecoverySettings) -> Self {
        Self { gateway, settings }
    }

    /// Run every stage for `vmid` and return the report. Never retries a
    /// remote call; the first failure ends the run.
    pub async fn recover(&self, vmid: VmId) -> RecoveryReport {
        let mut run = RecoveryRun::new(vmid, self.settings.verify_backup_first);
        info!(
            run_id = %run.id,
            vmid = %vmid,
            target_storage = %self.settings.target_storage,
            backup_storage = %self.settings.backup_storage,
            verify_backup_first = run.verify_backup_first,
            "starting recovery"
        );

        loop {
            let stage = run.stage;
            let result = match stage {
                Stage::CheckStopped => self.check_stopped(vmid).await,
                Stage::VerifyBackup => self.find_latest_backup(vmid).await.map(|backup| {
                    info!(vmid = %vmid, volid = %backup.volid, "backup present before deletion");
                }),
                Stage::Delete => self.delete(vmid, &mut run.deletion).await,
                Stage::SelectBackup => self.find_latest_backup(vmid).await.map(|backup| {
                    run.selected_backup = Some(backup);
                }),
                Stage::Restore => match run.selected_backup.clone() {
                    Some(backup) => self.restore(vmid, &backup).await,
                    None => Err(FailureKind::NoBackup {
                        storage: self.settings.backup_storage.clone(),
                    }),
                },
                Stage::Finished => {
                    info!(run_id = %run.id, vmid = %vmid, "recovery finished");
                    break;
                }
            };

            match StateMachine::next(&mut run, result) {
                Transition::Next(next) => {
                    info!(run_id = %run.id, vmid = %vmid, from = %stage, to = %next, "stage transition");
                }
                Transition::Complete(outcome) => {
                    match &run.failure {
                        Some(failure) => warn!(
                            run_id = %run.id,
                            vmid = %vmid,
                            stage = %stage,
                            outcome = %outcome,
                            reason = %failure,
                            "recovery stopped"
                        ),
                        None => info!(run_id = %run.id, vmid = %vmid, outcome = %outcome, "recovery complete"),
                    }
                    break;
                }
            }
        }

        let report = RecoveryReport::from_run(&run);
        match report.deletion {
            VmDeletion::Confirmed if report.outcome == RecoveryOutcome::NoBackupFound => {
                error!(vmid = %vmid, "VM was deleted but no backup exists to restore it");
            }
            VmDeletion::Initiated => {
                warn!(vmid = %vmid, "VM deletion was accepted but never confirmed, the VM may be gone");
            }
            _ => {}
        }
        report
    }

    async fn check_stopped(&self, vmid: VmId) -> Result<(), FailureKind> {
        match self.gateway.vm_status(vmid).await {
            Ok(status) if status.is_stopped() => {
                info!(vmid = %vmid, "VM is stopped, proceeding");
                Ok(())
            }
            Ok(status) => Err(FailureKind::NotStopped {
                status: status.to_string(),
            }),
            Err(err) => Err(FailureKind::StatusUnavailable {
                message: err.to_string(),
            }),
        }
    }

    async fn delete(&self, vmid: VmId, deletion: &mut VmDeletion) -> Result<(), FailureKind> {
        let response = self.gateway.delete_vm(vmid).await;
        if response.is_ok() {
            *deletion = VmDeletion::Initiated;
        }
        let handle = accepted("delete", response)?;
        info!(
            vmid = %vmid,
            upid = %handle,
            timeout_secs = self.settings.delete_policy.timeout.as_secs(),
            "VM deletion initiated"
        );

        self.track(&handle, &self.settings.delete_policy).await?;
        *deletion = VmDeletion::Confirmed;
        info!(vmid = %vmid, upid = %handle, "VM deletion completed");
        Ok(())
    }

    async fn find_latest_backup(&self, vmid: VmId) -> Result<BackupArtifact, FailureKind> {
        let storage = &self.settings.backup_storage;
        let artifacts = self
            .gateway
            .list_backups(storage)
            .await
            .map_err(|err| FailureKind::Gateway {
                operation: "list backups".into(),
                message: err.to_string(),
            })?;

        let latest = select_latest_backup(&artifacts, vmid)
            .cloned()
            .ok_or_else(|| FailureKind::NoBackup {
                storage: storage.clone(),
            })?;

        info!(
            vmid = %vmid,
            storage = %storage,
            candidates = artifacts.iter().filter(|a| a.vmid == vmid).count(),
            volid = %latest.volid,
            ctime = latest.ctime,
            "latest backup selected"
        );
        Ok(latest)
    }

    async fn restore(&self, vmid: VmId, backup: &BackupArtifact) -> Result<(), FailureKind> {
        let target = &self.settings.target_storage;
        let handle = accepted(
            "restore",
            self.gateway.start_restore(vmid, target, &backup.volid).await,
        )?;
        info!(
            vmid = %vmid,
            upid = %handle,
            archive = %backup.volid,
            storage = %target,
            timeout_secs = self.settings.restore_policy.timeout.as_secs(),
            "VM restore initiated"
        );

        self.track(&handle, &self.settings.restore_policy).await?;
        info!(vmid = %vmid, upid = %handle, "VM restore completed");
        Ok(())
    }

    async fn track(&self, handle: &TaskHandle, policy: &PollPolicy) -> Result<(), FailureKind> {
        match await_completion(&self.gateway, handle, policy).await {
            TaskCompletion::Completed => Ok(()),
            TaskCompletion::Failed(exit_status) => Err(FailureKind::TaskFailed {
                upid: handle.to_string(),
                exit_status,
            }),
            TaskCompletion::TimedOut { elapsed } => Err(FailureKind::TimedOut {
                upid: handle.to_string(),
                elapsed_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
            }),
        }
    }
}

/// Unwrap the UPID of an accepted asynchronous operation.
fn accepted(
    operation: &str,
    response: Result<Option<TaskHandle>, GatewayError>,
) -> Result<TaskHandle, FailureKind> {
    match response {
        Ok(Some(handle)) => Ok(handle),
        Ok(None) => Err(FailureKind::MissingTaskHandle {
            operation: operation.to_string(),
        }),
        Err(err) => Err(FailureKind::Gateway {
            operation: operation.to_string(),
            message: err.to_string(),
        }),
    }
}

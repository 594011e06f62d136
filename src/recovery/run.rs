use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::stage::Stage;
use crate::proxmox::{BackupArtifact, VmId};

/// Terminal result of a recovery run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RecoveryOutcome {
    Success,
    PreconditionFailed,
    NoBackupFound,
    OperationFailed,
    Timeout,
}

impl RecoveryOutcome {
    pub fn is_success(self) -> bool {
        self == Self::Success
    }

    /// Process exit code: 0 for success, 1 for every other outcome.
    pub fn exit_code(self) -> u8 {
        if self.is_success() { 0 } else { 1 }
    }
}

impl fmt::Display for RecoveryOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::PreconditionFailed => write!(f, "precondition-failed"),
            Self::NoBackupFound => write!(f, "no-backup-found"),
            Self::OperationFailed => write!(f, "operation-failed"),
            Self::Timeout => write!(f, "timeout"),
        }
    }
}

/// Why a run stopped before finishing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureKind {
    /// The VM is not powered off; nothing was touched.
    NotStopped { status: String },
    /// The status query itself failed; nothing was touched.
    StatusUnavailable { message: String },
    /// A delete, restore or listing call was rejected.
    Gateway { operation: String, message: String },
    /// The cluster accepted an operation but returned no UPID to track.
    MissingTaskHandle { operation: String },
    /// The tracked task finished with an error.
    TaskFailed { upid: String, exit_status: String },
    /// The tracked task was still running at the deadline.
    TimedOut { upid: String, elapsed_ms: u64 },
    /// No backup of the VM exists in the backup storage.
    NoBackup { storage: String },
}

impl FailureKind {
    pub fn outcome(&self) -> RecoveryOutcome {
        match self {
            Self::NotStopped { .. } | Self::StatusUnavailable { .. } => {
                RecoveryOutcome::PreconditionFailed
            }
            Self::NoBackup { .. } => RecoveryOutcome::NoBackupFound,
            Self::TimedOut { .. } => RecoveryOutcome::Timeout,
            Self::Gateway { .. } | Self::MissingTaskHandle { .. } | Self::TaskFailed { .. } => {
                RecoveryOutcome::OperationFailed
            }
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotStopped { status } => {
                write!(f, "VM is not stopped (current status: {status})")
            }
            Self::StatusUnavailable { message } => {
                write!(f, "could not read VM status: {message}")
            }
            Self::Gateway { operation, message } => write!(f, "{operation} request failed: {message}"),
            Self::MissingTaskHandle { operation } => {
                write!(f, "{operation} returned no task id, cannot track it")
            }
            Self::TaskFailed { upid, exit_status } => write!(f, "task {upid} failed: {exit_status}"),
            Self::TimedOut { upid, elapsed_ms } => write!(
                f,
                "task {upid} still running after {:.1}s",
                *elapsed_ms as f64 / 1000.0
            ),
            Self::NoBackup { storage } => write!(f, "no backups found in storage '{storage}'"),
        }
    }
}

/// What is known about the VM's deletion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VmDeletion {
    /// No delete request was accepted; the VM is untouched.
    NotAttempted,
    /// The cluster accepted the delete but it never confirmed completion.
    /// The VM may already be gone.
    Initiated,
    /// The delete task finished successfully.
    Confirmed,
}

/// Mutable state of one recovery run. Lives only for the invocation.
#[derive(Debug, Clone)]
pub struct RecoveryRun {
    pub id: String,
    pub vmid: VmId,
    pub stage: Stage,
    /// Every stage entered, in order, including the current one.
    pub stage_history: Vec<Stage>,
    pub verify_backup_first: bool,
    pub selected_backup: Option<BackupArtifact>,
    pub deletion: VmDeletion,
    pub outcome: Option<RecoveryOutcome>,
    pub failure: Option<FailureKind>,
    pub started_at: DateTime<Utc>,
}

impl RecoveryRun {
    pub fn new(vmid: VmId, verify_backup_first: bool) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            vmid,
            stage: Stage::CheckStopped,
            stage_history: vec![Stage::CheckStopped],
            verify_backup_first,
            selected_backup: None,
            deletion: VmDeletion::NotAttempted,
            outcome: None,
            failure: None,
            started_at: Utc::now(),
        }
    }
}

/// Structured record produced at the end of a run.
#[derive(Debug, Clone, Serialize)]
pub struct RecoveryReport {
    pub run_id: String,
    pub vmid: VmId,
    pub outcome: RecoveryOutcome,
    pub failed_stage: Option<Stage>,
    pub failure: Option<FailureKind>,
    pub stage_transitions: Vec<Stage>,
    pub backup: Option<ReportedBackup>,
    pub deletion: VmDeletion,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub duration_ms: i64,
}

/// Backup chosen for the restore, as shown in the report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportedBackup {
    pub volid: String,
    pub ctime: i64,
    pub created_at: Option<DateTime<Utc>>,
}

impl From<&BackupArtifact> for ReportedBackup {
    fn from(artifact: &BackupArtifact) -> Self {
        Self {
            volid: artifact.volid.clone(),
            ctime: artifact.ctime,
            created_at: DateTime::<Utc>::from_timestamp(artifact.ctime, 0),
        }
    }
}

impl RecoveryReport {
    /// Build the report for a run. A run that never reached a terminal outcome
    /// is reported as failed, never as a success.
    pub fn from_run(run: &RecoveryRun) -> Self {
        let now = Utc::now();
        let duration = now - run.started_at;

        Self {
            run_id: run.id.clone(),
            vmid: run.vmid,
            outcome: run.outcome.unwrap_or(RecoveryOutcome::OperationFailed),
            failed_stage: run.failure.as_ref().map(|_| run.stage),
            failure: run.failure.clone(),
            stage_transitions: run.stage_history.clone(),
            backup: run.selected_backup.as_ref().map(ReportedBackup::from),
            deletion: run.deletion,
            started_at: run.started_at,
            completed_at: now,
            duration_ms: duration.num_milliseconds(),
        }
    }

    /// One-line human readable diagnostic naming the stage and reason.
    pub fn diagnostic(&self) -> String {
        match (&self.failed_stage, &self.failure) {
            (Some(stage), Some(failure)) => {
                format!("VM {} recovery stopped at {stage}: {failure}", self.vmid)
            }
            _ => match &self.backup {
                Some(backup) if self.outcome.is_success() => {
                    format!("VM {} restored from {}", self.vmid, backup.volid)
                }
                _ => format!("VM {} recovery ended with outcome {}", self.vmid, self.outcome),
            },
        }
    }
}

use std::fmt;

use serde::Serialize;

use super::run::{FailureKind, RecoveryOutcome, RecoveryRun};

/// Stages of a recovery run.
///
/// Each run flows: CHECK_STOPPED → [VERIFY_BACKUP] → DELETE → SELECT_BACKUP
/// → RESTORE → FINISHED, with no way back. VERIFY_BACKUP only runs when the
/// backup check before deletion is enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Stage {
    CheckStopped,
    VerifyBackup,
    Delete,
    SelectBackup,
    Restore,
    Finished,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::CheckStopped => write!(f, "CHECK_STOPPED"),
            Stage::VerifyBackup => write!(f, "VERIFY_BACKUP"),
            Stage::Delete => write!(f, "DELETE"),
            Stage::SelectBackup => write!(f, "SELECT_BACKUP"),
            Stage::Restore => write!(f, "RESTORE"),
            Stage::Finished => write!(f, "FINISHED"),
        }
    }
}

/// The result of evaluating a stage transition.
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    /// Advance to the next stage.
    Next(Stage),
    /// The run has ended.
    Complete(RecoveryOutcome),
}

/// Drives a [`RecoveryRun`] through its stages.
pub struct StateMachine;

impl StateMachine {
    /// Compute and apply the next transition for `run` given the result of its
    /// current stage.
    ///
    /// Success advances to the following stage; any failure ends the run with
    /// the outcome that failure maps to. There are no retries and no backward
    /// transitions. `Finished` is terminal and always completes successfully.
    pub fn next(run: &mut RecoveryRun, result: Result<(), FailureKind>) -> Transition {
        let transition = match (run.stage, result) {
            (Stage::Finished, _) => Transition::Complete(RecoveryOutcome::Success),
            (_, Err(kind)) => {
                let outcome = kind.outcome();
                run.failure = Some(kind);
                Transition::Complete(outcome)
            }
            (stage, Ok(())) => Transition::Next(Self::successor(stage, run.verify_backup_first)),
        };

        match &transition {
            Transition::Next(next) => {
                run.stage = *next;
                run.stage_history.push(*next);
                if *next == Stage::Finished {
                    run.outcome = Some(RecoveryOutcome::Success);
                }
            }
            Transition::Complete(outcome) => {
                run.outcome = Some(*outcome);
            }
        }

        transition
    }

    fn successor(stage: Stage, verify_backup_first: bool) -> Stage {
        match stage {
            Stage::CheckStopped if verify_backup_first => Stage::VerifyBackup,
            Stage::CheckStopped | Stage::VerifyBackup => Stage::Delete,
            Stage::Delete => Stage::SelectBackup,
            Stage::SelectBackup => Stage::Restore,
            Stage::Restore | Stage::Finished => Stage::Finished,
        }
    }
}

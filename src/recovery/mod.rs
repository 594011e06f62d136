mod run;
mod stage;

pub use run::{FailureKind, RecoveryOutcome, RecoveryReport, RecoveryRun, VmDeletion};
pub use stage::{Stage, StateMachine, Transition};

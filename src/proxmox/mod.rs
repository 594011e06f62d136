pub mod client;
pub mod error;
pub mod gateway;
#[cfg(test)]
pub mod mock;
pub mod types;

pub use client::ProxmoxClient;
pub use error::GatewayError;
pub use gateway::{BackupArtifact, Gateway, TaskHandle, TaskState, VmId};

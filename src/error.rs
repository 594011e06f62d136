use thiserror::Error;

use crate::proxmox::GatewayError;

/// Fatal errors raised before any remote call is made.
#[derive(Debug, Error)]
pub enum RecoveryError {
    #[error("required settings not set: {}", .0.join(", "))]
    MissingSettings(Vec<&'static str>),

    #[error("invalid value for {name}: {value}")]
    InvalidSetting { name: &'static str, value: String },

    #[error("cannot read config file {path}: {source}")]
    ConfigFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("cannot build Proxmox client: {0}")]
    Client(#[from] GatewayError),
}

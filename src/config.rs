//! Configuração do pve-recover carregada de `pve-recover.toml` e do ambiente.
//!
//! A struct [`RecoveryConfig`] contém todos os parâmetros configuráveis,
//! agrupados em `[proxmox]`, `[recovery]` e `[tasks]`. Valores ausentes no
//! arquivo usam defaults sensíveis; variáveis `PROXMOX_*` têm precedência
//! sobre o arquivo. A validação roda antes de qualquer chamada remota.

use std::fmt;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::RecoveryError;
use crate::orchestrator::RecoverySettings;
use crate::tracker::PollPolicy;

/// Nome do arquivo procurado no diretório atual quando `--config` não é usado.
pub const DEFAULT_CONFIG_FILE: &str = "pve-recover.toml";

/// Maior intervalo de polling aceito (um dia).
pub const MAX_POLL_INTERVAL_SECS: f64 = 86_400.0;

/// Configuração de nível superior.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RecoveryConfig {
    #[serde(default)]
    pub proxmox: ProxmoxConfig,

    #[serde(default)]
    pub recovery: StorageConfig,

    #[serde(default)]
    pub tasks: TaskConfig,
}

/// Conexão e autenticação com o Proxmox VE.
#[derive(Clone, Deserialize)]
pub struct ProxmoxConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Nó do cluster onde a VM vive.
    #[serde(default)]
    pub node: String,

    #[serde(default = "default_user")]
    pub user: String,

    #[serde(default)]
    pub token_name: String,

    #[serde(default)]
    pub token_value: String,

    /// Verificar o certificado TLS do servidor.
    #[serde(default)]
    pub verify_ssl: bool,
}

// O token nunca aparece em logs.
impl fmt::Debug for ProxmoxConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxmoxConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("node", &self.node)
            .field("user", &self.user)
            .field("token_name", &self.token_name)
            .field("token_value", &"<redacted>")
            .field("verify_ssl", &self.verify_ssl)
            .finish()
    }
}

impl Default for ProxmoxConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            node: String::new(),
            user: default_user(),
            token_name: String::new(),
            token_value: String::new(),
            verify_ssl: false,
        }
    }
}

/// Storages de destino e de backup.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StorageConfig {
    /// Storage onde a VM é restaurada.
    #[serde(default)]
    pub datastore: String,

    /// Storage que contém os backups.
    #[serde(default)]
    pub backup_datastore: String,

    /// Confirmar que existe backup antes de apagar a VM.
    #[serde(default)]
    pub verify_backup_first: bool,
}

/// Tempos de acompanhamento das tarefas assíncronas.
#[derive(Debug, Clone, Deserialize)]
pub struct TaskConfig {
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: f64,

    #[serde(default = "default_max_poll_interval_secs")]
    pub max_poll_interval_secs: f64,

    #[serde(default = "default_delete_timeout_secs")]
    pub delete_timeout_secs: u64,

    #[serde(default = "default_restore_timeout_secs")]
    pub restore_timeout_secs: u64,
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
            max_poll_interval_secs: default_max_poll_interval_secs(),
            delete_timeout_secs: default_delete_timeout_secs(),
            restore_timeout_secs: default_restore_timeout_secs(),
        }
    }
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    8006
}

fn default_user() -> String {
    "root@pam".to_string()
}

fn default_poll_interval_secs() -> f64 {
    5.0
}

fn default_max_poll_interval_secs() -> f64 {
    30.0
}

// A remoção costuma ser mais rápida que o restore.
fn default_delete_timeout_secs() -> u64 {
    300
}

fn default_restore_timeout_secs() -> u64 {
    600
}

/// Interpreta valores booleanos de variáveis de ambiente.
fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn interval(name: &'static str, secs: f64) -> Result<Duration, RecoveryError> {
    Duration::try_from_secs_f64(secs).map_err(|_| RecoveryError::InvalidSetting {
        name,
        value: secs.to_string(),
    })
}

impl RecoveryConfig {
    /// Carrega a configuração do arquivo e aplica as variáveis de ambiente.
    ///
    /// Sem `path`, usa `pve-recover.toml` do diretório atual se existir, ou
    /// os defaults. Um `path` explícito que não existe é erro.
    pub fn load(path: Option<&Path>) -> Result<Self, RecoveryError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let default_path = Path::new(DEFAULT_CONFIG_FILE);
                if default_path.exists() {
                    Self::from_file(default_path)?
                } else {
                    Self::default()
                }
            }
        };

        config.apply_env(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, RecoveryError> {
        let contents = std::fs::read_to_string(path).map_err(|source| RecoveryError::ConfigFile {
            path: path.display().to_string(),
            source,
        })?;
        Ok(toml::from_str(&contents)?)
    }

    /// Sobrescreve campos com as variáveis `PROXMOX_*` definidas e não vazias.
    pub fn apply_env(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), RecoveryError> {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(v) = var("PROXMOX_HOST") {
            self.proxmox.host = v;
        }
        if let Some(v) = var("PROXMOX_PORT") {
            self.proxmox.port = v.trim().parse().map_err(|_| RecoveryError::InvalidSetting {
                name: "PROXMOX_PORT",
                value: v.clone(),
            })?;
        }
        if let Some(v) = var("PROXMOX_NODE") {
            self.proxmox.node = v;
        }
        if let Some(v) = var("PROXMOX_USER") {
            self.proxmox.user = v;
        }
        if let Some(v) = var("PROXMOX_TOKEN_NAME") {
            self.proxmox.token_name = v;
        }
        if let Some(v) = var("PROXMOX_TOKEN_VALUE") {
            self.proxmox.token_value = v;
        }
        if let Some(v) = var("PROXMOX_SSL_VERIFY") {
            self.proxmox.verify_ssl =
                parse_bool(&v).ok_or_else(|| RecoveryError::InvalidSetting {
                    name: "PROXMOX_SSL_VERIFY",
                    value: v.clone(),
                })?;
        }
        if let Some(v) = var("PROXMOX_DATASTORE") {
            self.recovery.datastore = v;
        }
        if let Some(v) = var("PROXMOX_BACKUP_DATASTORE") {
            self.recovery.backup_datastore = v;
        }
        if let Some(v) = var("PROXMOX_VERIFY_BACKUP_FIRST") {
            self.recovery.verify_backup_first =
                parse_bool(&v).ok_or_else(|| RecoveryError::InvalidSetting {
                    name: "PROXMOX_VERIFY_BACKUP_FIRST",
                    value: v.clone(),
                })?;
        }
        Ok(())
    }

    /// Garante que todos os parâmetros obrigatórios estão presentes e que os
    /// tempos fazem sentido. Lista todos os ausentes de uma vez.
    pub fn validate(&self) -> Result<(), RecoveryError> {
        let required = [
            ("PROXMOX_HOST", &self.proxmox.host),
            ("PROXMOX_NODE", &self.proxmox.node),
            ("PROXMOX_USER", &self.proxmox.user),
            ("PROXMOX_TOKEN_NAME", &self.proxmox.token_name),
            ("PROXMOX_TOKEN_VALUE", &self.proxmox.token_value),
            ("PROXMOX_DATASTORE", &self.recovery.datastore),
            ("PROXMOX_BACKUP_DATASTORE", &self.recovery.backup_datastore),
        ];
        let missing: Vec<&'static str> = required
            .iter()
            .filter(|(_, value)| value.trim().is_empty())
            .map(|(name, _)| *name)
            .collect();
        if !missing.is_empty() {
            return Err(RecoveryError::MissingSettings(missing));
        }

        for (name, secs) in [
            ("tasks.poll_interval_secs", self.tasks.poll_interval_secs),
            ("tasks.max_poll_interval_secs", self.tasks.max_poll_interval_secs),
        ] {
            if secs.is_nan() || secs <= 0.0 || secs > MAX_POLL_INTERVAL_SECS {
                return Err(RecoveryError::InvalidSetting {
                    name,
                    value: secs.to_string(),
                });
            }
        }
        Ok(())
    }

    fn poll_policy(&self, timeout_secs: u64) -> Result<PollPolicy, RecoveryError> {
        Ok(PollPolicy {
            timeout: Duration::from_secs(timeout_secs),
            initial_interval: interval(
                "tasks.poll_interval_secs",
                self.tasks.poll_interval_secs,
            )?,
            max_interval: interval(
                "tasks.max_poll_interval_secs",
                self.tasks.max_poll_interval_secs,
            )?,
        })
    }

    /// Parâmetros do orquestrador.
    pub fn recovery_settings(&self) -> Result<RecoverySettings, RecoveryError> {
        Ok(RecoverySettings {
            target_storage: self.recovery.datastore.clone(),
            backup_storage: self.recovery.backup_datastore.clone(),
            delete_policy: self.poll_policy(self.tasks.delete_timeout_secs)?,
            restore_policy: self.poll_policy(self.tasks.restore_timeout_secs)?,
            verify_backup_first: self.recovery.verify_backup_first,
        })
    }
}

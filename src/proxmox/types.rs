//! Tipos de dados das respostas da API REST do Proxmox VE (`/api2/json`).
//!
//! Toda resposta da API vem envelopada em `{"data": ...}`. As structs aqui
//! cobrem apenas os campos que a recuperação consome; campos extras são
//! ignorados na desserialização.

use serde::{Deserialize, Serialize};

use super::gateway::{BackupArtifact, TaskState, VmId};

/// Envelope padrão de toda resposta do Proxmox VE.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiResponse<T> {
    pub data: T,
}

/// Resposta de `GET /nodes/{node}/qemu/{vmid}/status/current`.
#[derive(Debug, Clone, Deserialize)]
pub struct VmCurrentStatus {
    /// Estado de energia da VM ("running", "stopped", ...).
    pub status: String,
    /// Nome da VM, quando configurado.
    #[serde(default)]
    pub name: Option<String>,
}

/// Resposta de `GET /nodes/{node}/tasks/{upid}/status`.
#[derive(Debug, Clone, Deserialize)]
pub struct TaskStatusResponse {
    /// "running" enquanto a tarefa executa, "stopped" quando termina.
    pub status: String,
    /// Resultado da tarefa terminada: "OK", "WARNINGS: n" ou a mensagem de erro.
    #[serde(default)]
    pub exitstatus: Option<String>,
}

impl TaskStatusResponse {
    /// Converte o status bruto em [`TaskState`].
    ///
    /// "stopped" aqui significa "terminou", não "VM desligada".
    pub fn state(&self) -> TaskState {
        match self.status.as_str() {
            "stopped" => match self.exitstatus.as_deref() {
                None | Some("OK") => TaskState::Succeeded,
                Some(exit) if exit.starts_with("WARNINGS") => TaskState::Succeeded,
                Some(exit) => TaskState::Failed(exit.to_string()),
            },
            "error" => TaskState::Failed(
                self.exitstatus
                    .clone()
                    .unwrap_or_else(|| "task reported status 'error'".to_string()),
            ),
            _ => TaskState::Pending,
        }
    }
}

/// Corpo (form) de `POST /nodes/{node}/qemu` para restaurar um backup.
#[derive(Debug, Serialize)]
pub struct RestoreRequest<'a> {
    pub vmid: u32,
    /// Storage de destino dos discos restaurados.
    pub storage: &'a str,
    /// `volid` do backup.
    pub archive: &'a str,
}

/// Uma entrada de `GET /nodes/{node}/storage/{storage}/content`.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageContentEntry {
    /// Identificador do volume, usado como `archive` no restore.
    pub volid: String,
    /// VM dona do volume. Ausente em ISOs e templates.
    #[serde(default)]
    pub vmid: Option<u32>,
    /// Momento de criação (epoch em segundos).
    #[serde(default)]
    pub ctime: Option<i64>,
    /// Tipo de conteúdo ("backup", "images", "iso", ...).
    #[serde(default)]
    pub content: Option<String>,
}

impl StorageContentEntry {
    /// Converte em [`BackupArtifact`] quando a entrada é um backup com dono e
    /// data de criação.
    pub fn into_artifact(self) -> Option<BackupArtifact> {
        if self.content.as_deref().is_some_and(|c| c != "backup") {
            return None;
        }
        let vmid = VmId::try_from(self.vmid?).ok()?;
        Some(BackupArtifact {
            vmid,
            volid: self.volid,
            ctime: self.ctime?,
        })
    }
}

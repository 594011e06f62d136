//! Interface de linha de comando do pve-recover baseada em clap.
//!
//! Define a struct [`Cli`] com o argumento posicional VMID e flags que
//! sobrescrevem a configuração (tempos de espera, verificação prévia de
//! backup, relatório JSON, verbose).

use std::path::PathBuf;

use clap::Parser;

use crate::config::RecoveryConfig;
use crate::proxmox::VmId;

/// pve-recover: restaura uma VM parada do Proxmox VE a partir do backup mais recente.
#[derive(Debug, Parser)]
#[command(name = "pve-recover", version, about)]
pub struct Cli {
    /// ID da VM a recuperar (inteiro positivo).
    pub vmid: VmId,

    /// Caminho do arquivo de configuração TOML (padrão: ./pve-recover.toml).
    #[arg(long, short)]
    pub config: Option<PathBuf>,

    /// Tempo máximo, em segundos, para a remoção da VM terminar.
    #[arg(long, value_name = "SECS")]
    pub delete_timeout: Option<u64>,

    /// Tempo máximo, em segundos, para o restore terminar.
    #[arg(long, value_name = "SECS")]
    pub restore_timeout: Option<u64>,

    /// Intervalo inicial entre consultas de status de tarefa, em segundos.
    #[arg(long, value_name = "SECS")]
    pub poll_interval: Option<f64>,

    /// Intervalo máximo entre consultas de status de tarefa, em segundos.
    #[arg(long, value_name = "SECS")]
    pub max_poll_interval: Option<f64>,

    /// Confirma que existe backup antes de apagar a VM.
    #[arg(long, default_value_t = false)]
    pub verify_backup_first: bool,

    /// Imprime o relatório da execução em JSON ao final.
    #[arg(long, default_value_t = false)]
    pub report: bool,

    /// Habilita saída detalhada (debug).
    #[arg(long, short, default_value_t = false)]
    pub verbose: bool,
}

impl Cli {
    /// Aplica as flags sobre a configuração já carregada (maior precedência).
    pub fn apply_overrides(&self, config: &mut RecoveryConfig) {
        if let Some(secs) = self.delete_timeout {
            config.tasks.delete_timeout_secs = secs;
        }
        if let Some(secs) = self.restore_timeout {
            config.tasks.restore_timeout_secs = secs;
        }
        if let Some(secs) = self.poll_interval {
            config.tasks.poll_interval_secs = secs;
        }
        if let Some(secs) = self.max_poll_interval {
            config.tasks.max_poll_interval_secs = secs;
        }
        if self.verify_backup_first {
            config.recovery.verify_backup_first = true;
        }
    }
}

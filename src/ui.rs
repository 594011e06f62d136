//! Saída de terminal do pve-recover: resumo colorido e relatório JSON.
//!
//! Usa a crate `console` para estilização. O [`Summary`] imprime o
//! diagnóstico final de uma execução: verde para sucesso, vermelho para
//! falha (com estágio e motivo) e amarelo quando a VM foi apagada mas não
//! restaurada.

use console::Style;

use crate::recovery::{RecoveryReport, VmDeletion};

/// Impressão do resultado final de uma recuperação.
pub struct Summary {
    // Estilo verde para sucesso.
    green: Style,
    // Estilo vermelho para falhas.
    red: Style,
    // Estilo amarelo para avisos.
    yellow: Style,
}

impl Default for Summary {
    fn default() -> Self {
        Self {
            green: Style::new().green().bold(),
            red: Style::new().red().bold(),
            yellow: Style::new().yellow(),
        }
    }
}

impl Summary {
    /// Imprime o resultado: sucesso em stdout, falha em stderr.
    pub fn outcome(&self, report: &RecoveryReport) {
        if report.outcome.is_success() {
            println!("  {} {}", self.green.apply_to("✓"), report.diagnostic());
            return;
        }

        eprintln!(
            "  {} {} ({})",
            self.red.apply_to("✗"),
            report.diagnostic(),
            report.outcome
        );
        match report.deletion {
            VmDeletion::Confirmed => eprintln!(
                "  {} VM {} was deleted and has not been restored",
                self.yellow.apply_to("!"),
                report.vmid
            ),
            VmDeletion::Initiated => eprintln!(
                "  {} VM {} deletion was started but never confirmed, it may already be gone",
                self.yellow.apply_to("!"),
                report.vmid
            ),
            VmDeletion::NotAttempted => {}
        }
    }

    /// Imprime o relatório da execução formatado em JSON.
    pub fn report(&self, report: &RecoveryReport) {
        let style = if report.outcome.is_success() {
            &self.green
        } else {
            &self.red
        };
        println!();
        println!("{}", style.apply_to("─── Recovery Report ───"));
        println!(
            "{}",
            serde_json::to_string_pretty(report).unwrap_or_default()
        );
    }

    /// Imprime um erro fatal ocorrido antes da recuperação começar.
    pub fn fatal(&self, err: &anyhow::Error) {
        eprintln!("  {} {err:#}", self.red.apply_to("✗"));
    }
}

//! Interface de terminal do sprintforge: spinners e saída colorida.
//!
//! Usa as crates `indicatif` para spinners de progresso e `console` para
//! estilização com cores. O [`RunProgress`] acompanha visualmente uma
//! execução do ciclo build-fix no terminal.

use std::time::Duration;

use console::Style;
use indicatif::{ProgressBar, ProgressStyle};

use crate::runner::RunObserver;
use crate::state_machine::{RunReport, RunStatus, State};

/// Indicador visual de progresso para uma execução no terminal.
///
/// Exibe um spinner animado com o estado atual e mensagens
/// coloridas para sucesso (verde), falha (vermelho) e reparo (amarelo).
pub struct RunProgress {
    pb: ProgressBar,
    task: String,
    green: Style,
    red: Style,
    yellow: Style,
}

impl RunProgress {
    /// Inicia o spinner com a descrição da tarefa.
    pub fn start(task: &str) -> Self {
        let pb = ProgressBar::new_spinner();
        // Template fixo; só falha se a string de template for inválida.
        if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}") {
            pb.set_style(style);
        }
        pb.set_message(format!("{}: {task}", State::Plan));
        pb.enable_steady_tick(Duration::from_millis(100));

        Self {
            pb,
            task: task.to_string(),
            green: Style::new().green().bold(),
            red: Style::new().red().bold(),
            yellow: Style::new().yellow(),
        }
    }

    /// Finaliza o spinner e exibe o resultado final da execução.
    pub fn complete(&self, report: &RunReport) {
        self.pb.finish_and_clear();
        match report.status {
            RunStatus::Succeeded => println!(
                "  {} Run completed after {} CODE pass(es)",
                self.green.apply_to("✓"),
                report.code_entries
            ),
            _ => println!(
                "  {} Run failed: {}",
                self.red.apply_to("✗"),
                report.last_diagnostic.as_deref().unwrap_or("unknown error")
            ),
        }
    }

    /// Finaliza o spinner quando a execução foi abortada antes de um estado terminal.
    pub fn abort(&self, reason: &str) {
        self.pb.finish_and_clear();
        println!("  {} Run aborted: {reason}", self.red.apply_to("✗"));
    }

    /// Imprime o relatório da execução em JSON com estilo colorido.
    pub fn print_report(&self, report: &RunReport) {
        let status_style = match report.status {
            RunStatus::Succeeded => &self.green,
            RunStatus::Failed | RunStatus::Aborted => &self.red,
            _ => &self.yellow,
        };
        println!();
        println!("{}", status_style.apply_to("─── Run Report ───"));
        match report.to_json() {
            Ok(json) => println!("{json}"),
            Err(e) => println!("{}", self.red.apply_to(format!("report unavailable: {e}"))),
        }
    }
}

impl RunObserver for RunProgress {
    fn on_state(&self, state: State) {
        self.pb.set_message(format!("{state}: {}", self.task));
    }

    fn on_retry(&self, attempt: u32, max: u32, reason: &str) {
        let first_line = reason.lines().next().unwrap_or_default();
        self.pb.println(format!(
            "  {} Repair {attempt}/{max}: {first_line}",
            self.yellow.apply_to("↻")
        ));
    }
}

//! Interface de linha de comando do sprintforge baseada em clap.
//!
//! Define a struct [`Cli`] com subcomandos [`Command`] (watch, scan, dispatch,
//! run, queue, health) e flags globais (--config, --max-retries, --backend, --verbose).

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// sprintforge: transforma linhas de backlog em artefatos gerados.
#[derive(Debug, Parser)]
#[command(name = "sprintforge", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Arquivo de configuração (padrão: sprintforge.toml no diretório atual).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Número máximo de tentativas de reparo após o primeiro teste com falha.
    #[arg(long, global = true)]
    pub max_retries: Option<u32>,

    /// Backend usado em todas as consultas, ignorando a seleção automática.
    #[arg(long, global = true)]
    pub backend: Option<String>,

    /// Habilita saída detalhada (verbose).
    #[arg(long, short, global = true, default_value_t = false)]
    pub verbose: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Varre o backlog e observa mudanças até Ctrl-C.
    Watch,

    /// Varre o backlog uma vez, despacha as linhas novas e sai.
    Scan,

    /// Processa um único arquivo de tarefa.
    Dispatch {
        /// Caminho do arquivo de tarefa.
        file: PathBuf,
    },

    /// Executa uma tarefa pelo ciclo plan/code/test/fix.
    Run {
        /// Descrição da tarefa.
        task: String,
    },

    /// Executa cada item de uma lista de tarefas, em sequência.
    Queue {
        /// Lista de tarefas, uma por linha.
        #[arg(default_value = "task_queue.txt")]
        file: PathBuf,
    },

    /// Verifica qual backend responde.
    Health,
}

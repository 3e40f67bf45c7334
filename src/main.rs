mod backend;
mod backlog;
mod cli;
mod config;
mod dedupe;
mod dispatch;
mod error;
mod fsio;
mod git;
mod naming;
mod output;
mod ports;
mod runner;
mod state_machine;
mod ui;
mod watcher;

use std::path::Path;

use anyhow::{Context, Result, bail};
use clap::Parser;
use tracing::{error, info, warn};

use backend::{GenerationClient, health_check};
use backlog::read_item_list;
use cli::{Cli, Command};
use config::ForgeConfig;
use dispatch::{DispatchOutcome, ForgeContext};
use ports::{CommandValidator, TerminalHooks};
use state_machine::RunStatus;
use ui::RunProgress;
use watcher::BacklogWatcher;

type AppContext = ForgeContext<GenerationClient, CommandValidator>;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose {
        "sprintforge=debug"
    } else {
        "sprintforge=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .init();

    let mut config = ForgeConfig::load(cli.config.as_deref()).context("failed to load config")?;
    if let Some(n) = cli.max_retries {
        config.max_retries = n;
    }

    let client = GenerationClient::new(config.endpoint.clone(), config.request_timeout())
        .context("failed to build backend client")?;
    let validator = CommandValidator::new(config.project_root.clone(), config.test_commands.clone());
    let hooks = TerminalHooks::from_flags(&config.project_root, config.auto_commit, config.notify);
    let ctx = ForgeContext::new(config, client, validator, hooks, cli.backend.clone());

    match cli.command {
        Command::Watch => watch(&ctx).await,
        Command::Scan => scan(&ctx).await,
        Command::Dispatch { file } => match ctx.dispatch(&file).await {
            DispatchOutcome::Processed => Ok(()),
            DispatchOutcome::AlreadyInFlight => Ok(()),
            DispatchOutcome::Failed => bail!("failed to process {}", file.display()),
        },
        Command::Run { task } => run_task(&ctx, &task).await.map(|_| ()),
        Command::Queue { file } => queue(&ctx, &file).await,
        Command::Health => {
            let backends = ctx.selector.known_backends();
            match health_check(&ctx.generator, &backends).await {
                Some(backend) => {
                    println!("{backend} is responding");
                    Ok(())
                }
                None => bail!("no backend responded at {}", ctx.config.endpoint),
            }
        }
    }
}

async fn watch(ctx: &AppContext) -> Result<()> {
    if health_check(&ctx.generator, &ctx.selector.known_backends())
        .await
        .is_none()
    {
        warn!("no backend is responding; work items may only produce error artifacts");
    }

    let mut watcher = BacklogWatcher::new(ctx);
    let backlog = ctx.config.backlog_path();
    if backlog.exists() {
        watcher.on_backlog_changed(&backlog).await;
    }

    watcher
        .watch(shutdown_signal())
        .await
        .context("watcher stopped")?;
    info!("bye");
    Ok(())
}

/// Resolves on Ctrl-C, or on SIGTERM where there is one.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to listen for ctrl-c: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("ctrl-c received"),
        _ = terminate => info!("SIGTERM received"),
    }
}

async fn scan(ctx: &AppContext) -> Result<()> {
    let backlog = ctx.config.backlog_path();
    if !backlog.exists() {
        warn!(backlog = %backlog.display(), "backlog not found, nothing to scan");
        return Ok(());
    }
    let summary = BacklogWatcher::new(ctx).on_backlog_changed(&backlog).await;
    println!(
        "dispatched {}, skipped {}, failed {} ({} lines recorded)",
        summary.dispatched,
        summary.skipped,
        summary.failed,
        ctx.dedupe.len()
    );
    Ok(())
}

async fn run_task(ctx: &AppContext, task: &str) -> Result<RunStatus> {
    let progress = RunProgress::start(task);
    match ctx.runner().run(task, &progress).await {
        Ok(report) => {
            progress.complete(&report);
            progress.print_report(&report);
            Ok(report.status)
        }
        Err(e) => {
            progress.abort(&e.to_string());
            Err(e.into())
        }
    }
}

/// Runs every listed task; a failing task is reported and the queue moves on.
async fn queue(ctx: &AppContext, file: &Path) -> Result<()> {
    let items = read_item_list(file)
        .with_context(|| format!("failed to read task list {}", file.display()))?;
    if items.is_empty() {
        warn!(list = %file.display(), "task list is empty");
        return Ok(());
    }

    let total = items.len();
    let mut succeeded = 0;
    for (i, task) in items.iter().enumerate() {
        info!(position = i + 1, total, task = %task, "queue item");
        match run_task(ctx, task).await {
            Ok(RunStatus::Succeeded) => succeeded += 1,
            Ok(status) => warn!(task = %task, ?status, "queue item did not succeed"),
            Err(e) => error!(task = %task, "queue item aborted: {e:#}"),
        }
    }
    println!("{succeeded}/{total} tasks succeeded");
    Ok(())
}

//! Work item dispatch with an at-most-one-in-flight guard per item.

use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use tracing::{debug, error, info, warn};

use crate::backend::{BackendSelector, RetryPolicy, TextGenerator, query};
use crate::backlog::split_item_key;
use crate::config::{DispatchMode, ForgeConfig};
use crate::dedupe::DedupeCache;
use crate::fsio::move_into;
use crate::output::{ArtifactRouter, ArtifactStores, base_name};
use crate::ports::{TerminalHooks, Validator};
use crate::runner::{BuildFixRunner, Quiet, RunSettings};

/// Identities of work items currently being processed.
#[derive(Debug, Default)]
pub struct InFlightSet {
    items: Mutex<HashSet<PathBuf>>,
}

impl InFlightSet {
    /// Claims `id`, or returns `None` if another caller holds it.
    /// The claim is released when the guard is dropped.
    pub fn try_acquire(&self, id: &Path) -> Option<InFlightGuard<'_>> {
        let mut items = self.items.lock().unwrap_or_else(|e| e.into_inner());
        if !items.insert(id.to_path_buf()) {
            return None;
        }
        Some(InFlightGuard {
            set: self,
            id: id.to_path_buf(),
        })
    }
}

pub struct InFlightGuard<'a> {
    set: &'a InFlightSet,
    id: PathBuf,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.set
            .items
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&self.id);
    }
}

/// Result of one [`ForgeContext::dispatch`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Processed,
    /// Another dispatch of the same item is running; nothing was done.
    AlreadyInFlight,
    Failed,
}

/// Everything the watcher, dispatcher and runner share for one process.
pub struct ForgeContext<G, V> {
    pub config: ForgeConfig,
    pub generator: G,
    pub validator: V,
    pub selector: BackendSelector,
    pub dedupe: DedupeCache,
    pub in_flight: InFlightSet,
    pub router: ArtifactRouter,
    pub hooks: TerminalHooks,
    pub policy: RetryPolicy,
    /// Backend forced from the command line for every query.
    pub backend_override: Option<String>,
}

impl<G: TextGenerator, V: Validator> ForgeContext<G, V> {
    pub fn new(
        config: ForgeConfig,
        generator: G,
        validator: V,
        hooks: TerminalHooks,
        backend_override: Option<String>,
    ) -> Self {
        let selector = BackendSelector::new(config.backends.clone());
        let dedupe = DedupeCache::open(config.dedupe_cache_path());
        let router = ArtifactRouter::new(ArtifactStores::from_config(&config));
        let policy = RetryPolicy {
            max_attempts: config.retry_attempts,
            backoff_base: config.backoff_base(),
        };
        Self {
            config,
            generator,
            validator,
            selector,
            dedupe,
            in_flight: InFlightSet::default(),
            router,
            hooks,
            policy,
            backend_override,
        }
    }

    pub fn tasks_dir(&self) -> PathBuf {
        self.config.resolve(&self.config.stores.tasks)
    }

    pub fn processed_dir(&self) -> PathBuf {
        self.config.resolve(&self.config.stores.processed)
    }

    pub fn runner(&self) -> BuildFixRunner<'_, G, V> {
        BuildFixRunner::new(
            &self.generator,
            &self.validator,
            &self.selector,
            &self.hooks,
            self.policy.clone(),
            RunSettings::from_config(&self.config, self.backend_override.as_deref()),
        )
    }

    /// Processes the work item at `path` unless it is already in flight,
    /// then moves it into the processed store.
    ///
    /// Items materialised from the backlog carry their line's key; it is
    /// recorded in the dedupe cache whichever event got the item processed.
    pub async fn dispatch(&self, path: &Path) -> DispatchOutcome {
        let id = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
        let Some(_guard) = self.in_flight.try_acquire(&id) else {
            info!(item = %path.display(), "already in flight, skipping");
            return DispatchOutcome::AlreadyInFlight;
        };

        let key = match self.process(path).await {
            Ok(key) => key,
            Err(e) => {
                error!(item = %path.display(), "dispatch failed: {e:#}");
                return DispatchOutcome::Failed;
            }
        };
        if let Some(key) = key
            && let Err(e) = self.dedupe.add(&key)
        {
            error!(item = %path.display(), "failed to record processed line: {e}");
        }

        match move_into(path, &self.processed_dir()) {
            Ok(dst) => info!(item = %path.display(), to = %dst.display(), "work item archived"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                warn!(item = %path.display(), "work item vanished before it could be archived");
            }
            Err(e) => error!(item = %path.display(), "failed to archive work item: {e}"),
        }
        DispatchOutcome::Processed
    }

    /// Returns the backlog key of the processed item, if it has one.
    async fn process(&self, path: &Path) -> Result<Option<String>> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read work item {}", path.display()))?;
        let (key, prompt) = split_item_key(&content);

        match self.config.dispatch_mode {
            DispatchMode::Generate => {
                // Classify on the task alone; the section instructions name every kind.
                let candidates = self
                    .selector
                    .candidates(self.backend_override.as_deref(), &task_from_item(&prompt));
                info!(
                    item = %path.display(),
                    backend = %candidates.first().map(String::as_str).unwrap_or_default(),
                    "processing work item"
                );
                let result = query(&self.generator, &candidates, &prompt, &self.policy).await;
                info!(backend = %result.backend_id, "backend used");

                let base = base_name(path);
                self.router.log_response(&result.text, &base);
                let routed = self.router.route(&result.text, &base);
                for artifact in &routed {
                    debug!(kind = %artifact.kind, path = %artifact.path.display(), "routed");
                }
                info!(item = %path.display(), artifacts = routed.len(), "response routed");
            }
            DispatchMode::BuildFix => {
                let report = self.runner().run(&task_from_item(&prompt), &Quiet).await?;
                info!(
                    item = %path.display(),
                    status = ?report.status,
                    code_entries = report.code_entries,
                    "build-fix run finished"
                );
            }
        }
        Ok(key)
    }
}

/// The task line of a materialised work item, or the whole text for hand-written ones.
fn task_from_item(content: &str) -> String {
    content
        .lines()
        .find_map(|l| l.strip_prefix("# Task:"))
        .map(|t| t.trim().to_string())
        .unwrap_or_else(|| content.trim().to_string())
}

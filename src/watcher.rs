//! Watches the backlog and the task directory and feeds the dispatcher.
//!
//! The notify callback only forwards paths over a channel; scanning and
//! dispatch run on the async side, one event at a time.

use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use chrono::Local;
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use sha2::{Digest, Sha256};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::backend::TextGenerator;
use crate::backlog::{WorkItem, WorkItemStatus, extract_lines};
use crate::dispatch::{DispatchOutcome, ForgeContext};
use crate::error::ForgeError;
use crate::fsio::atomic_write;
use crate::ports::Validator;

/// Drops events for a path that arrive within `window` of the last accepted one.
#[derive(Debug)]
pub struct Debouncer {
    window: Duration,
    last_accepted: HashMap<PathBuf, Instant>,
}

impl Debouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_accepted: HashMap::new(),
        }
    }

    pub fn accept(&mut self, path: &Path) -> bool {
        self.accept_at(path, Instant::now())
    }

    fn accept_at(&mut self, path: &Path, now: Instant) -> bool {
        if let Some(last) = self.last_accepted.get(path)
            && now.saturating_duration_since(*last) < self.window
        {
            return false;
        }
        self.last_accepted.insert(path.to_path_buf(), now);
        true
    }
}

/// Counters for one backlog scan.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ScanSummary {
    pub dispatched: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// What a filesystem path means to the watcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Source {
    Backlog,
    WorkItem,
}

pub struct BacklogWatcher<'a, G, V> {
    ctx: &'a ForgeContext<G, V>,
    last_hash: Option<String>,
    debouncer: Debouncer,
}

impl<'a, G: TextGenerator, V: Validator> BacklogWatcher<'a, G, V> {
    pub fn new(ctx: &'a ForgeContext<G, V>) -> Self {
        Self {
            ctx,
            last_hash: None,
            debouncer: Debouncer::new(ctx.config.debounce()),
        }
    }

    /// Re-reads the backlog at `path`; unchanged content is a no-op.
    pub async fn on_backlog_changed(&mut self, path: &Path) -> ScanSummary {
        let text = match std::fs::read_to_string(path) {
            Ok(t) => t,
            Err(e) => {
                error!(backlog = %path.display(), "failed to read backlog: {e}");
                return ScanSummary::default();
            }
        };

        let hash = format!("{:x}", Sha256::digest(text.as_bytes()));
        if self.last_hash.as_deref() == Some(hash.as_str()) {
            debug!(backlog = %path.display(), "backlog content unchanged");
            return ScanSummary::default();
        }
        self.last_hash = Some(hash);

        info!(backlog = %path.display(), "backlog changed, scanning");
        self.scan_text(&text).await
    }

    /// Materialises and dispatches every marker line not yet in the dedupe cache,
    /// in file order. The dispatcher records the line once its item is processed.
    pub async fn scan_text(&self, text: &str) -> ScanSummary {
        let mut summary = ScanSummary::default();
        let tasks_dir = self.ctx.tasks_dir();

        for line in extract_lines(text, &self.ctx.config.marker) {
            if self.ctx.dedupe.contains(&line.key) {
                info!(line = %line.text, "already processed, skipping");
                summary.skipped += 1;
                continue;
            }

            let mut item = WorkItem::for_line(&tasks_dir, &line, Local::now());
            if let Err(e) = atomic_write(&item.path, &item.content()) {
                error!(item = %item.path.display(), "failed to create work item: {e}");
                summary.failed += 1;
                continue;
            }
            info!(
                item = %item.path.display(),
                created_at = %item.created_at.format("%H:%M:%S"),
                "work item created"
            );

            item.status = WorkItemStatus::InFlight;
            match self.ctx.dispatch(&item.path).await {
                DispatchOutcome::Processed => {
                    item.status = WorkItemStatus::Done;
                    summary.dispatched += 1;
                }
                DispatchOutcome::AlreadyInFlight => summary.skipped += 1,
                DispatchOutcome::Failed => summary.failed += 1,
            }
            debug!(item = %item.path.display(), status = ?item.status, "work item settled");
        }
        summary
    }

    /// A work item file appeared or changed in the task directory.
    pub async fn on_work_item_created(&self, path: &Path) -> DispatchOutcome {
        info!(item = %path.display(), "work item detected");
        self.ctx.dispatch(path).await
    }

    fn classify(&self, path: &Path) -> Option<Source> {
        let backlog = self.ctx.config.backlog_path();
        if path.file_name().is_some() && path.file_name() == backlog.file_name() {
            return Some(Source::Backlog);
        }
        let in_tasks_dir = path.parent().and_then(Path::file_name) == self.ctx.tasks_dir().file_name();
        let is_markdown = path.extension().is_some_and(|ext| ext == "md");
        (in_tasks_dir && is_markdown).then_some(Source::WorkItem)
    }

    /// Routes one filesystem event path.
    pub async fn handle_path(&mut self, path: PathBuf) {
        let Some(source) = self.classify(&path) else {
            return;
        };
        if !path.exists() {
            debug!(path = %path.display(), "event for missing path ignored");
            return;
        }
        if !self.debouncer.accept(&path) {
            debug!(path = %path.display(), "debounced");
            return;
        }
        match source {
            Source::Backlog => {
                let summary = self.on_backlog_changed(&path).await;
                if summary != ScanSummary::default() {
                    info!(
                        dispatched = summary.dispatched,
                        skipped = summary.skipped,
                        failed = summary.failed,
                        "backlog scan finished"
                    );
                }
            }
            Source::WorkItem => {
                self.on_work_item_created(&path).await;
            }
        }
    }

    /// Watches until `shutdown` resolves. The event being handled when the
    /// signal arrives runs to completion; no new event is picked up after.
    pub async fn watch(&mut self, shutdown: impl Future<Output = ()>) -> Result<(), ForgeError> {
        let (tx, mut rx) = mpsc::unbounded_channel::<PathBuf>();

        let mut watcher: RecommendedWatcher =
            notify::recommended_watcher(move |res: Result<notify::Event, notify::Error>| match res {
                Ok(event) => {
                    if matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_)) {
                        for path in event.paths {
                            let _ = tx.send(path);
                        }
                    }
                }
                Err(e) => warn!("watch error: {e}"),
            })?;

        let tasks_dir = self.ctx.tasks_dir();
        std::fs::create_dir_all(&tasks_dir)?;
        let backlog = self.ctx.config.backlog_path();
        let backlog_dir = match backlog.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        };
        watcher.watch(&backlog_dir, RecursiveMode::NonRecursive)?;
        if tasks_dir != backlog_dir {
            watcher.watch(&tasks_dir, RecursiveMode::NonRecursive)?;
        }
        info!(
            backlog = %backlog.display(),
            tasks = %tasks_dir.display(),
            "watching for changes"
        );

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("shutdown requested, watcher stopping");
                    break;
                }
                next = rx.recv() => match next {
                    Some(path) => self.handle_path(path).await,
                    None => break,
                },
            }
        }
        drop(watcher);
        Ok(())
    }
}

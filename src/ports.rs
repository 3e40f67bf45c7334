//! Narrow interfaces to the side-effecting collaborators of a build-fix run:
//! the validator, version control, and desktop notifications.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::git::GitManager;

/// Verdict of one validation pass over a generated artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Validation {
    Pass,
    Fail(String),
}

/// Opaque pass/fail oracle for generated artifacts.
#[allow(async_fn_in_trait)]
pub trait Validator {
    async fn validate(&self, artifact: &Path) -> Validation;
}

/// Runs the configured test commands in the project root.
///
/// An empty command list always passes.
pub struct CommandValidator {
    project_root: PathBuf,
    commands: Vec<Vec<String>>,
}

impl CommandValidator {
    pub fn new(project_root: PathBuf, commands: Vec<Vec<String>>) -> Self {
        Self {
            project_root,
            commands,
        }
    }
}

impl Validator for CommandValidator {
    async fn validate(&self, artifact: &Path) -> Validation {
        for argv in &self.commands {
            let Some((program, args)) = argv.split_first() else {
                continue;
            };
            debug!(command = ?argv, "running validation command");
            let output = Command::new(program)
                .args(args)
                .current_dir(&self.project_root)
                .env("SPRINTFORGE_ARTIFACT", artifact)
                .stdin(Stdio::null())
                .output()
                .await;

            match output {
                Ok(out) if out.status.success() => {}
                Ok(out) => {
                    let mut diagnostic = String::from_utf8_lossy(&out.stderr).into_owned();
                    diagnostic.push_str(&String::from_utf8_lossy(&out.stdout));
                    let diagnostic = diagnostic.trim();
                    return Validation::Fail(if diagnostic.is_empty() {
                        format!("`{}` exited with {}", argv.join(" "), out.status)
                    } else {
                        diagnostic.to_string()
                    });
                }
                Err(e) => {
                    return Validation::Fail(format!("failed to run `{}`: {e}", argv.join(" ")));
                }
            }
        }
        Validation::Pass
    }
}

/// Records a successful artifact in version control.
pub trait VersionControl {
    fn commit_artifact(&self, artifact: &Path) -> Result<()>;
}

/// Commits through libgit2 in the repository containing `repo_path`.
pub struct GitCommitter {
    repo_path: PathBuf,
}

impl GitCommitter {
    pub fn new(repo_path: PathBuf) -> Self {
        Self { repo_path }
    }
}

impl VersionControl for GitCommitter {
    fn commit_artifact(&self, artifact: &Path) -> Result<()> {
        let git = GitManager::open(&self.repo_path).context("failed to open git repository")?;
        let hash = git
            .commit_artifact(artifact)
            .with_context(|| format!("failed to commit {}", artifact.display()))?;
        let branch = git.current_branch().unwrap_or_else(|_| "HEAD".to_string());
        info!(commit = %hash, %branch, artifact = %artifact.display(), "artifact committed");
        Ok(())
    }
}

/// Shows a message to the person at the keyboard.
pub trait Notifier {
    fn notify(&self, title: &str, message: &str) -> Result<()>;
}

/// `osascript` on macOS, `notify-send` elsewhere.
pub struct DesktopNotifier;

impl Notifier for DesktopNotifier {
    fn notify(&self, title: &str, message: &str) -> Result<()> {
        let status = if cfg!(target_os = "macos") {
            std::process::Command::new("osascript")
                .arg("-e")
                .arg(format!(
                    "display notification {message:?} with title {title:?}"
                ))
                .status()
        } else {
            std::process::Command::new("notify-send")
                .arg(title)
                .arg(message)
                .status()
        }
        .context("failed to launch notifier")?;

        if !status.success() {
            bail!("notifier exited with {status}");
        }
        Ok(())
    }
}

/// Stand-in for a disabled collaborator.
pub struct NoOp;

impl VersionControl for NoOp {
    fn commit_artifact(&self, _artifact: &Path) -> Result<()> {
        Ok(())
    }
}

impl Notifier for NoOp {
    fn notify(&self, _title: &str, _message: &str) -> Result<()> {
        Ok(())
    }
}

/// Commit/notify hooks invoked once a run reaches a terminal state.
///
/// Both collaborators block (libgit2, child processes), so they run on
/// tokio's blocking pool.
pub struct TerminalHooks {
    vcs: Arc<dyn VersionControl + Send + Sync>,
    notifier: Arc<dyn Notifier + Send + Sync>,
}

impl TerminalHooks {
    pub fn new(
        vcs: Box<dyn VersionControl + Send + Sync>,
        notifier: Box<dyn Notifier + Send + Sync>,
    ) -> Self {
        Self {
            vcs: Arc::from(vcs),
            notifier: Arc::from(notifier),
        }
    }

    /// Both hooks disabled.
    pub fn disabled() -> Self {
        Self::new(Box::new(NoOp), Box::new(NoOp))
    }

    /// Real collaborators where `auto_commit` / `notify` are set, no-ops otherwise.
    pub fn from_flags(project_root: &Path, auto_commit: bool, notify: bool) -> Self {
        let vcs: Box<dyn VersionControl + Send + Sync> = if auto_commit {
            Box::new(GitCommitter::new(project_root.to_path_buf()))
        } else {
            Box::new(NoOp)
        };
        let notifier: Box<dyn Notifier + Send + Sync> = if notify {
            Box::new(DesktopNotifier)
        } else {
            Box::new(NoOp)
        };
        Self::new(vcs, notifier)
    }

    /// Hook failures are logged, never propagated.
    pub async fn on_success(&self, artifact: Option<&Path>) {
        let vcs = Arc::clone(&self.vcs);
        let notifier = Arc::clone(&self.notifier);
        let artifact = artifact.map(Path::to_path_buf);
        run_blocking(move || {
            let name = display_name(artifact.as_deref());
            if let Some(path) = &artifact
                && let Err(e) = vcs.commit_artifact(path)
            {
                warn!("auto-commit failed: {e:#}");
            }
            if let Err(e) = notifier.notify("sprintforge: success", &format!("{name} generated")) {
                warn!("notification failed: {e:#}");
            }
        })
        .await;
    }

    pub async fn on_failure(&self, artifact: Option<&Path>) {
        let notifier = Arc::clone(&self.notifier);
        let name = display_name(artifact);
        run_blocking(move || {
            if let Err(e) =
                notifier.notify("sprintforge: failure", &format!("{name} could not be generated"))
            {
                warn!("notification failed: {e:#}");
            }
        })
        .await;
    }
}

async fn run_blocking(hook: impl FnOnce() + Send + 'static) {
    if let Err(e) = tokio::task::spawn_blocking(hook).await {
        warn!("terminal hook did not complete: {e}");
    }
}

fn display_name(artifact: Option<&Path>) -> String {
    artifact
        .and_then(|p| p.file_name())
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "artifact".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default, Clone)]
    struct Recorder {
        commits: Arc<Mutex<Vec<PathBuf>>>,
        notes: Arc<Mutex<Vec<String>>>,
    }

    impl VersionControl for Recorder {
        fn commit_artifact(&self, artifact: &Path) -> Result<()> {
            self.commits.lock().unwrap().push(artifact.to_path_buf());
            Ok(())
        }
    }

    impl Notifier for Recorder {
        fn notify(&self, title: &str, message: &str) -> Result<()> {
            self.notes.lock().unwrap().push(format!("{title}|{message}"));
            Ok(())
        }
    }

    struct Broken;

    impl VersionControl for Broken {
        fn commit_artifact(&self, _artifact: &Path) -> Result<()> {
            bail!("no repository")
        }
    }

    #[tokio::test]
    async fn success_commits_and_notifies() {
        let rec = Recorder::default();
        let hooks = TerminalHooks::new(Box::new(rec.clone()), Box::new(rec.clone()));

        hooks.on_success(Some(Path::new("generated/fsm_gen_1.dart"))).await;

        assert_eq!(
            *rec.commits.lock().unwrap(),
            vec![PathBuf::from("generated/fsm_gen_1.dart")]
        );
        assert_eq!(
            *rec.notes.lock().unwrap(),
            vec!["sprintforge: success|fsm_gen_1.dart generated".to_string()]
        );
    }

    #[tokio::test]
    async fn failure_only_notifies() {
        let rec = Recorder::default();
        let hooks = TerminalHooks::new(Box::new(rec.clone()), Box::new(rec.clone()));

        hooks.on_failure(None).await;

        assert!(rec.commits.lock().unwrap().is_empty());
        assert_eq!(rec.notes.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn commit_failure_does_not_block_notification() {
        let rec = Recorder::default();
        let hooks = TerminalHooks::new(Box::new(Broken), Box::new(rec.clone()));

        hooks.on_success(Some(Path::new("a.dart"))).await;

        assert_eq!(rec.notes.lock().unwrap().len(), 1);
    }

    /// Notes the thread each notification ran on.
    #[derive(Default, Clone)]
    struct ThreadSpy {
        threads: Arc<Mutex<Vec<std::thread::ThreadId>>>,
    }

    impl Notifier for ThreadSpy {
        fn notify(&self, _title: &str, _message: &str) -> Result<()> {
            self.threads.lock().unwrap().push(std::thread::current().id());
            Ok(())
        }
    }

    #[tokio::test]
    async fn hooks_run_off_the_async_thread() {
        let spy = ThreadSpy::default();
        let hooks = TerminalHooks::new(Box::new(NoOp), Box::new(spy.clone()));

        hooks.on_success(None).await;
        hooks.on_failure(None).await;

        let threads = spy.threads.lock().unwrap();
        assert_eq!(threads.len(), 2);
        assert!(threads.iter().all(|t| *t != std::thread::current().id()));
    }

    #[tokio::test]
    async fn empty_command_list_passes() {
        let v = CommandValidator::new(PathBuf::from("."), vec![]);
        assert_eq!(v.validate(Path::new("x.dart")).await, Validation::Pass);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn failing_command_reports_its_output() {
        let tmp = tempfile::TempDir::new().unwrap();
        let v = CommandValidator::new(
            tmp.path().to_path_buf(),
            vec![
                vec!["true".into()],
                vec![
                    "sh".into(),
                    "-c".into(),
                    "echo \"bad $SPRINTFORGE_ARTIFACT\" >&2; exit 1".into(),
                ],
            ],
        );

        let verdict = v.validate(Path::new("gen.dart")).await;
        assert_eq!(verdict, Validation::Fail("bad gen.dart".into()));
    }

    #[tokio::test]
    async fn missing_program_fails() {
        let v = CommandValidator::new(
            PathBuf::from("."),
            vec![vec!["definitely-not-a-real-binary-xyz".into()]],
        );
        match v.validate(Path::new("x")).await {
            Validation::Fail(msg) => assert!(msg.contains("failed to run")),
            Validation::Pass => panic!("expected failure"),
        }
    }
}

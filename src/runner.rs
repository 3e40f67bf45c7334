use std::path::PathBuf;

use chrono::Local;
use tracing::{error, info, warn};

use crate::backend::{BackendSelector, RetryPolicy, TextGenerator, query};
use crate::config::ForgeConfig;
use crate::error::ForgeError;
use crate::fsio::write_file;
use crate::naming::artifact_file_name;
use crate::output::extract_code;
use crate::ports::{TerminalHooks, Validation, Validator};
use crate::state_machine::{
    Event, RunContext, RunOutcome, RunReport, RunStatus, State, StateMachine, Transition,
};

/// Receives progress while a run advances. Both methods default to no-ops.
pub trait RunObserver {
    fn on_state(&self, _state: State) {}
    fn on_retry(&self, _attempt: u32, _max: u32, _reason: &str) {}
}

/// Observer that ignores everything.
pub struct Quiet;

impl RunObserver for Quiet {}

/// Per-run knobs resolved from the configuration and CLI overrides.
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub plan_backend: String,
    pub code_backend: String,
    pub fix_backend: String,
    pub output_dir: PathBuf,
    pub file_prefix: String,
    pub file_extension: String,
    pub max_retries: u32,
}

impl RunSettings {
    /// `backend_override` replaces all three phase backends when set.
    pub fn from_config(config: &ForgeConfig, backend_override: Option<&str>) -> Self {
        let pick = |configured: &String| {
            backend_override
                .map(str::to_string)
                .unwrap_or_else(|| configured.clone())
        };
        Self {
            plan_backend: pick(&config.plan_backend),
            code_backend: pick(&config.code_backend),
            fix_backend: pick(&config.fix_backend),
            output_dir: config.resolve(&config.output_dir),
            file_prefix: config.file_prefix.clone(),
            file_extension: config.file_extension.clone(),
            max_retries: config.max_retries,
        }
    }
}

fn plan_prompt(task: &str) -> String {
    format!(
        "Break this task into 2-3 short implementation steps, without too much detail.\n\n\
         TASK: {task}\n\nSteps:"
    )
}

fn code_prompt(task: &str, plan: &str) -> String {
    format!(
        "Write only the source code for the task below. No explanations, no prose, \
         include every import the code needs.\n\n\
         Task: {task}\n\nPlan:\n{}\n\nCode:",
        plan.trim()
    )
}

fn fix_prompt(code: &str, diagnostic: &str) -> String {
    format!(
        "The following code fails validation. Fix the error and reply with the \
         corrected code only, no explanations.\n\n\
         CODE:\n```\n{code}\n```\n\nERROR: {diagnostic}\n\nFIXED CODE:"
    )
}

/// Marks the run aborted and logs what it got through before stopping.
fn abort(run: &mut RunContext, e: ForgeError) -> ForgeError {
    run.status = RunStatus::Aborted;
    let report = RunReport::from_run(run);
    error!(
        run_id = %report.run_id,
        state = %run.state,
        code_entries = report.code_entries,
        "run aborted: {e}"
    );
    e
}

/// Drives one task through PLAN → CODE → TEST → (SUCCESS | FIX → CODE … | FAILURE).
pub struct BuildFixRunner<'a, G, V> {
    generator: &'a G,
    validator: &'a V,
    selector: &'a BackendSelector,
    hooks: &'a TerminalHooks,
    policy: RetryPolicy,
    settings: RunSettings,
}

impl<'a, G: TextGenerator, V: Validator> BuildFixRunner<'a, G, V> {
    pub fn new(
        generator: &'a G,
        validator: &'a V,
        selector: &'a BackendSelector,
        hooks: &'a TerminalHooks,
        policy: RetryPolicy,
        settings: RunSettings,
    ) -> Self {
        Self {
            generator,
            validator,
            selector,
            hooks,
            policy,
            settings,
        }
    }

    /// Runs `task` to a terminal state and returns its report.
    ///
    /// A validator failure past the repair budget is a normal `FAILURE`
    /// report. Errors are reserved for aborts: the artifact could not be
    /// written, or the machine rejected a transition.
    pub async fn run(
        &self,
        task: &str,
        observer: &impl RunObserver,
    ) -> Result<RunReport, ForgeError> {
        let task = task.trim();
        if task.is_empty() {
            return Err(ForgeError::Config("task description must not be empty".into()));
        }

        let mut run = RunContext::new(task.to_string(), self.settings.max_retries);
        run.status = RunStatus::InProgress;
        info!(run_id = %run.id, task, "build-fix run started");
        observer.on_state(run.state);

        loop {
            let event = match run.state {
                State::Plan => {
                    run.plan = self.ask(&self.settings.plan_backend, &plan_prompt(task)).await;
                    Event::Planned
                }
                State::Code => {
                    if run.retry_count == 0 {
                        let reply = self
                            .ask(&self.settings.code_backend, &code_prompt(task, &run.plan))
                            .await;
                        run.content = extract_code(&reply);
                    }
                    if let Err(e) = self.persist(&mut run) {
                        return Err(abort(&mut run, e));
                    }
                    Event::Persisted
                }
                State::Test => {
                    let Some(artifact) = run.artifact.clone() else {
                        let e = ForgeError::InvalidTransition {
                            state: State::Test,
                            event: "validate",
                        };
                        return Err(abort(&mut run, e));
                    };
                    match self.validator.validate(&artifact).await {
                        Validation::Pass => Event::Passed,
                        Validation::Fail(diagnostic) => {
                            warn!(run_id = %run.id, "validation failed: {diagnostic}");
                            Event::Failed(diagnostic)
                        }
                    }
                }
                State::Fix => Event::Repair,
                State::Success | State::Failure => break,
            };

            let transition = match StateMachine::next(&mut run, event) {
                Ok(t) => t,
                Err(e) => return Err(abort(&mut run, e)),
            };

            match transition {
                Transition::Next(_) => {}
                Transition::Retry { attempt, reason } => {
                    observer.on_retry(attempt, run.max_retries, &reason);
                    info!(run_id = %run.id, attempt, max = run.max_retries, "repairing");
                    let reply = self
                        .ask(&self.settings.fix_backend, &fix_prompt(&run.content, &reason))
                        .await;
                    run.content = extract_code(&reply);
                }
                Transition::Complete(RunOutcome::Success) => {
                    info!(run_id = %run.id, "run succeeded");
                    self.hooks.on_success(run.artifact.as_deref()).await;
                }
                Transition::Complete(RunOutcome::Failure(reason)) => {
                    warn!(
                        run_id = %run.id,
                        retries = run.retry_count,
                        "run failed: {reason}"
                    );
                    self.hooks.on_failure(run.artifact.as_deref()).await;
                }
            }
            observer.on_state(run.state);
        }

        Ok(RunReport::from_run(&run))
    }

    async fn ask(&self, backend: &str, prompt: &str) -> String {
        let candidates = self.selector.candidates(Some(backend), prompt);
        let result = query(self.generator, &candidates, prompt, &self.policy).await;
        if result.is_exhausted() {
            warn!(backend, "continuing with backend error text");
        }
        result.text
    }

    /// Writes the current content to the run's artifact, naming it on first use.
    fn persist(&self, run: &mut RunContext) -> Result<(), ForgeError> {
        let path = run
            .artifact
            .get_or_insert_with(|| {
                self.settings.output_dir.join(artifact_file_name(
                    &self.settings.file_prefix,
                    &self.settings.file_extension,
                    Local::now(),
                ))
            })
            .clone();
        write_file(&path, &run.content).map_err(|source| ForgeError::Persist {
            path: path.clone(),
            source,
        })?;
        info!(path = %path.display(), "artifact written");
        Ok(())
    }
}

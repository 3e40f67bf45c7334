use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::state::State;
use crate::error::ForgeError;

/// How a run ended, as decided by the state machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunOutcome {
    Success,
    /// Validation still failing after the repair budget; carries the last diagnostic.
    Failure(String),
}

impl std::fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunOutcome::Success => write!(f, "success"),
            RunOutcome::Failure(msg) => write!(f, "failure: {msg}"),
        }
    }
}

/// Lifecycle status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    Pending,
    InProgress,
    Succeeded,
    Failed,
    /// Stopped outside the normal FIX budget (persistence failure, invalid transition).
    Aborted,
}

/// Mutable state of one task's traversal of the build-fix loop.
/// Owned by a single run, never shared.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub id: String,
    pub task: String,
    pub state: State,
    pub state_history: Vec<State>,
    pub status: RunStatus,
    /// Task breakdown returned by the planning call.
    pub plan: String,
    /// Latest generated or repaired content.
    pub content: String,
    pub last_diagnostic: Option<String>,
    pub retry_count: u32,
    pub max_retries: u32,
    /// Number of times CODE was entered.
    pub code_entries: u32,
    pub artifact: Option<PathBuf>,
    pub started_at: DateTime<Utc>,
}

impl RunContext {
    pub fn new(task: String, max_retries: u32) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            task,
            state: State::Plan,
            state_history: Vec::new(),
            status: RunStatus::Pending,
            plan: String::new(),
            content: String::new(),
            last_diagnostic: None,
            retry_count: 0,
            max_retries,
            code_entries: 0,
            artifact: None,
            started_at: Utc::now(),
        }
    }
}

/// Structured record produced when a run stops.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: String,
    pub task: String,
    pub status: RunStatus,
    pub state_transitions: Vec<State>,
    pub retry_count: u32,
    pub max_retries: u32,
    pub code_entries: u32,
    pub artifact: Option<PathBuf>,
    pub last_diagnostic: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub duration_ms: i64,
}

impl RunReport {
    pub fn from_run(run: &RunContext) -> Self {
        let now = Utc::now();
        let mut transitions = run.state_history.clone();
        transitions.push(run.state);

        Self {
            run_id: run.id.clone(),
            task: run.task.clone(),
            status: run.status,
            state_transitions: transitions,
            retry_count: run.retry_count,
            max_retries: run.max_retries,
            code_entries: run.code_entries,
            artifact: run.artifact.clone(),
            last_diagnostic: run.last_diagnostic.clone(),
            started_at: run.started_at,
            completed_at: now,
            duration_ms: (now - run.started_at).num_milliseconds(),
        }
    }

    pub fn to_json(&self) -> Result<String, ForgeError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

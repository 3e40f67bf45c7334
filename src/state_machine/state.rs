use std::fmt;

use serde::{Deserialize, Serialize};

use super::run::{RunContext, RunOutcome, RunStatus};
use crate::error::ForgeError;

/// States of the build-fix loop.
///
/// PLAN → CODE → TEST → (SUCCESS | FIX → CODE … | FAILURE)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum State {
    Plan,
    Code,
    Test,
    Fix,
    Success,
    Failure,
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            State::Plan => write!(f, "PLAN"),
            State::Code => write!(f, "CODE"),
            State::Test => write!(f, "TEST"),
            State::Fix => write!(f, "FIX"),
            State::Success => write!(f, "SUCCESS"),
            State::Failure => write!(f, "FAILURE"),
        }
    }
}

/// What the runner observed while in the current state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Planning call returned a task breakdown.
    Planned,
    /// Generated content was written to the artifact file.
    Persisted,
    /// Validator passed.
    Passed,
    /// Validator failed with a diagnostic.
    Failed(String),
    /// FIX asks for another repair attempt.
    Repair,
}

impl Event {
    fn name(&self) -> &'static str {
        match self {
            Event::Planned => "planned",
            Event::Persisted => "persisted",
            Event::Passed => "passed",
            Event::Failed(_) => "failed",
            Event::Repair => "repair",
        }
    }
}

/// The result of evaluating a state transition.
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    /// Advance to the next state.
    Next(State),
    /// FIX → CODE with the repair budget decremented.
    Retry { attempt: u32, reason: String },
    /// The run reached SUCCESS or FAILURE.
    Complete(RunOutcome),
}

/// Total transition function over `(state, event)`.
pub struct StateMachine;

impl StateMachine {
    /// Computes and applies the transition for `event` in the run's current state.
    ///
    /// Any pairing not listed is an [`ForgeError::InvalidTransition`]; the run
    /// is left untouched so the caller can abort just this run.
    pub fn next(run: &mut RunContext, event: Event) -> Result<Transition, ForgeError> {
        let transition = match (run.state, event) {
            (State::Plan, Event::Planned) => Transition::Next(State::Code),
            (State::Code, Event::Persisted) => Transition::Next(State::Test),
            (State::Test, Event::Passed) => Transition::Complete(RunOutcome::Success),
            (State::Test, Event::Failed(diagnostic)) => {
                run.last_diagnostic = Some(diagnostic);
                Transition::Next(State::Fix)
            }
            (State::Fix, Event::Repair) => {
                let reason = run.last_diagnostic.clone().unwrap_or_default();
                if run.retry_count < run.max_retries {
                    run.retry_count += 1;
                    Transition::Retry {
                        attempt: run.retry_count,
                        reason,
                    }
                } else {
                    Transition::Complete(RunOutcome::Failure(reason))
                }
            }
            (state, event) => {
                return Err(ForgeError::InvalidTransition {
                    state,
                    event: event.name(),
                });
            }
        };

        run.state_history.push(run.state);
        run.state = match &transition {
            Transition::Next(next) => *next,
            Transition::Retry { .. } => State::Code,
            Transition::Complete(RunOutcome::Success) => State::Success,
            Transition::Complete(RunOutcome::Failure(_)) => State::Failure,
        };
        if run.state == State::Code {
            run.code_entries += 1;
        }
        run.status = match run.state {
            State::Success => RunStatus::Succeeded,
            State::Failure => RunStatus::Failed,
            _ => RunStatus::InProgress,
        };

        Ok(transition)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_run(max_retries: u32) -> RunContext {
        RunContext::new("Test task".to_string(), max_retries)
    }

    fn to_test(run: &mut RunContext) {
        StateMachine::next(run, Event::Planned).unwrap();
        StateMachine::next(run, Event::Persisted).unwrap();
    }

    #[test]
    fn happy_path_walks_to_success() {
        let mut run = make_run(3);

        let t = StateMachine::next(&mut run, Event::Planned).unwrap();
        assert_eq!(t, Transition::Next(State::Code));
        let t = StateMachine::next(&mut run, Event::Persisted).unwrap();
        assert_eq!(t, Transition::Next(State::Test));
        let t = StateMachine::next(&mut run, Event::Passed).unwrap();
        assert_eq!(t, Transition::Complete(RunOutcome::Success));

        assert_eq!(run.state, State::Success);
        assert_eq!(run.status, RunStatus::Succeeded);
        assert_eq!(run.code_entries, 1);
        assert_eq!(
            run.state_history,
            vec![State::Plan, State::Code, State::Test]
        );
    }

    #[test]
    fn failing_test_enters_fix_with_diagnostic() {
        let mut run = make_run(2);
        to_test(&mut run);

        let t = StateMachine::next(&mut run, Event::Failed("missing import".into())).unwrap();
        assert_eq!(t, Transition::Next(State::Fix));
        assert_eq!(run.last_diagnostic.as_deref(), Some("missing import"));
    }

    #[test]
    fn repairs_until_budget_then_fails() {
        let mut run = make_run(2);
        to_test(&mut run);

        for attempt in 1..=2 {
            StateMachine::next(&mut run, Event::Failed(format!("error {attempt}"))).unwrap();
            let t = StateMachine::next(&mut run, Event::Repair).unwrap();
            assert_eq!(
                t,
                Transition::Retry {
                    attempt,
                    reason: format!("error {attempt}")
                }
            );
            assert_eq!(run.state, State::Code);
            StateMachine::next(&mut run, Event::Persisted).unwrap();
        }

        StateMachine::next(&mut run, Event::Failed("still broken".into())).unwrap();
        let t = StateMachine::next(&mut run, Event::Repair).unwrap();
        assert_eq!(
            t,
            Transition::Complete(RunOutcome::Failure("still broken".into()))
        );
        assert_eq!(run.state, State::Failure);
        assert_eq!(run.status, RunStatus::Failed);
        assert_eq!(run.retry_count, 2);
        assert_eq!(run.code_entries, 3);
    }

    #[test]
    fn zero_retries_fails_on_first_fix() {
        let mut run = make_run(0);
        to_test(&mut run);
        StateMachine::next(&mut run, Event::Failed("bad output".into())).unwrap();

        let t = StateMachine::next(&mut run, Event::Repair).unwrap();
        assert_eq!(
            t,
            Transition::Complete(RunOutcome::Failure("bad output".into()))
        );
        assert_eq!(run.code_entries, 1);
    }

    #[test]
    fn invalid_pairing_is_rejected_without_mutation() {
        let mut run = make_run(3);
        let err = StateMachine::next(&mut run, Event::Passed).unwrap_err();
        assert!(matches!(
            err,
            ForgeError::InvalidTransition {
                state: State::Plan,
                event: "passed"
            }
        ));
        assert_eq!(run.state, State::Plan);
        assert!(run.state_history.is_empty());
    }

    #[test]
    fn terminal_states_accept_no_events() {
        let mut run = make_run(3);
        to_test(&mut run);
        StateMachine::next(&mut run, Event::Passed).unwrap();
        assert_eq!(run.state, State::Success);
        assert!(StateMachine::next(&mut run, Event::Planned).is_err());
    }

    #[test]
    fn state_display() {
        assert_eq!(State::Plan.to_string(), "PLAN");
        assert_eq!(State::Code.to_string(), "CODE");
        assert_eq!(State::Test.to_string(), "TEST");
        assert_eq!(State::Fix.to_string(), "FIX");
        assert_eq!(State::Success.to_string(), "SUCCESS");
        assert_eq!(State::Failure.to_string(), "FAILURE");
    }
}

mod run;
mod state;

pub use run::{RunContext, RunOutcome, RunReport, RunStatus};
pub use state::{Event, State, StateMachine, Transition};

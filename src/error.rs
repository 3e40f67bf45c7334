use std::path::PathBuf;

use thiserror::Error;

use crate::state_machine::State;

#[derive(Debug, Error)]
pub enum ForgeError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Failed to persist {path}: {source}")]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("No transition from {state} on {event}")]
    InvalidTransition { state: State, event: &'static str },

    #[error("Git error: {0}")]
    Git(#[from] git2::Error),

    #[error("Watch error: {0}")]
    Watch(#[from] notify::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_transition_display() {
        let err = ForgeError::InvalidTransition {
            state: State::Test,
            event: "planned",
        };
        assert_eq!(err.to_string(), "No transition from TEST on planned");
    }

    #[test]
    fn persist_display_names_path() {
        let err = ForgeError::Persist {
            path: PathBuf::from("generated/fsm_gen_1.dart"),
            source: std::io::Error::other("disk full"),
        };
        assert_eq!(
            err.to_string(),
            "Failed to persist generated/fsm_gen_1.dart: disk full"
        );
    }
}

//! Configuration loaded from `sprintforge.toml`.
//!
//! [`ForgeConfig`] holds every tunable of the orchestrator. Missing keys fall
//! back to defaults, a missing file means all defaults. A handful of
//! `SPRINTFORGE_*` environment variables take precedence over the file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::ForgeError;

pub const DEFAULT_CONFIG_FILE: &str = "sprintforge.toml";

/// How a dispatched work item is processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchMode {
    /// One backend query, response routed into the artifact stores.
    Generate,
    /// Full plan/code/test/fix loop.
    BuildFix,
}

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ForgeConfig {
    pub project_root: PathBuf,
    /// Directory for code produced by the build-fix loop.
    pub output_dir: PathBuf,
    pub file_prefix: String,
    pub file_extension: String,

    pub plan_backend: String,
    pub code_backend: String,
    pub fix_backend: String,

    /// Repair attempts allowed after the first failing validation.
    pub max_retries: u32,
    pub auto_commit: bool,
    pub notify: bool,
    /// Each entry is an argv vector; all must exit 0 for a pass.
    pub test_commands: Vec<Vec<String>>,

    pub endpoint: String,
    pub request_timeout_secs: u64,
    pub retry_attempts: u32,
    pub backoff_base_ms: u64,

    pub backlog_file: PathBuf,
    /// Lines starting with this word (case-insensitive) become work items.
    pub marker: String,
    pub debounce_ms: u64,
    pub dispatch_mode: DispatchMode,

    pub stores: StoreConfig,
    pub backends: BackendTable,
}

/// Artifact and bookkeeping directories, relative to `project_root`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub tasks: PathBuf,
    pub processed: PathBuf,
    pub logs: PathBuf,
    pub code: PathBuf,
    pub structured_data: PathBuf,
    pub prompts: PathBuf,
    pub instructions: PathBuf,
    pub fallback: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            tasks: PathBuf::from("tasks"),
            processed: PathBuf::from("processed_tasks"),
            logs: PathBuf::from("logs"),
            code: PathBuf::from("lib/components"),
            structured_data: PathBuf::from("schemas"),
            prompts: PathBuf::from("prompts"),
            instructions: PathBuf::from("instructions"),
            fallback: PathBuf::from("outputs"),
        }
    }
}

/// Preferred backend per capability, plus the fixed fallback order.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BackendTable {
    pub ui_generation: String,
    pub schema_generation: String,
    pub general: String,
    pub fallback_order: Vec<String>,
}

impl Default for BackendTable {
    fn default() -> Self {
        Self {
            ui_generation: "deepseek-coder:latest".to_string(),
            schema_generation: "mistral:latest".to_string(),
            general: "llama3:latest".to_string(),
            fallback_order: vec![
                "llama3:latest".to_string(),
                "mistral:latest".to_string(),
                "deepseek-coder:latest".to_string(),
            ],
        }
    }
}

impl Default for ForgeConfig {
    fn default() -> Self {
        Self {
            project_root: PathBuf::from("."),
            output_dir: PathBuf::from("generated"),
            file_prefix: "fsm_gen_".to_string(),
            file_extension: "dart".to_string(),
            plan_backend: "mistral:latest".to_string(),
            code_backend: "deepseek-coder:latest".to_string(),
            fix_backend: "deepseek-coder:latest".to_string(),
            max_retries: 3,
            auto_commit: false,
            notify: false,
            test_commands: Vec::new(),
            endpoint: "http://localhost:11434/api/generate".to_string(),
            request_timeout_secs: 30,
            retry_attempts: 3,
            backoff_base_ms: 1000,
            backlog_file: PathBuf::from("tasks.txt"),
            marker: "sprint".to_string(),
            debounce_ms: 500,
            dispatch_mode: DispatchMode::Generate,
            stores: StoreConfig::default(),
            backends: BackendTable::default(),
        }
    }
}

impl ForgeConfig {
    /// Loads `path` (or `sprintforge.toml` in the working directory).
    /// Falls back to defaults when the file does not exist.
    pub fn load(path: Option<&Path>) -> Result<Self, ForgeError> {
        let path = path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_FILE));
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            Self::from_toml(&contents)?
        } else {
            Self::default()
        };
        config.apply_env(|name| std::env::var(name).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(contents: &str) -> Result<Self, ForgeError> {
        Ok(toml::from_str::<ForgeConfig>(contents)?)
    }

    /// Environment overrides. Unparsable values are ignored.
    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(endpoint) = lookup("SPRINTFORGE_ENDPOINT")
            && !endpoint.is_empty()
        {
            self.endpoint = endpoint;
        }
        if let Some(n) = lookup("SPRINTFORGE_RETRY").and_then(|v| v.parse().ok()) {
            self.retry_attempts = n;
        }
        if let Some(n) = lookup("SPRINTFORGE_TIMEOUT").and_then(|v| v.parse().ok()) {
            self.request_timeout_secs = n;
        }
        if let Some(n) = lookup("SPRINTFORGE_DEBOUNCE_MS").and_then(|v| v.parse().ok()) {
            self.debounce_ms = n;
        }
    }

    fn validate(&self) -> Result<(), ForgeError> {
        if self.marker.trim().is_empty() {
            return Err(ForgeError::Config("marker must not be empty".into()));
        }
        if self.retry_attempts == 0 {
            return Err(ForgeError::Config("retry_attempts must be at least 1".into()));
        }
        Ok(())
    }

    /// Joins a configured relative path onto `project_root`.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.project_root.join(path)
        }
    }

    pub fn backlog_path(&self) -> PathBuf {
        self.resolve(&self.backlog_file)
    }

    pub fn dedupe_cache_path(&self) -> PathBuf {
        self.resolve(&self.stores.logs).join("generated_lines.json")
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_values() {
        let config = ForgeConfig::default();
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.retry_attempts, 3);
        assert_eq!(config.marker, "sprint");
        assert_eq!(config.dispatch_mode, DispatchMode::Generate);
        assert!(config.test_commands.is_empty());
        assert_eq!(config.backends.fallback_order.len(), 3);
    }

    #[test]
    fn deserialize_partial_toml() {
        let toml_str = r#"
            project_root = "/srv/app"
            max_retries = 5
            auto_commit = true
            dispatch_mode = "build_fix"
            test_commands = [["cargo", "check"], ["cargo", "test"]]

            [stores]
            code = "src/generated"

            [backends]
            general = "qwen3:latest"
        "#;
        let config = ForgeConfig::from_toml(toml_str).unwrap();
        assert_eq!(config.project_root, PathBuf::from("/srv/app"));
        assert_eq!(config.max_retries, 5);
        assert!(config.auto_commit);
        assert_eq!(config.dispatch_mode, DispatchMode::BuildFix);
        assert_eq!(config.test_commands[1], vec!["cargo", "test"]);
        assert_eq!(config.stores.code, PathBuf::from("src/generated"));
        assert_eq!(config.stores.prompts, PathBuf::from("prompts"));
        assert_eq!(config.backends.general, "qwen3:latest");
        assert_eq!(config.backends.schema_generation, "mistral:latest");
        assert_eq!(config.file_prefix, "fsm_gen_");
    }

    #[test]
    fn env_overrides_file_values() {
        let mut config = ForgeConfig::default();
        config.apply_env(|name| match name {
            "SPRINTFORGE_ENDPOINT" => Some("http://gpu-box:11434/api/generate".into()),
            "SPRINTFORGE_RETRY" => Some("5".into()),
            "SPRINTFORGE_TIMEOUT" => Some("not-a-number".into()),
            _ => None,
        });
        assert_eq!(config.endpoint, "http://gpu-box:11434/api/generate");
        assert_eq!(config.retry_attempts, 5);
        assert_eq!(config.request_timeout_secs, 30);
    }

    #[test]
    fn empty_marker_is_rejected() {
        let config = ForgeConfig::from_toml(r#"marker = "  ""#).unwrap();
        assert!(matches!(config.validate(), Err(ForgeError::Config(_))));
    }

    #[test]
    fn resolve_keeps_absolute_paths() {
        let config = ForgeConfig {
            project_root: PathBuf::from("/work"),
            ..Default::default()
        };
        assert_eq!(config.resolve(Path::new("tasks")), PathBuf::from("/work/tasks"));
        assert_eq!(config.resolve(Path::new("/tmp/x")), PathBuf::from("/tmp/x"));
        assert_eq!(
            config.dedupe_cache_path(),
            PathBuf::from("/work/logs/generated_lines.json")
        );
    }

    #[test]
    fn load_falls_back_to_defaults() {
        let config = ForgeConfig::load(Some(Path::new("/definitely/missing/sprintforge.toml")))
            .unwrap();
        assert_eq!(config.max_retries, 3);
    }
}

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, error, info, warn};

use super::sections::{ArtifactKind, split_sections, strip_code_fences};
use crate::config::ForgeConfig;
use crate::fsio::write_file;

/// Signatures that identify a UI component class in an unmarked reply.
const UI_SIGNATURES: &[&str] = &[
    "extends StatelessWidget",
    "extends StatefulWidget",
    "extends React.Component",
];

/// Destination directories, one per artifact kind.
#[derive(Debug, Clone)]
pub struct ArtifactStores {
    pub code: PathBuf,
    pub code_extension: String,
    pub structured_data: PathBuf,
    pub prompts: PathBuf,
    pub instructions: PathBuf,
    pub fallback: PathBuf,
    pub logs: PathBuf,
}

impl ArtifactStores {
    pub fn from_config(config: &ForgeConfig) -> Self {
        Self {
            code: config.resolve(&config.stores.code),
            code_extension: config.file_extension.clone(),
            structured_data: config.resolve(&config.stores.structured_data),
            prompts: config.resolve(&config.stores.prompts),
            instructions: config.resolve(&config.stores.instructions),
            fallback: config.resolve(&config.stores.fallback),
            logs: config.resolve(&config.stores.logs),
        }
    }

    /// Destination for an artifact of `kind` produced for `base`.
    pub fn path_for(&self, kind: ArtifactKind, base: &str) -> PathBuf {
        match kind {
            ArtifactKind::Code => self.code.join(format!("{base}.{}", self.code_extension)),
            ArtifactKind::StructuredData => self.structured_data.join(format!("{base}.json")),
            ArtifactKind::PromptText => self.prompts.join(format!("{base}.txt")),
            ArtifactKind::InstructionText => self.instructions.join(format!("{base}.txt")),
            ArtifactKind::Raw => self.fallback.join(format!("{base}_raw.txt")),
        }
    }
}

/// A persisted artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutedArtifact {
    pub kind: ArtifactKind,
    pub path: PathBuf,
}

/// Splits backend responses into sections and files each into its store.
pub struct ArtifactRouter {
    stores: ArtifactStores,
}

impl ArtifactRouter {
    pub fn new(stores: ArtifactStores) -> Self {
        Self { stores }
    }

    /// Routes `response` into the stores under the name `base`.
    ///
    /// At most one artifact per kind: a later section of the same kind
    /// replaces an earlier one. Write failures are logged and skipped.
    pub fn route(&self, response: &str, base: &str) -> Vec<RoutedArtifact> {
        let mut by_kind: BTreeMap<ArtifactKind, String> = BTreeMap::new();
        for section in split_sections(response) {
            match section.kind {
                Some(_) if section.body.is_empty() => {
                    debug!(section = %section.name, "skipping empty section");
                }
                Some(kind) => {
                    if by_kind.contains_key(&kind) {
                        debug!(%kind, "later section replaces earlier one");
                    }
                    by_kind.insert(kind, section.body);
                }
                None => warn!(section = %section.name, "unknown section name, skipped"),
            }
        }

        if by_kind.is_empty() {
            let kind = classify_unmarked(response);
            info!(%kind, "no recognised sections, using fallback classification");
            by_kind.insert(kind, response.to_string());
        }

        let mut routed = Vec::new();
        for (kind, body) in by_kind {
            let path = self.stores.path_for(kind, base);
            match write_file(&path, &render(kind, &body)) {
                Ok(()) => {
                    info!(%kind, path = %path.display(), "artifact written");
                    routed.push(RoutedArtifact { kind, path });
                }
                Err(e) => error!(%kind, path = %path.display(), "failed to write artifact: {e}"),
            }
        }
        routed
    }

    /// Keeps the untouched response next to the logs for later inspection.
    pub fn log_response(&self, response: &str, base: &str) -> Option<PathBuf> {
        let path = self.stores.logs.join(format!("{base}_response.txt"));
        match write_file(&path, response) {
            Ok(()) => Some(path),
            Err(e) => {
                warn!(path = %path.display(), "failed to write response log: {e}");
                None
            }
        }
    }
}

/// Heuristic kind for a response without usable markers.
pub fn classify_unmarked(text: &str) -> ArtifactKind {
    if text.contains("class ") && UI_SIGNATURES.iter().any(|s| text.contains(s)) {
        return ArtifactKind::Code;
    }
    if text.contains('📋') || text.contains("Prompt") {
        return ArtifactKind::PromptText;
    }
    let lower = text.to_lowercase();
    if text.trim_start().starts_with('{') && (lower.contains("schema") || lower.contains("clientid")) {
        return ArtifactKind::StructuredData;
    }
    ArtifactKind::Raw
}

fn render(kind: ArtifactKind, body: &str) -> String {
    match kind {
        ArtifactKind::Code => format!("{}\n", strip_code_fences(body)),
        ArtifactKind::StructuredData => render_structured(body),
        ArtifactKind::PromptText | ArtifactKind::InstructionText => format!("{}\n", body.trim()),
        ArtifactKind::Raw => body.to_string(),
    }
}

/// Canonical JSON (sorted keys, two-space indent) or, when the body does not
/// parse as one object, the raw body with a trailing warning.
fn render_structured(body: &str) -> String {
    let candidate = strip_code_fences(body);
    let parsed = serde_json::from_str::<Value>(&candidate)
        .map_err(|e| e.to_string())
        .and_then(|v| {
            if v.is_object() {
                Ok(sort_keys(v))
            } else {
                Err("expected a single JSON object".to_string())
            }
        });
    match parsed.and_then(|v| serde_json::to_string_pretty(&v).map_err(|e| e.to_string())) {
        Ok(pretty) => format!("{pretty}\n"),
        Err(reason) => {
            warn!("structured-data section kept verbatim: {reason}");
            format!(
                "{}\n\n// WARNING: structured data could not be parsed ({reason}); stored verbatim.\n",
                body.trim()
            )
        }
    }
}

/// Reinserts object keys in sorted order, so the output does not depend on
/// which map type serde_json was built with.
fn sort_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            Value::Object(entries.into_iter().map(|(k, v)| (k, sort_keys(v))).collect())
        }
        Value::Array(items) => Value::Array(items.into_iter().map(sort_keys).collect()),
        other => other,
    }
}

/// Stem of a work item path, used as the artifact base name.
pub fn base_name(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "artifact".to_string())
}

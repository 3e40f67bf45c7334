use std::fmt;

use crate::config::BackendTable;

/// Broad kind of output a prompt asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CapabilityTag {
    UiGeneration,
    SchemaGeneration,
    General,
}

impl fmt::Display for CapabilityTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CapabilityTag::UiGeneration => write!(f, "ui-generation"),
            CapabilityTag::SchemaGeneration => write!(f, "schema-generation"),
            CapabilityTag::General => write!(f, "general"),
        }
    }
}

/// Pluggable prompt classifier.
pub type Classifier = Box<dyn Fn(&str) -> CapabilityTag + Send + Sync>;

/// Weighted keyword scoring over the prompt's words.
///
/// Keywords longer than three characters also match as word prefixes
/// ("schemas", "widgets"); shorter ones ("ui") must match a whole word.
/// Ties go to schema generation.
pub fn classify_prompt(prompt: &str) -> CapabilityTag {
    let keyword_tags: &[(&str, CapabilityTag, u32)] = &[
        ("schema", CapabilityTag::SchemaGeneration, 10),
        ("firestore", CapabilityTag::SchemaGeneration, 10),
        ("json", CapabilityTag::SchemaGeneration, 5),
        ("database", CapabilityTag::SchemaGeneration, 5),
        ("collection", CapabilityTag::SchemaGeneration, 3),
        ("widget", CapabilityTag::UiGeneration, 10),
        ("flutter", CapabilityTag::UiGeneration, 10),
        ("ui", CapabilityTag::UiGeneration, 10),
        ("screen", CapabilityTag::UiGeneration, 5),
        ("component", CapabilityTag::UiGeneration, 5),
        ("layout", CapabilityTag::UiGeneration, 5),
        ("button", CapabilityTag::UiGeneration, 3),
    ];

    let lower = prompt.to_lowercase();
    let words: Vec<&str> = lower
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();

    let mut schema_score = 0;
    let mut ui_score = 0;
    for &(keyword, tag, weight) in keyword_tags {
        let hit = words
            .iter()
            .any(|w| *w == keyword || (keyword.len() > 3 && w.starts_with(keyword)));
        if !hit {
            continue;
        }
        match tag {
            CapabilityTag::SchemaGeneration => schema_score += weight,
            CapabilityTag::UiGeneration => ui_score += weight,
            CapabilityTag::General => {}
        }
    }

    if schema_score == 0 && ui_score == 0 {
        CapabilityTag::General
    } else if schema_score >= ui_score {
        CapabilityTag::SchemaGeneration
    } else {
        CapabilityTag::UiGeneration
    }
}

/// Builds the ordered candidate list for one backend request.
pub struct BackendSelector {
    classifier: Classifier,
    table: BackendTable,
}

impl BackendSelector {
    pub fn new(table: BackendTable) -> Self {
        Self::with_classifier(table, Box::new(classify_prompt))
    }

    pub fn with_classifier(table: BackendTable, classifier: Classifier) -> Self {
        Self { classifier, table }
    }

    pub fn classify(&self, prompt: &str) -> CapabilityTag {
        (self.classifier)(prompt)
    }

    pub fn preferred(&self, tag: CapabilityTag) -> &str {
        match tag {
            CapabilityTag::UiGeneration => &self.table.ui_generation,
            CapabilityTag::SchemaGeneration => &self.table.schema_generation,
            CapabilityTag::General => &self.table.general,
        }
    }

    /// Explicit override (or the classifier's pick) first, then the fixed
    /// fallback order, without duplicates.
    pub fn candidates(&self, override_id: Option<&str>, prompt: &str) -> Vec<String> {
        let first = match override_id {
            Some(id) => id.to_string(),
            None => self.preferred(self.classify(prompt)).to_string(),
        };
        let mut out = vec![first];
        for id in &self.table.fallback_order {
            if !out.contains(id) {
                out.push(id.clone());
            }
        }
        out
    }

    /// Every backend the table mentions, fallback order first.
    pub fn known_backends(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        let extra = [
            &self.table.general,
            &self.table.schema_generation,
            &self.table.ui_generation,
        ];
        for id in self.table.fallback_order.iter().chain(extra) {
            if !out.contains(id) {
                out.push(id.clone());
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_schema_prompts() {
        assert_eq!(
            classify_prompt("Sprint 2: Firestore schema for appointments"),
            CapabilityTag::SchemaGeneration
        );
        assert_eq!(
            classify_prompt("define the JSON schemas for sessions"),
            CapabilityTag::SchemaGeneration
        );
    }

    #[test]
    fn classify_ui_prompts() {
        assert_eq!(
            classify_prompt("Sprint 1: login screen widget"),
            CapabilityTag::UiGeneration
        );
        assert_eq!(classify_prompt("new UI for settings"), CapabilityTag::UiGeneration);
    }

    #[test]
    fn short_keywords_need_whole_words() {
        // "build" and "guide" contain "ui" but are not UI prompts.
        assert_eq!(
            classify_prompt("build a guide for onboarding"),
            CapabilityTag::General
        );
    }

    #[test]
    fn classify_default_is_general() {
        assert_eq!(classify_prompt("write release notes"), CapabilityTag::General);
        assert_eq!(classify_prompt(""), CapabilityTag::General);
    }

    #[test]
    fn classify_tie_prefers_schema() {
        assert_eq!(
            classify_prompt("widget that edits the schema"),
            CapabilityTag::SchemaGeneration
        );
    }

    #[test]
    fn candidates_put_preferred_first_without_duplicates() {
        let selector = BackendSelector::new(BackendTable::default());
        assert_eq!(
            selector.candidates(None, "flutter widget for the dashboard"),
            vec!["deepseek-coder:latest", "llama3:latest", "mistral:latest"]
        );
        assert_eq!(
            selector.candidates(None, "write release notes"),
            vec!["llama3:latest", "mistral:latest", "deepseek-coder:latest"]
        );
    }

    #[test]
    fn override_wins_over_classifier() {
        let selector = BackendSelector::new(BackendTable::default());
        assert_eq!(
            selector.candidates(Some("qwen3:latest"), "flutter widget"),
            vec![
                "qwen3:latest",
                "llama3:latest",
                "mistral:latest",
                "deepseek-coder:latest"
            ]
        );
    }

    #[test]
    fn classifier_is_swappable() {
        let selector = BackendSelector::with_classifier(
            BackendTable::default(),
            Box::new(|_| CapabilityTag::SchemaGeneration),
        );
        assert_eq!(selector.candidates(None, "anything")[0], "mistral:latest");
        assert_eq!(selector.classify("anything").to_string(), "schema-generation");
    }

    #[test]
    fn known_backends_are_unique() {
        let table = BackendTable {
            general: "qwen3:latest".into(),
            ..Default::default()
        };
        let selector = BackendSelector::new(table);
        assert_eq!(
            selector.known_backends(),
            vec![
                "llama3:latest",
                "mistral:latest",
                "deepseek-coder:latest",
                "qwen3:latest"
            ]
        );
    }
}

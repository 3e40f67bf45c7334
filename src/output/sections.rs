//! Line-oriented tokenizer for `### <Name> ###` section markers.

use std::fmt;

use serde::Serialize;

/// Kinds of artifact a response can be routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ArtifactKind {
    Code,
    StructuredData,
    PromptText,
    InstructionText,
    /// Whole response stored as-is when nothing else matched.
    Raw,
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArtifactKind::Code => write!(f, "code"),
            ArtifactKind::StructuredData => write!(f, "structured-data"),
            ArtifactKind::PromptText => write!(f, "prompt-text"),
            ArtifactKind::InstructionText => write!(f, "instruction-text"),
            ArtifactKind::Raw => write!(f, "raw"),
        }
    }
}

impl ArtifactKind {
    /// Maps a section name to a kind by keyword, case-insensitively.
    /// "Flutter Widget" is code, "Firestore Schema" structured data,
    /// "PDF Export Instructions" instruction text, "AI Summary Prompt" prompt text.
    pub fn from_section_name(name: &str) -> Option<Self> {
        let lower = name.to_lowercase();
        let has = |words: &[&str]| words.iter().any(|w| lower.contains(w));

        if has(&["instruction"]) {
            Some(ArtifactKind::InstructionText)
        } else if has(&["structured-data", "structured data", "schema", "json"]) {
            Some(ArtifactKind::StructuredData)
        } else if has(&["prompt"]) {
            Some(ArtifactKind::PromptText)
        } else if has(&["code", "widget", "component"]) {
            Some(ArtifactKind::Code)
        } else {
            None
        }
    }
}

/// One marked section of a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    pub name: String,
    /// `None` for names that map to no known kind.
    pub kind: Option<ArtifactKind>,
    /// Text up to the next marker, trimmed.
    pub body: String,
}

/// Returns the section name if `line` is a marker. Markers must start at
/// column zero.
pub fn marker_name(line: &str) -> Option<&str> {
    let inner = line.trim_end().strip_prefix("###")?.strip_suffix("###")?;
    let name = inner.trim();
    if name.is_empty() || name.starts_with('#') || name.ends_with('#') {
        return None;
    }
    Some(name)
}

/// Splits `text` into sections. Text before the first marker is dropped; a
/// trailing marker yields a section with an empty body.
pub fn split_sections(text: &str) -> Vec<Section> {
    let mut sections = Vec::new();
    let mut current: Option<(&str, Vec<&str>)> = None;

    for line in text.lines() {
        if let Some(name) = marker_name(line) {
            if let Some((prev, body)) = current.take() {
                sections.push(finish(prev, &body));
            }
            current = Some((name, Vec::new()));
        } else if let Some((_, body)) = current.as_mut() {
            body.push(line);
        }
    }
    if let Some((prev, body)) = current {
        sections.push(finish(prev, &body));
    }
    sections
}

fn finish(name: &str, lines: &[&str]) -> Section {
    Section {
        name: name.to_string(),
        kind: ArtifactKind::from_section_name(name),
        body: lines.join("\n").trim().to_string(),
    }
}

/// Drops a leading "```lang" line and a trailing "```" line, if present.
pub fn strip_code_fences(body: &str) -> String {
    let mut lines: Vec<&str> = body.trim().lines().collect();
    if lines.first().is_some_and(|l| l.trim_start().starts_with("```")) {
        lines.remove(0);
    }
    if lines.last().is_some_and(|l| l.trim() == "```") {
        lines.pop();
    }
    lines.join("\n").trim().to_string()
}

/// Pulls code out of a free-form reply: the last complete fenced block if
/// there is one, otherwise the text with stray fences stripped.
pub fn extract_code(text: &str) -> String {
    let mut blocks: Vec<Vec<&str>> = Vec::new();
    let mut open: Option<Vec<&str>> = None;

    for line in text.lines() {
        let fence = line.trim_start().starts_with("```");
        match (open.take(), fence) {
            (None, true) => open = Some(Vec::new()),
            (None, false) => {}
            (Some(block), true) => blocks.push(block),
            (Some(mut block), false) => {
                block.push(line);
                open = Some(block);
            }
        }
    }

    match blocks.pop() {
        Some(block) => block.join("\n").trim().to_string(),
        None => strip_code_fences(text),
    }
}

//! Backlog lines and the work items materialised from them.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use serde::Serialize;

use crate::dedupe::idempotency_key;
use crate::naming::{task_file_name, task_timestamp};

/// Header line carrying the backlog line's idempotency key.
const KEY_HEADER: &str = "# Key:";

/// Section markers the response is asked to use, one per artifact kind.
pub(crate) const SECTION_MARKERS: [&str; 4] = [
    "### Flutter Widget ###",
    "### Firestore Schema ###",
    "### AI Summary Prompt ###",
    "### PDF Export Instructions ###",
];

/// A marker line taken from the backlog source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BacklogLine {
    /// Trimmed line text.
    pub text: String,
    /// 1-based position among marker lines, skipped ones included.
    pub index: usize,
    pub key: String,
}

/// Lines whose trimmed text starts with `marker`, case-insensitively, in file order.
pub fn extract_lines(text: &str, marker: &str) -> Vec<BacklogLine> {
    let marker = marker.trim().to_lowercase();
    text.lines()
        .map(str::trim)
        .filter(|line| line.to_lowercase().starts_with(&marker))
        .enumerate()
        .map(|(i, line)| BacklogLine {
            text: line.to_string(),
            index: i + 1,
            key: idempotency_key(line),
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkItemStatus {
    Pending,
    InFlight,
    Done,
}

/// A materialised task, identified by its file path.
#[derive(Debug, Clone)]
pub struct WorkItem {
    pub path: PathBuf,
    pub line: String,
    /// Idempotency key of the originating backlog line.
    pub key: String,
    pub created_at: DateTime<Local>,
    pub status: WorkItemStatus,
}

impl WorkItem {
    /// Names a new pending item for `line` inside `dir`.
    pub fn for_line(dir: &Path, line: &BacklogLine, now: DateTime<Local>) -> Self {
        let name = task_file_name(&line.text, line.index, &task_timestamp(now));
        Self {
            path: dir.join(name),
            line: line.text.clone(),
            key: line.key.clone(),
            created_at: now,
            status: WorkItemStatus::Pending,
        }
    }

    /// File body of the item. Everything but the key header is handed to the
    /// backend as the prompt.
    pub fn content(&self) -> String {
        let mut body = format!(
            "# Task: {}\n{KEY_HEADER} {}\n\nPlease complete the generation.\n\n\
             Reply with one section per artifact, each opened by its marker line:\n\n",
            self.line, self.key
        );
        for marker in SECTION_MARKERS {
            body.push_str(marker);
            body.push('\n');
        }
        body
    }
}

/// Splits the key header off a work item's text. Hand-written items have no
/// key; their whole text is the prompt.
pub fn split_item_key(content: &str) -> (Option<String>, String) {
    let mut key = None;
    let mut prompt = String::with_capacity(content.len());
    for line in content.lines() {
        match line.strip_prefix(KEY_HEADER) {
            Some(k) if key.is_none() && !k.trim().is_empty() => key = Some(k.trim().to_string()),
            _ => {
                prompt.push_str(line);
                prompt.push('\n');
            }
        }
    }
    if !content.ends_with('\n') {
        prompt.pop();
    }
    (key, prompt)
}

/// Reads an item list: one task per line, blank and `#` lines ignored.
pub fn read_item_list(path: &Path) -> std::io::Result<Vec<String>> {
    let text = std::fs::read_to_string(path)?;
    Ok(text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(str::to_string)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    #[test]
    fn only_marker_lines_are_extracted() {
        let text = "notes\nSprint 1: login screen\n  sprint 2: profile\nnot a sprint line\nSPRINT 3\n";
        let lines = extract_lines(text, "sprint");

        let texts: Vec<&str> = lines.iter().map(|l| l.text.as_str()).collect();
        assert_eq!(texts, vec!["Sprint 1: login screen", "sprint 2: profile", "SPRINT 3"]);
        assert_eq!(
            lines.iter().map(|l| l.index).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
    }

    #[test]
    fn key_ignores_case_and_surrounding_space() {
        let a = extract_lines("Sprint A", "sprint");
        let b = extract_lines("   sprint a  ", "SPRINT");
        assert_eq!(a[0].key, b[0].key);
    }

    #[test]
    fn no_marker_means_no_lines() {
        assert!(extract_lines("todo: nothing here\n", "sprint").is_empty());
        assert!(extract_lines("", "sprint").is_empty());
    }

    #[test]
    fn work_item_name_and_content() {
        let now = Local.with_ymd_and_hms(2025, 3, 4, 5, 6, 7).unwrap();
        let line = &extract_lines("Sprint 1: Login", "sprint")[0];
        let item = WorkItem::for_line(Path::new("tasks"), line, now);

        let name = item.path.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("auto_task_1_sprint_1_login_"));
        assert!(name.ends_with("_20250304-050607.md"));
        assert_eq!(item.status, WorkItemStatus::Pending);

        let content = item.content();
        assert!(content.starts_with("# Task: Sprint 1: Login\n"));
        assert!(content.contains(&format!("# Key: {}\n", line.key)));
    }

    #[test]
    fn content_lists_the_section_markers() {
        let now = Local.with_ymd_and_hms(2025, 3, 4, 5, 6, 7).unwrap();
        let line = &extract_lines("Sprint 2: report", "sprint")[0];
        let content = WorkItem::for_line(Path::new("tasks"), line, now).content();

        let markers: Vec<&str> = content.lines().filter(|l| l.starts_with("###")).collect();
        assert_eq!(markers, SECTION_MARKERS.to_vec());
    }

    #[test]
    fn key_header_is_split_from_the_prompt() {
        let now = Local.with_ymd_and_hms(2025, 3, 4, 5, 6, 7).unwrap();
        let line = &extract_lines("Sprint 1: Login", "sprint")[0];
        let (key, prompt) = split_item_key(&WorkItem::for_line(Path::new("t"), line, now).content());

        assert_eq!(key.as_deref(), Some(line.key.as_str()));
        assert!(prompt.starts_with("# Task: Sprint 1: Login\n\nPlease complete"));
        assert!(!prompt.contains("# Key:"));
    }

    #[test]
    fn hand_written_item_has_no_key() {
        let (key, prompt) = split_item_key("Build a settings page");
        assert_eq!(key, None);
        assert_eq!(prompt, "Build a settings page");
    }

    #[test]
    fn item_list_skips_blank_and_comment_lines() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("task_queue.txt");
        std::fs::write(&path, "# queue\nLogin screen\n\n  Profile page  \n#skip\n").unwrap();

        assert_eq!(
            read_item_list(&path).unwrap(),
            vec!["Login screen".to_string(), "Profile page".to_string()]
        );
    }

    #[test]
    fn missing_item_list_is_an_error() {
        assert!(read_item_list(Path::new("/nonexistent/task_queue.txt")).is_err());
    }
}

//! Filesystem-safe names for work items and generated artifacts.

use chrono::{DateTime, Local};
use sha2::{Digest, Sha256};

/// Longest sanitized prefix taken from a backlog line.
const SAFE_PREFIX_LEN: usize = 30;
/// Hex digits of content hash appended to every sanitized name.
const SUFFIX_HASH_LEN: usize = 6;
/// Hex digits used when the name is built from the hash alone.
const FALLBACK_HASH_LEN: usize = 8;
/// Below this many sanitized characters the prefix is dropped entirely.
const MIN_PREFIX_LEN: usize = 5;
/// Upper bound for a work item file name, extension included.
pub const MAX_NAME_LEN: usize = 200;

const TASK_EXTENSION: &str = ".md";

/// Timestamp used in work item names.
pub fn task_timestamp(now: DateTime<Local>) -> String {
    now.format("%Y%m%d-%H%M%S").to_string()
}

/// First `len` hex digits of the SHA-256 of `text`.
pub fn content_hash(text: &str, len: usize) -> String {
    let mut hex = format!("{:x}", Sha256::digest(text.as_bytes()));
    hex.truncate(len);
    hex
}

/// Lowercases and replaces everything outside `[a-z0-9_-]` with `_`,
/// collapsing runs of `_` and trimming them from both ends.
pub fn sanitize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.trim().chars() {
        let c = if c.is_ascii_alphanumeric() || c == '-' {
            c.to_ascii_lowercase()
        } else {
            '_'
        };
        if c == '_' && out.ends_with('_') {
            continue;
        }
        out.push(c);
    }
    out.trim_matches('_').to_string()
}

/// Work item file name: `auto_task_<idx>_<prefix>_<hash>_<timestamp>.md`,
/// never longer than [`MAX_NAME_LEN`].
pub fn task_file_name(line: &str, index: usize, timestamp: &str) -> String {
    task_file_name_within(line, index, timestamp, MAX_NAME_LEN)
}

fn task_file_name_within(line: &str, index: usize, timestamp: &str, max_len: usize) -> String {
    let budget = max_len.saturating_sub(TASK_EXTENSION.len());
    let head = format!("auto_task_{index}_");
    let tail = format!("_{}_{timestamp}", content_hash(line, SUFFIX_HASH_LEN));

    let mut prefix = sanitize(line);
    prefix.truncate(SAFE_PREFIX_LEN);
    let available = budget.saturating_sub(head.len() + tail.len());
    if prefix.len() > available {
        prefix.truncate(available);
    }
    let prefix = prefix.trim_end_matches('_');

    if prefix.len() >= MIN_PREFIX_LEN {
        return format!("{head}{prefix}{tail}{TASK_EXTENSION}");
    }

    let hash = content_hash(line, FALLBACK_HASH_LEN);
    let hashed = format!("auto_task_{index}_{hash}_{timestamp}");
    if hashed.len() <= budget {
        format!("{hashed}{TASK_EXTENSION}")
    } else {
        format!("{hash}{TASK_EXTENSION}")
    }
}

/// Name of the file the build-fix loop writes generated code to.
pub fn artifact_file_name(prefix: &str, extension: &str, now: DateTime<Local>) -> String {
    format!("{prefix}{}.{extension}", now.format("%Y%m%d_%H%M%S"))
}

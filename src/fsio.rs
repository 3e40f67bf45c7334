//! Crash-safe file writes and work item archival.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

/// Writes `content` to a temp file next to `path`, then renames it over
/// `path`. A crash mid-write leaves the previous file untouched.
pub fn atomic_write(path: &Path, content: &str) -> io::Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;

    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(content.as_bytes())?;
    tmp.as_file().sync_all()?;
    // On failure the temp file is removed when the error's handle drops.
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Plain overwrite used by the artifact stores, creating parents as needed.
pub fn write_file(path: &Path, content: &str) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, content)
}

/// Moves `src` into `dir`, keeping its file name. Returns the new path.
pub fn move_into(src: &Path, dir: &Path) -> io::Result<PathBuf> {
    let name = src
        .file_name()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "path has no file name"))?;
    fs::create_dir_all(dir)?;
    let dst = dir.join(name);
    fs::rename(src, &dst)?;
    Ok(dst)
}

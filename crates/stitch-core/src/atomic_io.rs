use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};

use crate::time_utils::current_unix_timestamp;

/// Replaces `path` with `content` by staging a sibling file and renaming it
/// into place, so a concurrent reader never sees a half-written file. Parent
/// directories are created on demand.
pub fn write_text_atomic(path: &Path, content: &str) -> Result<()> {
    if path.as_os_str().is_empty() {
        bail!("refusing to write to an empty path");
    }
    if path.is_dir() {
        bail!("cannot replace directory {} with a file", path.display());
    }

    let parent = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(parent)
        .with_context(|| format!("failed to create directory {}", parent.display()))?;

    let staged = staging_path(path, parent);
    std::fs::write(&staged, content)
        .with_context(|| format!("failed to stage {}", staged.display()))?;
    std::fs::rename(&staged, path).with_context(|| {
        format!(
            "failed to publish {} as {}",
            staged.display(),
            path.display()
        )
    })?;
    Ok(())
}

// Hidden sibling in the same directory so the final rename never crosses a
// filesystem boundary. Pid plus timestamp keeps concurrent writers apart.
fn staging_path(path: &Path, parent: &Path) -> PathBuf {
    let stem = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("file");
    parent.join(format!(
        ".{stem}.tmp-{}-{}",
        std::process::id(),
        current_unix_timestamp()
    ))
}

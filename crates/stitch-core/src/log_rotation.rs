use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{Context, Result};

const DEFAULT_MAX_BYTES: u64 = 10 * 1024 * 1024;
const DEFAULT_MAX_FILES: usize = 5;

/// Size-based retention policy for append-only JSONL logs.
///
/// `max_bytes` caps the active file. Once an append would push it past the
/// cap, the file shifts into numbered backups of which `max_files - 1` are
/// retained; `<log>.1` is always the newest backup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogRotationPolicy {
    pub max_bytes: u64,
    pub max_files: usize,
}

impl LogRotationPolicy {
    /// Reads `STITCH_LOG_ROTATION_MAX_BYTES` and `STITCH_LOG_ROTATION_MAX_FILES`,
    /// keeping the defaults when a variable is unset, unparsable, or zero.
    pub fn from_env() -> Self {
        Self {
            max_bytes: positive_env("STITCH_LOG_ROTATION_MAX_BYTES", DEFAULT_MAX_BYTES),
            max_files: positive_env("STITCH_LOG_ROTATION_MAX_FILES", DEFAULT_MAX_FILES),
        }
    }

    /// Rotation runs only when both limits are nonzero.
    pub fn is_enabled(self) -> bool {
        self.max_bytes > 0 && self.max_files > 0
    }
}

fn positive_env<T>(name: &str, default: T) -> T
where
    T: FromStr + PartialOrd + Default,
{
    std::env::var(name)
        .ok()
        .and_then(|raw| raw.trim().parse::<T>().ok())
        .filter(|value| *value > T::default())
        .unwrap_or(default)
}

/// Appends one line (terminator added here) to `path`, rotating first when
/// the write would push the active file past `policy.max_bytes`.
pub fn append_line_with_rotation(path: &Path, line: &str, policy: LogRotationPolicy) -> Result<()> {
    if let Some(parent) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }

    if append_would_exceed_cap(path, line, policy)? {
        shift_backups(path, policy)?;
    }

    let mut log = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    writeln!(log, "{line}").with_context(|| format!("failed to append {}", path.display()))?;
    log.flush()
        .with_context(|| format!("failed to flush {}", path.display()))?;
    Ok(())
}

fn append_would_exceed_cap(path: &Path, line: &str, policy: LogRotationPolicy) -> Result<bool> {
    if !policy.is_enabled() || !path.exists() {
        return Ok(false);
    }
    let on_disk = std::fs::metadata(path)
        .with_context(|| format!("failed to stat {}", path.display()))?
        .len();
    let incoming = u64::try_from(line.len().saturating_add(1)).unwrap_or(u64::MAX);
    Ok(on_disk.saturating_add(incoming) > policy.max_bytes)
}

fn backup_slot_path(path: &Path, slot: usize) -> PathBuf {
    PathBuf::from(format!("{}.{slot}", path.display()))
}

/// Walks the backup chain oldest slot first: `.N-1` moves to `.N`, the active
/// file moves to `.1`, and whatever held the last retained slot is dropped.
fn shift_backups(path: &Path, policy: LogRotationPolicy) -> Result<()> {
    if !path.exists() || !policy.is_enabled() {
        return Ok(());
    }
    if policy.max_files <= 1 {
        // No backup slots at all, so retention degrades to truncation.
        return std::fs::remove_file(path)
            .with_context(|| format!("failed to rotate {}", path.display()));
    }

    for slot in (1..policy.max_files).rev() {
        let source = match slot {
            1 => path.to_path_buf(),
            _ => backup_slot_path(path, slot - 1),
        };
        if !source.exists() {
            continue;
        }
        let target = backup_slot_path(path, slot);
        if target.exists() {
            std::fs::remove_file(&target)
                .with_context(|| format!("failed to drop old backup {}", target.display()))?;
        }
        std::fs::rename(&source, &target).with_context(|| {
            format!(
                "failed to move {} to {}",
                source.display(),
                target.display()
            )
        })?;
    }
    Ok(())
}

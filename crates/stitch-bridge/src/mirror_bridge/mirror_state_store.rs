use std::{collections::BTreeMap, path::PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use stitch_core::{append_line_with_rotation, write_text_atomic, LogRotationPolicy};
use stitch_github::RepoName;

use super::MIRROR_STATE_SCHEMA_VERSION;

/// Durable record for one mirrored item: the chat thread backing it and
/// which tracker fetch path owns it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(super) struct MirrorRecord {
    pub(super) thread_id: String,
    pub(super) is_pull_request: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct MirrorBridgeState {
    schema_version: u32,
    #[serde(default)]
    mirrors: BTreeMap<String, MirrorRecord>,
}

impl Default for MirrorBridgeState {
    fn default() -> Self {
        Self {
            schema_version: MIRROR_STATE_SCHEMA_VERSION,
            mirrors: BTreeMap::new(),
        }
    }
}

/// Builds the deterministic mapping key for one tracked item.
pub(super) fn mirror_key(repo: &RepoName, number: u64) -> String {
    format!("{}:{}", repo.as_slug(), number)
}

/// Splits a mapping key back into its repository and item number. Repo slugs
/// contain `/` but never `:`, so the split anchors on the last colon.
pub(super) fn split_mirror_key(key: &str) -> Result<(RepoName, u64)> {
    let (slug, number) = key
        .rsplit_once(':')
        .ok_or_else(|| anyhow!("mirror key '{key}' is missing an item number"))?;
    let number = number
        .parse::<u64>()
        .with_context(|| format!("mirror key '{key}' holds a non-numeric item number"))?;
    let repo = RepoName::parse(slug)
        .with_context(|| format!("mirror key '{key}' holds an invalid repository slug"))?;
    Ok((repo, number))
}

pub(super) struct MirrorStateStore {
    path: PathBuf,
    state: MirrorBridgeState,
}

impl MirrorStateStore {
    pub(super) fn load(path: PathBuf) -> Result<Self> {
        let state = if path.exists() {
            let raw = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read state file {}", path.display()))?;
            serde_json::from_str::<MirrorBridgeState>(&raw).with_context(|| {
                format!("failed to parse mirror bridge state file {}", path.display())
            })?
        } else {
            MirrorBridgeState::default()
        };

        if state.schema_version != MIRROR_STATE_SCHEMA_VERSION {
            bail!(
                "unsupported mirror bridge state schema: expected {}, found {}",
                MIRROR_STATE_SCHEMA_VERSION,
                state.schema_version
            );
        }

        Ok(Self { path, state })
    }

    pub(super) fn contains(&self, key: &str) -> bool {
        self.state.mirrors.contains_key(key)
    }

    pub(super) fn insert(&mut self, key: String, record: MirrorRecord) {
        self.state.mirrors.insert(key, record);
    }

    pub(super) fn remove(&mut self, key: &str) -> Option<MirrorRecord> {
        self.state.mirrors.remove(key)
    }

    /// Owned copy of the current entries, stable while records are removed
    /// underneath during the drift pass.
    pub(super) fn snapshot(&self) -> Vec<(String, MirrorRecord)> {
        self.state
            .mirrors
            .iter()
            .map(|(key, record)| (key.clone(), record.clone()))
            .collect()
    }

    pub(super) fn save(&self) -> Result<()> {
        let mut payload =
            serde_json::to_string_pretty(&self.state).context("failed to serialize state")?;
        payload.push('\n');
        write_text_atomic(&self.path, &payload)
            .with_context(|| format!("failed to write state file {}", self.path.display()))?;
        Ok(())
    }
}

/// Append-only JSONL record of reconciliation actions, size-rotated so a
/// long-lived bridge cannot grow the file without bound.
#[derive(Clone)]
pub(super) struct MirrorEventLog {
    path: PathBuf,
    policy: LogRotationPolicy,
}

impl MirrorEventLog {
    pub(super) fn new(path: PathBuf) -> Self {
        Self {
            path,
            policy: LogRotationPolicy::from_env(),
        }
    }

    pub(super) fn append(&self, value: &Value) -> Result<()> {
        let line = serde_json::to_string(value).context("failed to encode log event")?;
        append_line_with_rotation(&self.path, &line, self.policy)
    }
}

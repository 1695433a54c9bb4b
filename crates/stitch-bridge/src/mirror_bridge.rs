//! Thread-mirror bridge runtime that reconciles tracker items with chat
//! threads on a fixed poll cadence.

use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::{bail, Context, Result};
use serde_json::json;
use tokio::sync::watch;

use stitch_core::current_unix_timestamp_ms;
use stitch_discord::{ChatError, ChatGateway};
use stitch_github::{RepoName, TrackedItem, TrackerError, TrackerGateway};

const MIRROR_STATE_SCHEMA_VERSION: u32 = 1;
const MIRROR_STATE_FILE: &str = "thread-mirrors.json";
const MIRROR_EVENT_LOG_FILE: &str = "mirror-events.jsonl";

#[derive(Clone)]
/// Runtime configuration for the thread-mirror bridge loop.
pub struct MirrorBridgeRuntimeConfig {
    pub tracker: Arc<dyn TrackerGateway>,
    pub chat: Arc<dyn ChatGateway>,
    pub repos: Vec<RepoName>,
    pub channel_id: String,
    pub state_dir: PathBuf,
    pub poll_interval: Duration,
    pub poll_once: bool,
}

mod mirror_render_helpers;
mod mirror_state_store;

use mirror_render_helpers::{closure_notice, item_kind_label, thread_opening_message};
use mirror_state_store::{
    mirror_key, split_mirror_key, MirrorEventLog, MirrorRecord, MirrorStateStore,
};

#[derive(Debug, Default)]
/// Per-cycle counters reported by one reconciliation pass.
pub struct PollCycleReport {
    pub discovered_items: usize,
    pub created_mirrors: usize,
    pub renamed_threads: usize,
    pub closed_mirrors: usize,
    pub skipped_items: usize,
    pub failed_actions: usize,
}

/// Runs the thread-mirror bridge until the shutdown channel flips to `true`.
pub async fn run_mirror_bridge(
    config: MirrorBridgeRuntimeConfig,
    shutdown: watch::Receiver<bool>,
) -> Result<()> {
    let mut runtime = MirrorBridgeRuntime::new(config)?;
    runtime.run(shutdown).await
}

pub struct MirrorBridgeRuntime {
    config: MirrorBridgeRuntimeConfig,
    store: MirrorStateStore,
    event_log: MirrorEventLog,
}

impl MirrorBridgeRuntime {
    /// Loads durable mirror state and prepares a runtime for polling.
    pub fn new(config: MirrorBridgeRuntimeConfig) -> Result<Self> {
        if config.repos.is_empty() {
            bail!("mirror bridge requires at least one repository to watch");
        }
        std::fs::create_dir_all(&config.state_dir)
            .with_context(|| format!("failed to create {}", config.state_dir.display()))?;
        let store = MirrorStateStore::load(config.state_dir.join(MIRROR_STATE_FILE))?;
        let event_log = MirrorEventLog::new(config.state_dir.join(MIRROR_EVENT_LOG_FILE));
        Ok(Self {
            config,
            store,
            event_log,
        })
    }

    /// Runs poll cycles on the configured interval. Shutdown is observed
    /// between cycles, so an in-flight cycle always completes.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        loop {
            if *shutdown.borrow() {
                println!("mirror bridge shutdown requested");
                return Ok(());
            }

            match self.poll_once().await {
                Ok(report) => {
                    println!(
                        "mirror bridge poll: repos={} discovered={} created={} renamed={} closed={} skipped={} failed={}",
                        self.config.repos.len(),
                        report.discovered_items,
                        report.created_mirrors,
                        report.renamed_threads,
                        report.closed_mirrors,
                        report.skipped_items,
                        report.failed_actions
                    );
                    if self.config.poll_once {
                        return Ok(());
                    }
                }
                Err(error) => {
                    eprintln!("mirror bridge poll error: {error}");
                    if self.config.poll_once {
                        return Err(error);
                    }
                }
            }

            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        println!("mirror bridge shutdown requested");
                        return Ok(());
                    }
                }
                _ = tokio::time::sleep(self.config.poll_interval) => {}
            }
        }
    }

    /// Executes one reconciliation cycle: discover unmapped open items,
    /// converge mapped threads, persist the store.
    pub async fn poll_once(&mut self) -> Result<PollCycleReport> {
        let mut report = PollCycleReport::default();
        tokio::task::yield_now().await;

        for repo in self.config.repos.clone() {
            let items = match self.list_repo_open_items(&repo).await {
                Ok(items) => items,
                Err(error) => {
                    report.failed_actions = report.failed_actions.saturating_add(1);
                    eprintln!(
                        "mirror bridge listing failed: repo={} error={error}",
                        repo.as_slug()
                    );
                    continue;
                }
            };
            report.discovered_items = report.discovered_items.saturating_add(items.len());
            for item in items {
                if self.store.contains(&mirror_key(&repo, item.number)) {
                    continue;
                }
                self.create_mirror(&repo, &item, &mut report).await;
            }
        }

        // Snapshot after discovery so mirrors created this cycle are synced
        // in the same pass.
        for (key, record) in self.store.snapshot() {
            self.sync_mapped_thread(&key, &record, &mut report).await;
        }

        self.persist_store(&mut report);
        Ok(report)
    }

    async fn list_repo_open_items(
        &self,
        repo: &RepoName,
    ) -> Result<Vec<TrackedItem>, TrackerError> {
        let mut items = self.config.tracker.list_open_issues(repo).await?;
        items.extend(self.config.tracker.list_open_pull_requests(repo).await?);
        Ok(items)
    }

    async fn create_mirror(
        &mut self,
        repo: &RepoName,
        item: &TrackedItem,
        report: &mut PollCycleReport,
    ) {
        let channel = match self.config.chat.resolve_channel(&self.config.channel_id).await {
            Ok(channel) => channel,
            Err(ChatError::ChannelNotFound(channel_id)) => {
                report.skipped_items = report.skipped_items.saturating_add(1);
                eprintln!(
                    "mirror bridge channel missing: channel={channel_id} repo={} item=#{}",
                    repo.as_slug(),
                    item.number
                );
                return;
            }
            Err(error) => {
                report.failed_actions = report.failed_actions.saturating_add(1);
                eprintln!(
                    "mirror bridge channel lookup failed: repo={} item=#{} error={error}",
                    repo.as_slug(),
                    item.number
                );
                return;
            }
        };

        let opening_message = thread_opening_message(repo, item);
        let thread = match self
            .config
            .chat
            .create_thread(&channel, &item.title, &opening_message)
            .await
        {
            Ok(thread) => thread,
            Err(error) => {
                report.failed_actions = report.failed_actions.saturating_add(1);
                eprintln!(
                    "mirror bridge thread create failed: repo={} item=#{} error={error}",
                    repo.as_slug(),
                    item.number
                );
                return;
            }
        };

        let key = mirror_key(repo, item.number);
        self.store.insert(
            key.clone(),
            MirrorRecord {
                thread_id: thread.id.clone(),
                is_pull_request: item.is_pull_request,
            },
        );
        report.created_mirrors = report.created_mirrors.saturating_add(1);
        println!(
            "mirror bridge thread created: key={key} thread={} kind={}",
            thread.id,
            item_kind_label(item.is_pull_request)
        );
        self.log_event(json!({
            "timestamp_unix_ms": current_unix_timestamp_ms(),
            "event": "mirror_created",
            "key": key,
            "thread_id": thread.id,
            "title": item.title,
            "html_url": item.html_url,
            "is_pull_request": item.is_pull_request,
        }));
        // Persist right after a confirmed creation so a crash cannot
        // double-create the thread on the next cycle.
        self.persist_store(report);
    }

    async fn sync_mapped_thread(
        &mut self,
        key: &str,
        record: &MirrorRecord,
        report: &mut PollCycleReport,
    ) {
        let (repo, number) = match split_mirror_key(key) {
            Ok(parts) => parts,
            Err(error) => {
                report.failed_actions = report.failed_actions.saturating_add(1);
                eprintln!("mirror bridge mapping key invalid: key={key} error={error}");
                return;
            }
        };

        let fetched = if record.is_pull_request {
            self.config.tracker.fetch_pull_request(&repo, number).await
        } else {
            self.config.tracker.fetch_issue(&repo, number).await
        };
        let item = match fetched {
            Ok(item) => item,
            Err(error) => {
                report.skipped_items = report.skipped_items.saturating_add(1);
                eprintln!("mirror bridge item fetch failed: key={key} error={error}");
                return;
            }
        };
        let thread = match self.config.chat.fetch_thread(&record.thread_id).await {
            Ok(thread) => thread,
            Err(error) => {
                report.skipped_items = report.skipped_items.saturating_add(1);
                eprintln!(
                    "mirror bridge thread fetch failed: key={key} thread={} error={error}",
                    record.thread_id
                );
                return;
            }
        };

        // Rename and closure are independent; when both apply the rename
        // lands first so the thread is never locked under a stale title.
        if item.title != thread.name {
            match self
                .config
                .chat
                .rename_thread(&record.thread_id, &item.title)
                .await
            {
                Ok(()) => {
                    report.renamed_threads = report.renamed_threads.saturating_add(1);
                    println!(
                        "mirror bridge thread renamed: key={key} from='{}' to='{}'",
                        thread.name, item.title
                    );
                    self.log_event(json!({
                        "timestamp_unix_ms": current_unix_timestamp_ms(),
                        "event": "thread_renamed",
                        "key": key,
                        "thread_id": record.thread_id,
                        "previous_name": thread.name,
                        "new_name": item.title,
                    }));
                }
                Err(error) => {
                    report.failed_actions = report.failed_actions.saturating_add(1);
                    eprintln!(
                        "mirror bridge thread rename failed: key={key} thread={} error={error}",
                        record.thread_id
                    );
                }
            }
        }

        if !item.state.is_closed() {
            return;
        }

        // A locked thread means a prior cycle already delivered the notice
        // and lock but crashed before the removal persisted.
        if !thread.locked {
            let notice = closure_notice(record.is_pull_request);
            if let Err(error) = self
                .config
                .chat
                .post_thread_message(&record.thread_id, &notice)
                .await
            {
                report.failed_actions = report.failed_actions.saturating_add(1);
                eprintln!(
                    "mirror bridge closure notice failed: key={key} thread={} error={error}",
                    record.thread_id
                );
                return;
            }
            if let Err(error) = self.config.chat.lock_thread(&record.thread_id).await {
                report.failed_actions = report.failed_actions.saturating_add(1);
                eprintln!(
                    "mirror bridge thread lock failed: key={key} thread={} error={error}",
                    record.thread_id
                );
                return;
            }
        }

        self.store.remove(key);
        report.closed_mirrors = report.closed_mirrors.saturating_add(1);
        println!(
            "mirror bridge thread locked: key={key} thread={} kind={}",
            record.thread_id,
            item_kind_label(record.is_pull_request)
        );
        self.log_event(json!({
            "timestamp_unix_ms": current_unix_timestamp_ms(),
            "event": "mirror_closed",
            "key": key,
            "thread_id": record.thread_id,
            "is_pull_request": record.is_pull_request,
        }));
    }

    fn persist_store(&self, report: &mut PollCycleReport) {
        if let Err(error) = self.store.save() {
            report.failed_actions = report.failed_actions.saturating_add(1);
            eprintln!("mirror bridge state save failed: {error}");
        }
    }

    fn log_event(&self, event: serde_json::Value) {
        if let Err(error) = self.event_log.append(&event) {
            eprintln!("mirror bridge event log append failed: {error}");
        }
    }
}

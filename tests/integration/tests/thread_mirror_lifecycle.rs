use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex,
    },
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::watch;

use stitch_bridge::{run_mirror_bridge, MirrorBridgeRuntime, MirrorBridgeRuntimeConfig};
use stitch_discord::{BotIdentity, ChatChannel, ChatError, ChatGateway, ChatThread};
use stitch_github::{ItemState, RepoName, TrackedItem, TrackerError, TrackerGateway};

static WORKSPACE_COUNTER: AtomicU64 = AtomicU64::new(1);

struct IsolatedWorkspace {
    root: PathBuf,
}

impl IsolatedWorkspace {
    fn new(label: &str) -> Self {
        let tick = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock should be after unix epoch")
            .as_nanos();
        let count = WORKSPACE_COUNTER.fetch_add(1, Ordering::Relaxed);
        let root = std::env::temp_dir().join(format!(
            "stitch-mirror-{label}-{}-{tick}-{count}",
            std::process::id()
        ));
        fs::create_dir_all(&root).expect("must create isolated workspace root");
        Self { root }
    }

    fn root(&self) -> &Path {
        &self.root
    }
}

impl Drop for IsolatedWorkspace {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.root);
    }
}

fn open_issue(repo: &RepoName, number: u64, title: &str) -> TrackedItem {
    TrackedItem {
        number,
        title: title.to_string(),
        html_url: format!("https://github.com/{}/issues/{number}", repo.as_slug()),
        state: ItemState::Open,
        is_pull_request: false,
    }
}

fn open_pull_request(repo: &RepoName, number: u64, title: &str) -> TrackedItem {
    TrackedItem {
        number,
        title: title.to_string(),
        html_url: format!("https://github.com/{}/pull/{number}", repo.as_slug()),
        state: ItemState::Open,
        is_pull_request: true,
    }
}

struct InMemoryTracker {
    items: Mutex<BTreeMap<(String, u64), TrackedItem>>,
}

impl InMemoryTracker {
    fn new() -> Self {
        Self {
            items: Mutex::new(BTreeMap::new()),
        }
    }

    fn upsert(&self, repo: &RepoName, item: TrackedItem) {
        self.items
            .lock()
            .expect("tracker items")
            .insert((repo.as_slug(), item.number), item);
    }

    fn set_title(&self, repo: &RepoName, number: u64, title: &str) {
        if let Some(item) = self
            .items
            .lock()
            .expect("tracker items")
            .get_mut(&(repo.as_slug(), number))
        {
            item.title = title.to_string();
        }
    }

    fn set_state(&self, repo: &RepoName, number: u64, state: ItemState) {
        if let Some(item) = self
            .items
            .lock()
            .expect("tracker items")
            .get_mut(&(repo.as_slug(), number))
        {
            item.state = state;
        }
    }

    fn open_items(&self, repo: &RepoName, pull_requests: bool) -> Vec<TrackedItem> {
        let slug = repo.as_slug();
        self.items
            .lock()
            .expect("tracker items")
            .iter()
            .filter(|(key, item)| {
                key.0 == slug
                    && item.is_pull_request == pull_requests
                    && item.state == ItemState::Open
            })
            .map(|(_, item)| item.clone())
            .collect()
    }

    fn get(
        &self,
        repo: &RepoName,
        number: u64,
        operation: &str,
    ) -> Result<TrackedItem, TrackerError> {
        self.items
            .lock()
            .expect("tracker items")
            .get(&(repo.as_slug(), number))
            .cloned()
            .ok_or_else(|| TrackerError::Status {
                operation: operation.to_string(),
                status: 404,
                body: "missing item".to_string(),
            })
    }
}

#[async_trait]
impl TrackerGateway for InMemoryTracker {
    async fn list_open_issues(&self, repo: &RepoName) -> Result<Vec<TrackedItem>, TrackerError> {
        Ok(self.open_items(repo, false))
    }

    async fn list_open_pull_requests(
        &self,
        repo: &RepoName,
    ) -> Result<Vec<TrackedItem>, TrackerError> {
        Ok(self.open_items(repo, true))
    }

    async fn fetch_issue(
        &self,
        repo: &RepoName,
        number: u64,
    ) -> Result<TrackedItem, TrackerError> {
        self.get(repo, number, "get issue")
    }

    async fn fetch_pull_request(
        &self,
        repo: &RepoName,
        number: u64,
    ) -> Result<TrackedItem, TrackerError> {
        self.get(repo, number, "get pull request")
    }
}

#[derive(Debug, Clone)]
struct ThreadRecord {
    name: String,
    locked: bool,
    messages: Vec<String>,
}

#[derive(Default)]
struct ChatLedger {
    threads: BTreeMap<String, ThreadRecord>,
    next_thread: u64,
    create_calls: usize,
}

struct RecordingChat {
    channel_id: String,
    ledger: Mutex<ChatLedger>,
}

impl RecordingChat {
    fn new(channel_id: &str) -> Self {
        Self {
            channel_id: channel_id.to_string(),
            ledger: Mutex::new(ChatLedger::default()),
        }
    }

    fn thread(&self, thread_id: &str) -> ThreadRecord {
        self.ledger
            .lock()
            .expect("chat ledger")
            .threads
            .get(thread_id)
            .cloned()
            .expect("thread exists")
    }

    fn thread_named(&self, name: &str) -> Option<(String, ThreadRecord)> {
        self.ledger
            .lock()
            .expect("chat ledger")
            .threads
            .iter()
            .find(|(_, record)| record.name == name)
            .map(|(id, record)| (id.clone(), record.clone()))
    }

    fn create_calls(&self) -> usize {
        self.ledger.lock().expect("chat ledger").create_calls
    }
}

#[async_trait]
impl ChatGateway for RecordingChat {
    async fn resolve_bot_identity(&self) -> Result<BotIdentity, ChatError> {
        Ok(BotIdentity {
            id: "7000".to_string(),
            username: "stitch-mirror".to_string(),
        })
    }

    async fn resolve_channel(&self, channel_id: &str) -> Result<ChatChannel, ChatError> {
        if channel_id != self.channel_id {
            return Err(ChatError::ChannelNotFound(channel_id.to_string()));
        }
        Ok(ChatChannel {
            id: channel_id.to_string(),
            name: Some("tracker-mirrors".to_string()),
        })
    }

    async fn create_thread(
        &self,
        _channel: &ChatChannel,
        name: &str,
        initial_message: &str,
    ) -> Result<ChatThread, ChatError> {
        let mut ledger = self.ledger.lock().expect("chat ledger");
        ledger.next_thread += 1;
        ledger.create_calls += 1;
        let thread_id = format!("thread-{}", ledger.next_thread);
        ledger.threads.insert(
            thread_id.clone(),
            ThreadRecord {
                name: name.to_string(),
                locked: false,
                messages: vec![initial_message.to_string()],
            },
        );
        Ok(ChatThread {
            id: thread_id,
            name: name.to_string(),
            locked: false,
        })
    }

    async fn fetch_thread(&self, thread_id: &str) -> Result<ChatThread, ChatError> {
        let ledger = self.ledger.lock().expect("chat ledger");
        let record = ledger
            .threads
            .get(thread_id)
            .ok_or_else(|| ChatError::ThreadNotFound(thread_id.to_string()))?;
        Ok(ChatThread {
            id: thread_id.to_string(),
            name: record.name.clone(),
            locked: record.locked,
        })
    }

    async fn rename_thread(&self, thread_id: &str, name: &str) -> Result<(), ChatError> {
        let mut ledger = self.ledger.lock().expect("chat ledger");
        let record = ledger
            .threads
            .get_mut(thread_id)
            .ok_or_else(|| ChatError::ThreadNotFound(thread_id.to_string()))?;
        record.name = name.to_string();
        Ok(())
    }

    async fn post_thread_message(
        &self,
        thread_id: &str,
        content: &str,
    ) -> Result<(), ChatError> {
        let mut ledger = self.ledger.lock().expect("chat ledger");
        let record = ledger
            .threads
            .get_mut(thread_id)
            .ok_or_else(|| ChatError::ThreadNotFound(thread_id.to_string()))?;
        record.messages.push(content.to_string());
        Ok(())
    }

    async fn lock_thread(&self, thread_id: &str) -> Result<(), ChatError> {
        let mut ledger = self.ledger.lock().expect("chat ledger");
        let record = ledger
            .threads
            .get_mut(thread_id)
            .ok_or_else(|| ChatError::ThreadNotFound(thread_id.to_string()))?;
        record.locked = true;
        Ok(())
    }
}

fn mirror_config(
    tracker: &Arc<InMemoryTracker>,
    chat: &Arc<RecordingChat>,
    state_dir: &Path,
    repos: Vec<RepoName>,
    poll_once: bool,
) -> MirrorBridgeRuntimeConfig {
    let tracker: Arc<dyn TrackerGateway> = tracker.clone();
    let chat: Arc<dyn ChatGateway> = chat.clone();
    MirrorBridgeRuntimeConfig {
        tracker,
        chat,
        repos,
        channel_id: "500".to_string(),
        state_dir: state_dir.to_path_buf(),
        poll_interval: Duration::from_millis(25),
        poll_once,
    }
}

fn read_mirror_state(state_dir: &Path) -> Value {
    let raw =
        fs::read_to_string(state_dir.join("thread-mirrors.json")).expect("mirror state file");
    serde_json::from_str(&raw).expect("mirror state json")
}

#[tokio::test]
async fn integration_three_cycle_lifecycle_converges_and_retires_the_mirror() {
    let workspace = IsolatedWorkspace::new("lifecycle");
    let repo = RepoName::parse("org/repo").expect("repo");
    let tracker = Arc::new(InMemoryTracker::new());
    let chat = Arc::new(RecordingChat::new("500"));
    tracker.upsert(&repo, open_issue(&repo, 42, "Bug A"));

    let config = mirror_config(&tracker, &chat, workspace.root(), vec![repo.clone()], false);
    let mut runtime = MirrorBridgeRuntime::new(config).expect("runtime");

    let first = runtime.poll_once().await.expect("first cycle");
    assert_eq!(first.discovered_items, 1);
    assert_eq!(first.created_mirrors, 1);
    let (thread_id, thread) = chat.thread_named("Bug A").expect("mirror thread");
    assert_eq!(
        thread.messages,
        vec!["**New Issue in org/repo:** https://github.com/org/repo/issues/42".to_string()]
    );
    let state = read_mirror_state(workspace.root());
    assert_eq!(state["schema_version"], 1);
    assert_eq!(
        state["mirrors"]["org/repo:42"]["thread_id"],
        thread_id.as_str()
    );
    assert_eq!(state["mirrors"]["org/repo:42"]["is_pull_request"], false);

    tracker.set_title(&repo, 42, "Bug A (fixed)");
    let second = runtime.poll_once().await.expect("second cycle");
    assert_eq!(second.created_mirrors, 0);
    assert_eq!(second.renamed_threads, 1);
    assert_eq!(chat.thread(&thread_id).name, "Bug A (fixed)");
    let state = read_mirror_state(workspace.root());
    assert_eq!(
        state["mirrors"]["org/repo:42"]["thread_id"],
        thread_id.as_str()
    );

    tracker.set_state(&repo, 42, ItemState::Closed);
    let third = runtime.poll_once().await.expect("third cycle");
    assert_eq!(third.closed_mirrors, 1);
    let thread = chat.thread(&thread_id);
    assert!(thread.locked);
    assert_eq!(
        thread.messages.last().map(String::as_str),
        Some("The Issue has been closed or merged. This thread will now be locked.")
    );
    let state = read_mirror_state(workspace.root());
    assert_eq!(state["mirrors"], json!({}));
}

#[tokio::test]
async fn integration_restart_resumes_from_persisted_mappings() {
    let workspace = IsolatedWorkspace::new("restart");
    let repo = RepoName::parse("org/repo").expect("repo");
    let tracker = Arc::new(InMemoryTracker::new());
    let chat = Arc::new(RecordingChat::new("500"));
    tracker.upsert(&repo, open_issue(&repo, 42, "Bug A"));

    let config = mirror_config(&tracker, &chat, workspace.root(), vec![repo.clone()], false);
    let mut first_run = MirrorBridgeRuntime::new(config.clone()).expect("first runtime");
    first_run.poll_once().await.expect("initial cycle");
    assert_eq!(chat.create_calls(), 1);
    drop(first_run);

    let mut second_run = MirrorBridgeRuntime::new(config).expect("restarted runtime");
    let resumed = second_run.poll_once().await.expect("resume cycle");
    assert_eq!(resumed.created_mirrors, 0);
    assert_eq!(chat.create_calls(), 1);

    tracker.set_state(&repo, 42, ItemState::Closed);
    let closing = second_run.poll_once().await.expect("closing cycle");
    assert_eq!(closing.closed_mirrors, 1);
    let (thread_id, _) = chat.thread_named("Bug A").expect("mirror thread");
    assert!(chat.thread(&thread_id).locked);
    let state = read_mirror_state(workspace.root());
    assert_eq!(state["mirrors"], json!({}));
}

#[tokio::test]
async fn functional_issue_and_pull_request_mirrors_use_kind_specific_messages() {
    let workspace = IsolatedWorkspace::new("kinds");
    let repo = RepoName::parse("org/repo").expect("repo");
    let tracker = Arc::new(InMemoryTracker::new());
    let chat = Arc::new(RecordingChat::new("500"));
    tracker.upsert(&repo, open_issue(&repo, 42, "Bug A"));
    tracker.upsert(&repo, open_pull_request(&repo, 7, "Add retries"));

    let config = mirror_config(&tracker, &chat, workspace.root(), vec![repo.clone()], false);
    let mut runtime = MirrorBridgeRuntime::new(config).expect("runtime");
    let first = runtime.poll_once().await.expect("first cycle");
    assert_eq!(first.created_mirrors, 2);

    let (issue_thread_id, issue_thread) = chat.thread_named("Bug A").expect("issue thread");
    assert_eq!(
        issue_thread.messages,
        vec!["**New Issue in org/repo:** https://github.com/org/repo/issues/42".to_string()]
    );
    let (pull_thread_id, pull_thread) = chat.thread_named("Add retries").expect("pull thread");
    assert_eq!(
        pull_thread.messages,
        vec!["**New Pull Request in org/repo:** https://github.com/org/repo/pull/7".to_string()]
    );

    tracker.set_state(&repo, 42, ItemState::Closed);
    tracker.set_state(&repo, 7, ItemState::Closed);
    let second = runtime.poll_once().await.expect("second cycle");
    assert_eq!(second.closed_mirrors, 2);
    assert_eq!(
        chat.thread(&issue_thread_id).messages.last().map(String::as_str),
        Some("The Issue has been closed or merged. This thread will now be locked.")
    );
    assert_eq!(
        chat.thread(&pull_thread_id).messages.last().map(String::as_str),
        Some("The Pull Request has been closed or merged. This thread will now be locked.")
    );
    let state = read_mirror_state(workspace.root());
    assert_eq!(state["mirrors"], json!({}));
}

#[tokio::test]
async fn integration_run_mirror_bridge_poll_once_completes_one_cycle() {
    let workspace = IsolatedWorkspace::new("poll-once");
    let repo = RepoName::parse("org/repo").expect("repo");
    let tracker = Arc::new(InMemoryTracker::new());
    let chat = Arc::new(RecordingChat::new("500"));
    tracker.upsert(&repo, open_issue(&repo, 42, "Bug A"));

    let config = mirror_config(&tracker, &chat, workspace.root(), vec![repo.clone()], true);
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);
    run_mirror_bridge(config, shutdown_rx)
        .await
        .expect("poll-once bridge run");

    assert_eq!(chat.create_calls(), 1);
    let state = read_mirror_state(workspace.root());
    assert_eq!(state["mirrors"]["org/repo:42"]["is_pull_request"], false);
}

#[tokio::test]
async fn integration_shutdown_signal_stops_the_bridge_loop() {
    let workspace = IsolatedWorkspace::new("shutdown");
    let repo = RepoName::parse("org/repo").expect("repo");
    let tracker = Arc::new(InMemoryTracker::new());
    let chat = Arc::new(RecordingChat::new("500"));
    tracker.upsert(&repo, open_issue(&repo, 42, "Bug A"));

    let mut config = mirror_config(&tracker, &chat, workspace.root(), vec![repo.clone()], false);
    config.poll_interval = Duration::from_secs(120);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = tokio::spawn(run_mirror_bridge(config, shutdown_rx));

    for _ in 0..200 {
        if chat.create_calls() == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(chat.create_calls(), 1);

    shutdown_tx.send(true).expect("send shutdown");
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("bridge returns before the timeout")
        .expect("join bridge task")
        .expect("clean shutdown");
    assert_eq!(chat.create_calls(), 1);
}

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
/// Public struct `BotIdentity` used across Stitch components.
pub struct BotIdentity {
    pub id: String,
    pub username: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Public struct `ChatChannel` used across Stitch components.
pub struct ChatChannel {
    pub id: String,
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Public struct `ChatThread` used across Stitch components.
pub struct ChatThread {
    pub id: String,
    pub name: String,
    pub locked: bool,
}

#[derive(Debug, Error)]
/// Enumerates supported `ChatError` values.
pub enum ChatError {
    #[error("chat channel '{0}' not found")]
    ChannelNotFound(String),
    #[error("chat thread '{0}' not found")]
    ThreadNotFound(String),
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("chat {operation} failed with status {status}: {body}")]
    Status {
        operation: String,
        status: u16,
        body: String,
    },
    #[error("failed to decode chat {operation} response: {source}")]
    Decode {
        operation: String,
        #[source]
        source: reqwest::Error,
    },
}

#[async_trait]
/// Trait contract for `ChatGateway` behavior.
///
/// Thread ids remain addressable after the parent channel reference goes
/// stale; all mutations address threads directly by id.
pub trait ChatGateway: Send + Sync {
    /// Verifies credentials and reports who the bot is logged in as.
    async fn resolve_bot_identity(&self) -> Result<BotIdentity, ChatError>;

    /// Looks up the mirror channel, distinguishing "missing" from transport
    /// failures via [`ChatError::ChannelNotFound`].
    async fn resolve_channel(&self, channel_id: &str) -> Result<ChatChannel, ChatError>;

    /// Creates a thread with its starter message and returns the new thread.
    async fn create_thread(
        &self,
        channel: &ChatChannel,
        name: &str,
        initial_message: &str,
    ) -> Result<ChatThread, ChatError>;

    async fn fetch_thread(&self, thread_id: &str) -> Result<ChatThread, ChatError>;

    async fn rename_thread(&self, thread_id: &str, name: &str) -> Result<(), ChatError>;

    async fn post_thread_message(&self, thread_id: &str, content: &str)
        -> Result<(), ChatError>;

    async fn lock_thread(&self, thread_id: &str) -> Result<(), ChatError>;
}

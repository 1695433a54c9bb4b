use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;

use stitch_core::retry::{
    is_retryable_http_error, parse_retry_after, retry_delay, should_retry_status,
    truncate_for_error,
};

use crate::gateway::{BotIdentity, ChatChannel, ChatError, ChatGateway, ChatThread};

/// Threads auto-archive after a day of inactivity; closure locks them for good.
const THREAD_AUTO_ARCHIVE_MINUTES: u32 = 1440;

#[derive(Debug, Clone, Deserialize)]
struct DiscordUserResponse {
    id: String,
    username: String,
}

#[derive(Debug, Clone, Deserialize)]
struct DiscordThreadMetadata {
    #[serde(default)]
    locked: bool,
}

#[derive(Debug, Clone, Deserialize)]
struct DiscordChannelResponse {
    id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    thread_metadata: Option<DiscordThreadMetadata>,
}

impl DiscordChannelResponse {
    fn into_thread(self) -> ChatThread {
        ChatThread {
            id: self.id,
            name: self.name.unwrap_or_default(),
            locked: self
                .thread_metadata
                .map(|metadata| metadata.locked)
                .unwrap_or(false),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct DiscordMessageResponse {
    #[allow(dead_code)]
    id: String,
}

#[derive(Clone)]
/// Discord REST implementation of the chat gateway.
pub struct DiscordClient {
    http: reqwest::Client,
    api_base: String,
    retry_max_attempts: usize,
    retry_base_delay_ms: u64,
}

impl DiscordClient {
    pub fn new(
        api_base: String,
        bot_token: String,
        request_timeout_ms: u64,
        retry_max_attempts: usize,
        retry_base_delay_ms: u64,
    ) -> Result<Self> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::USER_AGENT,
            reqwest::header::HeaderValue::from_static("Stitch-thread-mirror"),
        );
        headers.insert(
            reqwest::header::ACCEPT,
            reqwest::header::HeaderValue::from_static("application/json"),
        );
        let auth_header = format!("Bot {}", bot_token.trim());
        headers.insert(
            reqwest::header::AUTHORIZATION,
            reqwest::header::HeaderValue::from_str(&auth_header)
                .context("invalid discord authorization header")?,
        );

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_millis(request_timeout_ms.max(1)))
            .build()
            .context("failed to create discord api client")?;
        Ok(Self {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
            retry_max_attempts: retry_max_attempts.max(1),
            retry_base_delay_ms: retry_base_delay_ms.max(1),
        })
    }

    async fn request_json<T, F>(
        &self,
        operation: &'static str,
        mut request_builder: F,
    ) -> Result<T, ChatError>
    where
        T: DeserializeOwned,
        F: FnMut() -> reqwest::RequestBuilder,
    {
        let mut attempt = 0_usize;
        loop {
            attempt = attempt.saturating_add(1);
            let response = request_builder()
                .header(
                    "x-stitch-retry-attempt",
                    attempt.saturating_sub(1).to_string(),
                )
                .send()
                .await;
            match response {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return response
                            .json::<T>()
                            .await
                            .map_err(|error| ChatError::Decode {
                                operation: operation.to_string(),
                                source: error,
                            });
                    }

                    let retry_after = parse_retry_after(response.headers());
                    let body = response.text().await.unwrap_or_default();
                    if attempt < self.retry_max_attempts && should_retry_status(status.as_u16()) {
                        tokio::time::sleep(retry_delay(
                            self.retry_base_delay_ms,
                            attempt,
                            retry_after,
                        ))
                        .await;
                        continue;
                    }

                    return Err(ChatError::Status {
                        operation: operation.to_string(),
                        status: status.as_u16(),
                        body: truncate_for_error(&body, 800),
                    });
                }
                Err(error) => {
                    if attempt < self.retry_max_attempts && is_retryable_http_error(&error) {
                        tokio::time::sleep(retry_delay(self.retry_base_delay_ms, attempt, None))
                            .await;
                        continue;
                    }
                    return Err(ChatError::Http(error));
                }
            }
        }
    }
}

#[async_trait]
impl ChatGateway for DiscordClient {
    async fn resolve_bot_identity(&self) -> Result<BotIdentity, ChatError> {
        let user: DiscordUserResponse = self
            .request_json("resolve bot identity", || {
                self.http.get(format!("{}/users/@me", self.api_base))
            })
            .await?;
        Ok(BotIdentity {
            id: user.id,
            username: user.username,
        })
    }

    async fn resolve_channel(&self, channel_id: &str) -> Result<ChatChannel, ChatError> {
        let channel: DiscordChannelResponse = match self
            .request_json("resolve channel", || {
                self.http
                    .get(format!("{}/channels/{}", self.api_base, channel_id))
            })
            .await
        {
            Ok(channel) => channel,
            Err(ChatError::Status { status: 404, .. }) => {
                return Err(ChatError::ChannelNotFound(channel_id.to_string()));
            }
            Err(error) => return Err(error),
        };
        Ok(ChatChannel {
            id: channel.id,
            name: channel.name,
        })
    }

    async fn create_thread(
        &self,
        channel: &ChatChannel,
        name: &str,
        initial_message: &str,
    ) -> Result<ChatThread, ChatError> {
        let payload = json!({
            "name": name,
            "auto_archive_duration": THREAD_AUTO_ARCHIVE_MINUTES,
            "message": { "content": initial_message },
        });
        let thread: DiscordChannelResponse = self
            .request_json("create thread", || {
                self.http
                    .post(format!("{}/channels/{}/threads", self.api_base, channel.id))
                    .json(&payload)
            })
            .await?;
        Ok(thread.into_thread())
    }

    async fn fetch_thread(&self, thread_id: &str) -> Result<ChatThread, ChatError> {
        let thread: DiscordChannelResponse = match self
            .request_json("fetch thread", || {
                self.http
                    .get(format!("{}/channels/{}", self.api_base, thread_id))
            })
            .await
        {
            Ok(thread) => thread,
            Err(ChatError::Status { status: 404, .. }) => {
                return Err(ChatError::ThreadNotFound(thread_id.to_string()));
            }
            Err(error) => return Err(error),
        };
        Ok(thread.into_thread())
    }

    async fn rename_thread(&self, thread_id: &str, name: &str) -> Result<(), ChatError> {
        let payload = json!({ "name": name });
        let _: DiscordChannelResponse = self
            .request_json("rename thread", || {
                self.http
                    .patch(format!("{}/channels/{}", self.api_base, thread_id))
                    .json(&payload)
            })
            .await?;
        Ok(())
    }

    async fn post_thread_message(
        &self,
        thread_id: &str,
        content: &str,
    ) -> Result<(), ChatError> {
        let payload = json!({ "content": content });
        let _: DiscordMessageResponse = self
            .request_json("post thread message", || {
                self.http
                    .post(format!("{}/channels/{}/messages", self.api_base, thread_id))
                    .json(&payload)
            })
            .await?;
        Ok(())
    }

    async fn lock_thread(&self, thread_id: &str) -> Result<(), ChatError> {
        let payload = json!({ "locked": true });
        let _: DiscordChannelResponse = self
            .request_json("lock thread", || {
                self.http
                    .patch(format!("{}/channels/{}", self.api_base, thread_id))
                    .json(&payload)
            })
            .await?;
        Ok(())
    }
}

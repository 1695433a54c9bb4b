use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

use stitch_core::retry::{
    is_retryable_http_error, parse_retry_after, retry_delay, should_retry_status,
    truncate_for_error,
};

use crate::gateway::{TrackerError, TrackerGateway};
use crate::item::{ItemState, TrackedItem};
use crate::repo::RepoName;

const PAGE_SIZE: usize = 100;

/// One row of the issues/pulls REST payloads. The `pull_request` marker is
/// only present on issue rows that are really pull requests.
#[derive(Debug, Clone, Deserialize)]
struct IssuePayload {
    number: u64,
    title: String,
    html_url: String,
    state: ItemState,
    #[serde(default)]
    pull_request: Option<Value>,
}

impl IssuePayload {
    fn into_tracked_item(self, is_pull_request: bool) -> TrackedItem {
        TrackedItem {
            number: self.number,
            title: self.title,
            html_url: self.html_url,
            state: self.state,
            is_pull_request,
        }
    }
}

#[derive(Clone)]
/// GitHub REST implementation of the tracker gateway. Works with or without
/// a token; unauthenticated calls just run under the lower rate limits.
pub struct GithubClient {
    http: reqwest::Client,
    api_base: String,
    retry_max_attempts: usize,
    retry_base_delay_ms: u64,
}

impl GithubClient {
    pub fn new(
        api_base: String,
        token: Option<String>,
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
            reqwest::header::HeaderValue::from_static("application/vnd.github+json"),
        );
        headers.insert(
            "x-github-api-version",
            reqwest::header::HeaderValue::from_static("2022-11-28"),
        );
        if let Some(token) = token.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
            let auth_header = format!("Bearer {token}");
            headers.insert(
                reqwest::header::AUTHORIZATION,
                reqwest::header::HeaderValue::from_str(&auth_header)
                    .context("invalid github authorization header")?,
            );
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_millis(request_timeout_ms.max(1)))
            .build()
            .context("failed to create github api client")?;
        Ok(Self {
            http: client,
            api_base: api_base.trim_end_matches('/').to_string(),
            retry_max_attempts: retry_max_attempts.max(1),
            retry_base_delay_ms: retry_base_delay_ms.max(1),
        })
    }

    async fn request_json<T, F>(
        &self,
        operation: &'static str,
        mut request_builder: F,
    ) -> Result<T, TrackerError>
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
                        return response.json::<T>().await.map_err(|error| {
                            TrackerError::Decode {
                                operation: operation.to_string(),
                                source: error,
                            }
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

                    return Err(TrackerError::Status {
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
                    return Err(TrackerError::Http(error));
                }
            }
        }
    }
}

#[async_trait]
impl TrackerGateway for GithubClient {
    async fn list_open_issues(&self, repo: &RepoName) -> Result<Vec<TrackedItem>, TrackerError> {
        let mut page = 1_u32;
        let mut rows = Vec::new();
        loop {
            let api_base = self.api_base.clone();
            let owner = repo.owner.clone();
            let name = repo.name.clone();
            let page_value = page.to_string();
            let per_page_value = PAGE_SIZE.to_string();
            let chunk: Vec<IssuePayload> = self
                .request_json("list open issues", || {
                    self.http
                        .get(format!("{api_base}/repos/{owner}/{name}/issues"))
                        .query(&[
                            ("state", "open"),
                            ("per_page", per_page_value.as_str()),
                            ("page", page_value.as_str()),
                        ])
                })
                .await?;
            let chunk_len = chunk.len();
            // Pull requests surface in the issues listing too; the pulls
            // listing is their source of truth.
            rows.extend(
                chunk
                    .into_iter()
                    .filter(|row| row.pull_request.is_none())
                    .map(|row| row.into_tracked_item(false)),
            );
            if chunk_len < PAGE_SIZE {
                break;
            }
            page = page.saturating_add(1);
        }
        Ok(rows)
    }

    async fn list_open_pull_requests(
        &self,
        repo: &RepoName,
    ) -> Result<Vec<TrackedItem>, TrackerError> {
        let mut page = 1_u32;
        let mut rows = Vec::new();
        loop {
            let api_base = self.api_base.clone();
            let owner = repo.owner.clone();
            let name = repo.name.clone();
            let page_value = page.to_string();
            let per_page_value = PAGE_SIZE.to_string();
            let chunk: Vec<IssuePayload> = self
                .request_json("list open pull requests", || {
                    self.http
                        .get(format!("{api_base}/repos/{owner}/{name}/pulls"))
                        .query(&[
                            ("state", "open"),
                            ("per_page", per_page_value.as_str()),
                            ("page", page_value.as_str()),
                        ])
                })
                .await?;
            let chunk_len = chunk.len();
            rows.extend(chunk.into_iter().map(|row| row.into_tracked_item(true)));
            if chunk_len < PAGE_SIZE {
                break;
            }
            page = page.saturating_add(1);
        }
        Ok(rows)
    }

    async fn fetch_issue(
        &self,
        repo: &RepoName,
        number: u64,
    ) -> Result<TrackedItem, TrackerError> {
        let payload: IssuePayload = self
            .request_json("fetch issue", || {
                self.http.get(format!(
                    "{}/repos/{}/{}/issues/{}",
                    self.api_base, repo.owner, repo.name, number
                ))
            })
            .await?;
        let is_pull_request = payload.pull_request.is_some();
        Ok(payload.into_tracked_item(is_pull_request))
    }

    async fn fetch_pull_request(
        &self,
        repo: &RepoName,
        number: u64,
    ) -> Result<TrackedItem, TrackerError> {
        let payload: IssuePayload = self
            .request_json("fetch pull request", || {
                self.http.get(format!(
                    "{}/repos/{}/{}/pulls/{}",
                    self.api_base, repo.owner, repo.name, number
                ))
            })
            .await?;
        Ok(payload.into_tracked_item(true))
    }
}

use async_trait::async_trait;
use thiserror::Error;

use crate::item::TrackedItem;
use crate::repo::RepoName;

#[derive(Debug, Error)]
/// Enumerates supported `TrackerError` values.
pub enum TrackerError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("tracker {operation} failed with status {status}: {body}")]
    Status {
        operation: String,
        status: u16,
        body: String,
    },
    #[error("failed to decode tracker {operation} response: {source}")]
    Decode {
        operation: String,
        #[source]
        source: reqwest::Error,
    },
}

impl TrackerError {
    /// Status code of the failing call when one was received.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::Http(error) => error.status().map(|status| status.as_u16()),
            Self::Decode { .. } => None,
        }
    }
}

#[async_trait]
/// Trait contract for `TrackerGateway` behavior.
///
/// Listings return only open items; single-item fetches return the item in
/// whatever state it currently has so callers can observe closure.
pub trait TrackerGateway: Send + Sync {
    async fn list_open_issues(&self, repo: &RepoName) -> Result<Vec<TrackedItem>, TrackerError>;

    async fn list_open_pull_requests(
        &self,
        repo: &RepoName,
    ) -> Result<Vec<TrackedItem>, TrackerError>;

    async fn fetch_issue(&self, repo: &RepoName, number: u64)
        -> Result<TrackedItem, TrackerError>;

    async fn fetch_pull_request(
        &self,
        repo: &RepoName,
        number: u64,
    ) -> Result<TrackedItem, TrackerError>;
}

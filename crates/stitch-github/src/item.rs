use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
/// Enumerates supported `ItemState` values.
pub enum ItemState {
    Open,
    Closed,
}

impl ItemState {
    pub fn is_closed(self) -> bool {
        matches!(self, Self::Closed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Closed => "closed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// Public struct `TrackedItem` used across Stitch components.
///
/// One open issue or pull request as observed on the tracker. Merged pull
/// requests surface as `Closed`; the tracker does not distinguish them here.
pub struct TrackedItem {
    pub number: u64,
    pub title: String,
    pub html_url: String,
    pub state: ItemState,
    pub is_pull_request: bool,
}

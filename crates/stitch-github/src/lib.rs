//! GitHub tracker gateway: repository/item models, the `TrackerGateway`
//! trait consumed by the bridge runtime, and the REST client implementation.

pub mod client;
pub mod gateway;
pub mod item;
pub mod repo;

pub use client::GithubClient;
pub use gateway::{TrackerError, TrackerGateway};
pub use item::{ItemState, TrackedItem};
pub use repo::RepoName;

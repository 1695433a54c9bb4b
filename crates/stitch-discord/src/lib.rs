//! Discord chat gateway: the `ChatGateway` trait consumed by the bridge
//! runtime plus the REST client implementation used in production.

pub mod client;
pub mod gateway;

pub use client::DiscordClient;
pub use gateway::{BotIdentity, ChatChannel, ChatError, ChatGateway, ChatThread};

//! Notion REST API store.
//!
//! [`NotionClient`] implements [`crate::store::RemoteStore`] over the public
//! Notion API. Payload construction lives in [`payload`]; request pacing in
//! [`RateLimiter`].

mod client;
pub mod payload;
mod rate_limit;

pub use client::NotionClient;
pub use rate_limit::RateLimiter;

use async_trait::async_trait;

use crate::{domain::Validator, Result};

/// Raw result of one conditional GET against the feed endpoint.
#[derive(Clone, Debug, Default)]
pub struct FeedResponse {
    /// `304 Not Modified`; `body` is empty and carries no events.
    pub not_modified: bool,
    /// `ETag` response header, if any.
    pub etag: Option<String>,
    /// `X-Poll-Interval` response header, verbatim.
    pub poll_interval: Option<String>,
    pub body: Vec<u8>,
}

/// Hexagonal port for the inbound feed.
///
/// Implementations send `If-None-Match` when a validator is given and map any
/// network or non-success HTTP status (other than 304) to `Error::Transport`.
#[async_trait]
pub trait FeedSource: Send + Sync {
    /// Human-readable endpoint, for logs.
    fn endpoint(&self) -> &str;

    async fn fetch(&self, validator: Option<&Validator>) -> Result<FeedResponse>;
}

//! GitHub adapter: conditional GET against a user's received-events feed.

use async_trait::async_trait;
use ghr_core::{
    domain::{AccountLogin, Validator},
    errors::Error,
    feed::{FeedResponse, FeedSource},
    Result,
};
use reqwest::{header, StatusCode};
use tracing::debug;

const ACCEPT: &str = "application/vnd.github+json";
const USER_AGENT: &str = concat!("ghr/", env!("CARGO_PKG_VERSION"));
const POLL_INTERVAL_HEADER: &str = "x-poll-interval";

#[derive(Clone, Debug)]
pub struct GithubFeed {
    token: String,
    endpoint: String,
    http: reqwest::Client,
}

impl GithubFeed {
    pub fn new(api_url: &str, user: &AccountLogin, token: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| Error::External(format!("github client build error: {e}")))?;
        Ok(Self {
            token: token.into(),
            endpoint: received_events_url(api_url, user),
            http,
        })
    }
}

/// `{api}/users/{login}/received_events`
pub fn received_events_url(api_url: &str, user: &AccountLogin) -> String {
    format!(
        "{}/users/{}/received_events",
        api_url.trim_end_matches('/'),
        user.0
    )
}

fn header_string(headers: &header::HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

#[async_trait]
impl FeedSource for GithubFeed {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn fetch(&self, validator: Option<&Validator>) -> Result<FeedResponse> {
        let mut req = self
            .http
            .get(&self.endpoint)
            .bearer_auth(&self.token)
            .header(header::ACCEPT, ACCEPT);
        if let Some(v) = validator {
            req = req.header(header::IF_NONE_MATCH, &v.0);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| Error::Transport(format!("github request error: {e}")))?;

        let status = resp.status();
        let etag = header_string(resp.headers(), header::ETAG.as_str());
        let poll_interval = header_string(resp.headers(), POLL_INTERVAL_HEADER);
        debug!(%status, ?etag, ?poll_interval, "github feed response");

        if status == StatusCode::NOT_MODIFIED {
            return Ok(FeedResponse {
                not_modified: true,
                etag,
                poll_interval,
                body: Vec::new(),
            });
        }

        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Transport(format!(
                "github feed returned {status}: {}",
                body.chars().take(200).collect::<String>()
            )));
        }

        let body = resp
            .bytes()
            .await
            .map_err(|e| Error::Transport(format!("github body read error: {e}")))?;

        Ok(FeedResponse {
            not_modified: false,
            etag,
            poll_interval,
            body: body.to_vec(),
        })
    }
}

//! Slack adapter (Web API: `chat.postMessage`, `files.upload`).

use std::time::Duration;

use async_trait::async_trait;
use ghr_core::{
    delivery::{DeliveryPort, RawUpload},
    domain::ChannelId,
    errors::Error,
    render::RenderedNotification,
    Result,
};
use reqwest::{header, StatusCode};
use serde::Serialize;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Appended to the actor login in the message's display name.
pub const DISPLAY_NAME_SUFFIX: &str = "[github event]";

const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(1);

#[derive(Debug, Serialize, PartialEq)]
struct PostMessage<'a> {
    channel: &'a str,
    text: &'a str,
    username: String,
    #[serde(skip_serializing_if = "str::is_empty")]
    icon_url: &'a str,
    attachments: Vec<AttachmentPayload<'a>>,
    mrkdwn: bool,
    unfurl_links: bool,
    unfurl_media: bool,
}

#[derive(Debug, Serialize, PartialEq)]
struct AttachmentPayload<'a> {
    text: &'a str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    mrkdwn_in: Vec<&'static str>,
}

fn post_message_payload<'a>(
    channel: &'a ChannelId,
    msg: &'a RenderedNotification,
) -> PostMessage<'a> {
    PostMessage {
        channel: &channel.0,
        text: &msg.headline,
        username: format!("{}{DISPLAY_NAME_SUFFIX}", msg.actor_name),
        icon_url: &msg.actor_icon,
        attachments: msg
            .attachments
            .iter()
            .map(|a| AttachmentPayload {
                text: &a.text,
                mrkdwn_in: if a.markdown { vec!["text"] } else { Vec::new() },
            })
            .collect(),
        mrkdwn: true,
        unfurl_links: false,
        unfurl_media: false,
    }
}

/// Slack answers 200 with `{"ok": false, "error": "..."}` for API-level failures.
fn check_ok(method: &str, body: &serde_json::Value) -> Result<()> {
    if body.get("ok").and_then(|v| v.as_bool()) == Some(true) {
        return Ok(());
    }
    let reason = body
        .get("error")
        .and_then(|v| v.as_str())
        .unwrap_or("unknown error");
    Err(Error::Delivery(format!("slack {method} failed: {reason}")))
}

fn retry_after(headers: &header::HeaderMap) -> Duration {
    headers
        .get(header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or(DEFAULT_RETRY_AFTER)
}

#[derive(Clone, Debug)]
pub struct SlackDelivery {
    token: String,
    api_url: String,
    http: reqwest::Client,
}

impl SlackDelivery {
    pub fn new(api_url: &str, token: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| Error::External(format!("slack client build error: {e}")))?;
        Ok(Self {
            token: token.into(),
            api_url: api_url.trim_end_matches('/').to_string(),
            http,
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/{method}", self.api_url)
    }

    /// Send a request built by `build`, retrying once when Slack rate-limits us.
    async fn call(
        &self,
        method: &str,
        build: impl Fn() -> reqwest::RequestBuilder,
    ) -> Result<()> {
        const MAX_RETRIES: usize = 1;
        let mut attempts = 0usize;
        loop {
            let resp = build()
                .bearer_auth(&self.token)
                .send()
                .await
                .map_err(|e| Error::Delivery(format!("slack {method} request error: {e}")))?;

            let status = resp.status();
            if status == StatusCode::TOO_MANY_REQUESTS && attempts < MAX_RETRIES {
                attempts += 1;
                let wait = retry_after(resp.headers());
                warn!(method, ?wait, "slack rate limited; retrying");
                sleep(wait).await;
                continue;
            }

            if !status.is_success() {
                let body = resp.text().await.unwrap_or_default();
                return Err(Error::Delivery(format!(
                    "slack {method} failed: {status} {}",
                    body.chars().take(200).collect::<String>()
                )));
            }

            let body: serde_json::Value = resp
                .json()
                .await
                .map_err(|e| Error::Delivery(format!("slack {method} json error: {e}")))?;
            debug!(method, "slack call ok");
            return check_ok(method, &body);
        }
    }
}

#[async_trait]
impl DeliveryPort for SlackDelivery {
    async fn post(&self, channel: &ChannelId, msg: &RenderedNotification) -> Result<()> {
        let url = self.method_url("chat.postMessage");
        let payload = post_message_payload(channel, msg);
        self.call("chat.postMessage", || self.http.post(&url).json(&payload))
            .await
    }

    async fn upload_raw(&self, channel: &ChannelId, upload: &RawUpload) -> Result<()> {
        let url = self.method_url("files.upload");
        self.call("files.upload", || {
            let form = reqwest::multipart::Form::new()
                .text("channels", channel.0.clone())
                .text("content", upload.content.clone())
                .text("filename", upload.filename.clone())
                .text("filetype", upload.filetype.clone())
                .text("initial_comment", upload.initial_comment.clone());
            self.http.post(&url).multipart(form)
        })
        .await
    }
}

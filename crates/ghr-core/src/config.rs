use std::{
    env, fs,
    path::{Path, PathBuf},
};

use serde::Deserialize;

use crate::{
    domain::{AccountLogin, ChannelId},
    errors::Error,
    Result,
};

const DEFAULT_GITHUB_API_URL: &str = "https://api.github.com";
const DEFAULT_SLACK_API_URL: &str = "https://slack.com/api";

/// Typed configuration for the relay.
///
/// Two credential pairs (GitHub feed, Slack delivery) plus the API base URLs.
/// The checkpoint path comes from the `watch` subcommand, not from here.
#[derive(Clone, Debug)]
pub struct Config {
    // GitHub (inbound feed)
    pub github_token: String,
    pub github_user: AccountLogin,
    pub github_api_url: String,

    // Slack (outbound delivery)
    pub slack_token: String,
    pub slack_channel: ChannelId,
    pub slack_api_url: String,
}

/// On-disk shape of `config.json`.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileConfig {
    slack: SlackSection,
    github: GithubSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SlackSection {
    token: String,
    channel: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct GithubSection {
    token: String,
    user: String,
}

impl Config {
    /// Load `config.json` (when present), then apply environment overrides.
    ///
    /// A missing file is fine as long as the environment supplies every credential.
    pub fn load(path: &Path) -> Result<Self> {
        let file = if path.exists() {
            let txt = fs::read_to_string(path)?;
            serde_json::from_str::<FileConfig>(&txt).map_err(|e| {
                Error::Config(format!("failed to parse {}: {e}", path.display()))
            })?
        } else {
            FileConfig::default()
        };

        Self::from_parts(file, env_str)
    }

    fn from_parts(file: FileConfig, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let pick = |key: &str, fallback: String| env(key).and_then(non_empty).unwrap_or(fallback);

        let github_token = pick("GITHUB_TOKEN", file.github.token);
        let github_user = pick("GITHUB_USER", file.github.user);
        let slack_token = pick("SLACK_TOKEN", file.slack.token);
        let slack_channel = pick("SLACK_CHANNEL", file.slack.channel);

        for (name, value) in [
            ("github.token (GITHUB_TOKEN)", &github_token),
            ("github.user (GITHUB_USER)", &github_user),
            ("slack.token (SLACK_TOKEN)", &slack_token),
            ("slack.channel (SLACK_CHANNEL)", &slack_channel),
        ] {
            if value.trim().is_empty() {
                return Err(Error::Config(format!("{name} is required")));
            }
        }

        let github_api_url = pick("GITHUB_API_URL", DEFAULT_GITHUB_API_URL.to_string())
            .trim_end_matches('/')
            .to_string();
        let slack_api_url = pick("SLACK_API_URL", DEFAULT_SLACK_API_URL.to_string())
            .trim_end_matches('/')
            .to_string();

        Ok(Self {
            github_token,
            github_user: AccountLogin(github_user.trim().to_string()),
            github_api_url,
            slack_token,
            slack_channel: ChannelId(slack_channel.trim().to_string()),
            slack_api_url,
        })
    }
}

/// Default checkpoint location for `watch`.
pub fn default_state_path() -> PathBuf {
    PathBuf::from(".state")
}

fn env_str(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}

use crate::{feed::Envelope, formatting::slack_link};

pub const GITHUB_WEB_BASE: &str = "https://github.com";

/// Link helpers derived from an envelope's actor and repository. Pure; no I/O.
#[derive(Clone, Copy, Debug)]
pub struct EventContext<'a> {
    envelope: &'a Envelope,
}

impl<'a> EventContext<'a> {
    pub fn new(envelope: &'a Envelope) -> Self {
        Self { envelope }
    }

    pub fn repo_name(&self) -> &'a str {
        &self.envelope.repo.name
    }

    pub fn repo_url(&self) -> String {
        format!("{GITHUB_WEB_BASE}/{}", self.repo_name())
    }

    pub fn repo_link(&self) -> String {
        slack_link(&self.repo_url(), self.repo_name())
    }

    pub fn user_name(&self) -> &'a str {
        &self.envelope.actor.login
    }

    pub fn user_url(&self) -> String {
        format!("{GITHUB_WEB_BASE}/{}", self.user_name())
    }

    pub fn user_link(&self) -> String {
        slack_link(&self.user_url(), self.user_name())
    }

    pub fn tree_url(&self, path: &str) -> String {
        format!("{}/tree/{path}", self.repo_url())
    }

    pub fn tree_link(&self, path: &str) -> String {
        slack_link(&self.tree_url(path), path)
    }

    pub fn commit_url(&self, sha: &str) -> String {
        format!("{}/commit/{sha}", self.repo_url())
    }

    /// `owner/name#N`.
    pub fn issue_ref(&self, number: u64) -> String {
        format!("{}#{number}", self.repo_name())
    }
}

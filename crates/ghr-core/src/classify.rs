//! Event classification: map an envelope's type tag to a typed payload.
//!
//! The set of modelled event kinds is closed. Every other tag is reported as
//! `ClassifyError::UnknownType` so the caller can decide whether to surface the
//! raw record.

use serde::{Deserialize, Deserializer};

use crate::feed::Envelope;

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Commit {
    pub sha: String,
    #[serde(deserialize_with = "nullable")]
    pub message: String,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PushEvent {
    #[serde(rename = "ref")]
    pub git_ref: String,
    #[serde(deserialize_with = "nullable")]
    pub commits: Vec<Commit>,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Comment {
    pub html_url: String,
    #[serde(deserialize_with = "nullable")]
    pub body: String,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Issue {
    pub number: u64,
    #[serde(deserialize_with = "nullable")]
    pub title: String,
    pub html_url: String,
    /// Present when the issue is a pull request.
    pub pull_request: Option<serde_json::Value>,
}

impl Issue {
    pub fn is_pull_request(&self) -> bool {
        self.pull_request.as_ref().is_some_and(|v| !v.is_null())
    }
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PullRequest {
    pub number: u64,
    #[serde(deserialize_with = "nullable")]
    pub title: String,
    pub html_url: String,
    #[serde(deserialize_with = "nullable")]
    pub commits: u64,
    #[serde(deserialize_with = "nullable")]
    pub additions: u64,
    #[serde(deserialize_with = "nullable")]
    pub deletions: u64,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct IssueCommentEvent {
    pub action: String,
    pub comment: Comment,
    pub issue: Issue,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct IssuesEvent {
    pub action: String,
    pub issue: Issue,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PullRequestEvent {
    pub action: String,
    pub number: u64,
    pub pull_request: PullRequest,
}

impl PullRequestEvent {
    pub fn pr_number(&self) -> u64 {
        if self.number != 0 {
            self.number
        } else {
            self.pull_request.number
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PullRequestReviewCommentEvent {
    pub action: String,
    pub comment: Comment,
    pub pull_request: PullRequest,
}

/// A decoded payload of one of the modelled event kinds.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TypedEvent {
    Push(PushEvent),
    IssueComment(IssueCommentEvent),
    Issues(IssuesEvent),
    PullRequest(PullRequestEvent),
    PullRequestReviewComment(PullRequestReviewCommentEvent),
}

type Decoder = fn(&str) -> serde_json::Result<TypedEvent>;

/// Type tag -> payload decoder.
const REGISTRY: &[(&str, Decoder)] = &[
    ("PushEvent", |p| serde_json::from_str(p).map(TypedEvent::Push)),
    ("IssueCommentEvent", |p| {
        serde_json::from_str(p).map(TypedEvent::IssueComment)
    }),
    ("IssuesEvent", |p| serde_json::from_str(p).map(TypedEvent::Issues)),
    ("PullRequestEvent", |p| {
        serde_json::from_str(p).map(TypedEvent::PullRequest)
    }),
    ("PullRequestReviewCommentEvent", |p| {
        serde_json::from_str(p).map(TypedEvent::PullRequestReviewComment)
    }),
];

/// An envelope together with its decoded payload.
#[derive(Clone, Debug)]
pub struct Classified {
    pub envelope: Envelope,
    pub event: TypedEvent,
}

#[derive(Debug, thiserror::Error)]
pub enum ClassifyError {
    #[error("unknown event: {tag}")]
    UnknownType { tag: String, envelope: Box<Envelope> },

    #[error("malformed {tag} payload: {source}")]
    Decode {
        tag: String,
        envelope: Box<Envelope>,
        #[source]
        source: serde_json::Error,
    },
}

impl ClassifyError {
    pub fn tag(&self) -> &str {
        match self {
            ClassifyError::UnknownType { tag, .. } | ClassifyError::Decode { tag, .. } => tag,
        }
    }

    /// The record that failed, raw bytes included.
    pub fn envelope(&self) -> &Envelope {
        match self {
            ClassifyError::UnknownType { envelope, .. }
            | ClassifyError::Decode { envelope, .. } => envelope,
        }
    }
}

/// Decode an envelope's payload according to its type tag.
pub fn classify(envelope: Envelope) -> Result<Classified, ClassifyError> {
    let Some((_, decode)) = REGISTRY.iter().find(|(tag, _)| *tag == envelope.kind) else {
        return Err(ClassifyError::UnknownType {
            tag: envelope.kind.clone(),
            envelope: Box::new(envelope),
        });
    };

    match decode(envelope.payload_json()) {
        Ok(event) => Ok(Classified { envelope, event }),
        Err(source) => Err(ClassifyError::Decode {
            tag: envelope.kind.clone(),
            envelope: Box::new(envelope),
            source,
        }),
    }
}

/// Treat an explicit JSON `null` like a missing field.
fn nullable<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Option::unwrap_or_default)
}

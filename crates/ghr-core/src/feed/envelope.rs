use std::fmt;

use chrono::{DateTime, Utc};
use serde::{de, Deserialize, Deserializer};
use serde_json::value::RawValue;

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Actor {
    pub login: String,
    pub avatar_url: String,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Repo {
    /// `owner/name`.
    pub name: String,
}

/// One activity record from the feed, payload still undecoded.
///
/// The record bytes as received are kept in `raw` so a record the classifier
/// cannot handle can be re-uploaded verbatim for inspection.
#[derive(Clone)]
pub struct Envelope {
    /// Event type tag (`PushEvent`, `IssuesEvent`, ...).
    pub kind: String,
    pub actor: Actor,
    pub repo: Repo,
    pub payload: Option<Box<RawValue>>,
    pub created_at: DateTime<Utc>,
    pub public: bool,
    raw: Box<RawValue>,
}

#[derive(Deserialize)]
struct EnvelopeFields {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    actor: Actor,
    #[serde(default)]
    repo: Repo,
    #[serde(default)]
    payload: Option<Box<RawValue>>,
    created_at: DateTime<Utc>,
    #[serde(default)]
    public: bool,
}

impl Envelope {
    pub fn from_raw(raw: Box<RawValue>) -> serde_json::Result<Self> {
        let f: EnvelopeFields = serde_json::from_str(raw.get())?;
        Ok(Self {
            kind: f.kind,
            actor: f.actor,
            repo: f.repo,
            payload: f.payload,
            created_at: f.created_at,
            public: f.public,
            raw,
        })
    }

    /// Decode a standalone record (single-shot mode).
    pub fn from_slice(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }

    /// Decode a feed page. The feed lists records newest-first.
    pub fn batch_from_slice(bytes: &[u8]) -> serde_json::Result<Vec<Self>> {
        serde_json::from_slice(bytes)
    }

    /// The record exactly as received.
    pub fn raw_json(&self) -> &str {
        self.raw.get()
    }

    /// The `payload` object, `{}` when the record has none.
    pub fn payload_json(&self) -> &str {
        self.payload.as_deref().map(RawValue::get).unwrap_or("{}")
    }
}

impl<'de> Deserialize<'de> for Envelope {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Box::<RawValue>::deserialize(deserializer)?;
        Envelope::from_raw(raw).map_err(de::Error::custom)
    }
}

impl fmt::Debug for Envelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Envelope")
            .field("kind", &self.kind)
            .field("actor", &self.actor.login)
            .field("repo", &self.repo.name)
            .field("created_at", &self.created_at)
            .field("public", &self.public)
            .field("raw", &format_args!("<{} bytes>", self.raw.get().len()))
            .finish()
    }
}

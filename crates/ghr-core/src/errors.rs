use std::path::PathBuf;

/// Core error type for the relay.
///
/// Adapter crates map their transport errors into this type so the pipeline can
/// report every failure through the same channel. None of these are fatal inside
/// the core; only startup configuration failures end the process.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("feed transport error: {0}")]
    Transport(String),

    #[error("invalid X-Poll-Interval {value:?}: {reason}")]
    IntervalDecode { value: String, reason: String },

    #[error("malformed event batch: {0}")]
    BodyDecode(#[source] serde_json::Error),

    #[error("checkpoint error: {path}: {reason}")]
    Checkpoint { path: PathBuf, reason: String },

    #[error(transparent)]
    Classify(#[from] crate::classify::ClassifyError),

    #[error("delivery error: {0}")]
    Delivery(String),

    #[error("external error: {0}")]
    External(String),
}

pub type Result<T> = std::result::Result<T, Error>;

use serde::Serialize;
use serde_json::ser::{PrettyFormatter, Serializer};

use crate::{feed::Envelope, Result};

/// A file upload carrying an unhandled feed record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawUpload {
    pub content: String,
    pub filename: String,
    pub filetype: String,
    pub initial_comment: String,
}

impl RawUpload {
    /// `<type>.json` with the record pretty-printed (tab indented).
    pub fn for_envelope(envelope: &Envelope, comment: impl Into<String>) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_str(envelope.raw_json())?;

        let mut buf = Vec::new();
        let mut ser = Serializer::with_formatter(&mut buf, PrettyFormatter::with_indent(b"\t"));
        value.serialize(&mut ser)?;

        Ok(Self {
            content: String::from_utf8_lossy(&buf).into_owned(),
            filename: format!("{}.json", envelope.kind),
            filetype: "javascript".to_string(),
            initial_comment: comment.into(),
        })
    }
}

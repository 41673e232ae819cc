/// Slack channel id or name (`C0123ABCD`, `#general`).
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ChannelId(pub String);

/// GitHub account whose received-events feed is watched.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct AccountLogin(pub String);

/// Opaque cache validator (`ETag`) echoed back as `If-None-Match`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Validator(pub String);

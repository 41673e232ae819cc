//! Inbound side: the GitHub received-events feed.

pub mod envelope;
pub mod poller;
pub mod port;

use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::domain::Validator;

pub use envelope::{Actor, Envelope, Repo};
pub use poller::{Cycle, CycleOutcome, FeedPoller, PollerOutputs};
pub use port::{FeedResponse, FeedSource};

/// Poll interval used until the feed sends an `X-Poll-Interval` hint.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(60);

/// Everything the poller needs to resume where it left off.
///
/// `watermark` only moves forward, `interval` is always positive, and a
/// validator is only ever replaced, never cleared.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResumeState {
    pub validator: Option<Validator>,
    pub watermark: DateTime<Utc>,
    pub interval: Duration,
}

impl Default for ResumeState {
    fn default() -> Self {
        Self {
            validator: None,
            watermark: DateTime::<Utc>::UNIX_EPOCH,
            interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

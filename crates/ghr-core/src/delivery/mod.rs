//! Outbound side: chat delivery (Slack today).

pub mod port;
pub mod throttled;
pub mod types;

pub use port::DeliveryPort;
pub use throttled::{ThrottleConfig, ThrottledDelivery};
pub use types::RawUpload;

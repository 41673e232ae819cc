use async_trait::async_trait;

use crate::{
    delivery::types::RawUpload, domain::ChannelId, render::RenderedNotification, Result,
};

/// Hexagonal port for delivering notifications.
///
/// Implementations post with markdown enabled and link/media previews
/// disabled, and show the notification's actor as the sender. Failures map to
/// `Error::Delivery`.
#[async_trait]
pub trait DeliveryPort: Send + Sync {
    async fn post(&self, channel: &ChannelId, msg: &RenderedNotification) -> Result<()>;

    /// Attach a file to the channel (used for records the relay cannot render).
    async fn upload_raw(&self, channel: &ChannelId, upload: &RawUpload) -> Result<()>;
}

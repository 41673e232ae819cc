use std::{collections::HashMap, sync::Arc, time::Duration};

use tokio::sync::Mutex;
use tokio::time::{sleep_until, Instant};

use crate::{
    delivery::{port::DeliveryPort, types::RawUpload},
    domain::ChannelId,
    render::RenderedNotification,
    Result,
};

#[derive(Clone, Copy, Debug)]
pub struct ThrottleConfig {
    /// Minimum spacing between *any* two Slack API calls.
    pub global_min_interval: Duration,
    /// Minimum spacing between calls targeting the same channel (Slack allows
    /// roughly one message per second per channel).
    pub per_channel_min_interval: Duration,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            global_min_interval: Duration::from_millis(100),
            per_channel_min_interval: Duration::from_millis(1050),
        }
    }
}

/// Remembers when the last call on one lane (global or one channel) started.
#[derive(Debug, Default)]
struct Pacer {
    last_start: Option<Instant>,
}

impl Pacer {
    /// Earliest instant at or after `now` that is `spacing` past the last start.
    fn earliest(&self, now: Instant, spacing: Duration) -> Instant {
        match self.last_start {
            Some(last) => now.max(last + spacing),
            None => now,
        }
    }
}

#[derive(Debug, Default)]
struct Schedule {
    global: Pacer,
    channels: HashMap<ChannelId, Pacer>,
}

impl Schedule {
    /// Book the start of a call on `channel` and return when it may begin.
    ///
    /// Both lanes record the same start, so the later of the two constraints
    /// wins and neither lane is booked for a slot the call does not use.
    fn book(&mut self, channel: &ChannelId, cfg: &ThrottleConfig, now: Instant) -> Instant {
        let lane = self.channels.entry(channel.clone()).or_default();
        let start = lane
            .earliest(now, cfg.per_channel_min_interval)
            .max(self.global.earliest(now, cfg.global_min_interval));
        lane.last_start = Some(start);
        self.global.last_start = Some(start);
        start
    }
}

/// DeliveryPort decorator that spaces out outbound calls.
///
/// Best-effort: a push with many commits or a burst after a long outage still
/// arrives in order, just paced, which keeps Slack from answering 429.
pub struct ThrottledDelivery {
    inner: Arc<dyn DeliveryPort>,
    cfg: ThrottleConfig,
    schedule: Mutex<Schedule>,
}

impl ThrottledDelivery {
    pub fn new(inner: Arc<dyn DeliveryPort>, cfg: ThrottleConfig) -> Self {
        Self {
            inner,
            cfg,
            schedule: Mutex::new(Schedule::default()),
        }
    }

    async fn wait_turn(&self, channel: &ChannelId) {
        let start = self
            .schedule
            .lock()
            .await
            .book(channel, &self.cfg, Instant::now());
        sleep_until(start).await;
    }
}

#[async_trait::async_trait]
impl DeliveryPort for ThrottledDelivery {
    async fn post(&self, channel: &ChannelId, msg: &RenderedNotification) -> Result<()> {
        self.wait_turn(channel).await;
        self.inner.post(channel, msg).await
    }

    async fn upload_raw(&self, channel: &ChannelId, upload: &RawUpload) -> Result<()> {
        self.wait_turn(channel).await;
        self.inner.upload_raw(channel, upload).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    struct Recorder {
        calls: StdMutex<Vec<(String, Instant)>>,
    }

    #[async_trait::async_trait]
    impl DeliveryPort for Recorder {
        async fn post(&self, channel: &ChannelId, _msg: &RenderedNotification) -> Result<()> {
            self.calls
                .lock()
                .unwrap()
                .push((format!("post:{}", channel.0), Instant::now()));
            Ok(())
        }

        async fn upload_raw(&self, channel: &ChannelId, _upload: &RawUpload) -> Result<()> {
            self.calls
                .lock()
                .unwrap()
                .push((format!("upload:{}", channel.0), Instant::now()));
            Ok(())
        }
    }

    fn notification() -> RenderedNotification {
        RenderedNotification {
            headline: "hi".to_string(),
            attachments: Vec::new(),
            actor_name: "octocat".to_string(),
            actor_icon: String::new(),
        }
    }

    #[tokio::test]
    async fn forwards_and_paces_calls_on_the_same_channel() {
        let inner = Arc::new(Recorder::default());
        let throttled = ThrottledDelivery::new(
            inner.clone(),
            ThrottleConfig {
                global_min_interval: Duration::ZERO,
                per_channel_min_interval: Duration::from_millis(50),
            },
        );
        let channel = ChannelId("C1".to_string());
        let upload = RawUpload {
            content: "{}".to_string(),
            filename: "X.json".to_string(),
            filetype: "javascript".to_string(),
            initial_comment: "unknown event: X".to_string(),
        };

        throttled.post(&channel, &notification()).await.unwrap();
        throttled.upload_raw(&channel, &upload).await.unwrap();

        let calls = inner.calls.lock().unwrap().clone();
        assert_eq!(calls[0].0, "post:C1");
        assert_eq!(calls[1].0, "upload:C1");
        assert!(calls[1].1.duration_since(calls[0].1) >= Duration::from_millis(45));
    }

    #[test]
    fn schedule_spaces_per_channel_and_globally() {
        let cfg = ThrottleConfig {
            global_min_interval: Duration::from_millis(100),
            per_channel_min_interval: Duration::from_secs(1),
        };
        let a = ChannelId("A".to_string());
        let b = ChannelId("B".to_string());
        let t0 = Instant::now();
        let mut sched = Schedule::default();

        assert_eq!(sched.book(&a, &cfg, t0), t0);
        // Same channel: held back by the per-channel spacing.
        assert_eq!(sched.book(&a, &cfg, t0), t0 + Duration::from_secs(1));
        // Other channel: only the global spacing applies, counted from the
        // latest booked start.
        assert_eq!(
            sched.book(&b, &cfg, t0),
            t0 + Duration::from_millis(1100)
        );
        // Long after everything: no wait.
        let later = t0 + Duration::from_secs(10);
        assert_eq!(sched.book(&a, &cfg, later), later);
    }
}

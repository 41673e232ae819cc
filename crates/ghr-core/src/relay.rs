//! Pipeline wiring: envelope -> classify -> render -> deliver.
//!
//! `watch` runs the long-lived pipeline (poller task, error sink task, and the
//! synchronous consumer on the caller's task). `single` pushes one pre-captured
//! record through the same classify/render/deliver path without touching the
//! poller or the checkpoint.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use tokio::io::AsyncReadExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    checkpoint,
    classify::{classify, ClassifyError},
    delivery::{DeliveryPort, RawUpload},
    domain::ChannelId,
    errors::Error,
    feed::{Envelope, FeedPoller, FeedSource, PollerOutputs, ResumeState},
    render::render,
    Result,
};

/// Pending envelopes between the poller and the consumer. When full, the
/// poller waits before emitting more.
pub const EVENT_QUEUE_CAPACITY: usize = 64;
pub const ERROR_QUEUE_CAPACITY: usize = 64;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    Posted,
    /// Classification failed; `uploaded` tells whether the raw record was
    /// attached to the channel for inspection.
    Unclassified { tag: String, uploaded: bool },
}

pub struct Relay {
    delivery: Arc<dyn DeliveryPort>,
    channel: ChannelId,
}

impl Relay {
    pub fn new(delivery: Arc<dyn DeliveryPort>, channel: ChannelId) -> Self {
        Self { delivery, channel }
    }

    /// Deliver one envelope from the feed.
    ///
    /// A record the classifier rejects is not a failure: it is logged and,
    /// when the source event is public, uploaded raw. Private records are
    /// never uploaded. `Err` means a delivery call failed.
    pub async fn relay_event(&self, envelope: Envelope) -> Result<Outcome> {
        let classified = match classify(envelope) {
            Ok(c) => c,
            Err(e) => return self.report_unclassified(e).await,
        };

        let msg = render(&classified);
        debug!(
            kind = %classified.envelope.kind,
            actor = %classified.envelope.actor.login,
            repo = %classified.envelope.repo.name,
            "posting notification"
        );
        self.delivery.post(&self.channel, &msg).await?;
        Ok(Outcome::Posted)
    }

    async fn report_unclassified(&self, err: ClassifyError) -> Result<Outcome> {
        let tag = err.tag().to_string();
        let envelope = err.envelope();
        warn!(
            kind = %tag,
            public = envelope.public,
            created_at = %envelope.created_at,
            "{err}"
        );

        if !envelope.public {
            return Ok(Outcome::Unclassified {
                tag,
                uploaded: false,
            });
        }

        let upload = RawUpload::for_envelope(envelope, err.to_string())?;
        self.delivery.upload_raw(&self.channel, &upload).await?;
        Ok(Outcome::Unclassified {
            tag,
            uploaded: true,
        })
    }

    /// Single-shot mode: classify, render and post exactly one record.
    ///
    /// Unlike `relay_event`, a classification failure is returned as an error
    /// and nothing is uploaded.
    pub async fn single(&self, envelope: Envelope) -> Result<()> {
        let classified = classify(envelope)?;
        self.delivery.post(&self.channel, &render(&classified)).await
    }

    /// Consume envelopes until the poller closes the queue or `cancel` fires.
    ///
    /// Each delivery completes before the next envelope is taken, so a slow
    /// Slack call backs up the queue and, once it is full, the poller. On
    /// cancellation the delivery in flight is dropped and queued envelopes are
    /// left behind; their watermark is already checkpointed.
    pub async fn consume(
        &self,
        mut events: mpsc::Receiver<Envelope>,
        errors: mpsc::Sender<Error>,
        cancel: CancellationToken,
    ) {
        loop {
            let envelope = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                next = events.recv() => match next {
                    Some(env) => env,
                    None => break,
                },
            };

            let res = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                res = self.relay_event(envelope) => res,
            };
            if let Err(e) = res {
                // The sink only stops once every sender is gone.
                let _ = errors.send(e).await;
            }
        }
        if cancel.is_cancelled() {
            debug!(pending = events.len(), "consumer stopped on cancellation");
        }
    }
}

/// Read one event record for single-shot mode; `-` reads stdin.
pub async fn read_event(source: &Path) -> Result<Envelope> {
    let bytes = if source == Path::new("-") {
        let mut buf = Vec::new();
        tokio::io::stdin().read_to_end(&mut buf).await?;
        buf
    } else {
        tokio::fs::read(source).await?
    };
    Ok(Envelope::from_slice(&bytes)?)
}

/// Drain reported errors into the log until every sender is dropped.
pub fn spawn_error_sink(mut errors: mpsc::Receiver<Error>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(e) = errors.recv().await {
            warn!("{e}");
        }
    })
}

/// Load the checkpoint, falling back to defaults on absence or corruption.
pub fn initial_state(path: &Path) -> ResumeState {
    match checkpoint::load(path) {
        Ok(Some(st)) => {
            info!(path = %path.display(), watermark = %st.watermark, "resuming from checkpoint");
            st
        }
        Ok(None) => ResumeState::default(),
        Err(e) => {
            warn!("checkpoint unreadable, starting fresh: {e}");
            ResumeState::default()
        }
    }
}

/// Watch mode: poll the feed and relay new events until `cancel` fires.
///
/// The poller saves its state to `state_path` on the way out. Envelopes still
/// queued at that point are not delivered.
pub async fn watch(
    source: Arc<dyn FeedSource>,
    relay: Arc<Relay>,
    state_path: PathBuf,
    cancel: CancellationToken,
) -> Result<ResumeState> {
    let initial = initial_state(&state_path);

    let (ev_tx, ev_rx) = mpsc::channel(EVENT_QUEUE_CAPACITY);
    let (err_tx, err_rx) = mpsc::channel(ERROR_QUEUE_CAPACITY);
    let sink = spawn_error_sink(err_rx);

    let poller = tokio::spawn(FeedPoller::new(source, initial).run(
        PollerOutputs {
            events: ev_tx,
            errors: err_tx.clone(),
        },
        cancel.clone(),
        Some(state_path),
    ));

    relay.consume(ev_rx, err_tx, cancel).await;

    let state = poller
        .await
        .map_err(|e| Error::External(format!("feed poller task failed: {e}")))?;
    sink.await
        .map_err(|e| Error::External(format!("error sink task failed: {e}")))?;

    Ok(state)
}

//! Conditional polling of the received-events feed.
//!
//! One cycle is `Fetching -> (Updated | NotModified | Failed) -> Sleeping`.
//! The poller is the only owner of its `ResumeState`; on cancellation it writes
//! the checkpoint itself before returning, so no other task ever reads the state
//! while a fetch is in flight.

use std::{path::PathBuf, sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::{
    checkpoint,
    domain::Validator,
    errors::Error,
    feed::{Envelope, FeedResponse, FeedSource, ResumeState},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CycleOutcome {
    /// A page was decoded (it may still contain nothing new).
    Updated,
    /// `304 Not Modified`.
    NotModified,
    /// Transport or body decode failure.
    Failed,
}

/// Result of one fetch.
///
/// The interval hint is applied immediately. The watermark and validator are
/// only committed as `fresh` records are handed to the consumer, so a cycle
/// interrupted halfway is re-fetched on the next run instead of being skipped.
#[derive(Debug)]
pub struct Cycle {
    pub outcome: CycleOutcome,
    /// Records newer than the watermark, oldest first.
    pub fresh: Vec<Envelope>,
    /// Validator to commit once every fresh record has been emitted.
    pub validator: Option<Validator>,
    pub errors: Vec<Error>,
}

impl Cycle {
    fn failed(err: Error) -> Self {
        Self {
            outcome: CycleOutcome::Failed,
            fresh: Vec::new(),
            validator: None,
            errors: vec![err],
        }
    }
}

/// Producer ends of the two pipeline queues.
///
/// Both are bounded: when the consumer falls behind, `send` waits, which holds
/// the poller back from its next cycle.
#[derive(Clone, Debug)]
pub struct PollerOutputs {
    pub events: mpsc::Sender<Envelope>,
    pub errors: mpsc::Sender<Error>,
}

pub struct FeedPoller {
    source: Arc<dyn FeedSource>,
    state: ResumeState,
}

impl FeedPoller {
    pub fn new(source: Arc<dyn FeedSource>, state: ResumeState) -> Self {
        Self { source, state }
    }

    pub fn state(&self) -> &ResumeState {
        &self.state
    }

    /// Perform one conditional fetch and classify its freshness.
    pub async fn fetch_cycle(&mut self) -> Cycle {
        match self.source.fetch(self.state.validator.as_ref()).await {
            Ok(resp) => self.apply(resp),
            Err(e) => Cycle::failed(e),
        }
    }

    /// Fold a response into the poller state.
    ///
    /// Headers are inspected before the body: a malformed interval hint is
    /// reported but does not stop the page from being processed.
    pub fn apply(&mut self, resp: FeedResponse) -> Cycle {
        let mut errors = Vec::new();

        if let Some(raw) = resp.poll_interval.as_deref() {
            match parse_poll_interval(raw) {
                Ok(d) => self.state.interval = d,
                Err(e) => errors.push(e),
            }
        }

        if resp.not_modified {
            return Cycle {
                outcome: CycleOutcome::NotModified,
                fresh: Vec::new(),
                validator: None,
                errors,
            };
        }

        let batch = match Envelope::batch_from_slice(&resp.body) {
            Ok(b) => b,
            Err(e) => {
                errors.push(Error::BodyDecode(e));
                return Cycle {
                    outcome: CycleOutcome::Failed,
                    fresh: Vec::new(),
                    validator: None,
                    errors,
                };
            }
        };

        Cycle {
            outcome: CycleOutcome::Updated,
            fresh: select_fresh(batch, self.state.watermark),
            validator: resp.etag.filter(|t| !t.is_empty()).map(Validator),
            errors,
        }
    }

    /// Record that a record created at `created_at` reached the consumer.
    pub fn mark_emitted(&mut self, created_at: DateTime<Utc>) {
        if created_at > self.state.watermark {
            self.state.watermark = created_at;
        }
    }

    pub fn commit_validator(&mut self, validator: Validator) {
        self.state.validator = Some(validator);
    }

    /// Run cycles until `cancel` fires or a consumer goes away.
    ///
    /// Sleeps exactly the current interval between cycles whatever the outcome;
    /// the feed's interval hint is the only adaptive signal. Returns the final
    /// state after saving it to `checkpoint_path` (when given).
    pub async fn run(
        mut self,
        out: PollerOutputs,
        cancel: CancellationToken,
        checkpoint_path: Option<PathBuf>,
    ) -> ResumeState {
        info!(
            endpoint = self.source.endpoint(),
            watermark = %self.state.watermark,
            interval_secs = self.state.interval.as_secs(),
            "feed poller started"
        );

        'cycles: loop {
            let cycle = tokio::select! {
                _ = cancel.cancelled() => break 'cycles,
                c = self.fetch_cycle() => c,
            };

            debug!(
                outcome = ?cycle.outcome,
                fresh = cycle.fresh.len(),
                errors = cycle.errors.len(),
                "feed cycle finished"
            );

            for err in cycle.errors {
                if !send_or_cancel(&out.errors, err, &cancel).await {
                    break 'cycles;
                }
            }

            for env in cycle.fresh {
                let created_at = env.created_at;
                if !send_or_cancel(&out.events, env, &cancel).await {
                    break 'cycles;
                }
                self.mark_emitted(created_at);
            }

            if let Some(v) = cycle.validator {
                self.commit_validator(v);
            }

            tokio::select! {
                _ = cancel.cancelled() => break 'cycles,
                _ = sleep(self.state.interval) => {}
            }
        }

        if let Some(path) = checkpoint_path {
            match checkpoint::save(&path, &self.state) {
                Ok(()) => info!(
                    path = %path.display(),
                    watermark = %self.state.watermark,
                    "checkpoint saved"
                ),
                Err(e) => error!("failed to save checkpoint: {e}"),
            }
        }

        self.state
    }
}

/// Put a newest-first page in chronological order and keep the records strictly
/// newer than the running watermark.
///
/// The sort is stable, so records sharing a timestamp keep their reversed page
/// order; only the first of them can pass the filter.
fn select_fresh(batch: Vec<Envelope>, mut watermark: DateTime<Utc>) -> Vec<Envelope> {
    let mut ordered: Vec<Envelope> = batch.into_iter().rev().collect();
    ordered.sort_by_key(|e| e.created_at);

    let mut fresh = Vec::new();
    for env in ordered {
        if env.created_at <= watermark {
            continue;
        }
        watermark = env.created_at;
        fresh.push(env);
    }
    fresh
}

fn parse_poll_interval(raw: &str) -> Result<Duration, Error> {
    let decode_err = |reason: String| Error::IntervalDecode {
        value: raw.to_string(),
        reason,
    };

    let secs = raw
        .trim()
        .parse::<u64>()
        .map_err(|e| decode_err(e.to_string()))?;
    if secs == 0 {
        return Err(decode_err("interval must be positive".to_string()));
    }
    Ok(Duration::from_secs(secs))
}

async fn send_or_cancel<T>(tx: &mpsc::Sender<T>, item: T, cancel: &CancellationToken) -> bool {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        res = tx.send(item) => res.is_ok(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Result;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn record(secs: i64) -> String {
        format!(
            r#"{{"type":"PushEvent","actor":{{"login":"a"}},"repo":{{"name":"o/r"}},"payload":{{}},"public":true,"created_at":"{}"}}"#,
            ts(secs).to_rfc3339()
        )
    }

    /// Newest-first page, the way the feed delivers it.
    fn page(secs: &[i64]) -> Vec<u8> {
        let items: Vec<String> = secs.iter().map(|s| record(*s)).collect();
        format!("[{}]", items.join(",")).into_bytes()
    }

    fn ok(body: Vec<u8>, etag: Option<&str>, interval: Option<&str>) -> FeedResponse {
        FeedResponse {
            not_modified: false,
            etag: etag.map(str::to_string),
            poll_interval: interval.map(str::to_string),
            body,
        }
    }

    fn state_at(secs: i64) -> ResumeState {
        ResumeState {
            watermark: ts(secs),
            ..ResumeState::default()
        }
    }

    /// Commit a whole cycle the way `run` does when nothing interrupts it.
    fn settle(p: &mut FeedPoller, cycle: Cycle) -> (Vec<DateTime<Utc>>, Vec<Error>) {
        let mut emitted = Vec::new();
        for env in &cycle.fresh {
            p.mark_emitted(env.created_at);
            emitted.push(env.created_at);
        }
        if let Some(v) = cycle.validator {
            p.commit_validator(v);
        }
        (emitted, cycle.errors)
    }

    #[derive(Default)]
    struct FakeFeed {
        responses: Mutex<VecDeque<Result<FeedResponse>>>,
        seen_validators: Mutex<Vec<Option<String>>>,
    }

    impl FakeFeed {
        fn scripted(responses: Vec<Result<FeedResponse>>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into()),
                seen_validators: Mutex::new(Vec::new()),
            })
        }

        fn validators(&self) -> Vec<Option<String>> {
            self.seen_validators.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl FeedSource for FakeFeed {
        fn endpoint(&self) -> &str {
            "fake://feed"
        }

        async fn fetch(&self, validator: Option<&Validator>) -> Result<FeedResponse> {
            self.seen_validators
                .lock()
                .unwrap()
                .push(validator.map(|v| v.0.clone()));
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| {
                    Ok(FeedResponse {
                        not_modified: true,
                        ..FeedResponse::default()
                    })
                })
        }
    }

    fn poller(state: ResumeState) -> FeedPoller {
        FeedPoller::new(FakeFeed::scripted(vec![]), state)
    }

    #[test]
    fn emits_strictly_newer_records_oldest_first() {
        let mut p = poller(state_at(2));
        let cycle = p.apply(ok(page(&[5, 3, 4, 2]), None, None));
        assert_eq!(cycle.outcome, CycleOutcome::Updated);

        let (emitted, errors) = settle(&mut p, cycle);
        assert!(errors.is_empty());
        assert_eq!(emitted, vec![ts(3), ts(4), ts(5)]);
        assert_eq!(p.state().watermark, ts(5));
    }

    #[test]
    fn watermark_tracks_max_emitted_across_cycles() {
        let mut p = poller(ResumeState::default());
        let mut all = Vec::new();

        for batch in [vec![3, 2, 1], vec![4, 3, 2], vec![2, 1], vec![7, 6, 4]] {
            let cycle = p.apply(ok(page(&batch), None, None));
            let (emitted, _) = settle(&mut p, cycle);
            all.extend(emitted);
            let max = all.iter().max().copied().unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
            assert_eq!(p.state().watermark, max);
        }

        assert_eq!(all, vec![ts(1), ts(2), ts(3), ts(4), ts(6), ts(7)]);
    }

    #[test]
    fn records_sharing_the_watermark_timestamp_are_dropped() {
        let mut p = poller(state_at(10));
        let cycle = p.apply(ok(page(&[11, 11, 10]), None, None));
        let (emitted, _) = settle(&mut p, cycle);
        assert_eq!(emitted, vec![ts(11)]);
    }

    #[test]
    fn etag_replaces_validator_and_missing_etag_keeps_it() {
        let mut p = poller(ResumeState::default());
        let cycle = p.apply(ok(page(&[1]), Some("\"v1\""), None));
        settle(&mut p, cycle);
        assert_eq!(p.state().validator, Some(Validator("\"v1\"".to_string())));

        let cycle = p.apply(ok(page(&[2]), None, None));
        settle(&mut p, cycle);
        assert_eq!(p.state().validator, Some(Validator("\"v1\"".to_string())));
    }

    #[test]
    fn not_modified_touches_only_the_interval() {
        let mut p = FeedPoller::new(
            FakeFeed::scripted(vec![]),
            ResumeState {
                validator: Some(Validator("\"v1\"".to_string())),
                watermark: ts(9),
                interval: Duration::from_secs(60),
            },
        );

        let cycle = p.apply(FeedResponse {
            not_modified: true,
            etag: Some("\"v2\"".to_string()),
            poll_interval: Some("120".to_string()),
            body: Vec::new(),
        });
        assert_eq!(cycle.outcome, CycleOutcome::NotModified);

        let (emitted, errors) = settle(&mut p, cycle);
        assert!(emitted.is_empty());
        assert!(errors.is_empty());
        assert_eq!(p.state().validator, Some(Validator("\"v1\"".to_string())));
        assert_eq!(p.state().watermark, ts(9));
        assert_eq!(p.state().interval, Duration::from_secs(120));
    }

    #[test]
    fn bad_interval_hint_is_reported_and_page_still_processed() {
        let mut p = poller(state_at(0));
        let cycle = p.apply(ok(page(&[2, 1]), Some("\"v1\""), Some("abc")));
        assert_eq!(cycle.outcome, CycleOutcome::Updated);

        let (emitted, errors) = settle(&mut p, cycle);
        assert_eq!(emitted, vec![ts(1), ts(2)]);
        assert!(matches!(
            errors.as_slice(),
            [Error::IntervalDecode { value, .. }] if value == "abc"
        ));
        assert_eq!(p.state().interval, Duration::from_secs(60));
        assert_eq!(p.state().validator, Some(Validator("\"v1\"".to_string())));

        let cycle = p.apply(ok(page(&[]), None, Some("0")));
        let (_, errors) = settle(&mut p, cycle);
        assert!(matches!(errors.as_slice(), [Error::IntervalDecode { .. }]));
        assert_eq!(p.state().interval, Duration::from_secs(60));
    }

    #[test]
    fn malformed_body_leaves_watermark_and_validator_alone() {
        let mut p = FeedPoller::new(
            FakeFeed::scripted(vec![]),
            ResumeState {
                validator: Some(Validator("\"v1\"".to_string())),
                ..state_at(3)
            },
        );

        let cycle = p.apply(ok(b"{not json".to_vec(), Some("\"v2\""), Some("30")));
        assert_eq!(cycle.outcome, CycleOutcome::Failed);

        let (emitted, errors) = settle(&mut p, cycle);
        assert!(emitted.is_empty());
        assert!(matches!(errors.as_slice(), [Error::BodyDecode(_)]));
        assert_eq!(p.state().validator, Some(Validator("\"v1\"".to_string())));
        assert_eq!(p.state().watermark, ts(3));
        assert_eq!(p.state().interval, Duration::from_secs(30));
    }

    #[tokio::test]
    async fn transport_failure_changes_nothing() {
        let feed = FakeFeed::scripted(vec![Err(Error::Transport("connection reset".into()))]);
        let mut p = FeedPoller::new(feed, state_at(4));
        let before = p.state().clone();

        let cycle = p.fetch_cycle().await;
        assert_eq!(cycle.outcome, CycleOutcome::Failed);
        assert!(matches!(cycle.errors.as_slice(), [Error::Transport(_)]));
        settle(&mut p, cycle);
        assert_eq!(p.state(), &before);
    }

    #[tokio::test]
    async fn run_emits_in_order_echoes_validator_and_saves_on_cancel() {
        let dir = tempfile::tempdir().unwrap();
        let state_path = dir.path().join(".state");

        let feed = FakeFeed::scripted(vec![
            Ok(ok(page(&[2, 1]), Some("\"v1\""), None)),
            Err(Error::Transport("timeout".into())),
            Ok(ok(page(&[3, 2, 1]), Some("\"v2\""), None)),
        ]);
        let p = FeedPoller::new(
            feed.clone(),
            ResumeState {
                interval: Duration::from_millis(1),
                ..ResumeState::default()
            },
        );

        let (ev_tx, mut ev_rx) = mpsc::channel(4);
        let (err_tx, mut err_rx) = mpsc::channel(4);
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(p.run(
            PollerOutputs {
                events: ev_tx,
                errors: err_tx,
            },
            cancel.clone(),
            Some(state_path.clone()),
        ));

        let mut seen = Vec::new();
        while seen.len() < 3 {
            seen.push(ev_rx.recv().await.unwrap().created_at);
        }
        assert_eq!(seen, vec![ts(1), ts(2), ts(3)]);
        assert!(matches!(err_rx.recv().await, Some(Error::Transport(_))));

        cancel.cancel();
        let final_state = handle.await.unwrap();

        assert_eq!(final_state.watermark, ts(3));
        let saved = checkpoint::load(&state_path).unwrap().unwrap();
        assert_eq!(saved.watermark, final_state.watermark);
        assert_eq!(saved.validator, final_state.validator);
        assert_eq!(saved.interval, Duration::from_secs(1));

        let validators = feed.validators();
        assert_eq!(validators[0], None);
        assert_eq!(validators[1], Some("\"v1\"".to_string()));
        assert_eq!(validators[2], Some("\"v1\"".to_string()));
    }

    #[tokio::test]
    async fn cancel_while_blocked_on_full_queue_keeps_undelivered_records() {
        let feed = FakeFeed::scripted(vec![Ok(ok(page(&[3, 2, 1]), Some("\"v1\""), None))]);
        let p = FeedPoller::new(feed, ResumeState::default());

        let (ev_tx, mut ev_rx) = mpsc::channel(1);
        let (err_tx, _err_rx) = mpsc::channel(1);
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(p.run(
            PollerOutputs {
                events: ev_tx,
                errors: err_tx,
            },
            cancel.clone(),
            None,
        ));

        // Take one record; the poller then fills the queue with the second and
        // blocks on the third.
        assert_eq!(ev_rx.recv().await.unwrap().created_at, ts(1));
        while ev_rx.len() < 1 {
            tokio::task::yield_now().await;
        }
        cancel.cancel();
        let st = handle.await.unwrap();

        assert_eq!(st.watermark, ts(2));
        assert_eq!(st.validator, None);
    }
}

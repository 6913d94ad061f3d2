//! Self-rescheduling status poll.
//!
//! One request at a time: fetch, hand the response to the UI loop, wait for it
//! to be merged, sleep, repeat. Failures are logged and retried at the same
//! cadence; the loop ends when the shared running flag drops or the service
//! reports the crawl as completed.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use super::backend::{CrawlBackend, DeltaCursor};
use super::model::RunStatus;
use super::types::CrawlEvent;

#[derive(Debug, Clone)]
pub struct PollerConfig {
    pub interval: Duration,
    pub incremental: bool,
    /// Consecutive failures before a warning is surfaced; 0 never warns.
    pub warn_after: u32,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            incremental: true,
            warn_after: 10,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PollCursor {
    pub status: RunStatus,
    pub paused: bool,
    pub cycles: u64,
    pub urls_received: usize,
    pub links_received: usize,
    pub consecutive_failures: u32,
}

impl PollCursor {
    fn delta(&self) -> DeltaCursor {
        DeltaCursor {
            url_since: self.urls_received,
            link_since: self.links_received,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollStep {
    Continue,
    Completed,
    /// The UI loop went away.
    Detached,
}

pub struct Poller<B> {
    backend: Arc<B>,
    config: PollerConfig,
    cursor: PollCursor,
    running: Arc<AtomicBool>,
    generation: u64,
}

impl<B: CrawlBackend> Poller<B> {
    pub fn new(backend: Arc<B>, config: PollerConfig, running: Arc<AtomicBool>) -> Self {
        Self {
            backend,
            config,
            cursor: PollCursor::default(),
            running,
            generation: 0,
        }
    }

    /// Tags every event this poller sends.
    pub fn with_generation(mut self, generation: u64) -> Self {
        self.generation = generation;
        self
    }

    pub fn cursor(&self) -> &PollCursor {
        &self.cursor
    }

    /// Forget delta offsets; call once per new crawl.
    pub fn reset(&mut self) {
        self.cursor = PollCursor::default();
    }

    pub async fn poll_once(&mut self, tx: &UnboundedSender<CrawlEvent>) -> PollStep {
        let since = self.config.incremental.then(|| self.cursor.delta());
        let response = match self.backend.fetch_update(since).await {
            Ok(response) => response,
            Err(err) => {
                self.cursor.consecutive_failures += 1;
                warn!(
                    error = %err,
                    failures = self.cursor.consecutive_failures,
                    "status poll failed"
                );
                if self.config.warn_after > 0
                    && self.cursor.consecutive_failures == self.config.warn_after
                {
                    let _ = tx.send(CrawlEvent::Warning(format!(
                        "crawl service unreachable for {} polls: {err}",
                        self.cursor.consecutive_failures
                    )));
                }
                return PollStep::Continue;
            }
        };

        self.cursor.consecutive_failures = 0;
        self.cursor.cycles += 1;
        if let Some(status) = response.status {
            self.cursor.status = status;
        }
        if let Some(paused) = response.paused {
            self.cursor.paused = paused;
        }
        debug!(
            cycle = self.cursor.cycles,
            urls = response.urls.len(),
            links = response.links.len(),
            status = self.cursor.status.label(),
            "poll delivered"
        );

        let (ack_tx, ack_rx) = oneshot::channel();
        let event = CrawlEvent::Snapshot {
            generation: self.generation,
            response: Box::new(response),
            ack: ack_tx,
        };
        if tx.send(event).is_err() {
            return PollStep::Detached;
        }
        let Ok(merged) = ack_rx.await else {
            return PollStep::Detached;
        };
        if self.config.incremental {
            self.cursor.urls_received = merged.urls;
            self.cursor.links_received = merged.links;
        }

        if self.cursor.status == RunStatus::Completed {
            let _ = tx.send(CrawlEvent::Finished(self.generation));
            return PollStep::Completed;
        }
        PollStep::Continue
    }

    pub async fn run(mut self, tx: UnboundedSender<CrawlEvent>) -> PollCursor {
        info!(
            interval_ms = self.config.interval.as_millis() as u64,
            generation = self.generation,
            incremental = self.config.incremental,
            "poller started"
        );
        loop {
            if !self.running.load(Ordering::SeqCst) {
                info!(cycles = self.cursor.cycles, "poller stopped");
                break;
            }
            match self.poll_once(&tx).await {
                PollStep::Continue => {}
                PollStep::Completed => {
                    self.running.store(false, Ordering::SeqCst);
                    info!(cycles = self.cursor.cycles, "crawl completed");
                    break;
                }
                PollStep::Detached => {
                    debug!("event receiver closed, poller exiting");
                    break;
                }
            }
            tokio::time::sleep(self.config.interval).await;
        }
        self.cursor
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{HashSet, VecDeque};
    use std::ops::Range;
    use std::sync::Mutex;

    use tokio::sync::mpsc;
    use tokio::time::Instant;

    use crate::app::backend::{ControlAction, ControlReply};
    use crate::app::error::{Result, WatchError};
    use crate::app::model::PollResponse;
    use crate::app::types::MergeAck;

    struct ScriptedBackend {
        script: Mutex<VecDeque<Result<PollResponse>>>,
        calls: Mutex<Vec<(Option<DeltaCursor>, Instant, bool)>>,
        running: Arc<AtomicBool>,
        stop_on_first_call: bool,
    }

    impl ScriptedBackend {
        fn new(script: Vec<Result<PollResponse>>, running: Arc<AtomicBool>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                calls: Mutex::new(Vec::new()),
                running,
                stop_on_first_call: false,
            }
        }

        fn calls(&self) -> Vec<(Option<DeltaCursor>, Instant, bool)> {
            self.calls.lock().unwrap().clone()
        }

        fn offsets(&self) -> Vec<Option<DeltaCursor>> {
            self.calls().into_iter().map(|(since, _, _)| since).collect()
        }
    }

    impl CrawlBackend for ScriptedBackend {
        async fn fetch_update(&self, since: Option<DeltaCursor>) -> Result<PollResponse> {
            let first = {
                let mut calls = self.calls.lock().unwrap();
                calls.push((since, Instant::now(), self.running.load(Ordering::SeqCst)));
                calls.len() == 1
            };
            if first && self.stop_on_first_call {
                self.running.store(false, Ordering::SeqCst);
            }
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(completed()))
        }

        async fn control(&self, _action: ControlAction) -> Result<ControlReply> {
            Ok(ControlReply::default())
        }
    }

    /// A running response holding `example.com/{i}` for each `i` in `urls`
    /// and one link to each `example.com/{i}` for `i` in `links`.
    fn running_with(urls: Range<usize>, links: Range<usize>) -> PollResponse {
        let urls = urls
            .map(|i| format!(r#"{{"url": "https://example.com/{i}"}}"#))
            .collect::<Vec<_>>()
            .join(",");
        let links = links
            .map(|i| {
                format!(r#"{{"source_url": "https://example.com/", "target_url": "https://example.com/{i}"}}"#)
            })
            .collect::<Vec<_>>()
            .join(",");
        PollResponse::from_slice(
            format!(r#"{{"status": "running", "urls": [{urls}], "links": [{links}]}}"#).as_bytes(),
        )
        .unwrap()
    }

    fn completed() -> PollResponse {
        PollResponse::from_slice(br#"{"status": "completed"}"#).unwrap()
    }

    fn failure() -> Result<PollResponse> {
        Err(WatchError::BackendStatus {
            endpoint: "/api/crawl_status".into(),
            status: 502,
        })
    }

    #[derive(Debug, Default)]
    struct Drained {
        events: Vec<String>,
        snapshots: usize,
        generations: Vec<u64>,
    }

    /// Merges every snapshot into a deduplicating set, acks with its totals
    /// and collects the other events.
    async fn drive<B: CrawlBackend>(poller: Poller<B>) -> (PollCursor, Drained) {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(poller.run(tx));
        let mut drained = Drained::default();
        let mut urls = HashSet::new();
        let mut links = HashSet::new();
        while let Some(event) = rx.recv().await {
            match event {
                CrawlEvent::Snapshot {
                    generation,
                    response,
                    ack,
                } => {
                    drained.snapshots += 1;
                    drained.generations.push(generation);
                    urls.extend(response.urls.iter().map(|r| r.url.clone()));
                    links.extend(
                        response
                            .links
                            .iter()
                            .map(|l| (l.source_url.clone(), l.target_url.clone())),
                    );
                    let _ = ack.send(MergeAck {
                        urls: urls.len(),
                        links: links.len(),
                    });
                }
                CrawlEvent::Finished(generation) => {
                    drained.generations.push(generation);
                    drained.events.push("finished".to_string());
                }
                CrawlEvent::Warning(msg) => drained.events.push(format!("warning: {msg}")),
                CrawlEvent::Started(msg) | CrawlEvent::Status(msg) | CrawlEvent::Error(msg) => {
                    drained.events.push(msg)
                }
            }
        }
        (handle.await.unwrap(), drained)
    }

    #[tokio::test(start_paused = true)]
    async fn failed_fetch_retries_once_after_interval() {
        let running = Arc::new(AtomicBool::new(true));
        let backend = Arc::new(ScriptedBackend::new(
            vec![failure(), Ok(completed())],
            running.clone(),
        ));
        let poller = Poller::new(backend.clone(), PollerConfig::default(), running.clone());
        let (cursor, drained) = drive(poller).await;

        let calls = backend.calls();
        assert_eq!(calls.len(), 2);
        assert!(calls[1].2, "running flag dropped after a failure");
        assert_eq!(calls[1].1 - calls[0].1, Duration::from_secs(1));
        assert_eq!(drained.snapshots, 1);
        assert_eq!(drained.events, vec!["finished".to_string()]);
        assert_eq!(cursor.status, RunStatus::Completed);
        assert!(!running.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn incremental_requests_carry_offsets() {
        let running = Arc::new(AtomicBool::new(true));
        let backend = Arc::new(ScriptedBackend::new(
            vec![
                Ok(running_with(0..3, 0..5)),
                Ok(running_with(3..4, 0..0)),
                Ok(completed()),
            ],
            running.clone(),
        ));
        let poller = Poller::new(backend.clone(), PollerConfig::default(), running);
        let (cursor, drained) = drive(poller).await;

        assert_eq!(
            backend.offsets(),
            vec![
                Some(DeltaCursor::default()),
                Some(DeltaCursor {
                    url_since: 3,
                    link_since: 5
                }),
                Some(DeltaCursor {
                    url_since: 4,
                    link_since: 5
                }),
            ]
        );
        assert_eq!(drained.snapshots, 3);
        assert_eq!(cursor.cycles, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn full_arrays_do_not_push_offsets_past_the_store() {
        let running = Arc::new(AtomicBool::new(true));
        // The second reply ignores the offsets and resends everything,
        // as the service does right after a snapshot was loaded into it.
        let backend = Arc::new(ScriptedBackend::new(
            vec![
                Ok(running_with(0..3, 0..5)),
                Ok(running_with(0..4, 0..6)),
                Ok(running_with(4..5, 6..6)),
                Ok(completed()),
            ],
            running.clone(),
        ));
        let (cursor, _) = drive(Poller::new(backend.clone(), PollerConfig::default(), running)).await;

        let offsets = backend.offsets();
        assert_eq!(
            offsets[2],
            Some(DeltaCursor {
                url_since: 4,
                link_since: 6
            })
        );
        assert_eq!(
            offsets[3],
            Some(DeltaCursor {
                url_since: 5,
                link_since: 6
            })
        );
        assert_eq!(cursor.urls_received, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn full_snapshot_mode_sends_no_offsets() {
        let running = Arc::new(AtomicBool::new(true));
        let backend = Arc::new(ScriptedBackend::new(
            vec![Ok(running_with(0..3, 0..5)), Ok(completed())],
            running.clone(),
        ));
        let config = PollerConfig {
            incremental: false,
            ..PollerConfig::default()
        };
        drive(Poller::new(backend.clone(), config, running)).await;
        assert!(backend.offsets().iter().all(Option::is_none));
    }

    #[tokio::test(start_paused = true)]
    async fn stop_during_fetch_still_delivers_response() {
        let running = Arc::new(AtomicBool::new(true));
        let mut backend = ScriptedBackend::new(vec![Ok(running_with(0..2, 0..0))], running.clone());
        backend.stop_on_first_call = true;
        let backend = Arc::new(backend);
        let (cursor, drained) =
            drive(Poller::new(backend.clone(), PollerConfig::default(), running)).await;

        assert_eq!(backend.calls().len(), 1);
        assert_eq!(drained.snapshots, 1);
        assert!(drained.events.is_empty());
        assert_eq!(cursor.urls_received, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn events_carry_the_poller_generation() {
        let running = Arc::new(AtomicBool::new(true));
        let backend = Arc::new(ScriptedBackend::new(
            vec![Ok(running_with(0..1, 0..0)), Ok(completed())],
            running.clone(),
        ));
        let poller = Poller::new(backend, PollerConfig::default(), running).with_generation(7);
        let (_, drained) = drive(poller).await;
        // two snapshots, then the completion notice
        assert_eq!(drained.generations, vec![7, 7, 7]);
    }

    #[tokio::test(start_paused = true)]
    async fn warning_fires_once_after_threshold() {
        let running = Arc::new(AtomicBool::new(true));
        let backend = Arc::new(ScriptedBackend::new(
            vec![failure(), failure(), failure(), failure(), Ok(completed())],
            running.clone(),
        ));
        let config = PollerConfig {
            warn_after: 3,
            ..PollerConfig::default()
        };
        let (_, drained) = drive(Poller::new(backend, config, running)).await;
        let warnings = drained
            .events
            .iter()
            .filter(|e| e.starts_with("warning"))
            .count();
        assert_eq!(warnings, 1);
        assert_eq!(drained.events.last().map(String::as_str), Some("finished"));
    }

    #[tokio::test(start_paused = true)]
    async fn reset_clears_offsets() {
        let running = Arc::new(AtomicBool::new(true));
        let backend = Arc::new(ScriptedBackend::new(
            vec![Ok(running_with(0..2, 0..2))],
            running.clone(),
        ));
        let mut poller = Poller::new(backend, PollerConfig::default(), running);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let ack = tokio::spawn(async move {
            if let Some(CrawlEvent::Snapshot { ack, .. }) = rx.recv().await {
                let _ = ack.send(MergeAck { urls: 2, links: 2 });
            }
        });
        assert_eq!(poller.poll_once(&tx).await, PollStep::Continue);
        ack.await.unwrap();
        assert_eq!(poller.cursor().urls_received, 2);
        poller.reset();
        assert_eq!(poller.cursor(), &PollCursor::default());
    }
}

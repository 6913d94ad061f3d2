use std::fs;
use std::io;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use clap::Parser;
use crossterm::event::{DisableMouseCapture, EnableMouseCapture};
use crossterm::execute;
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::backend::{ControlAction, CrawlBackend, HttpBackend};
use super::data_io;
use super::logging;
use super::model::PollResponse;
use super::poller::{PollCursor, Poller, PollerConfig};
use super::session::{CrawlSession, Renderers, SessionOptions};
use super::store::IssueExclusions;
use super::tabs::Tab;
use super::tui::{TuiOptions, draw_loop};
use super::types::{Cli, CrawlEvent, MergeAck};
use super::ui_utils::{TableSurface, render_issue_row, render_link_row, render_resource_row};

pub type TerminalSession = CrawlSession<TableSurface>;

/// Lines taken by the header, tab bar, footer and table chrome.
pub(crate) const CHROME_LINES: u16 = 15;

const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Connection to a live crawl: the backend plus the current poller task.
pub(crate) struct LiveLink {
    backend: Arc<HttpBackend>,
    config: PollerConfig,
    tx: UnboundedSender<CrawlEvent>,
    running: Arc<AtomicBool>,
    poller: Option<JoinHandle<PollCursor>>,
    generation: u64,
}

impl LiveLink {
    fn new(backend: Arc<HttpBackend>, config: PollerConfig, tx: UnboundedSender<CrawlEvent>) -> Self {
        Self {
            backend,
            config,
            tx,
            running: Arc::new(AtomicBool::new(false)),
            poller: None,
            generation: 0,
        }
    }

    /// Generation of the newest poller; events tagged with anything else
    /// come from a superseded one.
    pub(crate) fn generation(&self) -> u64 {
        self.generation
    }

    /// Replaces any running poller with a fresh one. Each poller gets its own
    /// flag so a previous one still sleeping cannot resume, and its own
    /// generation so a response it already has in flight is discarded.
    pub(crate) fn spawn_poller(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        self.running = Arc::new(AtomicBool::new(true));
        self.generation += 1;
        let mut poller = Poller::new(
            Arc::clone(&self.backend),
            self.config.clone(),
            Arc::clone(&self.running),
        )
        .with_generation(self.generation);
        poller.reset();
        self.poller = Some(tokio::spawn(poller.run(self.tx.clone())));
    }

    pub(crate) fn stop_polling(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Fire and forget; the outcome comes back as an event.
    pub(crate) fn send_control(&self, action: ControlAction) {
        if action == ControlAction::Stop {
            self.stop_polling();
        }
        let backend = Arc::clone(&self.backend);
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let label = action.label();
            let started = match &action {
                ControlAction::Start { url } => Some(url.clone()),
                _ => None,
            };
            match backend.control(action).await {
                Ok(reply) => {
                    info!(action = label, message = %reply.message, "control accepted");
                    let event = match started {
                        Some(url) => CrawlEvent::Started(url),
                        None if reply.message.is_empty() => CrawlEvent::Status(format!("{label}: ok")),
                        None => CrawlEvent::Status(reply.message),
                    };
                    let _ = tx.send(event);
                }
                Err(err) => {
                    warn!(action = label, error = %err, "control failed");
                    let _ = tx.send(CrawlEvent::Error(err.to_string()));
                }
            }
        });
    }

    /// Stops polling and waits briefly for the task; a request still in
    /// flight after the grace period is aborted.
    async fn join(mut self) {
        self.stop_polling();
        let Some(mut handle) = self.poller.take() else {
            return;
        };
        match tokio::time::timeout(SHUTDOWN_GRACE, &mut handle).await {
            Ok(Ok(cursor)) => info!(cycles = cursor.cycles, "poller finished"),
            Ok(Err(err)) => error!("poller task join error: {err}"),
            Err(_) => {
                warn!("poller still busy at shutdown, aborting");
                handle.abort();
            }
        }
    }
}

fn load_exclusions(cli: &Cli) -> io::Result<IssueExclusions> {
    let mut patterns = cli.exclude_issues.clone();
    if let Some(path) = &cli.exclude_issues_file {
        patterns.extend(fs::read_to_string(path)?.lines().map(str::to_string));
    }
    let exclusions = IssueExclusions::parse(patterns)?;
    if !exclusions.is_empty() {
        info!(file = ?cli.exclude_issues_file, "issue exclusions active");
    }
    Ok(exclusions)
}

fn build_session(cli: &Cli, exclusions: IssueExclusions) -> TerminalSession {
    let viewport = crossterm::terminal::size()
        .map(|(_, rows)| rows.saturating_sub(CHROME_LINES))
        .unwrap_or(20);
    CrawlSession::new(
        SessionOptions {
            buffer_rows: cli.buffer_rows,
            exclusions,
        },
        Renderers {
            resource: render_resource_row,
            link: render_link_row,
            issue: render_issue_row,
        },
        |tab| {
            let row_height = if tab == Tab::Issues { 2 } else { 1 };
            (
                TableSurface::new(u32::from(viewport), row_height),
                u32::from(row_height),
            )
        },
    )
}

/// Merges a snapshot from the `current` poller generation. Older ones are
/// dropped. Either way the poller gets its ack.
pub(crate) fn merge_snapshot(
    session: &mut TerminalSession,
    current: u64,
    generation: u64,
    response: PollResponse,
    ack: oneshot::Sender<MergeAck>,
) {
    if generation == current {
        session.apply_snapshot(response);
    } else {
        debug!(generation, current, "dropping snapshot from superseded poller");
    }
    let store = session.store();
    let _ = ack.send(MergeAck {
        urls: store.resources().len(),
        links: store.links().len(),
    });
}

fn handle_event(session: &mut TerminalSession, current: u64, event: CrawlEvent) -> bool {
    match event {
        CrawlEvent::Snapshot {
            generation,
            response,
            ack,
        } => {
            merge_snapshot(session, current, generation, *response, ack);
        }
        CrawlEvent::Started(url) => {
            info!(%url, "crawl started");
            session.reset();
        }
        CrawlEvent::Finished(generation) => return generation == current,
        CrawlEvent::Status(message) => info!("{message}"),
        CrawlEvent::Warning(message) => warn!("{message}"),
        CrawlEvent::Error(message) => error!("{message}"),
    }
    false
}

pub async fn run() -> io::Result<()> {
    let cli = Cli::parse();
    let _log_guard = logging::init(&cli.log_dir, !cli.no_tui)?;
    let exclusions = load_exclusions(&cli)?;
    let mut session = build_session(&cli, exclusions);
    let (tx, mut rx) = mpsc::unbounded_channel::<CrawlEvent>();

    let mut live = None;
    let label = if let Some(path) = &cli.load {
        match data_io::load_snapshot(path) {
            Ok(response) => {
                session.load_snapshot(response);
            }
            Err(err) => {
                error!(path = %path.display(), error = %err, "snapshot load failed");
                let _ = tx.send(CrawlEvent::Error(format!("cannot load snapshot: {err}")));
            }
        }
        let _ = tx.send(CrawlEvent::Finished(0));
        format!("review {}", path.display())
    } else {
        let backend = Arc::new(HttpBackend::new(&cli.backend, cli.request_timeout())?);
        if cli.attach {
            let response = backend.fetch_update(None).await?;
            session.apply_snapshot(response);
            let _ = tx.send(CrawlEvent::Finished(0));
            format!("attached {}", backend.base())
        } else {
            if let Some(url) = &cli.start {
                let reply = backend
                    .control(ControlAction::Start { url: url.clone() })
                    .await?;
                info!(%url, message = %reply.message, "crawl started");
            }
            let config = PollerConfig {
                interval: cli.poll_interval(),
                incremental: !cli.full_snapshots,
                warn_after: cli.failure_warn_after,
            };
            let label = format!("live {}", backend.base());
            let mut link = LiveLink::new(backend, config, tx.clone());
            link.spawn_poller();
            live = Some(link);
            label
        }
    };
    drop(tx);

    let result = if cli.no_tui {
        let generation = live.as_ref().map_or(0, LiveLink::generation);
        run_headless(&label, &mut session, generation, &mut rx).await
    } else {
        let options = TuiOptions {
            label,
            export_dir: cli.export_dir.clone(),
            save: cli.save.clone(),
            auto_close: cli.auto_close,
        };
        run_tui(&mut session, live.as_mut(), options, &mut rx)
    };

    // Pending snapshots are dropped with the receiver so the poller is not
    // left waiting for an ack.
    drop(rx);
    if let Some(link) = live {
        link.join().await;
    }
    if let Some(path) = &cli.save {
        save(path, &session);
    }
    result
}

fn save(path: &Path, session: &TerminalSession) {
    match data_io::save_snapshot(path, session.store()) {
        Ok(()) => eprintln!("saved snapshot to {}", path.display()),
        Err(err) => {
            error!(path = %path.display(), error = %err, "snapshot save failed");
            eprintln!("failed to save snapshot: {err}");
        }
    }
}

async fn run_headless(
    label: &str,
    session: &mut TerminalSession,
    generation: u64,
    rx: &mut UnboundedReceiver<CrawlEvent>,
) -> io::Result<()> {
    while let Some(event) = rx.recv().await {
        let is_snapshot = matches!(event, CrawlEvent::Snapshot { .. });
        if handle_event(session, generation, event) {
            break;
        }
        if is_snapshot {
            let stats = session.store().stats();
            info!(
                crawled = stats.crawled,
                discovered = stats.discovered,
                urls = session.store().resources().len(),
                links = session.store().links().len(),
                issues = session.store().issues().len(),
                progress = session.store().progress(),
                "progress"
            );
        }
    }

    let counts = session.url_counts();
    let issues = session.issue_counts();
    eprintln!(
        "{label}: urls={} internal={} external={} links={} issues={} (errors={} warnings={})",
        counts.total,
        counts.internal,
        counts.external,
        session.link_totals().total,
        issues.total,
        issues.errors,
        issues.warnings,
    );
    Ok(())
}

fn run_tui(
    session: &mut TerminalSession,
    live: Option<&mut LiveLink>,
    options: TuiOptions,
    rx: &mut UnboundedReceiver<CrawlEvent>,
) -> io::Result<()> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;
    terminal.clear()?;

    let tui_result = draw_loop(&mut terminal, session, live, options, rx);

    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    tui_result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> TerminalSession {
        let cli = Cli::try_parse_from(["crawlwatch", "--buffer-rows", "2"]).unwrap();
        build_session(&cli, IssueExclusions::default())
    }

    fn snapshot(generation: u64, body: &[u8]) -> (CrawlEvent, oneshot::Receiver<MergeAck>) {
        let (ack, ack_rx) = oneshot::channel();
        let event = CrawlEvent::Snapshot {
            generation,
            response: Box::new(PollResponse::from_slice(body).unwrap()),
            ack,
        };
        (event, ack_rx)
    }

    #[test]
    fn snapshot_event_is_merged_then_acked() {
        let mut session = session();
        let (event, mut ack_rx) = snapshot(
            1,
            br#"{"urls": [{"url": "https://example.com/", "status_code": 200}],
                 "links": [{"source_url": "https://example.com/", "target_url": "https://example.com/a"}]}"#,
        );
        assert!(!handle_event(&mut session, 1, event));
        assert_eq!(ack_rx.try_recv().unwrap(), MergeAck { urls: 1, links: 1 });
        assert_eq!(session.store().resources().len(), 1);
    }

    #[test]
    fn started_event_resets_and_finished_ends() {
        let mut session = session();
        let (event, _ack_rx) = snapshot(1, br#"{"urls": [{"url": "https://a.test/"}]}"#);
        handle_event(&mut session, 1, event);
        assert!(!handle_event(&mut session, 1, CrawlEvent::Started("https://b.test".into())));
        assert!(session.store().resources().is_empty());
        assert!(handle_event(&mut session, 1, CrawlEvent::Finished(1)));
    }

    #[test]
    fn superseded_poller_cannot_leak_into_a_new_crawl() {
        let mut session = session();
        let (event, _ack_rx) = snapshot(1, br#"{"urls": [{"url": "https://old.test/1"}]}"#);
        handle_event(&mut session, 1, event);
        handle_event(&mut session, 1, CrawlEvent::Started("https://new.test".into()));

        // The first poller's fetch was already in flight when the crawl was
        // restarted; its reply lands after the reset.
        let (late, mut ack_rx) = snapshot(
            1,
            br#"{"status": "completed", "urls": [{"url": "https://old.test/2"}]}"#,
        );
        assert!(!handle_event(&mut session, 2, late));
        assert_eq!(ack_rx.try_recv().unwrap(), MergeAck::default());
        assert!(session.store().resources().is_empty());
        assert!(!handle_event(&mut session, 2, CrawlEvent::Finished(1)));

        let (current, _ack_rx) = snapshot(2, br#"{"urls": [{"url": "https://new.test/"}]}"#);
        handle_event(&mut session, 2, current);
        assert_eq!(session.store().resources().len(), 1);
        assert!(handle_event(&mut session, 2, CrawlEvent::Finished(2)));
    }

    #[test]
    fn exclusions_file_is_merged_with_flags() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("exclude.txt");
        fs::write(&path, "# admin pages\n/admin\n\n/tmp/*\n").unwrap();
        let cli = Cli::try_parse_from([
            "crawlwatch",
            "--exclude-issues",
            "/cart",
            "--exclude-issues-file",
            path.to_str().unwrap(),
        ])
        .unwrap();
        let exclusions = load_exclusions(&cli).unwrap();
        assert!(exclusions.excludes("https://example.com/admin/users"));
        assert!(exclusions.excludes("https://example.com/tmp/a/b"));
        assert!(exclusions.excludes("https://example.com/cart"));
        assert!(!exclusions.excludes("https://example.com/blog"));
    }
}

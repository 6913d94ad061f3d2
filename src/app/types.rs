use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tokio::sync::oneshot;

use super::model::PollResponse;

#[derive(Debug, Parser, Clone)]
#[command(
    name = "crawlwatch",
    version,
    about = "Live terminal view for a running crawl, with windowed tables"
)]
pub struct Cli {
    /// Base URL of the crawl service.
    #[arg(
        long,
        env = "CRAWLWATCH_BACKEND",
        value_name = "URL",
        default_value = "http://localhost:5000"
    )]
    pub backend: String,

    /// Start a new crawl of URL before watching it.
    #[arg(long, value_name = "URL", conflicts_with_all = ["attach", "load"])]
    pub start: Option<String>,

    /// Fetch the current state once instead of following the crawl.
    #[arg(long, default_value_t = false, conflicts_with = "load")]
    pub attach: bool,

    /// Review a saved snapshot; no backend requests are made.
    #[arg(long, value_name = "FILE")]
    pub load: Option<PathBuf>,

    /// Save a snapshot when the crawl finishes or on quit.
    #[arg(long, value_name = "FILE")]
    pub save: Option<PathBuf>,

    #[arg(
        long,
        env = "CRAWLWATCH_POLL_INTERVAL_MS",
        value_name = "MS",
        default_value_t = 1000
    )]
    pub poll_interval_ms: u64,

    /// Request the full state every poll instead of deltas.
    #[arg(long, default_value_t = false)]
    pub full_snapshots: bool,

    /// Extra rows rendered above and below each table viewport.
    #[arg(long, value_name = "N", default_value_t = 8)]
    pub buffer_rows: usize,

    /// Warn after this many consecutive failed polls (0 disables).
    #[arg(long, value_name = "N", default_value_t = 10)]
    pub failure_warn_after: u32,

    /// Hide issues whose URL path matches PATTERN (glob with `*`, else prefix).
    #[arg(
        long = "exclude-issues",
        env = "CRAWLWATCH_EXCLUDE_ISSUES",
        value_name = "PATTERN",
        value_delimiter = ','
    )]
    pub exclude_issues: Vec<String>,

    /// File with one exclusion pattern per line.
    #[arg(long, value_name = "FILE")]
    pub exclude_issues_file: Option<PathBuf>,

    #[arg(long, value_name = "SECS", default_value_t = 30)]
    pub request_timeout_secs: u64,

    /// Directory for CSV exports triggered from the UI.
    #[arg(long, env = "CRAWLWATCH_EXPORT_DIR", value_name = "DIR", default_value = ".")]
    pub export_dir: PathBuf,

    #[arg(long, env = "CRAWLWATCH_LOG_DIR", value_name = "DIR", default_value = "logs")]
    pub log_dir: PathBuf,

    #[arg(long, default_value_t = false)]
    pub auto_close: bool,

    #[arg(long, default_value_t = false)]
    pub no_tui: bool,
}

impl Cli {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(50))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}

/// Store totals after a snapshot was handled. The poller takes its next delta
/// offsets from these, so a response that ignored the offsets cannot push
/// them past what was actually stored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeAck {
    pub urls: usize,
    pub links: usize,
}

/// Messages from background tasks to the UI loop.
///
/// Poller events carry the generation of the poller that produced them. A
/// new crawl bumps the generation, and anything older is acked and dropped.
#[derive(Debug)]
pub enum CrawlEvent {
    /// A poll response; the poller waits for `ack` before scheduling the next one.
    Snapshot {
        generation: u64,
        response: Box<PollResponse>,
        ack: oneshot::Sender<MergeAck>,
    },
    /// The service accepted a new crawl of this URL.
    Started(String),
    Finished(u64),
    Status(String),
    Warning(String),
    Error(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn defaults() {
        let cli = Cli::try_parse_from(["crawlwatch"]).unwrap();
        assert_eq!(cli.poll_interval(), Duration::from_secs(1));
        assert_eq!(cli.buffer_rows, 8);
        assert_eq!(cli.failure_warn_after, 10);
        assert!(!cli.full_snapshots);
        assert!(cli.exclude_issues.is_empty());
    }

    #[test]
    fn exclusions_accept_lists_and_repeats() {
        let cli = Cli::try_parse_from([
            "crawlwatch",
            "--exclude-issues",
            "/admin,/tmp/*",
            "--exclude-issues",
            "/cart",
        ])
        .unwrap();
        assert_eq!(cli.exclude_issues, vec!["/admin", "/tmp/*", "/cart"]);
    }

    #[test]
    fn start_conflicts_with_load() {
        assert!(
            Cli::try_parse_from(["crawlwatch", "--start", "https://a.test", "--load", "x.json"])
                .is_err()
        );
    }
}

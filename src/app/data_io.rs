//! Snapshot files and CSV exports.

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use tracing::info;
use url::Url;

use super::error::{Result, WatchError};
use super::filter::Classifier;
use super::model::{Issue, Link, PollResponse, Resource, StatsPayload};
use super::store::RecordStore;

pub const SNAPSHOT_VERSION: &str = "1.0";

const URL_HEADERS: [&str; 18] = [
    "url",
    "status_code",
    "content_type",
    "size",
    "response_time",
    "depth",
    "title",
    "meta_description",
    "h1",
    "h2",
    "h3",
    "word_count",
    "canonical_url",
    "internal_links",
    "external_links",
    "json_ld",
    "images",
    "analytics",
];

const LINK_HEADERS: [&str; 7] = [
    "source_url",
    "target_url",
    "anchor_text",
    "is_internal",
    "target_domain",
    "target_status",
    "placement",
];

const ISSUE_HEADERS: [&str; 5] = ["url", "type", "category", "issue", "details"];

#[derive(Serialize)]
struct SnapshotFile<'a> {
    timestamp: String,
    #[serde(rename = "baseUrl")]
    base_url: Option<&'a str>,
    stats: StatsPayload,
    urls: Vec<&'a Resource>,
    links: Vec<&'a Link>,
    issues: Vec<&'a Issue>,
    version: &'static str,
}

/// Writes the whole store as a reviewable snapshot.
pub fn save_snapshot(path: &Path, store: &RecordStore) -> Result<()> {
    let snapshot = SnapshotFile {
        timestamp: Utc::now().to_rfc3339(),
        base_url: store.stats().base_url.as_deref(),
        stats: store.stats().to_payload(),
        urls: store.resources().iter().map(Arc::as_ref).collect(),
        links: store.links().iter().map(Arc::as_ref).collect(),
        issues: store.issues().iter().map(Arc::as_ref).collect(),
        version: SNAPSHOT_VERSION,
    };
    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer(&mut writer, &snapshot)?;
    writer.flush()?;
    info!(
        path = %path.display(),
        urls = snapshot.urls.len(),
        links = snapshot.links.len(),
        "saved snapshot"
    );
    Ok(())
}

/// Reads a snapshot into a response that replays through the normal ingest.
/// Nothing is returned unless the file has `version`, `urls` and `stats`.
pub fn load_snapshot(path: &Path) -> Result<PollResponse> {
    let content = fs::read(path)?;
    let value: Value = serde_json::from_slice(&content)
        .map_err(|err| WatchError::InvalidSnapshot(format!("not JSON: {err}")))?;
    let Some(object) = value.as_object() else {
        return Err(WatchError::InvalidSnapshot("expected a JSON object".into()));
    };
    for key in ["version", "urls", "stats"] {
        if !object.contains_key(key) {
            return Err(WatchError::InvalidSnapshot(format!("missing `{key}`")));
        }
    }
    let top_base = object
        .get("baseUrl")
        .and_then(Value::as_str)
        .map(str::to_string);

    let mut response: PollResponse = serde_json::from_value(value)
        .map_err(|err| WatchError::InvalidSnapshot(err.to_string()))?;
    let stats = response.stats.get_or_insert_with(StatsPayload::default);
    if stats.base_url.is_none() {
        stats.base_url = top_base;
    }
    if response.issues.is_none() {
        response.issues = Some(Vec::new());
    }
    Ok(response)
}

struct CsvSink<W: Write> {
    writer: csv::Writer<W>,
    rows: usize,
}

impl<W: Write> CsvSink<W> {
    fn new(inner: W, headers: &[&str]) -> Result<Self> {
        let mut writer = csv::Writer::from_writer(inner);
        writer.write_record(headers)?;
        Ok(Self { writer, rows: 0 })
    }

    fn write_row<I, T>(&mut self, fields: I) -> Result<()>
    where
        I: IntoIterator<Item = T>,
        T: AsRef<[u8]>,
    {
        self.writer.write_record(fields)?;
        self.rows += 1;
        Ok(())
    }

    fn finish(mut self) -> Result<usize> {
        self.writer.flush()?;
        Ok(self.rows)
    }
}

pub fn export_urls<W: Write>(out: W, resources: &[Arc<Resource>]) -> Result<usize> {
    let mut sink = CsvSink::new(out, &URL_HEADERS)?;
    for r in resources {
        sink.write_row([
            r.url.clone(),
            r.status_code.map(|c| c.to_string()).unwrap_or_default(),
            r.content_type.clone(),
            r.size.to_string(),
            format!("{:.3}", r.response_time),
            r.depth.to_string(),
            r.title.clone(),
            r.meta_description.clone(),
            r.h1.clone(),
            r.h2.join("|"),
            r.h3.join("|"),
            r.word_count.to_string(),
            r.canonical_url.clone(),
            r.internal_links.to_string(),
            r.external_links.to_string(),
            r.json_ld.to_string(),
            r.images.to_string(),
            r.analytics.labels().join("|"),
        ])?;
    }
    sink.finish()
}

pub fn export_links<W: Write>(
    out: W,
    links: &[Arc<Link>],
    classifier: &Classifier,
) -> Result<usize> {
    let mut sink = CsvSink::new(out, &LINK_HEADERS)?;
    for link in links {
        let internal = if classifier.link_is_internal(link) {
            "Yes"
        } else {
            "No"
        };
        let status = link
            .target_status
            .map(|c| c.to_string())
            .unwrap_or_else(|| "Not crawled".to_string());
        sink.write_row([
            link.source_url.as_str(),
            link.target_url.as_str(),
            link.anchor_text.as_str(),
            internal,
            link.target_domain.as_str(),
            status.as_str(),
            link.placement.as_str(),
        ])?;
    }
    sink.finish()
}

pub fn export_issues<W: Write>(out: W, issues: &[Arc<Issue>]) -> Result<usize> {
    let mut sink = CsvSink::new(out, &ISSUE_HEADERS)?;
    for issue in issues {
        sink.write_row([
            issue.url.as_str(),
            issue.severity.label(),
            issue.category.as_str(),
            issue.issue.as_str(),
            issue.details.as_str(),
        ])?;
    }
    sink.finish()
}

pub fn create_export(path: &Path) -> io::Result<BufWriter<File>> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }
    Ok(BufWriter::new(File::create(path)?))
}

/// `<dir>/<host>_<kind>_<timestamp>.csv`
pub fn default_export_path(dir: &Path, base_url: Option<&str>, kind: &str) -> PathBuf {
    let host = base_url
        .and_then(|url| Url::parse(url).ok())
        .and_then(|u| u.host_str().map(|h| h.to_string()))
        .unwrap_or_else(|| "crawl".to_string());
    let host = host
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || ch == '-' {
                ch
            } else {
                '_'
            }
        })
        .collect::<String>();
    let ts = Utc::now().format("%Y%m%d_%H%M%S");
    dir.join(format!("{host}_{kind}_{ts}.csv"))
}

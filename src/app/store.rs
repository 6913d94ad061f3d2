//! Canonical in-memory crawl data.
//!
//! The merge functions here are the only code that mutates resources, links
//! and issues. Records are handed out as `Arc`s so tables can hold a snapshot
//! of a view while the store keeps growing; a back-filled link is copied on
//! write and the next recompute picks up the new version.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use globset::{Glob, GlobMatcher};
use tracing::debug;
use url::Url;

use super::error::{Result, WatchError};
use super::filter::Classifier;
use super::model::{CrawlStats, Issue, Link, PollResponse, Resource, RunStatus};

/// Counters describing what one ingest changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeReport {
    pub urls_added: usize,
    pub urls_rejected: usize,
    pub links_added: usize,
    pub links_dropped: usize,
    pub links_updated: usize,
    /// Size of the new issue list when the response carried one.
    pub issues_replaced: Option<usize>,
    pub base_changed: bool,
}

impl MergeReport {
    pub fn links_changed(&self) -> bool {
        self.links_added > 0 || self.links_updated > 0 || self.base_changed
    }
}

#[derive(Debug, Clone)]
enum ExclusionRule {
    Glob(GlobMatcher),
    Prefix(String),
}

/// Issue URL paths to hide, one pattern per entry.
#[derive(Debug, Clone, Default)]
pub struct IssueExclusions {
    rules: Vec<ExclusionRule>,
}

impl IssueExclusions {
    pub fn parse<I, S>(patterns: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut rules = Vec::new();
        for raw in patterns {
            let pattern = raw.as_ref().trim();
            if pattern.is_empty() || pattern.starts_with('#') {
                continue;
            }
            if pattern.contains('*') {
                let glob = Glob::new(pattern).map_err(|err| WatchError::InvalidPattern {
                    pattern: pattern.to_string(),
                    reason: err.to_string(),
                })?;
                rules.push(ExclusionRule::Glob(glob.compile_matcher()));
            } else {
                rules.push(ExclusionRule::Prefix(pattern.to_string()));
            }
        }
        Ok(Self { rules })
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn excludes(&self, url: &str) -> bool {
        if self.rules.is_empty() {
            return false;
        }
        let path = Url::parse(url)
            .map(|u| u.path().to_string())
            .unwrap_or_default();
        self.rules.iter().any(|rule| match rule {
            ExclusionRule::Glob(matcher) => matcher.is_match(&path),
            ExclusionRule::Prefix(prefix) => path.starts_with(prefix.as_str()),
        })
    }
}

#[derive(Debug, Default)]
pub struct RecordStore {
    resources: Vec<Arc<Resource>>,
    resource_index: HashMap<String, usize>,
    links: Vec<Arc<Link>>,
    link_index: HashMap<(String, String), usize>,
    links_by_target: HashMap<String, Vec<usize>>,
    issues: Vec<Arc<Issue>>,
    stats: CrawlStats,
    classifier: Classifier,
    run_status: RunStatus,
    progress: f64,
    running_pagespeed: bool,
    paused: bool,
    exclusions: IssueExclusions,
}

impl RecordStore {
    pub fn new(exclusions: IssueExclusions) -> Self {
        Self {
            exclusions,
            ..Self::default()
        }
    }

    /// Drops all crawl data; exclusion rules stay.
    pub fn reset(&mut self) {
        let exclusions = std::mem::take(&mut self.exclusions);
        *self = Self::new(exclusions);
    }

    pub fn resources(&self) -> &[Arc<Resource>] {
        &self.resources
    }

    pub fn links(&self) -> &[Arc<Link>] {
        &self.links
    }

    pub fn issues(&self) -> &[Arc<Issue>] {
        &self.issues
    }

    pub fn stats(&self) -> &CrawlStats {
        &self.stats
    }

    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    pub fn run_status(&self) -> RunStatus {
        self.run_status
    }

    pub fn progress(&self) -> f64 {
        self.progress
    }

    pub fn running_pagespeed(&self) -> bool {
        self.running_pagespeed
    }

    pub fn paused(&self) -> bool {
        self.paused
    }

    pub fn resource(&self, url: &str) -> Option<&Arc<Resource>> {
        self.resource_index
            .get(url)
            .and_then(|idx| self.resources.get(*idx))
    }

    pub fn link(&self, source: &str, target: &str) -> Option<&Arc<Link>> {
        self.link_index
            .get(&(source.to_string(), target.to_string()))
            .and_then(|idx| self.links.get(*idx))
    }

    /// Applies one whole response: stats first so classification sees the
    /// base URL, then resources, links and issues.
    pub fn ingest(&mut self, response: PollResponse) -> MergeReport {
        let mut report = MergeReport::default();

        if let Some(stats) = response.stats {
            let before = self.classifier.clone();
            self.stats.absorb(stats);
            self.classifier = Classifier::new(self.stats.base_url.as_deref());
            report.base_changed = before != self.classifier;
        }
        if let Some(status) = response.status {
            self.run_status = status;
        }
        if let Some(progress) = response.progress {
            self.progress = progress.clamp(0.0, 100.0);
        }
        self.running_pagespeed = response.is_running_pagespeed;
        if let Some(paused) = response.paused {
            self.paused = paused;
        }

        let (added, rejected, backfilled) = self.merge_resources(response.urls);
        report.urls_added = added;
        report.urls_rejected = rejected;
        report.links_updated += backfilled;

        let (added, dropped, updated) = self.merge_links(response.links);
        report.links_added = added;
        report.links_dropped = dropped;
        report.links_updated += updated;

        if let Some(issues) = response.issues {
            report.issues_replaced = Some(self.replace_issues(issues));
        }

        debug!(
            urls_added = report.urls_added,
            links_added = report.links_added,
            links_updated = report.links_updated,
            issues = ?report.issues_replaced,
            "merged snapshot"
        );
        report
    }

    /// First write wins. Returns `(added, rejected, links back-filled)`.
    pub fn merge_resources(&mut self, batch: Vec<Resource>) -> (usize, usize, usize) {
        let mut added = 0;
        let mut rejected = 0;
        let mut backfilled = 0;

        for mut resource in batch {
            if !resource.prepare() || self.resource_index.contains_key(&resource.url) {
                rejected += 1;
                continue;
            }
            if let Some(status) = resource.status_code
                && let Some(targets) = self.links_by_target.get(&resource.url)
            {
                for idx in targets {
                    let link = &mut self.links[*idx];
                    if link.target_status != Some(status) {
                        Arc::make_mut(link).target_status = Some(status);
                        backfilled += 1;
                    }
                }
            }
            self.resource_index
                .insert(resource.url.clone(), self.resources.len());
            self.resources.push(Arc::new(resource));
            added += 1;
        }

        (added, rejected, backfilled)
    }

    /// Returns `(added, dropped, updated)`.
    pub fn merge_links(&mut self, batch: Vec<Link>) -> (usize, usize, usize) {
        let mut seen = HashSet::with_capacity(batch.len());
        let mut added = 0;
        let mut dropped = 0;
        let mut updated = 0;

        for mut link in batch {
            if !link.prepare() {
                dropped += 1;
                continue;
            }
            let key = link.key();
            if !seen.insert(key.clone()) {
                dropped += 1;
                continue;
            }

            let crawled_status = self
                .resource(&link.target_url)
                .and_then(|target| target.status_code);

            if let Some(idx) = self.link_index.get(&key).copied() {
                dropped += 1;
                let status = crawled_status.or(link.target_status);
                if status.is_some() && self.links[idx].target_status != status {
                    Arc::make_mut(&mut self.links[idx]).target_status = status;
                    updated += 1;
                }
                continue;
            }

            if crawled_status.is_some() {
                link.target_status = crawled_status;
            }
            let idx = self.links.len();
            self.links_by_target
                .entry(link.target_url.clone())
                .or_default()
                .push(idx);
            self.link_index.insert(key, idx);
            self.links.push(Arc::new(link));
            added += 1;
        }

        (added, dropped, updated)
    }

    /// Full substitution after exclusion rules. Returns the new length.
    pub fn replace_issues(&mut self, issues: Vec<Issue>) -> usize {
        self.issues = issues
            .into_iter()
            .filter(|issue| !self.exclusions.excludes(&issue.url))
            .map(Arc::new)
            .collect();
        self.issues.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::model::StatsPayload;

    fn resource(url: &str, status: Option<u16>) -> Resource {
        Resource {
            url: url.to_string(),
            status_code: status,
            ..Resource::default()
        }
    }

    fn link(source: &str, target: &str, anchor: &str) -> Link {
        Link {
            source_url: source.to_string(),
            target_url: target.to_string(),
            anchor_text: anchor.to_string(),
            ..Link::default()
        }
    }

    #[test]
    fn resource_merge_is_first_write_wins() {
        let mut store = RecordStore::default();
        store.merge_resources(vec![resource("https://example.com/a", Some(200))]);
        let (added, rejected, _) =
            store.merge_resources(vec![resource("https://example.com/a#x", Some(500))]);
        assert_eq!((added, rejected), (0, 1));
        assert_eq!(store.resources().len(), 1);
        assert_eq!(store.resources()[0].status_code, Some(200));
    }

    #[test]
    fn resources_keep_arrival_order() {
        let mut store = RecordStore::default();
        store.merge_resources(vec![
            resource("https://example.com/c", Some(200)),
            resource("https://example.com/a", Some(200)),
        ]);
        store.merge_resources(vec![
            resource("https://example.com/b", Some(200)),
            resource("https://example.com/a", Some(404)),
        ]);
        let urls = store
            .resources()
            .iter()
            .map(|r| r.url.as_str())
            .collect::<Vec<_>>();
        assert_eq!(
            urls,
            vec![
                "https://example.com/c",
                "https://example.com/a",
                "https://example.com/b"
            ]
        );
    }

    #[test]
    fn duplicate_edges_collapse_to_first_anchor() {
        let mut store = RecordStore::default();
        let (added, dropped, _) = store.merge_links(vec![
            link("https://example.com/", "https://example.com/b", "first"),
            link("https://example.com/", "https://example.com/b", "second"),
        ]);
        assert_eq!((added, dropped), (1, 1));
        store.merge_links(vec![link(
            "https://example.com/",
            "https://example.com/b",
            "third",
        )]);
        assert_eq!(store.links().len(), 1);
        assert_eq!(store.links()[0].anchor_text, "first");
    }

    #[test]
    fn link_status_is_backfilled_when_target_is_crawled_later() {
        let mut store = RecordStore::default();
        store.merge_links(vec![link("https://a.test/", "https://a.test/b", "B")]);
        assert_eq!(
            store
                .link("https://a.test/", "https://a.test/b")
                .unwrap()
                .target_status,
            None
        );

        let (_, _, backfilled) = store.merge_resources(vec![resource("https://a.test/b", Some(301))]);
        assert_eq!(backfilled, 1);
        assert_eq!(
            store
                .link("https://a.test/", "https://a.test/b")
                .unwrap()
                .target_status,
            Some(301)
        );
    }

    #[test]
    fn link_arriving_after_target_takes_its_status() {
        let mut store = RecordStore::default();
        store.merge_resources(vec![resource("https://a.test/b", Some(404))]);
        store.merge_links(vec![link("https://a.test/", "https://a.test/b", "B")]);
        assert_eq!(store.links()[0].target_status, Some(404));
    }

    #[test]
    fn later_duplicate_updates_status_only() {
        let mut store = RecordStore::default();
        store.merge_links(vec![link("https://a.test/", "https://ext.test/", "x")]);
        let mut again = link("https://a.test/", "https://ext.test/", "y");
        again.target_status = Some(200);
        let (_, _, updated) = store.merge_links(vec![again]);
        assert_eq!(updated, 1);
        assert_eq!(store.links()[0].target_status, Some(200));
        assert_eq!(store.links()[0].anchor_text, "x");
    }

    #[test]
    fn snapshot_held_by_a_view_is_not_mutated_by_backfill() {
        let mut store = RecordStore::default();
        store.merge_links(vec![link("https://a.test/", "https://a.test/b", "B")]);
        let held = store.links().to_vec();
        store.merge_resources(vec![resource("https://a.test/b", Some(200))]);
        assert_eq!(held[0].target_status, None);
        assert_eq!(store.links()[0].target_status, Some(200));
    }

    #[test]
    fn issues_are_replaced_and_excluded() {
        let exclusions = IssueExclusions::parse(["# comment", "", "/admin", "/tmp/*.html"]).unwrap();
        let mut store = RecordStore::new(exclusions);
        let issue = |url: &str| Issue {
            url: url.to_string(),
            ..Issue::default()
        };
        store.replace_issues(vec![issue("https://a.test/x"), issue("https://a.test/y")]);
        assert_eq!(store.issues().len(), 2);
        let kept = store.replace_issues(vec![
            issue("https://a.test/admin/users"),
            issue("https://a.test/tmp/deep/page.html"),
            issue("https://a.test/ok"),
        ]);
        assert_eq!(kept, 1);
        assert_eq!(store.issues()[0].url, "https://a.test/ok");
    }

    #[test]
    fn ingest_without_issues_key_keeps_issue_list() {
        let mut store = RecordStore::default();
        store.replace_issues(vec![Issue::default()]);
        let report = store.ingest(PollResponse {
            status: Some(RunStatus::Running),
            stats: Some(StatsPayload {
                base_url: Some("https://www.a.test".to_string()),
                ..StatsPayload::default()
            }),
            ..PollResponse::default()
        });
        assert!(report.base_changed);
        assert_eq!(report.issues_replaced, None);
        assert_eq!(store.issues().len(), 1);
        assert_eq!(store.classifier().base_host(), Some("a.test"));
        assert_eq!(store.run_status(), RunStatus::Running);
    }

    #[test]
    fn invalid_glob_is_reported() {
        let err = IssueExclusions::parse(["/a/[*"]).unwrap_err();
        assert!(matches!(err, WatchError::InvalidPattern { .. }));
    }
}

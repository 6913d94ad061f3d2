//! Predicates, bucket counts and filtered views.
//!
//! Every view is derived in a single pass that also produces the counts shown
//! next to the filter controls, so a rendered table and its counts always come
//! from the same predicate. Views preserve store order.

use std::sync::Arc;

use super::model::{Issue, Link, Resource, Severity};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusBucket {
    Success,
    Redirect,
    ClientError,
    ServerError,
}

impl StatusBucket {
    pub const ALL: [StatusBucket; 4] = [
        StatusBucket::Success,
        StatusBucket::Redirect,
        StatusBucket::ClientError,
        StatusBucket::ServerError,
    ];

    pub fn label(self) -> &'static str {
        match self {
            StatusBucket::Success => "2xx",
            StatusBucket::Redirect => "3xx",
            StatusBucket::ClientError => "4xx",
            StatusBucket::ServerError => "5xx",
        }
    }

    fn index(self) -> usize {
        match self {
            StatusBucket::Success => 0,
            StatusBucket::Redirect => 1,
            StatusBucket::ClientError => 2,
            StatusBucket::ServerError => 3,
        }
    }

    /// Half-open ranges; 5xx has no upper bound.
    pub fn contains(self, code: u16) -> bool {
        match self {
            StatusBucket::Success => (200..300).contains(&code),
            StatusBucket::Redirect => (300..400).contains(&code),
            StatusBucket::ClientError => (400..500).contains(&code),
            StatusBucket::ServerError => code >= 500,
        }
    }

    pub fn of(status: Option<u16>) -> Option<Self> {
        let code = status?;
        Self::ALL.into_iter().find(|bucket| bucket.contains(code))
    }

    pub fn cycle(current: Option<Self>) -> Option<Self> {
        match current {
            None => Some(StatusBucket::Success),
            Some(StatusBucket::Success) => Some(StatusBucket::Redirect),
            Some(StatusBucket::Redirect) => Some(StatusBucket::ClientError),
            Some(StatusBucket::ClientError) => Some(StatusBucket::ServerError),
            Some(StatusBucket::ServerError) => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentBucket {
    Html,
    Css,
    Js,
    Images,
}

impl ContentBucket {
    pub const ALL: [ContentBucket; 4] = [
        ContentBucket::Html,
        ContentBucket::Css,
        ContentBucket::Js,
        ContentBucket::Images,
    ];

    pub fn label(self) -> &'static str {
        match self {
            ContentBucket::Html => "html",
            ContentBucket::Css => "css",
            ContentBucket::Js => "js",
            ContentBucket::Images => "images",
        }
    }

    fn index(self) -> usize {
        match self {
            ContentBucket::Html => 0,
            ContentBucket::Css => 1,
            ContentBucket::Js => 2,
            ContentBucket::Images => 3,
        }
    }

    pub fn matches(self, content_type: &str) -> bool {
        let mime = content_type.trim().to_ascii_lowercase();
        match self {
            ContentBucket::Html => mime.contains("html"),
            ContentBucket::Css => mime.contains("css"),
            ContentBucket::Js => mime.contains("javascript") || mime.contains("ecmascript"),
            ContentBucket::Images => mime.starts_with("image/"),
        }
    }

    pub fn of(content_type: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|bucket| bucket.matches(content_type))
    }
}

/// The single global predicate shared by the three URL tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Classification {
    #[default]
    All,
    Internal,
    External,
    Status(StatusBucket),
    Content(ContentBucket),
}

impl Classification {
    const ORDER: [Classification; 11] = [
        Classification::All,
        Classification::Internal,
        Classification::External,
        Classification::Status(StatusBucket::Success),
        Classification::Status(StatusBucket::Redirect),
        Classification::Status(StatusBucket::ClientError),
        Classification::Status(StatusBucket::ServerError),
        Classification::Content(ContentBucket::Html),
        Classification::Content(ContentBucket::Css),
        Classification::Content(ContentBucket::Js),
        Classification::Content(ContentBucket::Images),
    ];

    pub fn label(self) -> &'static str {
        match self {
            Classification::All => "all",
            Classification::Internal => "internal",
            Classification::External => "external",
            Classification::Status(bucket) => bucket.label(),
            Classification::Content(bucket) => bucket.label(),
        }
    }

    pub fn cycle(self) -> Self {
        let idx = Self::ORDER.iter().position(|c| *c == self).unwrap_or(0);
        Self::ORDER[(idx + 1) % Self::ORDER.len()]
    }

    fn matches(self, resource: &Resource, internal: bool) -> bool {
        match self {
            Classification::All => true,
            Classification::Internal => internal,
            Classification::External => !internal,
            Classification::Status(bucket) => {
                resource.status_code.is_some_and(|code| bucket.contains(code))
            }
            Classification::Content(bucket) => bucket.matches(&resource.content_type),
        }
    }
}

/// Compares cached hosts against the crawl's base host.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Classifier {
    base_host: Option<String>,
}

impl Classifier {
    pub fn new(base_url: Option<&str>) -> Self {
        Self {
            base_host: base_url.and_then(super::model::host_key),
        }
    }

    pub fn base_host(&self) -> Option<&str> {
        self.base_host.as_deref()
    }

    /// Crawled resources count as internal until the base host is known.
    pub fn resource_is_internal(&self, resource: &Resource) -> bool {
        match (&self.base_host, &resource.host) {
            (Some(base), Some(host)) => base == host,
            (Some(_), None) => false,
            (None, _) => true,
        }
    }

    pub fn link_is_internal(&self, link: &Link) -> bool {
        match (&self.base_host, &link.target_host) {
            (Some(base), Some(host)) => base == host,
            (Some(_), None) => false,
            (None, _) => link.is_internal.unwrap_or(false),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UrlTable {
    Overview,
    Internal,
    External,
}

impl UrlTable {
    pub const ALL: [UrlTable; 3] = [UrlTable::Overview, UrlTable::Internal, UrlTable::External];

    pub fn index(self) -> usize {
        self as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkTable {
    Internal,
    External,
}

impl LinkTable {
    pub const ALL: [LinkTable; 2] = [LinkTable::Internal, LinkTable::External];

    pub fn index(self) -> usize {
        self as usize
    }
}

/// Per-table search and status bucket for a link table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkFilter {
    pub search: String,
    pub status: Option<StatusBucket>,
}

impl LinkFilter {
    fn matches(&self, link: &Link, table: LinkTable, needle: &str) -> bool {
        if let Some(bucket) = self.status
            && !link.target_status.is_some_and(|code| bucket.contains(code))
        {
            return false;
        }
        if needle.is_empty() {
            return true;
        }
        let third = match table {
            LinkTable::Internal => &link.anchor_text,
            LinkTable::External => &link.target_domain,
        };
        link.source_url.to_ascii_lowercase().contains(needle)
            || link.target_url.to_ascii_lowercase().contains(needle)
            || third.to_lowercase().contains(needle)
    }
}

/// Everything the user can filter on, owned by the session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterState {
    pub global: Classification,
    pub internal_links: LinkFilter,
    pub external_links: LinkFilter,
    pub severity: Option<Severity>,
}

impl FilterState {
    pub fn link_filter(&self, table: LinkTable) -> &LinkFilter {
        match table {
            LinkTable::Internal => &self.internal_links,
            LinkTable::External => &self.external_links,
        }
    }

    pub fn link_filter_mut(&mut self, table: LinkTable) -> &mut LinkFilter {
        match table {
            LinkTable::Internal => &mut self.internal_links,
            LinkTable::External => &mut self.external_links,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UrlCounts {
    pub total: usize,
    pub internal: usize,
    pub external: usize,
    pub status: [usize; 4],
    /// Numeric status outside every bucket (1xx).
    pub other_status: usize,
    pub no_status: usize,
    pub content: [usize; 4],
    pub other_content: usize,
    /// Rows the active predicate selected for the overview table.
    pub matched: usize,
}

impl UrlCounts {
    pub fn status_count(&self, bucket: StatusBucket) -> usize {
        self.status[bucket.index()]
    }

    pub fn content_count(&self, bucket: ContentBucket) -> usize {
        self.content[bucket.index()]
    }

    pub fn count_for(&self, predicate: Classification) -> usize {
        match predicate {
            Classification::All => self.total,
            Classification::Internal => self.internal,
            Classification::External => self.external,
            Classification::Status(bucket) => self.status_count(bucket),
            Classification::Content(bucket) => self.content_count(bucket),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct UrlViews {
    pub overview: Vec<Arc<Resource>>,
    pub internal: Vec<Arc<Resource>>,
    pub external: Vec<Arc<Resource>>,
    pub counts: UrlCounts,
}

impl UrlViews {
    pub fn table(&self, table: UrlTable) -> &[Arc<Resource>] {
        match table {
            UrlTable::Overview => &self.overview,
            UrlTable::Internal => &self.internal,
            UrlTable::External => &self.external,
        }
    }
}

/// One pass over the resources: three views plus every bucket count.
pub fn url_views(
    resources: &[Arc<Resource>],
    classifier: &Classifier,
    predicate: Classification,
) -> UrlViews {
    let mut views = UrlViews::default();
    let counts = &mut views.counts;
    counts.total = resources.len();

    for resource in resources {
        let internal = classifier.resource_is_internal(resource);
        if internal {
            counts.internal += 1;
        } else {
            counts.external += 1;
        }
        match (resource.status_code, StatusBucket::of(resource.status_code)) {
            (_, Some(bucket)) => counts.status[bucket.index()] += 1,
            (Some(_), None) => counts.other_status += 1,
            (None, None) => counts.no_status += 1,
        }
        match ContentBucket::of(&resource.content_type) {
            Some(bucket) => counts.content[bucket.index()] += 1,
            None => counts.other_content += 1,
        }

        if predicate.matches(resource, internal) {
            counts.matched += 1;
            views.overview.push(Arc::clone(resource));
            if internal {
                views.internal.push(Arc::clone(resource));
            } else {
                views.external.push(Arc::clone(resource));
            }
        }
    }

    views
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkTotals {
    pub total: usize,
    pub internal: usize,
    pub external: usize,
}

/// Badge counts for the link tabs; cheap enough to run every poll.
pub fn link_totals(links: &[Arc<Link>], classifier: &Classifier) -> LinkTotals {
    let internal = links
        .iter()
        .filter(|link| classifier.link_is_internal(link))
        .count();
    LinkTotals {
        total: links.len(),
        internal,
        external: links.len() - internal,
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkTableCounts {
    /// Links belonging to the table before the user filter.
    pub in_table: usize,
    pub status: [usize; 4],
    pub not_crawled: usize,
    pub matched: usize,
}

impl LinkTableCounts {
    pub fn status_count(&self, bucket: StatusBucket) -> usize {
        self.status[bucket.index()]
    }
}

pub fn link_view(
    links: &[Arc<Link>],
    classifier: &Classifier,
    table: LinkTable,
    filter: &LinkFilter,
) -> (Vec<Arc<Link>>, LinkTableCounts) {
    let needle = filter.search.trim().to_lowercase();
    let mut counts = LinkTableCounts::default();
    let mut rows = Vec::new();

    for link in links {
        let internal = classifier.link_is_internal(link);
        let in_table = match table {
            LinkTable::Internal => internal,
            LinkTable::External => !internal,
        };
        if !in_table {
            continue;
        }
        counts.in_table += 1;
        match StatusBucket::of(link.target_status) {
            Some(bucket) => counts.status[bucket.index()] += 1,
            None => counts.not_crawled += 1,
        }
        if filter.matches(link, table, &needle) {
            counts.matched += 1;
            rows.push(Arc::clone(link));
        }
    }

    (rows, counts)
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IssueCounts {
    pub total: usize,
    pub errors: usize,
    pub warnings: usize,
    pub info: usize,
    pub matched: usize,
}

impl IssueCounts {
    pub fn severity_count(&self, severity: Severity) -> usize {
        match severity {
            Severity::Error => self.errors,
            Severity::Warning => self.warnings,
            Severity::Info => self.info,
        }
    }
}

pub fn issue_view(
    issues: &[Arc<Issue>],
    severity: Option<Severity>,
) -> (Vec<Arc<Issue>>, IssueCounts) {
    let rows = issues
        .iter()
        .filter(|issue| severity.is_none_or(|wanted| wanted == issue.severity))
        .cloned()
        .collect::<Vec<_>>();
    (rows, issue_counts(issues, severity))
}

/// Counts without building the view, for a hidden issue table.
pub fn issue_counts(issues: &[Arc<Issue>], severity: Option<Severity>) -> IssueCounts {
    let mut counts = IssueCounts {
        total: issues.len(),
        ..IssueCounts::default()
    };
    for issue in issues {
        match issue.severity {
            Severity::Error => counts.errors += 1,
            Severity::Warning => counts.warnings += 1,
            Severity::Info => counts.info += 1,
        }
        if severity.is_none_or(|wanted| wanted == issue.severity) {
            counts.matched += 1;
        }
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resource(url: &str, status: Option<u16>, content_type: &str) -> Arc<Resource> {
        let mut res = Resource {
            url: url.to_string(),
            status_code: status,
            content_type: content_type.to_string(),
            ..Resource::default()
        };
        assert!(res.prepare());
        Arc::new(res)
    }

    fn link(source: &str, target: &str, anchor: &str, status: Option<u16>) -> Arc<Link> {
        let mut link = Link {
            source_url: source.to_string(),
            target_url: target.to_string(),
            anchor_text: anchor.to_string(),
            target_status: status,
            ..Link::default()
        };
        assert!(link.prepare());
        Arc::new(link)
    }

    fn sample() -> Vec<Arc<Resource>> {
        vec![
            resource("https://example.com/", Some(200), "text/html; charset=utf-8"),
            resource("https://www.example.com/style.css", Some(200), "text/css"),
            resource("https://example.com/old", Some(399), "text/html"),
            resource("https://example.com/missing", Some(400), "text/html"),
            resource("https://example.com/broken", Some(503), "text/html"),
            resource("https://example.com/slow", None, ""),
            resource("https://cdn.other.net/app.js", Some(200), "application/javascript"),
            resource("https://cdn.other.net/logo.png", Some(304), "image/png"),
            resource("https://example.com/weird", Some(999), "text/plain"),
        ]
    }

    #[test]
    fn www_prefix_is_ignored_for_classification() {
        let classifier = Classifier::new(Some("https://www.example.com"));
        let about = resource("https://example.com/about", Some(200), "text/html");
        assert!(classifier.resource_is_internal(&about));
        let sub = resource("https://blog.example.com/", Some(200), "text/html");
        assert!(!classifier.resource_is_internal(&sub));
    }

    #[test]
    fn bucket_boundaries() {
        assert_eq!(StatusBucket::of(Some(399)), Some(StatusBucket::Redirect));
        assert_eq!(StatusBucket::of(Some(400)), Some(StatusBucket::ClientError));
        assert_eq!(StatusBucket::of(Some(299)), Some(StatusBucket::Success));
        assert_eq!(StatusBucket::of(Some(999)), Some(StatusBucket::ServerError));
        assert_eq!(StatusBucket::of(Some(150)), None);
        assert_eq!(StatusBucket::of(None), None);
    }

    #[test]
    fn counts_are_conserved() {
        let resources = sample();
        let classifier = Classifier::new(Some("https://example.com"));
        let views = url_views(&resources, &classifier, Classification::All);
        let c = &views.counts;
        assert_eq!(c.total, resources.len());
        assert_eq!(c.internal + c.external, c.total);
        assert_eq!(
            c.status.iter().sum::<usize>() + c.other_status + c.no_status,
            c.total
        );
        assert_eq!(c.status.iter().sum::<usize>(), c.total - 1);
        assert_eq!(c.no_status, 1);
        assert_eq!(c.content.iter().sum::<usize>() + c.other_content, c.total);
        assert_eq!(c.status_count(StatusBucket::Redirect), 2);
        assert_eq!(c.status_count(StatusBucket::ServerError), 2);
    }

    #[test]
    fn counts_match_rendered_view_for_every_predicate() {
        let resources = sample();
        let classifier = Classifier::new(Some("https://example.com"));
        let mut predicate = Classification::All;
        loop {
            let views = url_views(&resources, &classifier, predicate);
            assert_eq!(views.overview.len(), views.counts.count_for(predicate));
            assert_eq!(views.counts.matched, views.overview.len());
            assert_eq!(
                views.internal.len() + views.external.len(),
                views.overview.len()
            );
            let (kept, rejected): (Vec<_>, Vec<_>) = resources
                .iter()
                .partition(|r| predicate.matches(r, classifier.resource_is_internal(r)));
            assert_eq!(kept.len(), views.overview.len());
            assert!(
                rejected
                    .iter()
                    .all(|r| !views.overview.iter().any(|shown| Arc::ptr_eq(shown, r))),
                "{predicate:?} rendered a rejected row"
            );
            assert_eq!(views.overview.len() + rejected.len(), views.counts.total);
            predicate = predicate.cycle();
            if predicate == Classification::All {
                break;
            }
        }
    }

    #[test]
    fn views_keep_store_order() {
        let resources = sample();
        let classifier = Classifier::new(Some("https://example.com"));
        let views = url_views(
            &resources,
            &classifier,
            Classification::Content(ContentBucket::Html),
        );
        let urls = views
            .overview
            .iter()
            .map(|r| r.url.as_str())
            .collect::<Vec<_>>();
        assert_eq!(
            urls,
            vec![
                "https://example.com/",
                "https://example.com/old",
                "https://example.com/missing",
                "https://example.com/broken",
            ]
        );
    }

    #[test]
    fn link_search_composes_with_status() {
        let classifier = Classifier::new(Some("https://example.com"));
        let links = vec![
            link("https://example.com/", "https://example.com/pricing", "Pricing", Some(200)),
            link("https://example.com/", "https://example.com/gone", "Old Pricing", Some(404)),
            link("https://example.com/", "https://example.com/about", "About", None),
            link("https://example.com/", "https://partner.org/x", "Partner", Some(200)),
        ];
        let filter = LinkFilter {
            search: "PRICING".to_string(),
            status: Some(StatusBucket::ClientError),
        };
        let (rows, counts) = link_view(&links, &classifier, LinkTable::Internal, &filter);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].target_url, "https://example.com/gone");
        assert_eq!(counts.in_table, 3);
        assert_eq!(counts.not_crawled, 1);
        assert_eq!(counts.matched, 1);

        let filter = LinkFilter {
            search: "partner.org".to_string(),
            status: None,
        };
        let (rows, _) = link_view(&links, &classifier, LinkTable::External, &filter);
        assert_eq!(rows.len(), 1);

        let totals = link_totals(&links, &classifier);
        assert_eq!(totals.internal + totals.external, totals.total);
        assert_eq!(totals.external, 1);
    }

    #[test]
    fn severity_filter_is_exact() {
        let issues = [Severity::Error, Severity::Warning, Severity::Error, Severity::Info]
            .into_iter()
            .map(|severity| {
                Arc::new(Issue {
                    url: "https://example.com/".to_string(),
                    severity,
                    ..Issue::default()
                })
            })
            .collect::<Vec<_>>();
        let (rows, counts) = issue_view(&issues, Some(Severity::Error));
        assert_eq!(rows.len(), 2);
        assert_eq!(counts.errors + counts.warnings + counts.info, counts.total);
        let (rows, counts) = issue_view(&issues, None);
        assert_eq!(rows.len(), 4);
        assert_eq!(counts.matched, 4);
        for severity in Severity::ALL {
            let (rows, _) = issue_view(&issues, Some(severity));
            assert_eq!(counts.severity_count(severity), rows.len());
        }
    }
}

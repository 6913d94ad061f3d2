//! One crawl as seen by the UI: store, filters, tables and tab state.
//!
//! Every poll response goes through [`CrawlSession::apply_snapshot`], which
//! merges the whole response before recomputing anything. URL tables are
//! extended in place when nothing that affects classification changed;
//! link and issue tables are only materialized while their tab is active.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, trace};

use super::filter::{
    Classification, FilterState, IssueCounts, LinkTable, LinkTableCounts, LinkTotals,
    StatusBucket, UrlCounts, UrlTable, issue_counts, issue_view, link_totals, link_view,
    url_views,
};
use super::model::{Issue, Link, PollResponse, Resource, Severity};
use super::store::{IssueExclusions, MergeReport, RecordStore};
use super::tabs::{Pending, Tab, TabController};
use super::window::{RowSurface, TableView, WindowedTable};

pub type RowFn<S, T> = fn(&mut <S as RowSurface>::Row, &Arc<T>, usize);
pub type UrlEngine<S> = WindowedTable<S, Arc<Resource>, RowFn<S, Resource>>;
pub type LinkEngine<S> = WindowedTable<S, Arc<Link>, RowFn<S, Link>>;
pub type IssueEngine<S> = WindowedTable<S, Arc<Issue>, RowFn<S, Issue>>;

pub struct Renderers<S: RowSurface> {
    pub resource: RowFn<S, Resource>,
    pub link: RowFn<S, Link>,
    pub issue: RowFn<S, Issue>,
}

#[derive(Debug, Default)]
pub struct SessionOptions {
    pub buffer_rows: usize,
    pub exclusions: IssueExclusions,
}

pub struct CrawlSession<S: RowSurface> {
    store: RecordStore,
    filters: FilterState,
    tabs: TabController,
    urls: [Option<UrlEngine<S>>; 3],
    links: [Option<LinkEngine<S>>; 2],
    issues: Option<IssueEngine<S>>,
    url_counts: UrlCounts,
    link_totals: LinkTotals,
    link_counts: [LinkTableCounts; 2],
    issue_counts: IssueCounts,
}

impl<S: RowSurface> CrawlSession<S> {
    /// `make_surface` returns the surface and row height for each table.
    pub fn new<M>(options: SessionOptions, renderers: Renderers<S>, mut make_surface: M) -> Self
    where
        M: FnMut(Tab) -> (S, u32),
    {
        let buffer = options.buffer_rows;
        let urls = UrlTable::ALL.map(|table| {
            let (surface, height) = make_surface(Tab::from(table));
            WindowedTable::initialize(surface, height, buffer, renderers.resource)
        });
        let links = LinkTable::ALL.map(|table| {
            let (surface, height) = make_surface(Tab::from(table));
            WindowedTable::initialize(surface, height, buffer, renderers.link)
        });
        let (surface, height) = make_surface(Tab::Issues);
        let issues = WindowedTable::initialize(surface, height, buffer, renderers.issue);

        Self {
            store: RecordStore::new(options.exclusions),
            filters: FilterState::default(),
            tabs: TabController::default(),
            urls,
            links,
            issues,
            url_counts: UrlCounts::default(),
            link_totals: LinkTotals::default(),
            link_counts: Default::default(),
            issue_counts: IssueCounts::default(),
        }
    }

    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    pub fn filters(&self) -> &FilterState {
        &self.filters
    }

    pub fn active_tab(&self) -> Tab {
        self.tabs.active()
    }

    pub fn is_parked(&self, tab: Tab) -> bool {
        self.tabs.is_parked(tab)
    }

    pub fn url_counts(&self) -> &UrlCounts {
        &self.url_counts
    }

    pub fn link_totals(&self) -> &LinkTotals {
        &self.link_totals
    }

    pub fn link_counts(&self, table: LinkTable) -> &LinkTableCounts {
        &self.link_counts[table.index()]
    }

    pub fn issue_counts(&self) -> &IssueCounts {
        &self.issue_counts
    }

    pub fn url_engine(&self, table: UrlTable) -> Option<&UrlEngine<S>> {
        self.urls[table.index()].as_ref()
    }

    pub fn link_engine(&self, table: LinkTable) -> Option<&LinkEngine<S>> {
        self.links[table.index()].as_ref()
    }

    pub fn issue_engine(&self) -> Option<&IssueEngine<S>> {
        self.issues.as_ref()
    }

    pub fn surface(&self, tab: Tab) -> Option<&S> {
        match (tab.url_table(), tab.link_table()) {
            (Some(table), _) => self.url_engine(table).map(|e| e.surface()),
            (_, Some(table)) => self.link_engine(table).map(|e| e.surface()),
            _ if tab == Tab::Issues => self.issue_engine().map(|e| e.surface()),
            _ => None,
        }
    }

    pub fn view(&self, tab: Tab) -> Option<&dyn TableView<S::Row>> {
        match tab {
            Tab::Issues => self.issues.as_ref().map(|e| e as &dyn TableView<S::Row>),
            _ => match (tab.url_table(), tab.link_table()) {
                (Some(table), _) => self.urls[table.index()]
                    .as_ref()
                    .map(|e| e as &dyn TableView<S::Row>),
                (_, Some(table)) => self.links[table.index()]
                    .as_ref()
                    .map(|e| e as &dyn TableView<S::Row>),
                _ => None,
            },
        }
    }

    pub fn view_mut(&mut self, tab: Tab) -> Option<&mut dyn TableView<S::Row>> {
        match tab {
            Tab::Issues => self
                .issues
                .as_mut()
                .map(|e| e as &mut dyn TableView<S::Row>),
            _ => match (tab.url_table(), tab.link_table()) {
                (Some(table), _) => self.urls[table.index()]
                    .as_mut()
                    .map(|e| e as &mut dyn TableView<S::Row>),
                (_, Some(table)) => self.links[table.index()]
                    .as_mut()
                    .map(|e| e as &mut dyn TableView<S::Row>),
                _ => None,
            },
        }
    }

    /// URL of the record at `index` in a table, for the detail line.
    pub fn record_url(&self, tab: Tab, index: usize) -> Option<&str> {
        if let Some(table) = tab.url_table() {
            return self.urls[table.index()]
                .as_ref()
                .and_then(|e| e.records().get(index))
                .map(|r| r.url.as_str());
        }
        if let Some(table) = tab.link_table() {
            return self.links[table.index()]
                .as_ref()
                .and_then(|e| e.records().get(index))
                .map(|l| l.target_url.as_str());
        }
        self.issues
            .as_ref()
            .and_then(|e| e.records().get(index))
            .map(|i| i.url.as_str())
    }

    /// Merges a whole response, then recomputes derived views.
    pub fn apply_snapshot(&mut self, response: PollResponse) -> MergeReport {
        let report = self.store.ingest(response);

        self.refresh_urls(!report.base_changed);
        self.link_totals = link_totals(self.store.links(), self.store.classifier());
        if report.links_changed() {
            for table in LinkTable::ALL {
                self.drive_links(table);
            }
        }
        if report.issues_replaced.is_some() {
            self.drive_issues();
        }
        report
    }

    /// Replaces everything with a persisted snapshot.
    pub fn load_snapshot(&mut self, response: PollResponse) -> MergeReport {
        self.reset();
        let report = self.apply_snapshot(response);
        info!(
            urls = self.store.resources().len(),
            links = self.store.links().len(),
            issues = self.store.issues().len(),
            "loaded snapshot"
        );
        report
    }

    pub fn reset(&mut self) {
        self.store.reset();
        self.tabs.clear();
        for engine in self.urls.iter_mut().flatten() {
            engine.clear();
        }
        for engine in self.links.iter_mut().flatten() {
            engine.clear();
        }
        if let Some(engine) = self.issues.as_mut() {
            engine.clear();
        }
        self.url_counts = UrlCounts::default();
        self.link_totals = LinkTotals::default();
        self.link_counts = Default::default();
        self.issue_counts = IssueCounts::default();
    }

    /// Sets the global URL predicate; all three URL tables and the counts are
    /// recomputed before this returns.
    pub fn apply_filter(&mut self, predicate: Classification) -> &UrlCounts {
        self.filters.global = predicate;
        self.refresh_urls(false);
        debug!(filter = predicate.label(), matched = self.url_counts.matched, "applied filter");
        &self.url_counts
    }

    pub fn cycle_filter(&mut self) -> Classification {
        let next = self.filters.global.cycle();
        self.apply_filter(next);
        next
    }

    pub fn set_link_search(&mut self, table: LinkTable, search: &str) {
        let filter = self.filters.link_filter_mut(table);
        if filter.search != search {
            filter.search = search.to_string();
            self.drive_links(table);
        }
    }

    pub fn cycle_link_status(&mut self, table: LinkTable) -> Option<StatusBucket> {
        let filter = self.filters.link_filter_mut(table);
        filter.status = StatusBucket::cycle(filter.status);
        let status = filter.status;
        self.drive_links(table);
        status
    }

    pub fn set_severity(&mut self, severity: Option<Severity>) {
        self.filters.severity = severity;
        self.drive_issues();
    }

    pub fn cycle_severity(&mut self) -> Option<Severity> {
        let next = match self.filters.severity {
            None => Some(Severity::Error),
            Some(Severity::Error) => Some(Severity::Warning),
            Some(Severity::Warning) => Some(Severity::Info),
            Some(Severity::Info) => None,
        };
        self.set_severity(next);
        next
    }

    /// Switches tabs, flushing whatever the new tab had parked.
    pub fn activate(&mut self, tab: Tab) {
        if let Some(pending) = self.tabs.activate(tab) {
            match pending {
                Pending::Links(links) => {
                    if let Some(table) = tab.link_table() {
                        let view = link_view(
                            &links,
                            self.store.classifier(),
                            table,
                            self.filters.link_filter(table),
                        );
                        self.show_links(table, view);
                    }
                }
                Pending::Issues(issues) => {
                    let view = issue_view(&issues, self.filters.severity);
                    self.show_issues(view);
                }
            }
        }
    }

    /// Runs debounced scroll/resize work for every table.
    pub fn pump(&mut self, now: Instant) {
        for tab in Tab::ALL {
            if let Some(view) = self.view_mut(tab)
                && view.pump(now)
            {
                let stats = view.stats();
                trace!(
                    tab = tab.title(),
                    reconciles = stats.reconciles,
                    rows_rendered = stats.rows_rendered,
                    "table reconciled"
                );
            }
        }
    }

    pub fn resize(&mut self, viewport_height: u32) {
        for tab in Tab::ALL {
            if let Some(view) = self.view_mut(tab) {
                view.on_resize(viewport_height);
            }
        }
    }

    /// Current filtered URL view, independent of whether a table renders it.
    pub fn current_urls(&self, table: UrlTable) -> Vec<Arc<Resource>> {
        let views = url_views(
            self.store.resources(),
            self.store.classifier(),
            self.filters.global,
        );
        match table {
            UrlTable::Overview => views.overview,
            UrlTable::Internal => views.internal,
            UrlTable::External => views.external,
        }
    }

    pub fn current_links(&self, table: LinkTable) -> Vec<Arc<Link>> {
        link_view(
            self.store.links(),
            self.store.classifier(),
            table,
            self.filters.link_filter(table),
        )
        .0
    }

    pub fn current_issues(&self) -> Vec<Arc<Issue>> {
        issue_view(self.store.issues(), self.filters.severity).0
    }

    fn refresh_urls(&mut self, incremental: bool) {
        let views = url_views(
            self.store.resources(),
            self.store.classifier(),
            self.filters.global,
        );
        for table in UrlTable::ALL {
            let Some(engine) = self.urls[table.index()].as_mut() else {
                continue;
            };
            let view = views.table(table);
            if incremental && view.len() >= engine.len() {
                let tail = view[engine.len()..].to_vec();
                engine.append_data(tail);
            } else {
                engine.set_data(view.to_vec());
            }
        }
        self.url_counts = views.counts;
    }

    fn drive_links(&mut self, table: LinkTable) {
        let tab = Tab::from(table);
        if self.tabs.is_visible(tab) {
            let view = link_view(
                self.store.links(),
                self.store.classifier(),
                table,
                self.filters.link_filter(table),
            );
            self.show_links(table, view);
        } else {
            self.tabs
                .park(tab, Pending::Links(self.store.links().to_vec()));
        }
    }

    fn show_links(&mut self, table: LinkTable, (rows, counts): (Vec<Arc<Link>>, LinkTableCounts)) {
        self.link_counts[table.index()] = counts;
        if let Some(engine) = self.links[table.index()].as_mut() {
            engine.set_data(rows);
        }
    }

    fn drive_issues(&mut self) {
        if self.tabs.is_visible(Tab::Issues) {
            let view = issue_view(self.store.issues(), self.filters.severity);
            self.show_issues(view);
        } else {
            self.issue_counts = issue_counts(self.store.issues(), self.filters.severity);
            self.tabs
                .park(Tab::Issues, Pending::Issues(self.store.issues().to_vec()));
        }
    }

    fn show_issues(&mut self, (rows, counts): (Vec<Arc<Issue>>, IssueCounts)) {
        self.issue_counts = counts;
        if let Some(engine) = self.issues.as_mut() {
            engine.set_data(rows);
        }
    }
}

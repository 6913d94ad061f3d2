//! Which table is on screen, and what the hidden ones are waiting to show.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use super::filter::{LinkTable, UrlTable};
use super::model::{Issue, Link};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Tab {
    #[default]
    Overview,
    InternalUrls,
    ExternalUrls,
    InternalLinks,
    ExternalLinks,
    Issues,
}

impl Tab {
    pub const ALL: [Tab; 6] = [
        Tab::Overview,
        Tab::InternalUrls,
        Tab::ExternalUrls,
        Tab::InternalLinks,
        Tab::ExternalLinks,
        Tab::Issues,
    ];

    pub fn as_index(self) -> usize {
        self as usize
    }

    pub fn title(self) -> &'static str {
        match self {
            Tab::Overview => "Overview",
            Tab::InternalUrls => "Internal",
            Tab::ExternalUrls => "External",
            Tab::InternalLinks => "Int. links",
            Tab::ExternalLinks => "Ext. links",
            Tab::Issues => "Issues",
        }
    }

    pub fn hotkey(self) -> char {
        match self {
            Tab::Overview => '1',
            Tab::InternalUrls => '2',
            Tab::ExternalUrls => '3',
            Tab::InternalLinks => '4',
            Tab::ExternalLinks => '5',
            Tab::Issues => '6',
        }
    }

    pub fn from_hotkey(ch: char) -> Option<Self> {
        Self::ALL.into_iter().find(|tab| tab.hotkey() == ch)
    }

    pub fn next(self) -> Self {
        Self::ALL[(self.as_index() + 1) % Self::ALL.len()]
    }

    pub fn prev(self) -> Self {
        Self::ALL[(self.as_index() + Self::ALL.len() - 1) % Self::ALL.len()]
    }

    /// Link and issue tables only materialize while on screen.
    pub fn is_deferred(self) -> bool {
        matches!(self, Tab::InternalLinks | Tab::ExternalLinks | Tab::Issues)
    }

    pub fn url_table(self) -> Option<UrlTable> {
        match self {
            Tab::Overview => Some(UrlTable::Overview),
            Tab::InternalUrls => Some(UrlTable::Internal),
            Tab::ExternalUrls => Some(UrlTable::External),
            _ => None,
        }
    }

    pub fn link_table(self) -> Option<LinkTable> {
        match self {
            Tab::InternalLinks => Some(LinkTable::Internal),
            Tab::ExternalLinks => Some(LinkTable::External),
            _ => None,
        }
    }
}

impl From<UrlTable> for Tab {
    fn from(table: UrlTable) -> Self {
        match table {
            UrlTable::Overview => Tab::Overview,
            UrlTable::Internal => Tab::InternalUrls,
            UrlTable::External => Tab::ExternalUrls,
        }
    }
}

impl From<LinkTable> for Tab {
    fn from(table: LinkTable) -> Self {
        match table {
            LinkTable::Internal => Tab::InternalLinks,
            LinkTable::External => Tab::ExternalLinks,
        }
    }
}

/// Latest canonical snapshot a hidden table has not rendered yet.
#[derive(Debug, Clone)]
pub enum Pending {
    Links(Vec<Arc<Link>>),
    Issues(Vec<Arc<Issue>>),
}

#[derive(Debug, Default)]
pub struct TabController {
    active: Tab,
    parked: HashMap<Tab, Pending>,
}

impl TabController {
    pub fn active(&self) -> Tab {
        self.active
    }

    /// URL tables are always treated as visible; they are cheap to keep current.
    pub fn is_visible(&self, tab: Tab) -> bool {
        !tab.is_deferred() || tab == self.active
    }

    pub fn is_parked(&self, tab: Tab) -> bool {
        self.parked.contains_key(&tab)
    }

    pub fn park(&mut self, tab: Tab, pending: Pending) {
        debug!(tab = tab.title(), "parked update for hidden table");
        self.parked.insert(tab, pending);
    }

    /// Switches tabs and hands back the parked snapshot for the new tab, once.
    pub fn activate(&mut self, tab: Tab) -> Option<Pending> {
        self.active = tab;
        self.parked.remove(&tab)
    }

    pub fn clear(&mut self) {
        self.parked.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn issue(url: &str) -> Arc<Issue> {
        Arc::new(Issue {
            url: url.to_string(),
            ..Issue::default()
        })
    }

    #[test]
    fn only_the_active_deferred_tab_is_visible() {
        let mut tabs = TabController::default();
        assert!(tabs.is_visible(Tab::Overview));
        assert!(tabs.is_visible(Tab::ExternalUrls));
        assert!(!tabs.is_visible(Tab::Issues));
        tabs.activate(Tab::Issues);
        assert!(tabs.is_visible(Tab::Issues));
        assert!(!tabs.is_visible(Tab::InternalLinks));
        assert!(tabs.is_visible(Tab::Overview));
    }

    #[test]
    fn latest_parked_snapshot_wins_and_flushes_once() {
        let mut tabs = TabController::default();
        tabs.park(Tab::Issues, Pending::Issues(vec![issue("a")]));
        tabs.park(Tab::Issues, Pending::Issues(vec![issue("b"), issue("c")]));
        assert!(tabs.is_parked(Tab::Issues));

        match tabs.activate(Tab::Issues) {
            Some(Pending::Issues(list)) => assert_eq!(list.len(), 2),
            other => panic!("unexpected {other:?}"),
        }
        assert!(!tabs.is_parked(Tab::Issues));
        assert!(tabs.activate(Tab::Overview).is_none());
        assert!(tabs.activate(Tab::Issues).is_none());
    }

    #[test]
    fn hotkeys_and_cycling() {
        assert_eq!(Tab::from_hotkey('4'), Some(Tab::InternalLinks));
        assert_eq!(Tab::from_hotkey('9'), None);
        assert_eq!(Tab::Issues.next(), Tab::Overview);
        assert_eq!(Tab::Overview.prev(), Tab::Issues);
        for tab in Tab::ALL {
            if let Some(table) = tab.url_table() {
                assert_eq!(Tab::from(table), tab);
            }
            if let Some(table) = tab.link_table() {
                assert_eq!(Tab::from(table), tab);
            }
        }
    }
}

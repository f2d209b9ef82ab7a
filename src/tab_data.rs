/// Data structures for the Tab Log
use crate::url_parts::parse_url;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

pub type TabId = i32;

/// A tab as reported by the browser
///
/// Update events may carry only some of these fields; absent ones stay `None`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TabInfo {
    pub id: TabId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fav_icon_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window_id: Option<i32>,
    #[serde(default)]
    pub active: bool,
}

impl TabInfo {
    pub fn new(id: TabId, url: &str, title: &str, index: i32, window_id: i32) -> TabInfo {
        TabInfo {
            id,
            fav_icon_url: None,
            index: Some(index),
            status: Some("complete".to_string()),
            title: Some(title.to_string()),
            url: Some(url.to_string()),
            window_id: Some(window_id),
            active: false,
        }
    }

    pub fn url_or_empty(&self) -> &str {
        self.url.as_deref().unwrap_or_default()
    }

    pub fn is_complete(&self) -> bool {
        self.status.as_deref() == Some("complete")
    }
}

/// A browser window with its tabs populated
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WindowInfo {
    pub id: i32,
    #[serde(default)]
    pub tabs: Option<Vec<TabInfo>>,
}

/// The durable record kept for one live tab
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TabRecord {
    pub id: TabId,
    pub fav_icon_url: Option<String>,
    pub index: Option<i32>,
    pub status: Option<String>,
    pub title: Option<String>,
    pub url: Option<String>,
    pub window_id: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opener_tab_id: Option<TabId>,
    pub domain: String,
    pub directory: String,
}

impl TabRecord {
    pub fn from_tab(tab: &TabInfo) -> TabRecord {
        let mut record = TabRecord {
            id: tab.id,
            ..TabRecord::default()
        };
        record.merge(tab);
        record
    }

    /// Overwrite every tracked field that is present in `tab`
    pub fn merge(&mut self, tab: &TabInfo) {
        self.id = tab.id;

        if let Some(fav_icon_url) = &tab.fav_icon_url {
            self.fav_icon_url = Some(fav_icon_url.clone());
        }
        if let Some(index) = tab.index {
            self.index = Some(index);
        }
        if let Some(status) = &tab.status {
            self.status = Some(status.clone());
        }
        if let Some(title) = &tab.title {
            self.title = Some(title.clone());
        }
        if let Some(window_id) = tab.window_id {
            self.window_id = Some(window_id);
        }
        if let Some(url) = &tab.url {
            if self.url.as_ref() != Some(url) || self.domain.is_empty() {
                let parsed = parse_url(url);
                self.domain = parsed.domain;
                self.directory = parsed.directory;
            }
            self.url = Some(url.clone());
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Align {
    Left,
    Right,
}

/// Tabs removed in one bulk operation, kept for undo
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemovalLog {
    pub align: Align,
    pub tabs: Vec<TabRecord>,
}

/// Everything logged for one tab id
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TabLogEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub info: Option<TabRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remove: Option<RemovalLog>,
}

impl TabLogEntry {
    fn is_empty(&self) -> bool {
        self.info.is_none() && self.remove.is_none()
    }
}

/// Sub-keys of a Tab Log entry that can be deleted on their own
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TabLogField {
    Info,
    Remove,
}

/// In-memory record set, one entry per live tab
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TabLog {
    entries: BTreeMap<TabId, TabLogEntry>,
}

impl TabLog {
    pub fn new() -> Self {
        TabLog::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn tab_ids(&self) -> Vec<TabId> {
        self.entries.keys().copied().collect()
    }

    pub fn entry(&self, tab_id: TabId) -> Option<&TabLogEntry> {
        self.entries.get(&tab_id)
    }

    pub fn info(&self, tab_id: TabId) -> Option<&TabRecord> {
        self.entries.get(&tab_id).and_then(|entry| entry.info.as_ref())
    }

    pub fn removal(&self, tab_id: TabId) -> Option<&RemovalLog> {
        self.entries.get(&tab_id).and_then(|entry| entry.remove.as_ref())
    }

    /// Merge `tab` into the existing record for its id without storing it
    pub fn merged_info(&self, tab: &TabInfo) -> TabRecord {
        match self.info(tab.id) {
            Some(existing) => {
                let mut record = existing.clone();
                record.merge(tab);
                record
            }
            None => TabRecord::from_tab(tab),
        }
    }

    /// Merge `tab` into the log and return the stored record
    pub fn merge_tab_info(&mut self, tab: &TabInfo) -> TabRecord {
        let record = self.merged_info(tab);
        self.set_info(record.clone());
        record
    }

    pub fn set_info(&mut self, record: TabRecord) {
        let id = record.id;
        self.entries.entry(id).or_default().info = Some(record);
    }

    /// Record a removal for `tab_id`, replacing any pending one
    pub fn set_removal(&mut self, tab_id: TabId, log: RemovalLog) {
        self.entries.entry(tab_id).or_default().remove = Some(log);
    }

    /// Remove and return the pending removal for `tab_id`
    pub fn take_removal(&mut self, tab_id: TabId) -> Option<RemovalLog> {
        let entry = self.entries.get_mut(&tab_id)?;
        let log = entry.remove.take();

        if entry.is_empty() {
            self.entries.remove(&tab_id);
        }

        log
    }

    /// Delete a whole entry, or only one field of it
    ///
    /// Returns `true` when something was removed.
    pub fn delete(&mut self, tab_id: TabId, field: Option<TabLogField>) -> bool {
        let Some(field) = field else {
            return self.entries.remove(&tab_id).is_some();
        };

        let Some(entry) = self.entries.get_mut(&tab_id) else {
            return false;
        };

        let removed = match field {
            TabLogField::Info => entry.info.take().is_some(),
            TabLogField::Remove => entry.remove.take().is_some(),
        };

        if entry.is_empty() {
            self.entries.remove(&tab_id);
        }

        removed
    }

    /// Drop entries for tabs that are gone, then merge every live tab
    ///
    /// Returns the ids that were dropped.
    pub fn reconcile(&mut self, live_tabs: &[TabInfo]) -> Vec<TabId> {
        let live_ids: HashSet<TabId> = live_tabs.iter().map(|tab| tab.id).collect();

        let stale: Vec<TabId> = self
            .entries
            .keys()
            .filter(|id| !live_ids.contains(id))
            .copied()
            .collect();

        for tab_id in &stale {
            self.entries.remove(tab_id);
        }

        for tab in live_tabs {
            self.merge_tab_info(tab);
        }

        stale
    }
}

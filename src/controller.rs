/// Background controller: reacts to browser events and agent requests
use crate::config::Config;
use crate::error::{LinkBlankerError, Result};
use crate::host::{Badge, BrowserHost, CreateTabProperties, KeyValueStore};
use crate::image_cache::ImageCache;
use crate::messages::{AgentMessage, OpenTabParams, PortMessage, RuntimeMessage, TabStatus};
use crate::operations::{OpenCursor, plan_removal, undo_index};
use crate::preferences::{PreferencePatch, PreferenceView, Preferences, migrate_legacy};
use crate::tab_data::{Align, RemovalLog, TabId, TabInfo, TabLog, TabLogField, TabRecord};
use crate::url_parts::{ParsedUrl, parse_url};
use log::{debug, info, warn};
use serde::Deserialize;
use std::cell::{Cell, RefCell};

/// Tab and window lifecycle events forwarded from the browser
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum TabEvent {
    Created { tab: TabInfo },
    #[serde(rename_all = "camelCase")]
    Updated { tab_id: TabId, tab: TabInfo },
    #[serde(rename_all = "camelCase")]
    Removed { tab_id: TabId },
    Attached,
    Detached,
    Moved,
    Activated,
    Highlighted,
    #[serde(rename_all = "camelCase")]
    Replaced { added_tab_id: TabId, removed_tab_id: TabId },
}

/// The extension's background state and the operations over it
pub struct LinkBlanker<H: BrowserHost> {
    host: H,
    config: Config,
    persistent: Box<dyn KeyValueStore>,
    preferences: RefCell<Preferences>,
    tab_log: RefCell<TabLog>,
    images: ImageCache,
    open_cursor: Cell<OpenCursor>,
    extension_url: String,
}

impl<H: BrowserHost> LinkBlanker<H> {
    /// Build the controller, migrating legacy preference keys first
    pub fn new(
        host: H,
        persistent: Box<dyn KeyValueStore>,
        ephemeral: Box<dyn KeyValueStore>,
        config: Config,
    ) -> Self {
        migrate_legacy(persistent.as_ref());

        let preferences = Preferences::load(persistent.as_ref());
        let extension_url = host.extension_url();
        let images = ImageCache::new(ephemeral, extension_url.clone(), config.fetch_timeout_ms);

        LinkBlanker {
            host,
            config,
            persistent,
            preferences: RefCell::new(preferences),
            tab_log: RefCell::new(TabLog::new()),
            images,
            open_cursor: Cell::new(OpenCursor::default()),
            extension_url,
        }
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn preferences(&self) -> Preferences {
        self.preferences.borrow().clone()
    }

    pub fn tab_log(&self) -> TabLog {
        self.tab_log.borrow().clone()
    }

    /// Load every live tab into the log and push status to all of them
    pub async fn initialize(&self) {
        self.set_all_tab_info().await;
        self.update_tab_status_all().await;
        info!("Background controller ready, {} tabs tracked", self.tab_log.borrow().len());
    }

    pub fn is_enabled(&self, url: &str) -> bool {
        self.preferences.borrow().is_enabled(&parse_url(url), &self.extension_url)
    }

    pub async fn handle_tab_event(&self, event: TabEvent) {
        match event {
            TabEvent::Created { tab } => {
                self.merge_and_log(&tab);
            }
            TabEvent::Updated { tab_id, tab } => {
                self.on_updated(tab_id, tab).await;
            }
            TabEvent::Removed { tab_id } => {
                self.delete_tab_log(tab_id, None);
            }
            TabEvent::Attached
            | TabEvent::Detached
            | TabEvent::Moved
            | TabEvent::Activated
            | TabEvent::Highlighted => {
                self.reset_open_cursor();
                self.set_all_tab_info().await;
            }
            TabEvent::Replaced {
                added_tab_id,
                removed_tab_id,
            } => {
                self.delete_tab_log(removed_tab_id, None);
                self.on_replaced(added_tab_id).await;
            }
        }
    }

    /// Dispatch a request an agent posted on one of its ports
    pub async fn handle_port_message(&self, message: PortMessage) -> Result<()> {
        match message {
            PortMessage::OpenTab(params) => self.open_tab(params).await.map(|_| ()),
            PortMessage::RemoveTabs { align } => self.remove_tabs(align).await.map(|_| ()),
            PortMessage::UndoRemoveTabs => self.undo_remove_tabs().await.map(|_| ()),
            PortMessage::ToggleEnabled => self.toggle_enabled().await,
        }
    }

    async fn on_updated(&self, tab_id: TabId, tab: TabInfo) {
        let merged = self.tab_log.borrow().merged_info(&tab);
        self.set_tab_info(TabRecord { id: tab_id, ..merged });

        if let Err(e) = self.update_tab_status(&tab).await {
            debug!("Skipping status update for tab {}: {}", tab_id, e);
        }
    }

    /// Wait for a replacement tab to finish loading, then treat it as updated
    async fn on_replaced(&self, tab_id: TabId) {
        let interval = self.config.replace_poll_interval_ms.max(1);
        let mut waited = 0;

        let mut tab = loop {
            self.host.sleep(interval).await;

            let tab = match self.host.get_tab(tab_id).await {
                Ok(tab) => tab,
                Err(e) => {
                    debug!("Replaced tab {} is gone: {}", tab_id, e);
                    return;
                }
            };

            waited += interval;
            if tab.is_complete() || waited >= self.config.replace_poll_timeout_ms {
                break tab;
            }
        };

        tab.status = Some("complete".to_string());
        self.on_updated(tab_id, tab).await;
    }

    /// Every tab of every normal window, re-fetched; vanished tabs are dropped
    pub async fn get_all_tabs(&self) -> Result<Vec<TabInfo>> {
        let windows = self.host.normal_windows().await?;

        let mut listed = Vec::new();
        for window in windows {
            let tabs = window.tabs.ok_or(LinkBlankerError::WindowWithoutTabs(window.id))?;
            listed.extend(tabs);
        }

        let mut tabs = Vec::with_capacity(listed.len());
        for tab in listed {
            match self.host.get_tab(tab.id).await {
                Ok(fresh) => tabs.push(fresh),
                Err(e) => debug!("Tab {} vanished during enumeration: {}", tab.id, e),
            }
        }

        Ok(tabs)
    }

    pub async fn current_tab(&self) -> Result<TabInfo> {
        let window = self.host.current_window().await?;
        let tabs = self.host.active_tabs(window.id).await?;
        tabs.into_iter().next().ok_or(LinkBlankerError::NoActiveTab)
    }

    pub async fn current_data(&self) -> Result<ParsedUrl> {
        let tab = self.current_tab().await?;
        Ok(parse_url(tab.url_or_empty()))
    }

    /// Reconcile the Tab Log with the browser's live tabs
    pub async fn set_all_tab_info(&self) {
        let tabs = match self.get_all_tabs().await {
            Ok(tabs) => tabs,
            Err(e) => {
                warn!("Could not enumerate tabs: {}", e);
                return;
            }
        };

        let dropped = self.tab_log.borrow_mut().reconcile(&tabs);
        if !dropped.is_empty() {
            debug!("Dropped closed tabs from log: {:?}", dropped);
            self.broadcast_tab_log(false);
        }
        self.broadcast_tab_log(true);
    }

    fn merge_and_log(&self, tab: &TabInfo) -> TabRecord {
        let record = self.tab_log.borrow_mut().merge_tab_info(tab);
        self.broadcast_tab_log(true);
        record
    }

    fn set_tab_info(&self, record: TabRecord) {
        self.tab_log.borrow_mut().set_info(record);
        self.broadcast_tab_log(true);
    }

    pub fn delete_tab_log(&self, tab_id: TabId, field: Option<TabLogField>) {
        self.tab_log.borrow_mut().delete(tab_id, field);
        self.broadcast_tab_log(false);
    }

    fn broadcast_tab_log(&self, saved: bool) {
        let log = self.tab_log.borrow();
        let message = if saved {
            RuntimeMessage::SavedTabLog { data: &log }
        } else {
            RuntimeMessage::DeletedTabLog { data: &log }
        };
        self.host.broadcast(&message);
    }

    fn reset_open_cursor(&self) {
        let mut cursor = self.open_cursor.get();
        cursor.reset();
        self.open_cursor.set(cursor);
    }

    fn tab_status(&self, url: &str) -> TabStatus {
        let prefs = self.preferences.borrow();
        let parse = parse_url(url);
        let enabled = prefs.is_enabled(&parse, &self.extension_url);

        TabStatus {
            parse,
            enabled,
            is_background: prefs.enabled_background_open && prefs.enabled_extension,
            multi_click_close: prefs.enabled_multiclick_close,
            shortcut_key_toggle_enabled: prefs.shortcut_key_toggle_enabled.clone(),
            disabled_same_domain: prefs.disabled_same_domain,
        }
    }

    /// Push the current status to one tab's agent and refresh its badge
    pub async fn update_tab_status(&self, tab: &TabInfo) -> Result<()> {
        let enabled = self.is_enabled(tab.url_or_empty());
        let fresh = self.host.get_tab(tab.id).await?;

        let mut status = self.tab_status(fresh.url_or_empty());
        status.enabled = enabled;

        self.host
            .send_to_tab(fresh.id, &AgentMessage::UpdateTabStatus(status))
            .await?;
        self.host.set_badge(fresh.id, &Badge::for_state(enabled));
        Ok(())
    }

    /// Push status to every live tab, skipping tabs that closed meanwhile
    pub async fn update_tab_status_all(&self) {
        let tabs = match self.get_all_tabs().await {
            Ok(tabs) => tabs,
            Err(e) => {
                warn!("Failed to update the status of all tabs: {}", e);
                return;
            }
        };

        for tab in &tabs {
            if let Err(e) = self.update_tab_status(tab).await {
                debug!("Skipping status update for tab {}: {}", tab.id, e);
            }
        }
    }

    /// Apply a preference patch, persist it and push the result everywhere
    ///
    /// Without an active tab the tab-relative toggles are dropped; the rest of
    /// the patch is still saved.
    pub async fn save(&self, patch: PreferencePatch) -> Result<()> {
        let current = if patch.needs_current_tab() {
            match self.current_data().await {
                Ok(parsed) => Some(parsed),
                Err(e) => {
                    debug!("Saving without tab context: {}", e);
                    None
                }
            }
        } else {
            None
        };

        {
            let mut prefs = self.preferences.borrow_mut();
            let written = prefs.apply(&patch, current.as_ref());
            prefs.persist(self.persistent.as_ref(), &written);
        }

        {
            let prefs = self.preferences.borrow();
            self.host.broadcast(&RuntimeMessage::UpdatedData { data: &prefs });
        }

        self.update_tab_status_all().await;
        Ok(())
    }

    pub async fn toggle_enabled(&self) -> Result<()> {
        let enabled = self.preferences.borrow().enabled_extension;
        self.save(PreferencePatch {
            enabled_extension: Some(!enabled),
            ..PreferencePatch::default()
        })
        .await
    }

    /// Preferences as the popup shows them for the current tab
    pub async fn preference_view(&self) -> Result<PreferenceView> {
        let current = self.current_data().await?;
        Ok(self.preferences.borrow().view(&current, &self.extension_url))
    }

    /// Open a link in a new tab next to the current one
    pub async fn open_tab(&self, params: OpenTabParams) -> Result<TabRecord> {
        let current = self.current_tab().await?;

        let mut cursor = self.open_cursor.get();
        let index = cursor.next_index(params.index, current.index.unwrap_or(0));
        self.open_cursor.set(cursor);

        let created = self
            .host
            .create_tab(CreateTabProperties {
                index,
                url: params.url,
                active: params.active,
            })
            .await?;

        let mut record = TabRecord::from_tab(&created);
        record.opener_tab_id = Some(current.id);
        self.set_tab_info(record.clone());
        Ok(record)
    }

    /// Close every tab beyond the active one in `align` direction
    ///
    /// Returns how many tabs were removed.
    pub async fn remove_tabs(&self, align: Align) -> Result<usize> {
        let window = self.host.current_window().await?;
        let tabs = window.tabs.unwrap_or_default();

        let Some(plan) = plan_removal(&tabs, align) else {
            debug!("No active tab in window {}", window.id);
            return Ok(0);
        };

        if plan.candidates.is_empty() {
            return Ok(0);
        }

        let removed: Vec<TabRecord> = plan.candidates.iter().map(TabRecord::from_tab).collect();
        let ids: Vec<TabId> = removed.iter().map(|record| record.id).collect();
        let count = removed.len();

        self.tab_log.borrow_mut().set_removal(
            plan.active.id,
            RemovalLog {
                align,
                tabs: removed,
            },
        );
        self.broadcast_tab_log(true);

        self.host.remove_tabs(&ids).await?;
        self.host
            .send_to_tab(
                plan.active.id,
                &AgentMessage::RemoveTabs {
                    align,
                    remove_tabs_length: count,
                },
            )
            .await?;

        info!("Removed {} tabs {:?} of tab {}", count, align, plan.active.id);
        Ok(count)
    }

    /// Reopen the tabs logged by the last removal from the current tab
    ///
    /// Returns how many tabs were reopened; zero when nothing was logged.
    pub async fn undo_remove_tabs(&self) -> Result<usize> {
        let tab = self.current_tab().await?;
        let tab = self.host.get_tab(tab.id).await?;

        // Taken before the first await so a second undo finds nothing
        let Some(log) = self.tab_log.borrow_mut().take_removal(tab.id) else {
            return Ok(0);
        };
        self.broadcast_tab_log(false);

        let active_index = tab.index.unwrap_or(0);
        for (offset, removed) in log.tabs.iter().enumerate() {
            let params = OpenTabParams {
                url: removed.url.clone().unwrap_or_default(),
                active: false,
                index: Some(undo_index(log.align, active_index, offset)),
            };

            if let Err(e) = self.open_tab(params).await {
                warn!("Failed to reopen {:?}: {}", removed.url, e);
            }
        }

        Ok(log.tabs.len())
    }

    pub async fn fetch_image(&self, url: &str, guide_url: Option<&str>) -> Result<String> {
        Ok(self.images.fetch_image(&self.host, url, guide_url).await?)
    }
}

/// In-memory browser used by the unit tests
use crate::error::HostError;
use crate::host::{Badge, BrowserHost, CreateTabProperties, FetchResponse, ImageFetcher};
use crate::messages::{AgentMessage, RuntimeMessage};
use crate::tab_data::{TabId, TabInfo, WindowInfo};
use serde_json::Value;
use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

pub const EXTENSION_URL: &str = "chrome-extension://linkblanker/";

/// Returns `Pending` once so other futures on the same executor get polled
pub struct YieldNow(pub bool);

impl Future for YieldNow {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        if self.0 {
            return Poll::Ready(());
        }
        self.0 = true;
        cx.waker().wake_by_ref();
        Poll::Pending
    }
}

#[derive(Default)]
pub struct FakeFetcher {
    responses: HashMap<String, FetchResponse>,
    calls: Cell<usize>,
}

impl FakeFetcher {
    pub fn new() -> Self {
        FakeFetcher::default()
    }

    pub fn respond(mut self, url: &str, status: u16, body: &[u8]) -> Self {
        self.responses.insert(
            url.to_string(),
            FetchResponse {
                status,
                body: body.to_vec(),
            },
        );
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.get()
    }
}

impl ImageFetcher for FakeFetcher {
    async fn fetch(&self, url: &str, _timeout_ms: u32) -> Result<FetchResponse, HostError> {
        self.calls.set(self.calls.get() + 1);
        YieldNow(false).await;

        self.responses
            .get(url)
            .cloned()
            .ok_or_else(|| HostError::Runtime(format!("net::ERR_CONNECTION_REFUSED {url}")))
    }

    fn now_millis(&self) -> f64 {
        1_700_000_000_000.0
    }
}

#[derive(Default)]
pub struct BrowserState {
    pub windows: Vec<WindowInfo>,
    pub current_window: i32,
    pub next_tab_id: TabId,
    /// Listed in windows but already closed when fetched individually
    pub vanished: HashSet<TabId>,
    /// Remaining polls for which a tab still reports `loading`
    pub loading_polls: HashMap<TabId, u32>,
    pub sent: Vec<(TabId, AgentMessage)>,
    pub broadcasts: Vec<Value>,
    pub badges: Vec<(TabId, Badge)>,
    pub created: Vec<CreateTabProperties>,
    pub removed: Vec<TabId>,
    pub slept_ms: u32,
}

impl BrowserState {
    fn window_mut(&mut self, window_id: i32) -> Option<&mut Vec<TabInfo>> {
        self.windows
            .iter_mut()
            .find(|window| window.id == window_id)
            .and_then(|window| window.tabs.as_mut())
    }

    fn find_tab(&self, tab_id: TabId) -> Option<&TabInfo> {
        self.windows
            .iter()
            .filter_map(|window| window.tabs.as_ref())
            .flatten()
            .find(|tab| tab.id == tab_id)
    }
}

fn reindex(tabs: &mut [TabInfo]) {
    for (index, tab) in tabs.iter_mut().enumerate() {
        tab.index = Some(index as i32);
    }
}

pub struct FakeHost {
    pub state: RefCell<BrowserState>,
    pub fetcher: FakeFetcher,
}

impl FakeHost {
    /// One normal window (id 1) holding `urls` in order, with `active` focused
    pub fn with_tabs(urls: &[&str], active: usize) -> FakeHost {
        let tabs: Vec<TabInfo> = urls
            .iter()
            .enumerate()
            .map(|(i, url)| TabInfo {
                active: i == active,
                ..TabInfo::new(100 + i as TabId, url, &format!("Tab {i}"), i as i32, 1)
            })
            .collect();

        FakeHost {
            state: RefCell::new(BrowserState {
                windows: vec![WindowInfo { id: 1, tabs: Some(tabs) }],
                current_window: 1,
                next_tab_id: 500,
                ..BrowserState::default()
            }),
            fetcher: FakeFetcher::new(),
        }
    }

    pub fn tab_urls(&self) -> Vec<String> {
        let state = self.state.borrow();
        state
            .windows
            .iter()
            .filter_map(|window| window.tabs.as_ref())
            .flatten()
            .map(|tab| tab.url_or_empty().to_string())
            .collect()
    }

    pub fn sent(&self) -> Vec<(TabId, AgentMessage)> {
        self.state.borrow().sent.clone()
    }

    pub fn broadcast_names(&self) -> Vec<String> {
        self.state
            .borrow()
            .broadcasts
            .iter()
            .filter_map(|message| message["name"].as_str().map(str::to_string))
            .collect()
    }

    pub fn clear_records(&self) {
        let mut state = self.state.borrow_mut();
        state.sent.clear();
        state.broadcasts.clear();
        state.badges.clear();
        state.created.clear();
    }
}

impl ImageFetcher for FakeHost {
    async fn fetch(&self, url: &str, timeout_ms: u32) -> Result<FetchResponse, HostError> {
        self.fetcher.fetch(url, timeout_ms).await
    }

    fn now_millis(&self) -> f64 {
        self.fetcher.now_millis()
    }
}

impl BrowserHost for FakeHost {
    async fn normal_windows(&self) -> Result<Vec<WindowInfo>, HostError> {
        Ok(self.state.borrow().windows.clone())
    }

    async fn current_window(&self) -> Result<WindowInfo, HostError> {
        let state = self.state.borrow();
        state
            .windows
            .iter()
            .find(|window| window.id == state.current_window)
            .cloned()
            .ok_or_else(|| HostError::Runtime("no current window".to_string()))
    }

    async fn get_tab(&self, tab_id: TabId) -> Result<TabInfo, HostError> {
        let mut state = self.state.borrow_mut();

        if state.vanished.contains(&tab_id) {
            return Err(HostError::NoTab(tab_id));
        }

        let mut tab = state.find_tab(tab_id).cloned().ok_or(HostError::NoTab(tab_id))?;

        if let Some(remaining) = state.loading_polls.get_mut(&tab_id) {
            if *remaining > 0 {
                *remaining -= 1;
                tab.status = Some("loading".to_string());
            }
        }

        Ok(tab)
    }

    async fn active_tabs(&self, window_id: i32) -> Result<Vec<TabInfo>, HostError> {
        let state = self.state.borrow();
        let window = state
            .windows
            .iter()
            .find(|window| window.id == window_id)
            .ok_or_else(|| HostError::Runtime(format!("no window {window_id}")))?;

        Ok(window.tabs.iter().flatten().filter(|tab| tab.active).cloned().collect())
    }

    async fn create_tab(&self, properties: CreateTabProperties) -> Result<TabInfo, HostError> {
        YieldNow(false).await;

        let mut state = self.state.borrow_mut();
        let id = state.next_tab_id;
        state.next_tab_id += 1;
        state.created.push(properties.clone());

        let window_id = state.current_window;
        let tabs = state
            .window_mut(window_id)
            .ok_or_else(|| HostError::Runtime("no current window".to_string()))?;

        let index = (properties.index.max(0) as usize).min(tabs.len());
        let mut tab = TabInfo::new(id, &properties.url, "", index as i32, window_id);
        tab.status = Some("loading".to_string());
        tab.active = properties.active;
        tabs.insert(index, tab);
        reindex(tabs);

        Ok(tabs[index].clone())
    }

    async fn remove_tabs(&self, tab_ids: &[TabId]) -> Result<(), HostError> {
        let mut state = self.state.borrow_mut();
        state.removed.extend_from_slice(tab_ids);

        for window in state.windows.iter_mut() {
            if let Some(tabs) = window.tabs.as_mut() {
                tabs.retain(|tab| !tab_ids.contains(&tab.id));
                reindex(tabs);
            }
        }
        Ok(())
    }

    async fn send_to_tab(&self, tab_id: TabId, message: &AgentMessage) -> Result<(), HostError> {
        let mut state = self.state.borrow_mut();
        if state.find_tab(tab_id).is_none() {
            return Err(HostError::NoTab(tab_id));
        }
        state.sent.push((tab_id, message.clone()));
        Ok(())
    }

    fn broadcast(&self, message: &RuntimeMessage<'_>) {
        if let Ok(value) = serde_json::to_value(message) {
            self.state.borrow_mut().broadcasts.push(value);
        }
    }

    fn set_badge(&self, tab_id: TabId, badge: &Badge) {
        self.state.borrow_mut().badges.push((tab_id, badge.clone()));
    }

    fn extension_url(&self) -> String {
        EXTENSION_URL.to_string()
    }

    async fn sleep(&self, millis: u32) {
        self.state.borrow_mut().slept_ms += millis;
    }
}

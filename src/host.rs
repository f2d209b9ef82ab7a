/// Seams to the host browser: tabs, windows, messaging, storage and network
use crate::error::HostError;
use crate::messages::{AgentMessage, RuntimeMessage};
use crate::tab_data::{TabId, TabInfo, WindowInfo};
use serde::Serialize;
use serde_json::Value;
use std::cell::RefCell;
use std::collections::HashMap;

/// Properties for a tab opened by the controller
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CreateTabProperties {
    pub index: i32,
    pub url: String,
    pub active: bool,
}

/// Toolbar badge and icon for one tab
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Badge {
    pub text: &'static str,
    pub color: [u8; 4],
    pub icon_path: &'static str,
}

impl Badge {
    pub fn for_state(enabled: bool) -> Badge {
        if enabled {
            Badge {
                text: " ON ",
                color: [48, 201, 221, 128],
                icon_path: "img/icon32.png",
            }
        } else {
            Badge {
                text: "OFF",
                color: [0, 0, 0, 64],
                icon_path: "img/icon32-disabled.png",
            }
        }
    }
}

/// Raw network response handed to the image cache
#[derive(Debug, Clone, PartialEq)]
pub struct FetchResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

/// Network access and wall clock used by the image cache
#[allow(async_fn_in_trait)]
pub trait ImageFetcher {
    /// GET `url`; transport failures and timeouts are `Err`
    async fn fetch(&self, url: &str, timeout_ms: u32) -> Result<FetchResponse, HostError>;

    /// Milliseconds since the Unix epoch
    fn now_millis(&self) -> f64;
}

/// The browser extension APIs the controller drives
///
/// Everything here runs on the extension's single event loop, so futures are
/// not required to be `Send`.
#[allow(async_fn_in_trait)]
pub trait BrowserHost: ImageFetcher {
    /// Every normal window, with tabs populated
    async fn normal_windows(&self) -> Result<Vec<WindowInfo>, HostError>;

    /// The focused normal window, with tabs populated
    async fn current_window(&self) -> Result<WindowInfo, HostError>;

    async fn get_tab(&self, tab_id: TabId) -> Result<TabInfo, HostError>;

    async fn active_tabs(&self, window_id: i32) -> Result<Vec<TabInfo>, HostError>;

    async fn create_tab(&self, properties: CreateTabProperties) -> Result<TabInfo, HostError>;

    async fn remove_tabs(&self, tab_ids: &[TabId]) -> Result<(), HostError>;

    /// Deliver a message to the content-script agent of one tab
    async fn send_to_tab(&self, tab_id: TabId, message: &AgentMessage) -> Result<(), HostError>;

    /// Notify extension pages (popup, debug views)
    fn broadcast(&self, message: &RuntimeMessage<'_>);

    fn set_badge(&self, tab_id: TabId, badge: &Badge);

    /// Base URL of the extension's own pages, e.g. `chrome-extension://<id>/`
    fn extension_url(&self) -> String;

    async fn sleep(&self, millis: u32);
}

/// One key/value storage tier
pub trait KeyValueStore {
    fn get_item(&self, key: &str) -> Option<Value>;

    fn set_item(&self, key: &str, value: Value) -> Result<(), HostError>;

    fn remove_item(&self, key: &str);

    fn contains(&self, key: &str) -> bool {
        self.get_item(key).is_some()
    }
}

/// Storage tier held entirely in memory
#[derive(Debug, Default)]
pub struct MemoryStore {
    items: RefCell<HashMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }

    pub fn with_items<I, K>(items: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        MemoryStore {
            items: RefCell::new(items.into_iter().map(|(k, v)| (k.into(), v)).collect()),
        }
    }

    pub fn len(&self) -> usize {
        self.items.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.borrow().is_empty()
    }
}

impl KeyValueStore for MemoryStore {
    fn get_item(&self, key: &str) -> Option<Value> {
        self.items.borrow().get(key).cloned()
    }

    fn set_item(&self, key: &str, value: Value) -> Result<(), HostError> {
        self.items.borrow_mut().insert(key.to_string(), value);
        Ok(())
    }

    fn remove_item(&self, key: &str) {
        self.items.borrow_mut().remove(key);
    }
}

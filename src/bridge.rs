/// Host implementation over the chrome.* APIs exposed by background.js
use crate::error::HostError;
use crate::host::{Badge, BrowserHost, CreateTabProperties, FetchResponse, ImageFetcher, KeyValueStore};
use crate::messages::{AgentMessage, RuntimeMessage};
use crate::tab_data::{TabId, TabInfo, WindowInfo};
use log::warn;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use wasm_bindgen::prelude::*;

// Import JS bridge functions
#[wasm_bindgen(module = "/background.js")]
extern "C" {
    #[wasm_bindgen(catch)]
    async fn getNormalWindows() -> Result<JsValue, JsValue>;

    #[wasm_bindgen(catch)]
    async fn getCurrentWindow() -> Result<JsValue, JsValue>;

    #[wasm_bindgen(catch)]
    async fn getTab(tab_id: i32) -> Result<JsValue, JsValue>;

    #[wasm_bindgen(catch)]
    async fn queryActiveTabs(window_id: i32) -> Result<JsValue, JsValue>;

    #[wasm_bindgen(catch)]
    async fn createTab(properties: JsValue) -> Result<JsValue, JsValue>;

    #[wasm_bindgen(catch)]
    async fn removeTabs(tab_ids: JsValue) -> Result<JsValue, JsValue>;

    #[wasm_bindgen(catch)]
    async fn sendTabMessage(tab_id: i32, message: JsValue) -> Result<JsValue, JsValue>;

    #[wasm_bindgen(catch)]
    async fn fetchBytes(url: &str, timeout_ms: u32) -> Result<JsValue, JsValue>;

    #[wasm_bindgen(catch)]
    async fn sleep(millis: u32) -> Result<JsValue, JsValue>;

    fn sendRuntimeMessage(message: JsValue);

    fn setBadge(tab_id: i32, badge: JsValue);

    fn extensionUrl() -> String;

    fn storageGet(tier: &str, key: &str) -> JsValue;

    #[wasm_bindgen(catch)]
    fn storageSet(tier: &str, key: &str, value: JsValue) -> Result<(), JsValue>;

    fn storageRemove(tier: &str, key: &str);

    pub fn installListeners(on_tab_event: &js_sys::Function, on_port_message: &js_sys::Function);
}

fn runtime_error(e: JsValue) -> HostError {
    HostError::Runtime(e.as_string().unwrap_or_else(|| format!("{:?}", e)))
}

pub fn from_js<T: DeserializeOwned>(value: JsValue) -> Result<T, HostError> {
    serde_wasm_bindgen::from_value(value).map_err(|e| HostError::Conversion(format!("{:?}", e)))
}

/// Serialize with plain JS objects rather than `Map`s
pub fn to_js<T: Serialize + ?Sized>(value: &T) -> Result<JsValue, HostError> {
    value
        .serialize(&serde_wasm_bindgen::Serializer::json_compatible())
        .map_err(|e| HostError::Conversion(format!("{:?}", e)))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageTier {
    /// Survives restarts
    Persistent,
    /// May be evicted at any time
    Ephemeral,
}

impl StorageTier {
    fn as_str(self) -> &'static str {
        match self {
            StorageTier::Persistent => "persistence",
            StorageTier::Ephemeral => "ephemeral",
        }
    }
}

/// One storage tier backed by the background page's web storage
pub struct JsStore {
    tier: StorageTier,
}

impl JsStore {
    pub fn new(tier: StorageTier) -> Self {
        JsStore { tier }
    }
}

impl KeyValueStore for JsStore {
    fn get_item(&self, key: &str) -> Option<Value> {
        let value = storageGet(self.tier.as_str(), key);
        if value.is_null() || value.is_undefined() {
            return None;
        }

        match from_js(value) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("Unreadable {} value for {}: {}", self.tier.as_str(), key, e);
                None
            }
        }
    }

    fn set_item(&self, key: &str, value: Value) -> Result<(), HostError> {
        let value = to_js(&value)?;
        storageSet(self.tier.as_str(), key, value).map_err(|e| HostError::Storage(format!("{:?}", e)))
    }

    fn remove_item(&self, key: &str) {
        storageRemove(self.tier.as_str(), key);
    }
}

/// The real browser, reached through background.js
#[derive(Debug, Default)]
pub struct JsHost;

impl ImageFetcher for JsHost {
    async fn fetch(&self, url: &str, timeout_ms: u32) -> Result<FetchResponse, HostError> {
        let response = fetchBytes(url, timeout_ms).await.map_err(runtime_error)?;

        let status = js_sys::Reflect::get(&response, &JsValue::from_str("status"))
            .ok()
            .and_then(|status| status.as_f64())
            .unwrap_or(0.0) as u16;

        let body = js_sys::Reflect::get(&response, &JsValue::from_str("body"))
            .map(|body| js_sys::Uint8Array::new(&body).to_vec())
            .unwrap_or_default();

        Ok(FetchResponse { status, body })
    }

    fn now_millis(&self) -> f64 {
        js_sys::Date::now()
    }
}

impl BrowserHost for JsHost {
    async fn normal_windows(&self) -> Result<Vec<WindowInfo>, HostError> {
        from_js(getNormalWindows().await.map_err(runtime_error)?)
    }

    async fn current_window(&self) -> Result<WindowInfo, HostError> {
        from_js(getCurrentWindow().await.map_err(runtime_error)?)
    }

    async fn get_tab(&self, tab_id: TabId) -> Result<TabInfo, HostError> {
        let tab = getTab(tab_id).await.map_err(|_| HostError::NoTab(tab_id))?;
        if tab.is_null() || tab.is_undefined() {
            return Err(HostError::NoTab(tab_id));
        }
        from_js(tab)
    }

    async fn active_tabs(&self, window_id: i32) -> Result<Vec<TabInfo>, HostError> {
        from_js(queryActiveTabs(window_id).await.map_err(runtime_error)?)
    }

    async fn create_tab(&self, properties: CreateTabProperties) -> Result<TabInfo, HostError> {
        let properties = to_js(&properties)?;
        from_js(createTab(properties).await.map_err(runtime_error)?)
    }

    async fn remove_tabs(&self, tab_ids: &[TabId]) -> Result<(), HostError> {
        removeTabs(to_js(tab_ids)?).await.map_err(runtime_error)?;
        Ok(())
    }

    async fn send_to_tab(&self, tab_id: TabId, message: &AgentMessage) -> Result<(), HostError> {
        sendTabMessage(tab_id, to_js(message)?).await.map_err(runtime_error)?;
        Ok(())
    }

    fn broadcast(&self, message: &RuntimeMessage<'_>) {
        match to_js(message) {
            Ok(value) => sendRuntimeMessage(value),
            Err(e) => warn!("Failed to encode {}: {}", message.name().as_str(), e),
        }
    }

    fn set_badge(&self, tab_id: TabId, badge: &Badge) {
        match to_js(badge) {
            Ok(value) => setBadge(tab_id, value),
            Err(e) => warn!("Failed to encode badge for tab {}: {}", tab_id, e),
        }
    }

    fn extension_url(&self) -> String {
        extensionUrl()
    }

    async fn sleep(&self, millis: u32) {
        if let Err(e) = sleep(millis).await {
            warn!("Timer failed: {:?}", e);
        }
    }
}

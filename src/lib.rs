/// Link Blanker - Chrome Extension background service
/// Built with Rust + WASM

pub mod bridge;
pub mod config;
pub mod controller;
pub mod error;
pub mod host;
pub mod image_cache;
pub mod messages;
pub mod operations;
pub mod preferences;
pub mod tab_data;
pub mod url_parts;

#[cfg(test)]
mod testing;

use bridge::{JsHost, JsStore, StorageTier, from_js, installListeners, to_js};
use config::Config;
use controller::{LinkBlanker, TabEvent};
use log::{debug, info, warn};
use messages::PortMessage;
use preferences::PreferencePatch;
use std::cell::RefCell;
use std::rc::Rc;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::{future_to_promise, spawn_local};

thread_local! {
    static CONTROLLER: RefCell<Option<Rc<LinkBlanker<JsHost>>>> = const { RefCell::new(None) };
}

// Set up panic hook for better error messages in the browser console
#[wasm_bindgen(start)]
pub fn main() {
    console_error_panic_hook::set_once();
}

fn controller() -> Result<Rc<LinkBlanker<JsHost>>, JsValue> {
    CONTROLLER
        .with(|slot| slot.borrow().clone())
        .ok_or_else(|| JsValue::from_str("background controller not started"))
}

fn js_error(e: impl std::fmt::Display) -> JsValue {
    JsValue::from_str(&e.to_string())
}

/// Build the controller, hook browser events and reconcile existing tabs
#[wasm_bindgen]
pub fn start_background(config: JsValue) -> Result<(), JsValue> {
    let config: Config = if config.is_undefined() || config.is_null() {
        Config::default()
    } else {
        from_js(config).map_err(js_error)?
    };

    wasm_logger::init(wasm_logger::Config::new(config.level()));

    let blanker = Rc::new(LinkBlanker::new(
        JsHost,
        Box::new(JsStore::new(StorageTier::Persistent)),
        Box::new(JsStore::new(StorageTier::Ephemeral)),
        config,
    ));
    CONTROLLER.with(|slot| *slot.borrow_mut() = Some(Rc::clone(&blanker)));

    let on_tab_event = {
        let blanker = Rc::clone(&blanker);
        Closure::wrap(Box::new(move |event: JsValue| {
            let event: TabEvent = match from_js(event) {
                Ok(event) => event,
                Err(e) => {
                    warn!("Ignoring malformed tab event: {}", e);
                    return;
                }
            };

            let blanker = Rc::clone(&blanker);
            spawn_local(async move {
                blanker.handle_tab_event(event).await;
            });
        }) as Box<dyn Fn(JsValue)>)
    };

    let on_port_message = {
        let blanker = Rc::clone(&blanker);
        Closure::wrap(Box::new(move |port_name: String, payload: JsValue| {
            let payload = if payload.is_undefined() {
                serde_json::Value::Null
            } else {
                match from_js(payload) {
                    Ok(payload) => payload,
                    Err(e) => {
                        warn!("Ignoring unreadable {} message: {}", port_name, e);
                        return;
                    }
                }
            };

            let message = match PortMessage::decode(&port_name, payload) {
                Ok(message) => message,
                Err(e) => {
                    debug!("Ignoring port message: {}", e);
                    return;
                }
            };

            let blanker = Rc::clone(&blanker);
            spawn_local(async move {
                if let Err(e) = blanker.handle_port_message(message).await {
                    debug!("{} failed: {}", port_name, e);
                }
            });
        }) as Box<dyn Fn(String, JsValue)>)
    };

    installListeners(
        on_tab_event.as_ref().unchecked_ref(),
        on_port_message.as_ref().unchecked_ref(),
    );
    on_tab_event.forget();
    on_port_message.forget();

    spawn_local(async move {
        blanker.initialize().await;
    });

    info!("Link Blanker background started");
    Ok(())
}

/// Save a preference patch from the popup; resolves once statuses are pushed
#[wasm_bindgen]
pub fn save_preferences(patch: JsValue) -> Result<js_sys::Promise, JsValue> {
    let blanker = controller()?;
    let patch: PreferencePatch = from_js(patch).map_err(js_error)?;

    Ok(future_to_promise(async move {
        blanker.save(patch).await.map_err(js_error)?;
        Ok(JsValue::UNDEFINED)
    }))
}

/// Preferences as seen from the current tab
#[wasm_bindgen]
pub fn preference_view() -> Result<js_sys::Promise, JsValue> {
    let blanker = controller()?;

    Ok(future_to_promise(async move {
        let view = blanker.preference_view().await.map_err(js_error)?;
        to_js(&view).map_err(js_error)
    }))
}

/// Resolve an image URL to a data URL, coalescing concurrent requests
#[wasm_bindgen]
pub fn fetch_image(url: String, guide_url: Option<String>) -> Result<js_sys::Promise, JsValue> {
    let blanker = controller()?;

    Ok(future_to_promise(async move {
        let data_url = blanker
            .fetch_image(&url, guide_url.as_deref())
            .await
            .map_err(js_error)?;
        Ok(JsValue::from_str(&data_url))
    }))
}

#[wasm_bindgen]
pub fn is_enabled(url: &str) -> Result<bool, JsValue> {
    Ok(controller()?.is_enabled(url))
}

#[wasm_bindgen]
pub fn tab_log() -> Result<JsValue, JsValue> {
    to_js(&controller()?.tab_log()).map_err(js_error)
}

//! Conversions at the JS boundary, run with `wasm-pack test --headless --chrome`
#![cfg(target_arch = "wasm32")]

use link_blanker::bridge::{from_js, to_js};
use link_blanker::config::Config;
use link_blanker::messages::{AgentMessage, TabStatus};
use link_blanker::preferences::{DisabledState, PreferencePatch};
use link_blanker::tab_data::{Align, TabInfo};
use link_blanker::url_parts::parse_url;
use wasm_bindgen::JsValue;
use wasm_bindgen_test::*;

wasm_bindgen_test_configure!(run_in_browser);

fn get(value: &JsValue, key: &str) -> JsValue {
    js_sys::Reflect::get(value, &JsValue::from_str(key)).unwrap()
}

#[wasm_bindgen_test]
fn agent_messages_become_plain_objects() {
    let message = AgentMessage::UpdateTabStatus(TabStatus {
        parse: parse_url("https://example.com/a/b"),
        enabled: true,
        is_background: true,
        multi_click_close: false,
        shortcut_key_toggle_enabled: vec![17, 66],
        disabled_same_domain: false,
    });

    let js = to_js(&message).unwrap();

    assert_eq!(get(&js, "name").as_string().as_deref(), Some("UPDATE_TAB_STATUS"));
    assert_eq!(get(&get(&js, "parse"), "domain").as_string().as_deref(), Some("example.com"));
    assert_eq!(get(&js, "isBackground").as_bool(), Some(true));
    assert!(js_sys::Array::is_array(&get(&js, "shortcutKeyToggleEnabled")));
}

#[wasm_bindgen_test]
fn remove_tabs_message_carries_count() {
    let js = to_js(&AgentMessage::RemoveTabs {
        align: Align::Left,
        remove_tabs_length: 2,
    })
    .unwrap();

    assert_eq!(get(&js, "align").as_string().as_deref(), Some("left"));
    assert_eq!(get(&js, "removeTabsLength").as_f64(), Some(2.0));
}

#[wasm_bindgen_test]
fn chrome_tab_objects_parse() {
    let tab = js_sys::JSON::parse(
        r#"{"id": 8, "index": 2, "windowId": 1, "active": true, "url": "https://a.com/x", "incognito": false}"#,
    )
    .unwrap();

    let tab: TabInfo = from_js(tab).unwrap();

    assert_eq!(tab.id, 8);
    assert_eq!(tab.index, Some(2));
    assert!(tab.active);
}

#[wasm_bindgen_test]
fn popup_patch_and_config_parse() {
    let patch = js_sys::JSON::parse(r#"{"disabled-state": "disabled-page"}"#).unwrap();
    let patch: PreferencePatch = from_js(patch).unwrap();
    assert_eq!(patch.disabled_state, Some(DisabledState::Page));

    let config: Config = from_js(js_sys::JSON::parse(r#"{"replace-poll-interval-ms": 250}"#).unwrap()).unwrap();
    assert_eq!(config.replace_poll_interval_ms, 250);
    assert_eq!(config.fetch_timeout_ms, 10_000);
}

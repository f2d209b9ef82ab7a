/// Messages exchanged with content-script agents and extension pages
use crate::error::{LinkBlankerError, Result};
use crate::preferences::Preferences;
use crate::tab_data::{Align, TabLog};
use crate::url_parts::ParsedUrl;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageName {
    UpdateTabStatus,
    RemoveTabs,
    OpenTab,
    UndoRemoveTabs,
    ToggleEnabled,
    UpdatedData,
    SavedTabLog,
    DeletedTabLog,
}

impl MessageName {
    pub fn as_str(self) -> &'static str {
        match self {
            MessageName::UpdateTabStatus => "UPDATE_TAB_STATUS",
            MessageName::RemoveTabs => "REMOVE_TABS",
            MessageName::OpenTab => "OPEN_TAB",
            MessageName::UndoRemoveTabs => "UNDO_REMOVE_TABS",
            MessageName::ToggleEnabled => "TOGGLE_ENABLED",
            MessageName::UpdatedData => "UPDATED_DATA",
            MessageName::SavedTabLog => "SAVED_TAB_LOG",
            MessageName::DeletedTabLog => "DELETED_TAB_LOG",
        }
    }

    /// Names an agent may open a port with
    pub fn from_port_name(name: &str) -> Option<MessageName> {
        match name {
            "OPEN_TAB" => Some(MessageName::OpenTab),
            "REMOVE_TABS" => Some(MessageName::RemoveTabs),
            "UNDO_REMOVE_TABS" => Some(MessageName::UndoRemoveTabs),
            "TOGGLE_ENABLED" => Some(MessageName::ToggleEnabled),
            _ => None,
        }
    }
}

/// Status pushed to a tab's agent whenever its state may have changed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TabStatus {
    pub parse: ParsedUrl,
    pub enabled: bool,
    pub is_background: bool,
    pub multi_click_close: bool,
    pub shortcut_key_toggle_enabled: Vec<u32>,
    pub disabled_same_domain: bool,
}

/// Background → agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "name")]
pub enum AgentMessage {
    #[serde(rename = "UPDATE_TAB_STATUS")]
    UpdateTabStatus(TabStatus),
    #[serde(rename = "REMOVE_TABS", rename_all = "camelCase")]
    RemoveTabs {
        align: Align,
        remove_tabs_length: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct OpenTabParams {
    pub url: String,
    #[serde(default, alias = "selected")]
    pub active: bool,
    #[serde(default)]
    pub index: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
struct RemoveTabsParams {
    align: Align,
}

/// Agent → background, one variant per port name
#[derive(Debug, Clone, PartialEq)]
pub enum PortMessage {
    OpenTab(OpenTabParams),
    RemoveTabs { align: Align },
    UndoRemoveTabs,
    ToggleEnabled,
}

impl PortMessage {
    pub fn decode(port_name: &str, payload: Value) -> Result<PortMessage> {
        let name = MessageName::from_port_name(port_name)
            .ok_or_else(|| LinkBlankerError::UnknownPort(port_name.to_string()))?;

        let message = match name {
            MessageName::OpenTab => PortMessage::OpenTab(serde_json::from_value(payload)?),
            MessageName::RemoveTabs => {
                let params: RemoveTabsParams = serde_json::from_value(payload)?;
                PortMessage::RemoveTabs {
                    align: params.align,
                }
            }
            MessageName::UndoRemoveTabs => PortMessage::UndoRemoveTabs,
            MessageName::ToggleEnabled => PortMessage::ToggleEnabled,
            other => return Err(LinkBlankerError::UnknownPort(other.as_str().to_string())),
        };

        Ok(message)
    }
}

/// Background → extension pages
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "name")]
pub enum RuntimeMessage<'a> {
    #[serde(rename = "UPDATED_DATA")]
    UpdatedData { data: &'a Preferences },
    #[serde(rename = "SAVED_TAB_LOG")]
    SavedTabLog { data: &'a TabLog },
    #[serde(rename = "DELETED_TAB_LOG")]
    DeletedTabLog { data: &'a TabLog },
}

impl RuntimeMessage<'_> {
    pub fn name(&self) -> MessageName {
        match self {
            RuntimeMessage::UpdatedData { .. } => MessageName::UpdatedData,
            RuntimeMessage::SavedTabLog { .. } => MessageName::SavedTabLog,
            RuntimeMessage::DeletedTabLog { .. } => MessageName::DeletedTabLog,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_update_tab_status_wire_shape() {
        let message = AgentMessage::UpdateTabStatus(TabStatus {
            parse: ParsedUrl {
                domain: "example.com".to_string(),
                directory: "http://example.com/a".to_string(),
                url: "http://example.com/a/b".to_string(),
            },
            enabled: true,
            is_background: false,
            multi_click_close: true,
            shortcut_key_toggle_enabled: vec![17, 66],
            disabled_same_domain: false,
        });

        let value = serde_json::to_value(&message).unwrap();

        assert_eq!(value["name"], "UPDATE_TAB_STATUS");
        assert_eq!(value["parse"]["domain"], "example.com");
        assert_eq!(value["isBackground"], false);
        assert_eq!(value["multiClickClose"], true);
        assert_eq!(value["shortcutKeyToggleEnabled"], json!([17, 66]));
        assert_eq!(value["disabledSameDomain"], false);
    }

    #[test]
    fn test_remove_tabs_wire_shape() {
        let message = AgentMessage::RemoveTabs {
            align: Align::Right,
            remove_tabs_length: 3,
        };

        let value = serde_json::to_value(&message).unwrap();

        assert_eq!(value, json!({"name": "REMOVE_TABS", "align": "right", "removeTabsLength": 3}));
    }

    #[test]
    fn test_decode_port_messages() {
        let open = PortMessage::decode("OPEN_TAB", json!({"url": "https://a.com/", "selected": true})).unwrap();
        assert_eq!(
            open,
            PortMessage::OpenTab(OpenTabParams {
                url: "https://a.com/".to_string(),
                active: true,
                index: None,
            })
        );

        let remove = PortMessage::decode("REMOVE_TABS", json!({"align": "left"})).unwrap();
        assert_eq!(remove, PortMessage::RemoveTabs { align: Align::Left });

        assert_eq!(
            PortMessage::decode("UNDO_REMOVE_TABS", Value::Null).unwrap(),
            PortMessage::UndoRemoveTabs
        );
        assert_eq!(
            PortMessage::decode("TOGGLE_ENABLED", Value::Null).unwrap(),
            PortMessage::ToggleEnabled
        );
    }

    #[test]
    fn test_decode_rejects_unknown_and_malformed() {
        assert!(matches!(
            PortMessage::decode("UPDATED_DATA", Value::Null),
            Err(LinkBlankerError::UnknownPort(_))
        ));
        assert!(matches!(
            PortMessage::decode("REMOVE_TABS", json!({"align": "up"})),
            Err(LinkBlankerError::InvalidMessage(_))
        ));
    }

    #[test]
    fn test_runtime_message_name() {
        let log = TabLog::new();
        let message = RuntimeMessage::SavedTabLog { data: &log };

        assert_eq!(message.name(), MessageName::SavedTabLog);
        assert_eq!(serde_json::to_value(&message).unwrap()["name"], "SAVED_TAB_LOG");
    }
}

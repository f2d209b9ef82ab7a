/// User preferences: persisted layout, evaluation and patch application
use crate::host::KeyValueStore;
use crate::url_parts::ParsedUrl;
use log::{debug, info, warn};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::LazyLock;

/// Key written by old versions with inverted polarity
pub const LEGACY_DISABLED_EXTENSION: &str = "disabled-extension";

static INTERNAL_SCHEME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^chrome(-extension)?://").expect("internal scheme pattern is valid")
});

/// Persisted preference keys
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreferenceKey {
    EnabledExtension,
    DisabledDomain,
    DisabledDirectory,
    DisabledPage,
    EnabledBackgroundOpen,
    EnabledMulticlickClose,
    ShortcutKeyToggleEnabled,
    DisabledSameDomain,
}

impl PreferenceKey {
    pub const ALL: [PreferenceKey; 8] = [
        PreferenceKey::EnabledExtension,
        PreferenceKey::DisabledDomain,
        PreferenceKey::DisabledDirectory,
        PreferenceKey::DisabledPage,
        PreferenceKey::EnabledBackgroundOpen,
        PreferenceKey::EnabledMulticlickClose,
        PreferenceKey::ShortcutKeyToggleEnabled,
        PreferenceKey::DisabledSameDomain,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            PreferenceKey::EnabledExtension => "enabled-extension",
            PreferenceKey::DisabledDomain => "disabled-domain",
            PreferenceKey::DisabledDirectory => "disabled-directory",
            PreferenceKey::DisabledPage => "disabled-page",
            PreferenceKey::EnabledBackgroundOpen => "enabled-background-open",
            PreferenceKey::EnabledMulticlickClose => "enabled-multiclick-close",
            PreferenceKey::ShortcutKeyToggleEnabled => "shortcut-key-toggle-enabled",
            PreferenceKey::DisabledSameDomain => "disabled-same-domain",
        }
    }
}

/// The three rule groups that are toggled relative to the current tab
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisabledGroup {
    Domain,
    Directory,
    Page,
}

impl DisabledGroup {
    pub fn key(self) -> PreferenceKey {
        match self {
            DisabledGroup::Domain => PreferenceKey::DisabledDomain,
            DisabledGroup::Directory => PreferenceKey::DisabledDirectory,
            DisabledGroup::Page => PreferenceKey::DisabledPage,
        }
    }

    /// The part of the current tab's URL this group stores
    pub fn value_from(self, parsed: &ParsedUrl) -> &str {
        match self {
            DisabledGroup::Domain => &parsed.domain,
            DisabledGroup::Directory => &parsed.directory,
            DisabledGroup::Page => &parsed.url,
        }
    }
}

/// Virtual field selecting at most one rule group for the current tab
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DisabledState {
    #[serde(rename = "disabled-domain", alias = "domain")]
    Domain,
    #[serde(rename = "disabled-directory", alias = "directory")]
    Directory,
    #[serde(rename = "disabled-page", alias = "page")]
    Page,
    #[serde(rename = "disabled-off", alias = "off")]
    Off,
}

impl DisabledState {
    fn group(self) -> Option<DisabledGroup> {
        match self {
            DisabledState::Domain => Some(DisabledGroup::Domain),
            DisabledState::Directory => Some(DisabledGroup::Directory),
            DisabledState::Page => Some(DisabledGroup::Page),
            DisabledState::Off => None,
        }
    }
}

/// Partial update of the preference set
///
/// The `disabled_*` group fields mean "the current tab's value is in this
/// set" rather than carrying the set itself.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct PreferencePatch {
    pub enabled_extension: Option<bool>,
    pub disabled_domain: Option<bool>,
    pub disabled_directory: Option<bool>,
    pub disabled_page: Option<bool>,
    pub enabled_background_open: Option<bool>,
    pub enabled_multiclick_close: Option<bool>,
    pub shortcut_key_toggle_enabled: Option<Vec<u32>>,
    pub disabled_same_domain: Option<bool>,
    pub disabled_state: Option<DisabledState>,
}

impl PreferencePatch {
    /// Replace `disabled_state` with explicit group toggles
    pub fn expand_disabled_state(&mut self) {
        let Some(state) = self.disabled_state.take() else {
            return;
        };

        let selected = state.group();
        self.disabled_domain = Some(selected == Some(DisabledGroup::Domain));
        self.disabled_directory = Some(selected == Some(DisabledGroup::Directory));
        self.disabled_page = Some(selected == Some(DisabledGroup::Page));
    }

    fn group_toggles(&self) -> [(DisabledGroup, Option<bool>); 3] {
        [
            (DisabledGroup::Domain, self.disabled_domain),
            (DisabledGroup::Directory, self.disabled_directory),
            (DisabledGroup::Page, self.disabled_page),
        ]
    }

    pub fn needs_current_tab(&self) -> bool {
        self.disabled_state.is_some() || self.group_toggles().iter().any(|(_, toggle)| toggle.is_some())
    }
}

/// The full preference set
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Preferences {
    pub enabled_extension: bool,
    pub disabled_domain: Vec<String>,
    pub disabled_directory: Vec<String>,
    pub disabled_page: Vec<String>,
    pub enabled_background_open: bool,
    pub enabled_multiclick_close: bool,
    pub shortcut_key_toggle_enabled: Vec<u32>,
    pub disabled_same_domain: bool,
}

impl Preferences {
    /// Read every key from `store`; absent or unreadable keys take defaults
    pub fn load(store: &dyn KeyValueStore) -> Preferences {
        Preferences {
            enabled_extension: read_flag(store, PreferenceKey::EnabledExtension),
            disabled_domain: read_list(store, PreferenceKey::DisabledDomain),
            disabled_directory: read_list(store, PreferenceKey::DisabledDirectory),
            disabled_page: read_list(store, PreferenceKey::DisabledPage),
            enabled_background_open: read_flag(store, PreferenceKey::EnabledBackgroundOpen),
            enabled_multiclick_close: read_flag(store, PreferenceKey::EnabledMulticlickClose),
            shortcut_key_toggle_enabled: read_key_codes(store, PreferenceKey::ShortcutKeyToggleEnabled),
            disabled_same_domain: read_flag(store, PreferenceKey::DisabledSameDomain),
        }
    }

    /// Write the given keys back to `store`
    pub fn persist(&self, store: &dyn KeyValueStore, keys: &[PreferenceKey]) {
        for &key in keys {
            if let Err(e) = store.set_item(key.as_str(), self.stored_value(key)) {
                warn!("Failed to persist {}: {}", key.as_str(), e);
            }
        }
    }

    fn stored_value(&self, key: PreferenceKey) -> Value {
        let flag = |on: bool| json!(if on { 1 } else { 0 });

        match key {
            PreferenceKey::EnabledExtension => flag(self.enabled_extension),
            PreferenceKey::DisabledDomain => json!(self.disabled_domain),
            PreferenceKey::DisabledDirectory => json!(self.disabled_directory),
            PreferenceKey::DisabledPage => json!(self.disabled_page),
            PreferenceKey::EnabledBackgroundOpen => flag(self.enabled_background_open),
            PreferenceKey::EnabledMulticlickClose => flag(self.enabled_multiclick_close),
            PreferenceKey::ShortcutKeyToggleEnabled => json!(self.shortcut_key_toggle_enabled),
            PreferenceKey::DisabledSameDomain => flag(self.disabled_same_domain),
        }
    }

    pub fn group(&self, group: DisabledGroup) -> &Vec<String> {
        match group {
            DisabledGroup::Domain => &self.disabled_domain,
            DisabledGroup::Directory => &self.disabled_directory,
            DisabledGroup::Page => &self.disabled_page,
        }
    }

    fn group_mut(&mut self, group: DisabledGroup) -> &mut Vec<String> {
        match group {
            DisabledGroup::Domain => &mut self.disabled_domain,
            DisabledGroup::Directory => &mut self.disabled_directory,
            DisabledGroup::Page => &mut self.disabled_page,
        }
    }

    /// Insert or remove `value` so that its membership matches `disabled`
    fn toggle(&mut self, group: DisabledGroup, value: &str, disabled: bool) {
        let entries = self.group_mut(group);
        let position = entries.iter().position(|entry| entry == value);

        match (disabled, position) {
            (true, None) => entries.push(value.to_string()),
            (false, Some(index)) => {
                entries.remove(index);
            }
            _ => {}
        }
    }

    /// Apply `patch` and return the keys that need persisting
    ///
    /// Group toggles are resolved against `current`; without a current tab
    /// they are skipped and only the plain fields are applied.
    pub fn apply(&mut self, patch: &PreferencePatch, current: Option<&ParsedUrl>) -> Vec<PreferenceKey> {
        let mut patch = patch.clone();
        patch.expand_disabled_state();

        let mut written = Vec::new();

        for (group, toggle) in patch.group_toggles() {
            let Some(disabled) = toggle else {
                continue;
            };

            match current {
                Some(parsed) => {
                    let value = group.value_from(parsed).to_string();
                    self.toggle(group, &value, disabled);
                    written.push(group.key());
                }
                None => {
                    debug!("No current tab, skipping {}", group.key().as_str());
                }
            }
        }

        if let Some(keys) = patch.shortcut_key_toggle_enabled {
            self.shortcut_key_toggle_enabled = keys;
            written.push(PreferenceKey::ShortcutKeyToggleEnabled);
        }

        let flags = [
            (PreferenceKey::EnabledExtension, patch.enabled_extension),
            (PreferenceKey::EnabledBackgroundOpen, patch.enabled_background_open),
            (PreferenceKey::EnabledMulticlickClose, patch.enabled_multiclick_close),
            (PreferenceKey::DisabledSameDomain, patch.disabled_same_domain),
        ];

        for (key, value) in flags {
            let Some(value) = value else {
                continue;
            };

            match key {
                PreferenceKey::EnabledExtension => self.enabled_extension = value,
                PreferenceKey::EnabledBackgroundOpen => self.enabled_background_open = value,
                PreferenceKey::EnabledMulticlickClose => self.enabled_multiclick_close = value,
                _ => self.disabled_same_domain = value,
            }
            written.push(key);
        }

        written
    }

    /// Whether links on `parsed` should be blanked
    ///
    /// Directory rules are plain string prefixes, so a rule for
    /// `http://a.com/foo` also covers `http://a.com/foo-bar`.
    pub fn is_enabled(&self, parsed: &ParsedUrl, extension_url: &str) -> bool {
        let url = parsed.url.as_str();
        let own_page = !extension_url.is_empty() && url.starts_with(extension_url);

        if !own_page && INTERNAL_SCHEME.is_match(url) {
            return false;
        }

        self.enabled_extension
            && !self.disabled_domain.contains(&parsed.domain)
            && !self.disabled_page.iter().any(|page| page == url)
            && !self.disabled_directory.iter().any(|directory| url.starts_with(directory.as_str()))
    }

    /// Read model for the popup, relative to the current tab
    pub fn view(&self, current: &ParsedUrl, extension_url: &str) -> PreferenceView {
        let disabled_state = if self.disabled_page.contains(&current.url) {
            DisabledState::Page
        } else if self
            .disabled_directory
            .iter()
            .any(|directory| current.directory.starts_with(directory.as_str()))
        {
            DisabledState::Directory
        } else if self.disabled_domain.contains(&current.domain) {
            DisabledState::Domain
        } else {
            DisabledState::Off
        };

        PreferenceView {
            enabled_extension: self.enabled_extension,
            enabled_background_open: self.enabled_background_open,
            enabled_multiclick_close: self.enabled_multiclick_close,
            shortcut_key_toggle_enabled: self.shortcut_key_toggle_enabled.clone(),
            disabled_same_domain: self.disabled_same_domain,
            disabled_state,
            system_enabled_state: self.is_enabled(current, extension_url),
        }
    }
}

/// What the popup shows for the current tab
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct PreferenceView {
    pub enabled_extension: bool,
    pub enabled_background_open: bool,
    pub enabled_multiclick_close: bool,
    pub shortcut_key_toggle_enabled: Vec<u32>,
    pub disabled_same_domain: bool,
    pub disabled_state: DisabledState,
    pub system_enabled_state: bool,
}

/// Rewrite the inverted legacy key, once
///
/// Returns `true` when a migration happened.
pub fn migrate_legacy(store: &dyn KeyValueStore) -> bool {
    let Some(legacy) = store.get_item(LEGACY_DISABLED_EXTENSION) else {
        return false;
    };

    let was_disabled = value_as_flag(&legacy);
    let enabled = json!(if was_disabled { 0 } else { 1 });

    if let Err(e) = store.set_item(PreferenceKey::EnabledExtension.as_str(), enabled) {
        warn!("Failed to migrate {}: {}", LEGACY_DISABLED_EXTENSION, e);
        return false;
    }

    store.remove_item(LEGACY_DISABLED_EXTENSION);
    info!("Migrated {} to {}", LEGACY_DISABLED_EXTENSION, PreferenceKey::EnabledExtension.as_str());
    true
}

fn value_as_flag(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Value::String(s) => s.trim().parse::<f64>().is_ok_and(|n| n != 0.0),
        _ => false,
    }
}

fn read_flag(store: &dyn KeyValueStore, key: PreferenceKey) -> bool {
    store.get_item(key.as_str()).is_some_and(|value| value_as_flag(&value))
}

fn read_list(store: &dyn KeyValueStore, key: PreferenceKey) -> Vec<String> {
    let Some(Value::Array(items)) = store.get_item(key.as_str()) else {
        return Vec::new();
    };

    let mut list: Vec<String> = Vec::with_capacity(items.len());
    for item in items {
        if let Value::String(s) = item {
            if !list.contains(&s) {
                list.push(s);
            }
        }
    }
    list
}

fn read_key_codes(store: &dyn KeyValueStore, key: PreferenceKey) -> Vec<u32> {
    match store.get_item(key.as_str()) {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| item.as_u64())
            .filter_map(|code| u32::try_from(code).ok())
            .collect(),
        _ => Vec::new(),
    }
}

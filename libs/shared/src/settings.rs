use serde::{Deserialize, Serialize};

pub const SETTINGS_SCHEMA_VERSION: u16 = 1;

pub const MIN_KEEP_COUNT: u32 = 1;
pub const MAX_KEEP_COUNT: u32 = 100;

/// Persisted settings record. Storage is owned by the bridge's key-value
/// store; the engine only ever consumes a validated snapshot of this.
///
/// Field names follow the persisted record, which predates this
/// implementation (camelCase, `keep` for the retained-turn budget).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    pub schema_version: u16,
    pub enabled: bool,
    #[serde(rename = "keep")]
    pub keep_count: u32,
    pub show_status_indicator: bool,
    pub debug_logging: bool,
    #[serde(default)]
    pub preserve_hidden_roles: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            schema_version: SETTINGS_SCHEMA_VERSION,
            enabled: true,
            keep_count: 10,
            show_status_indicator: true,
            debug_logging: false,
            preserve_hidden_roles: false,
        }
    }
}

impl Settings {
    /// Return a copy with every field forced into its valid range.
    /// `schema_version` is always rewritten to the current version, whatever
    /// the stored record claimed.
    pub fn validated(mut self) -> Self {
        self.schema_version = SETTINGS_SCHEMA_VERSION;
        self.keep_count = self.keep_count.clamp(MIN_KEEP_COUNT, MAX_KEEP_COUNT);
        self
    }
}

/// Partial update requested by a settings UI. Absent fields keep their
/// current value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(rename = "keep", skip_serializing_if = "Option::is_none")]
    pub keep_count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub show_status_indicator: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debug_logging: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preserve_hidden_roles: Option<bool>,
}

impl SettingsPatch {
    pub fn apply(&self, current: &Settings) -> Settings {
        Settings {
            schema_version: current.schema_version,
            enabled: self.enabled.unwrap_or(current.enabled),
            keep_count: self.keep_count.unwrap_or(current.keep_count),
            show_status_indicator: self
                .show_status_indicator
                .unwrap_or(current.show_status_indicator),
            debug_logging: self.debug_logging.unwrap_or(current.debug_logging),
            preserve_hidden_roles: self
                .preserve_hidden_roles
                .unwrap_or(current.preserve_hidden_roles),
        }
        .validated()
    }
}

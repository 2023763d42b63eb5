use crate::capabilities::HostCapabilities;
use crate::error::BridgeError;
use slimthread_shared::{Settings, SettingsPatch};
use std::sync::Arc;

pub const SETTINGS_KEY: &str = "slimthread.settings";

/// Settings persistence over the host key-value storage. Everything read is
/// validated before it reaches the engine; everything written is validated
/// before it reaches the disk.
pub struct SettingsStore {
    caps: Arc<dyn HostCapabilities>,
}

impl SettingsStore {
    pub fn new(caps: Arc<dyn HostCapabilities>) -> Self {
        Self { caps }
    }

    /// Load the persisted record. A missing record means defaults; a corrupt
    /// record is logged and replaced by defaults rather than propagated,
    /// so a broken settings blob cannot take the extension down.
    pub async fn load(&self) -> Result<Settings, BridgeError> {
        let Some(value) = self.caps.storage_get(SETTINGS_KEY).await? else {
            return Ok(Settings::default());
        };

        match serde_json::from_value::<Settings>(value) {
            Ok(settings) => Ok(settings.validated()),
            Err(error) => {
                tracing::warn!(%error, "corrupt settings record, falling back to defaults");
                Ok(Settings::default())
            }
        }
    }

    pub async fn save(&self, settings: &Settings) -> Result<(), BridgeError> {
        let validated = settings.clone().validated();
        let value = serde_json::to_value(&validated)?;
        self.caps.storage_set(SETTINGS_KEY, value).await
    }

    /// Apply a partial update and persist the result.
    pub async fn update(&self, patch: &SettingsPatch) -> Result<Settings, BridgeError> {
        let current = self.load().await?;
        let updated = patch.apply(&current);
        self.save(&updated).await?;
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::MemoryCapabilities;
    use serde_json::json;

    fn store() -> (SettingsStore, Arc<MemoryCapabilities>) {
        let caps = Arc::new(MemoryCapabilities::new("ext://slimthread"));
        (SettingsStore::new(caps.clone()), caps)
    }

    #[tokio::test]
    async fn missing_record_loads_defaults() {
        let (store, _caps) = store();
        let Ok(settings) = store.load().await else {
            panic!("load should succeed");
        };
        assert_eq!(settings, Settings::default());
    }

    #[tokio::test]
    async fn save_and_load_round_trip() {
        let (store, _caps) = store();
        let settings = Settings {
            keep_count: 30,
            debug_logging: true,
            ..Settings::default()
        };
        let Ok(()) = store.save(&settings).await else {
            panic!("save should succeed");
        };
        let Ok(loaded) = store.load().await else {
            panic!("load should succeed");
        };
        assert_eq!(loaded, settings);
    }

    #[tokio::test]
    async fn out_of_range_stored_values_are_clamped_on_load() {
        let (store, caps) = store();
        let record = json!({
            "schemaVersion": 9,
            "enabled": true,
            "keep": 4000,
            "showStatusIndicator": true,
            "debugLogging": false,
        });
        let Ok(()) = caps.storage_set(SETTINGS_KEY, record).await else {
            panic!("seed should succeed");
        };

        let Ok(loaded) = store.load().await else {
            panic!("load should succeed");
        };
        assert_eq!(loaded.keep_count, 100);
        assert_eq!(loaded.schema_version, 1);
    }

    #[tokio::test]
    async fn corrupt_record_falls_back_to_defaults() {
        let (store, caps) = store();
        let Ok(()) = caps.storage_set(SETTINGS_KEY, json!("not an object")).await else {
            panic!("seed should succeed");
        };

        let Ok(loaded) = store.load().await else {
            panic!("load should succeed");
        };
        assert_eq!(loaded, Settings::default());
    }

    #[tokio::test]
    async fn update_applies_a_patch_and_persists() {
        let (store, _caps) = store();
        let patch = SettingsPatch {
            enabled: Some(false),
            keep_count: Some(7),
            ..SettingsPatch::default()
        };

        let Ok(updated) = store.update(&patch).await else {
            panic!("update should succeed");
        };
        assert!(!updated.enabled);
        assert_eq!(updated.keep_count, 7);

        let Ok(loaded) = store.load().await else {
            panic!("load should succeed");
        };
        assert_eq!(loaded, updated);
    }
}

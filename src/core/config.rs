use std::fs;
use std::path::PathBuf;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

use super::alerts::engine::Thresholds;
use super::arming::ArmingConfig;
use super::collaborators::SettingsSource;
use super::error::ConfigError;
use super::escalation::EscalationLadder;
use super::registry::DEFAULT_REGISTRY_CAPACITY;
use super::sound::model::SoundEngineConfig;

/// Monitoring settings. Every field has a default so older files keep loading.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub thresholds: Thresholds,
    /// User volume (0-1)
    pub volume: f32,
    pub muted: bool,
    /// Emergency alerts start the looping emergency alarm
    pub emergency_mode_enabled: bool,
    pub sound: SoundEngineConfig,
    pub escalation: EscalationLadder,
    pub arming: ArmingConfig,
    /// Alerts kept in the in-memory log
    pub registry_capacity: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            thresholds: Thresholds::default(),
            volume: 0.8,
            muted: false,
            emergency_mode_enabled: true,
            sound: SoundEngineConfig::default(),
            escalation: EscalationLadder::default(),
            arming: ArmingConfig::default(),
            registry_capacity: DEFAULT_REGISTRY_CAPACITY,
        }
    }
}

/// Threshold fields a scenario may override.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct ThresholdOverrides {
    pub motion_sensitivity: Option<f64>,
    pub audio_threshold: Option<f64>,
    pub person_confidence: Option<f64>,
    pub animal_confidence: Option<f64>,
    pub max_allowed_persons: Option<u32>,
    pub inactivity_timeout_minutes: Option<f64>,
    pub cooldown_seconds: Option<u64>,
}

/// Per-scenario overlay (e.g. "night" or "away"); set fields win over the
/// global settings.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct SettingsOverride {
    pub thresholds: ThresholdOverrides,
    pub volume: Option<f32>,
    pub muted: Option<bool>,
    pub emergency_mode_enabled: Option<bool>,
}

/// Merge `overrides` onto `global`, field by field.
pub fn resolve_effective_settings(global: &Settings, overrides: Option<&SettingsOverride>) -> Settings {
    let mut settings = global.clone();
    let Some(overrides) = overrides else {
        return settings;
    };

    let t = &overrides.thresholds;
    let thresholds = &mut settings.thresholds;
    if let Some(v) = t.motion_sensitivity {
        thresholds.motion_sensitivity = v;
    }
    if let Some(v) = t.audio_threshold {
        thresholds.audio_threshold = v;
    }
    if let Some(v) = t.person_confidence {
        thresholds.person_confidence = v;
    }
    if let Some(v) = t.animal_confidence {
        thresholds.animal_confidence = v;
    }
    if let Some(v) = t.max_allowed_persons {
        thresholds.max_allowed_persons = Some(v);
    }
    if let Some(v) = t.inactivity_timeout_minutes {
        thresholds.inactivity_timeout_minutes = v;
    }
    if let Some(v) = t.cooldown_seconds {
        thresholds.cooldown_seconds = v;
    }

    if let Some(v) = overrides.volume {
        settings.volume = v;
    }
    if let Some(v) = overrides.muted {
        settings.muted = v;
    }
    if let Some(v) = overrides.emergency_mode_enabled {
        settings.emergency_mode_enabled = v;
    }
    settings
}

/// Global settings plus an optional active override, shared with the core.
pub struct SharedSettings {
    global: RwLock<Settings>,
    active_override: RwLock<Option<SettingsOverride>>,
}

impl SharedSettings {
    pub fn new(global: Settings) -> Self {
        Self {
            global: RwLock::new(global),
            active_override: RwLock::new(None),
        }
    }

    pub fn global(&self) -> Settings {
        self.global
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn set_global(&self, settings: Settings) {
        *self
            .global
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = settings;
    }

    pub fn set_override(&self, overrides: Option<SettingsOverride>) {
        *self
            .active_override
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = overrides;
    }

    /// Settings with the active override applied.
    pub fn effective(&self) -> Settings {
        let global = self.global.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        let overrides = self
            .active_override
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        resolve_effective_settings(&global, overrides.as_ref())
    }
}

impl Default for SharedSettings {
    fn default() -> Self {
        Self::new(Settings::default())
    }
}

impl SettingsSource for SharedSettings {
    fn thresholds(&self) -> Thresholds {
        self.effective().thresholds
    }

    fn volume(&self) -> f32 {
        self.effective().volume
    }

    fn is_muted(&self) -> bool {
        self.effective().muted
    }

    fn is_emergency_mode_enabled(&self) -> bool {
        self.effective().emergency_mode_enabled
    }
}

pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    pub fn new(app_config_dir: PathBuf) -> Self {
        Self {
            config_path: app_config_dir.join("settings.json"),
        }
    }

    /// Load settings, falling back to defaults if the file is missing or unreadable.
    pub fn load(&self) -> Settings {
        if !self.config_path.exists() {
            return Settings::default();
        }
        match self.try_load() {
            Ok(settings) => settings,
            Err(e) => {
                log::warn!(
                    "Failed to load {}, using defaults: {}",
                    self.config_path.display(),
                    e
                );
                Settings::default()
            }
        }
    }

    fn try_load(&self) -> Result<Settings, ConfigError> {
        let content = fs::read_to_string(&self.config_path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn save(&self, settings: &Settings) -> Result<(), ConfigError> {
        // Ensure directory exists
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(settings)?;
        fs::write(&self.config_path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::alerts::model::{AlertRuleConfig, AlertType};
    use tempfile::tempdir;

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let manager = ConfigManager::new(dir.path().join("nested"));

        let default = manager.load();
        assert_eq!(default, Settings::default());

        let mut new_settings = Settings::default();
        new_settings.volume = 0.4;
        new_settings.thresholds.max_allowed_persons = Some(2);
        new_settings.thresholds.rules.insert(
            AlertType::Motion,
            AlertRuleConfig {
                enabled: false,
                cooldown_seconds: Some(5),
            },
        );
        new_settings.arming.countdown_seconds = 10;

        manager.save(&new_settings).unwrap();
        let loaded = manager.load();

        assert_eq!(loaded, new_settings);
        assert!(!loaded.thresholds.is_enabled(AlertType::Motion));
    }

    #[test]
    fn test_corrupt_file_falls_back_to_defaults() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("settings.json"), "{ not json").unwrap();
        let manager = ConfigManager::new(dir.path().to_path_buf());
        assert_eq!(manager.load(), Settings::default());
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join("settings.json"),
            r#"{ "volume": 0.3, "thresholds": { "motion_sensitivity": 80 } }"#,
        )
        .unwrap();
        let manager = ConfigManager::new(dir.path().to_path_buf());

        let loaded = manager.load();
        assert_eq!(loaded.volume, 0.3);
        assert_eq!(loaded.thresholds.motion_sensitivity, 80.0);
        assert_eq!(loaded.thresholds.cooldown_seconds, 30);
        assert_eq!(loaded.sound.max_concurrent, 3);
        assert_eq!(loaded.escalation, EscalationLadder::default());
    }

    #[test]
    fn test_override_wins_per_field() {
        let global = Settings::default();
        let overrides = SettingsOverride {
            thresholds: ThresholdOverrides {
                motion_sensitivity: Some(90.0),
                max_allowed_persons: Some(0),
                ..Default::default()
            },
            muted: Some(true),
            ..Default::default()
        };

        let effective = resolve_effective_settings(&global, Some(&overrides));
        assert_eq!(effective.thresholds.motion_sensitivity, 90.0);
        assert_eq!(effective.thresholds.max_allowed_persons, Some(0));
        assert_eq!(effective.thresholds.audio_threshold, global.thresholds.audio_threshold);
        assert!(effective.muted);
        assert_eq!(effective.volume, global.volume);

        assert_eq!(resolve_effective_settings(&global, None), global);
    }

    #[test]
    fn test_shared_settings_reads_fresh_values() {
        let shared = SharedSettings::default();
        assert!(!shared.is_muted());

        shared.set_override(Some(SettingsOverride {
            muted: Some(true),
            ..Default::default()
        }));
        assert!(shared.is_muted());

        let mut global = shared.global();
        global.volume = 0.1;
        shared.set_global(global);
        assert_eq!(shared.volume(), 0.1);

        shared.set_override(None);
        assert!(!shared.is_muted());
    }
}

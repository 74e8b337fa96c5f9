use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::engine::{EmptyProcessed, EngineOptions, FilterSettings, UnknownProcessorPolicy};
use crate::error::{FeeError, Result};
use crate::rates::RateCardOptions;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Directory searched for inputs and where reports land.
    pub data_dir: String,
    /// Every token must appear in the rate card file name.
    pub rate_card_patterns: Vec<String>,
    /// Every token must appear in the export file name.
    pub export_patterns: Vec<String>,
    pub filters: FilterSettings,
    pub fallback_processor: String,
    pub fallback_chargeback_fee: f64,
    pub empty_processed: EmptyProcessed,
    pub unknown_processor: UnknownProcessorPolicy,
    /// Chat channels allowed to request a run.
    pub allowed_channels: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir().to_string_lossy().to_string(),
            rate_card_patterns: vec!["EOM".to_string(), "Rubric".to_string()],
            export_patterns: vec!["EOM".to_string(), "View".to_string()],
            filters: FilterSettings::default(),
            fallback_processor: "merchant industries".to_string(),
            fallback_chargeback_fee: 35.0,
            empty_processed: EmptyProcessed::default(),
            unknown_processor: UnknownProcessorPolicy::default(),
            allowed_channels: Vec::new(),
        }
    }
}

impl Settings {
    pub fn engine_options(&self) -> EngineOptions {
        EngineOptions {
            filters: self.filters.clone(),
            empty_processed: self.empty_processed,
            unknown_processor: self.unknown_processor,
        }
    }

    pub fn rate_card_options(&self) -> RateCardOptions {
        RateCardOptions {
            fallback_processor: self.fallback_processor.clone(),
            fallback_chargeback_fee: self.fallback_chargeback_fee,
        }
    }

    /// Static allow-list check done before a chat-triggered run. An empty list
    /// allows every channel.
    pub fn check_channel(&self, channel: &str) -> Result<()> {
        if self.allowed_channels.is_empty() || self.allowed_channels.iter().any(|c| c == channel) {
            Ok(())
        } else {
            Err(FeeError::ChannelNotAllowed(channel.to_string()))
        }
    }
}

fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("eomfees")
}

pub fn default_settings_path() -> PathBuf {
    config_dir().join("settings.json")
}

fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("Documents")
        .join("eomfees")
}

/// Resolve `--config` against the default location.
pub fn settings_path(config: Option<&Path>) -> PathBuf {
    config.map(Path::to_path_buf).unwrap_or_else(default_settings_path)
}

/// Missing file yields defaults. A file that exists but does not parse is an
/// error so a typo never silently resets the exclusion lists.
pub fn load_settings(path: &Path) -> Result<Settings> {
    if !path.exists() {
        tracing::debug!(path = %path.display(), "no settings file, using defaults");
        return Ok(Settings::default());
    }
    let content = std::fs::read_to_string(path)?;
    serde_json::from_str(&content)
        .map_err(|e| FeeError::Settings(format!("{}: {e}", path.display())))
}

pub fn save_settings(settings: &Settings, path: &Path) -> Result<()> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    let json = serde_json::to_string_pretty(settings)
        .map_err(|e| FeeError::Settings(e.to_string()))?;
    std::fs::write(path, format!("{json}\n"))?;
    Ok(())
}

pub fn shellexpand_path(path: &str) -> String {
    if path.starts_with('~') {
        if let Some(home) = dirs::home_dir() {
            return path.replacen('~', &home.to_string_lossy(), 1);
        }
    }
    std::fs::canonicalize(path)
        .unwrap_or_else(|_| PathBuf::from(path))
        .to_string_lossy()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.json");
        let mut settings = Settings::default();
        settings.data_dir = "/tmp/eom".to_string();
        settings.filters.excluded_processors.insert("LEGACY".to_string());
        settings.empty_processed = EmptyProcessed::Zero;
        save_settings(&settings, &path).unwrap();

        let loaded = load_settings(&path).unwrap();
        assert_eq!(loaded.data_dir, "/tmp/eom");
        assert!(loaded.filters.excluded_processors.contains("LEGACY"));
        assert!(loaded.filters.excluded_processors.contains("EMS"));
        assert_eq!(loaded.empty_processed, EmptyProcessed::Zero);
    }

    #[test]
    fn test_load_returns_defaults_when_missing() {
        let dir = tempfile::tempdir().unwrap();
        let s = load_settings(&dir.path().join("absent.json")).unwrap();
        assert_eq!(s.fallback_processor, "merchant industries");
        assert_eq!(s.fallback_chargeback_fee, 35.0);
        assert_eq!(s.export_patterns, vec!["EOM", "View"]);
        assert!(s.filters.excluded_merchant_groups.contains("Sale Shield"));
        assert!(s.filters.excluded_merchant_groups.contains("SaleShield"));
        assert_eq!(s.unknown_processor, UnknownProcessorPolicy::Exclude);
        assert_eq!(s.empty_processed, EmptyProcessed::Missing);
    }

    #[test]
    fn test_load_merges_with_defaults() {
        let json = r#"{"data_dir": "/tmp/test", "unknown_processor": "abort"}"#;
        let s: Settings = serde_json::from_str(json).unwrap();
        assert_eq!(s.data_dir, "/tmp/test");
        assert_eq!(s.unknown_processor, UnknownProcessorPolicy::Abort);
        assert_eq!(s.rate_card_patterns, vec!["EOM", "Rubric"]);
        assert_eq!(s.filters.excluded_processor_substrings, vec!["FlexFactor", "Stripe"]);
    }

    #[test]
    fn test_load_rejects_malformed_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(load_settings(&path), Err(FeeError::Settings(_))));
    }

    #[test]
    fn test_check_channel() {
        let mut s = Settings::default();
        assert!(s.check_channel("anything").is_ok());
        s.allowed_channels = vec!["EOM [KT]".to_string()];
        assert!(s.check_channel("EOM [KT]").is_ok());
        assert!(matches!(s.check_channel("random"), Err(FeeError::ChannelNotAllowed(_))));
    }
}

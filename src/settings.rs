use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{ReportError, Result};
use crate::metrics::Threshold;
use crate::page::SHEET_ROW_LIMIT;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_data_dir_string")]
    pub data_dir: String,
    #[serde(default = "default_output_dir_string")]
    pub output_dir: String,
    #[serde(default = "default_max_rows_per_page")]
    pub max_rows_per_page: u32,
    #[serde(default = "default_grand_total")]
    pub grand_total: bool,
    /// Highlight rules per report name, replacing that report's defaults.
    #[serde(default)]
    pub thresholds: HashMap<String, Vec<Threshold>>,
}

fn default_max_rows_per_page() -> u32 {
    65_536
}

fn default_grand_total() -> bool {
    true
}

fn default_data_dir_string() -> String {
    default_data_dir().to_string_lossy().to_string()
}

fn default_output_dir_string() -> String {
    default_data_dir().join("reports").to_string_lossy().to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir_string(),
            output_dir: default_output_dir_string(),
            max_rows_per_page: default_max_rows_per_page(),
            grand_total: default_grand_total(),
            thresholds: HashMap::new(),
        }
    }
}

impl Settings {
    pub fn validate(&self) -> Result<()> {
        if self.max_rows_per_page == 0 || self.max_rows_per_page > SHEET_ROW_LIMIT {
            return Err(ReportError::Settings(format!(
                "max_rows_per_page must be between 1 and {SHEET_ROW_LIMIT}, got {}",
                self.max_rows_per_page
            )));
        }
        Ok(())
    }

    pub fn db_path(&self) -> PathBuf {
        PathBuf::from(&self.data_dir).join("fillsheet.db")
    }

    /// Configured rules for `report`, if the user overrode its defaults.
    pub fn thresholds_for(&self, report: &str) -> Option<&[Threshold]> {
        self.thresholds.get(report).map(Vec::as_slice)
    }
}

fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("fillsheet")
}

fn settings_path() -> PathBuf {
    config_dir().join("settings.json")
}

fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("Documents")
        .join("fillsheet")
}

pub fn load_settings() -> Settings {
    load_settings_from(&settings_path())
}

fn load_settings_from(path: &Path) -> Settings {
    if path.exists() {
        let content = std::fs::read_to_string(path).unwrap_or_default();
        serde_json::from_str(&content).unwrap_or_default()
    } else {
        Settings::default()
    }
}

pub fn save_settings(settings: &Settings) -> Result<()> {
    save_settings_to(settings, &settings_path())
}

fn save_settings_to(settings: &Settings, path: &Path) -> Result<()> {
    settings.validate()?;
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    let json = serde_json::to_string_pretty(settings)
        .map_err(|e| ReportError::Settings(e.to_string()))?;
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
        let mut settings = Settings {
            data_dir: "/tmp/fill".to_string(),
            max_rows_per_page: 500,
            ..Settings::default()
        };
        settings
            .thresholds
            .insert("fill-rate".into(), vec![Threshold::below("fill_rate", 95.0)]);
        save_settings_to(&settings, &path).unwrap();

        let loaded = load_settings_from(&path);
        assert_eq!(loaded.data_dir, "/tmp/fill");
        assert_eq!(loaded.max_rows_per_page, 500);
        assert_eq!(
            loaded.thresholds_for("fill-rate"),
            Some(&[Threshold::below("fill_rate", 95.0)][..])
        );
        assert!(loaded.thresholds_for("perfect-order").is_none());
    }

    #[test]
    fn test_load_returns_defaults_when_missing() {
        let dir = tempfile::tempdir().unwrap();
        let s = load_settings_from(&dir.path().join("absent.json"));
        assert_eq!(s.max_rows_per_page, 65_536);
        assert!(s.grand_total);
        assert!(s.output_dir.ends_with("reports"));
    }

    #[test]
    fn test_load_merges_with_defaults() {
        let json = r#"{"data_dir": "/tmp/test", "grand_total": false}"#;
        let s: Settings = serde_json::from_str(json).unwrap();
        assert_eq!(s.data_dir, "/tmp/test");
        assert!(!s.grand_total);
        assert_eq!(s.max_rows_per_page, 65_536);
        assert!(s.thresholds.is_empty());
    }

    #[test]
    fn test_page_size_beyond_sheet_limit_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings {
            max_rows_per_page: SHEET_ROW_LIMIT + 1,
            ..Settings::default()
        };
        let err = save_settings_to(&settings, &dir.path().join("s.json")).unwrap_err();
        assert!(matches!(err, ReportError::Settings(_)));
    }

    #[test]
    fn test_threshold_without_bounds_parses() {
        let json = r#"{"thresholds": {"store-sales": [{"metric": "week_of_supply", "above": 12.0}]}}"#;
        let s: Settings = serde_json::from_str(json).unwrap();
        let rules = s.thresholds_for("store-sales").unwrap();
        assert_eq!(rules[0].below, None);
        assert_eq!(rules[0].above, Some(12.0));
    }
}

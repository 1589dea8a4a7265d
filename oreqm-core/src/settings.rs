use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use crate::render::RenderOptions;
use crate::safety::{SafetyRules, DEFAULT_SAFETY_RULES};
use crate::traverse::Exclusions;

/// Persistent user settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Settings {
    /// Record fields left out of diff comparisons
    pub ignored_fields: BTreeSet<String>,
    /// Ordered safety-class rules, first match wins
    pub safety_rules: Vec<String>,
    /// Doctypes linked to the top node when rendering
    pub top_doctypes: Vec<String>,
    pub max_nodes: usize,
    pub show_coverage: bool,
    pub show_status: bool,
    pub show_errors: bool,
    /// Flood fill one hop from search hits instead of the full closure
    pub limit_depth: bool,
    pub exclude_rejected: bool,
    pub excluded_doctypes: BTreeSet<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            ignored_fields: BTreeSet::new(),
            safety_rules: DEFAULT_SAFETY_RULES.iter().map(|r| r.to_string()).collect(),
            top_doctypes: Vec::new(),
            max_nodes: 1000,
            show_coverage: true,
            show_status: false,
            show_errors: true,
            limit_depth: false,
            exclude_rejected: false,
            excluded_doctypes: BTreeSet::new(),
        }
    }
}

impl Settings {
    /// Loads settings from the provided path
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read settings file: {:?}", path.as_ref()))?;

        serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse settings file: {:?}", path.as_ref()))
    }

    /// Loads settings, falling back to defaults when the file does not exist
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        if !path.as_ref().exists() {
            log::debug!("no settings at {:?}, using defaults", path.as_ref());
            return Ok(Self::default());
        }
        Self::load(path)
    }

    /// Save the settings to the specified path
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_yaml::to_string(&self)?;

        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }

        fs::write(&path, content)
            .with_context(|| format!("Failed to write settings to {:?}", path.as_ref()))?;

        Ok(())
    }

    /// Compiles the configured safety rules
    pub fn compiled_safety_rules(&self) -> Result<SafetyRules> {
        SafetyRules::from_patterns(&self.safety_rules)
            .context("Settings contain an invalid safety rule")
    }

    pub fn ignored_field_set(&self) -> HashSet<String> {
        self.ignored_fields.iter().cloned().collect()
    }

    /// Display options derived from these settings
    pub fn render_options(&self) -> RenderOptions {
        RenderOptions {
            top_doctypes: self.top_doctypes.clone(),
            max_nodes: self.max_nodes,
            show_coverage: self.show_coverage,
            show_status: self.show_status,
            show_errors: self.show_errors,
            highlight: BTreeSet::new(),
            exclusions: Exclusions {
                doctypes: self.excluded_doctypes.iter().cloned().collect(),
                ids: HashSet::new(),
                exclude_rejected: self.exclude_rejected,
            },
        }
    }
}

/// Gets the path to the settings file
pub fn get_settings_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("OREQM_SETTINGS_PATH") {
        return Ok(PathBuf::from(path));
    }

    let config_dir = dirs::config_dir().context("Failed to determine config directory")?;

    Ok(config_dir.join("oreqm").join("settings.yaml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_settings_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("settings.yaml");

        let mut settings = Settings::default();
        settings.ignored_fields.insert("comment".to_string());
        settings.top_doctypes.push("swrs".to_string());
        settings.limit_depth = true;
        settings.save(&path).unwrap();

        let loaded = Settings::load(&path).unwrap();
        assert_eq!(loaded, settings);
    }

    #[test]
    fn test_missing_fields_take_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.yaml");
        fs::write(&path, "max_nodes: 50\n").unwrap();

        let loaded = Settings::load(&path).unwrap();
        assert_eq!(loaded.max_nodes, 50);
        assert_eq!(loaded.safety_rules.len(), DEFAULT_SAFETY_RULES.len());
        assert!(loaded.show_errors);
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let dir = TempDir::new().unwrap();
        let loaded = Settings::load_or_default(dir.path().join("absent.yaml")).unwrap();
        assert_eq!(loaded, Settings::default());
        assert!(Settings::load(dir.path().join("absent.yaml")).is_err());
    }

    #[test]
    fn test_invalid_rule_is_reported() {
        let settings = Settings {
            safety_rules: vec!["no separator".to_string()],
            ..Default::default()
        };
        assert!(settings.compiled_safety_rules().is_err());
    }

    #[test]
    fn test_render_options_carry_exclusions() {
        let settings = Settings {
            excluded_doctypes: ["impl".to_string()].into_iter().collect(),
            exclude_rejected: true,
            ..Default::default()
        };
        let options = settings.render_options();
        assert!(options.exclusions.doctypes.contains("impl"));
        assert!(options.exclusions.exclude_rejected);
        assert_eq!(options.max_nodes, 1000);
    }
}

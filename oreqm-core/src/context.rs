//! Saved working context: which files were open, what was searched and
//! how the result was displayed

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use crate::query::SearchMode;

/// Display settings carried in a context file
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DisplaySettings {
    pub ignored_fields: BTreeSet<String>,
    pub safety_rules: Vec<String>,
    pub show_coverage: bool,
    pub show_status: bool,
    pub show_errors: bool,
}

/// A working context, stored as JSON
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ContextSnapshot {
    pub main_file: Option<PathBuf>,
    #[serde(default)]
    pub reference_file: Option<PathBuf>,
    #[serde(default)]
    pub search_mode: SearchMode,
    #[serde(default)]
    pub search_pattern: String,
    #[serde(default)]
    pub excluded_ids: BTreeSet<String>,
    #[serde(default)]
    pub excluded_doctypes: BTreeSet<String>,
    #[serde(default)]
    pub limit_depth: bool,
    #[serde(default)]
    pub display: DisplaySettings,
    pub saved_at: DateTime<Utc>,
}

impl ContextSnapshot {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read context file: {:?}", path.as_ref()))?;

        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse context file: {:?}", path.as_ref()))
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_json::to_string_pretty(&self)?;

        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }

        fs::write(&path, content)
            .with_context(|| format!("Failed to write context to {:?}", path.as_ref()))?;

        log::info!("saved context to {:?}", path.as_ref());
        Ok(())
    }
}

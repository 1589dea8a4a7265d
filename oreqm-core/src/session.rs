//! A working session: the main snapshot, an optional reference snapshot and
//! everything derived from them

use chrono::Utc;
use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};

use crate::context::{ContextSnapshot, DisplaySettings};
use crate::doctypes::{render_doctype_relations, DoctypeRender};
use crate::error::{OreqmError, Result};
use crate::ingest::{load_oreqm, parse_oreqm};
use crate::models::Record;
use crate::query::{search, QueryError, SearchMode};
use crate::render::{DoctypePalette, RenderOutput, Renderer};
use crate::safety::{SafetyRuleError, SafetyRules};
use crate::settings::Settings;
use crate::store::RecordStore;
use crate::tagged::TaggedTextIndex;
use crate::traverse::{Mark, Traversal, UNLIMITED_DEPTH};

/// Owns the loaded snapshots and the state of the current selection
#[derive(Debug)]
pub struct Session {
    main: Option<RecordStore>,
    reference: Option<RecordStore>,
    main_path: Option<PathBuf>,
    reference_path: Option<PathBuf>,
    settings: Settings,
    safety_rules: SafetyRules,
    traversal: Traversal,
    text_index: Option<TaggedTextIndex>,
    renderer: Renderer,
    excluded_ids: BTreeSet<String>,
    search_mode: SearchMode,
    search_pattern: String,
    /// Direct search hits, drawn as "selected"
    selection: BTreeSet<String>,
    select_all: bool,
}

impl Default for Session {
    fn default() -> Self {
        Self::new(Settings::default())
    }
}

impl Session {
    pub fn new(settings: Settings) -> Self {
        let safety_rules = match settings.compiled_safety_rules() {
            Ok(rules) => rules,
            Err(e) => {
                log::warn!("{:#}; using default safety rules", e);
                SafetyRules::default()
            }
        };
        Self {
            main: None,
            reference: None,
            main_path: None,
            reference_path: None,
            settings,
            safety_rules,
            traversal: Traversal::new(),
            text_index: None,
            renderer: Renderer::new(),
            excluded_ids: BTreeSet::new(),
            search_mode: SearchMode::default(),
            search_pattern: String::new(),
            selection: BTreeSet::new(),
            select_all: true,
        }
    }

    pub fn main(&self) -> Option<&RecordStore> {
        self.main.as_ref()
    }

    pub fn reference(&self) -> Option<&RecordStore> {
        self.reference.as_ref()
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Applies `change` to the settings and re-runs the current selection
    /// so exclusions and depth limits take effect on the marks.
    pub fn update_settings<F: FnOnce(&mut Settings)>(&mut self, change: F) {
        let previous_rules = self.settings.safety_rules.clone();
        change(&mut self.settings);
        if self.settings.safety_rules != previous_rules {
            match self.settings.compiled_safety_rules() {
                Ok(rules) => {
                    self.safety_rules = rules;
                    if let Some(main) = self.main.as_mut() {
                        self.safety_rules.check_store(main);
                    }
                }
                Err(e) => {
                    log::warn!("{:#}; keeping previous safety rules", e);
                    self.settings.safety_rules = previous_rules;
                }
            }
        }
        self.renderer.invalidate();
        self.reapply_search();
    }

    pub fn safety_rules(&self) -> &SafetyRules {
        &self.safety_rules
    }

    pub fn selection(&self) -> &BTreeSet<String> {
        &self.selection
    }

    pub fn traversal(&self) -> &Traversal {
        &self.traversal
    }

    /// Replaces the main snapshot with the parsed document.
    ///
    /// Any reference snapshot is dropped; the selection resets to everything.
    pub fn load_main(&mut self, text: &str) -> Result<()> {
        let mut store = parse_oreqm(text)?;
        self.safety_rules.check_store(&mut store);
        self.main = Some(store);
        self.main_path = None;
        self.reference = None;
        self.reference_path = None;
        self.reset_selection();
        Ok(())
    }

    pub fn load_main_file<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let mut store = load_oreqm(&path)?;
        self.safety_rules.check_store(&mut store);
        self.main = Some(store);
        self.main_path = Some(path.as_ref().to_path_buf());
        self.reference = None;
        self.reference_path = None;
        self.reset_selection();
        Ok(())
    }

    /// Parses a reference snapshot and diffs the main snapshot against it
    pub fn load_reference(&mut self, text: &str) -> Result<()> {
        let reference = parse_oreqm(text)?;
        self.apply_reference(reference)?;
        self.reference_path = None;
        Ok(())
    }

    pub fn load_reference_file<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let reference = load_oreqm(&path)?;
        self.apply_reference(reference)?;
        self.reference_path = Some(path.as_ref().to_path_buf());
        Ok(())
    }

    fn apply_reference(&mut self, reference: RecordStore) -> Result<()> {
        let ignored = self.settings.ignored_field_set();
        let main = self.main.as_mut().ok_or(OreqmError::NoDocument)?;
        main.diff_against(&reference, &ignored);
        self.safety_rules.check_store(main);
        self.reference = Some(reference);
        self.reapply_search();
        Ok(())
    }

    /// Drops the reference snapshot and every ghost it produced
    pub fn clear_reference(&mut self) {
        if let Some(main) = self.main.as_mut() {
            main.remove_ghosts();
            self.safety_rules.check_store(main);
        }
        self.reference = None;
        self.reference_path = None;
        self.reapply_search();
    }

    fn reset_selection(&mut self) {
        self.traversal.clear();
        self.selection.clear();
        self.select_all = true;
        self.search_pattern.clear();
        self.text_index = None;
        self.renderer.invalidate();
    }

    /// Re-runs the last search after the snapshot or the exclusions changed
    fn reapply_search(&mut self) {
        let mode = self.search_mode;
        let pattern = self.search_pattern.clone();
        if let Err(e) = self.select(mode, &pattern) {
            log::warn!("stored search no longer valid: {}", e);
            self.traversal.clear();
            self.selection.clear();
            self.select_all = true;
        }
    }

    fn text_index(&mut self) -> Option<(&RecordStore, &TaggedTextIndex)> {
        let main = self.main.as_ref()?;
        let stale = self
            .text_index
            .as_ref()
            .map(|index| !index.is_current(main))
            .unwrap_or(true);
        if stale {
            self.text_index = Some(TaggedTextIndex::build(main));
        }
        self.text_index.as_ref().map(|index| (main, index))
    }

    /// Keys matching `pattern`; an empty store yields an empty set
    pub fn search(&mut self, mode: SearchMode, pattern: &str) -> std::result::Result<BTreeSet<String>, QueryError> {
        match self.text_index() {
            Some((main, index)) => search(main, index, mode, pattern),
            None => Ok(BTreeSet::new()),
        }
    }

    fn flood_depth(&self) -> u32 {
        if self.settings.limit_depth {
            1
        } else {
            UNLIMITED_DEPTH
        }
    }

    fn exclusions(&self) -> crate::traverse::Exclusions {
        let mut exclusions = self.settings.render_options().exclusions;
        exclusions.ids = self.excluded_ids.iter().cloned().collect();
        exclusions
    }

    /// Searches and marks the neighbourhood of every hit.
    ///
    /// An empty pattern selects everything. A malformed pattern leaves the
    /// previous selection in place.
    pub fn select(&mut self, mode: SearchMode, pattern: &str) -> std::result::Result<usize, QueryError> {
        if pattern.trim().is_empty() {
            self.search_mode = mode;
            self.search_pattern.clear();
            self.traversal.clear();
            self.selection.clear();
            self.select_all = true;
            return Ok(self.main.as_ref().map(RecordStore::len).unwrap_or(0));
        }

        let hits = self.search(mode, pattern)?;
        let exclusions = self.exclusions();
        let depth = self.flood_depth();
        self.traversal.clear();
        if let Some(main) = self.main.as_ref() {
            self.traversal
                .mark_neighborhood(main, &exclusions, hits.iter().map(String::as_str), depth);
        }
        self.search_mode = mode;
        self.search_pattern = pattern.to_string();
        self.selection = hits;
        self.select_all = false;
        log::info!(
            "selected {} hits, {} records marked",
            self.selection.len(),
            self.traversal.marked().len()
        );
        Ok(self.selection.len())
    }

    /// Keeps `key` out of the selection; traversal stops at it
    pub fn exclude_id(&mut self, key: &str) {
        if self.excluded_ids.insert(key.to_string()) {
            self.reapply_search();
        }
    }

    pub fn include_id(&mut self, key: &str) {
        if self.excluded_ids.remove(key) {
            self.reapply_search();
        }
    }

    pub fn excluded_ids(&self) -> &BTreeSet<String> {
        &self.excluded_ids
    }

    /// Renders the current selection; `None` when nothing is loaded
    pub fn render(
        &mut self,
        palette: &dyn DoctypePalette,
        on_limit: &mut dyn FnMut(usize),
    ) -> Option<RenderOutput> {
        let main = self.main.as_ref()?;
        let mut options = self.settings.render_options();
        options.exclusions = self.exclusions();
        options.highlight = self.selection.clone();

        let select_all = self.select_all;
        let select = move |_: &str, _: &Record, marks: Option<&HashSet<Mark>>| {
            select_all || marks.map(|m| !m.is_empty()).unwrap_or(false)
        };
        Some(
            self.renderer
                .render(main, &options, palette, &self.traversal, &select, on_limit),
        )
    }

    /// Doctype relationship graph of the main snapshot
    pub fn render_doctypes(
        &self,
        palette: &dyn DoctypePalette,
        split_by_safety: bool,
    ) -> Option<DoctypeRender> {
        let main = self.main.as_ref()?;
        Some(render_doctype_relations(
            main,
            &self.safety_rules,
            palette,
            split_by_safety,
        ))
    }

    /// Validates and installs new safety rules; on error the current rules stay
    pub fn set_safety_rules(&mut self, values: &[serde_json::Value]) -> std::result::Result<(), SafetyRuleError> {
        let rules = SafetyRules::from_values(values)?;
        self.settings.safety_rules = rules.patterns();
        self.safety_rules = rules;
        if let Some(main) = self.main.as_mut() {
            self.safety_rules.check_store(main);
        }
        Ok(())
    }

    /// Problem log of the main snapshot as text
    pub fn problems_report(&self) -> String {
        self.main
            .as_ref()
            .map(|m| m.problems().report_text())
            .unwrap_or_default()
    }

    /// Captures the state needed to restore this session later
    pub fn context(&self) -> ContextSnapshot {
        ContextSnapshot {
            main_file: self.main_path.clone(),
            reference_file: self.reference_path.clone(),
            search_mode: self.search_mode,
            search_pattern: self.search_pattern.clone(),
            excluded_ids: self.excluded_ids.clone(),
            excluded_doctypes: self.settings.excluded_doctypes.clone(),
            limit_depth: self.settings.limit_depth,
            display: DisplaySettings {
                ignored_fields: self.settings.ignored_fields.clone(),
                safety_rules: self.settings.safety_rules.clone(),
                show_coverage: self.settings.show_coverage,
                show_status: self.settings.show_status,
                show_errors: self.settings.show_errors,
            },
            saved_at: Utc::now(),
        }
    }

    /// Reloads the files named in `ctx` and re-runs its search
    pub fn restore_context(&mut self, ctx: &ContextSnapshot) -> anyhow::Result<()> {
        let display = &ctx.display;
        if !display.safety_rules.is_empty() {
            let values: Vec<serde_json::Value> = display
                .safety_rules
                .iter()
                .map(|r| serde_json::Value::String(r.clone()))
                .collect();
            self.set_safety_rules(&values)?;
        }
        self.settings.ignored_fields = display.ignored_fields.clone();
        self.settings.show_coverage = display.show_coverage;
        self.settings.show_status = display.show_status;
        self.settings.show_errors = display.show_errors;
        self.settings.limit_depth = ctx.limit_depth;
        self.settings.excluded_doctypes = ctx.excluded_doctypes.clone();

        if let Some(path) = &ctx.main_file {
            self.load_main_file(path)?;
        }
        if let Some(path) = &ctx.reference_file {
            self.load_reference_file(path)?;
        }
        self.excluded_ids = ctx.excluded_ids.clone();
        self.select(ctx.search_mode, &ctx.search_pattern)?;
        Ok(())
    }
}

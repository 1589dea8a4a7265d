//! Structural comparison of two snapshots
//!
//! [`diff_stores`] is pure: it reads a clean current store and a reference
//! store and returns a [`DiffResult`]. [`RecordStore::apply_diff`] merges
//! that result into the current store (ghost records, edge markers) and
//! [`RecordStore::remove_ghosts`] undoes the merge.

use indexmap::IndexMap;
use std::collections::HashSet;

use crate::models::{DiffMarker, FulfilledBy, LinkTo, Record};
use crate::store::RecordStore;

/// Edge annotations for one record of the current store
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EdgeOverlay {
    /// Marker per `linksto` entry, index aligned with the record
    pub linksto: Vec<DiffMarker>,
    /// Marker per `fulfilledby` entry, index aligned with the record
    pub fulfilledby: Vec<DiffMarker>,
    /// Edges only found in the reference record
    pub removed_linksto: Vec<LinkTo>,
    pub removed_fulfilledby: Vec<FulfilledBy>,
}

/// Outcome of comparing a current store with a reference store
#[derive(Debug, Clone, Default)]
pub struct DiffResult {
    pub new: Vec<String>,
    pub changed: Vec<String>,
    pub removed: Vec<String>,
    pub edges: IndexMap<String, EdgeOverlay>,
    /// Reference-only records, already flagged as ghosts
    pub ghosts: Vec<(String, Record)>,
}

impl DiffResult {
    pub fn is_empty(&self) -> bool {
        self.new.is_empty() && self.changed.is_empty() && self.removed.is_empty()
    }
}

/// Compares `current` against `reference`.
///
/// `current` must not carry ghosts from an earlier diff; ghosts and removed
/// edges found there are skipped.
pub fn diff_stores(
    current: &RecordStore,
    reference: &RecordStore,
    ignored: &HashSet<String>,
) -> DiffResult {
    let mut result = DiffResult::default();

    for (key, rec) in current.iter() {
        if rec.ghost {
            continue;
        }
        let old = reference.get(key);
        if !rec.has_content() && old.map_or(true, |o| !o.has_content()) {
            continue;
        }
        match old {
            Some(old) if rec.same_content(old, ignored) => {}
            Some(old) => {
                result.changed.push(key.to_string());
                result
                    .edges
                    .insert(key.to_string(), reconcile_edges(rec, old, reference));
            }
            None => {
                result.new.push(key.to_string());
                result.edges.insert(
                    key.to_string(),
                    EdgeOverlay {
                        linksto: vec![DiffMarker::New; rec.linksto.len()],
                        fulfilledby: vec![DiffMarker::New; rec.fulfilledby.len()],
                        ..Default::default()
                    },
                );
            }
        }
    }

    for (key, old) in reference.iter() {
        if old.ghost || !old.has_content() || current.contains(key) {
            continue;
        }
        let mut ghost = old.clone();
        ghost.clear_diff_markers();
        ghost.ghost = true;
        for link in &mut ghost.linksto {
            link.diff = DiffMarker::Removed;
        }
        for ffb in &mut ghost.fulfilledby {
            ffb.diff = DiffMarker::Removed;
        }
        result.removed.push(key.to_string());
        result.ghosts.push((key.to_string(), ghost));
    }

    log::info!(
        "diff: {} new, {} changed, {} removed",
        result.new.len(),
        result.changed.len(),
        result.removed.len()
    );
    result
}

/// Matches edges by target id; edges only present in the reference record
/// come back as removed unless they already dangled there.
fn reconcile_edges(rec: &Record, old: &Record, reference: &RecordStore) -> EdgeOverlay {
    let mut overlay = EdgeOverlay::default();

    for link in &rec.linksto {
        let marker = match old.linksto.iter().find(|o| o.target == link.target) {
            Some(o) if o.version != link.version => DiffMarker::Changed,
            Some(_) => DiffMarker::None,
            None => DiffMarker::New,
        };
        overlay.linksto.push(marker);
    }
    for link in &old.linksto {
        if link.diff == DiffMarker::Removed
            || rec.linksto.iter().any(|l| l.target == link.target)
            || !reference.contains(&reference.resolve_key(&link.target, &link.version))
        {
            continue;
        }
        overlay.removed_linksto.push(LinkTo {
            diff: DiffMarker::Removed,
            ..link.clone()
        });
    }

    for ffb in &rec.fulfilledby {
        let marker = match old.fulfilledby.iter().find(|o| o.id == ffb.id) {
            Some(o) if o.version != ffb.version || o.doctype != ffb.doctype => DiffMarker::Changed,
            Some(_) => DiffMarker::None,
            None => DiffMarker::New,
        };
        overlay.fulfilledby.push(marker);
    }
    for ffb in &old.fulfilledby {
        if ffb.diff == DiffMarker::Removed
            || rec.fulfilledby.iter().any(|f| f.id == ffb.id)
            || !reference.contains(&reference.resolve_key(&ffb.id, &ffb.version))
        {
            continue;
        }
        overlay.removed_fulfilledby.push(FulfilledBy {
            diff: DiffMarker::Removed,
            ..ffb.clone()
        });
    }

    overlay
}

impl RecordStore {
    /// Purges earlier ghosts, diffs against `reference` and merges the result
    pub fn diff_against(&mut self, reference: &RecordStore, ignored: &HashSet<String>) {
        self.remove_ghosts();
        let result = diff_stores(self, reference, ignored);
        self.apply_diff(result);
    }

    /// Merges a diff computed against this (clean) store
    pub fn apply_diff(&mut self, result: DiffResult) {
        for (key, overlay) in result.edges {
            let Some(rec) = self.records.get_mut(&key) else {
                continue;
            };
            for (link, marker) in rec.linksto.iter_mut().zip(overlay.linksto) {
                link.diff = marker;
            }
            for (ffb, marker) in rec.fulfilledby.iter_mut().zip(overlay.fulfilledby) {
                ffb.diff = marker;
            }
            rec.linksto.extend(overlay.removed_linksto);
            rec.fulfilledby.extend(overlay.removed_fulfilledby);
        }

        for (key, ghost) in result.ghosts {
            if self.records.contains_key(&key) {
                continue;
            }
            if key != ghost.id {
                self.register_duplicate(&ghost.id, &key, &ghost.version);
            }
            self.doctypes
                .entry(ghost.doctype.clone())
                .or_default()
                .push(key.clone());
            self.records.insert(key, ghost);
        }

        self.set_diff_keys(result.new, result.changed, result.removed);
        self.rebuild_graph();
    }

    /// Removes ghost records and edge markers left by the last diff
    pub fn remove_ghosts(&mut self) {
        if self.new_keys.is_empty() && self.changed_keys.is_empty() && self.removed_keys.is_empty() {
            return;
        }
        let removed = std::mem::take(&mut self.removed_keys);
        for key in &removed {
            if let Some(rec) = self.records.shift_remove(key) {
                if let Some(keys) = self.doctypes.get_mut(&rec.doctype) {
                    keys.retain(|k| k != key);
                }
                if key != &rec.id {
                    self.unregister_duplicate(&rec.id, key);
                }
            }
        }
        let touched: Vec<String> = self
            .new_keys
            .drain(..)
            .chain(self.changed_keys.drain(..))
            .collect();
        self.diff_index.clear();
        for key in touched {
            if let Some(rec) = self.records.get_mut(&key) {
                rec.clear_diff_markers();
            }
        }
        log::debug!("removed {} ghost records", removed.len());
        self.rebuild_graph();
    }
}

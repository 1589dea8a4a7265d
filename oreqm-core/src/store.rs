use indexmap::IndexMap;
use std::collections::HashMap;

use crate::graph::LinkGraph;
use crate::models::{DiffMarker, DuplicateEntry, Record};
use crate::problems::{ProblemKind, ProblemLog};

/// Resolves the store key for an `(id, version)` reference.
///
/// Falls back to the bare id when the id is not duplicated or no
/// occurrence has the requested version.
pub(crate) fn resolve_key(
    duplicates: &HashMap<String, Vec<DuplicateEntry>>,
    id: &str,
    version: &str,
) -> String {
    duplicates
        .get(id)
        .and_then(|entries| entries.iter().find(|e| e.version == version))
        .map(|e| e.key.clone())
        .unwrap_or_else(|| id.to_string())
}

/// All records of one snapshot plus the indices derived from them
#[derive(Debug, Clone, Default)]
pub struct RecordStore {
    pub(crate) records: IndexMap<String, Record>,
    pub(crate) doctypes: IndexMap<String, Vec<String>>,
    pub(crate) duplicates: HashMap<String, Vec<DuplicateEntry>>,
    pub(crate) rules: IndexMap<String, String>,
    pub(crate) timestamp: String,
    pub(crate) source_text: String,
    pub(crate) problems: ProblemLog,
    pub(crate) graph: LinkGraph,
    pub(crate) new_keys: Vec<String>,
    pub(crate) changed_keys: Vec<String>,
    pub(crate) removed_keys: Vec<String>,
    /// Key to diff state, kept in step with the three key lists
    pub(crate) diff_index: HashMap<String, DiffMarker>,
    version: u64,
}

impl RecordStore {
    /// Creates an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Content version, bumped by every mutation
    pub fn version(&self) -> u64 {
        self.version
    }

    pub(crate) fn touch(&mut self) {
        self.version += 1;
    }

    /// Inserts a record and returns the key it was stored under.
    ///
    /// A repeated id gets `:<version>` appended until the key is unique;
    /// a repeated id+version pair is reported but kept.
    pub fn insert(&mut self, record: Record) -> String {
        let id = record.id.clone();
        let mut key = id.clone();

        if let Some(existing) = self.records.get(&id) {
            let first = DuplicateEntry {
                key: id.clone(),
                version: existing.version.clone(),
            };
            let entries = self.duplicates.entry(id.clone()).or_insert_with(|| vec![first]);
            if entries.iter().any(|e| e.version == record.version) {
                self.problems.report(
                    ProblemKind::DuplicateIdVersion,
                    format!("id {} with version {} appears more than once", id, record.version),
                );
            }
            while self.records.contains_key(&key) {
                key = format!("{}:{}", key, record.version);
            }
            entries.push(DuplicateEntry {
                key: key.clone(),
                version: record.version.clone(),
            });
        }

        self.doctypes
            .entry(record.doctype.clone())
            .or_default()
            .push(key.clone());
        self.records.insert(key.clone(), record);
        self.touch();
        key
    }

    /// Synthesizes placeholders for fulfilledby targets that are not in the store.
    ///
    /// Every referencing record gains a `<doctype>*` need marker unless it
    /// already needs that doctype.
    pub fn add_fulfilledby_placeholders(&mut self) {
        let mut placeholders: IndexMap<String, Record> = IndexMap::new();
        let mut mismatches = Vec::new();

        for (key, rec) in &self.records {
            for ffb in &rec.fulfilledby {
                let target = resolve_key(&self.duplicates, &ffb.id, &ffb.version);
                match self.records.get(&target) {
                    Some(real) if real.doctype != ffb.doctype => mismatches.push(format!(
                        "ffbType {} for {} referenced by {} does not match doctype {}",
                        ffb.doctype, ffb.id, key, real.doctype
                    )),
                    Some(_) => {}
                    None => {
                        placeholders
                            .entry(ffb.id.clone())
                            .or_insert_with(|| Record::placeholder(ffb));
                    }
                }
            }
        }

        for rec in self.records.values_mut() {
            let doctypes: Vec<String> = rec.fulfilledby.iter().map(|f| f.doctype.clone()).collect();
            for dt in doctypes {
                let marker = format!("{}*", dt);
                if !rec.needsobj.contains(&dt) && !rec.needsobj.contains(&marker) {
                    rec.needsobj.push(marker);
                }
            }
        }

        for message in mismatches {
            self.problems.report(ProblemKind::DoctypeMismatch, message);
        }
        for (_, rec) in placeholders {
            log::debug!("fulfilledby placeholder created for {}", rec.id);
            self.insert(rec);
        }
        self.touch();
    }

    /// Rebuilds the link graph from the current records
    pub fn rebuild_graph(&mut self) {
        self.problems.clear_link_problems();
        self.graph = LinkGraph::build(&mut self.records, &self.duplicates, &mut self.problems);
        self.touch();
    }

    pub fn graph(&self) -> &LinkGraph {
        &self.graph
    }

    pub fn get(&self, key: &str) -> Option<&Record> {
        self.records.get(key)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut Record> {
        self.touch();
        self.records.get_mut(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.records.contains_key(key)
    }

    /// Store keys in insertion order
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.records.keys().map(String::as_str)
    }

    /// Records with their keys, in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Record)> {
        self.records.iter().map(|(k, r)| (k.as_str(), r))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Effective key for an `(id, version)` cross reference
    pub fn resolve_key(&self, id: &str, version: &str) -> String {
        resolve_key(&self.duplicates, id, version)
    }

    /// Doctype to keys index
    pub fn doctypes(&self) -> &IndexMap<String, Vec<String>> {
        &self.doctypes
    }

    /// Duplicate occurrences of an id, if it is duplicated
    pub fn duplicates_of(&self, id: &str) -> Option<&[DuplicateEntry]> {
        self.duplicates.get(id).map(Vec::as_slice)
    }

    /// True when the record under `key` shares its id with another record
    pub fn is_duplicate(&self, key: &str) -> bool {
        self.records
            .get(key)
            .map(|r| self.duplicates.contains_key(&r.id))
            .unwrap_or(false)
    }

    /// Rule id to rule description
    pub fn rules(&self) -> &IndexMap<String, String> {
        &self.rules
    }

    pub fn timestamp(&self) -> &str {
        &self.timestamp
    }

    pub fn problems(&self) -> &ProblemLog {
        &self.problems
    }

    pub fn problems_mut(&mut self) -> &mut ProblemLog {
        &mut self.problems
    }

    /// Verbatim XML of one specobject as found in the input document
    pub fn raw_source(&self, key: &str) -> Option<&str> {
        let range = self.records.get(key)?.source_range.clone()?;
        self.source_text.get(range)
    }

    pub fn new_keys(&self) -> &[String] {
        &self.new_keys
    }

    pub fn changed_keys(&self) -> &[String] {
        &self.changed_keys
    }

    pub fn removed_keys(&self) -> &[String] {
        &self.removed_keys
    }

    /// Diff state of a record after a diff was applied
    pub fn diff_status(&self, key: &str) -> DiffMarker {
        self.diff_index.get(key).copied().unwrap_or_default()
    }

    pub(crate) fn set_diff_keys(&mut self, new: Vec<String>, changed: Vec<String>, removed: Vec<String>) {
        self.diff_index.clear();
        for (keys, marker) in [
            (&new, DiffMarker::New),
            (&changed, DiffMarker::Changed),
            (&removed, DiffMarker::Removed),
        ] {
            for key in keys {
                self.diff_index.insert(key.clone(), marker);
            }
        }
        self.new_keys = new;
        self.changed_keys = changed;
        self.removed_keys = removed;
    }

    /// Records `key` as another occurrence of `id`
    pub(crate) fn register_duplicate(&mut self, id: &str, key: &str, version: &str) {
        let first = self.records.get(id).map(|r| DuplicateEntry {
            key: id.to_string(),
            version: r.version.clone(),
        });
        let entries = self
            .duplicates
            .entry(id.to_string())
            .or_insert_with(|| first.into_iter().collect());
        if !entries.iter().any(|e| e.key == key) {
            entries.push(DuplicateEntry {
                key: key.to_string(),
                version: version.to_string(),
            });
        }
    }

    /// Drops `key` from the occurrences of `id`; an id left with a single
    /// occurrence is no longer a duplicate
    pub(crate) fn unregister_duplicate(&mut self, id: &str, key: &str) {
        if let Some(entries) = self.duplicates.get_mut(id) {
            entries.retain(|e| e.key != key);
            if entries.len() < 2 {
                self.duplicates.remove(id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_ids_get_versioned_keys() {
        let mut store = RecordStore::new();
        let k1 = store.insert(Record::new("cc.a", "swrs", "1"));
        let k2 = store.insert(Record::new("cc.a", "swrs", "2"));

        assert_eq!(k1, "cc.a");
        assert_eq!(k2, "cc.a:2");
        assert_eq!(store.len(), 2);
        assert!(store.is_duplicate("cc.a"));
        assert!(store.is_duplicate("cc.a:2"));

        let dups = store.duplicates_of("cc.a").unwrap();
        assert_eq!(dups.len(), 2);
        assert_eq!(store.resolve_key("cc.a", "2"), "cc.a:2");
        assert_eq!(store.resolve_key("cc.a", "1"), "cc.a");
        assert_eq!(store.resolve_key("cc.a", "9"), "cc.a");
        assert!(store.problems().is_empty());
    }

    #[test]
    fn test_duplicate_id_and_version_is_reported_and_kept() {
        let mut store = RecordStore::new();
        store.insert(Record::new("cc.a", "swrs", "1"));
        let k2 = store.insert(Record::new("cc.a", "swrs", "1"));
        let k3 = store.insert(Record::new("cc.a", "swrs", "1"));

        assert_eq!(k2, "cc.a:1");
        assert_eq!(k3, "cc.a:1:1");
        assert_eq!(store.len(), 3);
        assert_eq!(store.problems().count(ProblemKind::DuplicateIdVersion), 2);
    }

    #[test]
    fn test_doctype_index() {
        let mut store = RecordStore::new();
        store.insert(Record::new("a", "swrs", "1"));
        store.insert(Record::new("b", "swdd", "1"));
        store.insert(Record::new("c", "swrs", "1"));

        assert_eq!(store.doctypes()["swrs"], vec!["a".to_string(), "c".to_string()]);
        assert_eq!(store.doctypes()["swdd"], vec!["b".to_string()]);
    }

    #[test]
    fn test_version_moves_on_mutation() {
        let mut store = RecordStore::new();
        let v0 = store.version();
        store.insert(Record::new("a", "swrs", "1"));
        let v1 = store.version();
        store.rebuild_graph();

        assert!(v1 > v0);
        assert!(store.version() > v1);
    }
}

//! Link graph derived from record cross references
//!
//! The graph is never authoritative: it is rebuilt from the records after
//! every load, diff merge and ghost purge.

use indexmap::{IndexMap, IndexSet};
use std::collections::{BTreeSet, HashMap, VecDeque};

use crate::models::{DiffMarker, DuplicateEntry, LinkKind, Record};
use crate::problems::{ProblemKind, ProblemLog};
use crate::store::resolve_key;

type Adjacency = HashMap<String, IndexSet<String>>;

/// Four directed adjacency indices over store keys
#[derive(Debug, Clone, Default)]
pub struct LinkGraph {
    /// key covers each of the values
    covers_of: Adjacency,
    /// key is covered by each of the values
    covered_by: Adjacency,
    /// key fulfills each of the values (also present in `covers_of`)
    fulfilled_by: Adjacency,
    /// untraced links, kept out of the coverage indices
    untraced: Adjacency,
}

impl LinkGraph {
    /// Walks every record once and derives the indices.
    ///
    /// Clears miscoverage entries that a real covering edge proves wrong.
    pub(crate) fn build(
        records: &mut IndexMap<String, Record>,
        duplicates: &HashMap<String, Vec<DuplicateEntry>>,
        problems: &mut ProblemLog,
    ) -> Self {
        let mut graph = LinkGraph::default();
        let mut covered_doctypes: Vec<(String, String)> = Vec::new();

        for (key, rec) in records.iter() {
            for link in &rec.linksto {
                let target = resolve_key(duplicates, &link.target, &link.version);
                if !records.contains_key(&target) {
                    problems.report_link(
                        ProblemKind::DanglingReference,
                        format!("{} links to {} which does not exist", key, link.target),
                    );
                    continue;
                }
                if &target == key {
                    problems.report_link(
                        ProblemKind::SelfReference,
                        format!("{} links to itself", key),
                    );
                    continue;
                }
                match link.kind {
                    LinkKind::Normal => {
                        add_edge(&mut graph.covers_of, key, &target);
                        add_edge(&mut graph.covered_by, &target, key);
                        if !rec.ghost && link.diff != DiffMarker::Removed {
                            covered_doctypes.push((target, rec.doctype.clone()));
                        }
                    }
                    LinkKind::Untraced => add_edge(&mut graph.untraced, key, &target),
                }
            }

            for ffb in &rec.fulfilledby {
                let child = resolve_key(duplicates, &ffb.id, &ffb.version);
                if !records.contains_key(&child) {
                    problems.report_link(
                        ProblemKind::DanglingReference,
                        format!("{} is fulfilled by {} which does not exist", key, ffb.id),
                    );
                    continue;
                }
                if &child == key {
                    problems.report_link(
                        ProblemKind::SelfReference,
                        format!("{} is fulfilled by itself", key),
                    );
                    continue;
                }
                add_edge(&mut graph.fulfilled_by, &child, key);
                add_edge(&mut graph.covers_of, &child, key);
                add_edge(&mut graph.covered_by, key, &child);
            }
        }

        for (target, doctype) in covered_doctypes {
            if let Some(rec) = records.get_mut(&target) {
                rec.miscov.retain(|m| m != &doctype);
            }
        }

        log::debug!(
            "link graph built: {} covers edges, {} fulfilledby edges, {} untraced edges",
            graph.edge_count(),
            graph.fulfilled_by.values().map(IndexSet::len).sum::<usize>(),
            graph.untraced.values().map(IndexSet::len).sum::<usize>()
        );
        graph
    }

    /// Keys covered by `key`
    pub fn covers_of(&self, key: &str) -> impl Iterator<Item = &str> {
        neighbours(&self.covers_of, key)
    }

    /// Keys covering `key`
    pub fn covered_by(&self, key: &str) -> impl Iterator<Item = &str> {
        neighbours(&self.covered_by, key)
    }

    /// Untraced link targets of `key`
    pub fn untraced(&self, key: &str) -> impl Iterator<Item = &str> {
        neighbours(&self.untraced, key)
    }

    /// True when the `from -> to` covers edge stems from a fulfilledby entry of `to`
    pub fn is_fulfilled_by(&self, from: &str, to: &str) -> bool {
        self.fulfilled_by
            .get(from)
            .map(|set| set.contains(to))
            .unwrap_or(false)
    }

    /// Number of covers edges, fulfilledby edges included
    pub fn edge_count(&self) -> usize {
        self.covers_of.values().map(IndexSet::len).sum()
    }

    /// Records directly covered by any of `keys`
    pub fn parents(&self, keys: &BTreeSet<String>) -> BTreeSet<String> {
        reach(&self.covers_of, keys, false)
    }

    /// Records directly covering any of `keys`
    pub fn children(&self, keys: &BTreeSet<String>) -> BTreeSet<String> {
        reach(&self.covered_by, keys, false)
    }

    /// Everything reachable from `keys` along covers edges
    pub fn ancestors(&self, keys: &BTreeSet<String>) -> BTreeSet<String> {
        reach(&self.covers_of, keys, true)
    }

    /// Everything reaching `keys` along covers edges
    pub fn descendants(&self, keys: &BTreeSet<String>) -> BTreeSet<String> {
        reach(&self.covered_by, keys, true)
    }
}

fn add_edge(index: &mut Adjacency, from: &str, to: &str) {
    index.entry(from.to_string()).or_default().insert(to.to_string());
}

fn neighbours<'a>(index: &'a Adjacency, key: &str) -> impl Iterator<Item = &'a str> {
    index
        .get(key)
        .into_iter()
        .flat_map(|set| set.iter().map(String::as_str))
}

/// Breadth-first reach; seeds only appear in the result when reached again
fn reach(index: &Adjacency, seeds: &BTreeSet<String>, transitive: bool) -> BTreeSet<String> {
    let mut result = BTreeSet::new();
    let mut queue: VecDeque<&str> = seeds.iter().map(String::as_str).collect();
    while let Some(key) = queue.pop_front() {
        for next in neighbours(index, key) {
            if result.insert(next.to_string()) && transitive {
                queue.push_back(next);
            }
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::parse_oreqm;
    use crate::test_support::*;

    fn set(keys: &[&str]) -> BTreeSet<String> {
        keys.iter().map(|k| k.to_string()).collect()
    }

    #[test]
    fn test_covers_indices_are_bidirectional() {
        let store = parse_oreqm(&chain_document()).unwrap();
        let graph = store.graph();

        assert_eq!(graph.covers_of("impl.a").collect::<Vec<_>>(), vec!["swdd.a"]);
        assert_eq!(graph.covered_by("swdd.a").collect::<Vec<_>>(), vec!["impl.a"]);
        assert_eq!(graph.covers_of("swdd.a").collect::<Vec<_>>(), vec!["swrs.a"]);
    }

    #[test]
    fn test_fulfilledby_acts_as_covers_edge() {
        let xml = document(&[
            specobjects(
                "swrs",
                &[specobject("swrs.a", "1", "top", "<fulfilledby><ffbObj><ffbId>swdd.a</ffbId><ffbType>swdd</ffbType><ffbVersion>1</ffbVersion></ffbObj></fulfilledby>")],
            ),
            specobjects("swdd", &[specobject("swdd.a", "1", "design", "")]),
        ]);
        let store = parse_oreqm(&xml).unwrap();
        let graph = store.graph();

        assert!(graph.is_fulfilled_by("swdd.a", "swrs.a"));
        assert_eq!(graph.covers_of("swdd.a").collect::<Vec<_>>(), vec!["swrs.a"]);
        assert_eq!(graph.covered_by("swrs.a").collect::<Vec<_>>(), vec!["swdd.a"]);
    }

    #[test]
    fn test_self_reference_is_reported() {
        let xml = document(&[specobjects(
            "swrs",
            &[specobject("swrs.a", "1", "loop", &covers("swrs.a", "1"))],
        )]);
        let store = parse_oreqm(&xml).unwrap();

        assert_eq!(store.graph().edge_count(), 0);
        assert_eq!(store.problems().count(ProblemKind::SelfReference), 1);
    }

    #[test]
    fn test_dangling_reference_is_reported_not_linked() {
        let xml = document(&[specobjects(
            "swrs",
            &[specobject("swrs.a", "1", "A", &covers("swrs.b", "1"))],
        )]);
        let store = parse_oreqm(&xml).unwrap();

        assert_eq!(store.graph().covers_of("swrs.a").count(), 0);
        assert_eq!(store.problems().count(ProblemKind::DanglingReference), 1);
    }

    #[test]
    fn test_rebuild_is_idempotent() {
        let mut store = parse_oreqm(&chain_document()).unwrap();
        let edges = store.graph().edge_count();
        let problems = store.problems().len();

        store.rebuild_graph();
        store.rebuild_graph();

        assert_eq!(store.graph().edge_count(), edges);
        assert_eq!(store.problems().len(), problems);
    }

    #[test]
    fn test_covering_edge_clears_miscoverage() {
        let xml = document(&[
            specobjects(
                "swrs",
                &[specobject(
                    "swrs.a",
                    "1",
                    "top",
                    "<needscoverage><needscov><needsobj>swdd</needsobj></needscov></needscoverage>",
                )],
            ),
            specobjects("swdd", &[specobject("swdd.a", "1", "d", &covers("swrs.a", "1"))]),
        ]);
        let store = parse_oreqm(&xml).unwrap();
        let rec = store.get("swrs.a").unwrap();

        assert_eq!(rec.needsobj, vec!["swdd".to_string()]);
        assert!(rec.miscov.is_empty());
    }

    #[test]
    fn test_one_hop_and_transitive_reach() {
        let store = parse_oreqm(&chain_document()).unwrap();
        let graph = store.graph();

        assert_eq!(graph.parents(&set(&["impl.a"])), set(&["swdd.a"]));
        assert_eq!(graph.ancestors(&set(&["impl.a"])), set(&["swdd.a", "swrs.a"]));
        assert_eq!(graph.children(&set(&["swrs.a"])), set(&["swdd.a"]));
        assert_eq!(graph.descendants(&set(&["swrs.a"])), set(&["swdd.a", "impl.a"]));
    }
}

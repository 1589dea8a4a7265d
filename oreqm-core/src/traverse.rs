//! Depth-bounded flood fill over the link graph
//!
//! Marks are transient: they are cleared before every selection and never
//! stored with the records.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};

use crate::models::Record;
use crate::store::RecordStore;

/// Depth value that never decrements, yielding full reachability
pub const UNLIMITED_DEPTH: u32 = u32::MAX;

/// Direction of a flood fill
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Direction {
    /// Toward dependencies, following `covers_of`
    Up,
    /// Toward dependents, following `covered_by`
    Down,
}

/// Tag left on a record by a flood fill
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Mark {
    pub direction: Direction,
    /// Remaining depth when the record was reached
    pub depth: u32,
}

/// Records a flood fill must never enter
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Exclusions {
    #[serde(default)]
    pub doctypes: HashSet<String>,
    #[serde(default)]
    pub ids: HashSet<String>,
    #[serde(default)]
    pub exclude_rejected: bool,
}

impl Exclusions {
    pub fn excludes(&self, key: &str, rec: &Record) -> bool {
        self.doctypes.contains(&rec.doctype)
            || (self.exclude_rejected && rec.is_rejected())
            || self.ids.contains(key)
            || self.ids.contains(&rec.id)
    }
}

/// Flood fill state: the marks of the current selection
#[derive(Debug, Clone, Default)]
pub struct Traversal {
    marks: HashMap<String, HashSet<Mark>>,
}

impl Traversal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops every mark
    pub fn clear(&mut self) {
        self.marks.clear();
    }

    /// Marks `seed` and its dependents up to `depth` hops away
    pub fn flood_down(&mut self, store: &RecordStore, exclusions: &Exclusions, seed: &str, depth: u32) {
        self.flood(store, exclusions, Direction::Down, seed, depth);
    }

    /// Marks `seed` and its dependencies up to `depth` hops away
    pub fn flood_up(&mut self, store: &RecordStore, exclusions: &Exclusions, seed: &str, depth: u32) {
        self.flood(store, exclusions, Direction::Up, seed, depth);
    }

    /// Marks the neighbourhood of every seed in both directions
    pub fn mark_neighborhood<'a, I>(
        &mut self,
        store: &RecordStore,
        exclusions: &Exclusions,
        seeds: I,
        depth: u32,
    ) where
        I: IntoIterator<Item = &'a str>,
    {
        for seed in seeds {
            self.flood_down(store, exclusions, seed, depth);
            self.flood_up(store, exclusions, seed, depth);
        }
        log::debug!("flood fill marked {} records", self.marks.len());
    }

    fn flood(
        &mut self,
        store: &RecordStore,
        exclusions: &Exclusions,
        direction: Direction,
        seed: &str,
        depth: u32,
    ) {
        let mut pending = vec![(seed.to_string(), depth)];

        while let Some((key, depth)) = pending.pop() {
            let Some(rec) = store.get(&key) else {
                continue;
            };
            if exclusions.excludes(&key, rec) {
                continue;
            }
            if !self
                .marks
                .entry(key.clone())
                .or_default()
                .insert(Mark { direction, depth })
            {
                continue;
            }
            if depth == 0 {
                continue;
            }
            let next_depth = if depth == UNLIMITED_DEPTH { depth } else { depth - 1 };
            let neighbours: Vec<&str> = match direction {
                Direction::Up => store.graph().covers_of(&key).collect(),
                Direction::Down => store.graph().covered_by(&key).collect(),
            };
            for next in neighbours {
                if next != key {
                    pending.push((next.to_string(), next_depth));
                }
            }
        }
    }

    pub fn is_marked(&self, key: &str) -> bool {
        self.marks.get(key).map(|m| !m.is_empty()).unwrap_or(false)
    }

    pub fn marks(&self, key: &str) -> Option<&HashSet<Mark>> {
        self.marks.get(key)
    }

    /// Keys carrying at least one mark
    pub fn marked(&self) -> BTreeSet<String> {
        self.marks
            .iter()
            .filter(|(_, m)| !m.is_empty())
            .map(|(k, _)| k.clone())
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.marks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::parse_oreqm;
    use crate::test_support::*;

    fn keys(t: &Traversal) -> Vec<String> {
        t.marked().into_iter().collect()
    }

    /// swrs.a <- swdd.a <- impl.a <- test.a, plus swrs.b <- swdd.a
    fn long_chain() -> RecordStore {
        let xml = document(&[
            specobjects(
                "swrs",
                &[
                    specobject("swrs.a", "1", "top", ""),
                    specobject_with_status("swrs.b", "1", "rejected", "old", ""),
                ],
            ),
            specobjects(
                "swdd",
                &[specobject(
                    "swdd.a",
                    "1",
                    "design",
                    "<providescoverage>\
                     <provcov><linksto>swrs.a</linksto><dstversion>1</dstversion></provcov>\
                     <provcov><linksto>swrs.b</linksto><dstversion>1</dstversion></provcov>\
                     </providescoverage>",
                )],
            ),
            specobjects("impl", &[specobject("impl.a", "1", "code", &covers("swdd.a", "1"))]),
            specobjects("test", &[specobject("test.a", "1", "check", &covers("impl.a", "1"))]),
        ]);
        parse_oreqm(&xml).unwrap()
    }

    #[test]
    fn test_depth_one_marks_direct_neighbours_only() {
        let store = long_chain();
        let mut t = Traversal::new();
        t.flood_down(&store, &Exclusions::default(), "swrs.a", 1);
        assert_eq!(keys(&t), vec!["swdd.a", "swrs.a"]);

        t.clear();
        t.flood_up(&store, &Exclusions::default(), "test.a", 1);
        assert_eq!(keys(&t), vec!["impl.a", "test.a"]);
    }

    #[test]
    fn test_unlimited_depth_reaches_everything() {
        let store = long_chain();
        let mut t = Traversal::new();
        t.flood_down(&store, &Exclusions::default(), "swrs.a", UNLIMITED_DEPTH);
        assert_eq!(keys(&t), vec!["impl.a", "swdd.a", "swrs.a", "test.a"]);

        t.clear();
        t.flood_up(&store, &Exclusions::default(), "test.a", UNLIMITED_DEPTH);
        assert_eq!(
            keys(&t),
            vec!["impl.a", "swdd.a", "swrs.a", "swrs.b", "test.a"]
        );
    }

    #[test]
    fn test_marks_record_direction_and_depth() {
        let store = long_chain();
        let mut t = Traversal::new();
        t.flood_down(&store, &Exclusions::default(), "swrs.a", 2);

        let marks = t.marks("impl.a").unwrap();
        assert!(marks.contains(&Mark {
            direction: Direction::Down,
            depth: 0
        }));
        assert!(!t.is_marked("test.a"));
    }

    #[test]
    fn test_excluded_records_are_never_marked() {
        let store = long_chain();
        let mut t = Traversal::new();

        let by_doctype = Exclusions {
            doctypes: ["impl".to_string()].into_iter().collect(),
            ..Default::default()
        };
        t.flood_down(&store, &by_doctype, "swrs.a", UNLIMITED_DEPTH);
        assert_eq!(keys(&t), vec!["swdd.a", "swrs.a"]);

        t.clear();
        let by_id = Exclusions {
            ids: ["swdd.a".to_string()].into_iter().collect(),
            ..Default::default()
        };
        t.flood_down(&store, &by_id, "swrs.a", UNLIMITED_DEPTH);
        assert_eq!(keys(&t), vec!["swrs.a"]);

        t.clear();
        let rejected = Exclusions {
            exclude_rejected: true,
            ..Default::default()
        };
        t.flood_up(&store, &rejected, "test.a", UNLIMITED_DEPTH);
        assert!(!t.is_marked("swrs.b"));
        assert!(t.is_marked("swrs.a"));
    }

    #[test]
    fn test_neighbourhood_marks_both_directions() {
        let store = long_chain();
        let mut t = Traversal::new();
        t.mark_neighborhood(&store, &Exclusions::default(), ["impl.a"], 1);
        assert_eq!(keys(&t), vec!["impl.a", "swdd.a", "test.a"]);
    }

    #[test]
    fn test_cycles_terminate() {
        let xml = document(&[specobjects(
            "swrs",
            &[
                specobject("a", "1", "A", &covers("b", "1")),
                specobject("b", "1", "B", &covers("a", "1")),
            ],
        )]);
        let store = parse_oreqm(&xml).unwrap();
        let mut t = Traversal::new();
        t.flood_up(&store, &Exclusions::default(), "a", UNLIMITED_DEPTH);
        assert_eq!(keys(&t), vec!["a", "b"]);
    }
}

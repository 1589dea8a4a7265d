//! Doctype relationship graph: one node per doctype (optionally per
//! doctype and safety class), edges aggregated over every record.

use indexmap::IndexMap;
use std::fmt::Write as _;

use crate::problems::{Problem, ProblemKind};
use crate::render::{escape_html, escape_quoted, DoctypePalette};
use crate::safety::{safety_pair, SafetyRules};
use crate::store::RecordStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Relation {
    Needs,
    Covers,
    FulfilledBy,
}

impl Relation {
    fn label(self) -> &'static str {
        match self {
            Relation::Needs => "needs",
            Relation::Covers => "covers",
            Relation::FulfilledBy => "fulfilledby",
        }
    }
}

#[derive(Debug, Clone, Default)]
struct EdgeStats {
    count: usize,
    /// Distinct safety pairs that failed, with their occurrence count
    violations: IndexMap<String, usize>,
}

/// Doctype relationship graph plus the non-compliant pairings found
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DoctypeRender {
    pub text: String,
    pub violations: Vec<Problem>,
}

fn node_key(doctype: &str, safetyclass: &str, split: bool) -> String {
    if split {
        format!("{}:{}", doctype, safetyclass)
    } else {
        doctype.to_string()
    }
}

/// Aggregates instance and relation counts per doctype.
///
/// Covers and fulfilled-by edges are green when every record pair behind
/// them satisfies `rules`, red otherwise.
pub fn render_doctype_relations(
    store: &RecordStore,
    rules: &SafetyRules,
    palette: &dyn DoctypePalette,
    split_by_safety: bool,
) -> DoctypeRender {
    // node key -> (doctype, instance count)
    let mut nodes: IndexMap<String, (String, usize)> = IndexMap::new();
    for (_, rec) in store.iter() {
        let key = node_key(&rec.doctype, &rec.safetyclass, split_by_safety);
        nodes.entry(key).or_insert_with(|| (rec.doctype.clone(), 0)).1 += 1;
    }

    let mut edges: IndexMap<(String, String, Relation), EdgeStats> = IndexMap::new();
    for (key, rec) in store.iter() {
        let from = node_key(&rec.doctype, &rec.safetyclass, split_by_safety);

        for need in &rec.needsobj {
            let doctype = need.trim_end_matches('*');
            let targets: Vec<String> = nodes
                .iter()
                .filter(|(_, (dt, _))| dt == doctype)
                .map(|(k, _)| k.clone())
                .collect();
            if targets.is_empty() {
                edges
                    .entry((from.clone(), doctype.to_string(), Relation::Needs))
                    .or_default()
                    .count += 1;
            }
            for target in targets {
                edges
                    .entry((from.clone(), target, Relation::Needs))
                    .or_default()
                    .count += 1;
            }
        }

        for target in store.graph().covers_of(key) {
            let Some(target_rec) = store.get(target) else {
                continue;
            };
            let to = node_key(&target_rec.doctype, &target_rec.safetyclass, split_by_safety);
            let relation = if store.graph().is_fulfilled_by(key, target) {
                Relation::FulfilledBy
            } else {
                Relation::Covers
            };
            let stats = edges.entry((from.clone(), to, relation)).or_default();
            stats.count += 1;
            let pair = safety_pair(rec, target_rec);
            if !rules.is_compliant(&pair) {
                *stats.violations.entry(pair).or_default() += 1;
            }
        }
    }

    // needs targets without records still get a node
    for (_, to, relation) in edges.keys() {
        if *relation == Relation::Needs && !nodes.contains_key(to) {
            nodes.insert(to.clone(), (to.clone(), 0));
        }
    }

    let mut out = String::from(
        "digraph \"doctypes\" {\n  graph [rankdir=\"BT\" fontname=\"Arial\"];\n  node [shape=plaintext fontname=\"Arial\" fontsize=16];\n\n",
    );
    for (key, (doctype, count)) in &nodes {
        let _ = writeln!(
            out,
            "  \"{}\" [label=<<table border=\"1\" cellspacing=\"0\" cellborder=\"1\" bgcolor=\"{}\"><tr><td><b>{}</b></td></tr><tr><td>{}</td></tr></table>>];",
            escape_quoted(key),
            palette.color(doctype),
            escape_html(key),
            count
        );
    }
    out.push('\n');

    let mut violations = Vec::new();
    for ((from, to, relation), stats) in &edges {
        let label = format!("{} ({})", relation.label(), stats.count);
        let attrs = match relation {
            Relation::Needs => "style=\"dashed\" color=\"grey40\"".to_string(),
            Relation::Covers | Relation::FulfilledBy => {
                let color = if stats.violations.is_empty() { "green" } else { "red" };
                let style = if *relation == Relation::FulfilledBy {
                    " style=\"bold\""
                } else {
                    ""
                };
                format!("color=\"{}\"{}", color, style)
            }
        };
        let _ = writeln!(
            out,
            "  \"{}\" -> \"{}\" [label=\"{}\" {}];",
            escape_quoted(from),
            escape_quoted(to),
            label,
            attrs
        );
        for (pair, n) in &stats.violations {
            violations.push(Problem {
                kind: ProblemKind::SafetyViolation,
                message: format!("{} {} is not compliant ({} links)", relation.label(), pair, n),
            });
        }
    }
    out.push_str("}\n");

    log::debug!(
        "doctype graph: {} nodes, {} edges, {} safety violations",
        nodes.len(),
        edges.len(),
        violations.len()
    );
    DoctypeRender {
        text: out,
        violations,
    }
}

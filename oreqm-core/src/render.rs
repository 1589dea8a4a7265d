//! Graphviz dot rendering of a record selection

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt::Write as _;
use std::hash::{Hash, Hasher};

use crate::models::{DiffMarker, LinkKind, Record, IGNORED_LINK_ERRORS};
use crate::store::RecordStore;
use crate::traverse::{Exclusions, Mark, Traversal};

/// Name of the synthetic node every top-level record links to
pub const TOP_NODE: &str = "TopNode";

/// Maps a doctype to a node fill color
pub trait DoctypePalette {
    fn color(&self, doctype: &str) -> String;
}

impl<F> DoctypePalette for F
where
    F: Fn(&str) -> String,
{
    fn color(&self, doctype: &str) -> String {
        self(doctype)
    }
}

const PALETTE_COLORS: &[&str] = &[
    "#FFFFCC", "#CCFFCC", "#CCE5FF", "#FFE5CC", "#E5CCFF", "#FFCCE5", "#CCFFFF", "#E0E0E0",
    "#FFCCCC", "#D9F2D9", "#F2E6D9", "#D9D9F2",
];

/// Hands out colors from a fixed list in order of first request
#[derive(Debug, Default)]
pub struct SequentialPalette {
    assigned: RefCell<IndexMap<String, String>>,
}

impl SequentialPalette {
    pub fn new() -> Self {
        Self::default()
    }

    /// Doctypes seen so far with their colors
    pub fn assignments(&self) -> Vec<(String, String)> {
        self.assigned
            .borrow()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

impl DoctypePalette for SequentialPalette {
    fn color(&self, doctype: &str) -> String {
        let mut assigned = self.assigned.borrow_mut();
        if let Some(color) = assigned.get(doctype) {
            return color.clone();
        }
        let color = PALETTE_COLORS[assigned.len() % PALETTE_COLORS.len()].to_string();
        assigned.insert(doctype.to_string(), color.clone());
        color
    }
}

/// Display options for a render
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RenderOptions {
    /// Doctypes linked to the synthetic top node
    #[serde(default)]
    pub top_doctypes: Vec<String>,
    pub max_nodes: usize,
    #[serde(default)]
    pub show_coverage: bool,
    #[serde(default)]
    pub show_status: bool,
    #[serde(default = "default_true")]
    pub show_errors: bool,
    /// Keys drawn inside a "selected" cluster
    #[serde(default)]
    pub highlight: BTreeSet<String>,
    #[serde(default)]
    pub exclusions: Exclusions,
}

fn default_true() -> bool {
    true
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            top_doctypes: Vec::new(),
            max_nodes: 1000,
            show_coverage: false,
            show_status: false,
            show_errors: true,
            highlight: BTreeSet::new(),
            exclusions: Exclusions::default(),
        }
    }
}

impl RenderOptions {
    /// Hash of the options that change node labels
    fn label_fingerprint(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        (self.show_coverage, self.show_status, self.show_errors).hash(&mut hasher);
        hasher.finish()
    }
}

/// Result of a render
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderOutput {
    pub text: String,
    /// Records drawn as nodes
    pub node_count: usize,
    /// True when the selection was cut at `max_nodes`
    pub limited: bool,
}

/// Decides whether a record belongs to the rendered subset
pub type Selector<'a> = dyn Fn(&str, &Record, Option<&HashSet<Mark>>) -> bool + 'a;

#[derive(Debug, Clone)]
struct CachedLabel {
    color: String,
    label: String,
}

/// Turns a store into dot text, caching node labels between renders
#[derive(Debug, Default)]
pub struct Renderer {
    cache: HashMap<String, CachedLabel>,
    cache_version: u64,
    cache_fingerprint: u64,
}

impl Renderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops every cached label
    pub fn invalidate(&mut self) {
        self.cache.clear();
    }

    pub fn cached_labels(&self) -> usize {
        self.cache.len()
    }

    fn sync_cache(&mut self, store: &RecordStore, options: &RenderOptions) {
        let fingerprint = options.label_fingerprint();
        if self.cache_version != store.version() || self.cache_fingerprint != fingerprint {
            self.cache.clear();
            self.cache_version = store.version();
            self.cache_fingerprint = fingerprint;
        }
    }

    fn label(
        &mut self,
        store: &RecordStore,
        options: &RenderOptions,
        key: &str,
        rec: &Record,
        color: &str,
    ) -> String {
        if let Some(cached) = self.cache.get(key) {
            if cached.color == color {
                return cached.label.clone();
            }
        }
        let label = node_label(store, options, key, rec, color);
        self.cache.insert(
            key.to_string(),
            CachedLabel {
                color: color.to_string(),
                label: label.clone(),
            },
        );
        label
    }

    /// Renders the records accepted by `select`.
    ///
    /// `on_limit` is called with the node cap when the selection is cut.
    pub fn render(
        &mut self,
        store: &RecordStore,
        options: &RenderOptions,
        palette: &dyn DoctypePalette,
        traversal: &Traversal,
        select: &Selector<'_>,
        on_limit: &mut dyn FnMut(usize),
    ) -> RenderOutput {
        self.sync_cache(store, options);

        let (subset, limited) = select_subset(store, options, traversal, select);
        if limited {
            log::info!("selection limited to {} nodes", options.max_nodes);
            on_limit(options.max_nodes);
        }
        let in_subset: HashSet<&str> = subset.iter().map(String::as_str).collect();

        let mut out = String::new();
        out.push_str(PREAMBLE);

        let has_top = subset.iter().any(|key| {
            store
                .get(key)
                .map(|r| options.top_doctypes.contains(&r.doctype))
                .unwrap_or(false)
        });
        if has_top {
            out.push_str("  \"TopNode\" [label=\"Top\" shape=box fontsize=20];\n");
        }

        let clusters = duplicate_clusters(store, &subset);
        let mut emitted_clusters: HashSet<&str> = HashSet::new();
        let mut cluster_seq = 0usize;

        for key in &subset {
            let Some(rec) = store.get(key) else {
                continue;
            };
            if let Some(members) = clusters.get(rec.id.as_str()) {
                if !emitted_clusters.insert(rec.id.as_str()) {
                    continue;
                }
                let _ = writeln!(
                    out,
                    "  subgraph \"cluster_dup_{}\" {{\n    label=\"{}\"; color=\"#C00000\"; style=\"dashed\"; fontcolor=\"#C00000\";",
                    escape_quoted(&rec.id),
                    duplicate_label(store, members)
                );
                for member in members {
                    if let Some(member_rec) = store.get(member) {
                        let node = self.node_statement(store, options, palette, member, member_rec);
                        out.push_str(&decorate(store, options, member, node, &mut cluster_seq, "    "));
                    }
                }
                out.push_str("  }\n");
            } else {
                let node = self.node_statement(store, options, palette, key, rec);
                out.push_str(&decorate(store, options, key, node, &mut cluster_seq, "  "));
            }
        }

        out.push('\n');
        for key in &subset {
            write_edges(&mut out, store, key, &in_subset);
        }
        if has_top {
            for key in &subset {
                if let Some(rec) = store.get(key) {
                    if options.top_doctypes.contains(&rec.doctype) {
                        let _ = writeln!(
                            out,
                            "  \"{}\" -> \"{}\" [style=dotted];",
                            escape_quoted(key),
                            TOP_NODE
                        );
                    }
                }
            }
        }

        out.push_str(&legend(store, palette, &subset));
        out.push_str("}\n");

        log::debug!(
            "rendered {} nodes ({} cached labels){}",
            subset.len(),
            self.cache.len(),
            if limited { ", limited" } else { "" }
        );
        RenderOutput {
            text: out,
            node_count: subset.len(),
            limited,
        }
    }

    fn node_statement(
        &mut self,
        store: &RecordStore,
        options: &RenderOptions,
        palette: &dyn DoctypePalette,
        key: &str,
        rec: &Record,
    ) -> String {
        let color = palette.color(&rec.doctype);
        let label = self.label(store, options, key, rec, &color);
        format!(
            "\"{}\" [id=\"{}\" label=<{}>];\n",
            escape_quoted(key),
            escape_quoted(key),
            label
        )
    }
}

const PREAMBLE: &str = "digraph \"oreqm\" {\n\
  graph [rankdir=\"RL\" ranksep=\"0.4\" nodesep=\"0.2\" fontname=\"Arial\"];\n\
  node [shape=plaintext fontname=\"Arial\" fontsize=16];\n\
  edge [color=\"blue\" dir=\"forward\" arrowhead=\"normal\" arrowtail=\"normal\"];\n\n";

/// Subset in doctype order, cut after `max_nodes` records
fn select_subset(
    store: &RecordStore,
    options: &RenderOptions,
    traversal: &Traversal,
    select: &Selector<'_>,
) -> (Vec<String>, bool) {
    let mut subset = Vec::new();
    for keys in store.doctypes().values() {
        for key in keys {
            let Some(rec) = store.get(key) else {
                continue;
            };
            if options.exclusions.excludes(key, rec) || !select(key.as_str(), rec, traversal.marks(key)) {
                continue;
            }
            if subset.len() >= options.max_nodes {
                return (subset, true);
            }
            subset.push(key.clone());
        }
    }
    (subset, false)
}

/// Bare id to subset keys, for ids occurring more than once in the subset
fn duplicate_clusters<'a>(store: &'a RecordStore, subset: &'a [String]) -> IndexMap<&'a str, Vec<&'a str>> {
    let mut by_id: IndexMap<&str, Vec<&str>> = IndexMap::new();
    for key in subset {
        if let Some(rec) = store.get(key) {
            by_id.entry(rec.id.as_str()).or_default().push(key.as_str());
        }
    }
    by_id.retain(|_, keys| keys.len() > 1);
    by_id
}

fn duplicate_label(store: &RecordStore, members: &[&str]) -> &'static str {
    let versions: BTreeSet<&str> = members
        .iter()
        .filter_map(|k| store.get(k))
        .map(|r| r.version.as_str())
        .collect();
    if versions.len() > 1 {
        "duplicate id"
    } else {
        "duplicate id + version"
    }
}

/// Wraps a node statement in one cluster per diff state or selection
fn decorate(
    store: &RecordStore,
    options: &RenderOptions,
    key: &str,
    node: String,
    seq: &mut usize,
    indent: &str,
) -> String {
    let mut layers: Vec<(&str, &str)> = Vec::new();
    match store.diff_status(key) {
        DiffMarker::New => layers.push(("new", "#00C000")),
        DiffMarker::Changed => layers.push(("changed", "#FF8000")),
        DiffMarker::Removed => layers.push(("removed", "#C00000")),
        DiffMarker::None => {}
    }
    if options.highlight.contains(key) {
        layers.push(("selected", "#0000FF"));
    }

    let mut text = format!("{}{}", indent, node);
    for (label, color) in layers {
        *seq += 1;
        text = format!(
            "{i}subgraph \"cluster_{l}_{n}\" {{ label=\"{l}\"; color=\"{c}\"; fontcolor=\"{c}\"; penwidth=3; style=\"rounded\";\n{t}{i}}}\n",
            i = indent,
            l = label,
            n = seq,
            c = color,
            t = text
        );
    }
    text
}

fn is_ignored_error(error: &str) -> bool {
    error.is_empty() || IGNORED_LINK_ERRORS.iter().any(|p| error.starts_with(p))
}

fn diff_edge_attrs(diff: DiffMarker, default_color: &str, default_style: &str) -> String {
    match diff {
        DiffMarker::Removed => {
            let style = if default_style.is_empty() {
                "dashed".to_string()
            } else {
                format!("{},dashed", default_style)
            };
            format!("color=\"darkred\" style=\"{}\"", style)
        }
        DiffMarker::New => style_color("red", default_style),
        DiffMarker::Changed => style_color("orange", default_style),
        DiffMarker::None => style_color(default_color, default_style),
    }
}

fn style_color(color: &str, style: &str) -> String {
    if style.is_empty() {
        format!("color=\"{}\"", color)
    } else {
        format!("color=\"{}\" style=\"{}\"", color, style)
    }
}

fn write_edges(out: &mut String, store: &RecordStore, key: &str, in_subset: &HashSet<&str>) {
    let Some(rec) = store.get(key) else {
        return;
    };
    for target in store.graph().covers_of(key) {
        if !in_subset.contains(target) {
            continue;
        }
        if store.graph().is_fulfilled_by(key, target) {
            let entry = store.get(target).and_then(|parent| {
                parent
                    .fulfilledby
                    .iter()
                    .find(|f| store.resolve_key(&f.id, &f.version) == key)
            });
            let diff = entry.map(|f| f.diff).unwrap_or_default();
            let error = entry.map(|f| f.link_error.as_str()).unwrap_or("");
            let mut attrs = diff_edge_attrs(diff, "purple", "bold");
            if !is_ignored_error(error) {
                let _ = write!(attrs, " label=\"{}\" fontcolor=\"red\"", escape_quoted(error));
            }
            let _ = writeln!(
                out,
                "  \"{}\" -> \"{}\" [dir=back {}];",
                escape_quoted(target),
                escape_quoted(key),
                attrs
            );
        } else {
            let link = rec.linksto.iter().find(|l| {
                l.kind == LinkKind::Normal && store.resolve_key(&l.target, &l.version) == target
            });
            let diff = link.map(|l| l.diff).unwrap_or_default();
            let error = link.map(|l| l.link_error.as_str()).unwrap_or("");
            let mut attrs = diff_edge_attrs(diff, "blue", "");
            if !is_ignored_error(error) {
                let _ = write!(attrs, " label=\"{}\" fontcolor=\"red\"", escape_quoted(error));
            }
            let _ = writeln!(
                out,
                "  \"{}\" -> \"{}\" [{}];",
                escape_quoted(key),
                escape_quoted(target),
                attrs
            );
        }
    }
}

fn status_color(status: &str) -> &'static str {
    match status.to_ascii_lowercase().as_str() {
        "approved" => "#C0FFC0",
        "proposed" | "draft" => "#FFFFA0",
        "rejected" => "#FFA0A0",
        _ => "#E0E0E0",
    }
}

/// HTML-like table label for one record
fn node_label(store: &RecordStore, options: &RenderOptions, key: &str, rec: &Record, color: &str) -> String {
    let mut t = String::new();
    if rec.ghost {
        let _ = write!(
            t,
            "<table border=\"1\" cellspacing=\"0\" cellborder=\"1\" style=\"dashed\" bgcolor=\"{}:white\" gradientangle=\"270\">",
            color
        );
    } else {
        let _ = write!(
            t,
            "<table border=\"1\" cellspacing=\"0\" cellborder=\"1\" bgcolor=\"{}\">",
            color
        );
    }
    let _ = write!(
        t,
        "<tr><td cellspacing=\"0\"><b>{}</b></td><td>{}</td><td>{}</td></tr>",
        escape_html(&rec.id),
        escape_html(&rec.version),
        escape_html(&rec.doctype)
    );

    let needs: Vec<String> = rec
        .needsobj
        .iter()
        .map(|nd| {
            let missing = rec.miscov.iter().any(|m| m == nd.trim_end_matches('*'));
            if options.show_coverage && missing {
                format!("<font color=\"red\">{}</font>", escape_html(nd))
            } else {
                escape_html(nd)
            }
        })
        .collect();
    let _ = write!(
        t,
        "<tr><td colspan=\"2\" align=\"left\">{}</td><td>{}</td></tr>",
        multiline(&rec.description),
        needs.join("<br/>")
    );

    for (label, value) in [
        ("shortdesc", &rec.shortdesc),
        ("rationale", &rec.rationale),
        ("safetyrationale", &rec.safetyrationale),
        ("verifycrit", &rec.verifycrit),
        ("comment", &rec.comment),
        ("furtherinfo", &rec.furtherinfo),
    ] {
        if !value.is_empty() {
            let _ = write!(
                t,
                "<tr><td colspan=\"3\" align=\"left\">{}: {}</td></tr>",
                label,
                multiline(value)
            );
        }
    }
    if !rec.source.is_empty() || !rec.sourcefile.is_empty() {
        let mut source = escape_html(&rec.source);
        if !rec.sourcefile.is_empty() {
            let _ = write!(source, " {}", escape_html(&rec.sourcefile));
            if !rec.sourceline.is_empty() {
                let _ = write!(source, ":{}", escape_html(&rec.sourceline));
            }
        }
        let _ = write!(t, "<tr><td colspan=\"3\" align=\"left\">source: {}</td></tr>", source.trim());
    }

    let status_attr = if options.show_status {
        format!(" bgcolor=\"{}\"", status_color(&rec.status))
    } else {
        String::new()
    };
    let _ = write!(
        t,
        "<tr><td align=\"left\"{}>{}</td><td align=\"left\">{}</td><td align=\"left\">{}</td></tr>",
        status_attr,
        escape_html(&rec.status),
        escape_html(&rec.tags.join(" ")),
        escape_html(&[rec.platform.join(" "), rec.safetyclass.clone()].join(" ").trim().to_string())
    );

    if options.show_coverage && !rec.covstatus.is_empty() {
        let cov_color = if rec.miscov.is_empty() { "#C0FFC0" } else { "#FFA0A0" };
        let _ = write!(
            t,
            "<tr><td colspan=\"3\" align=\"left\" bgcolor=\"{}\">covstatus: {}</td></tr>",
            cov_color,
            escape_html(&rec.covstatus)
        );
    }

    if options.show_errors {
        for rule in &rec.violations {
            let text = match store.rules().get(rule) {
                Some(desc) => format!("{}: {}", rule, desc),
                None => rule.clone(),
            };
            let _ = write!(
                t,
                "<tr><td colspan=\"3\" align=\"left\" bgcolor=\"#FF6666\">violation {}</td></tr>",
                escape_html(&text)
            );
        }
        for error in &rec.errors {
            let _ = write!(
                t,
                "<tr><td colspan=\"3\" align=\"left\" bgcolor=\"#FF6666\">{}</td></tr>",
                escape_html(error)
            );
        }
        for link in rec.linksto.iter().filter(|l| l.kind == LinkKind::Normal) {
            if !store.contains(&store.resolve_key(&link.target, &link.version)) {
                let _ = write!(
                    t,
                    "<tr><td colspan=\"3\" align=\"left\" bgcolor=\"#FF6666\">referenced object does not exist: {}</td></tr>",
                    escape_html(&link.target)
                );
            }
        }
    }
    t.push_str("</table>");

    log::trace!("built label for {}", key);
    t
}

fn legend(store: &RecordStore, palette: &dyn DoctypePalette, subset: &[String]) -> String {
    let mut counts: IndexMap<&str, usize> = IndexMap::new();
    for key in subset {
        if let Some(rec) = store.get(key) {
            *counts.entry(rec.doctype.as_str()).or_default() += 1;
        }
    }

    let mut t = String::from(
        "\n  label=<<table border=\"0\" cellspacing=\"0\" cellborder=\"1\">",
    );
    if !store.timestamp().is_empty() {
        let _ = write!(
            t,
            "<tr><td colspan=\"2\">{}</td></tr>",
            escape_html(store.timestamp())
        );
    }
    t.push_str("<tr><td>doctype</td><td>count</td></tr>");
    for (doctype, count) in &counts {
        let _ = write!(
            t,
            "<tr><td bgcolor=\"{}\">{}</td><td>{}</td></tr>",
            palette.color(doctype),
            escape_html(doctype),
            count
        );
    }
    let diff_rows = [
        ("new", store.new_keys().len()),
        ("changed", store.changed_keys().len()),
        ("removed", store.removed_keys().len()),
    ];
    if diff_rows.iter().any(|(_, n)| *n > 0) {
        for (label, n) in diff_rows {
            let _ = write!(t, "<tr><td>{}</td><td>{}</td></tr>", label, n);
        }
    }
    t.push_str("</table>>;\n  labelloc=b;\n");
    t
}

/// Escapes text for a dot double-quoted string
pub fn escape_quoted(text: &str) -> String {
    text.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Escapes text for an HTML-like label
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

fn multiline(text: &str) -> String {
    escape_html(text.trim())
        .lines()
        .collect::<Vec<_>>()
        .join("<br align=\"left\"/>")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::diff_stores;
    use crate::ingest::parse_oreqm;
    use crate::test_support::*;

    fn everything(_: &str, _: &Record, _: Option<&HashSet<Mark>>) -> bool {
        true
    }

    fn grey(_: &str) -> String {
        "#DDDDDD".to_string()
    }

    fn render_all(store: &RecordStore, options: &RenderOptions) -> RenderOutput {
        let mut renderer = Renderer::new();
        renderer.render(store, options, &grey, &Traversal::new(), &everything, &mut |_| {})
    }

    #[test]
    fn test_render_is_deterministic() {
        let store = parse_oreqm(&chain_document()).unwrap();
        let options = RenderOptions {
            top_doctypes: vec!["swrs".to_string()],
            ..Default::default()
        };
        let mut renderer = Renderer::new();
        let first = renderer.render(&store, &options, &grey, &Traversal::new(), &everything, &mut |_| {});
        let second = renderer.render(&store, &options, &grey, &Traversal::new(), &everything, &mut |_| {});
        let fresh = render_all(&store, &options);

        assert_eq!(first, second);
        pretty_assertions::assert_eq!(first.text, fresh.text);
        assert_eq!(first.node_count, 3);
        assert!(first.text.starts_with("digraph \"oreqm\" {"));
        assert!(first.text.contains("\"swrs.a\" -> \"TopNode\" [style=dotted];"));
        assert!(first.text.contains("\"impl.a\" -> \"swdd.a\" [color=\"blue\"];"));
        assert!(first.text.trim_end().ends_with('}'));
    }

    #[test]
    fn test_dangling_reference_is_annotated_but_not_counted() {
        let xml = document(&[specobjects(
            "swdd",
            &[specobject("A", "1", "has a broken link", &covers("B", "1"))],
        )]);
        let store = parse_oreqm(&xml).unwrap();
        let out = render_all(&store, &RenderOptions::default());

        assert_eq!(out.node_count, 1);
        assert!(out.text.contains("referenced object does not exist: B"));
        assert!(!out.text.contains("\"B\""));

        let quiet = render_all(
            &store,
            &RenderOptions {
                show_errors: false,
                ..Default::default()
            },
        );
        assert!(!quiet.text.contains("referenced object does not exist"));
    }

    #[test]
    fn test_node_cap_limits_and_reports() {
        let store = parse_oreqm(&chain_document()).unwrap();
        let options = RenderOptions {
            max_nodes: 2,
            ..Default::default()
        };
        let mut reported = None;
        let mut renderer = Renderer::new();
        let out = renderer.render(&store, &options, &grey, &Traversal::new(), &everything, &mut |n| {
            reported = Some(n)
        });

        assert!(out.limited);
        assert_eq!(out.node_count, 2);
        assert_eq!(reported, Some(2));
    }

    #[test]
    fn test_selector_and_exclusions_shape_subset() {
        let store = parse_oreqm(&chain_document()).unwrap();
        let options = RenderOptions {
            exclusions: Exclusions {
                doctypes: ["impl".to_string()].into_iter().collect(),
                ..Default::default()
            },
            ..Default::default()
        };
        let only_swdd = |key: &str, _: &Record, _: Option<&HashSet<Mark>>| key != "swrs.a";
        let mut renderer = Renderer::new();
        let out = renderer.render(&store, &options, &grey, &Traversal::new(), &only_swdd, &mut |_| {});

        assert_eq!(out.node_count, 1);
        assert!(out.text.contains("\"swdd.a\" [id=\"swdd.a\""));
        assert!(!out.text.contains("->"));
    }

    #[test]
    fn test_duplicate_cluster_labels() {
        let xml = document(&[specobjects(
            "swrs",
            &[
                specobject("a", "1", "first", ""),
                specobject("a", "2", "second", ""),
                specobject("b", "1", "one", ""),
                specobject("b", "1", "again", ""),
            ],
        )]);
        let store = parse_oreqm(&xml).unwrap();
        let out = render_all(&store, &RenderOptions::default());

        assert!(out.text.contains("subgraph \"cluster_dup_a\""));
        assert!(out.text.contains("label=\"duplicate id\";"));
        assert!(out.text.contains("label=\"duplicate id + version\";"));
    }

    #[test]
    fn test_fulfilledby_edges_are_reversed_and_purple() {
        let xml = document(&[
            specobjects(
                "swrs",
                &[specobject(
                    "req",
                    "1",
                    "needs a test",
                    "<fulfilledby><ffbObj><ffbId>tst</ffbId><ffbType>test</ffbType>\
                     <ffbVersion>1</ffbVersion></ffbObj></fulfilledby>",
                )],
            ),
            specobjects("test", &[specobject("tst", "1", "a test", "")]),
        ]);
        let store = parse_oreqm(&xml).unwrap();
        let out = render_all(&store, &RenderOptions::default());
        assert!(out
            .text
            .contains("\"req\" -> \"tst\" [dir=back color=\"purple\" style=\"bold\"];"));
    }

    #[test]
    fn test_diff_decorations_and_ghosts() {
        let old = parse_oreqm(&chain_document()).unwrap();
        let xml = document(&[
            specobjects("swrs", &[specobject("swrs.a", "1", "top level, reworded", "")]),
            specobjects("swdd", &[specobject("swdd.a", "1", "design", &covers("swrs.a", "1"))]),
        ]);
        let mut store = parse_oreqm(&xml).unwrap();
        let result = diff_stores(&store, &old, &HashSet::new());
        store.apply_diff(result);

        let options = RenderOptions {
            highlight: ["swrs.a".to_string()].into_iter().collect(),
            ..Default::default()
        };
        let out = render_all(&store, &options);

        assert!(out.text.contains("label=\"changed\""));
        assert!(out.text.contains("label=\"selected\""));
        assert!(out.text.contains("label=\"removed\""));
        assert!(out.text.contains("style=\"dashed\" bgcolor=\"#DDDDDD:white\""));
        assert!(out
            .text
            .contains("\"impl.a\" -> \"swdd.a\" [color=\"darkred\" style=\"dashed\"];"));
    }

    #[test]
    fn test_fulfilledby_edge_diff_styles() {
        let (reference, current) = fulfilledby_snapshots();
        let old = parse_oreqm(&reference).unwrap();
        let mut store = parse_oreqm(&current).unwrap();
        let result = diff_stores(&store, &old, &HashSet::new());
        store.apply_diff(result);
        let out = render_all(&store, &RenderOptions::default());

        assert!(out
            .text
            .contains("\"req\" -> \"t.keep\" [dir=back color=\"purple\" style=\"bold\"];"));
        assert!(out
            .text
            .contains("\"req\" -> \"t.ver\" [dir=back color=\"orange\" style=\"bold\"];"));
        assert!(out
            .text
            .contains("\"req\" -> \"t.dt\" [dir=back color=\"orange\" style=\"bold\"];"));
        assert!(out
            .text
            .contains("\"req\" -> \"t.new\" [dir=back color=\"red\" style=\"bold\"];"));
        assert!(out.text.contains(
            "\"req\" -> \"t.drop\" [dir=back color=\"darkred\" style=\"bold,dashed\"];"
        ));
    }

    #[test]
    fn test_label_cache_follows_store_version() {
        let mut store = parse_oreqm(&chain_document()).unwrap();
        let mut renderer = Renderer::new();
        let options = RenderOptions::default();
        renderer.render(&store, &options, &grey, &Traversal::new(), &everything, &mut |_| {});
        assert_eq!(renderer.cached_labels(), 3);

        if let Some(rec) = store.get_mut("swrs.a") {
            rec.description = "edited".to_string();
        }
        let out = renderer.render(&store, &options, &grey, &Traversal::new(), &everything, &mut |_| {});
        assert!(out.text.contains("edited"));
    }

    #[test]
    fn test_sequential_palette() {
        let palette = SequentialPalette::new();
        let a = palette.color("swrs");
        let b = palette.color("swdd");
        assert_ne!(a, b);
        assert_eq!(palette.color("swrs"), a);
        assert_eq!(palette.assignments().len(), 2);
    }

    #[test]
    fn test_escaping() {
        assert_eq!(escape_html("a<b & \"c\""), "a&lt;b &amp; &quot;c&quot;");
        assert_eq!(escape_quoted("say \"hi\""), "say \\\"hi\\\"");
    }
}

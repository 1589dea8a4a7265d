//! Tagged text: the serialized view of a record every search runs against
//!
//! Each populated field becomes `:<tag>:<value>\n/<tag>/\n`. Every tag occurs
//! at most once per record, list fields put one item per line.

use indexmap::IndexMap;
use regex::Regex;
use std::collections::BTreeSet;

use crate::models::{DiffMarker, LinkKind, Record};
use crate::store::RecordStore;

/// A search qualifier and the field it selects
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchTag {
    pub tag: &'static str,
    pub field: &'static str,
    /// Free-text fields match anywhere, others are anchored at the field start
    pub free_text: bool,
}

const fn tag(tag: &'static str, field: &'static str, free_text: bool) -> SearchTag {
    SearchTag {
        tag,
        field,
        free_text,
    }
}

pub const SEARCH_TAGS: &[SearchTag] = &[
    tag("id", "id", false),
    tag("dt", "doctype", false),
    tag("ve", "version", false),
    tag("st", "status", false),
    tag("sc", "safetyclass", false),
    tag("cs", "covstatus", false),
    tag("de", "description", true),
    tag("sd", "shortdesc", true),
    tag("rt", "rationale", true),
    tag("sr", "safetyrationale", true),
    tag("vc", "verifycrit", true),
    tag("co", "comment", true),
    tag("fi", "furtherinfo", true),
    tag("uc", "usecase", true),
    tag("src", "source", true),
    tag("sf", "sourcefile", true),
    tag("tag", "tags", true),
    tag("pl", "platform", true),
    tag("dep", "dependson", true),
    tag("nd", "needsobj", true),
    tag("lt", "linksto", true),
    tag("ffb", "fulfilledby", true),
    tag("ut", "untraced", true),
    tag("vi", "violations", true),
    tag("err", "errors", true),
    tag("mc", "miscov", true),
    tag("dup", "duplicate", true),
    tag("new", "new", true),
    tag("chg", "changed", true),
    tag("rem", "removed", true),
];

/// Looks up a qualifier such as `dt`
pub fn lookup_tag(name: &str) -> Option<&'static SearchTag> {
    SEARCH_TAGS.iter().find(|t| t.tag == name)
}

fn push_field(out: &mut String, tag: &str, value: &str) {
    if value.is_empty() {
        return;
    }
    out.push(':');
    out.push_str(tag);
    out.push(':');
    out.push_str(value);
    out.push_str("\n/");
    out.push_str(tag);
    out.push_str("/\n");
}

fn push_list<'a>(out: &mut String, tag: &str, items: impl Iterator<Item = &'a str>) {
    let joined: Vec<&str> = items.collect();
    push_field(out, tag, &joined.join("\n"));
}

/// Serializes one record, including its duplicate and diff state
pub fn tagged_text(store: &RecordStore, key: &str, rec: &Record) -> String {
    let mut out = String::new();
    push_field(&mut out, "id", &rec.id);
    push_field(&mut out, "dt", &rec.doctype);
    push_field(&mut out, "ve", &rec.version);
    push_field(&mut out, "st", &rec.status);
    push_field(&mut out, "sc", &rec.safetyclass);
    push_field(&mut out, "cs", &rec.covstatus);
    push_field(&mut out, "de", &rec.description);
    push_field(&mut out, "sd", &rec.shortdesc);
    push_field(&mut out, "rt", &rec.rationale);
    push_field(&mut out, "sr", &rec.safetyrationale);
    push_field(&mut out, "vc", &rec.verifycrit);
    push_field(&mut out, "co", &rec.comment);
    push_field(&mut out, "fi", &rec.furtherinfo);
    push_field(&mut out, "uc", &rec.usecase);
    push_field(&mut out, "src", &rec.source);
    push_field(&mut out, "sf", &rec.sourcefile);
    push_list(&mut out, "tag", rec.tags.iter().map(String::as_str));
    push_list(&mut out, "pl", rec.platform.iter().map(String::as_str));
    push_list(&mut out, "dep", rec.dependson.iter().map(String::as_str));
    push_list(&mut out, "nd", rec.needsobj.iter().map(String::as_str));
    push_list(
        &mut out,
        "lt",
        rec.linksto
            .iter()
            .filter(|l| l.kind == LinkKind::Normal)
            .map(|l| l.target.as_str()),
    );
    push_list(&mut out, "ffb", rec.fulfilledby.iter().map(|f| f.id.as_str()));
    push_list(
        &mut out,
        "ut",
        rec.linksto
            .iter()
            .filter(|l| l.kind == LinkKind::Untraced)
            .map(|l| l.target.as_str()),
    );
    push_list(&mut out, "vi", rec.violations.iter().map(String::as_str));
    push_list(&mut out, "err", rec.errors.iter().map(String::as_str));
    push_list(&mut out, "mc", rec.miscov.iter().map(String::as_str));

    if store.is_duplicate(key) {
        push_field(&mut out, "dup", "yes");
    }
    match store.diff_status(key) {
        DiffMarker::New => push_field(&mut out, "new", "yes"),
        DiffMarker::Changed => push_field(&mut out, "chg", "yes"),
        DiffMarker::Removed => push_field(&mut out, "rem", "yes"),
        DiffMarker::None => {}
    }
    out
}

/// Tagged text of every record, memoized against the store version
#[derive(Debug, Clone, Default)]
pub struct TaggedTextIndex {
    version: u64,
    texts: IndexMap<String, String>,
}

impl TaggedTextIndex {
    pub fn build(store: &RecordStore) -> Self {
        let texts = store
            .iter()
            .map(|(key, rec)| (key.to_string(), tagged_text(store, key, rec)))
            .collect();
        Self {
            version: store.version(),
            texts,
        }
    }

    /// True when built from the store in its current state
    pub fn is_current(&self, store: &RecordStore) -> bool {
        self.version == store.version() && self.texts.len() == store.len()
    }

    pub fn text(&self, key: &str) -> Option<&str> {
        self.texts.get(key).map(String::as_str)
    }

    /// Every indexed key
    pub fn universe(&self) -> BTreeSet<String> {
        self.texts.keys().cloned().collect()
    }

    /// Keys from `universe` whose text matches `regex`
    pub fn matching(&self, regex: &Regex, universe: &BTreeSet<String>) -> BTreeSet<String> {
        universe
            .iter()
            .filter(|key| self.text(key).map(|t| regex.is_match(t)).unwrap_or(false))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::parse_oreqm;
    use crate::test_support::*;

    #[test]
    fn test_tagged_text_layout() {
        let xml = document(&[specobjects(
            "swrs",
            &[specobject(
                "a",
                "1",
                "Line one",
                "<tags><tag>t1</tag><tag>t2</tag></tags>",
            )],
        )]);
        let store = parse_oreqm(&xml).unwrap();
        let text = tagged_text(&store, "a", store.get("a").unwrap());

        assert_eq!(
            text,
            ":id:a\n/id/\n:dt:swrs\n/dt/\n:ve:1\n/ve/\n:st:approved\n/st/\n\
             :de:Line one\n/de/\n:tag:t1\nt2\n/tag/\n"
        );
    }

    #[test]
    fn test_meta_markers() {
        let xml = document(&[specobjects(
            "swrs",
            &[specobject("a", "1", "A", ""), specobject("a", "2", "A2", "")],
        )]);
        let store = parse_oreqm(&xml).unwrap();
        let text = tagged_text(&store, "a:2", store.get("a:2").unwrap());
        assert!(text.contains(":dup:yes\n/dup/\n"));
    }

    #[test]
    fn test_index_tracks_store_version() {
        let mut store = parse_oreqm(&chain_document()).unwrap();
        let index = TaggedTextIndex::build(&store);
        assert!(index.is_current(&store));
        assert!(index.text("swdd.a").unwrap().contains(":lt:swrs.a\n"));

        store.rebuild_graph();
        assert!(!index.is_current(&store));
    }

    #[test]
    fn test_lookup_tag() {
        assert!(lookup_tag("dt").is_some());
        assert!(!lookup_tag("dt").unwrap().free_text);
        assert!(lookup_tag("de").unwrap().free_text);
        assert!(lookup_tag("zz").is_none());
    }
}

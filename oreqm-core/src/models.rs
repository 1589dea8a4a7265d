use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::ops::Range;

/// Description given to synthesized fulfilledby placeholders
pub const PLACEHOLDER_DESCRIPTION: &str = "*FULFILLEDBY PLACEHOLDER*";

/// Link errors starting with one of these are metadata noise, not real errors
pub const IGNORED_LINK_ERRORS: &[&str] = &["source not covered", "source status excluded"];

/// Names of every field that takes part in record comparison
pub const COMPARED_FIELDS: &[&str] = &[
    "id",
    "doctype",
    "version",
    "status",
    "description",
    "shortdesc",
    "rationale",
    "safetyrationale",
    "verifycrit",
    "comment",
    "furtherinfo",
    "usecase",
    "source",
    "sourcefile",
    "sourceline",
    "safetyclass",
    "covstatus",
    "tags",
    "platform",
    "dependson",
    "needsobj",
    "linksto",
    "fulfilledby",
    "violations",
    "errors",
    "miscov",
];

/// Diff state of a record edge
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum DiffMarker {
    #[default]
    None,
    New,
    Changed,
    Removed,
}

impl fmt::Display for DiffMarker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiffMarker::None => write!(f, ""),
            DiffMarker::New => write!(f, "new"),
            DiffMarker::Changed => write!(f, "changed"),
            DiffMarker::Removed => write!(f, "removed"),
        }
    }
}

/// Kind of a covers reference
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum LinkKind {
    #[default]
    Normal,
    Untraced,
}

/// A covers reference from one record to another ("linksto")
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct LinkTo {
    /// Target identifier (bare id, not a store key)
    pub target: String,
    /// Destination version, empty when the export did not state one
    pub version: String,
    /// Link error reported by the tracing tool
    pub link_error: String,
    #[serde(default, skip_serializing_if = "is_no_diff")]
    pub diff: DiffMarker,
    pub kind: LinkKind,
}

impl LinkTo {
    pub fn new(target: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            version: version.into(),
            ..Default::default()
        }
    }

    /// Sort key used for order-independent comparison
    fn canonical(&self) -> String {
        let kind = match self.kind {
            LinkKind::Normal => "n",
            LinkKind::Untraced => "u",
        };
        format!("{}|{}|{}|{}", self.target, self.version, self.link_error, kind)
    }
}

/// A fulfilledby reference: `id` is a lower level record satisfying this one
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct FulfilledBy {
    pub id: String,
    pub doctype: String,
    pub version: String,
    pub link_error: String,
    #[serde(default, skip_serializing_if = "is_no_diff")]
    pub diff: DiffMarker,
}

impl FulfilledBy {
    pub fn new(
        id: impl Into<String>,
        doctype: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            doctype: doctype.into(),
            version: version.into(),
            ..Default::default()
        }
    }

    fn canonical(&self) -> String {
        format!("{}|{}|{}|{}", self.id, self.doctype, self.version, self.link_error)
    }
}

fn is_no_diff(d: &DiffMarker) -> bool {
    *d == DiffMarker::None
}

/// Represents a single specobject
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Record {
    pub id: String,
    pub doctype: String,
    pub version: String,
    pub status: String,
    pub description: String,
    pub shortdesc: String,
    pub rationale: String,
    pub safetyrationale: String,
    pub verifycrit: String,
    pub comment: String,
    pub furtherinfo: String,
    pub usecase: String,
    pub source: String,
    pub sourcefile: String,
    pub sourceline: String,
    pub safetyclass: String,
    pub covstatus: String,
    pub tags: Vec<String>,
    pub platform: Vec<String>,
    pub dependson: Vec<String>,
    /// Doctypes this record needs coverage from; a trailing `*` marks a
    /// need synthesized from a fulfilledby entry
    pub needsobj: Vec<String>,
    pub linksto: Vec<LinkTo>,
    pub fulfilledby: Vec<FulfilledBy>,
    /// Rule ids this record violates
    pub violations: Vec<String>,
    pub errors: Vec<String>,
    /// Needed doctypes without any covering record
    pub miscov: Vec<String>,

    /// Synthesized stand-in for an absent fulfilledby target
    #[serde(default)]
    pub ffb_placeholder: bool,

    /// Present only in the reference snapshot, reinserted by a diff
    #[serde(skip)]
    pub ghost: bool,

    /// Byte range of the `<specobject>` element in the input text
    #[serde(skip)]
    pub source_range: Option<Range<usize>>,
}

impl Record {
    /// Creates a record with the mandatory identity fields
    pub fn new(
        id: impl Into<String>,
        doctype: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            doctype: doctype.into(),
            version: version.into(),
            ..Default::default()
        }
    }

    /// Creates a placeholder for a fulfilledby target missing from the export
    pub fn placeholder(ffb: &FulfilledBy) -> Self {
        Self {
            description: PLACEHOLDER_DESCRIPTION.to_string(),
            ffb_placeholder: true,
            ..Self::new(&ffb.id, &ffb.doctype, &ffb.version)
        }
    }

    /// True when the record carries a description or a short description
    pub fn has_content(&self) -> bool {
        !self.description.is_empty() || !self.shortdesc.is_empty()
    }

    pub fn is_rejected(&self) -> bool {
        self.status.eq_ignore_ascii_case("rejected")
    }

    /// Covers references, excluding untraced ones
    pub fn covers(&self) -> impl Iterator<Item = &LinkTo> {
        self.linksto.iter().filter(|l| l.kind == LinkKind::Normal)
    }

    /// Returns an order-independent view of every compared field.
    ///
    /// List fields are sorted, transient state (diff markers, ghost flag,
    /// source range) never appears. Fields named in `ignored` are skipped.
    pub fn comparable_fields(&self, ignored: &HashSet<String>) -> Vec<(&'static str, String)> {
        let mut fields = Vec::with_capacity(COMPARED_FIELDS.len());
        for &name in COMPARED_FIELDS {
            if ignored.contains(name) {
                continue;
            }
            let value = match name {
                "id" => self.id.clone(),
                "doctype" => self.doctype.clone(),
                "version" => self.version.clone(),
                "status" => self.status.clone(),
                "description" => self.description.clone(),
                "shortdesc" => self.shortdesc.clone(),
                "rationale" => self.rationale.clone(),
                "safetyrationale" => self.safetyrationale.clone(),
                "verifycrit" => self.verifycrit.clone(),
                "comment" => self.comment.clone(),
                "furtherinfo" => self.furtherinfo.clone(),
                "usecase" => self.usecase.clone(),
                "source" => self.source.clone(),
                "sourcefile" => self.sourcefile.clone(),
                "sourceline" => self.sourceline.clone(),
                "safetyclass" => self.safetyclass.clone(),
                "covstatus" => self.covstatus.clone(),
                "tags" => sorted_join(self.tags.iter().cloned()),
                "platform" => sorted_join(self.platform.iter().cloned()),
                "dependson" => sorted_join(self.dependson.iter().cloned()),
                "needsobj" => sorted_join(self.needsobj.iter().cloned()),
                "linksto" => sorted_join(
                    self.linksto
                        .iter()
                        .filter(|l| l.diff != DiffMarker::Removed)
                        .map(LinkTo::canonical),
                ),
                "fulfilledby" => sorted_join(
                    self.fulfilledby
                        .iter()
                        .filter(|f| f.diff != DiffMarker::Removed)
                        .map(FulfilledBy::canonical),
                ),
                "violations" => sorted_join(self.violations.iter().cloned()),
                "errors" => sorted_join(self.errors.iter().cloned()),
                "miscov" => sorted_join(self.miscov.iter().cloned()),
                _ => continue,
            };
            fields.push((name, value));
        }
        fields
    }

    /// Compares two records field by field, ignoring order and transient state
    pub fn same_content(&self, other: &Record, ignored: &HashSet<String>) -> bool {
        self.comparable_fields(ignored) == other.comparable_fields(ignored)
    }

    /// Drops diff markers and removed ghost edges
    pub fn clear_diff_markers(&mut self) {
        self.linksto.retain(|l| l.diff != DiffMarker::Removed);
        self.fulfilledby.retain(|f| f.diff != DiffMarker::Removed);
        for link in &mut self.linksto {
            link.diff = DiffMarker::None;
        }
        for ffb in &mut self.fulfilledby {
            ffb.diff = DiffMarker::None;
        }
    }
}

fn sorted_join(items: impl Iterator<Item = String>) -> String {
    let mut items: Vec<String> = items.collect();
    items.sort();
    items.join("\u{1f}")
}

/// One occurrence of an identifier that appears more than once
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DuplicateEntry {
    /// Store key of this occurrence (decorated with `:<version>` after the first)
    pub key: String,
    pub version: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_comparison_ignores_list_order() {
        let mut a = Record::new("cc.a", "swrs", "1");
        a.tags = vec!["x".into(), "y".into()];
        a.linksto = vec![LinkTo::new("cc.b", "1"), LinkTo::new("cc.c", "2")];

        let mut b = a.clone();
        b.tags.reverse();
        b.linksto.reverse();
        b.linksto[0].diff = DiffMarker::New;
        b.source_range = Some(10..20);

        assert!(a.same_content(&b, &HashSet::new()));
    }

    #[test]
    fn test_comparison_honours_ignored_fields() {
        let a = Record::new("cc.a", "swrs", "1");
        let mut b = a.clone();
        b.comment = "changed".into();

        assert!(!a.same_content(&b, &HashSet::new()));
        let ignored: HashSet<String> = ["comment".to_string()].into_iter().collect();
        assert!(a.same_content(&b, &ignored));
    }

    #[test]
    fn test_placeholder() {
        let ffb = FulfilledBy::new("cc.impl", "impl", "3");
        let p = Record::placeholder(&ffb);
        assert!(p.ffb_placeholder);
        assert_eq!(p.description, PLACEHOLDER_DESCRIPTION);
        assert_eq!(p.doctype, "impl");
        assert_eq!(p.version, "3");
    }

    #[test]
    fn test_clear_diff_markers_drops_removed_edges() {
        let mut r = Record::new("a", "swrs", "1");
        let mut keep = LinkTo::new("b", "1");
        keep.diff = DiffMarker::Changed;
        let mut gone = LinkTo::new("c", "1");
        gone.diff = DiffMarker::Removed;
        r.linksto = vec![keep, gone];

        r.clear_diff_markers();

        assert_eq!(r.linksto.len(), 1);
        assert_eq!(r.linksto[0].diff, DiffMarker::None);
    }

    #[test]
    fn test_is_rejected() {
        let mut r = Record::new("a", "swrs", "1");
        r.status = "Rejected".into();
        assert!(r.is_rejected());
        r.status = "approved".into();
        assert!(!r.is_rejected());
    }
}

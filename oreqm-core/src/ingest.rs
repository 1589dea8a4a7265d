//! Reading `.oreqm` tracing exports into a [`RecordStore`]
//!
//! The whole document is parsed before anything is published: a malformed
//! file yields an error and no store.

use roxmltree::{Document, Node};
use std::fs;
use std::path::Path;

use crate::error::{OreqmError, Result};
use crate::models::{FulfilledBy, LinkKind, LinkTo, Record, IGNORED_LINK_ERRORS};
use crate::store::RecordStore;

const ROOT_ELEMENT: &str = "tracingresults";

/// Reads and parses an `.oreqm` file
pub fn load_oreqm<P: AsRef<Path>>(path: P) -> Result<RecordStore> {
    let text = fs::read_to_string(&path)?;
    log::info!("loading {}", path.as_ref().display());
    parse_oreqm(&text)
}

/// Parses the text of an `.oreqm` document into a linked store
pub fn parse_oreqm(text: &str) -> Result<RecordStore> {
    let doc = Document::parse(text)?;
    let root = doc.root_element();
    if root.tag_name().name() != ROOT_ELEMENT {
        return Err(OreqmError::Parse(format!(
            "expected <{}> root element, found <{}>",
            ROOT_ELEMENT,
            root.tag_name().name()
        )));
    }

    let mut store = RecordStore::new();
    store.timestamp = child_text(root, "timestamp", text);

    if let Some(rules) = child(root, "rules") {
        for rule in elements(rules, "rule") {
            let id = child_text(rule, "id", text);
            if !id.is_empty() {
                store.rules.insert(id, child_text(rule, "description", text));
            }
        }
    }

    for section in root
        .descendants()
        .filter(|n| n.is_element() && n.tag_name().name() == "specobjects")
    {
        let doctype = section.attribute("doctype").unwrap_or_default().to_string();
        store.doctypes.entry(doctype.clone()).or_default();
        for node in elements(section, "specobject") {
            store.insert(read_specobject(node, &doctype, text));
        }
    }

    store.add_fulfilledby_placeholders();
    store.source_text = text.to_string();
    store.rebuild_graph();

    log::info!(
        "loaded {} specobjects in {} doctypes, {} problems",
        store.len(),
        store.doctypes().len(),
        store.problems().len()
    );
    Ok(store)
}

fn read_specobject(node: Node, doctype: &str, src: &str) -> Record {
    let mut rec = Record::new(
        child_text(node, "id", src),
        doctype,
        child_text(node, "version", src),
    );
    rec.status = child_text(node, "status", src);
    rec.description = child_text(node, "description", src);
    rec.shortdesc = child_text(node, "shortdesc", src);
    rec.rationale = child_text(node, "rationale", src);
    rec.safetyrationale = child_text(node, "safetyrationale", src);
    rec.verifycrit = child_text(node, "verifycrit", src);
    rec.comment = child_text(node, "comment", src);
    rec.furtherinfo = child_text(node, "furtherinfo", src);
    rec.usecase = child_text(node, "usecase", src);
    rec.source = child_text(node, "source", src);
    rec.sourcefile = child_text(node, "sourcefile", src);
    rec.sourceline = child_text(node, "sourceline", src);
    rec.safetyclass = child_text(node, "safetyclass", src);
    rec.covstatus = child_text(node, "covstatus", src);

    rec.tags = leaf_texts(node, "tag", src);
    rec.platform = leaf_texts(node, "platform", src);
    rec.dependson = leaf_texts(node, "dependson", src);
    rec.violations = leaf_texts(node, "ruleid", src);
    rec.errors = leaf_texts(node, "error", src);

    if let Some(needs) = child(node, "needscoverage") {
        for needscov in elements(needs, "needscov") {
            let needsobj = child_text(needscov, "needsobj", src);
            if needsobj.is_empty() {
                continue;
            }
            let covered = needscov
                .descendants()
                .any(|n| n.is_element() && n.tag_name().name() == "srcid");
            if !covered && !rec.miscov.contains(&needsobj) {
                rec.miscov.push(needsobj.clone());
            }
            rec.needsobj.push(needsobj);
        }
    }

    if let Some(provides) = child(node, "providescoverage") {
        for provcov in elements(provides, "provcov") {
            if let Some(link) = read_link(provcov, LinkKind::Normal, src) {
                rec.linksto.push(link);
            }
        }
    }

    if let Some(untraced) = child(node, "untracedlinks") {
        for entry in elements(untraced, "untracedlink") {
            if let Some(link) = read_link(entry, LinkKind::Untraced, src) {
                rec.linksto.push(link);
            }
        }
    }

    if let Some(ffbs) = child(node, "fulfilledby") {
        for ffb in elements(ffbs, "ffbObj") {
            let id = child_text(ffb, "ffbId", src);
            if id.is_empty() {
                continue;
            }
            rec.fulfilledby.push(FulfilledBy {
                id,
                doctype: child_text(ffb, "ffbType", src),
                version: child_text(ffb, "ffbVersion", src),
                link_error: child_text(ffb, "ffbLinkerror", src),
                ..Default::default()
            });
        }
    }

    rec.source_range = Some(node.range());
    rec
}

fn read_link(node: Node, kind: LinkKind, src: &str) -> Option<LinkTo> {
    let target = child_text(node, "linksto", src);
    if target.is_empty() {
        return None;
    }
    let mut link_error = child_text(node, "linkerror", src);
    if IGNORED_LINK_ERRORS
        .iter()
        .any(|phrase| link_error.starts_with(phrase))
    {
        link_error.clear();
    }
    Some(LinkTo {
        target,
        version: child_text(node, "dstversion", src),
        link_error,
        kind,
        ..Default::default()
    })
}

fn child<'a, 'input>(node: Node<'a, 'input>, name: &str) -> Option<Node<'a, 'input>> {
    node.children()
        .find(|c| c.is_element() && c.tag_name().name() == name)
}

fn elements<'a, 'input: 'a>(
    node: Node<'a, 'input>,
    name: &'a str,
) -> impl Iterator<Item = Node<'a, 'input>> + 'a {
    node.children()
        .filter(move |c| c.is_element() && c.tag_name().name() == name)
}

fn child_text(node: Node, name: &str, src: &str) -> String {
    child(node, name)
        .map(|c| element_text(c, src))
        .unwrap_or_default()
}

/// Texts of every descendant `name` element that holds no further elements
fn leaf_texts(node: Node, name: &str, src: &str) -> Vec<String> {
    node.descendants()
        .filter(|n| n.is_element() && n.tag_name().name() == name)
        .filter(|n| !n.children().any(|c| c.is_element()))
        .map(|n| element_text(n, src))
        .filter(|t| !t.is_empty())
        .collect()
}

/// Trimmed element content; embedded tags are kept verbatim, entities are
/// decoded everywhere
fn element_text(node: Node, src: &str) -> String {
    let mut out = String::new();
    push_content(node, src, &mut out);
    out.trim().to_string()
}

fn push_content(node: Node, src: &str, out: &mut String) {
    for child in node.children() {
        if child.is_text() {
            out.push_str(child.text().unwrap_or_default());
        } else if child.is_element() {
            let range = child.range();
            match (child.first_child(), child.last_child()) {
                (Some(first), Some(last)) => {
                    out.push_str(src.get(range.start..first.range().start).unwrap_or_default());
                    push_content(child, src, out);
                    out.push_str(src.get(last.range().end..range.end).unwrap_or_default());
                }
                _ => out.push_str(src.get(range).unwrap_or_default()),
            }
        }
    }
}

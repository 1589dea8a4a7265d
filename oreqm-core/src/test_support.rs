//! Builders for small `.oreqm` documents used by the unit tests

pub(crate) fn document(sections: &[String]) -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<tracingresults>\n\
         <timestamp>2024-01-01T00:00:00</timestamp>\n\
         <rules><rule><id>R1</id><description>Rule one</description></rule></rules>\n\
         {}</tracingresults>\n",
        sections.concat()
    )
}

pub(crate) fn specobjects(doctype: &str, objects: &[String]) -> String {
    format!(
        "<specobjects doctype=\"{}\">\n{}</specobjects>\n",
        doctype,
        objects.concat()
    )
}

pub(crate) fn specobject(id: &str, version: &str, description: &str, extra: &str) -> String {
    specobject_with_status(id, version, "approved", description, extra)
}

pub(crate) fn specobject_with_status(
    id: &str,
    version: &str,
    status: &str,
    description: &str,
    extra: &str,
) -> String {
    format!(
        "<specobject><id>{}</id><status>{}</status><version>{}</version>\
         <description>{}</description>{}</specobject>\n",
        id, status, version, description, extra
    )
}

pub(crate) fn covers(target: &str, version: &str) -> String {
    format!(
        "<providescoverage><provcov><linksto>{}</linksto>\
         <dstversion>{}</dstversion></provcov></providescoverage>",
        target, version
    )
}

/// `impl.a` covers `swdd.a` covers `swrs.a`
pub(crate) fn chain_document() -> String {
    document(&[
        specobjects("swrs", &[specobject("swrs.a", "1", "top level", "")]),
        specobjects(
            "swdd",
            &[specobject("swdd.a", "1", "design", &covers("swrs.a", "1"))],
        ),
        specobjects(
            "impl",
            &[specobject("impl.a", "1", "code", &covers("swdd.a", "1"))],
        ),
    ])
}

/// `<fulfilledby>` block from `(id, doctype, version)` entries
pub(crate) fn fulfilled_by(entries: &[(&str, &str, &str)]) -> String {
    let objects: String = entries
        .iter()
        .map(|(id, doctype, version)| {
            format!(
                "<ffbObj><ffbId>{}</ffbId><ffbType>{}</ffbType>\
                 <ffbVersion>{}</ffbVersion></ffbObj>",
                id, doctype, version
            )
        })
        .collect();
    format!("<fulfilledby>{}</fulfilledby>", objects)
}

/// `req` fulfilled by tests, before and after a rework of its fulfillers
pub(crate) fn fulfilledby_snapshots() -> (String, String) {
    let reference = document(&[
        specobjects(
            "swrs",
            &[specobject(
                "req",
                "1",
                "needs tests",
                &fulfilled_by(&[
                    ("t.keep", "test", "1"),
                    ("t.ver", "test", "1"),
                    ("t.dt", "test", "1"),
                    ("t.drop", "test", "1"),
                ]),
            )],
        ),
        specobjects(
            "test",
            &[
                specobject("t.keep", "1", "kept", ""),
                specobject("t.ver", "1", "versioned", ""),
                specobject("t.dt", "1", "moved", ""),
                specobject("t.drop", "1", "dropped", ""),
            ],
        ),
    ]);
    let current = document(&[
        specobjects(
            "swrs",
            &[specobject(
                "req",
                "1",
                "needs tests",
                &fulfilled_by(&[
                    ("t.keep", "test", "1"),
                    ("t.ver", "test", "2"),
                    ("t.dt", "impl", "1"),
                    ("t.new", "test", "1"),
                ]),
            )],
        ),
        specobjects(
            "test",
            &[
                specobject("t.keep", "1", "kept", ""),
                specobject("t.ver", "2", "versioned", ""),
                specobject("t.new", "1", "added", ""),
            ],
        ),
        specobjects("impl", &[specobject("t.dt", "1", "moved", "")]),
    ]);
    (reference, current)
}

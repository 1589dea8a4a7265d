pub mod context;
pub mod diff;
pub mod doctypes;
pub mod error;
pub mod graph;
pub mod ingest;
pub mod models;
pub mod problems;
pub mod query;
pub mod render;
pub mod safety;
pub mod session;
pub mod settings;
pub mod store;
pub mod tagged;
pub mod traverse;

#[cfg(test)]
mod test_support;

// Re-export commonly used types
pub use context::{ContextSnapshot, DisplaySettings};
pub use diff::{diff_stores, DiffResult, EdgeOverlay};
pub use doctypes::{render_doctype_relations, DoctypeRender};
pub use error::{OreqmError, Result};
pub use graph::LinkGraph;
pub use ingest::{load_oreqm, parse_oreqm};
pub use models::{
    DiffMarker, DuplicateEntry, FulfilledBy, LinkKind, LinkTo, Record, COMPARED_FIELDS,
    IGNORED_LINK_ERRORS, PLACEHOLDER_DESCRIPTION,
};
pub use problems::{Problem, ProblemKind, ProblemLog};
pub use query::{search, validate, QueryError, SearchMode, Vql};
pub use render::{
    DoctypePalette, RenderOptions, RenderOutput, Renderer, SequentialPalette, TOP_NODE,
};
pub use safety::{SafetyRuleError, SafetyRules, DEFAULT_SAFETY_RULES};
pub use session::Session;
pub use settings::{get_settings_path, Settings};
pub use store::RecordStore;
pub use tagged::{lookup_tag, tagged_text, SearchTag, TaggedTextIndex, SEARCH_TAGS};
pub use traverse::{Direction, Exclusions, Mark, Traversal, UNLIMITED_DEPTH};

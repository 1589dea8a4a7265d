use serde::{Deserialize, Serialize};
use std::fmt;

/// Category of a structural anomaly found while loading or linking
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ProblemKind {
    /// Two specobjects share both id and version
    DuplicateIdVersion,
    /// A record links to itself
    SelfReference,
    /// A link target does not exist in the store
    DanglingReference,
    /// A fulfilledby entry names a doctype different from the real record
    DoctypeMismatch,
    /// A covers or fulfilledby pair fails every safety rule
    SafetyViolation,
}

impl fmt::Display for ProblemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProblemKind::DuplicateIdVersion => write!(f, "duplicate id+version"),
            ProblemKind::SelfReference => write!(f, "self reference"),
            ProblemKind::DanglingReference => write!(f, "dangling reference"),
            ProblemKind::DoctypeMismatch => write!(f, "doctype mismatch"),
            ProblemKind::SafetyViolation => write!(f, "safety violation"),
        }
    }
}

/// One entry in the problem log
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Problem {
    pub kind: ProblemKind,
    pub message: String,
}

impl fmt::Display for Problem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind, self.message)
    }
}

/// Append-only log of problems.
///
/// Entries are split in generations: problems found while reading the
/// document stay for the lifetime of the store, problems found while
/// linking are replaced on every graph rebuild, and safety findings are
/// replaced on every safety check.
#[derive(Debug, Clone, Default)]
pub struct ProblemLog {
    load: Vec<Problem>,
    link: Vec<Problem>,
    safety: Vec<Problem>,
}

impl ProblemLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a problem found while reading the input document
    pub fn report(&mut self, kind: ProblemKind, message: impl Into<String>) {
        let problem = Problem {
            kind,
            message: message.into(),
        };
        log::warn!("{}", problem);
        self.load.push(problem);
    }

    /// Records a problem found while building the link graph
    pub(crate) fn report_link(&mut self, kind: ProblemKind, message: impl Into<String>) {
        let problem = Problem {
            kind,
            message: message.into(),
        };
        log::warn!("{}", problem);
        self.link.push(problem);
    }

    pub(crate) fn clear_link_problems(&mut self) {
        self.link.clear();
    }

    /// Replaces the findings of the previous safety check
    pub fn set_safety_problems(&mut self, problems: Vec<Problem>) {
        for problem in &problems {
            log::warn!("{}", problem);
        }
        self.safety = problems;
    }

    /// Iterates all problems, load-time ones first
    pub fn iter(&self) -> impl Iterator<Item = &Problem> {
        self.load
            .iter()
            .chain(self.link.iter())
            .chain(self.safety.iter())
    }

    pub fn len(&self) -> usize {
        self.load.len() + self.link.len() + self.safety.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Counts problems of one kind
    pub fn count(&self, kind: ProblemKind) -> usize {
        self.iter().filter(|p| p.kind == kind).count()
    }

    /// Formats the log as plain text, one problem per line
    pub fn report_text(&self) -> String {
        let mut out = String::new();
        for problem in self.iter() {
            out.push_str(&problem.to_string());
            out.push('\n');
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_link_problems_are_replaced() {
        let mut log = ProblemLog::new();
        log.report(ProblemKind::DuplicateIdVersion, "a");
        log.report_link(ProblemKind::SelfReference, "b");
        assert_eq!(log.len(), 2);

        log.clear_link_problems();
        log.report_link(ProblemKind::DanglingReference, "c");

        assert_eq!(log.len(), 2);
        assert_eq!(log.count(ProblemKind::SelfReference), 0);
        assert_eq!(log.count(ProblemKind::DanglingReference), 1);
        assert_eq!(log.count(ProblemKind::DuplicateIdVersion), 1);
    }

    #[test]
    fn test_report_text() {
        let mut log = ProblemLog::new();
        log.report(ProblemKind::DoctypeMismatch, "ffbType swdd does not match impl");
        assert_eq!(
            log.report_text(),
            "[doctype mismatch] ffbType swdd does not match impl\n"
        );
    }
}

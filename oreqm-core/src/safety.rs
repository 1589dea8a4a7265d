//! Safety-class compliance rules
//!
//! A covering pair is written `<doctype>:<safetyclass>><doctype>:<safetyclass>`
//! with the covering record first. The pair is compliant when any rule
//! matches it; rules are tried in order.

use regex::Regex;
use serde_json::Value;
use thiserror::Error;

use crate::models::Record;
use crate::problems::{Problem, ProblemKind};
use crate::store::RecordStore;

/// Rules applied when the settings carry none
pub const DEFAULT_SAFETY_RULES: &[&str] = &[
    r"^\w+:>\w+:$",
    r"^\w+:QM>\w+:(|QM)$",
    r"^\w+:SIL-1>\w+:(|QM|SIL-1)$",
    r"^\w+:SIL-2>\w+:(|QM|SIL-1|SIL-2)$",
    r"^\w+:SIL-3>\w+:(|QM|SIL-1|SIL-2|SIL-3)$",
    r"^impl.*>.*$",
    r"^swuts.*>.*$",
    r"^swintts.*>.*$",
];

/// A rule that cannot be used
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("invalid safety rule {rule}: {reason}")]
pub struct SafetyRuleError {
    /// The offending entry as written
    pub rule: String,
    pub reason: String,
}

/// Ordered list of compiled safety rules
#[derive(Debug, Clone)]
pub struct SafetyRules {
    rules: Vec<Regex>,
}

impl Default for SafetyRules {
    fn default() -> Self {
        let rules = DEFAULT_SAFETY_RULES
            .iter()
            .filter_map(|r| Regex::new(r).ok())
            .collect();
        Self { rules }
    }
}

impl SafetyRules {
    /// Compiles a list of rule strings, failing on the first bad entry
    pub fn from_patterns<S: AsRef<str>>(patterns: &[S]) -> Result<Self, SafetyRuleError> {
        let mut rules = Vec::with_capacity(patterns.len());
        for pattern in patterns {
            rules.push(compile_rule(pattern.as_ref())?);
        }
        Ok(Self { rules })
    }

    /// Validates untyped entries, as read from a JSON settings blob
    pub fn from_values(values: &[Value]) -> Result<Self, SafetyRuleError> {
        let mut rules = Vec::with_capacity(values.len());
        for value in values {
            let Some(pattern) = value.as_str() else {
                return Err(SafetyRuleError {
                    rule: value.to_string(),
                    reason: "rule is not a string".to_string(),
                });
            };
            rules.push(compile_rule(pattern)?);
        }
        Ok(Self { rules })
    }

    pub fn patterns(&self) -> Vec<String> {
        self.rules.iter().map(|r| r.as_str().to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn is_compliant(&self, pair: &str) -> bool {
        self.rules.iter().any(|r| r.is_match(pair))
    }

    /// Returns every covers or fulfilled-by pair of the store that no rule accepts
    pub fn violations(&self, store: &RecordStore) -> Vec<Problem> {
        let mut problems = Vec::new();
        for (key, rec) in store.iter() {
            for target in store.graph().covers_of(key) {
                let Some(target_rec) = store.get(target) else {
                    continue;
                };
                let pair = safety_pair(rec, target_rec);
                if !self.is_compliant(&pair) {
                    problems.push(Problem {
                        kind: ProblemKind::SafetyViolation,
                        message: format!("{} -> {}: {} is not compliant", key, target, pair),
                    });
                }
            }
        }
        problems
    }

    /// Replaces the safety findings in the store's problem log
    pub fn check_store(&self, store: &mut RecordStore) -> usize {
        let problems = self.violations(store);
        let count = problems.len();
        store.problems_mut().set_safety_problems(problems);
        count
    }
}

fn compile_rule(pattern: &str) -> Result<Regex, SafetyRuleError> {
    if !pattern.contains('>') {
        return Err(SafetyRuleError {
            rule: pattern.to_string(),
            reason: "missing '>' between the two doctype:safetyclass terms".to_string(),
        });
    }
    Regex::new(pattern).map_err(|e| SafetyRuleError {
        rule: pattern.to_string(),
        reason: e.to_string(),
    })
}

/// `doctype:safetyclass` of one record
pub fn safety_term(rec: &Record) -> String {
    format!("{}:{}", rec.doctype, rec.safetyclass)
}

/// The pair string for `from` covering `to`
pub fn safety_pair(from: &Record, to: &Record) -> String {
    format!("{}>{}", safety_term(from), safety_term(to))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::parse_oreqm;
    use crate::test_support::*;
    use serde_json::json;

    #[test]
    fn test_default_rules() {
        let rules = SafetyRules::default();
        assert_eq!(rules.len(), DEFAULT_SAFETY_RULES.len());
        assert!(rules.is_compliant("swdd:>swrs:"));
        assert!(rules.is_compliant("swdd:SIL-2>swrs:QM"));
        assert!(!rules.is_compliant("swdd:QM>swrs:SIL-2"));
        assert!(rules.is_compliant("impl:QM>swdd:SIL-3"));
    }

    #[test]
    fn test_from_values_rejects_bad_entries() {
        let err = SafetyRules::from_values(&[json!("^a:>b:$"), json!(42)]).unwrap_err();
        assert_eq!(err.rule, "42");
        assert_eq!(err.reason, "rule is not a string");

        let err = SafetyRules::from_values(&[json!("^no-separator$")]).unwrap_err();
        assert!(err.reason.contains("missing '>'"));

        let err = SafetyRules::from_values(&[json!("^(a>b")]).unwrap_err();
        assert_eq!(err.rule, "^(a>b");

        let ok = SafetyRules::from_values(&[json!("^a:>b:$")]).unwrap();
        assert_eq!(ok.patterns(), vec!["^a:>b:$".to_string()]);
    }

    #[test]
    fn test_check_store_reports_non_compliant_pairs() {
        let xml = document(&[
            specobjects(
                "swrs",
                &[specobject("swrs.a", "1", "top", "<safetyclass>SIL-2</safetyclass>")],
            ),
            specobjects(
                "swdd",
                &[
                    specobject(
                        "swdd.a",
                        "1",
                        "weak",
                        &format!("<safetyclass>QM</safetyclass>{}", covers("swrs.a", "1")),
                    ),
                    specobject(
                        "swdd.b",
                        "1",
                        "strong",
                        &format!("<safetyclass>SIL-2</safetyclass>{}", covers("swrs.a", "1")),
                    ),
                ],
            ),
        ]);
        let mut store = parse_oreqm(&xml).unwrap();
        let rules = SafetyRules::default();

        assert_eq!(rules.check_store(&mut store), 1);
        assert_eq!(store.problems().count(ProblemKind::SafetyViolation), 1);

        // a second check replaces rather than appends
        rules.check_store(&mut store);
        assert_eq!(store.problems().count(ProblemKind::SafetyViolation), 1);
        assert!(store
            .problems()
            .report_text()
            .contains("swdd.a -> swrs.a: swdd:QM>swrs:SIL-2"));
    }
}

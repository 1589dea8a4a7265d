//! Search over records: id regex, free-text regex and VQL
//!
//! VQL grammar, lowest precedence first:
//!
//! ```text
//! Or    := And (("or"|"OR") Or)?
//! And   := Unary (("and"|"AND") And)?
//! Unary := ("not"|"NOT") Unary | Term
//! Term  := RelOp "(" Or "," Or ")" | Qualifier? Pattern | "(" Or ")"
//! RelOp := "ao"|"ancestors"|"pa"|"parents"|"co"|"children"|"de"|"descendants"
//! Qualifier := 2-3 lowercase letters ":"
//! Pattern   := "..." | '...' | raw string
//! ```
//!
//! Every pattern is a case-insensitive, multi-line regex matched against the
//! tagged text of a record.

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use thiserror::Error;

use crate::store::RecordStore;
use crate::tagged::{lookup_tag, TaggedTextIndex};

/// How a search pattern is interpreted
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    /// Regex over identifiers only
    IdOnly,
    /// Regex over the whole tagged text
    #[default]
    Text,
    /// VQL expression
    Vql,
}

impl fmt::Display for SearchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SearchMode::IdOnly => write!(f, "id"),
            SearchMode::Text => write!(f, "text"),
            SearchMode::Vql => write!(f, "vql"),
        }
    }
}

/// A search pattern that cannot be evaluated
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct QueryError {
    pub message: String,
}

impl QueryError {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Relational operator over the covers graph
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relation {
    /// Transitive closure along covers edges
    Ancestors,
    /// One hop along covers edges
    Parents,
    /// One hop against covers edges
    Children,
    /// Transitive closure against covers edges
    Descendants,
}

impl Relation {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "ao" | "ancestors" => Some(Relation::Ancestors),
            "pa" | "parents" => Some(Relation::Parents),
            "co" | "children" => Some(Relation::Children),
            "de" | "descendants" => Some(Relation::Descendants),
            _ => None,
        }
    }
}

/// Parsed VQL expression
#[derive(Debug, Clone)]
pub enum Expr {
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
    Relation(Relation, Box<Expr>, Box<Expr>),
    Match(Regex),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    LParen,
    RParen,
    Comma,
    And,
    Or,
    Not,
    Operator(Relation),
    Qualifier(String),
    Pattern(String),
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::LParen => write!(f, "'('"),
            Token::RParen => write!(f, "')'"),
            Token::Comma => write!(f, "','"),
            Token::And => write!(f, "'and'"),
            Token::Or => write!(f, "'or'"),
            Token::Not => write!(f, "'not'"),
            Token::Operator(op) => write!(f, "operator {:?}", op),
            Token::Qualifier(q) => write!(f, "qualifier '{}:'", q),
            Token::Pattern(p) => write!(f, "pattern '{}'", p),
        }
    }
}

fn is_qualifier(word: &str) -> bool {
    (2..=3).contains(&word.len()) && word.chars().all(|c| c.is_ascii_lowercase())
}

fn tokenize(src: &str) -> Result<Vec<Token>, QueryError> {
    let chars: Vec<char> = src.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            _ if c.is_whitespace() => i += 1,
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            '"' | '\'' => {
                let (text, next) = quoted(&chars, i)?;
                tokens.push(Token::Pattern(text));
                i = next;
            }
            _ => {
                let start = i;
                while i < chars.len()
                    && !chars[i].is_whitespace()
                    && !matches!(chars[i], '(' | ')' | ',' | '"' | '\'')
                {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                let next_non_space = chars[i..].iter().find(|c| !c.is_whitespace());

                if let Some((qualifier, rest)) = word.split_once(':') {
                    if is_qualifier(qualifier) {
                        tokens.push(Token::Qualifier(qualifier.to_string()));
                        if !rest.is_empty() {
                            tokens.push(Token::Pattern(rest.to_string()));
                        }
                        continue;
                    }
                }
                let token = match word.as_str() {
                    "and" | "AND" => Token::And,
                    "or" | "OR" => Token::Or,
                    "not" | "NOT" => Token::Not,
                    _ => match Relation::from_name(&word) {
                        Some(op) if next_non_space == Some(&'(') => Token::Operator(op),
                        _ => Token::Pattern(word),
                    },
                };
                tokens.push(token);
            }
        }
    }
    Ok(tokens)
}

/// Reads a quoted literal starting at `start`; a backslash escapes the quote
fn quoted(chars: &[char], start: usize) -> Result<(String, usize), QueryError> {
    let quote = chars[start];
    let mut text = String::new();
    let mut i = start + 1;
    while i < chars.len() {
        match chars[i] {
            '\\' if chars.get(i + 1) == Some(&quote) => {
                text.push(quote);
                i += 2;
            }
            c if c == quote => return Ok((text, i + 1)),
            c => {
                text.push(c);
                i += 1;
            }
        }
    }
    Err(QueryError::new(format!(
        "unterminated {} quoted pattern",
        if quote == '"' { "double" } else { "single" }
    )))
}

fn compile(pattern: &str) -> Result<Regex, QueryError> {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .multi_line(true)
        .build()
        .map_err(|e| QueryError::new(format!("invalid regular expression: {}", e)))
}

/// Builds the regex for a `qualifier:pattern` term.
///
/// A leading `*` searches anywhere in the field, a leading `^` pins the
/// match to the field start; otherwise the tag decides.
fn qualified_regex(qualifier: &str, pattern: &str) -> Result<Regex, QueryError> {
    let tag = lookup_tag(qualifier)
        .ok_or_else(|| QueryError::new(format!("unknown qualifier '{}:'", qualifier)))?;
    let (anywhere, body) = if let Some(rest) = pattern.strip_prefix('*') {
        (true, rest)
    } else if let Some(rest) = pattern.strip_prefix('^') {
        (false, rest)
    } else {
        (tag.free_text, pattern)
    };
    let regex = if anywhere {
        format!(r":{t}:[\s\S]*?(?:{b})[\s\S]*?\n/{t}/", t = tag.tag, b = body)
    } else {
        format!(":{}:(?:{})", tag.tag, body)
    };
    compile(&regex)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn expect(&mut self, expected: Token) -> Result<(), QueryError> {
        match self.next() {
            Some(t) if t == expected => Ok(()),
            Some(t) => Err(QueryError::new(format!("expected {}, found {}", expected, t))),
            None => Err(QueryError::new(format!("expected {}, found end of input", expected))),
        }
    }

    fn parse_or(&mut self) -> Result<Expr, QueryError> {
        let left = self.parse_and()?;
        if self.peek() == Some(&Token::Or) {
            self.pos += 1;
            let right = self.parse_or()?;
            return Ok(Expr::Or(Box::new(left), Box::new(right)));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, QueryError> {
        let left = self.parse_unary()?;
        if self.peek() == Some(&Token::And) {
            self.pos += 1;
            let right = self.parse_and()?;
            return Ok(Expr::And(Box::new(left), Box::new(right)));
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, QueryError> {
        if self.peek() == Some(&Token::Not) {
            self.pos += 1;
            let inner = self.parse_unary()?;
            return Ok(Expr::Not(Box::new(inner)));
        }
        self.parse_term()
    }

    fn parse_term(&mut self) -> Result<Expr, QueryError> {
        match self.next() {
            Some(Token::Operator(op)) => {
                self.expect(Token::LParen)?;
                let pivot = self.parse_or()?;
                self.expect(Token::Comma)?;
                let filter = self.parse_or()?;
                self.expect(Token::RParen)?;
                Ok(Expr::Relation(op, Box::new(pivot), Box::new(filter)))
            }
            Some(Token::LParen) => {
                let inner = self.parse_or()?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            Some(Token::Qualifier(q)) => match self.next() {
                Some(Token::Pattern(p)) => Ok(Expr::Match(qualified_regex(&q, &p)?)),
                Some(t) => Err(QueryError::new(format!("expected pattern after '{}:', found {}", q, t))),
                None => Err(QueryError::new(format!("expected pattern after '{}:'", q))),
            },
            Some(Token::Pattern(p)) => Ok(Expr::Match(compile(&p)?)),
            Some(t) => Err(QueryError::new(format!("unexpected {}", t))),
            None => Err(QueryError::new("unexpected end of expression")),
        }
    }
}

/// A parsed, validated VQL query
#[derive(Debug, Clone)]
pub struct Vql {
    expr: Expr,
}

impl Vql {
    /// Parses an expression, rejecting malformed syntax, unknown
    /// qualifiers and invalid regexes
    pub fn parse(src: &str) -> Result<Self, QueryError> {
        let tokens = tokenize(src)?;
        if tokens.is_empty() {
            return Err(QueryError::new("empty expression"));
        }
        let mut parser = Parser { tokens, pos: 0 };
        let expr = parser.parse_or()?;
        if let Some(extra) = parser.peek() {
            return Err(QueryError::new(format!("unexpected {}", extra)));
        }
        Ok(Self { expr })
    }

    pub fn expr(&self) -> &Expr {
        &self.expr
    }

    /// Evaluates against every record of the store
    pub fn evaluate(&self, store: &RecordStore, texts: &TaggedTextIndex) -> BTreeSet<String> {
        let universe = texts.universe();
        eval(store, texts, &universe, &self.expr)
    }
}

/// Returns the validation message for a malformed expression
pub fn validate(src: &str) -> Option<String> {
    Vql::parse(src).err().map(|e| e.message)
}

fn eval(
    store: &RecordStore,
    texts: &TaggedTextIndex,
    universe: &BTreeSet<String>,
    expr: &Expr,
) -> BTreeSet<String> {
    match expr {
        Expr::And(a, b) => {
            let left = eval(store, texts, universe, a);
            if left.is_empty() {
                return left;
            }
            let right = eval(store, texts, universe, b);
            left.intersection(&right).cloned().collect()
        }
        Expr::Or(a, b) => {
            let mut left = eval(store, texts, universe, a);
            left.extend(eval(store, texts, universe, b));
            left
        }
        Expr::Not(a) => {
            let inner = eval(store, texts, universe, a);
            universe.difference(&inner).cloned().collect()
        }
        Expr::Relation(op, pivot, filter) => {
            let pivot = eval(store, texts, universe, pivot);
            let graph = store.graph();
            let candidates = match op {
                Relation::Ancestors => graph.ancestors(&pivot),
                Relation::Parents => graph.parents(&pivot),
                Relation::Children => graph.children(&pivot),
                Relation::Descendants => graph.descendants(&pivot),
            };
            eval(store, texts, &candidates, filter)
        }
        Expr::Match(regex) => texts.matching(regex, universe),
    }
}

/// Runs a search in the given mode and returns the matching keys
pub fn search(
    store: &RecordStore,
    texts: &TaggedTextIndex,
    mode: SearchMode,
    pattern: &str,
) -> Result<BTreeSet<String>, QueryError> {
    let result = match mode {
        SearchMode::IdOnly => {
            let regex = match pattern.strip_prefix('^') {
                Some(rest) => format!(":id:(?:{})", rest),
                None => format!(":id:[^\\n]*?(?:{})", pattern),
            };
            texts.matching(&compile(&regex)?, &texts.universe())
        }
        SearchMode::Text => texts.matching(&compile(pattern)?, &texts.universe()),
        SearchMode::Vql => Vql::parse(pattern)?.evaluate(store, texts),
    };
    log::debug!("{} search '{}' matched {} records", mode, pattern, result.len());
    Ok(result)
}

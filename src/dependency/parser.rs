// src/dependency/parser.rs

//! Parsers for the dependency expression language.
//!
//! - Dependency keys (`SIM`, `SIM-1`, `SIM+2`, `SIM*3`, `CLEAN?`, `SIM-1?`)
//!   are flat tokens matched with a regex.
//! - Filter expressions (`"fc0,fc1?"`, `"[1:3]"`, `"[0::2]"`,
//!   `"[1:auto]*2"`, `"all"`) go through a small recursive-descent parser.
//! - Relationship trees (`DATES_FROM` / `*_TO` / `STATUS` / `FROM_STEP`)
//!   are read from the TOML table under a dependency key.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;
use tracing::warn;

use crate::dependency::model::{
    DependencyKey, FilterExpr, FilterItem, FromClause, RelationNode, Sign,
};
use crate::job::Status;
use crate::types::Axis;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DependencyParseError {
    #[error("invalid dependency key {0:?}")]
    InvalidKey(String),

    #[error("invalid filter expression {expr:?} at offset {offset}: {reason}")]
    InvalidFilter {
        expr: String,
        offset: usize,
        reason: String,
    },

    #[error("invalid relationship at {path}: {reason}")]
    InvalidRelationship { path: String, reason: String },
}

static KEY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<section>[A-Za-z0-9_.]+?)(?:(?P<sign>[-+*])(?P<distance>\d+))?(?P<optional>\?)?$")
        .expect("dependency key regex is valid")
});

/// Split a dependency key into section, sign, distance and weak marker.
pub fn parse_dependency_key(key: &str) -> Result<DependencyKey, DependencyParseError> {
    let trimmed = key.trim();
    let caps = KEY_RE
        .captures(trimmed)
        .ok_or_else(|| DependencyParseError::InvalidKey(key.to_string()))?;

    let section = caps["section"].to_string();
    let optional = caps.name("optional").is_some();
    let distance = caps
        .name("distance")
        .map(|m| {
            m.as_str()
                .parse::<u32>()
                .map_err(|_| DependencyParseError::InvalidKey(key.to_string()))
        })
        .transpose()?;

    let sign = match caps.name("sign").map(|m| m.as_str()) {
        Some("-") => Some(Sign::Minus),
        Some("+") => Some(Sign::Plus),
        Some("*") => Some(Sign::Star),
        _ if optional => Some(Sign::Question),
        _ => None,
    };

    let (offset, delay) = match sign {
        Some(Sign::Star) => (None, distance),
        Some(Sign::Minus | Sign::Plus) => (distance, None),
        _ => (None, None),
    };

    Ok(DependencyKey {
        section,
        sign,
        offset,
        delay,
        optional,
    })
}

/// Parse a filter expression.
///
/// ```text
/// expr     := item (sep item)*          sep := (',' | whitespace)+
/// item     := (range | word) suffix*
/// range    := '[' bound? ':' bound? (':' int)? ']'
/// suffix   := '?' | '*' '\'? int
/// ```
///
/// `all`, `none` and `natural` are recognised case-insensitively. The
/// empty string parses to an empty expression.
pub fn parse_filter_expr(src: &str) -> Result<FilterExpr, DependencyParseError> {
    let mut parser = FilterParser {
        src,
        chars: src.chars().collect(),
        pos: 0,
    };
    parser.expr()
}

struct FilterParser<'a> {
    src: &'a str,
    chars: Vec<char>,
    pos: usize,
}

impl FilterParser<'_> {
    fn expr(&mut self) -> Result<FilterExpr, DependencyParseError> {
        let mut items = Vec::new();
        self.skip_separators();
        while self.peek().is_some() {
            items.push(self.item()?);
            let before = self.pos;
            self.skip_separators();
            if self.peek().is_some() && self.pos == before {
                return Err(self.error("expected ',' between items"));
            }
        }
        Ok(FilterExpr { items })
    }

    fn item(&mut self) -> Result<FilterItem, DependencyParseError> {
        let item = if self.peek() == Some('[') {
            self.range()?
        } else {
            self.word()?
        };
        self.suffixes(item)
    }

    fn range(&mut self) -> Result<FilterItem, DependencyParseError> {
        self.expect('[')?;
        let start = self.bound();
        self.expect(':')?;
        let end = self.bound();
        let step = if self.peek() == Some(':') {
            self.pos += 1;
            self.integer()?
        } else {
            1
        };
        if step == 0 {
            return Err(self.error("range step must be >= 1"));
        }
        self.expect(']')?;
        Ok(FilterItem::Range {
            start,
            end,
            step,
            optional: false,
            multiplier: None,
        })
    }

    fn bound(&mut self) -> Option<String> {
        let text = self.take_while(|c| c != ':' && c != ']');
        let text = text.trim();
        if text.is_empty() {
            None
        } else {
            Some(text.to_string())
        }
    }

    fn word(&mut self) -> Result<FilterItem, DependencyParseError> {
        let text = self.take_while(|c| !matches!(c, ',' | '[' | ']' | '?' | '*' | '\\') && !c.is_whitespace());
        if text.is_empty() {
            return Err(self.error("expected a value"));
        }
        let item = match text.to_lowercase().as_str() {
            "all" => FilterItem::All { optional: false },
            "none" => FilterItem::None,
            "natural" => FilterItem::Natural,
            _ => FilterItem::Value {
                value: text,
                optional: false,
                multiplier: None,
            },
        };
        Ok(item)
    }

    fn suffixes(&mut self, mut item: FilterItem) -> Result<FilterItem, DependencyParseError> {
        loop {
            match self.peek() {
                Some('?') => {
                    self.pos += 1;
                    match &mut item {
                        FilterItem::All { optional }
                        | FilterItem::Value { optional, .. }
                        | FilterItem::Range { optional, .. } => *optional = true,
                        FilterItem::None | FilterItem::Natural => {
                            return Err(self.error("'?' cannot follow none/natural"));
                        }
                    }
                }
                Some('*') => {
                    self.pos += 1;
                    if self.peek() == Some('\\') {
                        self.pos += 1;
                    }
                    let factor = self.integer()?;
                    match &mut item {
                        FilterItem::Value { multiplier, .. }
                        | FilterItem::Range { multiplier, .. } => *multiplier = Some(factor),
                        _ => return Err(self.error("multiplier only applies to values")),
                    }
                }
                _ => return Ok(item),
            }
        }
    }

    fn integer(&mut self) -> Result<u32, DependencyParseError> {
        let digits = self.take_while(|c| c.is_ascii_digit());
        digits
            .parse::<u32>()
            .map_err(|_| self.error("expected an integer"))
    }

    fn expect(&mut self, expected: char) -> Result<(), DependencyParseError> {
        if self.peek() == Some(expected) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.error(&format!("expected '{expected}'")))
        }
    }

    fn skip_separators(&mut self) {
        while matches!(self.peek(), Some(c) if c == ',' || c.is_whitespace()) {
            self.pos += 1;
        }
    }

    fn take_while(&mut self, pred: impl Fn(char) -> bool) -> String {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if pred(c)) {
            self.pos += 1;
        }
        self.chars[start..self.pos].iter().collect()
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn error(&self, reason: &str) -> DependencyParseError {
        DependencyParseError::InvalidFilter {
            expr: self.src.to_string(),
            offset: self.pos,
            reason: reason.to_string(),
        }
    }
}

/// Parse the relationship table under a dependency key.
///
/// An empty table yields `None` (plain natural dependency).
pub fn parse_relation_tree(
    key: &str,
    value: &toml::Value,
) -> Result<Option<RelationNode>, DependencyParseError> {
    let node = parse_node(key, value)?;
    Ok(if node.is_trivial() { None } else { Some(node) })
}

fn parse_node(path: &str, value: &toml::Value) -> Result<RelationNode, DependencyParseError> {
    let table = match value {
        toml::Value::Table(t) => t,
        toml::Value::String(s) if s.trim().is_empty() => return Ok(RelationNode::default()),
        _ => {
            return Err(DependencyParseError::InvalidRelationship {
                path: path.to_string(),
                reason: "expected a table".to_string(),
            });
        }
    };

    let mut node = RelationNode::default();
    let mut from_clauses: BTreeMap<Axis, FromClause> = BTreeMap::new();

    for (raw_key, entry) in table.iter() {
        let entry_path = format!("{path}.{raw_key}");
        let upper = raw_key.to_uppercase();
        match upper.as_str() {
            "STATUS" => {
                let text = entry.as_str().ok_or_else(|| invalid(&entry_path, "expected a string"))?;
                let status = text
                    .parse::<Status>()
                    .map_err(|e| invalid(&entry_path, &e))?;
                node.status = Some(status);
            }
            "FROM_STEP" => {
                let step = entry
                    .as_integer()
                    .and_then(|i| u32::try_from(i).ok())
                    .ok_or_else(|| invalid(&entry_path, "expected a non-negative integer"))?;
                node.from_step = Some(step);
            }
            _ => {
                if let Some(axis) = axis_for_key(&upper, |a| a.to_key()) {
                    let text = scalar_text(entry).ok_or_else(|| {
                        invalid(&entry_path, "expected a string, integer or list")
                    })?;
                    node.to.insert(axis, parse_filter_expr(&text)?);
                } else if let Some(axis) = axis_for_key(&upper, |a| a.from_key()) {
                    from_clauses.insert(axis, parse_from(&entry_path, axis, entry)?);
                } else {
                    return Err(invalid(&entry_path, "unknown relationship key"));
                }
            }
        }
    }

    // Only the outermost FROM axis of a level is evaluated.
    let mut clauses = from_clauses.into_values();
    node.from = clauses.next();
    if clauses.next().is_some() {
        warn!(
            path = %path,
            "several *_FROM keys at the same level; only the outermost axis is used"
        );
    }

    Ok(node)
}

fn parse_from(
    path: &str,
    axis: Axis,
    value: &toml::Value,
) -> Result<FromClause, DependencyParseError> {
    let table = value
        .as_table()
        .ok_or_else(|| invalid(path, "expected a table of FROM values"))?;

    let mut branches = Vec::with_capacity(table.len());
    for (selector, sub) in table.iter() {
        let expr = parse_filter_expr(selector)?;
        let child = parse_node(&format!("{path}.{selector}"), sub)?;
        branches.push((expr, child));
    }

    Ok(FromClause { axis, branches })
}

fn axis_for_key(upper: &str, name: impl Fn(&Axis) -> &'static str) -> Option<Axis> {
    Axis::OUTERMOST_FIRST
        .into_iter()
        .find(|axis| name(axis) == upper)
}

fn scalar_text(value: &toml::Value) -> Option<String> {
    match value {
        toml::Value::String(s) => Some(s.clone()),
        toml::Value::Integer(i) => Some(i.to_string()),
        toml::Value::Array(items) => items
            .iter()
            .map(scalar_text)
            .collect::<Option<Vec<_>>>()
            .map(|parts| parts.join(",")),
        _ => None,
    }
}

fn invalid(path: &str, reason: &str) -> DependencyParseError {
    DependencyParseError::InvalidRelationship {
        path: path.to_string(),
        reason: reason.to_string(),
    }
}

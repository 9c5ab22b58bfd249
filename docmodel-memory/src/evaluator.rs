//! Filter evaluation over in-memory documents.
//!
//! Values are compared through [`Comparable`], which folds every numeric BSON
//! type into `f64` so that `Int32(1)`, `Int64(1)` and `Double(1.0)` are equal,
//! the way MongoDB compares them.
//!
//! `$regex` patterns are compiled once per query through a [`PatternCache`]
//! shared by every document the query is evaluated against.

use std::cmp::Ordering;
use std::collections::HashMap;

use bson::{Bson, DateTime};
use regex_lite::Regex;

use docmodel_core::document::{Document, get_path};
use docmodel_core::error::StorageError;
use docmodel_core::query::{Expr, FieldOp, QueryVisitor};

#[derive(Debug)]
pub(crate) enum Comparable<'a> {
    Null,
    Bool(bool),
    Number(f64),
    DateTime(DateTime),
    String(&'a str),
    Array(Vec<Comparable<'a>>),
    Map(HashMap<&'a str, Comparable<'a>>),
}

impl<'a> From<&'a Bson> for Comparable<'a> {
    fn from(bson: &'a Bson) -> Self {
        match bson {
            Bson::Null => Comparable::Null,
            Bson::Boolean(value) => Comparable::Bool(*value),
            Bson::Int32(value) => Comparable::Number(*value as f64),
            Bson::Int64(value) => Comparable::Number(*value as f64),
            Bson::Double(value) => Comparable::Number(*value),
            Bson::DateTime(value) => Comparable::DateTime(*value),
            Bson::String(value) => Comparable::String(value),
            Bson::Array(items) => Comparable::Array(items.iter().map(Comparable::from).collect()),
            Bson::Document(doc) => Comparable::Map(doc.iter().map(|(k, v)| (k.as_str(), Comparable::from(v))).collect()),
            _ => Comparable::Null,
        }
    }
}

impl PartialEq for Comparable<'_> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Comparable::Null, Comparable::Null) => true,
            (Comparable::Bool(a), Comparable::Bool(b)) => a == b,
            (Comparable::Number(a), Comparable::Number(b)) => a == b,
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a == b,
            (Comparable::String(a), Comparable::String(b)) => a == b,
            (Comparable::Array(a), Comparable::Array(b)) => a == b,
            (Comparable::Map(a), Comparable::Map(b)) => a == b,
            _ => false,
        }
    }
}

impl PartialOrd for Comparable<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Comparable::Bool(a), Comparable::Bool(b)) => a.partial_cmp(b),
            (Comparable::Number(a), Comparable::Number(b)) => a.partial_cmp(b),
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a.partial_cmp(b),
            (Comparable::String(a), Comparable::String(b)) => a.partial_cmp(b),
            _ => None,
        }
    }
}

impl Comparable<'_> {
    /// Rank of the value's type in a sort, nulls and missing values first.
    fn type_rank(&self) -> u8 {
        match self {
            Comparable::Null => 0,
            Comparable::Number(_) => 1,
            Comparable::String(_) => 2,
            Comparable::Map(_) => 3,
            Comparable::Array(_) => 4,
            Comparable::Bool(_) => 5,
            Comparable::DateTime(_) => 6,
        }
    }

    /// Total order used when sorting results.
    pub(crate) fn sort_cmp(&self, other: &Self) -> Ordering {
        self.partial_cmp(other)
            .unwrap_or_else(|| self.type_rank().cmp(&other.type_rank()))
    }
}

/// Compares `value` against a stored field, looking into arrays the way
/// MongoDB does: an array field matches if any of its items match.
fn matches_any(stored: &Bson, predicate: impl Fn(&Comparable<'_>) -> bool) -> bool {
    let stored = Comparable::from(stored);
    if predicate(&stored) {
        return true;
    }
    match stored {
        Comparable::Array(items) => items.iter().any(predicate),
        _ => false,
    }
}

/// Compiled patterns of one query, keyed by their source.
#[derive(Debug, Default)]
pub(crate) struct PatternCache(HashMap<String, Regex>);

impl PatternCache {
    fn get(&mut self, pattern: &str) -> Result<&Regex, StorageError> {
        if !self.0.contains_key(pattern) {
            let regex = Regex::new(pattern)
                .map_err(|err| StorageError::Backend(format!("invalid pattern `{}`: {}", pattern, err)))?;
            self.0.insert(pattern.to_string(), regex);
        }
        Ok(&self.0[pattern])
    }
}

pub(crate) struct DocumentEvaluator<'d, 'p> {
    document: &'d Document,
    patterns: &'p mut PatternCache,
}

impl<'d, 'p> DocumentEvaluator<'d, 'p> {
    pub fn new(document: &'d Document, patterns: &'p mut PatternCache) -> Self {
        Self { document, patterns }
    }

    pub fn evaluate(&mut self, expr: &Expr) -> Result<bool, StorageError> {
        self.visit_expr(expr)
    }

    pub fn filter_documents(
        documents: impl IntoIterator<Item = &'d Document>,
        expr: &Expr,
    ) -> Result<Vec<Document>, StorageError> {
        let mut patterns = PatternCache::default();
        let mut matched = Vec::new();
        for document in documents {
            if DocumentEvaluator::new(document, &mut patterns).evaluate(expr)? {
                matched.push(document.clone());
            }
        }
        Ok(matched)
    }
}

impl QueryVisitor for DocumentEvaluator<'_, '_> {
    type Output = bool;
    type Error = StorageError;

    fn visit_and(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error> {
        for expr in exprs {
            if !self.visit_expr(expr)? {
                return Ok(false);
            }
        }

        Ok(true)
    }

    fn visit_or(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error> {
        for expr in exprs {
            if self.visit_expr(expr)? {
                return Ok(true);
            }
        }

        Ok(false)
    }

    fn visit_not(&mut self, expr: &Expr) -> Result<Self::Output, Self::Error> {
        Ok(!self.visit_expr(expr)?)
    }

    fn visit_exists(&mut self, field: &str, should_exist: bool) -> Result<Self::Output, Self::Error> {
        Ok(get_path(self.document, field).is_some() == should_exist)
    }

    fn visit_field(&mut self, field: &str, op: &FieldOp, value: &Bson) -> Result<Self::Output, Self::Error> {
        let operand = Comparable::from(value);

        let Some(stored) = get_path(self.document, field) else {
            // Missing fields behave like null.
            return Ok(match op {
                FieldOp::Eq => operand == Comparable::Null,
                FieldOp::Ne => operand != Comparable::Null,
                FieldOp::NotContains | FieldOp::NoneOf => true,
                FieldOp::AnyOf => match &operand {
                    Comparable::Array(values) => values.contains(&Comparable::Null),
                    _ => false,
                },
                _ => false,
            });
        };

        let result = match op {
            FieldOp::Eq => matches_any(stored, |item| item == &operand),
            FieldOp::Ne => !matches_any(stored, |item| item == &operand),
            FieldOp::Gt | FieldOp::Gte | FieldOp::Lt | FieldOp::Lte => matches_any(stored, |item| {
                match item.partial_cmp(&operand) {
                    Some(ordering) => match op {
                        FieldOp::Gt => ordering == Ordering::Greater,
                        FieldOp::Gte => ordering != Ordering::Less,
                        FieldOp::Lt => ordering == Ordering::Less,
                        _ => ordering != Ordering::Greater,
                    },
                    None => false,
                }
            }),
            FieldOp::Contains => contains(stored, &operand),
            FieldOp::NotContains => !contains(stored, &operand),
            FieldOp::StartsWith => match (Comparable::from(stored), &operand) {
                (Comparable::String(left), Comparable::String(right)) => left.starts_with(right),
                _ => false,
            },
            FieldOp::EndsWith => match (Comparable::from(stored), &operand) {
                (Comparable::String(left), Comparable::String(right)) => left.ends_with(right),
                _ => false,
            },
            FieldOp::Matches => {
                let Comparable::String(pattern) = &operand else {
                    return Err(StorageError::Backend(format!("`{}` requires a string pattern", field)));
                };
                let regex = self.patterns.get(pattern)?;
                matches_any(stored, |item| matches!(item, Comparable::String(text) if regex.is_match(text)))
            }
            FieldOp::AnyOf => any_of(stored, &operand),
            FieldOp::NoneOf => !any_of(stored, &operand),
        };

        Ok(result)
    }
}

fn contains(stored: &Bson, operand: &Comparable<'_>) -> bool {
    match (Comparable::from(stored), operand) {
        (Comparable::Array(items), operand) => items.iter().any(|item| item == operand),
        (Comparable::String(left), Comparable::String(right)) => left.contains(right),
        _ => false,
    }
}

fn any_of(stored: &Bson, operand: &Comparable<'_>) -> bool {
    match operand {
        Comparable::Array(values) => matches_any(stored, |item| values.iter().any(|value| value == item)),
        single => matches_any(stored, |item| item == single),
    }
}

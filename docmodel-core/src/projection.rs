//! Field projections and the merge of requested fields with ACL fields.
//!
//! A projection maps field names to `1` (include) or `0` (exclude). A single
//! projection never mixes both kinds. [`merge_acl`] combines the fields a
//! request asked for with the fields the access control layer allows.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::document::{Document, ID};
use crate::error::{ModelError, ModelResult};

/// Include/exclude mapping of field names.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Projection(BTreeMap<String, i32>);

impl Projection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds an inclusion projection from field names.
    pub fn include<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(fields.into_iter().map(|f| (f.into(), 1)).collect())
    }

    /// Builds an exclusion projection from field names.
    pub fn exclude<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(fields.into_iter().map(|f| (f.into(), 0)).collect())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn get(&self, field: &str) -> Option<i32> {
        self.0.get(field).copied()
    }

    pub fn insert(&mut self, field: impl Into<String>, value: i32) {
        self.0.insert(field.into(), if value == 0 { 0 } else { 1 });
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, i32)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// Returns `true` if every entry includes its field.
    pub fn is_inclusion(&self) -> bool {
        !self.0.is_empty() && self.0.values().all(|v| *v != 0)
    }

    /// Returns `true` if every entry excludes its field.
    pub fn is_exclusion(&self) -> bool {
        !self.0.is_empty() && self.0.values().all(|v| *v == 0)
    }

    /// Returns `true` if `field` survives this projection.
    pub fn allows(&self, field: &str) -> bool {
        if field == ID || self.0.is_empty() {
            return true;
        }
        let root = field.split('.').next().unwrap_or(field);

        match self.0.get(field).or_else(|| self.0.get(root)) {
            Some(v) => *v != 0,
            None => !self.is_inclusion(),
        }
    }

    /// Overlays `other` on top of this projection; entries of `other` win.
    pub fn extend(&mut self, other: &Projection) {
        for (field, value) in &other.0 {
            self.0.insert(field.clone(), *value);
        }
    }

    /// Applies the projection to a document. `_id` is always kept.
    pub fn apply(&self, document: Document) -> Document {
        if self.0.is_empty() {
            return document;
        }

        document
            .into_iter()
            .filter(|(key, _)| self.allows(key))
            .collect()
    }

    fn validate(&self, side: &str) -> ModelResult<()> {
        if !self.0.is_empty() && !self.is_inclusion() && !self.is_exclusion() {
            return Err(ModelError::FieldConflict(format!(
                "{} projection mixes included and excluded fields",
                side
            )));
        }
        Ok(())
    }

    fn excluded(&self) -> impl Iterator<Item = &str> {
        self.0.iter().filter(|(_, v)| **v == 0).map(|(k, _)| k.as_str())
    }
}

impl<S: Into<String>> FromIterator<(S, i32)> for Projection {
    fn from_iter<T: IntoIterator<Item = (S, i32)>>(iter: T) -> Self {
        let mut projection = Projection::new();
        for (field, value) in iter {
            projection.insert(field, value);
        }
        projection
    }
}

/// Merges the fields requested by a query with the fields allowed by the ACL.
///
/// - One side empty: the other side is returned unchanged.
/// - Both inclusion: the intersection. An empty intersection is a conflict.
/// - One inclusion, one exclusion: the inclusion side minus the fields the
///   other side excludes. Excluding every allowed field is a conflict.
/// - Both exclusion: the union of excluded fields.
///
/// # Errors
///
/// Returns [`ModelError::FieldConflict`] when the two sides cannot be
/// satisfied together, or when either side mixes `1` and `0`.
pub fn merge_acl(query: &Projection, acl: &Projection) -> ModelResult<Projection> {
    query.validate("query")?;
    acl.validate("ACL")?;

    if acl.is_empty() {
        return Ok(query.clone());
    }
    if query.is_empty() {
        return Ok(acl.clone());
    }

    let merged: Projection = match (query.is_inclusion(), acl.is_inclusion()) {
        (true, true) => query
            .0
            .keys()
            .filter(|field| acl.0.contains_key(*field))
            .map(|field| (field.clone(), 1))
            .collect(),
        (false, false) => query.excluded().chain(acl.excluded()).map(|field| (field, 0)).collect(),
        (true, false) => subtract(query, acl),
        (false, true) => subtract(acl, query),
    };

    if merged.is_empty() {
        return Err(ModelError::FieldConflict(
            "the requested fields are not permitted by the access control list".to_string(),
        ));
    }

    Ok(merged)
}

fn subtract(inclusion: &Projection, exclusion: &Projection) -> Projection {
    inclusion
        .0
        .keys()
        .filter(|field| exclusion.get(field).is_none())
        .map(|field| (field.clone(), 1))
        .collect()
}

//! Field schemas.
//!
//! A [`Schema`] is an ordered mapping from field name to [`FieldDefinition`].
//! It is immutable once a model is built and shared behind an `Arc` by every
//! request against that model.
//!
//! Schemas deserialize from the collection definition format:
//!
//! ```json
//! {
//!   "title": { "type": "String", "required": true, "validation": { "maxLength": 100 } },
//!   "published": { "type": "DateTime", "format": "unix" }
//! }
//! ```
//!
//! Declaration order is preserved, since field transforms run in that order.

use std::fmt;

use bson::Bson;
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::projection::Projection;

/// Type of a schema field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldType {
    #[serde(alias = "string")]
    String,
    #[serde(alias = "number")]
    Number,
    #[serde(alias = "boolean")]
    Boolean,
    #[serde(alias = "datetime")]
    DateTime,
    #[serde(alias = "object")]
    Object,
    #[serde(alias = "mixed")]
    Mixed,
    #[serde(alias = "reference")]
    Reference,
    #[serde(alias = "array")]
    Array,
}

impl FieldType {
    /// Whether dotted query keys may address values nested in this field.
    pub fn is_nested(&self) -> bool {
        matches!(self, FieldType::Object | FieldType::Mixed)
    }
}

/// Regular expression rule.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegexRule {
    pub pattern: String,
}

/// Custom validation rules of a field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationRules {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_length: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regex: Option<RegexRule>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
}

/// Definition of a single schema field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldDefinition {
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comments: Option<String>,
    /// Value injected on create when the field is missing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Bson>,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub validation: ValidationRules,
    /// Replaces the default message of every validation error on this field.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display: Option<serde_json::Value>,
    /// Output format. Only meaningful for `DateTime` fields.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
}

impl FieldDefinition {
    pub fn new(field_type: FieldType) -> Self {
        FieldDefinition {
            field_type,
            label: None,
            comments: None,
            default: None,
            required: false,
            validation: ValidationRules::default(),
            message: None,
            display: None,
            format: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_default(mut self, value: impl Into<Bson>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_min_length(mut self, min: usize) -> Self {
        self.validation.min_length = Some(min);
        self
    }

    pub fn with_max_length(mut self, max: usize) -> Self {
        self.validation.max_length = Some(max);
        self
    }

    pub fn with_regex(mut self, pattern: impl Into<String>) -> Self {
        self.validation.regex = Some(RegexRule {
            pattern: pattern.into(),
        });
        self
    }

    pub fn with_range(mut self, min: Option<f64>, max: Option<f64>) -> Self {
        self.validation.min = min;
        self.validation.max = max;
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }
}

/// Ordered mapping of field names to definitions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Schema {
    fields: Vec<(String, FieldDefinition)>,
}

impl Schema {
    pub fn new() -> Self {
        Schema::default()
    }

    /// Adds a field, replacing a previous definition of the same name in place.
    pub fn field(mut self, name: impl Into<String>, definition: FieldDefinition) -> Self {
        let name = name.into();
        match self.fields.iter_mut().find(|(n, _)| *n == name) {
            Some((_, existing)) => *existing = definition,
            None => self.fields.push((name, definition)),
        }
        self
    }

    pub fn get(&self, name: &str) -> Option<&FieldDefinition> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, d)| d)
    }

    /// Resolves the definition addressed by a possibly dotted path.
    ///
    /// `address.city` resolves to the definition of `address`.
    pub fn resolve(&self, path: &str) -> Option<&FieldDefinition> {
        self.get(path)
            .or_else(|| self.get(path.split('.').next().unwrap_or(path)))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldDefinition)> {
        self.fields.iter().map(|(n, d)| (n.as_str(), d))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(n, _)| n.as_str())
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Returns the subset of the schema visible through `fields`.
    pub fn restrict(&self, fields: &Projection) -> Schema {
        Schema {
            fields: self
                .fields
                .iter()
                .filter(|(name, _)| fields.allows(name))
                .cloned()
                .collect(),
        }
    }
}

impl Serialize for Schema {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (name, definition) in &self.fields {
            map.serialize_entry(name, definition)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Schema {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct SchemaVisitor;

        impl<'de> Visitor<'de> for SchemaVisitor {
            type Value = Schema;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of field names to field definitions")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Schema, A::Error> {
                let mut schema = Schema::new();
                while let Some((name, definition)) = map.next_entry::<String, FieldDefinition>()? {
                    schema = schema.field(name, definition);
                }
                Ok(schema)
            }
        }

        deserializer.deserialize_map(SchemaVisitor)
    }
}

//! Output formatting.
//!
//! Persisted documents are passed through an [`OutputFormatter`] before they
//! are handed back to callers, unless raw output was requested.
//! [`DefaultOutputFormatter`] hides the bookkeeping properties and renders
//! `DateTime` fields according to their `format`.

use std::fmt::{Debug, Write};

use async_trait::async_trait;
use bson::Bson;
use chrono::format::{Item, StrftimeItems};
use chrono::SecondsFormat;

use crate::document::{Document, HIDDEN_PROPERTIES};
use crate::error::ModelResult;
use crate::schema::{FieldType, Schema};

/// Options of one formatting pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FormatOptions {
    /// Overrides whether reference fields are composed.
    pub compose: Option<bool>,
}

/// Renders persisted documents for API consumers.
#[async_trait]
pub trait OutputFormatter: Send + Sync + Debug {
    async fn format_for_output(
        &self,
        results: Vec<Document>,
        schema: &Schema,
        options: FormatOptions,
    ) -> ModelResult<Vec<Document>>;
}

/// Strips hidden properties and formats `DateTime` fields.
///
/// - no format or `iso`: RFC 3339 string with millisecond precision
/// - `unix`: epoch milliseconds
/// - anything else: a `strftime` pattern; invalid patterns fall back to ISO
///
/// Reference composition needs access to other models and is left to custom
/// formatters.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultOutputFormatter;

impl DefaultOutputFormatter {
    fn format_document(&self, document: Document, schema: &Schema) -> Document {
        document
            .into_iter()
            .filter(|(key, _)| !HIDDEN_PROPERTIES.contains(&key.as_str()))
            .map(|(key, value)| {
                let value = match schema.get(&key) {
                    Some(definition) if definition.field_type == FieldType::DateTime => {
                        format_datetime(value, definition.format.as_deref())
                    }
                    _ => value,
                };
                (key, value)
            })
            .collect()
    }
}

#[async_trait]
impl OutputFormatter for DefaultOutputFormatter {
    async fn format_for_output(
        &self,
        results: Vec<Document>,
        schema: &Schema,
        _options: FormatOptions,
    ) -> ModelResult<Vec<Document>> {
        Ok(results
            .into_iter()
            .map(|document| self.format_document(document, schema))
            .collect())
    }
}

/// Renders a stored `DateTime` value. Non-datetime values are left alone.
pub fn format_datetime(value: Bson, format: Option<&str>) -> Bson {
    let Bson::DateTime(datetime) = value else {
        return value;
    };
    let chrono = datetime.to_chrono();

    match format {
        None | Some("iso") => Bson::String(chrono.to_rfc3339_opts(SecondsFormat::Millis, true)),
        Some("unix") => Bson::Int64(datetime.timestamp_millis()),
        Some(pattern) => {
            let items = StrftimeItems::new(pattern);
            if items.clone().any(|item| matches!(item, Item::Error)) {
                return Bson::String(chrono.to_rfc3339_opts(SecondsFormat::Millis, true));
            }

            let mut rendered = String::new();
            match write!(rendered, "{}", chrono.format_with_items(items)) {
                Ok(()) => Bson::String(rendered),
                Err(_) => Bson::String(chrono.to_rfc3339_opts(SecondsFormat::Millis, true)),
            }
        }
    }
}

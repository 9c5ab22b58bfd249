//! Per-field transforms.
//!
//! Field transforms are resolved once, when a model is built, into a map of
//! field name to [`FieldTransform`]. Fields whose type has a built-in
//! transform (`DateTime`) get it automatically; applications may register
//! their own per field, which takes precedence.
//!
//! [`FieldTransforms::apply`] walks a document field by field, in document
//! order. Each transform receives the value of its field and returns a
//! partial document that is merged into the accumulator before the next
//! field is visited. `_id` is never transformed.

use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;
use bson::Bson;

use crate::document::{Document, ID};
use crate::error::ModelResult;
use crate::normalize::coerce_datetime;
use crate::schema::{FieldDefinition, FieldType, Schema};

/// Point of the mutation at which transforms run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldHook {
    /// Before a document is persisted.
    BeforeSave,
    /// After a document was persisted, before it is returned.
    AfterSave,
}

/// What a field transform gets to see.
#[derive(Debug, Clone, Copy)]
pub struct TransformContext<'a> {
    pub collection: &'a str,
    pub schema: &'a Schema,
    pub definition: &'a FieldDefinition,
}

/// Transform attached to one field.
///
/// Both methods return a partial document (usually `{field: newValue}`)
/// merged into the document under construction. The defaults pass the
/// value through unchanged.
#[async_trait]
pub trait FieldTransform: Send + Sync + Debug {
    async fn before_save(&self, field: &str, value: Bson, _ctx: TransformContext<'_>) -> ModelResult<Document> {
        Ok(single(field, value))
    }

    async fn after_save(&self, field: &str, value: Bson, _ctx: TransformContext<'_>) -> ModelResult<Document> {
        Ok(single(field, value))
    }
}

fn single(field: &str, value: Bson) -> Document {
    let mut document = Document::new();
    document.insert(field, value);
    document
}

/// Stores `DateTime` values as BSON datetimes.
#[derive(Debug, Clone, Copy, Default)]
pub struct DateTimeTransform;

#[async_trait]
impl FieldTransform for DateTimeTransform {
    async fn before_save(&self, field: &str, value: Bson, _ctx: TransformContext<'_>) -> ModelResult<Document> {
        Ok(single(field, coerce_datetime(value)))
    }
}

/// Field transforms of one model, keyed by field name.
#[derive(Debug, Clone, Default)]
pub struct FieldTransforms {
    transforms: HashMap<String, Arc<dyn FieldTransform>>,
}

impl FieldTransforms {
    /// Resolves the transform of every schema field.
    ///
    /// Entries of `overrides` replace the built-in transform of their field.
    pub fn from_schema(schema: &Schema, overrides: &HashMap<String, Arc<dyn FieldTransform>>) -> Self {
        let mut transforms: HashMap<String, Arc<dyn FieldTransform>> = HashMap::new();

        for (name, definition) in schema.iter() {
            if let Some(transform) = overrides.get(name) {
                transforms.insert(name.to_string(), Arc::clone(transform));
            } else if definition.field_type == FieldType::DateTime {
                transforms.insert(name.to_string(), Arc::new(DateTimeTransform));
            }
        }

        FieldTransforms { transforms }
    }

    pub fn get(&self, field: &str) -> Option<&Arc<dyn FieldTransform>> {
        self.transforms.get(field)
    }

    pub fn is_empty(&self) -> bool {
        self.transforms.is_empty()
    }

    /// Runs the transforms of `point` over one document, one field at a time.
    ///
    /// Null values and fields without a transform are passed through.
    pub async fn apply(
        &self,
        document: Document,
        point: FieldHook,
        collection: &str,
        schema: &Schema,
    ) -> ModelResult<Document> {
        if self.transforms.is_empty() {
            return Ok(document);
        }

        let mut output = Document::new();

        for (field, value) in document {
            let transform = self.transforms.get(&field).zip(schema.get(&field));

            match transform {
                Some((transform, definition)) if field != ID && value != Bson::Null => {
                    let ctx = TransformContext {
                        collection,
                        schema,
                        definition,
                    };
                    let partial = match point {
                        FieldHook::BeforeSave => transform.before_save(&field, value, ctx).await?,
                        FieldHook::AfterSave => transform.after_save(&field, value, ctx).await?,
                    };
                    output.extend(partial);
                }
                _ => {
                    output.insert(field, value);
                }
            }
        }

        Ok(output)
    }
}

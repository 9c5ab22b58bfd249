//! Schema validation of candidate documents.
//!
//! Every document of a batch is validated and every fault is collected
//! before anything is reported, so a caller sees the complete list of
//! [`FieldError`]s in one go.

use std::collections::HashMap;

use bson::Bson;
use regex_lite::Regex;

use crate::document::{Document, is_internal};
use crate::error::{FieldError, ModelError, ModelResult};
use crate::projection::Projection;
use crate::schema::{FieldDefinition, FieldType, Schema};

pub const ERROR_REQUIRED: &str = "ERROR_REQUIRED";
pub const ERROR_VALUE_INVALID: &str = "ERROR_VALUE_INVALID";
pub const ERROR_MIN_LENGTH: &str = "ERROR_MIN_LENGTH";
pub const ERROR_MAX_LENGTH: &str = "ERROR_MAX_LENGTH";
pub const ERROR_REGEX: &str = "ERROR_REGEX";
pub const ERROR_MIN_VALUE: &str = "ERROR_MIN_VALUE";
pub const ERROR_MAX_VALUE: &str = "ERROR_MAX_VALUE";
pub const ERROR_NOT_IN_SCHEMA: &str = "ERROR_NOT_IN_SCHEMA";

/// Which kind of payload is validated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationMode {
    /// Complete documents. Required fields must be present.
    Create,
    /// Partial updates. Required fields are only checked when present.
    Update,
}

/// The `validation.regex` patterns of a schema, compiled once per model.
#[derive(Debug, Clone, Default)]
pub struct Patterns(HashMap<String, Regex>);

impl Patterns {
    /// Compiles every pattern declared in `schema`.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::Configuration`] naming the first field whose
    /// pattern does not compile.
    pub fn compile(schema: &Schema) -> ModelResult<Patterns> {
        let mut compiled = HashMap::new();
        for (name, definition) in schema.iter() {
            if let Some(rule) = &definition.validation.regex {
                let regex = Regex::new(&rule.pattern).map_err(|err| {
                    ModelError::Configuration(format!("invalid pattern `{}` for `{}`: {}", rule.pattern, name, err))
                })?;
                compiled.insert(name.to_string(), regex);
            }
        }
        Ok(Patterns(compiled))
    }

    pub fn get(&self, field: &str) -> Option<&Regex> {
        self.0.get(field)
    }
}

/// Validates documents against a schema and the fields a client may write.
#[derive(Debug, Clone, Copy)]
pub struct Validator<'a> {
    schema: &'a Schema,
    patterns: &'a Patterns,
    permitted: &'a Projection,
    closed: bool,
}

impl<'a> Validator<'a> {
    pub fn new(schema: &'a Schema, patterns: &'a Patterns, permitted: &'a Projection) -> Self {
        Validator {
            schema,
            patterns,
            permitted,
            closed: false,
        }
    }

    /// Rejects fields that are not declared in the schema.
    pub fn closed(mut self, closed: bool) -> Self {
        self.closed = closed;
        self
    }

    pub fn validate_documents(&self, documents: &[Document], mode: ValidationMode) -> Result<(), Vec<FieldError>> {
        let errors: Vec<FieldError> = documents
            .iter()
            .flat_map(|document| self.validate_document(document, mode))
            .collect();

        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }

    pub fn validate_document(&self, document: &Document, mode: ValidationMode) -> Vec<FieldError> {
        let mut errors = Vec::new();

        if mode == ValidationMode::Create {
            for (name, definition) in self.schema.iter() {
                if definition.required && self.permitted.allows(name) && !document.contains_key(name) {
                    errors.push(fault(name, definition, ERROR_REQUIRED, "can't be blank"));
                }
            }
        }

        for (key, value) in document {
            if is_internal(key) || key.contains('.') {
                continue;
            }

            let Some(definition) = self.schema.get(key) else {
                if self.closed {
                    errors.push(FieldError::new(
                        key.as_str(),
                        ERROR_NOT_IN_SCHEMA,
                        "doesn't exist in the collection schema",
                    ));
                }
                continue;
            };

            if !self.permitted.allows(key) {
                errors.push(FieldError::new(
                    key.as_str(),
                    ERROR_NOT_IN_SCHEMA,
                    "is not a permitted field",
                ));
                continue;
            }

            if let Some(err) = check_field(key, definition, self.patterns.get(key), value) {
                errors.push(err);
            }
        }

        errors
    }
}

fn fault(field: &str, definition: &FieldDefinition, code: &str, message: impl Into<String>) -> FieldError {
    let message = definition.message.clone().unwrap_or_else(|| message.into());
    FieldError::new(field, code, message)
}

fn check_field(field: &str, definition: &FieldDefinition, pattern: Option<&Regex>, value: &Bson) -> Option<FieldError> {
    if is_blank(value) {
        return definition
            .required
            .then(|| fault(field, definition, ERROR_REQUIRED, "can't be blank"));
    }

    let rules = &definition.validation;
    let invalid = |expected: &str| Some(fault(field, definition, ERROR_VALUE_INVALID, format!("should be {}", expected)));

    match definition.field_type {
        FieldType::String => {
            let Bson::String(text) = value else {
                return invalid("a string");
            };
            let length = text.chars().count();
            if let Some(min) = rules.min_length.filter(|min| length < *min) {
                return Some(fault(field, definition, ERROR_MIN_LENGTH, format!("is too short (minimum {})", min)));
            }
            if let Some(max) = rules.max_length.filter(|max| length > *max) {
                return Some(fault(field, definition, ERROR_MAX_LENGTH, format!("is too long (maximum {})", max)));
            }
            if let (Some(rule), Some(pattern)) = (&rules.regex, pattern) {
                if !pattern.is_match(text) {
                    return Some(fault(
                        field,
                        definition,
                        ERROR_REGEX,
                        format!("should match the pattern {}", rule.pattern),
                    ));
                }
            }
            None
        }
        FieldType::Number => {
            let Some(number) = as_number(value) else {
                return invalid("a number");
            };
            if let Some(min) = rules.min.filter(|min| number < *min) {
                return Some(fault(field, definition, ERROR_MIN_VALUE, format!("is too small (minimum {})", min)));
            }
            if let Some(max) = rules.max.filter(|max| number > *max) {
                return Some(fault(field, definition, ERROR_MAX_VALUE, format!("is too large (maximum {})", max)));
            }
            None
        }
        FieldType::Boolean => match value {
            Bson::Boolean(_) => None,
            _ => invalid("a boolean"),
        },
        FieldType::DateTime => match value {
            Bson::DateTime(_) | Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_) => None,
            Bson::String(text) if chrono::DateTime::parse_from_rfc3339(text).is_ok() => None,
            _ => invalid("a valid date"),
        },
        FieldType::Object => match value {
            Bson::Document(_) => None,
            _ => invalid("an object"),
        },
        FieldType::Mixed => None,
        FieldType::Reference => match value {
            Bson::String(_) | Bson::ObjectId(_) | Bson::Document(_) => None,
            Bson::Array(items)
                if items
                    .iter()
                    .all(|item| matches!(item, Bson::String(_) | Bson::ObjectId(_) | Bson::Document(_))) =>
            {
                None
            }
            _ => invalid("a reference"),
        },
        FieldType::Array => {
            let Bson::Array(items) = value else {
                return invalid("an array");
            };
            if let Some(min) = rules.min_length.filter(|min| items.len() < *min) {
                return Some(fault(field, definition, ERROR_MIN_LENGTH, format!("is too short (minimum {})", min)));
            }
            if let Some(max) = rules.max_length.filter(|max| items.len() > *max) {
                return Some(fault(field, definition, ERROR_MAX_LENGTH, format!("is too long (maximum {})", max)));
            }
            None
        }
    }
}

fn is_blank(value: &Bson) -> bool {
    match value {
        Bson::Null | Bson::Undefined => true,
        Bson::String(text) => text.is_empty(),
        _ => false,
    }
}

fn as_number(value: &Bson) -> Option<f64> {
    match value {
        Bson::Int32(v) => Some(*v as f64),
        Bson::Int64(v) => Some(*v as f64),
        Bson::Double(v) => Some(*v),
        _ => None,
    }
}

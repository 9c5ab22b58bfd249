//! Escaping of names MongoDB refuses.
//!
//! Collection names and document keys may not start with `$` or contain a
//! null byte, and dots in keys are read as paths. Names are escaped on the
//! way in and restored on the way out. Values are left alone so that
//! filters keep matching what was stored.

use bson::{Bson, Document};

pub(crate) struct KeySanitizer;

impl KeySanitizer {
    const REPLACEMENTS: [(&'static str, &'static str); 3] = [
        (".", "__dot__"),
        ("$", "__dollar__"),
        ("\0", "__null__"),
    ];

    pub(crate) fn sanitize_name(input: &str) -> String {
        let mut sanitized = input.to_string();
        for (target, replacement) in Self::REPLACEMENTS.iter() {
            sanitized = sanitized.replace(*target, replacement);
        }
        sanitized
    }

    pub(crate) fn restore_name(input: &str) -> String {
        let mut restored = input.to_string();
        for (target, replacement) in Self::REPLACEMENTS.iter().rev() {
            restored = restored.replace(*replacement, target);
        }
        restored
    }

    pub(crate) fn sanitize_document(document: Document) -> Document {
        document
            .into_iter()
            .map(|(key, value)| (Self::sanitize_name(&key), Self::sanitize_value(value)))
            .collect()
    }

    pub(crate) fn restore_document(document: Document) -> Document {
        document
            .into_iter()
            .map(|(key, value)| (Self::restore_name(&key), Self::restore_value(value)))
            .collect()
    }

    fn sanitize_value(value: Bson) -> Bson {
        match value {
            Bson::Document(inner) => Bson::Document(Self::sanitize_document(inner)),
            Bson::Array(items) => Bson::Array(items.into_iter().map(Self::sanitize_value).collect()),
            other => other,
        }
    }

    fn restore_value(value: Bson) -> Bson {
        match value {
            Bson::Document(inner) => Bson::Document(Self::restore_document(inner)),
            Bson::Array(items) => Bson::Array(items.into_iter().map(Self::restore_value).collect()),
            other => other,
        }
    }
}

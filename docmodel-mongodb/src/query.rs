//! Translation of normalized queries into MongoDB syntax.

use bson::{Bson, Document, doc};

use docmodel_core::error::StorageError;
use docmodel_core::projection::Projection;
use docmodel_core::query::{Expr, FieldOp, QueryVisitor, Sort};

/// Turns an [`Expr`] tree back into a MongoDB filter document.
pub(crate) struct MongoQueryTranslator;

impl MongoQueryTranslator {
    pub(crate) fn filter(expr: Option<&Expr>) -> Result<Document, StorageError> {
        match expr {
            Some(expr) => MongoQueryTranslator.visit_expr(expr),
            None => Ok(Document::new()),
        }
    }

    pub(crate) fn sort(sort: &[Sort]) -> Option<Document> {
        if sort.is_empty() {
            return None;
        }

        Some(
            sort.iter()
                .map(|s| (s.field.clone(), Bson::Int32(s.direction.as_order())))
                .collect(),
        )
    }

    pub(crate) fn projection(fields: &Projection) -> Option<Document> {
        if fields.is_empty() {
            return None;
        }

        Some(
            fields
                .fields()
                .map(|(field, value)| (field.to_string(), Bson::Int32(value)))
                .collect(),
        )
    }

    fn all(&mut self, exprs: &[Expr]) -> Result<Vec<Document>, StorageError> {
        exprs.iter().map(|expr| self.visit_expr(expr)).collect()
    }
}

impl QueryVisitor for MongoQueryTranslator {
    type Output = Document;
    type Error = StorageError;

    fn visit_and(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error> {
        Ok(doc! { "$and": self.all(exprs)? })
    }

    fn visit_or(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error> {
        Ok(doc! { "$or": self.all(exprs)? })
    }

    // `$not` only applies to field operators; a whole expression is negated with `$nor`.
    fn visit_not(&mut self, expr: &Expr) -> Result<Self::Output, Self::Error> {
        Ok(doc! { "$nor": [self.visit_expr(expr)?] })
    }

    fn visit_exists(&mut self, field: &str, should_exist: bool) -> Result<Self::Output, Self::Error> {
        Ok(doc! { field: { "$exists": should_exist } })
    }

    fn visit_field(&mut self, field: &str, op: &FieldOp, value: &Bson) -> Result<Self::Output, Self::Error> {
        let condition = match op {
            FieldOp::Eq => doc! { "$eq": value },
            FieldOp::Ne => doc! { "$ne": value },
            FieldOp::Gt => doc! { "$gt": value },
            FieldOp::Gte => doc! { "$gte": value },
            FieldOp::Lt => doc! { "$lt": value },
            FieldOp::Lte => doc! { "$lte": value },
            FieldOp::Contains => match value {
                Bson::String(needle) => doc! { "$regex": escape(needle) },
                other => doc! { "$elemMatch": { "$eq": other } },
            },
            FieldOp::NotContains => match value {
                Bson::String(needle) => doc! { "$not": { "$regex": escape(needle) } },
                other => doc! { "$not": { "$elemMatch": { "$eq": other } } },
            },
            FieldOp::StartsWith => match value {
                Bson::String(prefix) => doc! { "$regex": format!("^{}", escape(prefix)) },
                _ => return Err(unsupported("starts-with", value)),
            },
            FieldOp::EndsWith => match value {
                Bson::String(suffix) => doc! { "$regex": format!("{}$", escape(suffix)) },
                _ => return Err(unsupported("ends-with", value)),
            },
            FieldOp::Matches => match value {
                Bson::String(pattern) => doc! { "$regex": pattern },
                _ => return Err(unsupported("regex", value)),
            },
            FieldOp::AnyOf => doc! { "$in": as_list(value) },
            FieldOp::NoneOf => doc! { "$nin": as_list(value) },
        };

        Ok(doc! { field: condition })
    }
}

fn as_list(value: &Bson) -> Bson {
    match value {
        Bson::Array(_) => value.clone(),
        single => Bson::Array(vec![single.clone()]),
    }
}

fn escape(literal: &str) -> String {
    let mut escaped = String::with_capacity(literal.len());
    for c in literal.chars() {
        if "\\^$.|?*+()[]{}".contains(c) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn unsupported(op: &str, value: &Bson) -> StorageError {
    StorageError::Backend(format!("{} requires a string operand, got {}", op, value))
}

//! Query normalization.
//!
//! Requests carry their filter as a document or a JSON string and their
//! options as loosely typed strings (`page`, `skip`, `count`, `sort`,
//! `sortOrder`, `fields`, `q`, `compose`). The [`Normalizer`] turns them into a
//! [`Query`] for the storage collaborator plus the resolved [`QueryOptions`]
//! used to build response metadata.
//!
//! Normalization happens in four steps:
//!
//! 1. **Parse** the filter ([`parse_filter`]), failing with
//!    `ERROR_INVALID_FILTER` when it is not a JSON object.
//! 2. **Validate** it ([`validate_query`]); `$where` is rejected at any depth.
//! 3. **Format** values of `DateTime` fields ([`format_query`]): `$now`, epoch
//!    milliseconds and RFC 3339 strings become BSON datetimes.
//! 4. **Compile** the MongoDB-style document into an [`Expr`] ([`compile`]).
//!
//! Options are resolved by [`Normalizer::options`], which collects every
//! invalid parameter before failing.

use bson::{Bson, DateTime, ser::serialize_to_bson};
use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::document::Document;
use crate::error::{FieldError, ModelError, ModelResult, ParameterError};
use crate::projection::{Projection, merge_acl};
use crate::query::{Expr, FieldOp, Filter, Query, Sort, SortDirection};
use crate::schema::{FieldType, Schema};
use crate::settings::ModelSettings;

/// Operator that is never accepted in a query.
pub const FORBIDDEN_OPERATOR: &str = "$where";

/// Sentinel replaced with the current time in `DateTime` queries.
pub const NOW: &str = "$now";

/// A filter as received from the transport layer.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterInput {
    Json(String),
    Document(Document),
}

impl Default for FilterInput {
    fn default() -> Self {
        FilterInput::Document(Document::new())
    }
}

impl From<Document> for FilterInput {
    fn from(document: Document) -> Self {
        FilterInput::Document(document)
    }
}

impl From<&str> for FilterInput {
    fn from(json: &str) -> Self {
        FilterInput::Json(json.to_string())
    }
}

impl From<String> for FilterInput {
    fn from(json: String) -> Self {
        FilterInput::Json(json)
    }
}

/// Query options exactly as received from the transport layer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawQueryOptions {
    pub page: Option<String>,
    pub skip: Option<String>,
    pub count: Option<String>,
    /// Search term.
    pub q: Option<String>,
    /// JSON projection, e.g. `{"title":1}`.
    pub fields: Option<String>,
    pub compose: Option<String>,
    /// A field name, or a JSON sort document such as `{"title":-1}`.
    pub sort: Option<String>,
    pub sort_order: Option<String>,
    /// JSON filter merged into the request filter.
    pub filter: Option<String>,
}

impl RawQueryOptions {
    pub fn new() -> Self {
        RawQueryOptions::default()
    }

    pub fn page(mut self, page: impl Into<String>) -> Self {
        self.page = Some(page.into());
        self
    }

    pub fn skip(mut self, skip: impl Into<String>) -> Self {
        self.skip = Some(skip.into());
        self
    }

    pub fn count(mut self, count: impl Into<String>) -> Self {
        self.count = Some(count.into());
        self
    }

    pub fn fields(mut self, fields: impl Into<String>) -> Self {
        self.fields = Some(fields.into());
        self
    }

    pub fn sort(mut self, sort: impl Into<String>) -> Self {
        self.sort = Some(sort.into());
        self
    }

    pub fn sort_order(mut self, order: impl Into<String>) -> Self {
        self.sort_order = Some(order.into());
        self
    }

    pub fn search(mut self, q: impl Into<String>) -> Self {
        self.q = Some(q.into());
        self
    }

    pub fn compose(mut self, compose: impl Into<String>) -> Self {
        self.compose = Some(compose.into());
        self
    }

    pub fn filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }
}

/// Resolved query options.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryOptions {
    pub limit: usize,
    /// Effective skip, `limit * (page - 1) + skip`.
    pub skip: usize,
    pub page: usize,
    pub sort: Vec<Sort>,
    pub fields: Projection,
    pub search: Option<String>,
    pub compose: Option<bool>,
}

impl Default for QueryOptions {
    fn default() -> Self {
        QueryOptions {
            limit: crate::settings::DEFAULT_LIMIT,
            skip: 0,
            page: 1,
            sort: Vec::new(),
            fields: Projection::new(),
            search: None,
            compose: None,
        }
    }
}

/// Outcome of [`validate_query`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryValidation {
    pub success: bool,
    pub errors: Vec<FieldError>,
}

/// Normalizes filters and options against one model.
#[derive(Debug, Clone, Copy)]
pub struct Normalizer<'a> {
    schema: &'a Schema,
    settings: &'a ModelSettings,
}

impl<'a> Normalizer<'a> {
    pub fn new(schema: &'a Schema, settings: &'a ModelSettings) -> Self {
        Normalizer { schema, settings }
    }

    /// Parses, validates and formats a filter.
    ///
    /// # Errors
    ///
    /// `ERROR_INVALID_FILTER` when the filter cannot be parsed and
    /// `ERROR_FORBIDDEN_OPERATOR` when it uses `$where`.
    pub fn filter(&self, input: FilterInput) -> ModelResult<Document> {
        let filter = parse_filter(input)?;
        ensure_valid(&filter)?;
        Ok(format_query(filter, self.schema))
    }

    /// Resolves raw options, collecting every invalid parameter.
    pub fn options(&self, raw: &RawQueryOptions) -> ModelResult<QueryOptions> {
        let mut errors = Vec::new();

        let mut page = match raw.page.as_deref().map(parse_int) {
            None => 1,
            Some(Ok(page)) => page,
            Some(Err(_)) => {
                errors.push(ParameterError::new("page", "The `page` parameter must be a number"));
                1
            }
        };
        if page == 0 {
            page = 1;
        }
        if page <= 0 {
            errors.push(ParameterError::new(
                "page",
                "The `page` parameter must be greater than zero",
            ));
        }

        let limit = match raw.count.as_deref().map(parse_int) {
            None | Some(Ok(0)) => self.settings.limit() as i64,
            Some(Ok(count)) if count < 0 => {
                errors.push(ParameterError::new(
                    "count",
                    "The `count` parameter must be greater than zero",
                ));
                0
            }
            Some(Ok(count)) => count,
            Some(Err(_)) => {
                errors.push(ParameterError::new("count", "The `count` parameter must be a number"));
                0
            }
        };

        let skip = match raw.skip.as_deref().map(parse_int) {
            None => 0,
            Some(Ok(skip)) if skip < 0 => {
                errors.push(ParameterError::new(
                    "skip",
                    "The `skip` parameter must be greater than or equal to zero",
                ));
                0
            }
            Some(Ok(skip)) => skip,
            Some(Err(_)) => {
                errors.push(ParameterError::new("skip", "The `skip` parameter must be a number"));
                0
            }
        };

        if !errors.is_empty() {
            return Err(ModelError::InvalidParameter(errors));
        }

        // Large pages can push the offset past what storage can address.
        let Some(offset) = (page - 1)
            .checked_mul(limit)
            .and_then(|offset| offset.checked_add(skip))
            .and_then(|offset| usize::try_from(offset).ok())
        else {
            return Err(ModelError::InvalidParameter(vec![ParameterError::new(
                "page",
                "The `page` parameter is too large",
            )]));
        };

        Ok(QueryOptions {
            limit: limit as usize,
            skip: offset,
            page: page as usize,
            sort: self.sort(raw),
            fields: self.fields(raw)?,
            search: raw.q.clone().filter(|q| !q.is_empty()),
            compose: raw.compose.as_deref().map(parse_compose).or(self.settings.compose),
        })
    }

    /// Normalizes a complete read request.
    ///
    /// `acl_fields` is merged into the requested projection following
    /// [`merge_acl`]. A `filter` option, when present, is merged into the
    /// filter with its keys taking precedence. The model's default filters
    /// are merged last and override both.
    pub fn normalize(
        &self,
        filter: FilterInput,
        raw: &RawQueryOptions,
        acl_fields: &Projection,
    ) -> ModelResult<(Query, QueryOptions)> {
        let mut document = self.filter(filter)?;
        if let Some(extra) = &raw.filter {
            document.extend(self.filter(FilterInput::Json(extra.clone()))?);
        }
        if let Some(defaults) = &self.settings.default_filters {
            document.extend(self.filter(FilterInput::Document(defaults.clone()))?);
        }

        let mut options = self.options(raw)?;
        options.fields = merge_acl(&options.fields, acl_fields)?;

        let query = Query {
            filter: compile(&document)?,
            limit: Some(options.limit),
            offset: Some(options.skip),
            sort: options.sort.clone(),
            fields: options.fields.clone(),
        };

        debug!(limit = options.limit, skip = options.skip, page = options.page, "normalized query");

        Ok((query, options))
    }

    fn sort(&self, raw: &RawQueryOptions) -> Vec<Sort> {
        if let Some(Ok(sort)) = raw.sort.as_deref().map(|s| parse_filter(FilterInput::from(s))) {
            if !sort.is_empty() {
                return sort
                    .iter()
                    .map(|(field, order)| Sort::new(field, direction_of(order)))
                    .collect();
            }
        }

        let field = raw
            .sort
            .clone()
            .filter(|s| !s.is_empty() && !s.starts_with('{'))
            .or_else(|| self.settings.sort.clone());
        let order = raw.sort_order.as_deref().or(self.settings.sort_order.as_deref());

        match field {
            Some(field) => {
                let direction = if order == Some("desc") {
                    SortDirection::Desc
                } else {
                    SortDirection::Asc
                };
                vec![Sort::new(field, direction)]
            }
            None => Vec::new(),
        }
    }

    fn fields(&self, raw: &RawQueryOptions) -> ModelResult<Projection> {
        let requested = raw
            .fields
            .as_deref()
            .and_then(|f| serde_json::from_str::<Projection>(f).ok())
            .unwrap_or_default();
        let limiters = &self.settings.field_limiters;

        if requested.is_empty() || limiters.is_empty() || requested.is_inclusion() == limiters.is_inclusion() {
            let mut fields = requested;
            fields.extend(limiters);
            return Ok(fields);
        }

        merge_acl(&requested, limiters)
    }
}

fn parse_int(value: &str) -> Result<i64, std::num::ParseIntError> {
    value.trim().parse::<i64>()
}

fn parse_compose(value: &str) -> bool {
    !matches!(value.trim(), "" | "false" | "0")
}

fn direction_of(order: &Bson) -> SortDirection {
    match order {
        Bson::Int32(v) => SortDirection::from_order(*v as i64),
        Bson::Int64(v) => SortDirection::from_order(*v),
        Bson::Double(v) => SortDirection::from_order(*v as i64),
        Bson::String(s) if s == "desc" => SortDirection::Desc,
        _ => SortDirection::Asc,
    }
}

/// Parses a filter that may be a document or a JSON encoded object.
pub fn parse_filter(input: FilterInput) -> ModelResult<Document> {
    match input {
        FilterInput::Document(document) => Ok(document),
        FilterInput::Json(json) if json.trim().is_empty() => Ok(Document::new()),
        FilterInput::Json(json) => {
            let value: serde_json::Value =
                serde_json::from_str(&json).map_err(|err| ModelError::InvalidFilter(err.to_string()))?;
            match serialize_to_bson(&value)? {
                Bson::Document(document) => Ok(document),
                other => Err(ModelError::InvalidFilter(format!(
                    "expected a JSON object, found {}",
                    other
                ))),
            }
        }
    }
}

/// Checks a filter for forbidden operators at any nesting level.
pub fn validate_query(query: &Document) -> QueryValidation {
    let mut errors = Vec::new();
    scan(&Bson::Document(query.clone()), &mut errors);

    QueryValidation {
        success: errors.is_empty(),
        errors,
    }
}

fn ensure_valid(query: &Document) -> ModelResult<()> {
    if validate_query(query).success {
        Ok(())
    } else {
        Err(ModelError::ForbiddenOperator(FORBIDDEN_OPERATOR.to_string()))
    }
}

fn scan(value: &Bson, errors: &mut Vec<FieldError>) {
    match value {
        Bson::Document(document) => {
            for (key, inner) in document {
                if key == FORBIDDEN_OPERATOR {
                    errors.push(FieldError::new(
                        key.as_str(),
                        "ERROR_FORBIDDEN_OPERATOR",
                        "Bad query. The `$where` operator is not allowed",
                    ));
                }
                scan(inner, errors);
            }
        }
        Bson::Array(items) => items.iter().for_each(|item| scan(item, errors)),
        _ => {}
    }
}

/// Coerces operands of `DateTime` fields to BSON datetimes.
///
/// `$now` becomes the current time, numbers are read as epoch milliseconds
/// and RFC 3339 strings are parsed. Other values are left untouched.
pub fn format_query(query: Document, schema: &Schema) -> Document {
    query
        .into_iter()
        .map(|(key, value)| {
            let value = if matches!(key.as_str(), "$and" | "$or" | "$nor") {
                match value {
                    Bson::Array(items) => Bson::Array(
                        items
                            .into_iter()
                            .map(|item| match item {
                                Bson::Document(inner) => Bson::Document(format_query(inner, schema)),
                                other => other,
                            })
                            .collect(),
                    ),
                    other => other,
                }
            } else if schema.resolve(&key).map(|d| d.field_type) == Some(FieldType::DateTime) {
                coerce_operand(value)
            } else {
                value
            };
            (key, value)
        })
        .collect()
}

fn coerce_operand(value: Bson) -> Bson {
    match value {
        Bson::Document(operators) => Bson::Document(
            operators
                .into_iter()
                .map(|(op, operand)| {
                    let operand = match operand {
                        Bson::Array(items) => Bson::Array(items.into_iter().map(coerce_datetime).collect()),
                        Bson::Document(_) => coerce_operand(operand),
                        other => coerce_datetime(other),
                    };
                    (op, operand)
                })
                .collect(),
        ),
        other => coerce_datetime(other),
    }
}

/// Converts a single value to a BSON datetime when it can be read as one.
pub fn coerce_datetime(value: Bson) -> Bson {
    match value {
        Bson::String(ref s) if s == NOW => Bson::DateTime(DateTime::now()),
        Bson::String(ref s) => match chrono::DateTime::parse_from_rfc3339(s) {
            Ok(parsed) => Bson::DateTime(DateTime::from_millis(parsed.timestamp_millis())),
            Err(_) => value,
        },
        Bson::Int32(ms) => Bson::DateTime(DateTime::from_millis(ms as i64)),
        Bson::Int64(ms) => Bson::DateTime(DateTime::from_millis(ms)),
        Bson::Double(ms) => Bson::DateTime(DateTime::from_millis(ms as i64)),
        other => other,
    }
}

/// Compiles a MongoDB-style filter into an [`Expr`].
///
/// Supported operators: `$eq`, `$ne`, `$gt`, `$gte`, `$lt`, `$lte`, `$in`,
/// `$nin`, `$exists`, `$not`, `$regex` (with `$options`), `$and`, `$or`, `$nor`. Several keys
/// at one level are joined with AND. Returns `None` for an empty filter.
///
/// # Errors
///
/// Returns [`ModelError::InvalidFilter`] on unknown operators or malformed
/// operands.
pub fn compile(filter: &Document) -> ModelResult<Option<Expr>> {
    let mut exprs = Vec::with_capacity(filter.len());

    for (key, value) in filter {
        match key.as_str() {
            "$and" | "$or" | "$nor" => {
                let branches = compile_branches(key, value)?;
                exprs.push(match key.as_str() {
                    "$and" => Expr::And(branches),
                    "$or" => Expr::Or(branches),
                    _ => Expr::Or(branches).not(),
                });
            }
            FORBIDDEN_OPERATOR => return Err(ModelError::ForbiddenOperator(key.clone())),
            op if op.starts_with('$') => {
                return Err(ModelError::InvalidFilter(format!("unknown top level operator `{}`", op)));
            }
            field => exprs.push(compile_field(field, value)?),
        }
    }

    Ok(match exprs.len() {
        0 => None,
        1 => exprs.pop(),
        _ => Some(Expr::And(exprs)),
    })
}

fn compile_branches(key: &str, value: &Bson) -> ModelResult<Vec<Expr>> {
    let Bson::Array(items) = value else {
        return Err(ModelError::InvalidFilter(format!("`{}` expects an array", key)));
    };

    items
        .iter()
        .map(|item| match item {
            Bson::Document(inner) => Ok(compile(inner)?.unwrap_or_else(|| Expr::And(Vec::new()))),
            _ => Err(ModelError::InvalidFilter(format!("`{}` expects an array of objects", key))),
        })
        .collect()
}

fn compile_field(field: &str, value: &Bson) -> ModelResult<Expr> {
    let operators = match value {
        Bson::Document(operators) if operators.keys().next().is_some_and(|k| k.starts_with('$')) => operators,
        other => return Ok(Filter::eq(field, other.clone())),
    };

    let mut exprs = Vec::with_capacity(operators.len());
    for (op, operand) in operators {
        let expr = match op.as_str() {
            "$eq" => Filter::eq(field, operand.clone()),
            "$ne" => Filter::ne(field, operand.clone()),
            "$gt" => Filter::gt(field, operand.clone()),
            "$gte" => Filter::gte(field, operand.clone()),
            "$lt" => Filter::lt(field, operand.clone()),
            "$lte" => Filter::lte(field, operand.clone()),
            "$in" | "$nin" => {
                if !matches!(operand, Bson::Array(_)) {
                    return Err(ModelError::InvalidFilter(format!("`{}` expects an array", op)));
                }
                let op = if op == "$in" { FieldOp::AnyOf } else { FieldOp::NoneOf };
                Expr::field(field.to_string(), op, operand.clone())
            }
            "$exists" => Expr::Exists(field.to_string(), truthy(operand)),
            "$not" => compile_field(field, operand)?.not(),
            "$regex" => {
                let Bson::String(pattern) = operand else {
                    return Err(ModelError::InvalidFilter("`$regex` expects a string".to_string()));
                };
                let pattern = match operators.get_str("$options") {
                    Ok(flags) if !flags.is_empty() => format!("(?{}){}", flags, pattern),
                    _ => pattern.clone(),
                };
                Regex::new(&pattern)
                    .map_err(|err| ModelError::InvalidFilter(format!("invalid `$regex` pattern: {}", err)))?;
                Filter::matches(field, pattern)
            }
            "$options" if operators.contains_key("$regex") => continue,
            FORBIDDEN_OPERATOR => return Err(ModelError::ForbiddenOperator(op.clone())),
            other => {
                return Err(ModelError::InvalidFilter(format!("unknown operator `{}`", other)));
            }
        };
        exprs.push(expr);
    }

    Ok(match exprs.len() {
        1 => exprs.remove(0),
        _ => Expr::And(exprs),
    })
}

fn truthy(value: &Bson) -> bool {
    match value {
        Bson::Boolean(b) => *b,
        Bson::Int32(v) => *v != 0,
        Bson::Int64(v) => *v != 0,
        Bson::Double(v) => *v != 0.0,
        Bson::Null => false,
        _ => true,
    }
}

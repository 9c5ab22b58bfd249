//! Model settings as found in collection definitions.
//!
//! Settings deserialize from the `settings` block of a collection definition,
//! accepting the legacy aliases (`enableVersioning`, `versioningCollection`)
//! next to the current names.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::document::Document;
use crate::hook::HookType;
use crate::projection::Projection;

/// Limit used when neither the request nor the model set one.
pub const DEFAULT_LIMIT: usize = 50;

/// Suffix appended to a model name to form its history collection.
pub const HISTORY_SUFFIX: &str = "Versions";

/// Settings of one model.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ModelSettings {
    /// Default page size.
    pub count: Option<usize>,
    /// Default sort field.
    pub sort: Option<String>,
    /// Default sort order, `asc` or `desc`.
    pub sort_order: Option<String>,
    /// Projection merged into every read.
    pub field_limiters: Projection,
    /// Filter merged into every read.
    pub default_filters: Option<Document>,
    /// History is enabled unless this is explicitly `false`.
    #[serde(alias = "enableVersioning")]
    pub store_revisions: Option<bool>,
    /// Name of the history collection, `<model>Versions` when unset.
    #[serde(alias = "versioningCollection")]
    pub revision_collection: Option<String>,
    pub hooks: HookSettings,
    #[serde(skip_serializing_if = "IndexSettings::is_empty")]
    pub index: IndexSettings,
    pub display_name: Option<String>,
    /// When `false`, fields missing from the schema are rejected.
    pub allow_extension: Option<bool>,
    /// Whether reference fields are composed in output by default.
    pub compose: Option<bool>,
}

impl ModelSettings {
    pub fn history_enabled(&self) -> bool {
        self.store_revisions != Some(false)
    }

    pub fn history_collection(&self, model: &str) -> String {
        self.revision_collection
            .clone()
            .unwrap_or_else(|| format!("{}{}", model, HISTORY_SUFFIX))
    }

    /// Whether undeclared fields are rejected by validation.
    pub fn is_closed(&self) -> bool {
        self.allow_extension == Some(false)
    }

    pub fn limit(&self) -> usize {
        match self.count {
            Some(count) if count > 0 => count,
            _ => DEFAULT_LIMIT,
        }
    }
}

/// Reference to a hook implementation plus its per-model options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "HookConfigRepr")]
pub struct HookConfig {
    #[serde(rename = "hook")]
    pub name: String,
    #[serde(default)]
    pub options: Value,
}

impl HookConfig {
    pub fn new(name: impl Into<String>) -> Self {
        HookConfig {
            name: name.into(),
            options: Value::Null,
        }
    }

    pub fn with_options(mut self, options: Value) -> Self {
        self.options = options;
        self
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum HookConfigRepr {
    Name(String),
    Full {
        hook: String,
        #[serde(default)]
        options: Value,
    },
}

impl From<HookConfigRepr> for HookConfig {
    fn from(repr: HookConfigRepr) -> Self {
        match repr {
            HookConfigRepr::Name(name) => HookConfig::new(name),
            HookConfigRepr::Full { hook, options } => HookConfig::new(hook).with_options(options),
        }
    }
}

/// Hooks configured for each lifecycle point, in execution order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HookSettings {
    pub before_create: Vec<HookConfig>,
    pub after_create: Vec<HookConfig>,
    pub before_update: Vec<HookConfig>,
    pub after_update: Vec<HookConfig>,
    pub before_delete: Vec<HookConfig>,
    pub after_delete: Vec<HookConfig>,
}

impl HookSettings {
    pub fn get(&self, hook_type: HookType) -> &[HookConfig] {
        match hook_type {
            HookType::BeforeCreate => &self.before_create,
            HookType::AfterCreate => &self.after_create,
            HookType::BeforeUpdate => &self.before_update,
            HookType::AfterUpdate => &self.after_update,
            HookType::BeforeDelete => &self.before_delete,
            HookType::AfterDelete => &self.after_delete,
        }
    }

    pub fn get_mut(&mut self, hook_type: HookType) -> &mut Vec<HookConfig> {
        match hook_type {
            HookType::BeforeCreate => &mut self.before_create,
            HookType::AfterCreate => &mut self.after_create,
            HookType::BeforeUpdate => &mut self.before_update,
            HookType::AfterUpdate => &mut self.after_update,
            HookType::BeforeDelete => &mut self.before_delete,
            HookType::AfterDelete => &mut self.after_delete,
        }
    }
}

/// Index options.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexOptions {
    pub unique: bool,
}

/// One index over one or more fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexDefinition {
    /// Field names mapped to `1` or `-1`.
    pub keys: Document,
    #[serde(default)]
    pub options: IndexOptions,
}

impl IndexDefinition {
    pub fn new(keys: Document) -> Self {
        IndexDefinition {
            keys,
            options: IndexOptions::default(),
        }
    }

    pub fn unique(mut self) -> Self {
        self.options.unique = true;
        self
    }

    /// Conventional index name, e.g. `email_1`.
    pub fn name(&self) -> String {
        self.keys
            .iter()
            .map(|(field, order)| format!("{}_{}", field, order))
            .collect::<Vec<_>>()
            .join("_")
    }
}

/// Index settings accept a single definition or a list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "IndexRepr")]
pub struct IndexSettings(pub Vec<IndexDefinition>);

impl IndexSettings {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &IndexDefinition> {
        self.0.iter()
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum IndexRepr {
    One(IndexDefinition),
    Many(Vec<IndexDefinition>),
}

impl From<IndexRepr> for IndexSettings {
    fn from(repr: IndexRepr) -> Self {
        match repr {
            IndexRepr::One(index) => IndexSettings(vec![index]),
            IndexRepr::Many(indexes) => IndexSettings(indexes),
        }
    }
}

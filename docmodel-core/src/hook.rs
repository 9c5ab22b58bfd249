//! Lifecycle hooks.
//!
//! A [`Hook`] is an application supplied transform that runs at one of six
//! lifecycle points ([`HookType`]). Hooks are registered by name in a
//! [`HookRegistry`] and referenced from model settings through
//! [`HookConfig`](crate::settings::HookConfig). Names are resolved once, when
//! the model is built, into a [`HookChain`] per lifecycle point.
//!
//! # Execution
//!
//! A chain is a fold over its hooks: each hook receives the output of the
//! previous one. A hook may
//!
//! - return `Some(document)` to replace the working document,
//! - return `None` to reset the working document to an empty document,
//! - fail with a [`HookError`], which aborts the chain for that document.
//!
//! [`HookChain::run_batch`] runs one chain per document concurrently. It waits
//! for every document before reporting, then surfaces the first error in batch
//! order. [`HookChain::best_effort`] wraps the `after*` chains in a task that is
//! detached from the caller; failures are logged and dropped.

use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use futures::future::{BoxFuture, join_all};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::access::Client;
use crate::document::Document;
use crate::error::{HookError, ModelError, ModelResult};
use crate::schema::Schema;
use crate::settings::HookConfig;

/// Lifecycle point a hook is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum HookType {
    BeforeCreate,
    AfterCreate,
    BeforeUpdate,
    AfterUpdate,
    BeforeDelete,
    AfterDelete,
}

impl HookType {
    pub const ALL: [HookType; 6] = [
        HookType::BeforeCreate,
        HookType::AfterCreate,
        HookType::BeforeUpdate,
        HookType::AfterUpdate,
        HookType::BeforeDelete,
        HookType::AfterDelete,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            HookType::BeforeCreate => "beforeCreate",
            HookType::AfterCreate => "afterCreate",
            HookType::BeforeUpdate => "beforeUpdate",
            HookType::AfterUpdate => "afterUpdate",
            HookType::BeforeDelete => "beforeDelete",
            HookType::AfterDelete => "afterDelete",
        }
    }
}

/// Request data made available to hooks.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestContext {
    pub client: Option<Client>,
    pub api_version: Option<String>,
    /// Arbitrary transport data (headers, route parameters).
    pub extra: Value,
}

/// Everything a hook gets to see besides the document itself.
#[derive(Debug, Clone)]
pub struct HookContext {
    pub hook_type: HookType,
    pub schema: Arc<Schema>,
    pub collection: String,
    pub request: Option<Arc<RequestContext>>,
    /// Filter of the mutation, set for update and delete hooks.
    pub query: Option<Document>,
    /// Update payload, set for update hooks.
    pub update: Option<Document>,
}

impl HookContext {
    pub fn new(hook_type: HookType, schema: Arc<Schema>, collection: impl Into<String>) -> Self {
        HookContext {
            hook_type,
            schema,
            collection: collection.into(),
            request: None,
            query: None,
            update: None,
        }
    }

    pub fn with_request(mut self, request: Option<Arc<RequestContext>>) -> Self {
        self.request = request;
        self
    }

    pub fn with_query(mut self, query: Document) -> Self {
        self.query = Some(query);
        self
    }

    pub fn with_update(mut self, update: Document) -> Self {
        self.update = Some(update);
        self
    }
}

/// An application supplied lifecycle hook.
#[async_trait]
pub trait Hook: Send + Sync + Debug {
    /// Transforms `document`.
    ///
    /// `options` are the per-model options of the hook configuration.
    /// Returning `None` resets the working document to an empty document.
    async fn apply(
        &self,
        document: Document,
        options: &Value,
        ctx: &HookContext,
    ) -> Result<Option<Document>, HookError>;
}

/// Hook implementations addressable by name.
#[derive(Debug, Clone, Default)]
pub struct HookRegistry {
    hooks: HashMap<String, Arc<dyn Hook>>,
}

impl HookRegistry {
    pub fn new() -> Self {
        HookRegistry::default()
    }

    pub fn register(&mut self, name: impl Into<String>, hook: impl Hook + 'static) -> &mut Self {
        self.hooks.insert(name.into(), Arc::new(hook));
        self
    }

    pub fn with(mut self, name: impl Into<String>, hook: impl Hook + 'static) -> Self {
        self.register(name, hook);
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Hook>> {
        self.hooks.get(name).cloned()
    }

    /// Resolves configured hook names into a chain.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::Configuration`] when a name is not registered.
    pub fn chain(&self, hook_type: HookType, configs: &[HookConfig]) -> ModelResult<HookChain> {
        let steps = configs
            .iter()
            .map(|config| {
                self.get(&config.name)
                    .map(|hook| HookStep {
                        name: config.name.clone(),
                        options: config.options.clone(),
                        hook,
                    })
                    .ok_or_else(|| {
                        ModelError::Configuration(format!(
                            "unknown {} hook `{}`",
                            hook_type.as_str(),
                            config.name
                        ))
                    })
            })
            .collect::<ModelResult<Vec<_>>>()?;

        Ok(HookChain { hook_type, steps })
    }
}

#[derive(Debug, Clone)]
struct HookStep {
    name: String,
    options: Value,
    hook: Arc<dyn Hook>,
}

/// Ordered hooks of one lifecycle point.
#[derive(Debug, Clone)]
pub struct HookChain {
    hook_type: HookType,
    steps: Vec<HookStep>,
}

impl HookChain {
    pub fn empty(hook_type: HookType) -> Self {
        HookChain {
            hook_type,
            steps: Vec::new(),
        }
    }

    pub fn hook_type(&self) -> HookType {
        self.hook_type
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Folds one document through every hook, in order.
    pub async fn run(&self, document: Document, ctx: &HookContext) -> Result<Document, HookError> {
        let mut current = document;

        for step in &self.steps {
            debug!(hook = %step.name, hook_type = self.hook_type.as_str(), "running hook");
            current = step
                .hook
                .apply(current, &step.options, ctx)
                .await
                .map_err(|err| err.in_hook(&step.name))?
                .unwrap_or_default();
        }

        Ok(current)
    }

    /// Runs the chain for every document concurrently.
    ///
    /// Every chain is awaited before returning. On failure the error of the
    /// earliest failing document in the batch is returned.
    pub async fn run_batch(&self, documents: Vec<Document>, ctx: &HookContext) -> Result<Vec<Document>, HookError> {
        if self.steps.is_empty() {
            return Ok(documents);
        }

        join_all(documents.into_iter().map(|document| self.run(document, ctx)))
            .await
            .into_iter()
            .collect()
    }

    /// Builds the task that runs the chain for every document once the
    /// caller has moved on.
    ///
    /// Failures are logged and never reach the caller. Nothing is built when
    /// there are no hooks or no documents.
    pub fn best_effort(self: Arc<Self>, documents: Vec<Document>, ctx: HookContext) -> Option<BoxFuture<'static, ()>> {
        if self.steps.is_empty() || documents.is_empty() {
            return None;
        }

        let chain = self;
        Some(
            async move {
                for result in join_all(documents.into_iter().map(|document| chain.run(document, &ctx))).await {
                    if let Err(err) = result {
                        warn!(
                            hook = %err.hook,
                            hook_type = chain.hook_type.as_str(),
                            collection = %ctx.collection,
                            error = %err,
                            "post-persistence hook failed"
                        );
                    }
                }
            }
            .boxed(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;
    use pretty_assertions::assert_eq;
    use std::sync::Mutex;

    #[derive(Debug)]
    struct SetField(&'static str);

    #[async_trait]
    impl Hook for SetField {
        async fn apply(
            &self,
            mut document: Document,
            options: &Value,
            _ctx: &HookContext,
        ) -> Result<Option<Document>, HookError> {
            let value = options.as_str().unwrap_or("set");
            document.insert(self.0, value);
            Ok(Some(document))
        }
    }

    #[derive(Debug)]
    struct Reset;

    #[async_trait]
    impl Hook for Reset {
        async fn apply(&self, _: Document, _: &Value, _: &HookContext) -> Result<Option<Document>, HookError> {
            Ok(None)
        }
    }

    #[derive(Debug)]
    struct RejectWhen(&'static str);

    #[async_trait]
    impl Hook for RejectWhen {
        async fn apply(&self, document: Document, _: &Value, _: &HookContext) -> Result<Option<Document>, HookError> {
            if document.get_str("title").ok() == Some(self.0) {
                return Err(HookError::new(format!("rejected {}", self.0)));
            }
            Ok(Some(document))
        }
    }

    #[derive(Debug, Default)]
    struct Record(Mutex<Vec<Document>>);

    #[async_trait]
    impl Hook for Arc<Record> {
        async fn apply(&self, document: Document, _: &Value, _: &HookContext) -> Result<Option<Document>, HookError> {
            self.0.lock().unwrap().push(document.clone());
            Ok(Some(document))
        }
    }

    fn ctx() -> HookContext {
        HookContext::new(HookType::BeforeCreate, Arc::new(Schema::new()), "books")
    }

    fn registry() -> HookRegistry {
        HookRegistry::new()
            .with("first", SetField("first"))
            .with("second", SetField("second"))
            .with("reset", Reset)
            .with("reject", RejectWhen("bad"))
            .with("reject-other", RejectWhen("worse"))
    }

    #[tokio::test]
    async fn folds_in_configured_order() {
        let record = Arc::new(Record::default());
        let registry = registry().with("record", Arc::clone(&record));
        let chain = registry
            .chain(
                HookType::BeforeCreate,
                &[
                    HookConfig::new("first").with_options(Value::from("a")),
                    HookConfig::new("record"),
                    HookConfig::new("second"),
                ],
            )
            .unwrap();

        let output = chain.run(doc! { "title": "Dune" }, &ctx()).await.unwrap();

        assert_eq!(output, doc! { "title": "Dune", "first": "a", "second": "set" });
        assert_eq!(
            record.0.lock().unwrap().clone(),
            vec![doc! { "title": "Dune", "first": "a" }]
        );
    }

    #[tokio::test]
    async fn none_resets_the_document() {
        let chain = registry()
            .chain(HookType::BeforeCreate, &[HookConfig::new("reset"), HookConfig::new("first")])
            .unwrap();

        let output = chain.run(doc! { "title": "Dune" }, &ctx()).await.unwrap();
        assert_eq!(output, doc! { "first": "set" });
    }

    #[tokio::test]
    async fn errors_are_tagged_with_the_hook_name() {
        let chain = registry()
            .chain(HookType::BeforeCreate, &[HookConfig::new("reject"), HookConfig::new("first")])
            .unwrap();

        let err = chain.run(doc! { "title": "bad" }, &ctx()).await.unwrap_err();
        assert_eq!(err.hook, "reject");
        assert_eq!(err.code, HookError::DEFAULT_CODE);
    }

    #[tokio::test]
    async fn batch_reports_the_first_failure_in_order() {
        let chain = registry()
            .chain(HookType::BeforeCreate, &[HookConfig::new("reject"), HookConfig::new("reject-other")])
            .unwrap();

        let documents = vec![
            doc! { "title": "fine" },
            doc! { "title": "worse" },
            doc! { "title": "bad" },
        ];
        let err = chain.run_batch(documents, &ctx()).await.unwrap_err();

        assert_eq!(err.hook, "reject-other");
        assert_eq!(err.message, "rejected worse");
    }

    #[test]
    fn unknown_hooks_fail_at_build_time() {
        let err = registry()
            .chain(HookType::AfterDelete, &[HookConfig::new("missing")])
            .unwrap_err();
        assert_eq!(err.code(), "ERROR_CONFIGURATION");
    }
}

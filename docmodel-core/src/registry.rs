//! Process wide lookup of models by name.
//!
//! Models are expensive to build (hook chains, transforms, history) and are
//! meant to be built once. A [`ModelRegistry`] keeps the first model built for
//! a name and hands out shared references to it afterwards.

use std::collections::HashMap;
use std::sync::Arc;

use mea::rwlock::RwLock;
use tracing::debug;

use crate::error::ModelResult;
use crate::model::Model;

#[derive(Debug)]
pub struct ModelRegistry {
    models: RwLock<HashMap<String, Arc<Model>>>,
}

impl Default for ModelRegistry {
    fn default() -> Self {
        ModelRegistry::new()
    }
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self {
            models: RwLock::new(HashMap::new()),
        }
    }

    /// Registers `model` under its name.
    ///
    /// If a model with the same name is already registered it is returned and
    /// `model` is discarded.
    pub async fn register(&self, model: Model) -> Arc<Model> {
        let mut models = self.models.write().await;
        if let Some(existing) = models.get(model.name()) {
            return Arc::clone(existing);
        }

        debug!(model = model.name(), "registered model");
        let model = Arc::new(model);
        models.insert(model.name().to_string(), Arc::clone(&model));
        model
    }

    /// Returns the model registered under `name`, building it with `build` on
    /// first use.
    ///
    /// `build` is not called when the model already exists. A failing build
    /// leaves the registry unchanged.
    pub async fn get_or_try_insert_with<F>(&self, name: &str, build: F) -> ModelResult<Arc<Model>>
    where
        F: FnOnce() -> ModelResult<Model>,
    {
        if let Some(existing) = self.get(name).await {
            return Ok(existing);
        }

        let mut models = self.models.write().await;
        if let Some(existing) = models.get(name) {
            return Ok(Arc::clone(existing));
        }

        let model = Arc::new(build()?);
        debug!(model = name, "registered model");
        models.insert(name.to_string(), Arc::clone(&model));
        Ok(model)
    }

    pub async fn get(&self, name: &str) -> Option<Arc<Model>> {
        self.models.read().await.get(name).cloned()
    }

    /// Names of every registered model, sorted.
    pub async fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.models.read().await.keys().cloned().collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{FindResult, StorageBackend, Update};
    use crate::document::Document;
    use crate::error::{ModelError, StorageResult};
    use crate::query::Query;
    use crate::schema::{FieldDefinition, FieldType, Schema};
    use crate::settings::IndexDefinition;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;

    #[derive(Debug)]
    struct NullStore;

    #[async_trait]
    impl StorageBackend for NullStore {
        async fn is_connected(&self) -> bool {
            true
        }

        async fn insert(&self, documents: Vec<Document>, _: &str) -> StorageResult<Vec<Document>> {
            Ok(documents)
        }

        async fn find(&self, _: &Query, _: &str) -> StorageResult<FindResult> {
            Ok(FindResult::default())
        }

        async fn update(&self, _: &Query, _: &Update, _: &str) -> StorageResult<Vec<Document>> {
            Ok(Vec::new())
        }

        async fn delete(&self, _: &Query, _: &str) -> StorageResult<u64> {
            Ok(0)
        }

        async fn create_index(&self, _: &str, _: &IndexDefinition) -> StorageResult<()> {
            Ok(())
        }
    }

    fn model(name: &str, field: &str) -> Model {
        Model::builder(name, Schema::new().field(field, FieldDefinition::new(FieldType::String)))
            .storage(NullStore)
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn keeps_the_first_model_for_a_name() {
        let registry = ModelRegistry::new();

        let first = registry.register(model("books", "title")).await;
        let second = registry.register(model("books", "isbn")).await;

        assert!(Arc::ptr_eq(&first, &second));
        assert!(second.schema().contains("title"));
    }

    #[tokio::test]
    async fn builds_lazily_and_only_once() {
        let registry = ModelRegistry::new();

        registry
            .get_or_try_insert_with("books", || Ok(model("books", "title")))
            .await
            .unwrap();
        let again = registry
            .get_or_try_insert_with("books", || panic!("should not rebuild"))
            .await
            .unwrap();

        assert_eq!(again.name(), "books");
        assert_eq!(registry.names().await, vec!["books".to_string()]);
    }

    #[tokio::test]
    async fn failed_builds_are_not_registered() {
        let registry = ModelRegistry::new();

        let err = registry
            .get_or_try_insert_with("books", || Err(ModelError::Configuration("broken".to_string())))
            .await
            .unwrap_err();

        assert!(matches!(err, ModelError::Configuration(_)));
        assert!(registry.get("books").await.is_none());
    }
}

use std::sync::Arc;

use docmodel::memory::InMemoryStore;
use docmodel::prelude::*;
use pretty_assertions::assert_eq;
use serde_json::json;

fn from_definition(store: &InMemoryStore) -> ModelResult<Model> {
    let schema: Schema = serde_json::from_value(json!({
        "name": { "type": "String", "required": true },
        "joinedAt": { "type": "DateTime", "format": "unix" }
    }))
    .map_err(|err| ModelError::Configuration(err.to_string()))?;
    let settings: ModelSettings = serde_json::from_value(json!({
        "count": 1,
        "enableVersioning": false
    }))
    .map_err(|err| ModelError::Configuration(err.to_string()))?;

    Model::builder("members", schema)
        .settings(settings)
        .storage(store.clone())
        .build()
}

#[tokio::test]
async fn models_build_from_collection_definitions() {
    let store = InMemoryStore::new();
    let registry = ModelRegistry::new();

    let members = registry
        .get_or_try_insert_with("members", || from_definition(&store))
        .await
        .unwrap();
    assert!(members.history().is_none());

    let created = members
        .create(
            vec![
                doc! { "name": "Ada", "joinedAt": "1970-01-01T00:00:01Z" },
                doc! { "name": "Grace", "joinedAt": 2000 },
            ],
            Document::new(),
            CreateOptions::default(),
        )
        .await
        .unwrap();
    assert_eq!(created.results[0].get("joinedAt"), Some(&Bson::Int64(1000)));

    let page = members.find(Document::new(), FindOptions::default()).await.unwrap();
    assert_eq!(page.results.len(), 1);
    assert_eq!(page.metadata.total_pages, 2);
}

#[tokio::test]
async fn the_registry_hands_out_one_model_per_name() {
    let store = InMemoryStore::new();
    let registry = ModelRegistry::new();

    let first = registry
        .get_or_try_insert_with("members", || from_definition(&store))
        .await
        .unwrap();
    let second = registry
        .get_or_try_insert_with("members", || panic!("built twice"))
        .await
        .unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(registry.names().await, vec!["members".to_string()]);
}

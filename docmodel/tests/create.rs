mod common;

use common::*;
use docmodel::memory::InMemoryStore;
use docmodel::prelude::*;
use pretty_assertions::assert_eq;

#[tokio::test]
async fn create_stamps_bookkeeping_properties() {
    let store = InMemoryStore::new();
    let model = books(&store);

    let created = model
        .create(
            doc! { "title": "Dune" },
            Document::new(),
            CreateOptions::default().client(Client::new("reader-1")).raw_output(),
        )
        .await
        .unwrap();

    let document = &created.results[0];
    assert!(!document.get_str("_id").unwrap().is_empty());
    assert_eq!(document.get("_version"), Some(&Bson::Int64(1)));
    assert_eq!(document.get_str("_createdBy").unwrap(), "reader-1");
    assert!(document.get_i64("_createdAt").unwrap() > 0);
    assert_eq!(document.get_array("_history").unwrap().len(), 0);
    assert_eq!(store.documents("books").await, created.results);
}

#[tokio::test]
async fn create_applies_schema_defaults() {
    let store = InMemoryStore::new();
    let model = books(&store);

    let created = model
        .create(doc! { "title": "Dune" }, Document::new(), CreateOptions::default())
        .await
        .unwrap();

    assert_eq!(created.results[0].get_str("status").unwrap(), "draft");
}

#[tokio::test]
async fn output_hides_history_and_api_version() {
    let store = InMemoryStore::new();
    let model = books(&store);
    let request = RequestContext {
        api_version: Some("1.0".to_string()),
        ..RequestContext::default()
    };

    let created = model
        .create(doc! { "title": "Dune" }, Document::new(), CreateOptions::default().request(request))
        .await
        .unwrap();

    let stored = store.documents("books").await;
    assert_eq!(stored[0].get_str("_apiVersion").unwrap(), "1.0");
    assert!(!created.results[0].contains_key("_apiVersion"));
    assert!(!created.results[0].contains_key("_history"));
}

#[tokio::test]
async fn caller_supplied_internals_are_replaced() {
    let store = InMemoryStore::new();
    let model = books(&store);

    let created = model
        .create(
            doc! { "_id": "dune", "_version": 7, "_createdBy": "someone", "title": "Dune" },
            Document::new(),
            CreateOptions::default().raw_output(),
        )
        .await
        .unwrap();

    let document = &created.results[0];
    assert_eq!(document.get_str("_id").unwrap(), "dune");
    assert_eq!(document.get("_version"), Some(&Bson::Int64(1)));
    assert!(!document.contains_key("_createdBy"));
}

#[tokio::test]
async fn internals_argument_is_merged() {
    let store = InMemoryStore::new();
    let model = books(&store);

    let created = model
        .create(
            doc! { "title": "Dune" },
            doc! { "_createdBy": "importer" },
            CreateOptions::default().raw_output(),
        )
        .await
        .unwrap();

    assert_eq!(created.results[0].get_str("_createdBy").unwrap(), "importer");
}

#[tokio::test]
async fn one_invalid_document_rejects_the_batch() {
    let store = InMemoryStore::new();
    let model = books(&store);

    let err = model
        .create(
            vec![doc! { "title": "Dune" }, doc! { "author": "Nobody", "pages": 0 }],
            Document::new(),
            CreateOptions::default(),
        )
        .await
        .unwrap_err();

    let ModelError::Validation(errors) = err else {
        panic!("expected a validation error, got {err:?}");
    };
    let codes: Vec<(&str, &str)> = errors.iter().map(|e| (e.field.as_str(), e.code.as_str())).collect();
    assert_eq!(codes, vec![("title", "ERROR_REQUIRED"), ("pages", "ERROR_MIN_VALUE")]);
    assert!(store.documents("books").await.is_empty());
}

#[tokio::test]
async fn skipping_validation_stores_anything() {
    let store = InMemoryStore::new();
    let model = books(&store);

    model
        .create(doc! { "pages": "many" }, Document::new(), CreateOptions::default().skip_validation())
        .await
        .unwrap();

    assert_eq!(store.documents("books").await.len(), 1);
}

#[tokio::test]
async fn closed_schemas_reject_unknown_fields() {
    let store = InMemoryStore::new();
    let settings = ModelSettings {
        allow_extension: Some(false),
        ..ModelSettings::default()
    };
    let model = books_with(&store, settings);

    let err = model
        .create(doc! { "title": "Dune", "isbn": "123" }, Document::new(), CreateOptions::default())
        .await
        .unwrap_err();

    assert_eq!(err.code(), "VALIDATION_FAILED");
    let ModelError::Validation(errors) = err else {
        unreachable!()
    };
    assert_eq!(errors[0].field, "isbn");
    assert_eq!(errors[0].code, "ERROR_NOT_IN_SCHEMA");
}

#[tokio::test]
async fn datetime_fields_are_stored_as_dates_and_rendered_as_iso() {
    let store = InMemoryStore::new();
    let model = books(&store);

    let created = model
        .create(
            doc! { "title": "Dune", "publishedAt": "1965-08-01T00:00:00Z" },
            Document::new(),
            CreateOptions::default(),
        )
        .await
        .unwrap();

    let stored = store.documents("books").await;
    assert!(matches!(stored[0].get("publishedAt"), Some(Bson::DateTime(_))));
    assert_eq!(
        created.results[0].get_str("publishedAt").unwrap(),
        "1965-08-01T00:00:00.000Z"
    );
}

#[tokio::test]
async fn unique_indexes_surface_duplicate_keys() {
    let store = InMemoryStore::new();
    let settings = ModelSettings {
        index: serde_json::from_value(serde_json::json!({
            "keys": { "title": 1 },
            "options": { "unique": true }
        }))
        .unwrap(),
        ..ModelSettings::default()
    };
    let model = books_with(&store, settings);
    model.create_indexes().await.unwrap();

    model
        .create(doc! { "title": "Dune" }, Document::new(), CreateOptions::default())
        .await
        .unwrap();
    let err = model
        .create(doc! { "title": "Dune" }, Document::new(), CreateOptions::default())
        .await
        .unwrap_err();

    assert_eq!(err.code(), "ERROR_DUPLICATE_KEY");
    assert_eq!(err.to_api_error().status, 409);
}

#[tokio::test]
async fn invalid_validation_patterns_fail_the_build() {
    let store = InMemoryStore::new();
    let schema = books_schema().field("isbn", FieldDefinition::new(FieldType::String).with_regex("(978"));

    let built = Model::builder("books", schema).storage(store.clone()).build();

    let Err(err) = built else {
        panic!("a model with an invalid pattern was built");
    };
    assert!(matches!(err, ModelError::Configuration(_)));
}

#[tokio::test]
async fn validation_patterns_reject_non_matching_values() {
    let store = InMemoryStore::new();
    let schema = books_schema().field("isbn", FieldDefinition::new(FieldType::String).with_regex(r"^\d{13}$"));
    let model = Model::builder("books", schema).storage(store.clone()).build().unwrap();

    model
        .create(doc! { "title": "Dune", "isbn": "9780441172719" }, Document::new(), CreateOptions::default())
        .await
        .unwrap();

    let err = model
        .create(doc! { "title": "Emma", "isbn": "n/a" }, Document::new(), CreateOptions::default())
        .await
        .unwrap_err();
    let ModelError::Validation(errors) = err else {
        panic!("expected a validation error, got {err:?}");
    };
    assert_eq!(errors[0].field, "isbn");
    assert_eq!(errors[0].code, "ERROR_REGEX");
    assert_eq!(store.documents("books").await.len(), 1);
}

mod common;

use common::*;
use docmodel::memory::InMemoryStore;
use docmodel::prelude::*;
use pretty_assertions::assert_eq;

#[tokio::test]
async fn update_sets_fields_and_bumps_the_version() {
    let store = InMemoryStore::new();
    let model = books(&store);
    let seeded = seed(&model).await;
    let id = id_of(&seeded[0]);

    let updated = model
        .update(
            doc! { "_id": &id },
            doc! { "pages": 500 },
            UpdateOptions::default().client(Client::new("editor")).raw_output(),
        )
        .await
        .unwrap();

    assert_eq!(updated.results.len(), 1);
    let document = &updated.results[0];
    assert_eq!(document.get_i32("pages").unwrap(), 500);
    assert_eq!(document.get("_version"), Some(&Bson::Int64(2)));
    assert_eq!(document.get_str("_lastModifiedBy").unwrap(), "editor");
    assert!(document.get_i64("_lastModifiedAt").is_ok());
    assert_eq!(document.get_str("title").unwrap(), "Dune");
}

#[tokio::test]
async fn update_captures_the_previous_body() {
    let store = InMemoryStore::new();
    let model = books(&store);
    let seeded = seed(&model).await;
    let id = id_of(&seeded[0]);

    let first = model
        .update(doc! { "_id": &id }, doc! { "pages": 500 }, UpdateOptions::default().raw_output())
        .await
        .unwrap();
    model
        .update(doc! { "_id": &id }, doc! { "pages": 600 }, UpdateOptions::default())
        .await
        .unwrap();

    let versions = model.get_versions(&id).await.unwrap();
    assert_eq!(versions.len(), 2);
    assert_eq!(versions[0].version, 1);
    assert_eq!(versions[0].body.get_i32("pages").unwrap(), 412);
    assert_eq!(versions[1].version, 2);
    assert_eq!(versions[1].body.get_i32("pages").unwrap(), 500);

    let history = first.results[0].get_array("_history").unwrap();
    assert_eq!(history, &vec![Bson::String(versions[0].id.clone())]);

    let stored = store.documents("books").await;
    let current = stored.iter().find(|d| id_of(d) == id).unwrap();
    assert_eq!(current.get_array("_history").unwrap().len(), 2);

    let version = model.get_version(&id, &versions[1].id).await.unwrap().unwrap();
    assert_eq!(version, versions[1]);
    assert_eq!(model.get_version(&id, "missing").await.unwrap(), None);
}

#[tokio::test]
async fn versions_live_in_the_sibling_collection() {
    let store = InMemoryStore::new();
    let model = books(&store);
    let seeded = seed(&model).await;

    model
        .update(doc! { "_id": id_of(&seeded[1]) }, doc! { "pages": 321 }, UpdateOptions::default())
        .await
        .unwrap();

    assert_eq!(model.history().unwrap().collection(), "booksVersions");
    assert_eq!(store.documents("booksVersions").await.len(), 1);
}

#[tokio::test]
async fn update_without_history_keeps_no_versions() {
    let store = InMemoryStore::new();
    let settings = ModelSettings {
        store_revisions: Some(false),
        ..ModelSettings::default()
    };
    let model = books_with(&store, settings);
    let seeded = seed(&model).await;
    let id = id_of(&seeded[0]);

    let updated = model
        .update(doc! { "_id": &id }, doc! { "pages": 500 }, UpdateOptions::default().raw_output())
        .await
        .unwrap();

    assert!(!updated.results[0].contains_key("_history"));
    assert!(store.documents("booksVersions").await.is_empty());
    assert!(matches!(
        model.get_versions(&id).await.unwrap_err(),
        ModelError::Configuration(_)
    ));
}

#[tokio::test]
async fn update_matching_nothing_returns_no_results() {
    let store = InMemoryStore::new();
    let model = books(&store);
    seed(&model).await;

    let updated = model
        .update(doc! { "title": "Missing" }, doc! { "pages": 1 }, UpdateOptions::default())
        .await
        .unwrap();

    assert!(updated.results.is_empty());
    assert!(store.documents("booksVersions").await.is_empty());
}

#[tokio::test]
async fn update_applies_to_every_match() {
    let store = InMemoryStore::new();
    let model = books(&store);
    seed(&model).await;

    let updated = model
        .update(r#"{ "status": "published" }"#, doc! { "status": "archived" }, UpdateOptions::default())
        .await
        .unwrap();

    assert_eq!(updated.results.len(), 2);
    assert_eq!(store.documents("booksVersions").await.len(), 2);
}

#[tokio::test]
async fn partial_updates_skip_required_checks_but_not_types() {
    let store = InMemoryStore::new();
    let model = books(&store);
    let seeded = seed(&model).await;
    let id = id_of(&seeded[0]);

    model
        .update(doc! { "_id": &id }, doc! { "author": "F. Herbert" }, UpdateOptions::default())
        .await
        .unwrap();

    let err = model
        .update(doc! { "_id": &id }, doc! { "pages": "many" }, UpdateOptions::default())
        .await
        .unwrap_err();
    let ModelError::Validation(errors) = err else {
        panic!("expected a validation error, got {err:?}");
    };
    assert_eq!(errors[0].code, "ERROR_VALUE_INVALID");
}

#[tokio::test]
async fn update_cannot_rewrite_identity_or_bookkeeping() {
    let store = InMemoryStore::new();
    let model = books(&store);
    let seeded = seed(&model).await;
    let id = id_of(&seeded[0]);

    let updated = model
        .update(
            doc! { "_id": &id },
            doc! { "_id": "other", "_version": 99, "title": "Dune Messiah" },
            UpdateOptions::default().raw_output(),
        )
        .await
        .unwrap();

    let document = &updated.results[0];
    assert_eq!(id_of(document), id);
    assert_eq!(document.get("_version"), Some(&Bson::Int64(2)));
    assert_eq!(document.get_str("title").unwrap(), "Dune Messiah");
}

#[tokio::test]
async fn forbidden_operators_are_rejected() {
    let store = InMemoryStore::new();
    let model = books(&store);

    let err = model
        .update(doc! { "$where": "true" }, doc! { "pages": 1 }, UpdateOptions::default())
        .await
        .unwrap_err();

    assert_eq!(err.code(), "ERROR_FORBIDDEN_OPERATOR");
}

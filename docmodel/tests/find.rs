mod common;

use common::*;
use docmodel::memory::InMemoryStore;
use docmodel::prelude::*;
use pretty_assertions::assert_eq;

fn options(raw: RawQueryOptions) -> FindOptions {
    FindOptions::default().query_options(raw)
}

#[tokio::test]
async fn find_paginates_and_reports_metadata() {
    let store = InMemoryStore::new();
    let model = books(&store);
    seed(&model).await;

    let found = model
        .find(
            Document::new(),
            options(RawQueryOptions::new().count("2").page("2").sort("title")),
        )
        .await
        .unwrap();

    assert_eq!(titles(&found.results), vec!["Ulysses"]);
    assert_eq!(
        found.metadata,
        Metadata {
            limit: 2,
            page: 2,
            offset: 2,
            total_count: 3,
            total_pages: 2,
            next_page: None,
            prev_page: Some(1),
        }
    );
}

#[tokio::test]
async fn find_sorts_descending_from_settings() {
    let store = InMemoryStore::new();
    let settings = ModelSettings {
        sort: Some("pages".to_string()),
        sort_order: Some("desc".to_string()),
        ..ModelSettings::default()
    };
    let model = books_with(&store, settings);
    seed(&model).await;

    let found = model.find(Document::new(), FindOptions::default()).await.unwrap();

    assert_eq!(titles(&found.results), vec!["Ulysses", "Dune", "Emma"]);
}

#[tokio::test]
async fn sort_accepts_a_json_object() {
    let store = InMemoryStore::new();
    let model = books(&store);
    seed(&model).await;

    let found = model
        .find(
            Document::new(),
            options(RawQueryOptions::new().sort(r#"{ "status": -1, "title": 1 }"#)),
        )
        .await
        .unwrap();

    assert_eq!(titles(&found.results), vec!["Dune", "Emma", "Ulysses"]);
}

#[tokio::test]
async fn find_accepts_json_filters() {
    let store = InMemoryStore::new();
    let model = books(&store);
    seed(&model).await;

    let found = model
        .find(
            r#"{ "$or": [{ "author": "Joyce" }, { "pages": { "$lt": 400 } }] }"#,
            options(RawQueryOptions::new().sort("title")),
        )
        .await
        .unwrap();

    assert_eq!(titles(&found.results), vec!["Emma", "Ulysses"]);
}

#[tokio::test]
async fn malformed_filters_are_reported() {
    let store = InMemoryStore::new();
    let model = books(&store);

    let err = model.find("{ not json", FindOptions::default()).await.unwrap_err();
    assert_eq!(err.code(), "ERROR_INVALID_FILTER");

    let err = model
        .find(r#"{ "$where": "this.pages > 1" }"#, FindOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err.code(), "ERROR_FORBIDDEN_OPERATOR");
}

#[tokio::test]
async fn invalid_parameters_are_reported_together() {
    let store = InMemoryStore::new();
    let model = books(&store);

    let err = model
        .find(
            Document::new(),
            options(RawQueryOptions::new().page("-1").skip("x").count("ten")),
        )
        .await
        .unwrap_err();

    let ModelError::InvalidParameter(errors) = err else {
        panic!("expected invalid parameters, got {err:?}");
    };
    let parameters: Vec<&str> = errors.iter().map(|e| e.parameter.as_str()).collect();
    assert_eq!(parameters, vec!["page", "count", "skip"]);
    assert_eq!(errors[2].title, "Invalid Skip Parameter Provided");
    assert_eq!(errors[2].details, "The `skip` parameter must be a number");
}

#[tokio::test]
async fn fields_option_projects_results() {
    let store = InMemoryStore::new();
    let model = books(&store);
    seed(&model).await;

    let found = model
        .find(
            doc! { "title": "Dune" },
            options(RawQueryOptions::new().fields(r#"{ "title": 1 }"#)),
        )
        .await
        .unwrap();

    let keys: Vec<&str> = found.results[0].keys().map(String::as_str).collect();
    assert_eq!(keys, vec!["_id", "title"]);
}

#[tokio::test]
async fn default_filters_always_apply() {
    let store = InMemoryStore::new();
    let settings = ModelSettings {
        default_filters: Some(doc! { "status": "published" }),
        ..ModelSettings::default()
    };
    let model = books_with(&store, settings);
    seed(&model).await;

    let found = model
        .find(doc! { "status": "draft" }, FindOptions::default())
        .await
        .unwrap();

    assert_eq!(found.metadata.total_count, 2);
    assert!(found.results.iter().all(|d| matches!(d.get_str("status"), Ok("published"))));
}

#[tokio::test]
async fn datetime_filters_understand_now() {
    let store = InMemoryStore::new();
    let model = books(&store);
    model
        .create(
            vec![
                doc! { "title": "Dune", "publishedAt": "1965-08-01T00:00:00Z" },
                doc! { "title": "Future", "publishedAt": "2999-01-01T00:00:00Z" },
            ],
            Document::new(),
            CreateOptions::default(),
        )
        .await
        .unwrap();

    let past = model
        .find(r#"{ "publishedAt": { "$lt": "$now" } }"#, FindOptions::default())
        .await
        .unwrap();
    assert_eq!(titles(&past.results), vec!["Dune"]);

    let after_1970 = model
        .find(
            r#"{ "publishedAt": { "$gte": "1970-01-01T00:00:00Z" } }"#,
            FindOptions::default(),
        )
        .await
        .unwrap();
    assert_eq!(titles(&after_1970.results), vec!["Future"]);
}

#[tokio::test]
async fn count_ignores_pagination() {
    let store = InMemoryStore::new();
    let model = books(&store);
    seed(&model).await;

    let counted = model
        .count(
            doc! { "status": "published" },
            options(RawQueryOptions::new().count("1")),
        )
        .await
        .unwrap();

    assert_eq!(counted.metadata.total_count, 2);
    assert_eq!(counted.metadata.total_pages, 2);
}

#[tokio::test]
async fn validate_query_flags_nested_where() {
    let store = InMemoryStore::new();
    let model = books(&store);

    let validation = model.validate_query(&doc! { "$or": [{ "$where": "1" }, { "title": "Dune" }] });
    assert!(!validation.success);
    assert_eq!(validation.errors[0].code, "ERROR_FORBIDDEN_OPERATOR");

    assert!(model.validate_query(&doc! { "title": "Dune" }).success);
}

#[tokio::test]
async fn raw_output_skips_formatting() {
    let store = InMemoryStore::new();
    let model = books(&store);
    seed(&model).await;

    let found = model
        .find(doc! { "title": "Dune" }, FindOptions::default().raw_output())
        .await
        .unwrap();
    assert!(found.results[0].contains_key("_history"));

    let found = model.find(doc! { "title": "Dune" }, FindOptions::default()).await.unwrap();
    assert!(!found.results[0].contains_key("_history"));
}

#[tokio::test]
async fn regex_filters_match_patterns() {
    let store = InMemoryStore::new();
    let model = books(&store);
    seed(&model).await;

    let found = model
        .find(r#"{ "title": { "$regex": "^Du" } }"#, FindOptions::default())
        .await
        .unwrap();
    assert_eq!(titles(&found.results), vec!["Dune"]);

    let found = model
        .find(
            r#"{ "author": { "$regex": "^(austen|joyce)$", "$options": "i" } }"#,
            options(RawQueryOptions::new().sort("title")),
        )
        .await
        .unwrap();
    assert_eq!(titles(&found.results), vec!["Emma", "Ulysses"]);

    let err = model
        .find(r#"{ "title": { "$regex": "(Du" } }"#, FindOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err.code(), "ERROR_INVALID_FILTER");
}

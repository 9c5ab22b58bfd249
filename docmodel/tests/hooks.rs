mod common;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common::*;
use docmodel::memory::InMemoryStore;
use docmodel::prelude::*;
use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use tokio::sync::mpsc::{UnboundedSender, unbounded_channel};

/// Copies its options into the document.
#[derive(Debug)]
struct Stamp;

#[async_trait]
impl Hook for Stamp {
    async fn apply(&self, mut document: Document, options: &Value, _: &HookContext) -> Result<Option<Document>, HookError> {
        if let Value::Object(fields) = options {
            for (key, value) in fields {
                if let Value::String(value) = value {
                    document.insert(key.as_str(), value.as_str());
                }
            }
        }
        Ok(Some(document))
    }
}

#[derive(Debug)]
struct RejectTitle(&'static str);

#[async_trait]
impl Hook for RejectTitle {
    async fn apply(&self, document: Document, _: &Value, _: &HookContext) -> Result<Option<Document>, HookError> {
        if matches!(document.get_str("title"), Ok(title) if title == self.0) {
            return Err(HookError::new("This title is reserved").with_code("TITLE_RESERVED"));
        }
        Ok(Some(document))
    }
}

/// Reports the title and hook type of every document it sees.
#[derive(Debug)]
struct Notify(UnboundedSender<(String, HookType, bool)>);

#[async_trait]
impl Hook for Notify {
    async fn apply(&self, document: Document, _: &Value, ctx: &HookContext) -> Result<Option<Document>, HookError> {
        let title = document.get_str("title").unwrap_or_default().to_string();
        let _ = self.0.send((title, ctx.hook_type, ctx.query.is_some()));
        Ok(Some(document))
    }
}

#[derive(Debug)]
struct Fail;

#[async_trait]
impl Hook for Fail {
    async fn apply(&self, _: Document, _: &Value, _: &HookContext) -> Result<Option<Document>, HookError> {
        Err(HookError::new("always fails"))
    }
}

/// Forwards every indexing request.
#[derive(Debug)]
struct RecordingIndexer(UnboundedSender<(String, usize)>);

#[async_trait]
impl SearchIndexer for RecordingIndexer {
    async fn index(&self, collection: &str, documents: Vec<Document>) -> ModelResult<()> {
        let _ = self.0.send((collection.to_string(), documents.len()));
        Ok(())
    }
}

fn with_hooks(store: &InMemoryStore, configure: impl FnOnce(&mut HookSettings), hooks: HookRegistry) -> Model {
    let mut settings = ModelSettings::default();
    configure(&mut settings.hooks);

    Model::builder("books", books_schema())
        .settings(settings)
        .storage(store.clone())
        .hooks(hooks)
        .build()
        .unwrap()
}

#[tokio::test]
async fn before_create_hooks_receive_their_options() {
    let store = InMemoryStore::new();
    let model = with_hooks(
        &store,
        |hooks| {
            hooks.before_create.push(HookConfig::new("stamp").with_options(json!({ "author": "Anonymous" })));
            hooks.before_create.push(HookConfig::new("stamp").with_options(json!({ "status": "review" })));
        },
        HookRegistry::new().with("stamp", Stamp),
    );

    let created = model
        .create(doc! { "title": "Dune" }, Document::new(), CreateOptions::default())
        .await
        .unwrap();

    let document = &created.results[0];
    assert_eq!(document.get_str("author").unwrap(), "Anonymous");
    assert_eq!(document.get_str("status").unwrap(), "review");
}

#[tokio::test]
async fn a_failing_before_create_hook_stores_nothing() {
    let store = InMemoryStore::new();
    let model = with_hooks(
        &store,
        |hooks| hooks.before_create.push(HookConfig::new("reserved")),
        HookRegistry::new().with("reserved", RejectTitle("Emma")),
    );

    let err = model
        .create(
            vec![doc! { "title": "Dune" }, doc! { "title": "Emma" }],
            Document::new(),
            CreateOptions::default(),
        )
        .await
        .unwrap_err();

    assert_eq!(err.code(), "TITLE_RESERVED");
    assert!(store.documents("books").await.is_empty());
}

#[tokio::test]
async fn after_create_hooks_run_in_the_background() {
    let store = InMemoryStore::new();
    let (tx, mut rx) = unbounded_channel();
    let model = with_hooks(
        &store,
        |hooks| {
            hooks.after_create.push(HookConfig::new("notify"));
            hooks.after_create.push(HookConfig::new("fail"));
        },
        HookRegistry::new().with("notify", Notify(tx)).with("fail", Fail),
    );

    let created = model
        .create(doc! { "title": "Dune" }, Document::new(), CreateOptions::default())
        .await
        .unwrap();
    assert_eq!(created.results.len(), 1);

    let seen = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(seen, ("Dune".to_string(), HookType::AfterCreate, false));
}

#[tokio::test]
async fn before_update_hooks_see_the_query() {
    let store = InMemoryStore::new();
    let (tx, mut rx) = unbounded_channel();
    let model = with_hooks(
        &store,
        |hooks| hooks.before_update.push(HookConfig::new("notify")),
        HookRegistry::new().with("notify", Notify(tx)),
    );
    seed(&model).await;

    model
        .update(doc! { "title": "Dune" }, doc! { "title": "Dune Messiah" }, UpdateOptions::default())
        .await
        .unwrap();

    let seen = rx.recv().await.unwrap();
    assert_eq!(seen, ("Dune Messiah".to_string(), HookType::BeforeUpdate, true));
}

#[tokio::test]
async fn before_update_hooks_can_rewrite_the_update() {
    let store = InMemoryStore::new();
    let model = with_hooks(
        &store,
        |hooks| hooks.before_update.push(HookConfig::new("stamp").with_options(json!({ "status": "revised" }))),
        HookRegistry::new().with("stamp", Stamp),
    );
    seed(&model).await;

    let updated = model
        .update(doc! { "title": "Emma" }, doc! { "pages": 321 }, UpdateOptions::default())
        .await
        .unwrap();

    assert_eq!(updated.results[0].get_str("status").unwrap(), "revised");
}

#[tokio::test]
async fn unknown_hooks_fail_the_build() {
    let store = InMemoryStore::new();
    let mut settings = ModelSettings::default();
    settings.hooks.after_delete.push(HookConfig::new("missing"));

    let built = Model::builder("books", books_schema())
        .settings(settings)
        .storage(store.clone())
        .build();

    let Err(err) = built else {
        panic!("a model with an unknown hook was built");
    };
    assert!(matches!(err, ModelError::Configuration(_)));
}

#[tokio::test]
async fn persisted_documents_are_sent_for_indexing() {
    let store = InMemoryStore::new();
    let (tx, mut rx) = unbounded_channel();
    let model = Model::builder("books", books_schema())
        .storage(store.clone())
        .search(Arc::new(RecordingIndexer(tx)))
        .build()
        .unwrap();

    seed(&model).await;

    let indexed = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(indexed, ("books".to_string(), 3));
}

#[test]
fn detached_work_completes_without_a_tokio_runtime() {
    let store = InMemoryStore::new();
    let (hooks_tx, mut hooks_rx) = unbounded_channel();
    let (index_tx, mut index_rx) = unbounded_channel();
    let mut settings = ModelSettings::default();
    settings.hooks.after_create.push(HookConfig::new("notify"));

    let model = Model::builder("books", books_schema())
        .settings(settings)
        .storage(store.clone())
        .hooks(HookRegistry::new().with("notify", Notify(hooks_tx)))
        .search(Arc::new(RecordingIndexer(index_tx)))
        .build()
        .unwrap();

    let created = futures::executor::block_on(model.create(
        doc! { "title": "Dune" },
        Document::new(),
        CreateOptions::default(),
    ))
    .unwrap();

    assert_eq!(created.results.len(), 1);
    assert_eq!(futures::executor::block_on(store.documents("books")).len(), 1);
    assert_eq!(index_rx.try_recv().unwrap(), ("books".to_string(), 1));
    assert_eq!(
        hooks_rx.try_recv().unwrap(),
        ("Dune".to_string(), HookType::AfterCreate, false)
    );
}

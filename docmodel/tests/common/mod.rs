#![allow(dead_code)]

use docmodel::memory::InMemoryStore;
use docmodel::prelude::*;

pub fn books_schema() -> Schema {
    Schema::new()
        .field("title", FieldDefinition::new(FieldType::String).required().with_max_length(40))
        .field("author", FieldDefinition::new(FieldType::String))
        .field("pages", FieldDefinition::new(FieldType::Number).with_range(Some(1.0), None))
        .field("status", FieldDefinition::new(FieldType::String).with_default("draft"))
        .field("publishedAt", FieldDefinition::new(FieldType::DateTime))
}

pub fn books(store: &InMemoryStore) -> Model {
    books_with(store, ModelSettings::default())
}

pub fn books_with(store: &InMemoryStore, settings: ModelSettings) -> Model {
    Model::builder("books", books_schema())
        .settings(settings)
        .storage(store.clone())
        .build()
        .unwrap()
}

pub async fn seed(model: &Model) -> Vec<Document> {
    model
        .create(
            vec![
                doc! { "title": "Dune", "author": "Herbert", "pages": 412, "status": "published" },
                doc! { "title": "Emma", "author": "Austen", "pages": 320, "status": "published" },
                doc! { "title": "Ulysses", "author": "Joyce", "pages": 730 },
            ],
            Document::new(),
            CreateOptions::default().raw_output(),
        )
        .await
        .unwrap()
        .results
}

pub fn id_of(document: &Document) -> String {
    document.get_str("_id").unwrap().to_string()
}

pub fn titles(documents: &[Document]) -> Vec<&str> {
    documents.iter().map(|d| d.get_str("title").unwrap()).collect()
}

mod common;

use async_trait::async_trait;
use docweave_orm::fake::Operation;
use docweave_orm::schema::FieldExtractor;
use docweave_orm::{
    Connection, Document, FetchOptions, OrmError, OrmResult, Registry, SaveOptions, Schema, Value,
};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;

fn names(items: &[Value]) -> Vec<String> {
    items
        .iter()
        .map(|item| {
            item.as_document()
                .and_then(|doc| doc.get("name").ok())
                .and_then(|name| name.as_str().map(str::to_string))
                .unwrap_or_default()
        })
        .collect()
}

#[tokio::test]
async fn embedding_issues_one_fetch_per_relation() {
    let fixture = common::setup();
    let galleries = fixture
        .schema("Gallery")
        .query(FetchOptions::new().order_by("id"))
        .all()
        .await
        .unwrap();
    assert_eq!(galleries.len(), 2);

    fixture.connection.clear_log();
    galleries.embed(&["images".into()]).await.unwrap();

    let operations = fixture.connection.operations();
    assert_eq!(operations.len(), 1);
    match &operations[0] {
        Operation::Query { source, options } => {
            assert_eq!(source, "image");
            assert_eq!(
                options.conditions["gallery_id"],
                Value::Array(vec![Value::Integer(1), Value::Integer(2)])
            );
        }
        other => panic!("unexpected operation {:?}", other),
    }

    let first = galleries.get(0).unwrap();
    let images = first.as_document().unwrap().get("images").unwrap();
    assert_eq!(
        names(&images.as_collection().unwrap().items()),
        vec!["amiga_1200.jpg", "srinivasa_ramanujan.jpg"]
    );
    let second = galleries.get(1).unwrap();
    assert_eq!(second.as_document().unwrap().get("images").unwrap().as_collection().unwrap().len(), 1);
    assert!(!first.as_document().unwrap().modified());
}

#[tokio::test]
async fn nested_embedding_fetches_each_level_once() {
    let fixture = common::setup();
    let galleries = fixture.schema("Gallery").query(FetchOptions::new()).all().await.unwrap();
    fixture.connection.clear_log();

    galleries.embed(&["images.tags".into()]).await.unwrap();
    assert_eq!(fixture.connection.fetches("image"), 1);
    assert_eq!(fixture.connection.fetches("image_tag"), 1);
    assert_eq!(fixture.connection.fetches("tag"), 1);
    assert_eq!(fixture.connection.operations().len(), 3);

    let tags = galleries
        .get(0)
        .unwrap()
        .as_document()
        .unwrap()
        .get("images.0.tags")
        .unwrap();
    assert_eq!(names(&tags.as_through().unwrap().items().unwrap()), vec!["High Tech", "Computer"]);
}

#[tokio::test]
async fn through_relation_matches_walking_the_pivot() {
    let fixture = common::setup();
    let images = fixture
        .schema("Image")
        .query(FetchOptions::new().order_by("id").with("tags"))
        .all()
        .await
        .unwrap();

    for image in images.documents() {
        let pivot = image.get("images_tags").unwrap();
        let walked: Vec<Value> = pivot
            .as_collection()
            .unwrap()
            .documents()
            .iter()
            .map(|row| row.get("tag").unwrap())
            .collect();
        let projected = image.get("tags").unwrap().as_through().unwrap().items().unwrap();
        assert_eq!(projected, walked);
    }

    let first = images.get(0).unwrap();
    let first = first.as_document().unwrap();
    assert_eq!(first.get("tags.1.name").unwrap(), Value::from("Computer"));
    let second = images.get(1).unwrap();
    assert_eq!(second.as_document().unwrap().get("tags").unwrap().as_through().unwrap().count().unwrap(), 0);
}

#[tokio::test]
async fn belongs_to_save_copies_the_related_key() {
    let fixture = common::setup();
    let image = fixture.schema("Image").create(json!({"name": "new.jpg"})).unwrap();
    image.set("gallery", json!({"name": "New Gallery"})).unwrap();

    assert!(image.save(&SaveOptions::default()).await.unwrap());

    let gallery = image.get("gallery").unwrap();
    let gallery_id = gallery.as_document().unwrap().id();
    assert_eq!(gallery_id, Value::Integer(3));
    assert_eq!(image.get("gallery_id").unwrap(), gallery_id);

    let row = fixture.connection.row("image", image.id()).unwrap();
    assert_eq!(row["gallery_id"], Value::Integer(3));
    assert!(row.get("gallery").is_none());
    assert!(!image.modified());
}

/// Accepts inserts but never reports generated keys
struct Keyless;

#[async_trait]
impl Connection for Keyless {
    async fn bulk_insert(&self, _schema: &Schema, _entities: &[Document], _fields: &FieldExtractor) -> OrmResult<bool> {
        Ok(true)
    }
}

#[tokio::test]
async fn belongs_to_save_needs_the_related_key() {
    let registry = Registry::new();
    registry.set_connection(Arc::new(Keyless));
    common::define(&registry);

    let image = registry.schema("Image").unwrap().create(json!({"name": "new.jpg"})).unwrap();
    image.set("gallery", json!({"name": "New Gallery"})).unwrap();

    let err = image.save(&SaveOptions::default()).await.unwrap_err();
    assert_eq!(
        err,
        OrmError::MissingRelatedKey {
            relation: "gallery".into()
        }
    );
}

#[tokio::test]
async fn has_many_detach_clears_the_foreign_key() {
    let fixture = common::setup();
    let gallery = fixture
        .schema("Gallery")
        .query(FetchOptions::new().where_eq("id", 1).with("images"))
        .first()
        .await
        .unwrap()
        .unwrap();

    let images = gallery.get("images").unwrap();
    let images = images.as_collection().unwrap();
    assert_eq!(images.len(), 2);
    images.unset(1);

    assert!(gallery.save(&SaveOptions::default()).await.unwrap());
    assert_eq!(fixture.connection.row("image", 2).unwrap()["gallery_id"], Value::Null);
    assert_eq!(fixture.connection.row("image", 1).unwrap()["gallery_id"], Value::Integer(1));
    assert_eq!(fixture.connection.rows("image").len(), 3);
}

#[tokio::test]
async fn has_many_detach_deletes_junction_rows() {
    let fixture = common::setup();
    let image = fixture
        .schema("Image")
        .query(FetchOptions::new().where_eq("id", 1).with("images_tags"))
        .first()
        .await
        .unwrap()
        .unwrap();

    let pivot = image.get("images_tags").unwrap();
    let pivot = pivot.as_collection().unwrap();
    assert_eq!(pivot.len(), 2);
    pivot.unset(0);

    assert!(image.save(&SaveOptions::default()).await.unwrap());
    assert!(fixture.connection.row("image_tag", 1).is_none());
    assert_eq!(fixture.connection.row("image_tag", 2).unwrap()["image_id"], Value::Integer(1));
    assert_eq!(fixture.connection.rows("image_tag").len(), 2);

    let truncates: Vec<Operation> = fixture
        .connection
        .operations()
        .into_iter()
        .filter(|op| matches!(op, Operation::Truncate { .. }))
        .collect();
    assert_eq!(truncates.len(), 1);
}

#[tokio::test]
async fn has_many_save_links_new_children() {
    let fixture = common::setup();
    let gallery = fixture.schema("Gallery").create(json!({"name": "Fresh"})).unwrap();
    let images = gallery.get("images").unwrap();
    let images = images.as_collection().unwrap();
    assert!(images.is_empty());
    images.push(json!({"name": "one.jpg"})).unwrap();
    images.push(json!({"name": "two.jpg"})).unwrap();

    assert!(gallery.save(&SaveOptions::default()).await.unwrap());
    let gallery_id = gallery.id();
    assert_eq!(gallery_id, Value::Integer(3));
    for image in images.documents() {
        assert!(image.exists());
        let row = fixture.connection.row("image", image.id()).unwrap();
        assert_eq!(row["gallery_id"], gallery_id);
    }
}

#[tokio::test]
async fn external_relations_of_existing_entities_need_a_fetch() {
    let fixture = common::setup();
    let gallery = fixture
        .schema("Gallery")
        .query(FetchOptions::new().where_eq("id", 2))
        .first()
        .await
        .unwrap()
        .unwrap();

    assert_eq!(
        gallery.get("images").unwrap_err(),
        OrmError::ExternalRelationRequiresFetch("images".into())
    );
    let images = gallery.fetch("images").await.unwrap();
    assert_eq!(names(&images.as_collection().unwrap().items()), vec!["las_vegas.jpg"]);
    assert!(gallery.get("images").is_ok());
}

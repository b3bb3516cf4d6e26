use docweave_orm::fake::MemoryConnection;
use docweave_orm::{Registry, SaveOptions, Schema, ValidateOptions};
use docweave_validation::RuleValidator;
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;

fn setup() -> (Registry, Arc<MemoryConnection>, Arc<Schema>) {
    let registry = Registry::new();
    let connection = Arc::new(MemoryConnection::new());
    registry.set_connection(connection.clone());

    let mut post = registry.define("Post");
    post.column("title", "string").unwrap();
    post.column("email", "string").unwrap();
    let post = registry.register(post);

    let validator = RuleValidator::new()
        .rule("title", "required")
        .and_then(|v| v.rule("title", "length:3,"))
        .and_then(|v| v.rule("email", "email"))
        .unwrap();
    registry.set_validator("Post", Arc::new(validator));
    (registry, connection, post)
}

#[tokio::test]
async fn invalid_entity_is_not_saved() {
    let (_registry, connection, post) = setup();
    let entity = post.create(json!({"title": "ab", "email": "nope"})).unwrap();

    assert!(!entity.save(&SaveOptions::default()).await.unwrap());
    assert!(!entity.exists());
    assert!(connection.operations().is_empty());

    let errors = entity.errors();
    assert_eq!(errors["title"], vec!["title must be at least 3 long".to_string()]);
    assert_eq!(errors["email"], vec!["email must be a valid email address".to_string()]);
}

#[tokio::test]
async fn valid_entity_is_saved_and_errors_cleared() {
    let (_registry, connection, post) = setup();
    let entity = post.create(json!({"title": "ab"})).unwrap();
    assert!(!entity.validates(&ValidateOptions::default()).await.unwrap());
    assert!(!entity.errors().is_empty());

    entity.set("title", "Rust").unwrap();
    assert!(entity.save(&SaveOptions::default()).await.unwrap());
    assert!(entity.exists());
    assert!(entity.errors().is_empty());
    assert_eq!(connection.rows("post").len(), 1);
}

#[tokio::test]
async fn unvalidated_save_skips_rules() {
    let (_registry, _connection, post) = setup();
    let entity = post.create(json!({})).unwrap();
    assert!(entity.save(&SaveOptions::unvalidated()).await.unwrap());
    assert!(entity.exists());
}

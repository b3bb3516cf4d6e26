//! Shared gallery fixture: galleries own images, images are tagged through
//! an `image_tag` pivot.

#![allow(dead_code)]

use docweave_orm::fake::MemoryConnection;
use docweave_orm::{Registry, RelationSpec, Schema};
use serde_json::json;
use std::sync::Arc;

pub struct Fixture {
    pub registry: Registry,
    pub connection: Arc<MemoryConnection>,
}

impl Fixture {
    pub fn schema(&self, name: &str) -> Arc<Schema> {
        self.registry.schema(name).unwrap()
    }
}

pub fn setup() -> Fixture {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();

    let registry = Registry::new();
    let connection = Arc::new(MemoryConnection::new());
    registry.set_connection(connection.clone());
    define(&registry);
    seed(&connection);
    Fixture { registry, connection }
}

pub fn define(registry: &Registry) {
    let mut gallery = registry.define("Gallery");
    gallery.column("name", "string").unwrap();
    gallery.bind("images", RelationSpec::has_many("Image")).unwrap();
    registry.register(gallery);

    let mut image = registry.define("Image");
    image.column("name", "string").unwrap();
    image.bind("gallery", RelationSpec::belongs_to("Gallery")).unwrap();
    image.bind("images_tags", RelationSpec::has_many("ImageTag")).unwrap();
    image
        .bind("tags", RelationSpec::has_many_through("images_tags", "tag"))
        .unwrap();
    registry.register(image);

    let mut image_tag = registry.define("ImageTag");
    image_tag.bind("image", RelationSpec::belongs_to("Image")).unwrap();
    image_tag.bind("tag", RelationSpec::belongs_to("Tag")).unwrap();
    registry.register(image_tag);

    let mut tag = registry.define("Tag");
    tag.column("name", "string").unwrap();
    tag.bind("images_tags", RelationSpec::new("hasMany", "ImageTag").unwrap()).unwrap();
    registry.register(tag);
}

fn seed(connection: &MemoryConnection) {
    connection.seed(
        "gallery",
        vec![json!({"id": 1, "name": "Foo Gallery"}), json!({"id": 2, "name": "Bar Gallery"})],
    );
    connection.seed(
        "image",
        vec![
            json!({"id": 1, "gallery_id": 1, "name": "amiga_1200.jpg"}),
            json!({"id": 2, "gallery_id": 1, "name": "srinivasa_ramanujan.jpg"}),
            json!({"id": 3, "gallery_id": 2, "name": "las_vegas.jpg"}),
        ],
    );
    connection.seed(
        "tag",
        vec![
            json!({"id": 1, "name": "High Tech"}),
            json!({"id": 2, "name": "Sport"}),
            json!({"id": 3, "name": "Computer"}),
        ],
    );
    connection.seed(
        "image_tag",
        vec![
            json!({"id": 1, "image_id": 1, "tag_id": 1}),
            json!({"id": 2, "image_id": 1, "tag_id": 3}),
            json!({"id": 3, "image_id": 3, "tag_id": 2}),
        ],
    );
}

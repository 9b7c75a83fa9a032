//! Built-in model schemas
//!
//! The field tables the command line can upload to and download from.

use portal_querycsv::{FieldDescriptor, ModelSchema, Relation, ValueType};
use std::sync::Arc;

pub const MODELS: [&str; 5] = ["club", "team", "tag", "officer", "member"];

pub fn tag() -> ModelSchema {
    ModelSchema::new("tag")
        .field(FieldDescriptor::text("name").required().unique())
        .field(FieldDescriptor::text("color").help("Hex color, e.g. #ff8800"))
}

pub fn officer() -> ModelSchema {
    ModelSchema::new("officer")
        .field(FieldDescriptor::text("email").required())
        .field(FieldDescriptor::text("position"))
        .field(FieldDescriptor::slug("club", "club", "name"))
}

pub fn member() -> ModelSchema {
    ModelSchema::new("member")
        .field(FieldDescriptor::text("email").required().unique())
        .field(FieldDescriptor::text("first_name"))
        .field(FieldDescriptor::text("last_name"))
        .field(FieldDescriptor::text("major"))
        .field(FieldDescriptor::scalar("graduation_year", ValueType::Integer))
        .field(FieldDescriptor::image("profile_image"))
}

pub fn club() -> ModelSchema {
    let address = Arc::new(
        ModelSchema::new("address")
            .field(FieldDescriptor::text("street"))
            .field(FieldDescriptor::text("city"))
            .field(FieldDescriptor::text("zip_code")),
    );

    // nested officers write the parent through their `club` field
    let officers = Arc::new(
        ModelSchema::new("officer")
            .field(FieldDescriptor::text("email").required())
            .field(FieldDescriptor::text("position"))
            .field(FieldDescriptor::text("club")),
    );

    ModelSchema::new("club")
        .field(FieldDescriptor::text("name").required().unique())
        .field(FieldDescriptor::text("alias").unique())
        .field(FieldDescriptor::text("about"))
        .field(FieldDescriptor::scalar("founding_year", ValueType::Integer))
        .field(FieldDescriptor::scalar("is_active", ValueType::Boolean))
        .field(FieldDescriptor::scalar_list("roles", ValueType::Text).help("Comma separated role names"))
        .field(FieldDescriptor::slug_many("tags", "tag", "name"))
        .field(FieldDescriptor::image("logo"))
        .field(FieldDescriptor::nested("address", address, Relation::ForeignKey))
        .field(FieldDescriptor::nested("officers", officers, Relation::reverse_many("club")))
}

pub fn team() -> ModelSchema {
    ModelSchema::new("team")
        .field(FieldDescriptor::text("name").required())
        .field(FieldDescriptor::slug("club", "club", "name").required())
        .field(FieldDescriptor::slug_many("members", "member", "email"))
        .field(FieldDescriptor::scalar("founded", ValueType::Date))
}

/// Schema for a model name
pub fn schema_for(model: &str) -> Option<Arc<ModelSchema>> {
    let schema = match model {
        "club" => club(),
        "team" => team(),
        "tag" => tag(),
        "officer" => officer(),
        "member" => member(),
        _ => return None,
    };
    Some(Arc::new(schema))
}

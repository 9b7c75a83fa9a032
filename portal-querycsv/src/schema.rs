//! Model schemas and flat field catalogue
//!
//! A [`ModelSchema`] is a static table of [`FieldDescriptor`]s built once per
//! entity type. Both CSV directions read it: the converter decides how a
//! field is represented, the upsert engine decides how a field is written.
//!
//! ```ignore
//! let officer = Arc::new(ModelSchema::new("officer").field(FieldDescriptor::text("email").required()));
//! let club = ModelSchema::new("club")
//!     .field(FieldDescriptor::text("name").required().unique())
//!     .field(FieldDescriptor::nested("officers", officer, Relation::reverse_many("club")));
//! ```

use crate::error::FieldErrors;
use crate::field_path::FieldPath;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::{Map, Number, Value};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Fields every schema carries
pub const ID_FIELD: &str = "id";
pub const CREATED_AT_FIELD: &str = "created_at";
pub const UPDATED_AT_FIELD: &str = "updated_at";

// ============================================================================
// Value types
// ============================================================================

/// Type of a scalar leaf
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    Text,
    Integer,
    Float,
    Boolean,
    Date,
    DateTime,
}

impl ValueType {
    /// Lenient conversion of spreadsheet text
    ///
    /// Values that cannot be converted are returned unchanged so that
    /// [`ValueType::validate`] can reject them with a field message.
    pub fn coerce(&self, value: &Value) -> Value {
        match (self, value) {
            (Self::Integer, Value::String(s)) => parse_integer(s).map(Value::from).unwrap_or_else(|| value.clone()),
            (Self::Integer, Value::Number(n)) => match n.as_f64().and_then(whole_to_i64) {
                Some(i) if n.as_i64().is_none() => Value::from(i),
                _ => value.clone(),
            },
            (Self::Float, Value::String(s)) => s
                .trim()
                .parse::<f64>()
                .ok()
                .and_then(Number::from_f64)
                .map(Value::Number)
                .unwrap_or_else(|| value.clone()),
            (Self::Boolean, Value::String(s)) => parse_bool(s).map(Value::Bool).unwrap_or_else(|| value.clone()),
            (Self::Boolean, Value::Number(n)) => match n.as_i64() {
                Some(0) => Value::Bool(false),
                Some(1) => Value::Bool(true),
                _ => value.clone(),
            },
            (Self::Text, Value::Number(n)) => Value::String(n.to_string()),
            (Self::Text, Value::Bool(b)) => Value::String(b.to_string()),
            _ => value.clone(),
        }
    }

    /// Strict check, returning the normalized value or a field message
    pub fn validate(&self, value: &Value) -> Result<Value, String> {
        let value = self.coerce(value);
        match self {
            Self::Text => match value {
                Value::String(_) => Ok(value),
                _ => Err("Not a valid string.".to_string()),
            },
            Self::Integer => match &value {
                Value::Number(n) if n.is_i64() || n.is_u64() => Ok(value),
                _ => Err("A valid integer is required.".to_string()),
            },
            Self::Float => match value {
                Value::Number(_) => Ok(value),
                _ => Err("A valid number is required.".to_string()),
            },
            Self::Boolean => match value {
                Value::Bool(_) => Ok(value),
                _ => Err("Must be a valid boolean.".to_string()),
            },
            Self::Date => value
                .as_str()
                .and_then(parse_date)
                .map(|d| Value::String(d.format("%Y-%m-%d").to_string()))
                .ok_or_else(|| "Date has wrong format. Use one of these formats instead: YYYY-MM-DD.".to_string()),
            Self::DateTime => value
                .as_str()
                .and_then(parse_datetime)
                .map(|dt| Value::String(dt.to_rfc3339()))
                .ok_or_else(|| "Datetime has wrong format. Use one of these formats instead: YYYY-MM-DDThh:mm[:ss][+HH:MM|-HH:MM|Z].".to_string()),
        }
    }
}

fn parse_integer(s: &str) -> Option<i64> {
    let s = s.trim();
    if let Ok(i) = s.parse::<i64>() {
        return Some(i);
    }
    // spreadsheets hand integers back as "3.0"
    s.parse::<f64>().ok().and_then(whole_to_i64)
}

/// Whole float that fits an i64 without saturating
fn whole_to_i64(f: f64) -> Option<i64> {
    // i64::MAX as f64 rounds up to 2^63, which is already out of range
    (f.is_finite() && f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64).then_some(f as i64)
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "y" | "1" | "t" | "on" => Some(true),
        "false" | "no" | "n" | "0" | "f" | "off" => Some(false),
        _ => None,
    }
}

fn parse_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .or_else(|| parse_datetime(s).map(|dt| dt.date_naive()))
}

fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M", "%Y-%m-%dT%H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .map(|naive| naive.and_utc())
}

// ============================================================================
// Field descriptors
// ============================================================================

/// How a nested field relates to its parent
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Relation {
    /// Parent holds a reference to one child
    ForeignKey,
    /// Parent and children are joined; the join is replaced on update
    ManyToMany,
    /// Children reference the parent through `remote_field`
    ReverseMany { remote_field: String },
    /// One child references the parent through `remote_field`
    ReverseOne { remote_field: String },
}

impl Relation {
    pub fn reverse_many(remote_field: impl Into<String>) -> Self {
        Self::ReverseMany {
            remote_field: remote_field.into(),
        }
    }

    pub fn reverse_one(remote_field: impl Into<String>) -> Self {
        Self::ReverseOne {
            remote_field: remote_field.into(),
        }
    }

    pub fn is_many(&self) -> bool {
        matches!(self, Self::ManyToMany | Self::ReverseMany { .. })
    }

    pub fn remote_field(&self) -> Option<&str> {
        match self {
            Self::ReverseMany { remote_field } | Self::ReverseOne { remote_field } => Some(remote_field),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub enum FieldKind {
    Scalar(ValueType),
    /// Inline list of scalars, one cell joined by commas
    ScalarList(ValueType),
    /// Reference(s) to another model written as its slug value
    SlugRelated {
        model: String,
        slug_field: String,
        many: bool,
    },
    Nested {
        schema: Arc<ModelSchema>,
        relation: Relation,
        many: bool,
    },
    /// Remote URL fetched on write
    Image,
}

/// One declared field and its capabilities
#[derive(Debug, Clone)]
pub struct FieldDescriptor {
    name: String,
    kind: FieldKind,
    help_text: Option<String>,
    required: bool,
    unique: bool,
    read_only: bool,
    write_only: bool,
}

impl FieldDescriptor {
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            help_text: None,
            required: false,
            unique: false,
            read_only: false,
            write_only: false,
        }
    }

    pub fn text(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Scalar(ValueType::Text))
    }

    pub fn scalar(name: impl Into<String>, value_type: ValueType) -> Self {
        Self::new(name, FieldKind::Scalar(value_type))
    }

    pub fn scalar_list(name: impl Into<String>, value_type: ValueType) -> Self {
        Self::new(name, FieldKind::ScalarList(value_type))
    }

    /// Single slug reference (foreign key written as the related slug)
    pub fn slug(name: impl Into<String>, model: impl Into<String>, slug_field: impl Into<String>) -> Self {
        Self::new(
            name,
            FieldKind::SlugRelated {
                model: model.into(),
                slug_field: slug_field.into(),
                many: false,
            },
        )
    }

    /// Many-to-many slug references
    pub fn slug_many(name: impl Into<String>, model: impl Into<String>, slug_field: impl Into<String>) -> Self {
        Self::new(
            name,
            FieldKind::SlugRelated {
                model: model.into(),
                slug_field: slug_field.into(),
                many: true,
            },
        )
    }

    pub fn nested(name: impl Into<String>, schema: Arc<ModelSchema>, relation: Relation) -> Self {
        let many = relation.is_many();
        Self::new(name, FieldKind::Nested { schema, relation, many })
    }

    pub fn image(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Image)
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self.required = false;
        self
    }

    pub fn write_only(mut self) -> Self {
        self.write_only = true;
        self
    }

    pub fn help(mut self, text: impl Into<String>) -> Self {
        self.help_text = Some(text.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &FieldKind {
        &self.kind
    }

    pub fn help_text(&self) -> Option<&str> {
        self.help_text.as_deref()
    }

    pub fn is_readable(&self) -> bool {
        !self.write_only
    }

    pub fn is_writable(&self) -> bool {
        !self.read_only
    }

    pub fn is_required(&self) -> bool {
        self.required
    }

    pub fn is_unique(&self) -> bool {
        self.unique
    }

    pub fn is_list(&self) -> bool {
        match &self.kind {
            FieldKind::ScalarList(_) => true,
            FieldKind::SlugRelated { many, .. } | FieldKind::Nested { many, .. } => *many,
            _ => false,
        }
    }

    pub fn is_nested(&self) -> bool {
        matches!(self.kind, FieldKind::Nested { .. })
    }

    pub fn is_many_nested(&self) -> bool {
        matches!(self.kind, FieldKind::Nested { many: true, .. })
    }

    pub fn is_image(&self) -> bool {
        matches!(self.kind, FieldKind::Image)
    }

    /// Child schema of a nested field
    pub fn nested_schema(&self) -> Option<&Arc<ModelSchema>> {
        match &self.kind {
            FieldKind::Nested { schema, .. } => Some(schema),
            _ => None,
        }
    }

    pub fn relation(&self) -> Option<&Relation> {
        match &self.kind {
            FieldKind::Nested { relation, .. } => Some(relation),
            _ => None,
        }
    }

    /// Convert one raw leaf value toward this field's type
    pub fn coerce(&self, value: &Value) -> Value {
        match &self.kind {
            FieldKind::Scalar(vt) => vt.coerce(value),
            _ => value.clone(),
        }
    }
}

// ============================================================================
// Model schema
// ============================================================================

#[derive(Debug, Clone)]
pub struct ModelSchema {
    model: String,
    fields: Vec<FieldDescriptor>,
}

impl ModelSchema {
    /// Schema with the read-only `id`, `created_at` and `updated_at` fields
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            fields: vec![
                FieldDescriptor::text(ID_FIELD).read_only(),
                FieldDescriptor::scalar(CREATED_AT_FIELD, ValueType::DateTime).read_only(),
                FieldDescriptor::scalar(UPDATED_AT_FIELD, ValueType::DateTime).read_only(),
            ],
        }
    }

    /// Add a field, replacing any earlier field of the same name
    pub fn field(mut self, descriptor: FieldDescriptor) -> Self {
        match self.fields.iter_mut().find(|f| f.name == descriptor.name) {
            Some(existing) => *existing = descriptor,
            None => self.fields.push(descriptor),
        }
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn get_field_descriptors(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    pub fn field_named(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn unique_fields(&self) -> impl Iterator<Item = &FieldDescriptor> {
        self.fields.iter().filter(|f| f.is_unique())
    }

    /// Expand nested and list fields into flat column names
    pub fn get_flat_fields(&self) -> FlatFieldCatalog {
        let mut fields = Vec::new();

        for descriptor in &self.fields {
            match &descriptor.kind {
                FieldKind::Nested { schema, relation, many } => {
                    for child in &schema.fields {
                        if child.is_nested() || relation.remote_field() == Some(child.name()) {
                            continue;
                        }
                        let path = if *many {
                            FieldPath::list_item(descriptor.name(), Some(child.name()))
                        } else {
                            FieldPath::nested(descriptor.name(), child.name())
                        };
                        fields.push(FlatField {
                            path,
                            descriptor: child.clone(),
                            readable: descriptor.is_readable() && child.is_readable(),
                            writable: descriptor.is_writable() && child.is_writable(),
                            required: descriptor.is_required() && child.is_required(),
                        });
                    }
                }
                _ => fields.push(FlatField {
                    path: FieldPath::plain(descriptor.name()),
                    descriptor: descriptor.clone(),
                    readable: descriptor.is_readable(),
                    writable: descriptor.is_writable(),
                    required: descriptor.is_required(),
                }),
            }
        }

        FlatFieldCatalog { fields }
    }

    /// Validate and clean a nested record
    ///
    /// Read-only and unknown fields are dropped, values are converted to the
    /// declared types, and (unless `partial`) required fields must be present.
    /// Nested items are always validated in full against the child schema.
    pub fn validate(&self, record: &Map<String, Value>, partial: bool) -> Result<Map<String, Value>, FieldErrors> {
        let mut cleaned = Map::new();
        let mut errors = FieldErrors::new();

        for descriptor in &self.fields {
            let name = descriptor.name();
            let value = record.get(name).filter(|v| !is_blank(v));

            let Some(value) = value else {
                if descriptor.is_required() && descriptor.is_writable() && !partial {
                    push_error(&mut errors, name, "This field is required.");
                }
                continue;
            };

            if !descriptor.is_writable() {
                continue;
            }

            match self.validate_field(descriptor, value) {
                Ok(v) => {
                    cleaned.insert(name.to_string(), v);
                }
                Err(field_errors) => {
                    for (key, messages) in field_errors {
                        errors.entry(key).or_default().extend(messages);
                    }
                }
            }
        }

        if errors.is_empty() {
            Ok(cleaned)
        } else {
            Err(errors)
        }
    }

    fn validate_field(&self, descriptor: &FieldDescriptor, value: &Value) -> Result<Value, FieldErrors> {
        let name = descriptor.name();
        let single = |result: Result<Value, String>| {
            result.map_err(|message| {
                let mut errors = FieldErrors::new();
                errors.insert(name.to_string(), vec![message]);
                errors
            })
        };

        match &descriptor.kind {
            FieldKind::Scalar(vt) => single(vt.validate(value)),
            FieldKind::ScalarList(vt) => {
                let items = as_items(value);
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(single(vt.validate(&item))?);
                }
                Ok(Value::Array(out))
            }
            FieldKind::SlugRelated { many: false, .. } => single(slug_value(value).map(Value::String)),
            FieldKind::SlugRelated { many: true, .. } => {
                let mut out = Vec::new();
                for item in as_items(value) {
                    out.push(single(slug_value(&item).map(Value::String))?);
                }
                Ok(Value::Array(out))
            }
            FieldKind::Image => match value {
                Value::String(url) if url.starts_with("http://") || url.starts_with("https://") => Ok(value.clone()),
                Value::String(_) => single(Err("Enter a valid URL.".to_string())),
                _ => single(Err("Not a valid string.".to_string())),
            },
            FieldKind::Nested { schema, many: false, .. } => match value {
                Value::Object(map) => schema
                    .validate(map, false)
                    .map(Value::Object)
                    .map_err(|errors| prefix_errors(&format!("{}.", name), errors)),
                _ => single(Err("Invalid data. Expected a dictionary.".to_string())),
            },
            FieldKind::Nested { schema, many: true, .. } => {
                let Value::Array(items) = value else {
                    return single(Err("Expected a list of items.".to_string()));
                };
                let mut out = Vec::with_capacity(items.len());
                let mut errors = FieldErrors::new();
                for (i, item) in items.iter().enumerate() {
                    let prefix = format!("{}[{}].", name, i);
                    match item {
                        Value::Object(map) => match schema.validate(map, false) {
                            Ok(clean) => out.push(Value::Object(clean)),
                            Err(item_errors) => errors.extend(prefix_errors(&prefix, item_errors)),
                        },
                        _ => push_error(&mut errors, &format!("{}[{}]", name, i), "Invalid data. Expected a dictionary."),
                    }
                }
                if errors.is_empty() {
                    Ok(Value::Array(out))
                } else {
                    Err(errors)
                }
            }
        }
    }
}

fn slug_value(value: &Value) -> Result<String, String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Ok(s.trim().to_string()),
        Value::Number(n) => Ok(n.to_string()),
        _ => Err("Object with that slug does not exist.".to_string()),
    }
}

fn as_items(value: &Value) -> Vec<Value> {
    match value {
        Value::Array(items) => items.iter().filter(|v| !is_blank(v)).cloned().collect(),
        other => vec![other.clone()],
    }
}

fn prefix_errors(prefix: &str, errors: FieldErrors) -> FieldErrors {
    errors.into_iter().map(|(k, v)| (format!("{}{}", prefix, k), v)).collect()
}

fn push_error(errors: &mut FieldErrors, field: &str, message: &str) {
    errors.entry(field.to_string()).or_default().push(message.to_string());
}

/// Null, or a string that trims to nothing
pub fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

// ============================================================================
// Flat field catalogue
// ============================================================================

/// One flat column derived from the schema
#[derive(Debug, Clone)]
pub struct FlatField {
    pub path: FieldPath,
    /// Leaf descriptor (the child field for nested columns)
    pub descriptor: FieldDescriptor,
    pub readable: bool,
    pub writable: bool,
    pub required: bool,
}

impl FlatField {
    pub fn key(&self) -> String {
        self.path.to_string()
    }
}

/// Column selection for templates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FieldPolicy {
    #[default]
    All,
    Required,
    Writable,
}

impl FromStr for FieldPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(Self::All),
            "required" => Ok(Self::Required),
            "writable" => Ok(Self::Writable),
            other => Err(format!("unknown field policy '{}' (expected all, required or writable)", other)),
        }
    }
}

impl fmt::Display for FieldPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::All => "all",
            Self::Required => "required",
            Self::Writable => "writable",
        })
    }
}

#[derive(Debug, Clone)]
pub struct FlatFieldCatalog {
    fields: Vec<FlatField>,
}

impl FlatFieldCatalog {
    pub fn all(&self) -> impl Iterator<Item = &FlatField> {
        self.fields.iter()
    }

    pub fn required(&self) -> impl Iterator<Item = &FlatField> {
        self.fields.iter().filter(|f| f.required)
    }

    pub fn writable(&self) -> impl Iterator<Item = &FlatField> {
        self.fields.iter().filter(|f| f.writable)
    }

    /// Column names for a policy, in declaration order
    pub fn keys(&self, policy: FieldPolicy) -> Vec<String> {
        let fields: Box<dyn Iterator<Item = &FlatField>> = match policy {
            FieldPolicy::All => Box::new(self.all()),
            FieldPolicy::Required => Box::new(self.required()),
            FieldPolicy::Writable => Box::new(self.writable()),
        };
        fields.map(FlatField::key).collect()
    }

    /// Catalogue entry addressed by a concrete or wildcard key
    pub fn find(&self, key: &str) -> Option<&FlatField> {
        self.fields.iter().find(|f| f.path.matches(key))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn club_schema() -> ModelSchema {
        let officer = Arc::new(
            ModelSchema::new("officer")
                .field(FieldDescriptor::text("email").required())
                .field(FieldDescriptor::text("position"))
                .field(FieldDescriptor::slug("club", "club", "name")),
        );
        let contact = Arc::new(ModelSchema::new("contact").field(FieldDescriptor::text("phone")));

        ModelSchema::new("club")
            .field(FieldDescriptor::text("name").required().unique())
            .field(FieldDescriptor::scalar("founded", ValueType::Integer))
            .field(FieldDescriptor::slug_many("tags", "tag", "name"))
            .field(FieldDescriptor::nested("contact", contact, Relation::ForeignKey))
            .field(FieldDescriptor::nested("officers", officer, Relation::reverse_many("club")).required())
    }

    #[test]
    fn test_every_schema_has_timestamps_and_id() {
        let schema = ModelSchema::new("empty");
        let names: Vec<_> = schema.get_field_descriptors().iter().map(|f| f.name()).collect();
        assert_eq!(names, vec!["id", "created_at", "updated_at"]);
        assert!(schema.get_field_descriptors().iter().all(|f| !f.is_writable()));
    }

    #[test]
    fn test_many_nested_implies_list_and_nested() {
        let schema = club_schema();
        for descriptor in schema.get_field_descriptors() {
            if descriptor.is_many_nested() {
                assert!(descriptor.is_list() && descriptor.is_nested());
            }
        }
        assert!(schema.field_named("officers").unwrap().is_many_nested());
        assert!(!schema.field_named("contact").unwrap().is_list());
        assert!(schema.field_named("tags").unwrap().is_list());
    }

    #[test]
    fn test_flat_field_views() {
        let catalog = club_schema().get_flat_fields();

        let all = catalog.keys(FieldPolicy::All);
        assert!(all.contains(&"id".to_string()));
        assert!(all.contains(&"contact.phone".to_string()));
        assert!(all.contains(&"officers[n].email".to_string()));
        assert!(all.contains(&"officers[n].id".to_string()));
        // remote reference is filled in by the engine
        assert!(!all.contains(&"officers[n].club".to_string()));

        let writable = catalog.keys(FieldPolicy::Writable);
        assert!(!writable.contains(&"id".to_string()));
        assert!(!writable.contains(&"officers[n].id".to_string()));
        assert!(writable.contains(&"name".to_string()));

        let required = catalog.keys(FieldPolicy::Required);
        assert_eq!(required, vec!["name".to_string(), "officers[n].email".to_string()]);
    }

    #[test]
    fn test_find_is_wildcard_aware() {
        let catalog = club_schema().get_flat_fields();
        assert_eq!(catalog.find("officers[4].email").unwrap().key(), "officers[n].email");
        assert!(catalog.find("officers[4].unknown").is_none());
    }

    #[test]
    fn test_validate_required_on_create_only() {
        let schema = club_schema();
        let record = json!({"founded": "1999"}).as_object().unwrap().clone();

        let errors = schema.validate(&record, false).unwrap_err();
        assert!(errors.contains_key("name"));
        assert!(errors.contains_key("officers"));

        let cleaned = schema.validate(&record, true).unwrap();
        assert_eq!(cleaned["founded"], json!(1999));
    }

    #[test]
    fn test_validate_drops_read_only_and_unknown() {
        let schema = club_schema();
        let record = json!({"name": "Chess", "id": "abc", "stray": "x", "officers": [{"email": "a@b.c"}]})
            .as_object()
            .unwrap()
            .clone();

        let cleaned = schema.validate(&record, false).unwrap();
        assert!(!cleaned.contains_key("id"));
        assert!(!cleaned.contains_key("stray"));
    }

    #[test]
    fn test_validate_nested_messages_are_keyed_by_item() {
        let schema = club_schema();
        let record = json!({"name": "Chess", "officers": [{"email": "a@b.c"}, {"position": "chair"}]})
            .as_object()
            .unwrap()
            .clone();

        let errors = schema.validate(&record, false).unwrap_err();
        assert_eq!(errors["officers[1].email"], vec!["This field is required.".to_string()]);
    }

    #[test]
    fn test_value_type_coercion() {
        assert_eq!(ValueType::Integer.coerce(&json!("3.0")), json!(3));
        assert_eq!(ValueType::Integer.coerce(&json!(4.0)), json!(4));
        assert_eq!(ValueType::Boolean.coerce(&json!("Yes")), json!(true));
        assert_eq!(ValueType::Text.coerce(&json!(12)), json!("12"));
        assert_eq!(ValueType::Integer.coerce(&json!("abc")), json!("abc"));
        assert!(ValueType::Integer.validate(&json!("abc")).is_err());
        assert_eq!(ValueType::Date.validate(&json!("2024-09-01 00:00:00")).unwrap(), json!("2024-09-01"));
        assert!(ValueType::DateTime.validate(&json!("2024-09-01 10:30")).is_ok());
    }

    #[test]
    fn test_out_of_range_integers_are_rejected() {
        assert_eq!(ValueType::Integer.coerce(&json!(1e30)), json!(1e30));
        assert_eq!(
            ValueType::Integer.validate(&json!(1e30)).unwrap_err(),
            "A valid integer is required."
        );
        assert!(ValueType::Integer.validate(&json!("1e30")).is_err());
        assert!(ValueType::Integer.validate(&json!("9223372036854775808.0")).is_err());
        assert_eq!(ValueType::Integer.validate(&json!("-4.0")).unwrap(), json!(-4));
    }

    #[test]
    fn test_field_policy_parse() {
        assert_eq!("Writable".parse::<FieldPolicy>().unwrap(), FieldPolicy::Writable);
        assert!("some".parse::<FieldPolicy>().is_err());
    }
}

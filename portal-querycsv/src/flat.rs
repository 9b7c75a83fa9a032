//! Flat ↔ nested record conversion
//!
//! A [`FlatRecord`] is one spreadsheet row keyed by flat keys
//! (`name`, `contact.phone`, `officers[0].email`). A [`NestedRecord`] is the
//! same data shaped like the schema. Scalar lists travel in a single cell,
//! joined by `", "`; items containing a comma are wrapped in double quotes.

use crate::error::ConvertError;
use crate::field_path::FieldPath;
use crate::schema::{is_blank, FieldDescriptor, FieldKind, ModelSchema};
use serde_json::{Map, Value};

pub type FlatRecord = Map<String, Value>;
pub type NestedRecord = Map<String, Value>;

/// Highest list index a flat key may address
pub const MAX_LIST_INDEX: usize = 999;

// ============================================================================
// List cell codec
// ============================================================================

/// Join list items into one cell
pub fn join_list(items: &[Value]) -> String {
    items
        .iter()
        .filter(|v| !is_blank(v))
        .map(|item| {
            let text = scalar_text(item);
            // a quoted item would otherwise lose its quotes on split
            let quoted = text.len() >= 2 && text.starts_with('"') && text.ends_with('"');
            if text.contains(',') || quoted {
                format!("\"{}\"", text)
            } else {
                text
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// Split one cell into list items
///
/// Commas inside double quotes do not split; one pair of surrounding quotes is
/// stripped from each item.
pub fn split_list(text: &str) -> Vec<String> {
    let mut items = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;

    for c in text.chars() {
        match c {
            '"' => {
                in_quotes = !in_quotes;
                current.push(c);
            }
            ',' if !in_quotes => items.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    items.push(current);

    items
        .into_iter()
        .map(|item| {
            let item = item.trim();
            let unquoted = if item.len() >= 2 && item.starts_with('"') && item.ends_with('"') {
                &item[1..item.len() - 1]
            } else {
                item
            };
            unquoted.to_string()
        })
        .filter(|item| !item.trim().is_empty())
        .collect()
}

/// Cell text for a scalar
pub fn scalar_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Array(items) => join_list(items),
        other => other.to_string(),
    }
}

// ============================================================================
// flatten
// ============================================================================

/// Nested record to flat keys
///
/// Empty sub-values of nested objects are omitted; top-level scalars are
/// copied as they are.
pub fn flatten(nested: &NestedRecord, schema: &ModelSchema) -> FlatRecord {
    let mut flat = FlatRecord::new();

    for (name, value) in nested {
        let descriptor = schema.field_named(name);

        match (descriptor.map(FieldDescriptor::kind), value) {
            (Some(FieldKind::Nested { many: true, .. }), Value::Array(items)) => {
                flatten_items(name, items, &mut flat);
            }
            (Some(FieldKind::Nested { many: false, .. }), Value::Object(map)) => {
                flatten_object(name, map, &mut flat);
            }
            (Some(FieldKind::ScalarList(_)) | Some(FieldKind::SlugRelated { .. }), Value::Array(items)) => {
                flat.insert(name.clone(), Value::String(join_list(items)));
            }
            // unknown fields follow the value's shape
            (None, Value::Array(items)) if items.iter().any(Value::is_object) => {
                flatten_items(name, items, &mut flat);
            }
            (None, Value::Object(map)) => flatten_object(name, map, &mut flat),
            (_, Value::Array(items)) => {
                flat.insert(name.clone(), Value::String(join_list(items)));
            }
            (_, other) => {
                flat.insert(name.clone(), other.clone());
            }
        }
    }

    flat
}

fn flatten_object(prefix: &str, map: &Map<String, Value>, flat: &mut FlatRecord) {
    for (key, value) in map {
        flatten_leaf(format!("{}.{}", prefix, key), value, flat);
    }
}

fn flatten_items(name: &str, items: &[Value], flat: &mut FlatRecord) {
    for (i, item) in items.iter().enumerate() {
        if let Value::Object(map) = item {
            for (key, value) in map {
                flatten_leaf(format!("{}[{}].{}", name, i, key), value, flat);
            }
        }
    }
}

fn flatten_leaf(key: String, value: &Value, flat: &mut FlatRecord) {
    match value {
        v if is_blank(v) => {}
        Value::Array(items) if items.is_empty() => {}
        Value::Array(items) => {
            flat.insert(key, Value::String(join_list(items)));
        }
        Value::Object(map) => flatten_object(&key, map, flat),
        other => {
            flat.insert(key, other.clone());
        }
    }
}

// ============================================================================
// unflatten
// ============================================================================

/// Flat keys to a nested record
///
/// Values that trim to nothing are skipped. List slots that end up with no
/// populated sub-field are dropped, so the resulting lists are compact. Keys
/// whose root is not a schema field are passed through untouched.
pub fn unflatten(flat: &FlatRecord, schema: &ModelSchema) -> Result<NestedRecord, ConvertError> {
    let mut nested = NestedRecord::new();

    for (raw_key, raw_value) in flat {
        let key = raw_key.trim();
        let value = normalize(raw_value);

        let path = match FieldPath::parse(key) {
            Ok(path) => path,
            Err(err) => {
                if schema.field_named(root_of(key)).is_some() {
                    return Err(err.into());
                }
                if let Some(value) = value {
                    nested.insert(key.to_string(), value);
                }
                continue;
            }
        };

        let Some(descriptor) = schema.field_named(path.root_name()) else {
            if let Some(value) = value {
                nested.insert(key.to_string(), value);
            }
            continue;
        };

        if path.is_list() {
            place_list_item(&mut nested, descriptor, &path, value)?;
        } else if let Some(sub) = path.sub_path() {
            let child_schema = match descriptor.kind() {
                FieldKind::Nested { schema, many: false, .. } => schema,
                _ => return Err(ConvertError::NotNested { key: key.to_string() }),
            };
            let Some(value) = value else { continue };

            let entry = nested
                .entry(path.root_name().to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            match entry {
                Value::Object(map) => {
                    map.insert(sub.to_string(), coerce_leaf(child_schema, sub, value));
                }
                _ => return Err(ConvertError::NotNested { key: key.to_string() }),
            }
        } else if let Some(value) = value {
            nested.insert(path.root_name().to_string(), coerce_plain(descriptor, value));
        }
    }

    compact_lists(&mut nested, schema);
    Ok(nested)
}

fn place_list_item(
    nested: &mut NestedRecord,
    descriptor: &FieldDescriptor,
    path: &FieldPath,
    value: Option<Value>,
) -> Result<(), ConvertError> {
    let key = path.raw_key().to_string();
    let list = nested
        .entry(path.root_name().to_string())
        .or_insert_with(|| Value::Array(Vec::new()));

    let Value::Array(items) = list else {
        return Err(ConvertError::NotManyNested { key });
    };
    let index = path.index().unwrap_or(items.len());
    if index > MAX_LIST_INDEX {
        return Err(ConvertError::IndexOutOfRange {
            key,
            max: MAX_LIST_INDEX,
        });
    }

    match (descriptor.kind(), path.sub_path()) {
        (FieldKind::Nested { schema, many: true, .. }, Some(sub)) => {
            while items.len() <= index {
                items.push(Value::Object(Map::new()));
            }
            if let (Some(value), Value::Object(map)) = (value, &mut items[index]) {
                map.insert(sub.to_string(), coerce_leaf(schema, sub, value));
            }
            Ok(())
        }
        (FieldKind::ScalarList(_) | FieldKind::SlugRelated { many: true, .. }, None) => {
            while items.len() <= index {
                items.push(Value::Null);
            }
            if let Some(value) = value {
                items[index] = descriptor_item(descriptor, value);
            }
            Ok(())
        }
        _ => Err(ConvertError::NotManyNested { key }),
    }
}

/// Drop empty list slots and lists that end up empty
fn compact_lists(nested: &mut NestedRecord, schema: &ModelSchema) {
    let mut emptied = Vec::new();

    for (name, value) in nested.iter_mut() {
        if schema.field_named(name).is_none() {
            continue;
        }
        if let Value::Array(items) = value {
            items.retain(|item| match item {
                Value::Object(map) => map.values().any(|v| !is_blank(v)),
                other => !is_blank(other),
            });
            if items.is_empty() {
                emptied.push(name.clone());
            }
        }
    }

    for name in emptied {
        nested.remove(&name);
    }
}

fn normalize(value: &Value) -> Option<Value> {
    match value {
        Value::Null => None,
        Value::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| Value::String(trimmed.to_string()))
        }
        Value::Array(items) => {
            let items: Vec<Value> = items.iter().filter_map(normalize).collect();
            (!items.is_empty()).then_some(Value::Array(items))
        }
        other => Some(other.clone()),
    }
}

fn root_of(key: &str) -> &str {
    key.split(['[', '.']).next().unwrap_or(key)
}

fn coerce_plain(descriptor: &FieldDescriptor, value: Value) -> Value {
    match descriptor.kind() {
        FieldKind::ScalarList(_) | FieldKind::SlugRelated { many: true, .. } => {
            let items = match value {
                Value::String(text) => split_list(&text).into_iter().map(Value::String).collect(),
                Value::Array(items) => items,
                single => vec![single],
            };
            Value::Array(items.into_iter().map(|item| descriptor_item(descriptor, item)).collect())
        }
        _ => descriptor.coerce(&value),
    }
}

fn descriptor_item(descriptor: &FieldDescriptor, value: Value) -> Value {
    match descriptor.kind() {
        FieldKind::ScalarList(vt) => vt.coerce(&value),
        _ => value,
    }
}

fn coerce_leaf(schema: &ModelSchema, sub: &str, value: Value) -> Value {
    match schema.field_named(sub) {
        Some(child) => coerce_plain(child, value),
        None => value,
    }
}

//! Column-to-field mapping
//!
//! Uploads may rename spreadsheet columns onto schema fields. A column mapped
//! to [`SKIP`] is dropped, a mapping to a field the schema does not know is
//! ignored, and unmapped columns are matched by their own name.

use crate::error::MalformedKeyError;
use crate::field_path::{index_hint, FieldPath};
use crate::flat::FlatRecord;
use crate::schema::{is_blank, FlatFieldCatalog};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::str::FromStr;

/// Target that drops a column
pub const SKIP: &str = "SKIP";

/// One `{column_name, field_name}` override
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldMapping {
    pub column_name: String,
    pub field_name: String,
}

impl FieldMapping {
    pub fn new(column_name: impl Into<String>, field_name: impl Into<String>) -> Self {
        Self {
            column_name: column_name.into(),
            field_name: field_name.into(),
        }
    }

    pub fn skip(column_name: impl Into<String>) -> Self {
        Self::new(column_name, SKIP)
    }
}

/// `"Column=field"` as written on the command line
impl FromStr for FieldMapping {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (column, field) = s
            .rsplit_once('=')
            .ok_or_else(|| format!("mapping '{}' must look like Column=field", s))?;
        let (column, field) = (column.trim(), field.trim());
        if column.is_empty() || field.is_empty() {
            return Err(format!("mapping '{}' must look like Column=field", s));
        }
        Ok(Self::new(column, field))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum ColumnTarget {
    Skip,
    Key(String),
}

/// Resolved renames for one upload
#[derive(Debug, Clone, Default)]
pub struct ColumnPlan {
    targets: HashMap<String, ColumnTarget>,
}

impl ColumnPlan {
    /// Resolve mappings against the schema's flat fields
    ///
    /// A list-item target takes its index from the number in the column
    /// header when there is one, otherwise from how many earlier mappings
    /// addressed the same list field. A header with more than one number is
    /// malformed and fails the whole upload.
    pub fn resolve(mappings: &[FieldMapping], catalog: &FlatFieldCatalog) -> Result<Self, MalformedKeyError> {
        let mut targets = HashMap::new();
        let mut seen_generic: HashMap<String, usize> = HashMap::new();

        for mapping in mappings {
            let column = mapping.column_name.trim().to_string();
            let field_name = mapping.field_name.trim();

            if field_name == SKIP {
                targets.insert(column, ColumnTarget::Skip);
                continue;
            }

            let Some(flat_field) = catalog.find(field_name) else {
                tracing::debug!(column = %column, field = field_name, "Ignoring mapping to unknown field");
                continue;
            };

            let key = if flat_field.path.is_list() {
                let requested = FieldPath::parse(field_name)?;
                let generic = flat_field.path.generic_key();
                let previous = seen_generic.entry(generic).or_insert(0);

                let index = match requested.index() {
                    Some(index) => index,
                    None => index_hint(&column)?.unwrap_or(*previous),
                };
                *previous += 1;

                flat_field.path.assign_index(index).to_string()
            } else {
                flat_field.key()
            };

            targets.insert(column, ColumnTarget::Key(key));
        }

        Ok(Self { targets })
    }

    /// Rename one row's columns and trim its values
    pub fn apply(&self, row: &FlatRecord) -> FlatRecord {
        let mut mapped = FlatRecord::new();

        for (column, value) in row {
            let column = column.trim();
            let key = match self.targets.get(column) {
                Some(ColumnTarget::Skip) => continue,
                Some(ColumnTarget::Key(key)) => key.as_str(),
                None => column,
            };

            let value = trim_value(value);
            // two columns landing on one key: keep the populated one
            if is_blank(&value) && mapped.contains_key(key) {
                continue;
            }
            mapped.insert(key.to_string(), value);
        }

        mapped
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

fn trim_value(value: &Value) -> Value {
    match value {
        Value::String(s) => Value::String(s.trim().to_string()),
        Value::Array(items) => Value::Array(items.iter().map(trim_value).collect()),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldDescriptor, ModelSchema, Relation};
    use serde_json::json;
    use std::sync::Arc;

    fn catalog() -> FlatFieldCatalog {
        let officer = Arc::new(
            ModelSchema::new("officer")
                .field(FieldDescriptor::text("email"))
                .field(FieldDescriptor::text("position")),
        );
        ModelSchema::new("club")
            .field(FieldDescriptor::text("name"))
            .field(FieldDescriptor::nested("officers", officer, Relation::reverse_many("club")))
            .get_flat_fields()
    }

    fn row(value: Value) -> FlatRecord {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn test_skip_and_rename() {
        let plan = ColumnPlan::resolve(
            &[FieldMapping::new("Club Name", "name"), FieldMapping::skip("Notes")],
            &catalog(),
        )
        .unwrap();

        let mapped = plan.apply(&row(json!({"Club Name": " Chess ", "Notes": "x", "other": "y"})));
        assert_eq!(mapped, row(json!({"name": "Chess", "other": "y"})));
    }

    #[test]
    fn test_unknown_target_is_ignored() {
        let plan = ColumnPlan::resolve(&[FieldMapping::new("Col", "no_such_field")], &catalog()).unwrap();
        assert!(plan.is_empty());
        let mapped = plan.apply(&row(json!({"Col": "v"})));
        assert_eq!(mapped, row(json!({"Col": "v"})));
    }

    #[test]
    fn test_wildcard_columns_get_successive_indexes() {
        let plan = ColumnPlan::resolve(
            &[
                FieldMapping::new("President Email", "officers[n].email"),
                FieldMapping::new("Treasurer Email", "officers[n].email"),
                FieldMapping::new("President Role", "officers[n].position"),
            ],
            &catalog(),
        )
        .unwrap();

        let mapped = plan.apply(&row(json!({
            "President Email": "p@x",
            "Treasurer Email": "t@x",
            "President Role": "president",
        })));
        assert_eq!(mapped["officers[0].email"], json!("p@x"));
        assert_eq!(mapped["officers[1].email"], json!("t@x"));
        assert_eq!(mapped["officers[0].position"], json!("president"));
    }

    #[test]
    fn test_header_number_is_the_index() {
        let plan = ColumnPlan::resolve(&[FieldMapping::new("Officer 3 Email", "officers[n].email")], &catalog()).unwrap();
        let mapped = plan.apply(&row(json!({"Officer 3 Email": "a@x"})));
        assert_eq!(mapped["officers[3].email"], json!("a@x"));
    }

    #[test]
    fn test_header_with_two_numbers_is_malformed() {
        let err = ColumnPlan::resolve(&[FieldMapping::new("Officer 1 Email 2", "officers[n].email")], &catalog()).unwrap_err();
        assert!(matches!(err, MalformedKeyError::AmbiguousIndex { count: 2, .. }));
    }

    #[test]
    fn test_parse_cli_mapping() {
        let mapping: FieldMapping = "Club Name = name".parse().unwrap();
        assert_eq!(mapping, FieldMapping::new("Club Name", "name"));
        assert!("nothing".parse::<FieldMapping>().is_err());
    }
}

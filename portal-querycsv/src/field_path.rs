//! Flat key parsing
//!
//! A flat key is one spreadsheet column name in the engine's key grammar:
//!
//! ```text
//! name                 plain field
//! name.sub             field of a single nested object
//! name[3]              list item with a literal index
//! name[n].sub          list item whose index is assigned later
//! ```
//!
//! `n` is the wildcard index. Wildcards are resolved with
//! [`FieldPath::assign_index`]; [`FieldPath::generic_key`] gives the key with
//! the index normalized to `n`, which is what column mapping counts to hand
//! out ordinals.

use crate::error::MalformedKeyError;
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;

static LIST_KEY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([A-Za-z0-9_-]+)\[(\d+|n)\](?:\.([^\[\]]+))?$").expect("static regex")
});

static NESTED_KEY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([A-Za-z0-9_-]+)\.([^\[\]]+)$").expect("static regex"));

static PLAIN_KEY: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9_-]+$").expect("static regex"));

static LITERAL_INDEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[\d+\]").expect("static regex"));

static DIGITS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+").expect("static regex"));

/// Wildcard index marker
pub const WILDCARD: &str = "n";

/// Parsed flat key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldPath {
    raw_key: String,
    root_name: String,
    is_list: bool,
    index: Option<usize>,
    sub_path: Option<String>,
}

impl FieldPath {
    /// Parse a flat key
    pub fn parse(raw_key: &str) -> Result<Self, MalformedKeyError> {
        let malformed = |reason| MalformedKeyError::Grammar {
            key: raw_key.to_string(),
            reason,
        };

        if raw_key.contains('[') || raw_key.contains(']') {
            let caps = LIST_KEY
                .captures(raw_key)
                .ok_or_else(|| malformed("list keys look like name[index].field"))?;

            let index = match &caps[2] {
                WILDCARD => None,
                digits => Some(
                    digits
                        .parse::<usize>()
                        .map_err(|_| malformed("list index out of range"))?,
                ),
            };

            return Ok(Self {
                raw_key: raw_key.to_string(),
                root_name: caps[1].to_string(),
                is_list: true,
                index,
                sub_path: caps.get(3).map(|m| m.as_str().to_string()),
            });
        }

        if raw_key.contains('.') {
            let caps = NESTED_KEY
                .captures(raw_key)
                .ok_or_else(|| malformed("nested keys look like name.field"))?;

            return Ok(Self {
                raw_key: raw_key.to_string(),
                root_name: caps[1].to_string(),
                is_list: false,
                index: None,
                sub_path: Some(caps[2].to_string()),
            });
        }

        if !PLAIN_KEY.is_match(raw_key) {
            return Err(malformed("field names use letters, digits, '_' and '-'"));
        }

        Ok(Self {
            raw_key: raw_key.to_string(),
            root_name: raw_key.to_string(),
            is_list: false,
            index: None,
            sub_path: None,
        })
    }

    /// Wildcard list path `root[n](.sub)`
    pub fn list_item(root_name: &str, sub_path: Option<&str>) -> Self {
        let mut path = Self {
            raw_key: String::new(),
            root_name: root_name.to_string(),
            is_list: true,
            index: None,
            sub_path: sub_path.map(str::to_string),
        };
        path.raw_key = path.to_string();
        path
    }

    /// Nested path `root.sub`
    pub fn nested(root_name: &str, sub_path: &str) -> Self {
        Self {
            raw_key: format!("{}.{}", root_name, sub_path),
            root_name: root_name.to_string(),
            is_list: false,
            index: None,
            sub_path: Some(sub_path.to_string()),
        }
    }

    /// Plain path `root`
    pub fn plain(root_name: &str) -> Self {
        Self {
            raw_key: root_name.to_string(),
            root_name: root_name.to_string(),
            is_list: false,
            index: None,
            sub_path: None,
        }
    }

    pub fn raw_key(&self) -> &str {
        &self.raw_key
    }

    pub fn root_name(&self) -> &str {
        &self.root_name
    }

    pub fn is_list(&self) -> bool {
        self.is_list
    }

    pub fn index(&self) -> Option<usize> {
        self.index
    }

    pub fn sub_path(&self) -> Option<&str> {
        self.sub_path.as_deref()
    }

    pub fn is_wildcard(&self) -> bool {
        self.is_list && self.index.is_none()
    }

    /// Copy of this path with a concrete list index
    ///
    /// Non-list paths are returned unchanged.
    pub fn assign_index(&self, ordinal: usize) -> Self {
        if !self.is_list {
            return self.clone();
        }

        let mut path = Self {
            raw_key: String::new(),
            index: Some(ordinal),
            ..self.clone()
        };
        path.raw_key = path.to_string();
        path
    }

    /// Key with the list index normalized to the wildcard
    pub fn generic_key(&self) -> String {
        if !self.is_list {
            return self.to_string();
        }

        match &self.sub_path {
            Some(sub) => format!("{}[{}].{}", self.root_name, WILDCARD, sub),
            None => format!("{}[{}]", self.root_name, WILDCARD),
        }
    }

    /// Whether a concrete key addresses this path, any literal index matching
    pub fn matches(&self, key: &str) -> bool {
        let key = key.trim();
        key == self.raw_key || LITERAL_INDEX.replace_all(key, "[n]") == self.generic_key()
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.root_name)?;

        if self.is_list {
            match self.index {
                Some(i) => write!(f, "[{}]", i)?,
                None => write!(f, "[{}]", WILDCARD)?,
            }
        }

        if let Some(sub) = &self.sub_path {
            write!(f, ".{}", sub)?;
        }

        Ok(())
    }
}

/// Literal list index embedded in a spreadsheet column header
///
/// "Officer 2 Email" gives `Some(2)`, "Officer Email" gives `None`. A header
/// with more than one number cannot say which one is the index.
pub fn index_hint(column_header: &str) -> Result<Option<usize>, MalformedKeyError> {
    let numbers: Vec<&str> = DIGITS.find_iter(column_header).map(|m| m.as_str()).collect();

    match numbers.as_slice() {
        [] => Ok(None),
        [single] => single
            .parse::<usize>()
            .map(Some)
            .map_err(|_| MalformedKeyError::Grammar {
                key: column_header.to_string(),
                reason: "list index out of range",
            }),
        _ => Err(MalformedKeyError::AmbiguousIndex {
            key: column_header.to_string(),
            count: numbers.len(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain() {
        let path = FieldPath::parse("name").unwrap();
        assert_eq!(path.root_name(), "name");
        assert!(!path.is_list());
        assert_eq!(path.index(), None);
        assert_eq!(path.sub_path(), None);
    }

    #[test]
    fn test_parse_nested() {
        let path = FieldPath::parse("one_tag_nested.color").unwrap();
        assert_eq!(path.root_name(), "one_tag_nested");
        assert!(!path.is_list());
        assert_eq!(path.sub_path(), Some("color"));
    }

    #[test]
    fn test_parse_list_literal_index() {
        let path = FieldPath::parse("tags[3].name").unwrap();
        assert!(path.is_list());
        assert_eq!(path.index(), Some(3));
        assert_eq!(path.sub_path(), Some("name"));
        assert_eq!(path.to_string(), "tags[3].name");
    }

    #[test]
    fn test_parse_list_wildcard_maps_to_none() {
        let path = FieldPath::parse("tags[n].name").unwrap();
        assert!(path.is_wildcard());
        assert_eq!(path.index(), None);
    }

    #[test]
    fn test_parse_list_without_sub_path() {
        let path = FieldPath::parse("roles[0]").unwrap();
        assert!(path.is_list());
        assert_eq!(path.sub_path(), None);
    }

    #[test]
    fn test_parse_rejects_bad_grammar() {
        for key in ["tags[", "tags[x]", "tags[1][2]", "tags[0]x", "tags[0].a[1]", "", "a b", "a..b["] {
            assert!(FieldPath::parse(key).is_err(), "expected '{}' to be malformed", key);
        }
    }

    #[test]
    fn test_assign_index_resolves_wildcard() {
        let path = FieldPath::parse("officers[n].email").unwrap();
        let resolved = path.assign_index(2);

        assert_eq!(resolved.index(), Some(2));
        assert_eq!(resolved.raw_key(), "officers[2].email");
        assert_eq!(resolved.generic_key(), path.generic_key());
        // original untouched
        assert!(path.is_wildcard());
    }

    #[test]
    fn test_generic_key() {
        assert_eq!(FieldPath::parse("tags[7].name").unwrap().generic_key(), "tags[n].name");
        assert_eq!(FieldPath::parse("roles[2]").unwrap().generic_key(), "roles[n]");
        assert_eq!(FieldPath::parse("name").unwrap().generic_key(), "name");
    }

    #[test]
    fn test_matches_any_literal_index() {
        let path = FieldPath::list_item("tags", Some("name"));
        assert!(path.matches("tags[n].name"));
        assert!(path.matches("tags[12].name"));
        assert!(!path.matches("tags[1].color"));
        assert!(!path.matches("other[1].name"));
    }

    #[test]
    fn test_index_hint() {
        assert_eq!(index_hint("Officer Email").unwrap(), None);
        assert_eq!(index_hint("Officer 2 Email").unwrap(), Some(2));
        assert_eq!(index_hint("officers[10].email").unwrap(), Some(10));
        assert!(matches!(
            index_hint("Officer 2 Email 3"),
            Err(MalformedKeyError::AmbiguousIndex { count: 2, .. })
        ));
    }
}

//! Sheet registry and row-shape validation.
//!
//! The registry maps an expected column count to the sheet identifiers that
//! accept rows of that size. It is built once at startup and never mutated
//! afterwards.

use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

use crate::constants::MAX_VALUE_CHARS;
use crate::error::ConfigError;

/// Reasons a row submission does not fit the registry.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("sheet '{sheet_id}' does not accept rows with {columns} columns")]
    UnknownShape { sheet_id: String, columns: usize },

    #[error("column '{column}' is not a string")]
    NotAString { column: String },

    #[error("column '{column}' has {chars} characters (max {max})", max = MAX_VALUE_CHARS)]
    ValueTooLong { column: String, chars: usize },
}

/// A row submission as received from a client.
#[derive(Debug, Clone, Deserialize)]
pub struct RowRequest {
    pub sheet_id: String,
    pub columns: Map<String, Value>,
}

#[derive(Debug, Clone, Default)]
pub struct SheetRegistry {
    shapes: BTreeMap<usize, BTreeSet<String>>,
}

#[derive(Debug, Deserialize)]
struct RegistryFile {
    #[serde(default)]
    sheets: Vec<RegistryFileEntry>,
}

#[derive(Debug, Deserialize)]
struct RegistryFileEntry {
    columns: usize,
    ids: Vec<String>,
}

impl SheetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Permit `sheet_id` to receive rows with `columns` values. Blank ids are ignored.
    pub fn register(&mut self, columns: usize, sheet_id: impl Into<String>) {
        let sheet_id = sheet_id.into();
        let sheet_id = sheet_id.trim();
        if sheet_id.is_empty() {
            return;
        }
        self.shapes
            .entry(columns)
            .or_default()
            .insert(sheet_id.to_string());
    }

    /// Parse entries of the form `3=id1,id2;5=id3`.
    pub fn extend_from_list(&mut self, list: &str) -> Result<(), ConfigError> {
        for entry in list.split(';').map(str::trim).filter(|e| !e.is_empty()) {
            let (size, ids) = entry.split_once('=').ok_or_else(|| ConfigError::Registry {
                entry: entry.to_string(),
                reason: "expected '<columns>=<id>[,<id>...]'".to_string(),
            })?;
            let columns: usize = size.trim().parse().map_err(|e| ConfigError::Registry {
                entry: entry.to_string(),
                reason: format!("column count: {e}"),
            })?;
            for id in ids.split(',') {
                self.register(columns, id);
            }
        }
        Ok(())
    }

    /// Merge entries from a TOML document with `[[sheets]]` tables.
    pub fn extend_from_toml(&mut self, content: &str) -> Result<(), ConfigError> {
        let file: RegistryFile = toml::from_str(content)?;
        for entry in file.sheets {
            for id in entry.ids {
                self.register(entry.columns, id);
            }
        }
        Ok(())
    }

    pub fn is_permitted(&self, columns: usize, sheet_id: &str) -> bool {
        self.shapes
            .get(&columns)
            .map_or(false, |ids| ids.contains(sheet_id))
    }

    pub fn shapes(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.shapes.iter().map(|(columns, ids)| (*columns, ids.len()))
    }

    /// Check a request against the registry and return its values in column order.
    pub fn validate(&self, request: &RowRequest) -> Result<Vec<String>, ValidationError> {
        let columns = request.columns.len();
        if !self.is_permitted(columns, &request.sheet_id) {
            return Err(ValidationError::UnknownShape {
                sheet_id: request.sheet_id.clone(),
                columns,
            });
        }

        request
            .columns
            .iter()
            .map(|(column, value)| {
                let text = value.as_str().ok_or_else(|| ValidationError::NotAString {
                    column: column.clone(),
                })?;
                let chars = text.chars().count();
                if chars > MAX_VALUE_CHARS {
                    return Err(ValidationError::ValueTooLong {
                        column: column.clone(),
                        chars,
                    });
                }
                Ok(text.to_string())
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn registry() -> SheetRegistry {
        let mut registry = SheetRegistry::new();
        registry.register(3, "test-sheet");
        registry.register(3, "cora");
        registry.register(5, "wide");
        registry
    }

    fn request(sheet_id: &str, columns: Value) -> RowRequest {
        serde_json::from_value(json!({ "sheet_id": sheet_id, "columns": columns })).unwrap()
    }

    #[test]
    fn test_valid_row_keeps_insertion_order() {
        let req = request(
            "cora",
            json!({ "Phone": "99999999", "Name": "aaaa", "Email": "aaa@gmail.com" }),
        );
        assert_eq!(
            registry().validate(&req).unwrap(),
            vec!["99999999", "aaaa", "aaa@gmail.com"]
        );
    }

    #[test]
    fn test_wrong_column_count_is_rejected() {
        let req = request(
            "cora",
            json!({ "Name": "a", "Email": "b", "Phone": "c", "extraColumn": "d" }),
        );
        assert_eq!(
            registry().validate(&req),
            Err(ValidationError::UnknownShape {
                sheet_id: "cora".to_string(),
                columns: 4
            })
        );
    }

    #[test]
    fn test_unregistered_sheet_is_rejected() {
        let req = request("someone-else", json!({ "a": "1", "b": "2", "c": "3" }));
        assert!(matches!(
            registry().validate(&req),
            Err(ValidationError::UnknownShape { .. })
        ));
    }

    #[test]
    fn test_non_string_value_is_rejected() {
        let req = request("cora", json!({ "a": "1", "b": 2, "c": "3" }));
        assert_eq!(
            registry().validate(&req),
            Err(ValidationError::NotAString { column: "b".to_string() })
        );
    }

    #[test]
    fn test_value_length_limit_counts_characters() {
        let at_limit = "é".repeat(MAX_VALUE_CHARS);
        let req = request("cora", json!({ "a": at_limit, "b": "", "c": "x" }));
        assert!(registry().validate(&req).is_ok());

        let over = "x".repeat(MAX_VALUE_CHARS + 1);
        let req = request("wide", json!({ "a": "1", "b": "2", "c": "3", "d": "4", "e": over }));
        assert_eq!(
            registry().validate(&req),
            Err(ValidationError::ValueTooLong {
                column: "e".to_string(),
                chars: MAX_VALUE_CHARS + 1
            })
        );
    }

    #[test]
    fn test_extend_from_list() {
        let mut registry = SheetRegistry::new();
        registry.extend_from_list("3=a, b ; 4=c;").unwrap();
        assert!(registry.is_permitted(3, "a"));
        assert!(registry.is_permitted(3, "b"));
        assert!(registry.is_permitted(4, "c"));
        assert!(!registry.is_permitted(4, "a"));

        assert!(registry.extend_from_list("three=a").is_err());
        assert!(registry.extend_from_list("3").is_err());
    }

    #[test]
    fn test_extend_from_toml() {
        let mut registry = SheetRegistry::new();
        registry
            .extend_from_toml(
                r#"
                [[sheets]]
                columns = 2
                ids = ["pair", "  "]

                [[sheets]]
                columns = 6
                ids = ["six"]
                "#,
            )
            .unwrap();
        assert!(registry.is_permitted(2, "pair"));
        assert!(registry.is_permitted(6, "six"));
        assert_eq!(registry.shapes().collect::<Vec<_>>(), vec![(2, 1), (6, 1)]);
    }
}

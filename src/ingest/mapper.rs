//! Field mapping and path extraction
//!
//! Evaluates declarative path expressions against one decoded item and
//! collects the results into a flat field map plus a resolved identity
//! value for the entity resolver. The payload shape is unknown at build
//! time; everything here works over generic `serde_json::Value`s.

use std::collections::BTreeMap;

use serde_json::Value as JsonValue;

use crate::error::ItemError;
use crate::ingest::resolver::TargetKind;
use crate::models::mapping;

/// One item's mapped output: the target kind and identity from the winning
/// identity mapping, plus every successfully extracted field.
#[derive(Debug, Clone, PartialEq)]
pub struct MappedItem {
    pub kind: TargetKind,
    pub identity: String,
    pub fields: BTreeMap<String, JsonValue>,
}

impl MappedItem {
    /// Fetch a field as a trimmed non-empty string, if mapped.
    pub fn string_field(&self, name: &str) -> Option<String> {
        self.fields.get(name).and_then(scalar_to_string)
    }
}

/// Evaluate a path expression against a decoded item.
///
/// Expressions are dot paths with optional numeric indexes in either style:
/// `a.b.0.c` and `a.b[0].c` are equivalent. A missing segment yields `None`,
/// never an error.
pub fn extract_path<'a>(item: &'a JsonValue, expr: &str) -> Option<&'a JsonValue> {
    let mut current = item;

    for segment in expr.split('.') {
        if segment.is_empty() {
            return None;
        }

        let (key, indexes) = split_indexes(segment);

        if !key.is_empty() {
            current = match current {
                JsonValue::Object(map) => map.get(key)?,
                // Bare numeric segment indexing into an array
                JsonValue::Array(items) => {
                    let idx: usize = key.parse().ok()?;
                    items.get(idx)?
                }
                _ => return None,
            };
        }

        for idx in indexes {
            current = match current {
                JsonValue::Array(items) => items.get(idx)?,
                _ => return None,
            };
        }
    }

    Some(current)
}

/// Split `key[1][2]` into `("key", [1, 2])`. Malformed brackets yield no
/// indexes and an unparseable key, which then fails the lookup naturally.
fn split_indexes(segment: &str) -> (&str, Vec<usize>) {
    let Some(bracket) = segment.find('[') else {
        return (segment, Vec::new());
    };

    let (key, rest) = segment.split_at(bracket);
    let mut indexes = Vec::new();

    for part in rest.split('[').skip(1) {
        match part.strip_suffix(']').and_then(|n| n.parse().ok()) {
            Some(idx) => indexes.push(idx),
            None => return (segment, Vec::new()),
        }
    }

    (key, indexes)
}

/// Render a scalar JSON value as an identity/field string.
///
/// Objects, arrays, nulls, and blank strings do not qualify.
pub fn scalar_to_string(value: &JsonValue) -> Option<String> {
    match value {
        JsonValue::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        JsonValue::Number(n) => Some(n.to_string()),
        JsonValue::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Apply an endpoint's mappings to one decoded item.
///
/// Missing paths on non-identity mappings are skipped silently. Identity
/// mappings are tried in order; the first that yields a non-empty scalar
/// wins and fixes the item's target kind. An item where no identity mapping
/// resolves is unprocessable and reported as a per-item error.
pub fn map_item(item: &JsonValue, mappings: &[mapping::Model]) -> Result<MappedItem, ItemError> {
    let mut fields = BTreeMap::new();
    let mut identity: Option<(String, TargetKind)> = None;

    for mapping in mappings {
        let Some(value) = extract_path(item, &mapping.path_expr) else {
            continue;
        };

        if mapping.is_identity && identity.is_none() {
            if let Some(scalar) = scalar_to_string(value) {
                let kind = TargetKind::parse(&mapping.target_kind)
                    .ok_or_else(|| ItemError::UnknownTargetKind(mapping.target_kind.clone()))?;
                identity = Some((scalar, kind));
            }
        }

        if !mapping.target_field.is_empty() {
            fields.insert(mapping.target_field.clone(), value.clone());
        }
    }

    let (identity, kind) = identity.ok_or(ItemError::MissingIdentity)?;

    Ok(MappedItem {
        kind,
        identity,
        fields,
    })
}

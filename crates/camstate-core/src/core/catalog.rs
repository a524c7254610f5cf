// crates/camstate-core/src/core/catalog.rs
// ============================================================================
// Module: camstate Category Catalog Codec
// Description: Mapping between Category rows and the "categories" entry.
// Purpose: Single definition of the in-registry category layout.
// Dependencies: crate::core::{records, time, value}
// ============================================================================

//! ## Overview
//! The `"categories"` entry is a map keyed by the decimal category id. Each
//! value is a map with `id`, `name`, `color`, and `createdAt`. Decoding is
//! lenient and reports every entry it had to skip; validation is strict and
//! rejects the whole value on the first problem.

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use crate::core::records::Category;
use crate::core::records::CategoryId;
use crate::core::time::Timestamp;
use crate::core::value::StateValue;

/// Registry name of the category catalog entry.
pub const CATEGORIES_KEY: &str = "categories";
/// Registry name of the next-free category id counter.
pub const CATEGORY_COUNTER_KEY: &str = "categoryCounter";

/// A catalog entry that could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedCategory {
    /// Map key of the entry.
    pub key: String,
    /// Why it was skipped.
    pub reason: String,
}

/// Result of a lenient decode.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecodedCategories {
    /// Successfully decoded categories keyed by id.
    pub categories: BTreeMap<CategoryId, Category>,
    /// Entries that were skipped.
    pub skipped: Vec<SkippedCategory>,
}

/// Encodes one category as a map value.
#[must_use]
pub fn category_to_value(category: &Category) -> StateValue {
    let mut fields = BTreeMap::new();
    fields.insert("id".to_string(), StateValue::Int(category.id.get()));
    fields.insert("name".to_string(), StateValue::Text(category.name.clone()));
    fields.insert("color".to_string(), StateValue::Text(category.color.clone()));
    fields.insert("createdAt".to_string(), StateValue::Int(category.created_at.as_millis()));
    StateValue::Map(fields)
}

/// Decodes one category from a map value.
///
/// # Errors
///
/// Returns a reason string when a field is missing or has the wrong kind.
pub fn category_from_value(value: &StateValue) -> Result<Category, String> {
    let fields = value.as_map().ok_or_else(|| format!("expected map, found {}", value.kind().as_str()))?;
    let id = fields.get("id").and_then(StateValue::as_int).ok_or("missing integer id")?;
    let name = fields.get("name").and_then(StateValue::as_text).ok_or("missing text name")?;
    let color = fields.get("color").and_then(StateValue::as_text).ok_or("missing text color")?;
    let created_at = fields.get("createdAt").and_then(StateValue::as_int).unwrap_or(0);
    if name.trim().is_empty() {
        return Err("name must be non-empty".to_string());
    }
    Ok(Category {
        id: CategoryId::new(id),
        name: name.to_string(),
        color: color.to_string(),
        created_at: Timestamp::from_millis(created_at),
    })
}

/// Encodes categories into the catalog entry layout.
#[must_use]
pub fn encode_categories<'a>(categories: impl IntoIterator<Item = &'a Category>) -> StateValue {
    StateValue::Map(
        categories
            .into_iter()
            .map(|category| (category.id.to_string(), category_to_value(category)))
            .collect(),
    )
}

/// Decodes the catalog entry, skipping malformed or conflicting entries.
#[must_use]
pub fn decode_categories(value: &StateValue) -> DecodedCategories {
    let mut decoded = DecodedCategories::default();
    let Some(entries) = value.as_map() else {
        decoded.skipped.push(SkippedCategory {
            key: CATEGORIES_KEY.to_string(),
            reason: format!("expected map, found {}", value.kind().as_str()),
        });
        return decoded;
    };
    let mut names = BTreeSet::new();
    for (key, entry) in entries {
        let category = match category_from_value(entry) {
            Ok(category) => category,
            Err(reason) => {
                decoded.skipped.push(SkippedCategory {
                    key: key.clone(),
                    reason,
                });
                continue;
            }
        };
        if key != &category.id.to_string() {
            decoded.skipped.push(SkippedCategory {
                key: key.clone(),
                reason: format!("key does not match id {}", category.id),
            });
            continue;
        }
        if !names.insert(category.name.clone()) {
            decoded.skipped.push(SkippedCategory {
                key: key.clone(),
                reason: format!("duplicate name {}", category.name),
            });
            continue;
        }
        decoded.categories.insert(category.id, category);
    }
    decoded
}

/// Strict validator for the catalog entry.
///
/// # Errors
///
/// Returns the first skip reason when any entry fails to decode.
pub fn validate_categories(value: &StateValue) -> Result<(), String> {
    let decoded = decode_categories(value);
    match decoded.skipped.first() {
        Some(skipped) => Err(format!("category {}: {}", skipped.key, skipped.reason)),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::decode_categories;
    use super::encode_categories;
    use crate::core::records::Category;
    use crate::core::records::CategoryId;
    use crate::core::time::Timestamp;
    use crate::core::value::StateValue;

    fn category(id: i64, name: &str) -> Category {
        Category {
            id: CategoryId::new(id),
            name: name.to_string(),
            color: "#00FF00".to_string(),
            created_at: Timestamp::from_millis(10),
        }
    }

    #[test]
    fn duplicate_names_are_skipped_not_fatal() {
        let value = encode_categories(&[category(1, "Smoke"), category(2, "Smoke")]);
        let decoded = decode_categories(&value);
        assert_eq!(decoded.categories.len(), 1);
        assert_eq!(decoded.skipped.len(), 1);
        assert_eq!(decoded.skipped[0].key, "2");
    }

    #[test]
    fn non_map_catalog_reports_single_skip() {
        let decoded = decode_categories(&StateValue::Int(3));
        assert!(decoded.categories.is_empty());
        assert_eq!(decoded.skipped.len(), 1);
    }
}

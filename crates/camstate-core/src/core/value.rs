// crates/camstate-core/src/core/value.rs
// ============================================================================
// Module: camstate State Values
// Description: Closed tagged value type held by every state entry.
// Purpose: Give state values static shape while keeping a JSON wire form.
// Dependencies: serde, serde_json, thiserror
// ============================================================================

//! ## Overview
//! [`StateValue`] is the only value type a state entry can hold. It maps onto
//! JSON one-to-one except that JSON `null` has no counterpart and floats must
//! be finite, so every stored value survives a JSON round trip unchanged.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Conversion errors between [`StateValue`] and JSON.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValueError {
    /// JSON `null` has no state value representation.
    #[error("null is not a valid state value")]
    Null,
    /// Floats must be finite to survive JSON encoding.
    #[error("non-finite float is not a valid state value")]
    NonFinite,
    /// Integer outside the `i64` range.
    #[error("integer out of range for a state value: {0}")]
    IntegerRange(String),
    /// Encoding or decoding failed.
    #[error("state value codec error: {0}")]
    Codec(String),
}

// ============================================================================
// SECTION: Value Kind
// ============================================================================

/// Discriminant of a [`StateValue`], used in validation messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    /// Boolean.
    Bool,
    /// Signed 64-bit integer.
    Int,
    /// Finite 64-bit float.
    Float,
    /// UTF-8 text.
    Text,
    /// Ordered list.
    List,
    /// String-keyed ordered map.
    Map,
}

impl ValueKind {
    /// Returns a stable label for the kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::Int => "int",
            Self::Float => "float",
            Self::Text => "text",
            Self::List => "list",
            Self::Map => "map",
        }
    }
}

// ============================================================================
// SECTION: State Value
// ============================================================================

/// Value held by a state entry.
///
/// # Invariants
/// - `Float` values are finite when produced through [`StateValue::from_json`].
/// - Map keys are ordered, so encoding is deterministic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StateValue {
    /// Boolean value.
    Bool(bool),
    /// Integer value.
    Int(i64),
    /// Floating point value.
    Float(f64),
    /// Text value.
    Text(String),
    /// List of values.
    List(Vec<StateValue>),
    /// Map of values keyed by string.
    Map(BTreeMap<String, StateValue>),
}

impl StateValue {
    /// Returns the kind of this value.
    #[must_use]
    pub const fn kind(&self) -> ValueKind {
        match self {
            Self::Bool(_) => ValueKind::Bool,
            Self::Int(_) => ValueKind::Int,
            Self::Float(_) => ValueKind::Float,
            Self::Text(_) => ValueKind::Text,
            Self::List(_) => ValueKind::List,
            Self::Map(_) => ValueKind::Map,
        }
    }

    /// Returns an empty map value.
    #[must_use]
    pub const fn empty_map() -> Self {
        Self::Map(BTreeMap::new())
    }

    /// Returns the boolean payload.
    #[must_use]
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(value) => Some(*value),
            _ => None,
        }
    }

    /// Returns the integer payload.
    #[must_use]
    pub const fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(value) => Some(*value),
            _ => None,
        }
    }

    /// Returns the float payload. Integers are not widened.
    #[must_use]
    pub const fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(value) => Some(*value),
            _ => None,
        }
    }

    /// Returns the text payload.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(value) => Some(value.as_str()),
            _ => None,
        }
    }

    /// Returns the list payload.
    #[must_use]
    pub fn as_list(&self) -> Option<&[Self]> {
        match self {
            Self::List(values) => Some(values.as_slice()),
            _ => None,
        }
    }

    /// Returns the map payload.
    #[must_use]
    pub const fn as_map(&self) -> Option<&BTreeMap<String, Self>> {
        match self {
            Self::Map(values) => Some(values),
            _ => None,
        }
    }

    /// Looks up a key when this value is a map.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Self> {
        self.as_map().and_then(|map| map.get(key))
    }

    /// Converts a JSON value into a state value.
    ///
    /// # Errors
    ///
    /// Returns [`ValueError`] when the JSON contains `null` anywhere, an
    /// integer beyond `i64`, or a non-finite number.
    pub fn from_json(value: serde_json::Value) -> Result<Self, ValueError> {
        match value {
            serde_json::Value::Null => Err(ValueError::Null),
            serde_json::Value::Bool(flag) => Ok(Self::Bool(flag)),
            serde_json::Value::Number(number) => {
                if let Some(int) = number.as_i64() {
                    Ok(Self::Int(int))
                } else if number.is_u64() {
                    Err(ValueError::IntegerRange(number.to_string()))
                } else {
                    match number.as_f64() {
                        Some(float) if float.is_finite() => Ok(Self::Float(float)),
                        _ => Err(ValueError::NonFinite),
                    }
                }
            }
            serde_json::Value::String(text) => Ok(Self::Text(text)),
            serde_json::Value::Array(items) => {
                items.into_iter().map(Self::from_json).collect::<Result<Vec<_>, _>>().map(Self::List)
            }
            serde_json::Value::Object(fields) => fields
                .into_iter()
                .map(|(key, value)| Self::from_json(value).map(|value| (key, value)))
                .collect::<Result<BTreeMap<_, _>, _>>()
                .map(Self::Map),
        }
    }

    /// Converts this value into JSON.
    ///
    /// # Errors
    ///
    /// Returns [`ValueError::NonFinite`] when a float is NaN or infinite.
    pub fn to_json(&self) -> Result<serde_json::Value, ValueError> {
        match self {
            Self::Bool(flag) => Ok(serde_json::Value::Bool(*flag)),
            Self::Int(int) => Ok(serde_json::Value::from(*int)),
            Self::Float(float) => serde_json::Number::from_f64(*float)
                .map(serde_json::Value::Number)
                .ok_or(ValueError::NonFinite),
            Self::Text(text) => Ok(serde_json::Value::String(text.clone())),
            Self::List(items) => {
                items.iter().map(Self::to_json).collect::<Result<Vec<_>, _>>().map(serde_json::Value::Array)
            }
            Self::Map(fields) => fields
                .iter()
                .map(|(key, value)| value.to_json().map(|value| (key.clone(), value)))
                .collect::<Result<serde_json::Map<_, _>, _>>()
                .map(serde_json::Value::Object),
        }
    }

    /// Encodes this value as a JSON string.
    ///
    /// # Errors
    ///
    /// Returns [`ValueError`] when the value contains a non-finite float.
    pub fn to_json_string(&self) -> Result<String, ValueError> {
        let json = self.to_json()?;
        serde_json::to_string(&json).map_err(|err| ValueError::Codec(err.to_string()))
    }

    /// Decodes a value from a JSON string.
    ///
    /// # Errors
    ///
    /// Returns [`ValueError`] when the text is not JSON or holds `null`.
    pub fn from_json_str(text: &str) -> Result<Self, ValueError> {
        let json: serde_json::Value =
            serde_json::from_str(text).map_err(|err| ValueError::Codec(err.to_string()))?;
        Self::from_json(json)
    }
}

// ============================================================================
// SECTION: Conversions
// ============================================================================

impl From<bool> for StateValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for StateValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for StateValue {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<u32> for StateValue {
    fn from(value: u32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<f64> for StateValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for StateValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for StateValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<Vec<Self>> for StateValue {
    fn from(value: Vec<Self>) -> Self {
        Self::List(value)
    }
}

impl From<BTreeMap<String, Self>> for StateValue {
    fn from(value: BTreeMap<String, Self>) -> Self {
        Self::Map(value)
    }
}

#[cfg(test)]
mod tests {
    use super::StateValue;
    use super::ValueError;

    #[test]
    fn null_nested_in_object_is_rejected() {
        let json = serde_json::json!({"a": [1, null]});
        assert_eq!(StateValue::from_json(json), Err(ValueError::Null));
    }

    #[test]
    fn integral_json_numbers_stay_integers() {
        let value = StateValue::from_json_str("42").unwrap_or(StateValue::Bool(false));
        assert_eq!(value, StateValue::Int(42));
        let value = StateValue::from_json_str("42.5").unwrap_or(StateValue::Bool(false));
        assert_eq!(value, StateValue::Float(42.5));
    }

    #[test]
    fn integers_beyond_i64_are_rejected() {
        let result = StateValue::from_json_str("9223372036854775808");
        assert_eq!(result, Err(ValueError::IntegerRange("9223372036854775808".to_string())));
        let value = StateValue::from_json_str("9223372036854775807").unwrap_or(StateValue::Bool(false));
        assert_eq!(value, StateValue::Int(i64::MAX));
    }

    #[test]
    fn nan_cannot_be_encoded() {
        assert_eq!(StateValue::Float(f64::NAN).to_json(), Err(ValueError::NonFinite));
    }
}

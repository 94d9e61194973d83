use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

/// Distinguishes a field that was left out of a PATCH body from one that was
/// explicitly set to `null`.
#[derive(Debug, Clone, PartialEq)]
pub enum NullableValue<T> {
    Omitted,
    Null,
    Value(T),
}

impl<T> NullableValue<T> {
    pub fn is_omitted(&self) -> bool {
        matches!(self, NullableValue::Omitted)
    }

    /// `None` when omitted, otherwise the new (possibly null) value.
    pub fn into_update(self) -> Option<Option<T>> {
        match self {
            NullableValue::Omitted => None,
            NullableValue::Null => Some(None),
            NullableValue::Value(value) => Some(Some(value)),
        }
    }
}

pub fn classify_nullable<T: DeserializeOwned>(
    optional_value: Option<&Value>,
) -> Result<NullableValue<T>, String> {
    match optional_value {
        None => Ok(NullableValue::Omitted),
        Some(Value::Null) => Ok(NullableValue::Null),
        Some(other) => serde_json::from_value(other.clone())
            .map(NullableValue::Value)
            .map_err(|err| format!("unexpected value {other}: {err}")),
    }
}

pub fn nullable_field<T: DeserializeOwned>(
    body: &Map<String, Value>,
    field: &str,
) -> Result<NullableValue<T>, String> {
    classify_nullable(body.get(field)).map_err(|err| format!("{field}: {err}"))
}

// Decoding of transport payloads into validated domain lists
use crate::application::transport::TransportError;
use crate::domain::device::Validate;
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Decode a JSON array into validated entries.
///
/// An empty result decodes to an empty list. Entries that fail to deserialize
/// or validate are dropped with a warning; a non-array payload is an error.
pub fn decode_list<T>(payload: Option<Value>, what: &str) -> Result<Vec<T>, TransportError>
where
    T: DeserializeOwned + Validate,
{
    let items = match payload {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(Value::Array(items)) => items,
        Some(other) => {
            return Err(TransportError::Payload(format!(
                "expected a list of {}, got {}",
                what,
                kind_of(&other)
            )));
        }
    };

    let total = items.len();
    let decoded: Vec<T> = items
        .into_iter()
        .filter_map(|item| match serde_json::from_value::<T>(item) {
            Ok(entry) => entry.validate(),
            Err(e) => {
                tracing::debug!("Dropping malformed {} entry: {}", what, e);
                None
            }
        })
        .collect();

    if decoded.len() < total {
        tracing::warn!("Dropped {} of {} {} entries", total - decoded.len(), total, what);
    }

    Ok(decoded)
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

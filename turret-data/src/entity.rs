use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::DataError;

/// An entity as the data layer sees it: a flat field map.
///
/// Rows returned by a session and entities staged on a repository share this
/// representation; typed domain structs go through [`to_record`] and
/// [`from_record`].
pub type Record = Map<String, Value>;

/// Field consulted by `Repository::find` and by adapters addressing a row.
pub const ID_FIELD: &str = "id";

/// Serialize a typed entity into a record.
///
/// Fails when `T` does not serialize to a JSON object.
pub fn to_record<T: Serialize>(entity: &T) -> Result<Record, DataError> {
    match serde_json::to_value(entity)? {
        Value::Object(map) => Ok(map),
        other => Err(DataError::Other(format!(
            "entity must serialize to an object, got {}",
            type_name(&other)
        ))),
    }
}

/// Deserialize a record into a typed entity.
pub fn from_record<T: DeserializeOwned>(record: Record) -> Result<T, DataError> {
    Ok(serde_json::from_value(Value::Object(record))?)
}

/// Shallow merge: every field of `values` overwrites the same field of `base`.
pub fn merge(mut base: Record, values: Record) -> Record {
    for (key, value) in values {
        base.insert(key, value);
    }
    base
}

/// Build a record from a `json!` literal, ignoring non-object values.
pub fn record(value: Value) -> Record {
    match value {
        Value::Object(map) => map,
        _ => Record::new(),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct User {
        id: i64,
        name: String,
    }

    #[test]
    fn test_typed_conversion() {
        let user = User {
            id: 1,
            name: "alice".into(),
        };
        let rec = to_record(&user).unwrap();
        assert_eq!(rec["name"], json!("alice"));
        assert_eq!(from_record::<User>(rec).unwrap(), user);
    }

    #[test]
    fn test_scalar_is_rejected() {
        let err = to_record(&42).unwrap_err();
        assert!(err.to_string().contains("number"));
    }

    #[test]
    fn test_merge_is_shallow() {
        let base = record(json!({"role": "user", "meta": {"a": 1}}));
        let merged = merge(base, record(json!({"meta": {"b": 2}, "name": "bob"})));
        assert_eq!(merged["role"], json!("user"));
        assert_eq!(merged["meta"], json!({"b": 2}));
        assert_eq!(merged["name"], json!("bob"));
    }
}

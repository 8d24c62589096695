use std::collections::HashMap;

use super::ConfigError;

/// A single entity option value, as read from YAML or set in code.
#[derive(Debug, Clone, PartialEq)]
pub enum OptionValue {
    String(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
    Null,
    List(Vec<OptionValue>),
    Map(HashMap<String, OptionValue>),
}

impl OptionValue {
    pub(crate) fn from_yaml(value: &serde_yaml::Value) -> Self {
        match value {
            serde_yaml::Value::Bool(b) => OptionValue::Bool(*b),
            serde_yaml::Value::Number(n) => match (n.as_i64(), n.as_f64()) {
                (Some(i), _) => OptionValue::Integer(i),
                (None, Some(f)) => OptionValue::Float(f),
                _ => OptionValue::String(n.to_string()),
            },
            serde_yaml::Value::String(s) => OptionValue::String(s.clone()),
            serde_yaml::Value::Null => OptionValue::Null,
            serde_yaml::Value::Sequence(seq) => {
                OptionValue::List(seq.iter().map(OptionValue::from_yaml).collect())
            }
            serde_yaml::Value::Mapping(map) => OptionValue::Map(
                map.iter()
                    .map(|(k, v)| (yaml_key(k), OptionValue::from_yaml(v)))
                    .collect(),
            ),
            serde_yaml::Value::Tagged(tagged) => OptionValue::from_yaml(&tagged.value),
        }
    }

    /// Convert into a JSON value, e.g. to hand options to a JSON-speaking backend.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            OptionValue::String(s) => serde_json::Value::String(s.clone()),
            OptionValue::Integer(i) => serde_json::Value::from(*i),
            OptionValue::Float(f) => serde_json::Value::from(*f),
            OptionValue::Bool(b) => serde_json::Value::Bool(*b),
            OptionValue::Null => serde_json::Value::Null,
            OptionValue::List(items) => {
                serde_json::Value::Array(items.iter().map(OptionValue::to_json).collect())
            }
            OptionValue::Map(map) => serde_json::Value::Object(
                map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            OptionValue::String(_) => "string",
            OptionValue::Integer(_) => "integer",
            OptionValue::Float(_) => "float",
            OptionValue::Bool(_) => "bool",
            OptionValue::Null => "null",
            OptionValue::List(_) => "list",
            OptionValue::Map(_) => "map",
        }
    }
}

pub(crate) fn yaml_key(key: &serde_yaml::Value) -> String {
    match key {
        serde_yaml::Value::String(s) => s.clone(),
        other => format!("{other:?}"),
    }
}

impl From<&str> for OptionValue {
    fn from(value: &str) -> Self {
        OptionValue::String(value.to_string())
    }
}

impl From<String> for OptionValue {
    fn from(value: String) -> Self {
        OptionValue::String(value)
    }
}

impl From<i64> for OptionValue {
    fn from(value: i64) -> Self {
        OptionValue::Integer(value)
    }
}

impl From<f64> for OptionValue {
    fn from(value: f64) -> Self {
        OptionValue::Float(value)
    }
}

impl From<bool> for OptionValue {
    fn from(value: bool) -> Self {
        OptionValue::Bool(value)
    }
}

impl<T: Into<OptionValue>> From<Vec<T>> for OptionValue {
    fn from(values: Vec<T>) -> Self {
        OptionValue::List(values.into_iter().map(Into::into).collect())
    }
}

/// Trait for converting an `OptionValue` into a concrete type.
#[diagnostic::on_unimplemented(
    message = "`{Self}` cannot be read from entity options",
    label = "not a valid option value type",
    note = "built-in types: String, i64, f64, bool, Option<T>, Vec<T>, HashMap<String, T>"
)]
pub trait FromOptionValue: Sized {
    fn from_option_value(value: &OptionValue, key: &str) -> Result<Self, ConfigError>;
}

fn mismatch(key: &str, expected: &'static str) -> ConfigError {
    ConfigError::TypeMismatch {
        key: key.to_string(),
        expected,
    }
}

impl FromOptionValue for OptionValue {
    fn from_option_value(value: &OptionValue, _key: &str) -> Result<Self, ConfigError> {
        Ok(value.clone())
    }
}

impl FromOptionValue for String {
    fn from_option_value(value: &OptionValue, key: &str) -> Result<Self, ConfigError> {
        match value {
            OptionValue::String(s) => Ok(s.clone()),
            OptionValue::Integer(i) => Ok(i.to_string()),
            OptionValue::Float(f) => Ok(f.to_string()),
            OptionValue::Bool(b) => Ok(b.to_string()),
            _ => Err(mismatch(key, "String")),
        }
    }
}

impl FromOptionValue for i64 {
    fn from_option_value(value: &OptionValue, key: &str) -> Result<Self, ConfigError> {
        match value {
            OptionValue::Integer(i) => Ok(*i),
            OptionValue::String(s) => s.parse().map_err(|_| mismatch(key, "i64")),
            _ => Err(mismatch(key, "i64")),
        }
    }
}

impl FromOptionValue for u64 {
    fn from_option_value(value: &OptionValue, key: &str) -> Result<Self, ConfigError> {
        let i = i64::from_option_value(value, key)?;
        u64::try_from(i).map_err(|_| mismatch(key, "u64"))
    }
}

impl FromOptionValue for usize {
    fn from_option_value(value: &OptionValue, key: &str) -> Result<Self, ConfigError> {
        let i = i64::from_option_value(value, key)?;
        usize::try_from(i).map_err(|_| mismatch(key, "usize"))
    }
}

impl FromOptionValue for f64 {
    fn from_option_value(value: &OptionValue, key: &str) -> Result<Self, ConfigError> {
        match value {
            OptionValue::Float(f) => Ok(*f),
            OptionValue::Integer(i) => Ok(*i as f64),
            OptionValue::String(s) => s.parse().map_err(|_| mismatch(key, "f64")),
            _ => Err(mismatch(key, "f64")),
        }
    }
}

impl FromOptionValue for bool {
    fn from_option_value(value: &OptionValue, key: &str) -> Result<Self, ConfigError> {
        match value {
            OptionValue::Bool(b) => Ok(*b),
            OptionValue::String(s) => match s.to_lowercase().as_str() {
                "true" | "1" | "yes" => Ok(true),
                "false" | "0" | "no" => Ok(false),
                _ => Err(mismatch(key, "bool")),
            },
            _ => Err(mismatch(key, "bool")),
        }
    }
}

impl<T: FromOptionValue> FromOptionValue for Option<T> {
    fn from_option_value(value: &OptionValue, key: &str) -> Result<Self, ConfigError> {
        match value {
            OptionValue::Null => Ok(None),
            v => T::from_option_value(v, key).map(Some),
        }
    }
}

impl<T: FromOptionValue> FromOptionValue for Vec<T> {
    fn from_option_value(value: &OptionValue, key: &str) -> Result<Self, ConfigError> {
        match value {
            OptionValue::List(items) => items
                .iter()
                .enumerate()
                .map(|(i, v)| T::from_option_value(v, &format!("{key}[{i}]")))
                .collect(),
            other => Ok(vec![T::from_option_value(other, key)?]),
        }
    }
}

impl<V: FromOptionValue> FromOptionValue for HashMap<String, V> {
    fn from_option_value(value: &OptionValue, key: &str) -> Result<Self, ConfigError> {
        match value {
            OptionValue::Map(map) => map
                .iter()
                .map(|(k, v)| Ok((k.clone(), V::from_option_value(v, &format!("{key}.{k}"))?)))
                .collect(),
            other => Err(ConfigError::TypeMismatch {
                key: format!("{key} ({})", other.kind()),
                expected: "HashMap<String, _>",
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_conversions() {
        assert_eq!(
            String::from_option_value(&OptionValue::Integer(7), "k").unwrap(),
            "7"
        );
        assert_eq!(
            i64::from_option_value(&OptionValue::String("42".into()), "k").unwrap(),
            42
        );
        assert!(bool::from_option_value(&OptionValue::String("yes".into()), "k").unwrap());
        assert_eq!(
            Option::<String>::from_option_value(&OptionValue::Null, "k").unwrap(),
            None
        );
    }

    #[test]
    fn test_negative_to_unsigned_is_mismatch() {
        let err = u64::from_option_value(&OptionValue::Integer(-1), "limit").unwrap_err();
        assert!(matches!(err, ConfigError::TypeMismatch { expected: "u64", .. }));
    }

    #[test]
    fn test_list_reports_indexed_key() {
        let value = OptionValue::List(vec![OptionValue::Integer(1), OptionValue::Null]);
        let err = Vec::<i64>::from_option_value(&value, "ids").unwrap_err();
        match err {
            ConfigError::TypeMismatch { key, .. } => assert_eq!(key, "ids[1]"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_to_json() {
        let value = OptionValue::from(vec!["a", "b"]);
        assert_eq!(value.to_json(), serde_json::json!(["a", "b"]));
    }
}

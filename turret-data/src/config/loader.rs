use std::collections::HashMap;
use std::path::Path;

use super::value::{yaml_key, OptionValue};
use super::{ConfigError, EntityOptions, EntityParameter};

/// Load entity parameters from a YAML file. A missing file is an error.
pub fn entities_from_yaml_file(
    path: impl AsRef<Path>,
) -> Result<HashMap<String, EntityParameter>, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::Load(format!("{}: {e}", path.display())))?;
    entities_from_yaml_str(&content)
}

/// Parse entity parameters from a YAML document.
///
/// ```yaml
/// entities:
///   user:
///     options:
///       table: users
///       id: user_id
///   tag: ~
/// ```
///
/// The top-level `entities` key is optional. Factories cannot be expressed in
/// YAML; attach them afterwards with [`EntityParameter::with_entity_factory`]
/// or [`EntityParameter::with_repository_factory`].
pub fn entities_from_yaml_str(
    content: &str,
) -> Result<HashMap<String, EntityParameter>, ConfigError> {
    let yaml: serde_yaml::Value =
        serde_yaml::from_str(content).map_err(|e| ConfigError::Load(e.to_string()))?;

    let root = match &yaml {
        serde_yaml::Value::Mapping(map) => map.get("entities").unwrap_or(&yaml),
        serde_yaml::Value::Null => return Ok(HashMap::new()),
        _ => return Err(ConfigError::Load("expected a mapping of entities".into())),
    };

    let serde_yaml::Value::Mapping(entities) = root else {
        return Err(ConfigError::Load("`entities` must be a mapping".into()));
    };

    let mut out = HashMap::with_capacity(entities.len());
    for (key, body) in entities {
        let name = yaml_key(key);
        let options = parse_options(&name, body)?;
        out.insert(name, EntityParameter::new(options));
    }
    Ok(out)
}

fn parse_options(name: &str, body: &serde_yaml::Value) -> Result<EntityOptions, ConfigError> {
    let options = match body {
        serde_yaml::Value::Null => return Ok(EntityOptions::new()),
        serde_yaml::Value::Mapping(map) => match map.get("options") {
            Some(options) => options,
            None => return Ok(EntityOptions::new()),
        },
        _ => {
            return Err(ConfigError::Load(format!(
                "entity \"{name}\" must be a mapping"
            )))
        }
    };

    match OptionValue::from_yaml(options) {
        OptionValue::Map(values) => Ok(EntityOptions::from(values)),
        OptionValue::Null => Ok(EntityOptions::new()),
        _ => Err(ConfigError::Load(format!(
            "options of entity \"{name}\" must be a mapping"
        ))),
    }
}

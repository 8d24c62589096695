use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;

use crate::adapter::Adapter;
use crate::config::{entities_from_yaml_str, ConfigError, Configuration, EntityParameter};
use crate::controller::Controller;

/// Registry of named controller configurations.
///
/// `Turret` is `Clone` and cheap to share: every clone sees the same
/// configurations. Reconfiguring a name replaces its configuration for every
/// controller created from it, on their next lookup.
///
/// # Example
///
/// ```ignore
/// let turret = Turret::new();
/// turret.configure("main", adapter, HashMap::from([
///     ("user".to_string(), EntityParameter::new(EntityOptions::new().with("table", "users"))),
/// ]));
///
/// let controller = turret.create_controller("main")?;
/// controller.start_session(|uow| async move {
///     uow.get_repository("user")?.add(record(json!({"name": "alice"})))?;
///     Ok::<_, DataError>(())
/// }).await?;
/// ```
#[derive(Clone, Default)]
pub struct Turret {
    configurations: Arc<DashMap<String, Arc<Configuration>>>,
}

impl Turret {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the configuration called `name`.
    pub fn configure(
        &self,
        name: impl Into<String>,
        adapter: Arc<dyn Adapter>,
        entities: HashMap<String, EntityParameter>,
    ) -> &Self {
        let name = name.into();
        tracing::debug!(configuration = %name, entities = entities.len(), "Registering configuration");
        self.configurations
            .insert(name, Arc::new(Configuration::new(adapter, entities)));
        self
    }

    /// Register a configuration whose entities are read from YAML.
    pub fn configure_yaml(
        &self,
        name: impl Into<String>,
        adapter: Arc<dyn Adapter>,
        yaml: &str,
    ) -> Result<&Self, ConfigError> {
        let entities = entities_from_yaml_str(yaml)?;
        Ok(self.configure(name, adapter, entities))
    }

    pub fn configuration(&self, name: &str) -> Result<Arc<Configuration>, ConfigError> {
        self.configurations
            .get(name)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| ConfigError::UnknownConfiguration(name.to_string()))
    }

    /// Create a top-level controller; fails fast on an unknown name.
    pub fn create_controller(&self, name: &str) -> Result<Controller, ConfigError> {
        self.configuration(name)?;
        Ok(Controller::new(self.clone(), name.to_string()))
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .configurations
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        names.sort();
        names
    }
}

impl std::fmt::Debug for Turret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Turret")
            .field("configurations", &self.names())
            .finish()
    }
}

//! Controller configurations: the adapter plus per-entity parameters.
//!
//! A [`Configuration`] is registered under a name in a [`Turret`](crate::Turret)
//! and looked up by every controller created for that name. Entity parameters
//! carry the adapter-specific [`EntityOptions`] (table, id column, ...) and,
//! optionally, a [`RepositoryFactory`] and an [`EntityFactory`].

mod loader;
pub mod value;

use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use dashmap::DashMap;

use crate::adapter::Adapter;
use crate::entity::Record;
use crate::repository::Repository;

pub use loader::{entities_from_yaml_file, entities_from_yaml_str};
pub use value::{FromOptionValue, OptionValue};

/// Error type for configuration lookups.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// No configuration registered under this controller name.
    UnknownConfiguration(String),
    /// No entity registered under this name in the configuration.
    UnknownEntity(String),
    /// A required entity option is missing.
    MissingOption(String),
    /// An option could not be converted to the requested type.
    TypeMismatch { key: String, expected: &'static str },
    /// An I/O or YAML parsing error occurred while loading entities.
    Load(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::UnknownConfiguration(name) => {
                write!(f, "Unknown controller configuration \"{name}\"")
            }
            ConfigError::UnknownEntity(name) => write!(f, "Unknown entity \"{name}\""),
            ConfigError::MissingOption(key) => write!(f, "Missing entity option '{key}'"),
            ConfigError::TypeMismatch { key, expected } => {
                write!(f, "Option type mismatch for '{key}': expected {expected}")
            }
            ConfigError::Load(msg) => write!(f, "Entity config load error: {msg}"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Adapter-specific options of one entity (table name, id column, ...).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntityOptions {
    values: HashMap<String, OptionValue>,
}

impl EntityOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<OptionValue>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<OptionValue>) {
        self.values.insert(key.into(), value.into());
    }

    /// Get a typed option. An absent key converts like `null`, so only
    /// `Option<T>` targets accept it.
    pub fn get<T: FromOptionValue>(&self, key: &str) -> Result<T, ConfigError> {
        match self.values.get(key) {
            Some(value) => T::from_option_value(value, key),
            None => T::from_option_value(&OptionValue::Null, key),
        }
    }

    /// Get a typed option, `None` when absent.
    pub fn get_opt<T: FromOptionValue>(&self, key: &str) -> Result<Option<T>, ConfigError> {
        self.values
            .get(key)
            .map(|value| T::from_option_value(value, key))
            .transpose()
    }

    /// Get a typed option that must be present.
    pub fn require<T: FromOptionValue>(&self, key: &str) -> Result<T, ConfigError> {
        self.get_opt(key)?
            .ok_or_else(|| ConfigError::MissingOption(key.to_string()))
    }

    /// Get a typed option or `default` when absent or unconvertible.
    pub fn get_or<T: FromOptionValue>(&self, key: &str, default: T) -> T {
        self.get_opt(key).ok().flatten().unwrap_or(default)
    }

    pub fn raw(&self, key: &str) -> Option<&OptionValue> {
        self.values.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &OptionValue)> {
        self.values.iter()
    }
}

impl From<HashMap<String, OptionValue>> for EntityOptions {
    fn from(values: HashMap<String, OptionValue>) -> Self {
        Self { values }
    }
}

/// Builds an application repository type around the default [`Repository`].
///
/// Any `Fn(Repository) -> R` closure is a factory; the produced value is
/// recovered by [`Controller::get_custom_repository`](crate::Controller::get_custom_repository).
pub trait RepositoryFactory: Send + Sync + 'static {
    fn create(&self, base: Repository) -> Box<dyn Any + Send>;
}

impl<F, R> RepositoryFactory for F
where
    F: Fn(Repository) -> R + Send + Sync + 'static,
    R: Send + 'static,
{
    fn create(&self, base: Repository) -> Box<dyn Any + Send> {
        Box::new(self(base))
    }
}

/// Produces the default record an entity's raw values are merged onto.
pub trait EntityFactory: Send + Sync + 'static {
    fn create(&self) -> Record;
}

impl<F> EntityFactory for F
where
    F: Fn() -> Record + Send + Sync + 'static,
{
    fn create(&self) -> Record {
        self()
    }
}

/// Everything registered for one entity name.
#[derive(Clone, Default)]
pub struct EntityParameter {
    repository: Option<Arc<dyn RepositoryFactory>>,
    entity: Option<Arc<dyn EntityFactory>>,
    options: EntityOptions,
}

impl EntityParameter {
    pub fn new(options: EntityOptions) -> Self {
        Self {
            repository: None,
            entity: None,
            options,
        }
    }

    pub fn with_repository_factory(mut self, factory: impl RepositoryFactory) -> Self {
        self.repository = Some(Arc::new(factory));
        self
    }

    pub fn with_entity_factory(mut self, factory: impl EntityFactory) -> Self {
        self.entity = Some(Arc::new(factory));
        self
    }

    pub fn options(&self) -> &EntityOptions {
        &self.options
    }

    pub fn repository_factory(&self) -> Option<&Arc<dyn RepositoryFactory>> {
        self.repository.as_ref()
    }

    pub fn entity_factory(&self) -> Option<&Arc<dyn EntityFactory>> {
        self.entity.as_ref()
    }
}

impl std::fmt::Debug for EntityParameter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityParameter")
            .field("repository", &self.repository.is_some())
            .field("entity", &self.entity.is_some())
            .field("options", &self.options)
            .finish()
    }
}

/// The adapter and entity table of one controller configuration.
pub struct Configuration {
    adapter: RwLock<Arc<dyn Adapter>>,
    entities: DashMap<String, EntityParameter>,
}

impl Configuration {
    pub fn new(adapter: Arc<dyn Adapter>, entities: HashMap<String, EntityParameter>) -> Self {
        Self {
            adapter: RwLock::new(adapter),
            entities: entities.into_iter().collect(),
        }
    }

    pub fn adapter(&self) -> Arc<dyn Adapter> {
        self.adapter
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn set_adapter(&self, adapter: Arc<dyn Adapter>) -> &Self {
        *self.adapter.write().unwrap_or_else(PoisonError::into_inner) = adapter;
        self
    }

    /// Look up an entity's parameter; unknown names are a programmer error.
    pub fn entity_parameter(&self, name: &str) -> Result<EntityParameter, ConfigError> {
        self.entities
            .get(name)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| ConfigError::UnknownEntity(name.to_string()))
    }

    pub fn set_entity_parameter(&self, name: impl Into<String>, parameter: EntityParameter) -> &Self {
        self.entities.insert(name.into(), parameter);
        self
    }

    pub fn entity_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entities.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }
}

impl std::fmt::Debug for Configuration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Configuration")
            .field("entities", &self.entity_names())
            .finish_non_exhaustive()
    }
}

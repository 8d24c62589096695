//! The storage boundary: [`Adapter`] translates logical intents into backend
//! [`Parameter`]s and opens [`Session`]s that execute them.
//!
//! Both traits are object safe so a configuration can hold any backend as
//! `Arc<dyn Adapter>`. Every session method is an await point; callers never
//! assume synchronous completion.

use async_trait::async_trait;
use serde_json::Value;

use crate::config::EntityOptions;
use crate::entity::Record;
use crate::error::DataError;
use crate::query::SelectQuery;

/// An adapter-specific statement with positional bind values.
///
/// SQL adapters put SQL text in `statement`; other backends may use any
/// encoding they like, the data layer never looks inside.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub statement: String,
    pub binds: Vec<Value>,
}

impl Parameter {
    pub fn new(statement: impl Into<String>, binds: Vec<Value>) -> Self {
        Self {
            statement: statement.into(),
            binds,
        }
    }
}

/// A transactional handle to one backend connection.
///
/// Methods take `&self`: a session is shared between a unit of work and the
/// repositories that borrow it, so implementations keep their connection
/// behind interior mutability.
#[async_trait]
pub trait Session: Send + Sync {
    async fn begin(&self) -> Result<(), DataError>;

    async fn execute(&self, parameter: &Parameter) -> Result<(), DataError>;

    async fn find(&self, parameter: &Parameter) -> Result<Vec<Record>, DataError>;

    async fn commit(&self) -> Result<(), DataError>;

    async fn rollback(&self) -> Result<(), DataError>;

    /// Give the underlying connection back. No other method is called afterwards.
    async fn end(&self) -> Result<(), DataError>;
}

/// Pluggable backend: parameter translation plus session factory.
#[async_trait]
pub trait Adapter: Send + Sync + 'static {
    async fn create_session(&self) -> Result<Box<dyn Session>, DataError>;

    fn create_select_parameter(
        &self,
        options: &EntityOptions,
        select: &SelectQuery,
    ) -> Result<Parameter, DataError>;

    fn create_persistence_parameter(
        &self,
        options: &EntityOptions,
        entity: &Record,
    ) -> Result<Parameter, DataError>;

    fn create_remove_parameter(
        &self,
        options: &EntityOptions,
        entity: &Record,
    ) -> Result<Parameter, DataError>;
}

use async_trait::async_trait;
use serde_json::Value;
use sqlx::sqlite::SqlitePool;
use turret_data::{
    Adapter, DataError, Dialect, EntityOptions, IdentifierPolicy, Parameter, QueryBuilder,
    Record, SelectQuery, Session, ID_FIELD,
};

use crate::error::SqlxErrorExt;
use crate::session::SqlxSession;

/// [`Adapter`] over a SQLite connection pool.
///
/// Entity options:
///
/// | key | meaning | default |
/// |-----|---------|---------|
/// | `table` | table name | required |
/// | `id` | primary key column | `id` |
///
/// Persisting an entity that carries an id upserts on the id column, which
/// must be the primary key or carry a unique index. Entities without an id
/// are inserted. Removal deletes by id.
#[derive(Clone, Debug)]
pub struct SqlxAdapter {
    pool: SqlitePool,
    identifier_policy: IdentifierPolicy,
}

impl SqlxAdapter {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            identifier_policy: IdentifierPolicy::Quote,
        }
    }

    /// Connect a pool to `url` (e.g. `sqlite://app.db?mode=rwc`).
    pub async fn connect(url: &str) -> Result<Self, DataError> {
        let pool = SqlitePool::connect(url)
            .await
            .map_err(SqlxErrorExt::into_data_error)?;
        Ok(Self::new(pool))
    }

    pub fn with_identifier_policy(mut self, policy: IdentifierPolicy) -> Self {
        self.identifier_policy = policy;
        self
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    fn builder(&self, builder: QueryBuilder) -> QueryBuilder {
        builder
            .dialect(Dialect::Sqlite)
            .identifier_policy(self.identifier_policy)
    }
}

fn table(options: &EntityOptions) -> Result<String, DataError> {
    Ok(options.require::<String>("table")?)
}

fn id_column(options: &EntityOptions) -> Result<String, DataError> {
    Ok(options
        .get_opt::<String>("id")?
        .unwrap_or_else(|| ID_FIELD.to_string()))
}

fn identity<'a>(entity: &'a Record, column: &str) -> Option<&'a Value> {
    entity.get(column).filter(|id| !id.is_null())
}

#[async_trait]
impl Adapter for SqlxAdapter {
    async fn create_session(&self) -> Result<Box<dyn Session>, DataError> {
        tracing::debug!(
            idle = self.pool.num_idle(),
            size = self.pool.size(),
            "Opening SQLite session"
        );
        Ok(Box::new(SqlxSession::new(self.pool.clone())))
    }

    fn create_select_parameter(
        &self,
        options: &EntityOptions,
        select: &SelectQuery,
    ) -> Result<Parameter, DataError> {
        let table = table(options)?;
        Ok(self
            .builder(QueryBuilder::from_select(&table, select))
            .build_select()?)
    }

    fn create_persistence_parameter(
        &self,
        options: &EntityOptions,
        entity: &Record,
    ) -> Result<Parameter, DataError> {
        let table = table(options)?;
        let id = id_column(options)?;
        let builder = self.builder(QueryBuilder::new(&table));
        Ok(match identity(entity, &id) {
            Some(_) => builder.build_upsert(entity, &id)?,
            None => builder.build_insert(entity)?,
        })
    }

    fn create_remove_parameter(
        &self,
        options: &EntityOptions,
        entity: &Record,
    ) -> Result<Parameter, DataError> {
        let table = table(options)?;
        let id = id_column(options)?;
        let value = identity(entity, &id).ok_or_else(|| {
            DataError::parameter(format!("cannot remove a {table} row without '{id}'"))
        })?;
        Ok(self
            .builder(QueryBuilder::new(&table))
            .where_eq(&id, value.clone())
            .build_delete()?)
    }
}

//! Unit-of-work and repository data layer over pluggable storage adapters.
//!
//! - [`Turret`] registers named [`Configuration`]s (adapter + entities).
//! - [`Controller`] hands out [`Repository`]s, tracks staged changes and
//!   runs transactional units of work via [`Controller::start_session`].
//! - [`Adapter`] / [`Session`] are the storage boundary.

pub mod adapter;
pub mod config;
pub mod controller;
pub mod entity;
pub mod error;
pub mod query;
pub mod repository;
pub mod session;
pub mod turret;

pub use adapter::{Adapter, Parameter, Session};
pub use config::{
    entities_from_yaml_file, entities_from_yaml_str, ConfigError, Configuration, EntityFactory,
    EntityOptions, EntityParameter, FromOptionValue, OptionValue, RepositoryFactory,
};
pub use controller::Controller;
pub use entity::{from_record, merge, record, to_record, Record, ID_FIELD};
pub use error::{DataError, DataResult};
pub use query::{Dialect, Direction, IdentifierPolicy, QueryBuilder, QueryError, SelectQuery};
pub use repository::Repository;
pub use session::SessionLease;
pub use turret::Turret;

pub mod prelude {
    //! Re-exports of the most commonly used data types.
    pub use crate::{
        record, Adapter, Controller, DataError, Direction, EntityOptions, EntityParameter,
        Record, Repository, SelectQuery, Session, Turret,
    };
}

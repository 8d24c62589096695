//! # turret-data-sqlx
//!
//! [SQLx](https://github.com/launchbadge/sqlx) SQLite backend for the Turret
//! data layer.
//!
//! | Type | Description |
//! |------|-------------|
//! | [`SqlxAdapter`] | [`Adapter`](turret_data::Adapter) over a `SqlitePool`, building SQL with [`QueryBuilder`](turret_data::QueryBuilder) |
//! | [`SqlxSession`] | Autocommit on a pooled connection, or one `sqlx::Transaction` |
//! | [`SqlxErrorExt`] | Converts `sqlx::Error` into `DataError` (`.into_data_error()`) |
//!
//! # Quick start
//!
//! ```ignore
//! use turret_data::prelude::*;
//! use turret_data_sqlx::SqlxAdapter;
//!
//! let adapter = SqlxAdapter::connect("sqlite://app.db?mode=rwc").await?;
//! let turret = Turret::new();
//! turret.configure_yaml("main", Arc::new(adapter), r#"
//! entities:
//!   user:
//!     options:
//!       table: users
//! "#)?;
//!
//! let controller = turret.create_controller("main")?;
//! controller.start_session(|uow| async move {
//!     uow.get_repository("user")?.add(record(json!({"name": "alice"})))?;
//!     Ok::<_, DataError>(())
//! }).await?;
//! ```
//!
//! Rows come back as JSON records: `INTEGER` as numbers, `REAL` as floats,
//! `TEXT` as strings, `BLOB` as byte arrays and `NULL` as `null`.

mod codec;
pub mod adapter;
pub mod error;
pub mod session;

pub use adapter::SqlxAdapter;
pub use error::{SqlxErrorExt, SqlxResult};
pub use session::SqlxSession;

/// Re-exports of the most commonly used types from both `turret-data` and this crate.
pub mod prelude {
    pub use crate::{SqlxAdapter, SqlxErrorExt};
    pub use turret_data::prelude::*;
}

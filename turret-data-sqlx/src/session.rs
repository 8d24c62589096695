use async_trait::async_trait;
use sqlx::pool::PoolConnection;
use sqlx::sqlite::{Sqlite, SqliteConnection, SqlitePool};
use sqlx::Transaction;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use turret_data::{DataError, Parameter, Record, Session};

use crate::codec::{bind_all, decode_row};
use crate::error::SqlxErrorExt;

enum State {
    /// Autocommit. The connection is taken from the pool on first use.
    Idle(Option<PoolConnection<Sqlite>>),
    Transaction(Transaction<'static, Sqlite>),
    Ended,
}

/// A SQLite session over a connection pool.
///
/// Outside a transaction statements autocommit on one pooled connection.
/// [`Session::begin`] opens a [`sqlx::Transaction`]; dropping the session
/// while it is open rolls it back before the connection returns to the pool.
pub struct SqlxSession {
    pool: SqlitePool,
    state: Mutex<State>,
}

impl SqlxSession {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            state: Mutex::new(State::Idle(None)),
        }
    }

    /// `true` while a transaction is open.
    pub async fn in_transaction(&self) -> bool {
        matches!(*self.state.lock().await, State::Transaction(_))
    }

    async fn connection<'s>(
        &self,
        state: &'s mut State,
    ) -> Result<&'s mut SqliteConnection, DataError> {
        match state {
            State::Transaction(tx) => Ok(&mut **tx),
            State::Idle(slot) => {
                if slot.is_none() {
                    let conn = self
                        .pool
                        .acquire()
                        .await
                        .map_err(SqlxErrorExt::into_data_error)?;
                    *slot = Some(conn);
                }
                let conn = slot.as_mut().ok_or_else(ended)?;
                Ok(&mut **conn)
            }
            State::Ended => Err(ended()),
        }
    }

    async fn take_transaction(&self) -> Result<Transaction<'static, Sqlite>, DataError> {
        let mut state = self.state.lock().await;
        match std::mem::replace(&mut *state, State::Idle(None)) {
            State::Transaction(tx) => Ok(tx),
            other => {
                *state = other;
                Err(DataError::Other("no open transaction".into()))
            }
        }
    }
}

fn ended() -> DataError {
    DataError::Other("SQL session has ended".into())
}

#[async_trait]
impl Session for SqlxSession {
    async fn begin(&self) -> Result<(), DataError> {
        let mut state = self.state.lock().await;
        match &*state {
            State::Idle(_) => {}
            State::Transaction(_) => {
                return Err(DataError::Other("transaction already open".into()))
            }
            State::Ended => return Err(ended()),
        }
        // The autocommit connection goes back first so a pool of one can lend it.
        *state = State::Idle(None);
        let tx = self
            .pool
            .begin()
            .await
            .map_err(SqlxErrorExt::into_data_error)?;
        *state = State::Transaction(tx);
        Ok(())
    }

    async fn execute(&self, parameter: &Parameter) -> Result<(), DataError> {
        let query = bind_all(sqlx::query(&parameter.statement), &parameter.binds)?;
        let mut state = self.state.lock().await;
        let conn = self.connection(&mut *state).await?;
        let result = query
            .execute(conn)
            .await
            .map_err(SqlxErrorExt::into_data_error)?;
        debug!(sql = %parameter.statement, rows = result.rows_affected(), "Executed statement");
        Ok(())
    }

    async fn find(&self, parameter: &Parameter) -> Result<Vec<Record>, DataError> {
        let query = bind_all(sqlx::query(&parameter.statement), &parameter.binds)?;
        let mut state = self.state.lock().await;
        let conn = self.connection(&mut *state).await?;
        let rows = query
            .fetch_all(conn)
            .await
            .map_err(SqlxErrorExt::into_data_error)?;
        rows.iter().map(decode_row).collect()
    }

    async fn commit(&self) -> Result<(), DataError> {
        self.take_transaction()
            .await?
            .commit()
            .await
            .map_err(SqlxErrorExt::into_data_error)
    }

    async fn rollback(&self) -> Result<(), DataError> {
        self.take_transaction()
            .await?
            .rollback()
            .await
            .map_err(SqlxErrorExt::into_data_error)
    }

    async fn end(&self) -> Result<(), DataError> {
        let mut state = self.state.lock().await;
        if let State::Transaction(tx) = std::mem::replace(&mut *state, State::Ended) {
            if let Err(err) = tx.rollback().await {
                warn!(error = %err, "Rollback of abandoned transaction failed");
            }
        }
        Ok(())
    }
}

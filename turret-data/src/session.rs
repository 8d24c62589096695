//! Session leases: who is responsible for ending a session.
//!
//! [`Controller::acquire`](crate::Controller::acquire) hands out a
//! [`SessionLease`]:
//!
//! - `Owned`: a fresh session created for this one operation. Releasing it
//!   ends the session.
//! - `Borrowed`: the transaction session of an active unit of work.
//!   Releasing it is a no-op; the unit of work ends it after commit or
//!   rollback.
//!
//! Callers always release, whatever the variant, so the same code path works
//! inside and outside a transaction.

use std::ops::Deref;
use std::sync::Arc;

use crate::adapter::Session;
use crate::error::DataError;

pub enum SessionLease {
    Owned(Arc<dyn Session>),
    Borrowed(Arc<dyn Session>),
}

impl SessionLease {
    pub(crate) fn owned(session: Box<dyn Session>) -> Self {
        SessionLease::Owned(Arc::from(session))
    }

    pub fn is_owned(&self) -> bool {
        matches!(self, SessionLease::Owned(_))
    }

    /// A shared handle to the leased session.
    pub fn shared(&self) -> Arc<dyn Session> {
        match self {
            SessionLease::Owned(session) | SessionLease::Borrowed(session) => session.clone(),
        }
    }

    /// End an owned session; borrowed sessions are left to their owner.
    pub async fn release(self) -> Result<(), DataError> {
        match self {
            SessionLease::Owned(session) => session.end().await,
            SessionLease::Borrowed(_) => Ok(()),
        }
    }
}

impl Deref for SessionLease {
    type Target = dyn Session;

    fn deref(&self) -> &Self::Target {
        match self {
            SessionLease::Owned(session) | SessionLease::Borrowed(session) => session.as_ref(),
        }
    }
}

impl std::fmt::Debug for SessionLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionLease::Owned(_) => f.write_str("SessionLease::Owned"),
            SessionLease::Borrowed(_) => f.write_str("SessionLease::Borrowed"),
        }
    }
}

/// Combine an operation's outcome with the outcome of releasing its session.
///
/// The operation's error wins; a release error is only surfaced when the
/// operation itself succeeded.
pub(crate) fn settle<T>(
    outcome: Result<T, DataError>,
    released: Result<(), DataError>,
    operation: &'static str,
) -> Result<T, DataError> {
    match (outcome, released) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(release_err)) => Err(release_err),
        (Err(err), Ok(())) => Err(err),
        (Err(err), Err(release_err)) => {
            tracing::warn!(
                operation,
                error = %release_err,
                "Session release failed after a failed operation"
            );
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::Parameter;
    use crate::entity::Record;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingSession {
        ends: AtomicUsize,
    }

    #[async_trait]
    impl Session for CountingSession {
        async fn begin(&self) -> Result<(), DataError> {
            Ok(())
        }
        async fn execute(&self, _parameter: &Parameter) -> Result<(), DataError> {
            Ok(())
        }
        async fn find(&self, _parameter: &Parameter) -> Result<Vec<Record>, DataError> {
            Ok(Vec::new())
        }
        async fn commit(&self) -> Result<(), DataError> {
            Ok(())
        }
        async fn rollback(&self) -> Result<(), DataError> {
            Ok(())
        }
        async fn end(&self) -> Result<(), DataError> {
            self.ends.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_release_ends_owned_session_only() {
        let session = Arc::new(CountingSession::default());

        let borrowed = SessionLease::Borrowed(session.clone());
        assert!(!borrowed.is_owned());
        borrowed.release().await.unwrap();
        assert_eq!(session.ends.load(Ordering::SeqCst), 0);

        let owned = SessionLease::Owned(session.clone());
        assert!(owned.is_owned());
        owned.release().await.unwrap();
        assert_eq!(session.ends.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_settle_prefers_primary_error() {
        let out: Result<(), _> = settle(
            Err(DataError::Other("primary".into())),
            Err(DataError::Other("release".into())),
            "test",
        );
        assert_eq!(out.unwrap_err().to_string(), "Data error: primary");
    }

    #[test]
    fn test_settle_reports_release_error_on_success() {
        let out = settle(Ok(1), Err(DataError::Other("release".into())), "test");
        assert_eq!(out.unwrap_err().to_string(), "Data error: release");
    }

    #[test]
    fn test_settle_ok() {
        assert_eq!(settle(Ok(3), Ok(()), "test").unwrap(), 3);
    }
}

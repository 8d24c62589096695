//! Unit-of-work coordination.
//!
//! A [`Controller`] hands out repositories, tracks which of them hold staged
//! changes, and applies those changes on [`Controller::flush`]. Wrapping the
//! work in [`Controller::start_session`] makes it transactional: the task runs
//! against a child controller bound to one session, and its staged changes
//! are flushed and committed only if the task succeeds.
//!
//! # Session ownership
//!
//! | Controller state | `acquire()` returns | `release()` does |
//! |------------------|---------------------|------------------|
//! | detached (top-level) | a new session, `Owned` | ends it |
//! | bound (inside `start_session`) | the transaction session, `Borrowed` | nothing |
//! | closed (unit of work finished) | `DataError::Closed` | n/a |

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, warn};

use crate::adapter::{Adapter, Session};
use crate::config::{ConfigError, Configuration};
use crate::entity::{merge, Record};
use crate::error::DataError;
use crate::repository::{Queue, Repository, Staging};
use crate::session::SessionLease;
use crate::turret::Turret;

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

enum SessionState {
    Detached,
    Bound(Arc<dyn Session>),
    Closed,
}

/// Staged queues of dirty repositories, in registration order.
///
/// Only the queues are tracked, never the repository handle, so the
/// repository's reference to its controller cannot form a cycle.
#[derive(Default)]
struct DirtySet {
    persist: Vec<Arc<Staging>>,
    remove: Vec<Arc<Staging>>,
}

impl DirtySet {
    fn queue(&mut self, queue: Queue) -> &mut Vec<Arc<Staging>> {
        match queue {
            Queue::Persist => &mut self.persist,
            Queue::Remove => &mut self.remove,
        }
    }
}

struct ControllerInner {
    turret: Turret,
    name: String,
    state: Mutex<SessionState>,
    dirty: Mutex<DirtySet>,
}

/// Unit-of-work coordinator for one named configuration.
///
/// `Controller` is a cheap handle: clones share dirty tracking and session
/// state. One controller serves one logical flow of work at a time.
#[derive(Clone)]
pub struct Controller {
    inner: Arc<ControllerInner>,
}

impl Controller {
    pub(crate) fn new(turret: Turret, name: String) -> Self {
        Self {
            inner: Arc::new(ControllerInner {
                turret,
                name,
                state: Mutex::new(SessionState::Detached),
                dirty: Mutex::new(DirtySet::default()),
            }),
        }
    }

    /// Name of the configuration this controller reads.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn turret(&self) -> &Turret {
        &self.inner.turret
    }

    pub fn configuration(&self) -> Result<Arc<Configuration>, ConfigError> {
        self.inner.turret.configuration(&self.inner.name)
    }

    pub fn adapter(&self) -> Result<Arc<dyn Adapter>, DataError> {
        Ok(self.configuration()?.adapter())
    }

    /// `true` while this controller runs inside a `start_session` unit of work.
    pub fn is_session_bound(&self) -> bool {
        matches!(*lock(&self.inner.state), SessionState::Bound(_))
    }

    pub fn is_closed(&self) -> bool {
        matches!(*lock(&self.inner.state), SessionState::Closed)
    }

    /// `true` if any repository of this controller still has staged changes.
    pub fn has_pending_changes(&self) -> bool {
        let dirty = lock(&self.inner.dirty);
        dirty
            .persist
            .iter()
            .chain(dirty.remove.iter())
            .any(|staging| staging.is_dirty())
    }

    // ── Repositories and entities ──────────────────────────────────────────

    /// A fresh repository for `name`, with empty queues.
    pub fn get_repository(&self, name: &str) -> Result<Repository, DataError> {
        let parameter = self.configuration()?.entity_parameter(name)?;
        Ok(Repository::new(self, name, parameter.options().clone()))
    }

    /// The application repository built by the entity's configured
    /// [`RepositoryFactory`](crate::RepositoryFactory).
    pub fn get_custom_repository<R: Send + 'static>(&self, name: &str) -> Result<R, DataError> {
        let parameter = self.configuration()?.entity_parameter(name)?;
        let factory = parameter.repository_factory().ok_or_else(|| {
            DataError::Repository(format!("entity \"{name}\" has no repository factory"))
        })?;
        let base = Repository::new(self, name, parameter.options().clone());
        factory
            .create(base)
            .downcast::<R>()
            .map(|repository| *repository)
            .map_err(|_| {
                DataError::Repository(format!(
                    "repository factory of \"{name}\" does not produce `{}`",
                    std::any::type_name::<R>()
                ))
            })
    }

    /// Build an entity from raw values.
    ///
    /// Without a configured entity factory the values are the entity; with
    /// one, they are shallow-merged over the factory's record.
    pub fn create_entity(&self, name: &str, values: Record) -> Result<Record, DataError> {
        let parameter = self.configuration()?.entity_parameter(name)?;
        Ok(match parameter.entity_factory() {
            Some(factory) => merge(factory.create(), values),
            None => values,
        })
    }

    // ── Sessions ───────────────────────────────────────────────────────────

    /// Get a session to run one operation on.
    pub async fn acquire(&self) -> Result<SessionLease, DataError> {
        if let Some(session) = self.current_session()? {
            return Ok(SessionLease::Borrowed(session));
        }
        let adapter = self.adapter()?;
        let session = adapter.create_session().await?;
        Ok(SessionLease::owned(session))
    }

    /// Give back a lease obtained from [`Controller::acquire`].
    pub async fn release(&self, lease: SessionLease) -> Result<(), DataError> {
        lease.release().await
    }

    fn current_session(&self) -> Result<Option<Arc<dyn Session>>, DataError> {
        match &*lock(&self.inner.state) {
            SessionState::Detached => Ok(None),
            SessionState::Bound(session) => Ok(Some(session.clone())),
            SessionState::Closed => Err(DataError::Closed),
        }
    }

    fn bind(&self, session: Arc<dyn Session>) {
        *lock(&self.inner.state) = SessionState::Bound(session);
    }

    fn close(&self) {
        *lock(&self.inner.state) = SessionState::Closed;
    }

    /// A controller for the same configuration with fresh state.
    fn child(&self) -> Controller {
        Controller::new(self.inner.turret.clone(), self.inner.name.clone())
    }

    // ── Dirty tracking ─────────────────────────────────────────────────────

    /// Track `repository` as holding staged persistence.
    ///
    /// Tracking is per repository instance: two repositories for the same
    /// entity are both flushed.
    pub fn mark_persist(&self, repository: &Repository) {
        self.mark(Queue::Persist, repository);
    }

    /// Track `repository` as holding staged removals.
    pub fn mark_remove(&self, repository: &Repository) {
        self.mark(Queue::Remove, repository);
    }

    fn mark(&self, queue: Queue, repository: &Repository) {
        let staging = repository.staging();
        let mut dirty = lock(&self.inner.dirty);
        let tracked = dirty.queue(queue);
        if !tracked.iter().any(|s| Arc::ptr_eq(s, staging)) {
            tracked.push(staging.clone());
        }
    }

    fn next_dirty(&self, queue: Queue) -> Option<Arc<Staging>> {
        lock(&self.inner.dirty).queue(queue).first().cloned()
    }

    fn unmark(&self, queue: Queue, staging: &Arc<Staging>) {
        lock(&self.inner.dirty)
            .queue(queue)
            .retain(|s| !Arc::ptr_eq(s, staging));
    }

    // ── Flush ──────────────────────────────────────────────────────────────

    /// Apply every staged change: all persistence first, then all removals.
    ///
    /// Runs on whatever session this controller provides, so outside
    /// `start_session` each change commits on its own. Stops at the first
    /// failing repository; it and every later one stay dirty.
    pub async fn flush(&self) -> Result<(), DataError> {
        let persisted = self.flush_queue(Queue::Persist).await?;
        let removed = self.flush_queue(Queue::Remove).await?;
        debug!(
            controller = %self.name(),
            persisted,
            removed,
            "Flushed staged changes"
        );
        Ok(())
    }

    async fn flush_queue(&self, queue: Queue) -> Result<usize, DataError> {
        let mut applied = 0;
        while let Some(staging) = self.next_dirty(queue) {
            applied += staging.apply(self, queue).await?;
            self.unmark(queue, &staging);
        }
        Ok(applied)
    }

    // ── Unit of work ───────────────────────────────────────────────────────

    /// Run `task` as one transaction.
    ///
    /// The task receives a child controller bound to a new session. When the
    /// task succeeds its staged changes are flushed and the transaction is
    /// committed; when the task or the flush fails, the transaction is rolled
    /// back and that error is returned. The child is closed afterwards.
    ///
    /// Called on a controller that is itself inside a unit of work, the
    /// nested task joins the enclosing transaction: its changes are flushed
    /// into the shared session and commit or rollback is left to the
    /// enclosing unit.
    ///
    /// ```ignore
    /// let id = controller.start_session(|uow| async move {
    ///     let users = uow.get_repository("user")?;
    ///     users.add(record(json!({"id": 1, "name": "alice"})))?;
    ///     Ok::<_, DataError>(1)
    /// }).await?;
    /// ```
    pub async fn start_session<F, Fut, T, E>(&self, task: F) -> Result<T, E>
    where
        F: FnOnce(Controller) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<DataError>,
    {
        if let Some(session) = self.current_session()? {
            return self.join_session(session, task).await;
        }

        let child = self.child();
        let lease = child.acquire().await?;
        if let Err(err) = lease.begin().await {
            if let Err(release_err) = lease.release().await {
                warn!(error = %release_err, "Session release failed after begin failure");
            }
            return Err(err.into());
        }
        debug!(controller = %self.name(), "Transaction started");

        child.bind(lease.shared());
        let outcome = match task(child.clone()).await {
            Ok(value) => child.flush().await.map(|()| value).map_err(E::from),
            Err(err) => Err(err),
        };

        match outcome {
            Ok(value) => {
                let committed = lease.commit().await;
                child.close();
                let released = lease.release().await;
                crate::session::settle(committed, released, "commit")?;
                debug!(controller = %self.name(), "Transaction committed");
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = lease.rollback().await {
                    warn!(
                        controller = %self.name(),
                        error = %rollback_err,
                        "Rollback failed"
                    );
                }
                child.close();
                if let Err(release_err) = lease.release().await {
                    warn!(error = %release_err, "Session release failed after rollback");
                }
                debug!(controller = %self.name(), "Transaction rolled back");
                Err(err)
            }
        }
    }

    async fn join_session<F, Fut, T, E>(&self, session: Arc<dyn Session>, task: F) -> Result<T, E>
    where
        F: FnOnce(Controller) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<DataError>,
    {
        let child = self.child();
        child.bind(session);
        debug!(controller = %self.name(), "Joining enclosing transaction");
        let outcome = match task(child.clone()).await {
            Ok(value) => child.flush().await.map(|()| value).map_err(E::from),
            Err(err) => Err(err),
        };
        child.close();
        outcome
    }
}

impl std::fmt::Debug for Controller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match *lock(&self.inner.state) {
            SessionState::Detached => "detached",
            SessionState::Bound(_) => "bound",
            SessionState::Closed => "closed",
        };
        f.debug_struct("Controller")
            .field("name", &self.inner.name)
            .field("state", &state)
            .finish()
    }
}

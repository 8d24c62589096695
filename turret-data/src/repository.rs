use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use serde_json::Value;
use tracing::debug;

use crate::config::EntityOptions;
use crate::controller::{lock, Controller};
use crate::entity::{Record, ID_FIELD};
use crate::error::DataError;
use crate::query::{Direction, SelectQuery};
use crate::session::settle;

/// Which staged queue an operation drains.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Queue {
    Persist,
    Remove,
}

impl Queue {
    fn as_str(self) -> &'static str {
        match self {
            Queue::Persist => "persist",
            Queue::Remove => "remove",
        }
    }
}

#[derive(Default)]
struct Pending {
    persist: VecDeque<Record>,
    remove: VecDeque<Record>,
}

impl Pending {
    fn queue(&mut self, queue: Queue) -> &mut VecDeque<Record> {
        match queue {
            Queue::Persist => &mut self.persist,
            Queue::Remove => &mut self.remove,
        }
    }
}

/// The staged queues of one repository, shared with the controller's dirty
/// set. Holds no controller reference.
pub(crate) struct Staging {
    entity_name: String,
    options: EntityOptions,
    pending: Mutex<Pending>,
}

impl Staging {
    pub(crate) fn is_dirty(&self) -> bool {
        let pending = lock(&self.pending);
        !pending.persist.is_empty() || !pending.remove.is_empty()
    }

    pub(crate) async fn apply(
        &self,
        controller: &Controller,
        queue: Queue,
    ) -> Result<usize, DataError> {
        let mut applied = 0;

        while let Some(entity) = self.front(queue) {
            let adapter = controller.adapter()?;
            let parameter = match queue {
                Queue::Persist => adapter.create_persistence_parameter(&self.options, &entity)?,
                Queue::Remove => adapter.create_remove_parameter(&self.options, &entity)?,
            };

            let lease = controller.acquire().await?;
            let executed = lease.execute(&parameter).await;
            let released = controller.release(lease).await;

            // The entity leaves the queue only once its statement ran; a
            // failed execute keeps it (and everything behind it) for a retry.
            if executed.is_ok() {
                self.pop_front(queue);
                applied += 1;
            }
            settle(executed, released, queue.as_str())?;
        }

        if applied > 0 {
            debug!(
                entity = %self.entity_name,
                queue = queue.as_str(),
                applied,
                "Applied staged changes"
            );
        }
        Ok(applied)
    }

    fn front(&self, queue: Queue) -> Option<Record> {
        lock(&self.pending).queue(queue).front().cloned()
    }

    fn pop_front(&self, queue: Queue) {
        lock(&self.pending).queue(queue).pop_front();
    }
}

/// Per-entity staging area and read access.
///
/// `add` and `remove` only enqueue; nothing reaches the backend until the
/// owning controller flushes. Each queue is applied in FIFO order, one
/// session round-trip per entity, and an entity leaves its queue only once
/// its statement has executed.
///
/// Clones share the same queues. A repository keeps its controller alive;
/// the controller tracks only the staged queues, so dropping every
/// repository handle does not discard changes already staged.
#[derive(Clone)]
pub struct Repository {
    controller: Controller,
    staging: Arc<Staging>,
}

impl Repository {
    pub(crate) fn new(controller: &Controller, entity_name: &str, options: EntityOptions) -> Self {
        Self {
            controller: controller.clone(),
            staging: Arc::new(Staging {
                entity_name: entity_name.to_string(),
                options,
                pending: Mutex::new(Pending::default()),
            }),
        }
    }

    pub fn entity_name(&self) -> &str {
        &self.staging.entity_name
    }

    pub fn options(&self) -> &EntityOptions {
        &self.staging.options
    }

    pub fn controller(&self) -> &Controller {
        &self.controller
    }

    pub(crate) fn staging(&self) -> &Arc<Staging> {
        &self.staging
    }

    // ── Reads ──────────────────────────────────────────────────────────────

    /// The entity whose `id` equals `id`, if any.
    pub async fn find(&self, id: impl Into<Value>) -> Result<Option<Record>, DataError> {
        let mut criteria = Record::new();
        criteria.insert(ID_FIELD.to_string(), id.into());
        Ok(self.fetch(SelectQuery::new(criteria)).await?.into_iter().next())
    }

    /// The first entity matching `criteria`, if any.
    pub async fn find_one_by(&self, criteria: Record) -> Result<Option<Record>, DataError> {
        let query = SelectQuery::new(criteria).limit(1).offset(0);
        Ok(self.fetch(query).await?.into_iter().next())
    }

    pub async fn find_all(&self) -> Result<Vec<Record>, DataError> {
        self.fetch(SelectQuery::default()).await
    }

    pub async fn find_by(
        &self,
        criteria: Record,
        order_by: Vec<(String, Direction)>,
        limit: Option<u64>,
        offset: Option<u64>,
    ) -> Result<Vec<Record>, DataError> {
        self.fetch(SelectQuery {
            criteria,
            order_by,
            limit,
            offset,
        })
        .await
    }

    /// Run a prepared [`SelectQuery`].
    pub async fn select(&self, query: SelectQuery) -> Result<Vec<Record>, DataError> {
        self.fetch(query).await
    }

    async fn fetch(&self, query: SelectQuery) -> Result<Vec<Record>, DataError> {
        let controller = &self.controller;
        let parameter = controller
            .adapter()?
            .create_select_parameter(&self.staging.options, &query)?;

        let lease = controller.acquire().await?;
        let rows = lease.find(&parameter).await;
        let released = controller.release(lease).await;
        let rows = settle(rows, released, "find")?;

        rows.into_iter()
            .map(|row| controller.create_entity(&self.staging.entity_name, row))
            .collect()
    }

    // ── Staging ────────────────────────────────────────────────────────────

    /// Stage `entity` for persistence (insert or update).
    pub fn add(&self, entity: Record) -> Result<(), DataError> {
        self.stage(Queue::Persist, entity)
    }

    /// Stage `entity` for removal.
    pub fn remove(&self, entity: Record) -> Result<(), DataError> {
        self.stage(Queue::Remove, entity)
    }

    fn stage(&self, queue: Queue, entity: Record) -> Result<(), DataError> {
        if self.controller.is_closed() {
            return Err(DataError::Closed);
        }
        lock(&self.staging.pending).queue(queue).push_back(entity);
        match queue {
            Queue::Persist => self.controller.mark_persist(self),
            Queue::Remove => self.controller.mark_remove(self),
        }
        Ok(())
    }

    pub fn pending_persist_count(&self) -> usize {
        lock(&self.staging.pending).persist.len()
    }

    pub fn pending_remove_count(&self) -> usize {
        lock(&self.staging.pending).remove.len()
    }

    /// `true` while at least one staged change is unapplied.
    pub fn is_dirty(&self) -> bool {
        self.staging.is_dirty()
    }

    /// Drop every staged change without applying it.
    pub fn clear(&self) {
        let mut pending = lock(&self.staging.pending);
        pending.persist.clear();
        pending.remove.clear();
    }

    // ── Apply ──────────────────────────────────────────────────────────────

    /// Execute staged persistence in FIFO order; returns how many applied.
    pub async fn apply_persistence(&self) -> Result<usize, DataError> {
        self.apply(Queue::Persist).await
    }

    /// Execute staged removals in FIFO order; returns how many applied.
    pub async fn apply_remove(&self) -> Result<usize, DataError> {
        self.apply(Queue::Remove).await
    }

    async fn apply(&self, queue: Queue) -> Result<usize, DataError> {
        self.staging.apply(&self.controller, queue).await
    }
}

impl std::fmt::Debug for Repository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let pending = lock(&self.staging.pending);
        f.debug_struct("Repository")
            .field("entity_name", &self.staging.entity_name)
            .field("pending_persist", &pending.persist.len())
            .field("pending_remove", &pending.remove.len())
            .finish()
    }
}

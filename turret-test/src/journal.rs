use std::sync::{Arc, Mutex, PoisonError};

use turret_data::Parameter;

/// One call observed by the in-memory adapter, tagged with the session id.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    CreateSession(u64),
    Begin(u64),
    Execute(u64, Parameter),
    Find(u64, Parameter),
    Commit(u64),
    Rollback(u64),
    End(u64),
}

impl Event {
    pub fn session_id(&self) -> u64 {
        match self {
            Event::CreateSession(id)
            | Event::Begin(id)
            | Event::Execute(id, _)
            | Event::Find(id, _)
            | Event::Commit(id)
            | Event::Rollback(id)
            | Event::End(id) => *id,
        }
    }
}

/// Ordered record of every adapter and session call.
///
/// Cheap to clone; clones append to and read from the same log.
#[derive(Clone, Default)]
pub struct Journal {
    events: Arc<Mutex<Vec<Event>>>,
}

impl Journal {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&self, event: Event) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }

    pub fn events(&self) -> Vec<Event> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn clear(&self) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    fn count(&self, matches: impl Fn(&Event) -> bool) -> usize {
        self.events().iter().filter(|e| matches(e)).count()
    }

    pub fn sessions_created(&self) -> usize {
        self.count(|e| matches!(e, Event::CreateSession(_)))
    }

    pub fn begins(&self) -> usize {
        self.count(|e| matches!(e, Event::Begin(_)))
    }

    pub fn commits(&self) -> usize {
        self.count(|e| matches!(e, Event::Commit(_)))
    }

    pub fn rollbacks(&self) -> usize {
        self.count(|e| matches!(e, Event::Rollback(_)))
    }

    pub fn ends(&self) -> usize {
        self.count(|e| matches!(e, Event::End(_)))
    }

    /// Parameters passed to `execute`, in call order.
    pub fn executed(&self) -> Vec<Parameter> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Execute(_, parameter) => Some(parameter),
                _ => None,
            })
            .collect()
    }

    /// Parameters passed to `find`, in call order.
    pub fn found(&self) -> Vec<Parameter> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Find(_, parameter) => Some(parameter),
                _ => None,
            })
            .collect()
    }

    /// Distinct ids of sessions that executed or read anything.
    pub fn working_sessions(&self) -> Vec<u64> {
        let mut ids: Vec<u64> = self
            .events()
            .iter()
            .filter(|e| matches!(e, Event::Execute(..) | Event::Find(..)))
            .map(Event::session_id)
            .collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }
}

impl std::fmt::Debug for Journal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.events()).finish()
    }
}

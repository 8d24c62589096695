//! In-memory [`Adapter`] with transactional sessions.
//!
//! Tables are vectors of records keyed by name. A session outside a
//! transaction writes straight to the tables; after `begin` its writes are
//! staged and only land on `commit`. Reads inside a transaction see the
//! session's own staged writes.
//!
//! Parameters use a small text encoding so tests can assert on them:
//!
//! | intent | statement | binds |
//! |--------|-----------|-------|
//! | select | `select <table>` | `[criteria, order, limit, offset]` |
//! | persist | `persist <table>` | `[entity, id_column]` |
//! | remove | `remove <table>` | `[entity, id_column]` |

use std::cmp::Ordering;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::{json, Value};
use turret_data::{
    Adapter, DataError, Direction, EntityOptions, EntityParameter, Parameter, Record,
    SelectQuery, Session, ID_FIELD,
};

use crate::fault::{FailPoint, Faults};
use crate::journal::{Event, Journal};

/// Entity parameter for a memory-backed entity stored in `table`.
pub fn entity(table: &str) -> EntityParameter {
    EntityParameter::new(EntityOptions::new().with("table", table))
}

#[derive(Debug, Clone, PartialEq)]
enum Write {
    Persist {
        table: String,
        id_column: String,
        entity: Record,
    },
    Remove {
        table: String,
        id_column: String,
        entity: Record,
    },
}

impl Write {
    fn table(&self) -> &str {
        match self {
            Write::Persist { table, .. } | Write::Remove { table, .. } => table,
        }
    }

    fn apply(&self, rows: &mut Vec<Record>) {
        match self {
            Write::Persist {
                id_column, entity, ..
            } => match identity(entity, id_column) {
                Some(id) => match rows.iter_mut().find(|row| row.get(id_column) == Some(id)) {
                    Some(row) => {
                        for (key, value) in entity {
                            row.insert(key.clone(), value.clone());
                        }
                    }
                    None => rows.push(entity.clone()),
                },
                None => rows.push(entity.clone()),
            },
            Write::Remove {
                id_column, entity, ..
            } => match identity(entity, id_column) {
                Some(id) => rows.retain(|row| row.get(id_column) != Some(id)),
                None => rows.retain(|row| row != entity),
            },
        }
    }
}

fn identity<'a>(entity: &'a Record, id_column: &str) -> Option<&'a Value> {
    entity.get(id_column).filter(|id| !id.is_null())
}

/// Committed table contents, shared by an adapter and its sessions.
#[derive(Default)]
struct Store {
    tables: DashMap<String, Vec<Record>>,
}

impl Store {
    fn rows(&self, table: &str) -> Vec<Record> {
        self.tables
            .get(table)
            .map(|rows| rows.value().clone())
            .unwrap_or_default()
    }

    fn apply(&self, write: &Write) {
        let mut rows = self.tables.entry(write.table().to_string()).or_default();
        write.apply(rows.value_mut());
    }
}

/// Storage adapter backed by process memory.
///
/// Clones share tables, the call [`Journal`] and the [`Faults`] rules.
#[derive(Clone, Default)]
pub struct MemoryAdapter {
    store: Arc<Store>,
    journal: Journal,
    faults: Faults,
    next_session: Arc<AtomicU64>,
}

impl MemoryAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn journal(&self) -> &Journal {
        &self.journal
    }

    pub fn faults(&self) -> &Faults {
        &self.faults
    }

    /// Committed rows of `table`, in insertion order.
    pub fn rows(&self, table: &str) -> Vec<Record> {
        self.store.rows(table)
    }

    /// Seed `table` with `row`, bypassing sessions and the journal.
    pub fn insert(&self, table: &str, row: Record) {
        self.store.tables.entry(table.to_string()).or_default().push(row);
    }

    fn table(options: &EntityOptions) -> Result<String, DataError> {
        Ok(options.require::<String>("table")?)
    }

    fn write_parameter(
        verb: &str,
        options: &EntityOptions,
        entity: &Record,
    ) -> Result<Parameter, DataError> {
        let table = Self::table(options)?;
        let id_column = options
            .get_opt::<String>("id")?
            .unwrap_or_else(|| ID_FIELD.to_string());
        Ok(Parameter::new(
            format!("{verb} {table}"),
            vec![Value::Object(entity.clone()), Value::String(id_column)],
        ))
    }
}

#[async_trait]
impl Adapter for MemoryAdapter {
    async fn create_session(&self) -> Result<Box<dyn Session>, DataError> {
        let id = self.next_session.fetch_add(1, AtomicOrdering::SeqCst) + 1;
        self.journal.push(Event::CreateSession(id));
        self.faults.check(FailPoint::CreateSession, None)?;
        Ok(Box::new(MemorySession {
            id,
            store: self.store.clone(),
            journal: self.journal.clone(),
            faults: self.faults.clone(),
            staged: Mutex::new(None),
            ended: AtomicBool::new(false),
        }))
    }

    fn create_select_parameter(
        &self,
        options: &EntityOptions,
        select: &SelectQuery,
    ) -> Result<Parameter, DataError> {
        let table = Self::table(options)?;
        let order: Vec<Value> = select
            .order_by
            .iter()
            .map(|(field, direction)| {
                let direction = match direction {
                    Direction::Asc => "asc",
                    Direction::Desc => "desc",
                };
                json!([field, direction])
            })
            .collect();
        Ok(Parameter::new(
            format!("select {table}"),
            vec![
                Value::Object(select.criteria.clone()),
                Value::Array(order),
                json!(select.limit),
                json!(select.offset),
            ],
        ))
    }

    fn create_persistence_parameter(
        &self,
        options: &EntityOptions,
        entity: &Record,
    ) -> Result<Parameter, DataError> {
        Self::write_parameter("persist", options, entity)
    }

    fn create_remove_parameter(
        &self,
        options: &EntityOptions,
        entity: &Record,
    ) -> Result<Parameter, DataError> {
        Self::write_parameter("remove", options, entity)
    }
}

impl std::fmt::Debug for MemoryAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryAdapter")
            .field("tables", &self.store.tables.len())
            .finish()
    }
}

/// A session of [`MemoryAdapter`].
pub struct MemorySession {
    id: u64,
    store: Arc<Store>,
    journal: Journal,
    faults: Faults,
    /// `Some` while a transaction is open.
    staged: Mutex<Option<Vec<Write>>>,
    ended: AtomicBool,
}

impl MemorySession {
    pub fn id(&self) -> u64 {
        self.id
    }

    fn ensure_open(&self) -> Result<(), DataError> {
        if self.ended.load(AtomicOrdering::SeqCst) {
            return Err(DataError::Other(format!("session {} has ended", self.id)));
        }
        Ok(())
    }

    fn staged(&self) -> std::sync::MutexGuard<'_, Option<Vec<Write>>> {
        self.staged.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn split_statement(statement: &str) -> Result<(&str, &str), DataError> {
    statement
        .split_once(' ')
        .ok_or_else(|| DataError::parameter(format!("malformed statement '{statement}'")))
}

fn decode_write(parameter: &Parameter) -> Result<Write, DataError> {
    let (verb, table) = split_statement(&parameter.statement)?;
    let entity = match parameter.binds.first() {
        Some(Value::Object(entity)) => entity.clone(),
        _ => return Err(DataError::parameter("write without an entity bind")),
    };
    let id_column = parameter
        .binds
        .get(1)
        .and_then(Value::as_str)
        .unwrap_or(ID_FIELD)
        .to_string();
    let table = table.to_string();
    match verb {
        "persist" => Ok(Write::Persist {
            table,
            id_column,
            entity,
        }),
        "remove" => Ok(Write::Remove {
            table,
            id_column,
            entity,
        }),
        other => Err(DataError::parameter(format!("cannot execute '{other}'"))),
    }
}

fn matches(row: &Record, criteria: &Record) -> bool {
    criteria.iter().all(|(field, expected)| {
        let actual = row.get(field).unwrap_or(&Value::Null);
        match expected {
            Value::Null => actual.is_null(),
            Value::Array(candidates) => candidates.contains(actual),
            value => actual == value,
        }
    })
}

fn compare(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Number(a), Value::Number(b)) => a
            .as_f64()
            .partial_cmp(&b.as_f64())
            .unwrap_or(Ordering::Equal),
        (Value::String(a), Value::String(b)) => a.cmp(b),
        (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Null, _) => Ordering::Less,
        (_, Value::Null) => Ordering::Greater,
        (a, b) => a.to_string().cmp(&b.to_string()),
    }
}

#[async_trait]
impl Session for MemorySession {
    async fn begin(&self) -> Result<(), DataError> {
        self.journal.push(Event::Begin(self.id));
        self.ensure_open()?;
        self.faults.check(FailPoint::Begin, None)?;
        let mut staged = self.staged();
        if staged.is_some() {
            return Err(DataError::Other("transaction already open".into()));
        }
        *staged = Some(Vec::new());
        Ok(())
    }

    async fn execute(&self, parameter: &Parameter) -> Result<(), DataError> {
        self.journal.push(Event::Execute(self.id, parameter.clone()));
        self.ensure_open()?;
        self.faults.check(FailPoint::Execute, Some(parameter))?;
        let write = decode_write(parameter)?;
        match self.staged().as_mut() {
            Some(staged) => staged.push(write),
            None => self.store.apply(&write),
        }
        Ok(())
    }

    async fn find(&self, parameter: &Parameter) -> Result<Vec<Record>, DataError> {
        self.journal.push(Event::Find(self.id, parameter.clone()));
        self.ensure_open()?;
        self.faults.check(FailPoint::Find, Some(parameter))?;

        let (verb, table) = split_statement(&parameter.statement)?;
        if verb != "select" {
            return Err(DataError::parameter(format!("cannot find with '{verb}'")));
        }
        let criteria = parameter
            .binds
            .first()
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();
        let order: Vec<(String, bool)> = parameter
            .binds
            .get(1)
            .and_then(Value::as_array)
            .map(|terms| {
                terms
                    .iter()
                    .filter_map(|term| {
                        let field = term.get(0)?.as_str()?.to_string();
                        let descending = term.get(1)?.as_str()? == "desc";
                        Some((field, descending))
                    })
                    .collect()
            })
            .unwrap_or_default();
        let limit = parameter.binds.get(2).and_then(Value::as_u64);
        let offset = parameter.binds.get(3).and_then(Value::as_u64).unwrap_or(0);

        let mut rows = self.store.rows(table);
        if let Some(staged) = self.staged().as_ref() {
            for write in staged.iter().filter(|w| w.table() == table) {
                write.apply(&mut rows);
            }
        }

        let mut rows: Vec<Record> = rows.into_iter().filter(|row| matches(row, &criteria)).collect();
        rows.sort_by(|a, b| {
            order
                .iter()
                .map(|(field, descending)| {
                    let ordering = compare(
                        a.get(field).unwrap_or(&Value::Null),
                        b.get(field).unwrap_or(&Value::Null),
                    );
                    if *descending {
                        ordering.reverse()
                    } else {
                        ordering
                    }
                })
                .find(|ordering| *ordering != Ordering::Equal)
                .unwrap_or(Ordering::Equal)
        });

        let rows = rows.into_iter().skip(offset as usize);
        Ok(match limit {
            Some(limit) => rows.take(limit as usize).collect(),
            None => rows.collect(),
        })
    }

    async fn commit(&self) -> Result<(), DataError> {
        self.journal.push(Event::Commit(self.id));
        self.ensure_open()?;
        self.faults.check(FailPoint::Commit, None)?;
        let writes = self
            .staged()
            .take()
            .ok_or_else(|| DataError::Other("commit without an open transaction".into()))?;
        for write in &writes {
            self.store.apply(write);
        }
        Ok(())
    }

    async fn rollback(&self) -> Result<(), DataError> {
        self.journal.push(Event::Rollback(self.id));
        self.ensure_open()?;
        self.faults.check(FailPoint::Rollback, None)?;
        self.staged().take();
        Ok(())
    }

    async fn end(&self) -> Result<(), DataError> {
        self.journal.push(Event::End(self.id));
        self.faults.check(FailPoint::End, None)?;
        if self.ended.swap(true, AtomicOrdering::SeqCst) {
            return Err(DataError::Other(format!("session {} ended twice", self.id)));
        }
        // An open transaction is discarded.
        self.staged().take();
        Ok(())
    }
}

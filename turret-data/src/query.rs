use serde_json::Value;

use crate::adapter::Parameter;
use crate::entity::Record;

/// Sort direction of one `ORDER BY` term.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

/// The logical read a repository asks its adapter to translate.
///
/// `criteria` is a conjunction of field equalities; an array value means
/// "one of", `null` means "is null".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SelectQuery {
    pub criteria: Record,
    pub order_by: Vec<(String, Direction)>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

impl SelectQuery {
    pub fn new(criteria: Record) -> Self {
        Self {
            criteria,
            ..Self::default()
        }
    }

    pub fn order_by(mut self, field: impl Into<String>, direction: Direction) -> Self {
        self.order_by.push((field.into(), direction));
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }
}

/// SQL flavour: placeholder style and identifier quoting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    /// Generic SQL using `?` placeholders (default).
    Generic,
    Sqlite,
    /// MySQL-style `?` placeholders with backtick quoting.
    MySql,
    /// Postgres-style `$1, $2, ...` placeholders.
    Postgres,
}

impl Dialect {
    fn placeholder(self, index: usize) -> String {
        match self {
            Dialect::Postgres => format!("${index}"),
            Dialect::Generic | Dialect::Sqlite | Dialect::MySql => "?".to_string(),
        }
    }

    fn quote_char(self) -> char {
        match self {
            Dialect::MySql => '`',
            Dialect::Generic | Dialect::Sqlite | Dialect::Postgres => '"',
        }
    }

    /// Paging clause for an offset with no limit.
    fn offset_only(self, offset: u64) -> String {
        match self {
            Dialect::Postgres => format!(" OFFSET {offset}"),
            // MySQL has no unbounded LIMIT.
            Dialect::MySql => format!(" LIMIT {} OFFSET {offset}", u64::MAX),
            Dialect::Generic | Dialect::Sqlite => format!(" LIMIT -1 OFFSET {offset}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentifierPolicy {
    /// Validate identifiers against a conservative pattern.
    Validate,
    /// Validate and quote identifiers using the dialect quoting style.
    Quote,
}

/// A fluent SQL builder for adapters that speak SQL.
///
/// Every identifier is validated before it reaches the statement, since column
/// names come from entity records as well as from code.
///
/// # Example
///
/// ```ignore
/// let parameter = QueryBuilder::new("users")
///     .dialect(Dialect::Sqlite)
///     .where_eq("email", json!("a@b.com"))
///     .order_by("id", Direction::Asc)
///     .limit(10)
///     .build_select()?;
/// ```
#[derive(Debug, Clone)]
pub struct QueryBuilder {
    table: String,
    conditions: Vec<Condition>,
    order: Vec<(String, Direction)>,
    limit_val: Option<u64>,
    offset_val: Option<u64>,
    dialect: Dialect,
    identifier_policy: IdentifierPolicy,
}

#[derive(Debug, Clone)]
enum Condition {
    Eq(String, Value),
    NotEq(String, Value),
    Like(String, String),
    Gt(String, Value),
    Lt(String, Value),
    In(String, Vec<Value>),
    IsNull(String),
    IsNotNull(String),
}

impl QueryBuilder {
    pub fn new(table: &str) -> Self {
        Self {
            table: table.to_string(),
            conditions: Vec::new(),
            order: Vec::new(),
            limit_val: None,
            offset_val: None,
            dialect: Dialect::Generic,
            identifier_policy: IdentifierPolicy::Quote,
        }
    }

    /// Start from a repository's logical read.
    pub fn from_select(table: &str, select: &SelectQuery) -> Self {
        let mut builder = Self::new(table);
        for (field, value) in &select.criteria {
            builder = match value {
                Value::Null => builder.where_null(field),
                Value::Array(values) => builder.where_in(field, values.clone()),
                other => builder.where_eq(field, other.clone()),
            };
        }
        for (field, direction) in &select.order_by {
            builder = builder.order_by(field, *direction);
        }
        builder.limit_val = select.limit;
        builder.offset_val = select.offset;
        builder
    }

    pub fn dialect(mut self, dialect: Dialect) -> Self {
        self.dialect = dialect;
        self
    }

    pub fn identifier_policy(mut self, policy: IdentifierPolicy) -> Self {
        self.identifier_policy = policy;
        self
    }

    pub fn where_eq(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.conditions
            .push(Condition::Eq(column.to_string(), value.into()));
        self
    }

    pub fn where_not_eq(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.conditions
            .push(Condition::NotEq(column.to_string(), value.into()));
        self
    }

    pub fn where_like(mut self, column: &str, pattern: &str) -> Self {
        self.conditions
            .push(Condition::Like(column.to_string(), pattern.to_string()));
        self
    }

    pub fn where_gt(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.conditions
            .push(Condition::Gt(column.to_string(), value.into()));
        self
    }

    pub fn where_lt(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.conditions
            .push(Condition::Lt(column.to_string(), value.into()));
        self
    }

    pub fn where_in(mut self, column: &str, values: Vec<Value>) -> Self {
        self.conditions.push(Condition::In(column.to_string(), values));
        self
    }

    pub fn where_null(mut self, column: &str) -> Self {
        self.conditions.push(Condition::IsNull(column.to_string()));
        self
    }

    pub fn where_not_null(mut self, column: &str) -> Self {
        self.conditions
            .push(Condition::IsNotNull(column.to_string()));
        self
    }

    pub fn order_by(mut self, column: &str, direction: Direction) -> Self {
        self.order.push((column.to_string(), direction));
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit_val = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset_val = Some(offset);
        self
    }

    /// `SELECT * FROM table [WHERE ..] [ORDER BY ..] [LIMIT n] [OFFSET m]`.
    pub fn build_select(&self) -> Result<Parameter, QueryError> {
        let table = self.ident(&self.table, "table")?;
        let mut sql = format!("SELECT * FROM {table}");
        let mut binds = Vec::new();
        self.append_where(&mut sql, &mut binds)?;
        self.append_order(&mut sql)?;
        match (self.limit_val, self.offset_val) {
            (Some(limit), offset) => {
                sql.push_str(&format!(" LIMIT {limit}"));
                if let Some(offset) = offset {
                    sql.push_str(&format!(" OFFSET {offset}"));
                }
            }
            (None, Some(offset)) => sql.push_str(&self.dialect.offset_only(offset)),
            (None, None) => {}
        }
        Ok(Parameter::new(sql, binds))
    }

    /// `INSERT INTO table (cols..) VALUES (..)` from a record's fields.
    pub fn build_insert(&self, record: &Record) -> Result<Parameter, QueryError> {
        let (columns, placeholders, binds) = self.insert_parts(record)?;
        let table = self.ident(&self.table, "table")?;
        Ok(Parameter::new(
            format!("INSERT INTO {table} ({columns}) VALUES ({placeholders})"),
            binds,
        ))
    }

    /// Insert, or update every other column when `id_column` already exists.
    pub fn build_upsert(&self, record: &Record, id_column: &str) -> Result<Parameter, QueryError> {
        let (columns, placeholders, binds) = self.insert_parts(record)?;
        let table = self.ident(&self.table, "table")?;
        let id = self.ident(id_column, "column")?;

        let mut updates = Vec::new();
        for column in record.keys().filter(|c| c.as_str() != id_column) {
            let column = self.ident(column, "column")?;
            updates.push(format!("{column} = excluded.{column}"));
        }
        let conflict = if updates.is_empty() {
            "DO NOTHING".to_string()
        } else {
            format!("DO UPDATE SET {}", updates.join(", "))
        };

        Ok(Parameter::new(
            format!(
                "INSERT INTO {table} ({columns}) VALUES ({placeholders}) ON CONFLICT ({id}) {conflict}"
            ),
            binds,
        ))
    }

    /// `DELETE FROM table WHERE ..` using the builder's conditions.
    pub fn build_delete(&self) -> Result<Parameter, QueryError> {
        if self.conditions.is_empty() {
            return Err(QueryError::Unbounded);
        }
        let table = self.ident(&self.table, "table")?;
        let mut sql = format!("DELETE FROM {table}");
        let mut binds = Vec::new();
        self.append_where(&mut sql, &mut binds)?;
        Ok(Parameter::new(sql, binds))
    }

    fn insert_parts(&self, record: &Record) -> Result<(String, String, Vec<Value>), QueryError> {
        if record.is_empty() {
            return Err(QueryError::EmptyRecord);
        }
        let mut columns = Vec::with_capacity(record.len());
        let mut placeholders = Vec::with_capacity(record.len());
        let mut binds = Vec::with_capacity(record.len());
        for (idx, (column, value)) in record.iter().enumerate() {
            columns.push(self.ident(column, "column")?);
            placeholders.push(self.dialect.placeholder(idx + 1));
            binds.push(value.clone());
        }
        Ok((columns.join(", "), placeholders.join(", "), binds))
    }

    fn append_where(&self, sql: &mut String, binds: &mut Vec<Value>) -> Result<(), QueryError> {
        if self.conditions.is_empty() {
            return Ok(());
        }
        let mut clauses = Vec::with_capacity(self.conditions.len());
        for cond in &self.conditions {
            let clause = match cond {
                Condition::Eq(col, val) => self.compare(col, "=", val.clone(), binds)?,
                Condition::NotEq(col, val) => self.compare(col, "!=", val.clone(), binds)?,
                Condition::Like(col, pat) => {
                    self.compare(col, "LIKE", Value::String(pat.clone()), binds)?
                }
                Condition::Gt(col, val) => self.compare(col, ">", val.clone(), binds)?,
                Condition::Lt(col, val) => self.compare(col, "<", val.clone(), binds)?,
                Condition::In(col, vals) if vals.is_empty() => {
                    self.ident(col, "column")?;
                    "1 = 0".to_string()
                }
                Condition::In(col, vals) => {
                    let col = self.ident(col, "column")?;
                    let placeholders: Vec<_> = vals
                        .iter()
                        .map(|val| {
                            binds.push(val.clone());
                            self.dialect.placeholder(binds.len())
                        })
                        .collect();
                    format!("{col} IN ({})", placeholders.join(", "))
                }
                Condition::IsNull(col) => format!("{} IS NULL", self.ident(col, "column")?),
                Condition::IsNotNull(col) => {
                    format!("{} IS NOT NULL", self.ident(col, "column")?)
                }
            };
            clauses.push(clause);
        }
        sql.push_str(" WHERE ");
        sql.push_str(&clauses.join(" AND "));
        Ok(())
    }

    fn compare(
        &self,
        column: &str,
        op: &str,
        value: Value,
        binds: &mut Vec<Value>,
    ) -> Result<String, QueryError> {
        let column = self.ident(column, "column")?;
        binds.push(value);
        Ok(format!("{column} {op} {}", self.dialect.placeholder(binds.len())))
    }

    fn append_order(&self, sql: &mut String) -> Result<(), QueryError> {
        if self.order.is_empty() {
            return Ok(());
        }
        let mut clauses = Vec::with_capacity(self.order.len());
        for (col, direction) in &self.order {
            let col = self.ident(col, "column")?;
            clauses.push(match direction {
                Direction::Asc => format!("{col} ASC"),
                Direction::Desc => format!("{col} DESC"),
            });
        }
        sql.push_str(" ORDER BY ");
        sql.push_str(&clauses.join(", "));
        Ok(())
    }

    fn ident(&self, ident: &str, kind: &'static str) -> Result<String, QueryError> {
        if !is_valid_identifier(ident) {
            return Err(QueryError::InvalidIdentifier {
                kind,
                ident: ident.to_string(),
            });
        }
        match self.identifier_policy {
            IdentifierPolicy::Quote => Ok(quote_identifier(ident, self.dialect)),
            IdentifierPolicy::Validate => Ok(ident.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum QueryError {
    InvalidIdentifier { kind: &'static str, ident: String },
    /// Insert of a record without fields.
    EmptyRecord,
    /// Delete without any condition.
    Unbounded,
}

impl std::fmt::Display for QueryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueryError::InvalidIdentifier { kind, ident } => {
                write!(f, "Invalid {kind} identifier: {ident}")
            }
            QueryError::EmptyRecord => write!(f, "Cannot insert a record without fields"),
            QueryError::Unbounded => write!(f, "Refusing to delete without a condition"),
        }
    }
}

impl std::error::Error for QueryError {}

impl From<QueryError> for crate::DataError {
    fn from(err: QueryError) -> Self {
        crate::DataError::Parameter(err.to_string())
    }
}

fn is_valid_identifier(ident: &str) -> bool {
    !ident.is_empty() && ident.split('.').all(is_valid_segment)
}

fn is_valid_segment(segment: &str) -> bool {
    let mut chars = segment.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn quote_identifier(ident: &str, dialect: Dialect) -> String {
    let quote = dialect.quote_char();
    ident
        .split('.')
        .map(|part| format!("{quote}{part}{quote}"))
        .collect::<Vec<_>>()
        .join(".")
}

//! Document database collaborator.
//!
//! Data lives in named collections of JSON documents keyed by string ids.
//! Multi-document writes go through [`WriteBatch`], which commits
//! all-or-nothing and can carry preconditions on documents it reads.

mod memory;
mod postgres;
mod value;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use uuid::Uuid;

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Debug)]
pub enum StoreError {
    NotFound { collection: String, id: String },
    AlreadyExists { collection: String, id: String },
    PreconditionFailed { collection: String, id: String },
    Serde(serde_json::Error),
    Database(sqlx::Error),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound { collection, id } => write!(f, "{collection}/{id} not found"),
            Self::AlreadyExists { collection, id } => write!(f, "{collection}/{id} already exists"),
            Self::PreconditionFailed { collection, id } => {
                write!(f, "precondition failed on {collection}/{id}")
            }
            Self::Serde(e) => write!(f, "document encoding error: {e}"),
            Self::Database(e) => write!(f, "database error: {e}"),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        Self::Database(e)
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serde(e)
    }
}

/// Native timestamp representation: Unix epoch milliseconds.
pub fn timestamp(at: DateTime<Utc>) -> Value {
    Value::from(at.timestamp_millis())
}

pub fn to_data<T: Serialize>(value: &T) -> Result<Value, StoreError> {
    Ok(serde_json::to_value(value)?)
}

#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub data: Value,
}

impl Document {
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, StoreError> {
        Ok(serde_json::from_value(self.data.clone())?)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    ArrayContains,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub field: String,
    pub op: Op,
    pub value: Value,
}

impl Filter {
    pub fn new(field: &str, op: Op, value: impl Into<Value>) -> Self {
        Self {
            field: field.to_string(),
            op,
            value: value.into(),
        }
    }

    pub fn eq(field: &str, value: impl Into<Value>) -> Self {
        Self::new(field, Op::Eq, value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

#[derive(Debug, Clone)]
pub struct Query {
    pub collection: String,
    pub filters: Vec<Filter>,
    pub order_by: Vec<(String, Direction)>,
    pub limit: Option<usize>,
}

impl Query {
    pub fn new(collection: &str) -> Self {
        Self {
            collection: collection.to_string(),
            filters: Vec::new(),
            order_by: Vec::new(),
            limit: None,
        }
    }

    pub fn filter(mut self, field: &str, op: Op, value: impl Into<Value>) -> Self {
        self.filters.push(Filter::new(field, op, value));
        self
    }

    pub fn where_eq(self, field: &str, value: impl Into<Value>) -> Self {
        self.filter(field, Op::Eq, value)
    }

    pub fn order_by(mut self, field: &str, direction: Direction) -> Self {
        self.order_by.push((field.to_string(), direction));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldUpdate {
    Set(Value),
    Increment(i64),
    ArrayUnion(Vec<Value>),
    ArrayRemove(Vec<Value>),
    Delete,
}

/// Field-level changes applied to an existing document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Update {
    pub fields: Vec<(String, FieldUpdate)>,
}

impl Update {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.fields
            .push((field.to_string(), FieldUpdate::Set(value.into())));
        self
    }

    pub fn increment(mut self, field: &str, by: i64) -> Self {
        self.fields
            .push((field.to_string(), FieldUpdate::Increment(by)));
        self
    }

    pub fn array_union(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.fields
            .push((field.to_string(), FieldUpdate::ArrayUnion(vec![value.into()])));
        self
    }

    pub fn array_remove(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.fields
            .push((field.to_string(), FieldUpdate::ArrayRemove(vec![value.into()])));
        self
    }

    pub fn delete_field(mut self, field: &str) -> Self {
        self.fields.push((field.to_string(), FieldUpdate::Delete));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Write {
    Create {
        collection: String,
        id: String,
        data: Value,
    },
    Set {
        collection: String,
        id: String,
        data: Value,
    },
    Update {
        collection: String,
        id: String,
        update: Update,
    },
    Delete {
        collection: String,
        id: String,
    },
}

/// The document must exist and match every filter at commit time.
#[derive(Debug, Clone, PartialEq)]
pub struct Precondition {
    pub collection: String,
    pub id: String,
    pub filters: Vec<Filter>,
}

#[derive(Debug, Clone, Default)]
pub struct WriteBatch {
    pub preconditions: Vec<Precondition>,
    pub writes: Vec<Write>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn require(&mut self, collection: &str, id: &str, filters: Vec<Filter>) -> &mut Self {
        self.preconditions.push(Precondition {
            collection: collection.to_string(),
            id: id.to_string(),
            filters,
        });
        self
    }

    /// Fails the whole batch with [`StoreError::AlreadyExists`] if the document exists.
    pub fn create(&mut self, collection: &str, id: &str, data: Value) -> &mut Self {
        self.writes.push(Write::Create {
            collection: collection.to_string(),
            id: id.to_string(),
            data,
        });
        self
    }

    pub fn set(&mut self, collection: &str, id: &str, data: Value) -> &mut Self {
        self.writes.push(Write::Set {
            collection: collection.to_string(),
            id: id.to_string(),
            data,
        });
        self
    }

    pub fn update(&mut self, collection: &str, id: &str, update: Update) -> &mut Self {
        self.writes.push(Write::Update {
            collection: collection.to_string(),
            id: id.to_string(),
            update,
        });
        self
    }

    pub fn delete(&mut self, collection: &str, id: &str) -> &mut Self {
        self.writes.push(Write::Delete {
            collection: collection.to_string(),
            id: id.to_string(),
        });
        self
    }

    pub fn is_empty(&self) -> bool {
        self.preconditions.is_empty() && self.writes.is_empty()
    }
}

#[derive(Clone)]
pub enum DocumentStore {
    Memory(MemoryStore),
    Postgres(PgStore),
}

impl DocumentStore {
    pub fn new_id() -> String {
        Uuid::new_v4().to_string()
    }

    pub async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError> {
        match self {
            Self::Memory(s) => s.get(collection, id).await,
            Self::Postgres(s) => s.get(collection, id).await,
        }
    }

    pub async fn query(&self, query: &Query) -> Result<Vec<Document>, StoreError> {
        match self {
            Self::Memory(s) => s.query(query).await,
            Self::Postgres(s) => s.query(query).await,
        }
    }

    pub async fn commit(&self, batch: WriteBatch) -> Result<(), StoreError> {
        if batch.is_empty() {
            return Ok(());
        }
        match self {
            Self::Memory(s) => s.commit(batch).await,
            Self::Postgres(s) => s.commit(batch).await,
        }
    }

    pub async fn set(&self, collection: &str, id: &str, data: Value) -> Result<(), StoreError> {
        let mut batch = WriteBatch::new();
        batch.set(collection, id, data);
        self.commit(batch).await
    }

    pub async fn update(&self, collection: &str, id: &str, update: Update) -> Result<(), StoreError> {
        let mut batch = WriteBatch::new();
        batch.update(collection, id, update);
        self.commit(batch).await
    }

    pub async fn delete(&self, collection: &str, id: &str) -> Result<(), StoreError> {
        let mut batch = WriteBatch::new();
        batch.delete(collection, id);
        self.commit(batch).await
    }

    pub async fn ping(&self) -> Result<(), StoreError> {
        match self {
            Self::Memory(_) => Ok(()),
            Self::Postgres(s) => s.ping().await,
        }
    }
}

use crate::shared::ids::TableName;
use serde_json::{Map, Value};

pub mod executor;
pub mod filter;
pub mod scoped;
pub mod sqlite;

pub use executor::{execute_plan, ExecutionOutcome};
pub use filter::{from_plan_filters, matches_all, Filter};
pub use scoped::ScopedStore;
pub use sqlite::SqliteStore;

pub const TENANT_COLUMN: &str = "company_id";
pub const RECORD_ID_COLUMN: &str = "id";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store open failed at {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: rusqlite::Error,
    },
    #[error("failed to create store parent {path}: {source}")]
    CreateParent {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("store statement failed: {source}")]
    Sql {
        #[source]
        source: rusqlite::Error,
    },
    #[error("stored row is not a valid document: {0}")]
    InvalidRow(String),
    #[error("record id generation failed: {0}")]
    IdGeneration(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueryOutcome {
    pub rows: Vec<Value>,
    pub records_affected: usize,
}

pub trait Datastore {
    fn select(&self, table: &TableName, filters: &[Filter]) -> Result<QueryOutcome, StoreError>;

    fn insert(
        &self,
        table: &TableName,
        data: &Map<String, Value>,
    ) -> Result<QueryOutcome, StoreError>;

    fn update(
        &self,
        table: &TableName,
        data: &Map<String, Value>,
        filters: &[Filter],
    ) -> Result<QueryOutcome, StoreError>;

    fn delete(&self, table: &TableName, filters: &[Filter]) -> Result<QueryOutcome, StoreError>;
}

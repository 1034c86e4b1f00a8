use crate::shared::fingerprint::compact_record_id;
use crate::shared::ids::TableName;
use crate::store::filter::{matches_all, Filter};
use crate::store::{Datastore, QueryOutcome, StoreError, RECORD_ID_COLUMN};
use chrono::Utc;
use rusqlite::{params, Connection};
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};

pub struct SqliteStore {
    db_path: PathBuf,
}

impl SqliteStore {
    pub fn open(db_path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = db_path.parent() {
            fs::create_dir_all(parent).map_err(|source| StoreError::CreateParent {
                path: parent.display().to_string(),
                source,
            })?;
        }

        let store = Self {
            db_path: db_path.to_path_buf(),
        };

        let _ = store.connect()?;
        Ok(store)
    }

    pub fn ensure_schema(&self) -> Result<(), StoreError> {
        let connection = self.connect()?;
        connection
            .execute_batch(
                "
                CREATE TABLE IF NOT EXISTS records (
                    table_name TEXT NOT NULL,
                    record_id TEXT NOT NULL,
                    document TEXT NOT NULL,
                    PRIMARY KEY (table_name, record_id)
                );
                CREATE INDEX IF NOT EXISTS idx_records_table
                    ON records (table_name);
                ",
            )
            .map_err(|source| StoreError::Sql { source })?;
        Ok(())
    }

    fn connect(&self) -> Result<Connection, StoreError> {
        Connection::open(&self.db_path).map_err(|source| StoreError::Open {
            path: self.db_path.display().to_string(),
            source,
        })
    }

    fn load_documents(
        &self,
        connection: &Connection,
        table: &TableName,
    ) -> Result<Vec<(String, Value)>, StoreError> {
        let mut statement = connection
            .prepare("SELECT record_id, document FROM records WHERE table_name = ?1")
            .map_err(|source| StoreError::Sql { source })?;
        let rows = statement
            .query_map(params![table.as_str()], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })
            .map_err(|source| StoreError::Sql { source })?;

        let mut documents = Vec::new();
        for row in rows {
            let (record_id, raw) = row.map_err(|source| StoreError::Sql { source })?;
            let document: Value = serde_json::from_str(&raw).map_err(|err| {
                StoreError::InvalidRow(format!("record `{record_id}` holds invalid json: {err}"))
            })?;
            documents.push((record_id, document));
        }
        Ok(documents)
    }
}

impl Datastore for SqliteStore {
    fn select(&self, table: &TableName, filters: &[Filter]) -> Result<QueryOutcome, StoreError> {
        let connection = self.connect()?;
        let rows: Vec<Value> = self
            .load_documents(&connection, table)?
            .into_iter()
            .map(|(_, document)| document)
            .filter(|document| matches_all(filters, document))
            .collect();
        let records_affected = rows.len();
        Ok(QueryOutcome {
            rows,
            records_affected,
        })
    }

    fn insert(
        &self,
        table: &TableName,
        data: &Map<String, Value>,
    ) -> Result<QueryOutcome, StoreError> {
        let connection = self.connect()?;
        let mut document = data.clone();
        let record_id = match document.get(RECORD_ID_COLUMN).and_then(Value::as_str) {
            Some(id) => id.to_string(),
            None => {
                let id = compact_record_id("rec", Utc::now().timestamp())
                    .map_err(StoreError::IdGeneration)?;
                document.insert(RECORD_ID_COLUMN.to_string(), Value::String(id.clone()));
                id
            }
        };
        let raw = Value::Object(document).to_string();
        connection
            .execute(
                "INSERT INTO records (table_name, record_id, document) VALUES (?1, ?2, ?3)",
                params![table.as_str(), record_id, raw],
            )
            .map_err(|source| StoreError::Sql { source })?;
        let stored: Value = serde_json::from_str(&raw)
            .map_err(|err| StoreError::InvalidRow(format!("inserted document: {err}")))?;
        Ok(QueryOutcome {
            rows: vec![stored],
            records_affected: 1,
        })
    }

    fn update(
        &self,
        table: &TableName,
        data: &Map<String, Value>,
        filters: &[Filter],
    ) -> Result<QueryOutcome, StoreError> {
        let connection = self.connect()?;
        let matching: Vec<(String, Value)> = self
            .load_documents(&connection, table)?
            .into_iter()
            .filter(|(_, document)| matches_all(filters, document))
            .collect();

        let mut rows = Vec::new();
        for (record_id, document) in matching {
            let mut updated = match document {
                Value::Object(map) => map,
                other => {
                    return Err(StoreError::InvalidRow(format!(
                        "record `{record_id}` is not an object: {other}"
                    )))
                }
            };
            for (column, value) in data {
                if column == RECORD_ID_COLUMN {
                    continue;
                }
                updated.insert(column.clone(), value.clone());
            }
            let raw = Value::Object(updated).to_string();
            connection
                .execute(
                    "UPDATE records SET document = ?3 WHERE table_name = ?1 AND record_id = ?2",
                    params![table.as_str(), record_id, raw],
                )
                .map_err(|source| StoreError::Sql { source })?;
            let stored: Value = serde_json::from_str(&raw)
                .map_err(|err| StoreError::InvalidRow(format!("updated document: {err}")))?;
            rows.push(stored);
        }

        let records_affected = rows.len();
        Ok(QueryOutcome {
            rows,
            records_affected,
        })
    }

    fn delete(&self, table: &TableName, filters: &[Filter]) -> Result<QueryOutcome, StoreError> {
        let connection = self.connect()?;
        let matching: Vec<(String, Value)> = self
            .load_documents(&connection, table)?
            .into_iter()
            .filter(|(_, document)| matches_all(filters, document))
            .collect();

        let mut rows = Vec::new();
        for (record_id, document) in matching {
            connection
                .execute(
                    "DELETE FROM records WHERE table_name = ?1 AND record_id = ?2",
                    params![table.as_str(), record_id],
                )
                .map_err(|source| StoreError::Sql { source })?;
            rows.push(document);
        }

        let records_affected = rows.len();
        Ok(QueryOutcome {
            rows,
            records_affected,
        })
    }
}

//! In-memory import store.
//!
//! Backs `import-all --dry-run`: the whole pipeline runs, including
//! foreign-key and uniqueness checks, without touching the database.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

use super::{
    record::{ImportRecord, Value},
    schema::{ColumnKind, EntityDefinition},
    store::ImportStore,
};
use crate::error::{ImportError, ImportResult};

#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<HashMap<String, Vec<ImportRecord>>>,
    commits: Mutex<Vec<(String, usize)>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rows(&self, table: &str) -> Vec<ImportRecord> {
        self.lock_tables().get(table).cloned().unwrap_or_default()
    }

    pub fn count(&self, table: &str) -> usize {
        self.lock_tables().get(table).map_or(0, Vec::len)
    }

    /// Committed batches as (table, size), in commit order
    pub fn commits(&self) -> Vec<(String, usize)> {
        self.commits.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn lock_tables(&self) -> std::sync::MutexGuard<'_, HashMap<String, Vec<ImportRecord>>> {
        self.tables.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn check_constraints(
        tables: &HashMap<String, Vec<ImportRecord>>,
        definition: &EntityDefinition,
        pending: &[ImportRecord],
        record: &ImportRecord,
    ) -> ImportResult<()> {
        let stored = tables.get(definition.name).map(Vec::as_slice).unwrap_or(&[]);
        let existing = || stored.iter().chain(pending.iter());

        for column in &definition.columns {
            let value = record.get(column.name).unwrap_or(&Value::Null);

            if !column.nullable && value.is_null() {
                return Err(ImportError::Constraint(format!(
                    "null value in {}.{}",
                    definition.name, column.name
                )));
            }

            let unique = column.unique || Some(column.name) == definition.primary_key;
            if unique && !value.is_null() && existing().any(|r| r.get(column.name) == Some(value)) {
                return Err(ImportError::Constraint(format!(
                    "duplicate value in {}.{}",
                    definition.name, column.name
                )));
            }

            if let (ColumnKind::ForeignKey(target), Some(id)) = (column.kind, value.as_uuid()) {
                let found = tables
                    .get(target)
                    .map_or(false, |rows| rows.iter().any(|r| r.uuid("id") == Some(id)));
                if !found {
                    return Err(ImportError::Constraint(format!(
                        "{}.{} references missing {} row {}",
                        definition.name, column.name, target, id
                    )));
                }
            }
        }

        if definition.is_association() {
            let keys = definition.key_columns();
            let same_key = |other: &ImportRecord| {
                keys.iter().all(|k| other.get(k) == record.get(k))
            };
            if existing().any(same_key) {
                return Err(ImportError::Constraint(format!(
                    "duplicate key in {}",
                    definition.name
                )));
            }
        }

        Ok(())
    }
}

#[async_trait]
impl ImportStore for MemoryStore {
    async fn insert_batch(
        &self,
        definition: &EntityDefinition,
        records: &[ImportRecord],
    ) -> ImportResult<()> {
        let mut tables = self.lock_tables();

        let mut accepted: Vec<ImportRecord> = Vec::with_capacity(records.len());
        for record in records {
            Self::check_constraints(&tables, definition, &accepted, record)?;
            accepted.push(record.clone());
        }

        tables
            .entry(definition.name.to_string())
            .or_default()
            .extend(accepted);
        self.commits
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((definition.name.to_string(), records.len()));
        Ok(())
    }

    async fn find_by_natural_key(
        &self,
        definition: &EntityDefinition,
        column: &str,
        value: &str,
    ) -> ImportResult<Option<Uuid>> {
        let pk = definition.primary_key.unwrap_or("id");
        Ok(self.lock_tables().get(definition.name).and_then(|rows| {
            rows.iter()
                .find(|r| r.get(column).and_then(Value::as_text) == Some(value))
                .and_then(|r| r.uuid(pk))
        }))
    }

    async fn row_exists(&self, definition: &EntityDefinition, id: Uuid) -> ImportResult<bool> {
        let pk = definition.primary_key.unwrap_or("id");
        Ok(self
            .lock_tables()
            .get(definition.name)
            .map_or(false, |rows| rows.iter().any(|r| r.uuid(pk) == Some(id))))
    }

    async fn association_exists(
        &self,
        definition: &EntityDefinition,
        key: &[(&'static str, Uuid)],
    ) -> ImportResult<bool> {
        Ok(self.lock_tables().get(definition.name).map_or(false, |rows| {
            rows.iter()
                .any(|r| key.iter().all(|(column, id)| r.uuid(column) == Some(*id)))
        }))
    }
}

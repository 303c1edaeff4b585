//! Legacy numeric id to UUID surrogate mapping for one import run

use std::collections::HashMap;
use uuid::Uuid;

use super::record::RawRow;
use crate::error::{ImportError, ImportResult};

/// Identifier a row carried in the legacy export
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LegacyId(pub i64);

impl LegacyId {
    /// Explicit non-empty `id` column if present, else the 1-based ordinal of
    /// the row in its file.
    ///
    /// Both the table's own import and every table referencing it go through
    /// this function, so the two sides always agree.
    pub fn derive(raw: &RawRow, ordinal: usize) -> ImportResult<Self> {
        match raw.get("id").map(|v| v.trim()).filter(|v| !v.is_empty()) {
            Some(explicit) => explicit.parse::<i64>().map(LegacyId).map_err(|_| {
                ImportError::InvalidLiteral {
                    column: "id".to_string(),
                    value: explicit.to_string(),
                    expected: "integer",
                }
            }),
            None => Ok(LegacyId(ordinal as i64)),
        }
    }
}

impl std::fmt::Display for LegacyId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Default)]
pub struct IdRemapper {
    tables: HashMap<String, HashMap<LegacyId, Uuid>>,
}

impl IdRemapper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Generate and record a fresh surrogate for `(table, legacy)`
    pub fn assign(&mut self, table: &str, legacy: LegacyId) -> ImportResult<Uuid> {
        let surrogate = Uuid::new_v4();
        self.adopt(table, legacy, surrogate)?;
        Ok(surrogate)
    }

    /// Record a mapping onto an already persisted row
    pub fn adopt(&mut self, table: &str, legacy: LegacyId, surrogate: Uuid) -> ImportResult<()> {
        let entries = self.tables.entry(table.to_string()).or_default();
        if entries.contains_key(&legacy) {
            return Err(ImportError::DuplicateLegacyId {
                table: table.to_string(),
                legacy_id: legacy.0,
            });
        }
        entries.insert(legacy, surrogate);
        Ok(())
    }

    pub fn resolve(&self, table: &str, legacy: LegacyId) -> ImportResult<Uuid> {
        self.tables
            .get(table)
            .and_then(|entries| entries.get(&legacy))
            .copied()
            .ok_or_else(|| ImportError::UnresolvedReference {
                table: table.to_string(),
                legacy_id: legacy.0,
            })
    }

    /// Forget entries of rows whose batch was rolled back
    pub fn discard(&mut self, table: &str, legacy_ids: &[LegacyId]) {
        if let Some(entries) = self.tables.get_mut(table) {
            for legacy in legacy_ids {
                entries.remove(legacy);
            }
        }
    }

    pub fn len(&self, table: &str) -> usize {
        self.tables.get(table).map_or(0, HashMap::len)
    }
}

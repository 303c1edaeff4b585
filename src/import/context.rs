//! Per-run import state shared by both importers

use super::{
    record::ImportRecord,
    remap::{IdRemapper, LegacyId},
    schema::{EntityDefinition, SchemaRegistry},
    store::ImportStore,
    transform::{DefaultValues, SecretHasher},
};
use crate::error::ImportResult;

/// Everything one `import_all` invocation needs.
///
/// The remapper is owned here, so two runs never share id mappings.
pub struct ImportContext<'a> {
    pub registry: &'a SchemaRegistry,
    pub store: &'a dyn ImportStore,
    pub hasher: &'a dyn SecretHasher,
    pub defaults: &'a DefaultValues,
    pub skip_duplicates: bool,
    pub remapper: IdRemapper,
}

impl<'a> ImportContext<'a> {
    pub fn new(
        registry: &'a SchemaRegistry,
        store: &'a dyn ImportStore,
        hasher: &'a dyn SecretHasher,
        defaults: &'a DefaultValues,
        skip_duplicates: bool,
    ) -> Self {
        Self {
            registry,
            store,
            hasher,
            defaults,
            skip_duplicates,
            remapper: IdRemapper::new(),
        }
    }
}

/// Records waiting for the next commit
#[derive(Debug, Default)]
pub(crate) struct PendingBatch {
    records: Vec<ImportRecord>,
    /// Remapper entries created for these records
    legacy_ids: Vec<LegacyId>,
}

impl PendingBatch {
    pub(crate) fn push(&mut self, record: ImportRecord, legacy: Option<LegacyId>) {
        self.records.push(record);
        self.legacy_ids.extend(legacy);
    }

    /// Tie an extra remapper entry to this batch, so it goes away if the
    /// batch is never persisted
    pub(crate) fn note_mapping(&mut self, legacy: LegacyId) {
        self.legacy_ids.push(legacy);
    }

    /// Whether `legacy` was mapped by a row still waiting in this batch
    pub(crate) fn holds(&self, legacy: LegacyId) -> bool {
        self.legacy_ids.contains(&legacy)
    }

    pub(crate) fn len(&self) -> usize {
        self.records.len()
    }

    /// Drop the batch without persisting it, forgetting its remapper
    /// entries. Called on every error exit of the entity importer.
    pub(crate) fn abandon(&mut self, ctx: &mut ImportContext<'_>, table: &str) {
        let dropped = std::mem::take(&mut self.records).len();
        let legacy_ids = std::mem::take(&mut self.legacy_ids);
        if dropped > 0 {
            tracing::warn!("{}: {} pending rows abandoned", table, dropped);
        }
        ctx.remapper.discard(table, &legacy_ids);
    }

    /// Commit the batch. On failure the batch's remapper entries are
    /// discarded and the error is returned to abort the table.
    pub(crate) async fn commit(
        &mut self,
        ctx: &mut ImportContext<'_>,
        definition: &EntityDefinition,
    ) -> ImportResult<usize> {
        let records = std::mem::take(&mut self.records);
        let legacy_ids = std::mem::take(&mut self.legacy_ids);
        if records.is_empty() {
            return Ok(0);
        }

        match ctx.store.insert_batch(definition, &records).await {
            Ok(()) => {
                tracing::debug!("{}: committed batch of {} rows", definition.name, records.len());
                Ok(records.len())
            }
            Err(e) => {
                tracing::error!(
                    "{}: batch of {} rows rolled back: {}",
                    definition.name,
                    records.len(),
                    e
                );
                ctx.remapper.discard(definition.name, &legacy_ids);
                Err(e)
            }
        }
    }
}

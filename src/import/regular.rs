//! Importer for entity tables (tables with a surrogate primary key)

use std::collections::HashMap;
use std::io::Read;
use std::path::Path;
use uuid::Uuid;

use super::{
    context::{ImportContext, PendingBatch},
    reader::CsvRows,
    record::RawRow,
    remap::LegacyId,
    schema::EntityDefinition,
    transform::RowTransformer,
};
use crate::error::{ImportError, ImportResult};

/// Import `path` into `table`, committing every `batch_size` rows.
///
/// Row-level problems skip the row and the import continues. A failed
/// commit aborts the table; batches committed before it stay persisted.
pub async fn import_table(
    ctx: &mut ImportContext<'_>,
    table: &str,
    path: &Path,
    batch_size: usize,
) -> ImportResult<usize> {
    if batch_size == 0 {
        return Err(ImportError::InvalidBatchSize);
    }
    let registry = ctx.registry;
    let definition = registry
        .resolve(table)
        .map_err(|_| ImportError::UnknownModel(table.to_string()))?;

    let rows = CsvRows::open(path)?;
    let mut batch = PendingBatch::default();

    // The remapper must only describe persisted rows
    let (imported, skipped) = match import_rows(ctx, definition, rows, &mut batch, batch_size).await {
        Ok(counts) => counts,
        Err(e) => {
            batch.abandon(ctx, table);
            return Err(e);
        }
    };

    tracing::info!("{}: imported {} rows ({} skipped)", table, imported, skipped);
    Ok(imported)
}

/// Returns the imported and skipped row counts
async fn import_rows<R: Read>(
    ctx: &mut ImportContext<'_>,
    definition: &EntityDefinition,
    rows: CsvRows<R>,
    batch: &mut PendingBatch,
    batch_size: usize,
) -> ImportResult<(usize, usize)> {
    let table = definition.name;
    let transformer = RowTransformer::new(ctx.registry, ctx.hasher, ctx.defaults);
    // Natural key to the surrogate and legacy id of its first occurrence
    let mut seen_natural_keys: HashMap<String, (Uuid, LegacyId)> = HashMap::new();
    let mut imported = 0;
    let mut skipped = 0;

    for (ordinal, row) in rows {
        let raw = match row {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!("{} row {}: unreadable record skipped: {}", table, ordinal, e);
                skipped += 1;
                continue;
            }
        };

        let legacy = match LegacyId::derive(&raw, ordinal) {
            Ok(legacy) => legacy,
            Err(e) => {
                tracing::warn!("{} row {}: skipped: {}", table, ordinal, e);
                skipped += 1;
                continue;
            }
        };

        if ctx.skip_duplicates {
            if let Some(natural_key) = natural_key_value(definition, &raw) {
                if let Some(&(existing, first)) = seen_natural_keys.get(&natural_key) {
                    tracing::debug!("{} row {}: duplicate {} within file", table, legacy, natural_key);
                    ctx.remapper.adopt(table, legacy, existing)?;
                    // Once the first occurrence is committed the mapping is permanent
                    if batch.holds(first) {
                        batch.note_mapping(legacy);
                    }
                    continue;
                }
                if let Some(column) = definition.natural_key {
                    if let Some(existing) =
                        ctx.store.find_by_natural_key(definition, column, &natural_key).await?
                    {
                        tracing::debug!("{} row {}: {} already exists, skipping", table, legacy, natural_key);
                        ctx.remapper.adopt(table, legacy, existing)?;
                        continue;
                    }
                }
            }
        }

        let transformed = match transformer.transform(definition, &raw, legacy, &mut ctx.remapper) {
            Ok(transformed) => transformed,
            Err(e @ ImportError::DuplicateLegacyId { .. }) => return Err(e),
            Err(e) => {
                tracing::warn!("{} row {}: skipped: {}", table, legacy, e);
                skipped += 1;
                continue;
            }
        };

        if ctx.skip_duplicates {
            if let (Some(natural_key), Some(pk)) = (
                natural_key_value(definition, &raw),
                definition.primary_key.and_then(|pk| transformed.record.uuid(pk)),
            ) {
                seen_natural_keys.insert(natural_key, (pk, legacy));
            }
        }

        batch.push(transformed.record, Some(legacy));
        if batch.len() >= batch_size {
            imported += batch.commit(ctx, definition).await?;
        }
    }

    imported += batch.commit(ctx, definition).await?;
    Ok((imported, skipped))
}

/// Trimmed natural-key value of a raw row, if the table has one
fn natural_key_value(definition: &EntityDefinition, raw: &RawRow) -> Option<String> {
    let column = definition.natural_key?;
    raw.iter()
        .find(|(header, _)| definition.column_named(header).map(|c| c.name) == Some(column))
        .map(|(_, value)| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::import::{
        memory::MemoryStore,
        remap::LegacyId,
        schema::SchemaRegistry,
        store::MockImportStore,
        testing::{write_csv, PlainHasher},
        transform::DefaultValues,
    };

    const AUTHORS: &str = "first_name;last_name;bio\n\
                           Ursula;Le Guin;Writer\n\
                           Frank;Herbert;Writer\n";

    #[tokio::test]
    async fn test_ordinal_legacy_ids() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_csv(dir.path(), "authors.csv", AUTHORS);
        let registry = SchemaRegistry::library().unwrap();
        let store = MemoryStore::new();
        let defaults = DefaultValues::standard();
        let mut ctx = ImportContext::new(&registry, &store, &PlainHasher, &defaults, false);

        let count = import_table(&mut ctx, "author", &path, 100).await.unwrap();

        assert_eq!(count, 2);
        let first = ctx.remapper.resolve("author", LegacyId(1)).unwrap();
        let second = ctx.remapper.resolve("author", LegacyId(2)).unwrap();
        assert_ne!(first, second);
        let rows = store.rows("author");
        assert_eq!(rows[0].uuid("id"), Some(first));
        assert_eq!(rows[1].get("last_name").and_then(|v| v.as_text()), Some("Herbert"));
    }

    #[tokio::test]
    async fn test_reimport_generates_fresh_surrogates() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_csv(dir.path(), "authors.csv", AUTHORS);
        let registry = SchemaRegistry::library().unwrap();
        let store = MemoryStore::new();
        let defaults = DefaultValues::standard();

        let mut first_run = ImportContext::new(&registry, &store, &PlainHasher, &defaults, false);
        import_table(&mut first_run, "author", &path, 10).await.unwrap();
        let mut second_run = ImportContext::new(&registry, &store, &PlainHasher, &defaults, false);
        import_table(&mut second_run, "author", &path, 10).await.unwrap();

        for ordinal in 1..=2 {
            let a = first_run.remapper.resolve("author", LegacyId(ordinal)).unwrap();
            let b = second_run.remapper.resolve("author", LegacyId(ordinal)).unwrap();
            assert_ne!(a, b);
        }
        assert_eq!(store.count("author"), 4);
    }

    #[tokio::test]
    async fn test_explicit_id_used_as_legacy_key() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_csv(
            dir.path(),
            "category.csv",
            "id;name;description\n10;Fiction;Novels\n20;Science;Facts\nx;Broken;Row\n",
        );
        let registry = SchemaRegistry::library().unwrap();
        let store = MemoryStore::new();
        let defaults = DefaultValues::standard();
        let mut ctx = ImportContext::new(&registry, &store, &PlainHasher, &defaults, false);

        let count = import_table(&mut ctx, "category", &path, 10).await.unwrap();

        assert_eq!(count, 2);
        assert!(ctx.remapper.resolve("category", LegacyId(10)).is_ok());
        assert!(ctx.remapper.resolve("category", LegacyId(20)).is_ok());
        assert!(ctx.remapper.resolve("category", LegacyId(1)).is_err());
    }

    #[tokio::test]
    async fn test_batches_committed_two_two_one() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_csv(
            dir.path(),
            "role.csv",
            "name;description\na;A\nb;B\nc;C\nd;D\ne;E\n",
        );
        let registry = SchemaRegistry::library().unwrap();
        let store = MemoryStore::new();
        let defaults = DefaultValues::standard();
        let mut ctx = ImportContext::new(&registry, &store, &PlainHasher, &defaults, false);

        let count = import_table(&mut ctx, "role", &path, 2).await.unwrap();

        assert_eq!(count, 5);
        let sizes: Vec<usize> = store.commits().into_iter().map(|(_, n)| n).collect();
        assert_eq!(sizes, vec![2, 2, 1]);
    }

    #[tokio::test]
    async fn test_failed_batch_keeps_earlier_commits() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_csv(
            dir.path(),
            "role.csv",
            "name;description\na;A\nb;B\nc;C\nd;D\ne;E\n",
        );
        let registry = SchemaRegistry::library().unwrap();
        let defaults = DefaultValues::standard();

        let mut store = MockImportStore::new();
        let mut calls = 0;
        store.expect_insert_batch().times(2).returning(move |_, records| {
            calls += 1;
            if calls == 2 {
                Err(ImportError::Constraint("disk full".to_string()))
            } else {
                assert_eq!(records.len(), 2);
                Ok(())
            }
        });

        let mut ctx = ImportContext::new(&registry, &store, &PlainHasher, &defaults, false);
        let result = import_table(&mut ctx, "role", &path, 2).await;

        assert!(matches!(result, Err(ImportError::Constraint(_))));
        // First batch stays mapped, the rolled back one is forgotten
        assert_eq!(ctx.remapper.len("role"), 2);
        assert!(ctx.remapper.resolve("role", LegacyId(3)).is_err());
    }

    #[tokio::test]
    async fn test_duplicate_legacy_id_forgets_pending_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_csv(
            dir.path(),
            "category.csv",
            "id;name;description\n1;Fiction;F\n2;Science;S\n1;Poetry;P\n",
        );
        let registry = SchemaRegistry::library().unwrap();
        let store = MemoryStore::new();
        let defaults = DefaultValues::standard();
        let mut ctx = ImportContext::new(&registry, &store, &PlainHasher, &defaults, false);

        let result = import_table(&mut ctx, "category", &path, 10).await;

        assert!(matches!(result, Err(ImportError::DuplicateLegacyId { legacy_id: 1, .. })));
        assert_eq!(store.count("category"), 0);
        assert_eq!(ctx.remapper.len("category"), 0);
    }

    #[tokio::test]
    async fn test_committed_duplicate_mapping_survives_failed_batch() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_csv(
            dir.path(),
            "books.csv",
            "isbn;title\n111;Dune\n222;Cosmos\n111;Dune (reprint)\n333;Kindred\n",
        );
        let registry = SchemaRegistry::library().unwrap();
        let defaults = DefaultValues::standard();

        let mut store = MockImportStore::new();
        store
            .expect_find_by_natural_key()
            .times(3)
            .returning(|_, _, _| Ok(None));
        let mut calls = 0;
        store.expect_insert_batch().times(2).returning(move |_, _| {
            calls += 1;
            if calls == 2 {
                Err(ImportError::Constraint("connection reset".to_string()))
            } else {
                Ok(())
            }
        });

        let mut ctx = ImportContext::new(&registry, &store, &PlainHasher, &defaults, true);
        let result = import_table(&mut ctx, "books", &path, 2).await;

        assert!(matches!(result, Err(ImportError::Constraint(_))));
        // Row 3 points at the committed row 1, row 4 was rolled back
        assert_eq!(
            ctx.remapper.resolve("books", LegacyId(3)).unwrap(),
            ctx.remapper.resolve("books", LegacyId(1)).unwrap()
        );
        assert!(ctx.remapper.resolve("books", LegacyId(4)).is_err());
        assert_eq!(ctx.remapper.len("books"), 3);
    }

    #[tokio::test]
    async fn test_pending_duplicate_mapping_rolled_back_with_batch() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_csv(
            dir.path(),
            "books.csv",
            "isbn;title\n111;Dune\n111;Dune (reprint)\n",
        );
        let registry = SchemaRegistry::library().unwrap();
        let defaults = DefaultValues::standard();

        let mut store = MockImportStore::new();
        store.expect_find_by_natural_key().returning(|_, _, _| Ok(None));
        store
            .expect_insert_batch()
            .times(1)
            .returning(|_, _| Err(ImportError::Constraint("connection reset".to_string())));

        let mut ctx = ImportContext::new(&registry, &store, &PlainHasher, &defaults, true);
        let result = import_table(&mut ctx, "books", &path, 10).await;

        assert!(result.is_err());
        assert_eq!(ctx.remapper.len("books"), 0);
    }

    #[tokio::test]
    async fn test_skip_duplicates_by_natural_key() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_csv(
            dir.path(),
            "books.csv",
            "isbn;title\n111;Dune\n222;Earthsea\n111;Dune (reprint)\n",
        );
        let registry = SchemaRegistry::library().unwrap();
        let store = MemoryStore::new();
        let defaults = DefaultValues::standard();

        let mut first = ImportContext::new(&registry, &store, &PlainHasher, &defaults, true);
        assert_eq!(import_table(&mut first, "books", &path, 10).await.unwrap(), 2);
        // In-file duplicate maps onto the first occurrence
        assert_eq!(
            first.remapper.resolve("books", LegacyId(3)).unwrap(),
            first.remapper.resolve("books", LegacyId(1)).unwrap()
        );

        let mut second = ImportContext::new(&registry, &store, &PlainHasher, &defaults, true);
        assert_eq!(import_table(&mut second, "books", &path, 10).await.unwrap(), 0);
        assert_eq!(store.count("books"), 2);
        // Existing rows are adopted so dependents still resolve
        assert_eq!(
            second.remapper.resolve("books", LegacyId(2)).unwrap(),
            first.remapper.resolve("books", LegacyId(2)).unwrap()
        );
    }

    #[tokio::test]
    async fn test_unknown_model() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_csv(dir.path(), "borrow.csv", "a\n1\n");
        let registry = SchemaRegistry::library().unwrap();
        let store = MemoryStore::new();
        let defaults = DefaultValues::standard();
        let mut ctx = ImportContext::new(&registry, &store, &PlainHasher, &defaults, false);

        let result = import_table(&mut ctx, "borrow", &path, 10).await;
        assert!(matches!(result, Err(ImportError::UnknownModel(t)) if t == "borrow"));
    }

    #[tokio::test]
    async fn test_invalid_rows_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_csv(
            dir.path(),
            "reservation.csv",
            "reservation_date;expiration_date;status;position\n\
             2024-01-01;2024-01-15;PENDING;1\n\
             2024-01-02;2024-01-16;UNKNOWN;2\n\
             2024-01-03;2024-01-17;CANCELLED;three\n",
        );
        let registry = SchemaRegistry::library().unwrap();
        let store = MemoryStore::new();
        let defaults = DefaultValues::standard();
        let mut ctx = ImportContext::new(&registry, &store, &PlainHasher, &defaults, false);

        // status and position are required: nulled literals reject the row
        let count = import_table(&mut ctx, "reservation", &path, 10).await.unwrap();
        assert_eq!(count, 1);
        assert_eq!(ctx.remapper.len("reservation"), 1);
    }
}

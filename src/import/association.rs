//! Importer for many-to-many join tables
//!
//! Unlike entity rows, association rows are all-or-nothing: a single
//! unresolved key or bad literal drops the whole row.

use once_cell::sync::Lazy;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use uuid::Uuid;

use super::{
    context::{ImportContext, PendingBatch},
    reader::CsvRows,
    record::{ImportRecord, RawRow, Value},
    remap::LegacyId,
    schema::EntityDefinition,
    transform::{check_required, coerce},
};
use crate::error::{ImportError, ImportResult};

/// Join column name to the table it points into
static JOIN_COLUMNS: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("author_id", "author"),
        ("book_id", "books"),
        ("category_id", "category"),
        ("user_id", "users"),
        ("role_id", "role"),
    ])
});

pub fn join_target(column: &str) -> Option<&'static str> {
    JOIN_COLUMNS.get(column).copied()
}

type CompositeKey = Vec<(&'static str, Uuid)>;

/// Import `path` into the association `table`, committing every `batch_size` rows
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
    let mut confirmed: HashSet<(&'static str, Uuid)> = HashSet::new();
    let mut seen_keys: HashSet<CompositeKey> = HashSet::new();
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

        let record = match build_record(ctx, definition, &raw, &mut confirmed).await? {
            Some(record) => record,
            None => {
                tracing::warn!("{} row {}: skipped, not every column resolved", table, ordinal);
                skipped += 1;
                continue;
            }
        };

        if ctx.skip_duplicates {
            let key: CompositeKey = definition
                .key_columns()
                .into_iter()
                .filter_map(|column| record.uuid(column).map(|id| (column, id)))
                .collect();
            if seen_keys.contains(&key) || ctx.store.association_exists(definition, &key).await? {
                tracing::debug!("{} row {}: already linked, skipping", table, ordinal);
                continue;
            }
            seen_keys.insert(key);
        }

        batch.push(record, None);
        if batch.len() >= batch_size {
            imported += batch.commit(ctx, definition).await?;
        }
    }

    imported += batch.commit(ctx, definition).await?;

    tracing::info!("{}: imported {} rows ({} skipped)", table, imported, skipped);
    Ok(imported)
}

/// Build the association record, or `None` if any known column failed.
///
/// Store errors are returned; resolution failures only reject the row.
async fn build_record(
    ctx: &ImportContext<'_>,
    definition: &EntityDefinition,
    raw: &RawRow,
    confirmed: &mut HashSet<(&'static str, Uuid)>,
) -> ImportResult<Option<ImportRecord>> {
    let mut record = ImportRecord::new();
    let mut expected = 0;

    for (header, value) in raw {
        let Some(column) = definition.column_named(header) else {
            continue;
        };
        expected += 1;

        if !column.name.ends_with("_id") {
            match coerce(column, value) {
                Ok(Value::Null) => {}
                Ok(value) => record.insert(column.name, value),
                Err(e) => tracing::debug!("{}: {}", definition.name, e),
            }
            continue;
        }

        let Some(target) = join_target(column.name) else {
            tracing::debug!("{}: no join target for column {}", definition.name, column.name);
            continue;
        };
        let legacy = match value.trim().parse::<i64>() {
            Ok(legacy) => LegacyId(legacy),
            Err(_) => {
                tracing::debug!("{}: invalid {} {:?}", definition.name, column.name, value);
                continue;
            }
        };
        let id = match ctx.remapper.resolve(target, legacy) {
            Ok(id) => id,
            Err(e) => {
                tracing::debug!("{}: {}", definition.name, e);
                continue;
            }
        };

        if !confirmed.contains(&(target, id)) {
            let target_definition = ctx.registry.resolve(target)?;
            if !ctx.store.row_exists(target_definition, id).await? {
                tracing::debug!("{}: {} row {} is not in the store", definition.name, target, id);
                continue;
            }
            confirmed.insert((target, id));
        }
        record.insert(column.name, Value::Uuid(id));
    }

    // Empty optional columns count as produced
    let empty_optional = raw
        .iter()
        .filter(|(header, value)| {
            value.trim().is_empty()
                && definition
                    .column_named(header)
                    .map_or(false, |c| !c.name.ends_with("_id"))
        })
        .count();

    if record.len() + empty_optional != expected {
        return Ok(None);
    }

    ctx.defaults.apply(definition, &mut record);
    if check_required(definition, &record).is_err() {
        return Ok(None);
    }
    Ok(Some(record))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::import::{
        memory::MemoryStore,
        regular,
        schema::SchemaRegistry,
        store::MockImportStore,
        testing::{write_csv, PlainHasher},
        transform::DefaultValues,
    };

    async fn seed(ctx: &mut ImportContext<'_>, dir: &Path) {
        let categories = write_csv(
            dir,
            "category.csv",
            "name;description\nFiction;Novels\nScience;Facts\n",
        );
        let books = write_csv(dir, "books.csv", "isbn;title\n111;Dune\n222;Cosmos\n");
        regular::import_table(ctx, "category", &categories, 10).await.unwrap();
        regular::import_table(ctx, "books", &books, 10).await.unwrap();
    }

    #[tokio::test]
    async fn test_unresolved_category_row_excluded() {
        let dir = tempfile::tempdir().unwrap();
        let registry = SchemaRegistry::library().unwrap();
        let store = MemoryStore::new();
        let defaults = DefaultValues::standard();
        let mut ctx = ImportContext::new(&registry, &store, &PlainHasher, &defaults, false);
        seed(&mut ctx, dir.path()).await;

        let path = write_csv(
            dir.path(),
            "category_book.csv",
            "book_id;category_id\n1;1\n2;2\n2;9\n",
        );
        let count = import_table(&mut ctx, "category_book", &path, 10).await.unwrap();

        assert_eq!(count, 2);
        assert_eq!(store.count("category_book"), 2);
    }

    #[tokio::test]
    async fn test_row_with_bad_literal_skipped_whole() {
        let dir = tempfile::tempdir().unwrap();
        let registry = SchemaRegistry::library().unwrap();
        let store = MemoryStore::new();
        let defaults = DefaultValues::standard();
        let mut ctx = ImportContext::new(&registry, &store, &PlainHasher, &defaults, false);
        let authors = write_csv(dir.path(), "authors.csv", "first_name;last_name;bio\nA;B;C\n");
        regular::import_table(&mut ctx, "author", &authors, 10).await.unwrap();
        seed(&mut ctx, dir.path()).await;

        let path = write_csv(
            dir.path(),
            "author_books.csv",
            "author_id;book_id;primary_author\n1;1;true\n1;2;maybe\n",
        );
        let count = import_table(&mut ctx, "author_book", &path, 10).await.unwrap();

        assert_eq!(count, 1);
        let rows = store.rows("author_book");
        assert_eq!(rows[0].get("primary_author"), Some(&Value::Boolean(true)));
    }

    #[tokio::test]
    async fn test_empty_optional_column_gets_default() {
        let dir = tempfile::tempdir().unwrap();
        let registry = SchemaRegistry::library().unwrap();
        let store = MemoryStore::new();
        let defaults = DefaultValues::standard();
        let mut ctx = ImportContext::new(&registry, &store, &PlainHasher, &defaults, false);
        let authors = write_csv(dir.path(), "authors.csv", "first_name;last_name;bio\nA;B;C\n");
        regular::import_table(&mut ctx, "author", &authors, 10).await.unwrap();
        seed(&mut ctx, dir.path()).await;

        let path = write_csv(
            dir.path(),
            "author_books.csv",
            "author_id;book_id;primary_author\n1;2;\n",
        );
        assert_eq!(import_table(&mut ctx, "author_book", &path, 10).await.unwrap(), 1);
        let rows = store.rows("author_book");
        assert_eq!(rows[0].get("primary_author"), Some(&Value::Boolean(false)));
    }

    #[tokio::test]
    async fn test_duplicates_skipped_when_enabled() {
        let dir = tempfile::tempdir().unwrap();
        let registry = SchemaRegistry::library().unwrap();
        let store = MemoryStore::new();
        let defaults = DefaultValues::standard();
        let mut ctx = ImportContext::new(&registry, &store, &PlainHasher, &defaults, true);
        seed(&mut ctx, dir.path()).await;

        let path = write_csv(
            dir.path(),
            "category_book.csv",
            "book_id;category_id\n1;1\n1;1\n2;1\n",
        );
        assert_eq!(import_table(&mut ctx, "category_book", &path, 10).await.unwrap(), 2);
        assert_eq!(import_table(&mut ctx, "category_book", &path, 10).await.unwrap(), 0);
        assert_eq!(store.count("category_book"), 2);
    }

    #[tokio::test]
    async fn test_existence_checked_against_store() {
        let dir = tempfile::tempdir().unwrap();
        let registry = SchemaRegistry::library().unwrap();
        let store = MemoryStore::new();
        let defaults = DefaultValues::standard();
        let mut ctx = ImportContext::new(&registry, &store, &PlainHasher, &defaults, false);
        seed(&mut ctx, dir.path()).await;
        // Mapped but never persisted
        ctx.remapper.assign("category", LegacyId(50)).unwrap();

        let path = write_csv(dir.path(), "category_book.csv", "book_id;category_id\n1;50\n");
        assert_eq!(import_table(&mut ctx, "category_book", &path, 10).await.unwrap(), 0);
        assert_eq!(store.count("category_book"), 0);
    }

    #[tokio::test]
    async fn test_failed_batch_aborts_table() {
        let dir = tempfile::tempdir().unwrap();
        let registry = SchemaRegistry::library().unwrap();
        let defaults = DefaultValues::standard();

        let mut store = MockImportStore::new();
        store.expect_row_exists().returning(|_, _| Ok(true));
        let mut calls = 0;
        store.expect_insert_batch().times(2).returning(move |_, records| {
            calls += 1;
            if calls == 2 {
                Err(ImportError::Constraint("deadlock detected".to_string()))
            } else {
                assert_eq!(records.len(), 2);
                Ok(())
            }
        });

        let mut ctx = ImportContext::new(&registry, &store, &PlainHasher, &defaults, false);
        for legacy in 1..=2 {
            ctx.remapper.assign("books", LegacyId(legacy)).unwrap();
            ctx.remapper.assign("category", LegacyId(legacy)).unwrap();
        }

        let path = write_csv(
            dir.path(),
            "category_book.csv",
            "book_id;category_id\n1;1\n2;1\n1;2\n2;2\n1;1\n",
        );
        let result = import_table(&mut ctx, "category_book", &path, 2).await;

        assert!(matches!(result, Err(ImportError::Constraint(_))));
        // Parent mappings are untouched by the rollback
        assert_eq!(ctx.remapper.len("books"), 2);
    }

    #[test]
    fn test_join_targets() {
        assert_eq!(join_target("role_id"), Some("role"));
        assert_eq!(join_target("shelf_id"), None);
    }
}

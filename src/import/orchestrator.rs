//! Import orchestrator: runs every table in dependency order

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use super::{
    association,
    context::ImportContext,
    regular,
    schema::SchemaRegistry,
    store::ImportStore,
    transform::{DefaultValues, SecretHasher},
};
use crate::{
    error::{ImportError, ImportResult},
    models::import_report::{ImportReport, TableOutcome},
};

/// Tables in the order they are imported; referenced tables come first
pub const IMPORT_ORDER: &[&str] = &[
    "author",
    "publisher",
    "category",
    "role",
    "users",
    "books",
    "physical",
    "digital",
    "physical_loan",
    "digital_loan",
    "rating",
    "reservation",
    "category_book",
    "user_role",
    "author_book",
];

pub const ASSOCIATION_TABLES: &[&str] = &["category_book", "user_role", "author_book"];

const DEFAULT_FILES: &[(&str, &str)] = &[
    ("author", "authors.csv"),
    ("publisher", "publisher.csv"),
    ("category", "category.csv"),
    ("role", "role.csv"),
    ("users", "user.csv"),
    ("books", "books.csv"),
    ("physical", "books_physical.csv"),
    ("digital", "books_digital.csv"),
    ("physical_loan", "loan_physical.csv"),
    ("digital_loan", "loan_digital.csv"),
    ("rating", "rating.csv"),
    ("reservation", "reservation.csv"),
    ("category_book", "category_book.csv"),
    ("user_role", "user_role.csv"),
    ("author_book", "author_books.csv"),
];

/// Canonical (table, file name) pairs of a legacy export directory
pub fn default_files() -> &'static [(&'static str, &'static str)] {
    DEFAULT_FILES
}

/// Map the default files present in `data_dir` to their tables.
///
/// Returns the found files and the names of the missing ones.
pub fn discover_files(data_dir: &Path) -> (HashMap<String, PathBuf>, Vec<String>) {
    let mut found = HashMap::new();
    let mut missing = Vec::new();
    for (table, file) in DEFAULT_FILES {
        let path = data_dir.join(file);
        if path.is_file() {
            found.insert(table.to_string(), path);
        } else {
            missing.push(file.to_string());
        }
    }
    (found, missing)
}

#[derive(Debug, Clone)]
pub struct ImportOptions {
    pub batch_size: usize,
    pub skip_duplicates: bool,
    pub default_values: DefaultValues,
    /// Tables imported with the association importer
    pub association_tables: HashSet<String>,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            batch_size: 1000,
            skip_duplicates: true,
            default_values: DefaultValues::standard(),
            association_tables: ASSOCIATION_TABLES.iter().map(|t| t.to_string()).collect(),
        }
    }
}

pub struct ImportOrchestrator<'a> {
    registry: &'a SchemaRegistry,
    store: &'a dyn ImportStore,
    hasher: &'a dyn SecretHasher,
}

impl<'a> ImportOrchestrator<'a> {
    pub fn new(
        registry: &'a SchemaRegistry,
        store: &'a dyn ImportStore,
        hasher: &'a dyn SecretHasher,
    ) -> Self {
        Self {
            registry,
            store,
            hasher,
        }
    }

    /// Import every file in `files` (table name to CSV path).
    ///
    /// A failing table is recorded in the report and the run moves on to
    /// the next one. Only an invalid order or batch size aborts the run.
    pub async fn import_all(
        &self,
        files: &HashMap<String, PathBuf>,
        options: &ImportOptions,
    ) -> ImportResult<ImportReport> {
        if options.batch_size == 0 {
            return Err(ImportError::InvalidBatchSize);
        }
        self.registry.validate_order(IMPORT_ORDER)?;

        let mut ctx = ImportContext::new(
            self.registry,
            self.store,
            self.hasher,
            &options.default_values,
            options.skip_duplicates,
        );
        let mut report = ImportReport::new();

        tracing::info!("Starting import of {} files", files.len());

        for &table in IMPORT_ORDER {
            let Some(path) = files.get(table) else {
                tracing::debug!("{}: no file, skipping", table);
                continue;
            };

            tracing::info!("{}: importing {}", table, path.display());
            let result = if options.association_tables.contains(table) {
                association::import_table(&mut ctx, table, path, options.batch_size).await
            } else {
                regular::import_table(&mut ctx, table, path, options.batch_size).await
            };

            let outcome = match result {
                Ok(count) => TableOutcome::Imported { count },
                Err(e) => {
                    tracing::error!("{}: import failed: {}", table, e);
                    TableOutcome::Failed {
                        error: e.to_string(),
                    }
                }
            };
            report.record(table, outcome);
        }

        let mut unknown: Vec<&String> = files
            .keys()
            .filter(|table| !IMPORT_ORDER.contains(&table.as_str()))
            .collect();
        unknown.sort();
        for table in unknown {
            tracing::warn!("{}: not part of the import order, ignored", table);
            report.record(
                table.clone(),
                TableOutcome::Failed {
                    error: ImportError::UnknownTable(table.clone()).to_string(),
                },
            );
        }

        tracing::info!("Import finished: {} rows imported", report.total_imported());
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::import::{
        memory::MemoryStore,
        record::Value,
        testing::{write_csv, PlainHasher},
    };

    fn files(entries: &[(&str, PathBuf)]) -> HashMap<String, PathBuf> {
        entries
            .iter()
            .map(|(table, path)| (table.to_string(), path.clone()))
            .collect()
    }

    #[tokio::test]
    async fn test_authors_then_books_remaps_foreign_key() {
        let dir = tempfile::tempdir().unwrap();
        let authors = write_csv(
            dir.path(),
            "authors.csv",
            "first_name;last_name;bio\nUrsula;Le Guin;Writer\nFrank;Herbert;Writer\n",
        );
        let books = write_csv(dir.path(), "books.csv", "isbn;title;author_id\n111;Earthsea;1\n");
        let registry = SchemaRegistry::library().unwrap();
        let store = MemoryStore::new();
        let orchestrator = ImportOrchestrator::new(&registry, &store, &PlainHasher);

        let report = orchestrator
            .import_all(
                &files(&[("author", authors), ("books", books)]),
                &ImportOptions::default(),
            )
            .await
            .unwrap();

        assert_eq!(report.imported("author"), Some(2));
        assert_eq!(report.imported("books"), Some(1));
        let authors = store.rows("author");
        assert_ne!(authors[0].uuid("id"), authors[1].uuid("id"));
        let book = &store.rows("books")[0];
        assert_eq!(book.uuid("author_id"), authors[0].uuid("id"));
    }

    #[tokio::test]
    async fn test_association_without_parents_yields_skips() {
        let dir = tempfile::tempdir().unwrap();
        let links = write_csv(
            dir.path(),
            "author_books.csv",
            "author_id;book_id;primary_author\n1;1;true\n2;1;false\n",
        );
        let registry = SchemaRegistry::library().unwrap();
        let store = MemoryStore::new();
        let orchestrator = ImportOrchestrator::new(&registry, &store, &PlainHasher);

        let report = orchestrator
            .import_all(&files(&[("author_book", links)]), &ImportOptions::default())
            .await
            .unwrap();

        assert_eq!(report.imported("author_book"), Some(0));
        assert_eq!(report.tables.len(), 1);
    }

    #[tokio::test]
    async fn test_skip_duplicates_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let entries = [
            (
                "category",
                write_csv(dir.path(), "category.csv", "name;description\nFiction;F\nScience;S\n"),
            ),
            (
                "books",
                write_csv(dir.path(), "books.csv", "isbn;title\n111;Dune\n222;Cosmos\n"),
            ),
            (
                "category_book",
                write_csv(dir.path(), "category_book.csv", "book_id;category_id\n1;1\n2;2\n"),
            ),
        ];
        let registry = SchemaRegistry::library().unwrap();
        let store = MemoryStore::new();
        let orchestrator = ImportOrchestrator::new(&registry, &store, &PlainHasher);
        let options = ImportOptions::default();

        let first = orchestrator.import_all(&files(&entries), &options).await.unwrap();
        let second = orchestrator.import_all(&files(&entries), &options).await.unwrap();

        assert_eq!(first.total_imported(), 6);
        assert_eq!(second.total_imported(), 0);
        assert_eq!(store.count("category_book"), 2);
    }

    #[tokio::test]
    async fn test_failed_parent_only_drops_references() {
        let dir = tempfile::tempdir().unwrap();
        let authors = write_csv(
            dir.path(),
            "authors.csv",
            "id;first_name;last_name;bio\n1;Ursula;Le Guin;Writer\n1;Frank;Herbert;Writer\n",
        );
        let books = write_csv(
            dir.path(),
            "books.csv",
            "isbn;title;author_id\n111;Earthsea;1\n222;Dune;\n",
        );
        let registry = SchemaRegistry::library().unwrap();
        let store = MemoryStore::new();
        let orchestrator = ImportOrchestrator::new(&registry, &store, &PlainHasher);

        let report = orchestrator
            .import_all(
                &files(&[("author", authors), ("books", books)]),
                &ImportOptions::default(),
            )
            .await
            .unwrap();

        assert!(report.get("author").unwrap().is_failure());
        assert_eq!(store.count("author"), 0);
        // The unsaved author is never referenced
        assert_eq!(report.imported("books"), Some(2));
        let books = store.rows("books");
        assert!(books.iter().all(|b| b.uuid("author_id").is_none()));
    }

    #[tokio::test]
    async fn test_association_batch_failure_recorded() {
        let dir = tempfile::tempdir().unwrap();
        let entries = [
            (
                "category",
                write_csv(dir.path(), "category.csv", "name;description\nFiction;F\n"),
            ),
            (
                "books",
                write_csv(dir.path(), "books.csv", "isbn;title\n111;Dune\n222;Cosmos\n"),
            ),
            (
                // Third row repeats the first key and breaks the second batch
                "category_book",
                write_csv(
                    dir.path(),
                    "category_book.csv",
                    "book_id;category_id\n1;1\n2;1\n1;1\n",
                ),
            ),
        ];
        let registry = SchemaRegistry::library().unwrap();
        let store = MemoryStore::new();
        let orchestrator = ImportOrchestrator::new(&registry, &store, &PlainHasher);
        let options = ImportOptions {
            batch_size: 2,
            skip_duplicates: false,
            ..ImportOptions::default()
        };

        let report = orchestrator.import_all(&files(&entries), &options).await.unwrap();

        assert_eq!(report.imported("books"), Some(2));
        assert!(report.get("category_book").unwrap().is_failure());
        assert_eq!(store.count("category_book"), 2);
    }

    #[tokio::test]
    async fn test_failed_table_does_not_stop_run() {
        let dir = tempfile::tempdir().unwrap();
        // Duplicate explicit ids make the role table fail
        let roles = write_csv(dir.path(), "role.csv", "id;name;description\n1;a;A\n1;b;B\n");
        let categories = write_csv(dir.path(), "category.csv", "name;description\nFiction;F\n");
        let registry = SchemaRegistry::library().unwrap();
        let store = MemoryStore::new();
        let orchestrator = ImportOrchestrator::new(&registry, &store, &PlainHasher);
        let options = ImportOptions {
            skip_duplicates: false,
            ..ImportOptions::default()
        };

        let report = orchestrator
            .import_all(
                &files(&[
                    ("role", roles),
                    ("category", categories),
                    ("borrow", dir.path().join("borrow.csv")),
                ]),
                &options,
            )
            .await
            .unwrap();

        assert_eq!(report.imported("category"), Some(1));
        assert!(report.get("role").unwrap().is_failure());
        assert!(report.get("borrow").unwrap().is_failure());
        let order: Vec<&str> = report.tables.keys().map(String::as_str).collect();
        assert_eq!(order, vec!["category", "role", "borrow"]);
    }

    #[tokio::test]
    async fn test_zero_batch_size_rejected() {
        let registry = SchemaRegistry::library().unwrap();
        let store = MemoryStore::new();
        let orchestrator = ImportOrchestrator::new(&registry, &store, &PlainHasher);
        let options = ImportOptions {
            batch_size: 0,
            ..ImportOptions::default()
        };

        let result = orchestrator.import_all(&HashMap::new(), &options).await;
        assert!(matches!(result, Err(ImportError::InvalidBatchSize)));
    }

    #[tokio::test]
    async fn test_custom_defaults_apply() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_csv(dir.path(), "books.csv", "isbn;title\n111;Dune\n");
        let registry = SchemaRegistry::library().unwrap();
        let store = MemoryStore::new();
        let orchestrator = ImportOrchestrator::new(&registry, &store, &PlainHasher);
        let mut options = ImportOptions::default();
        options.default_values.set(
            "books",
            "total_quantity",
            crate::import::transform::DefaultValue::Static(Value::Integer(5)),
        );

        orchestrator
            .import_all(&files(&[("books", path)]), &options)
            .await
            .unwrap();

        let book = &store.rows("books")[0];
        assert_eq!(book.get("total_quantity"), Some(&Value::Integer(5)));
        assert_eq!(book.get("current_quantity"), Some(&Value::Integer(1)));
    }

    #[test]
    fn test_discover_files_lists_missing() {
        let dir = tempfile::tempdir().unwrap();
        write_csv(dir.path(), "authors.csv", "first_name\nA\n");
        write_csv(dir.path(), "user_role.csv", "user_id;role_id\n");

        let (found, missing) = discover_files(dir.path());

        assert_eq!(found.len(), 2);
        assert!(found.contains_key("author"));
        assert!(found.contains_key("user_role"));
        assert_eq!(missing.len(), DEFAULT_FILES.len() - 2);
        assert!(missing.contains(&"books.csv".to_string()));
    }

    #[test]
    fn test_default_files_follow_import_order() {
        let tables: Vec<&str> = default_files().iter().map(|(t, _)| *t).collect();
        assert_eq!(tables, IMPORT_ORDER);
    }
}

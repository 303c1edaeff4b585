//! Bulk CSV import service

use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use utoipa::ToSchema;

use crate::{
    config::ImportConfig,
    error::{AppError, AppResult},
    import::{
        discover_files, memory::MemoryStore, schema::SchemaRegistry, ImportOptions,
        ImportOrchestrator,
    },
    models::import_report::ImportReport,
    repository::Repository,
    services::auth::Argon2Hasher,
};

/// Overrides accepted by the import endpoint
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct ImportRequest {
    pub batch_size: Option<usize>,
    pub skip_duplicates: Option<bool>,
    /// Run against an in-memory store, nothing is written
    #[serde(default)]
    pub dry_run: bool,
}

#[derive(Clone)]
pub struct ImportService {
    repository: Repository,
    config: ImportConfig,
    registry: Arc<SchemaRegistry>,
}

impl ImportService {
    pub fn new(repository: Repository, config: ImportConfig) -> AppResult<Self> {
        Ok(Self {
            repository,
            config,
            registry: Arc::new(SchemaRegistry::library()?),
        })
    }

    /// Import options from the `[import]` config section, with overrides
    pub fn options(&self, batch_size: Option<usize>, skip_duplicates: Option<bool>) -> ImportOptions {
        ImportOptions {
            batch_size: batch_size.unwrap_or(self.config.batch_size),
            skip_duplicates: skip_duplicates.unwrap_or(self.config.skip_duplicates),
            ..ImportOptions::default()
        }
    }

    /// Import `files` (table to CSV path) into the database, or into a
    /// throwaway in-memory store when `dry_run` is set
    pub async fn import_files(
        &self,
        files: &HashMap<String, PathBuf>,
        options: &ImportOptions,
        dry_run: bool,
    ) -> AppResult<ImportReport> {
        let hasher = Argon2Hasher;
        let report = if dry_run {
            tracing::info!("Dry run: rows are validated in memory only");
            let store = MemoryStore::new();
            ImportOrchestrator::new(&self.registry, &store, &hasher)
                .import_all(files, options)
                .await?
        } else {
            ImportOrchestrator::new(&self.registry, &self.repository.import, &hasher)
                .import_all(files, options)
                .await?
        };
        Ok(report)
    }

    /// Import the default files found in the configured data directory
    pub async fn run(&self, request: &ImportRequest) -> AppResult<ImportReport> {
        let (files, missing) = discover_files(&self.config.data_dir);
        if !missing.is_empty() {
            tracing::warn!("Missing import files: {}", missing.join(", "));
        }
        if files.is_empty() {
            return Err(AppError::BadRequest(format!(
                "No import files found in {}",
                self.config.data_dir.display()
            )));
        }

        let options = self.options(request.batch_size, request.skip_duplicates);
        self.import_files(&files, &options, request.dry_run).await
    }

    /// Drop and recreate every table of the library schema
    pub async fn init_database(&self) -> AppResult<usize> {
        self.repository.schema.reset(&self.registry).await
    }
}

//! Persistence seam used by the importers

use async_trait::async_trait;
use uuid::Uuid;

use super::{record::ImportRecord, schema::EntityDefinition};
use crate::error::ImportResult;

/// Destination of an import run.
///
/// `insert_batch` is the commit boundary: every record of the batch is
/// persisted or none is.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ImportStore: Send + Sync {
    async fn insert_batch(
        &self,
        definition: &EntityDefinition,
        records: &[ImportRecord],
    ) -> ImportResult<()>;

    /// Primary key of the row whose `column` equals `value`, if any
    async fn find_by_natural_key(
        &self,
        definition: &EntityDefinition,
        column: &str,
        value: &str,
    ) -> ImportResult<Option<Uuid>>;

    async fn row_exists(&self, definition: &EntityDefinition, id: Uuid) -> ImportResult<bool>;

    /// Whether an association row with this composite key is already stored
    async fn association_exists(
        &self,
        definition: &EntityDefinition,
        key: &[(&'static str, Uuid)],
    ) -> ImportResult<bool>;
}

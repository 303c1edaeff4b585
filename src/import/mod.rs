//! Bulk CSV import of legacy exports into the library schema.
//!
//! Legacy files carry numeric ids; the schema uses UUID surrogates. Tables
//! are imported in dependency order and every foreign key is rewritten
//! through the run's [`IdRemapper`] as rows stream in.
//!
//! ```text
//! ImportOrchestrator
//!   -> regular / association importer (one table)
//!     -> RowTransformer (one row) -> IdRemapper
//!     -> ImportStore (one batch)
//! ```

pub mod association;
pub mod context;
pub mod memory;
pub mod orchestrator;
pub mod reader;
pub mod record;
pub mod regular;
pub mod remap;
pub mod schema;
pub mod store;
pub mod transform;

pub use context::ImportContext;
pub use memory::MemoryStore;
pub use orchestrator::{discover_files, ImportOptions, ImportOrchestrator, IMPORT_ORDER};
pub use record::{ImportRecord, RawRow, Value};
pub use remap::{IdRemapper, LegacyId};
pub use schema::{ColumnDef, ColumnKind, EntityDefinition, SchemaRegistry};
pub use store::ImportStore;
pub use transform::{DefaultValue, DefaultValues, RowTransformer, SecretHasher};

//! Row transformer: one raw CSV row to one typed import record

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use rand::{distributions::Alphanumeric, Rng};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use super::{
    record::{ImportRecord, RawRow, Value},
    remap::{IdRemapper, LegacyId},
    schema::{ColumnDef, ColumnKind, EntityDefinition, SchemaRegistry},
};
use crate::error::{ImportError, ImportResult};

/// Key in [`DefaultValues`] whose entries apply to every table
pub const ALL_TABLES: &str = "__all__";

const GENERATED_SECRET_LEN: usize = 24;

/// One-way hashing of secret columns (passwords)
pub trait SecretHasher: Send + Sync {
    fn hash(&self, plain: &str) -> ImportResult<String>;
}

/// Value used to fill a column the CSV left empty
#[derive(Clone)]
pub enum DefaultValue {
    Static(Value),
    Generated(Arc<dyn Fn() -> Value + Send + Sync>),
}

impl DefaultValue {
    pub fn generated(f: impl Fn() -> Value + Send + Sync + 'static) -> Self {
        DefaultValue::Generated(Arc::new(f))
    }

    pub fn produce(&self) -> Value {
        match self {
            DefaultValue::Static(value) => value.clone(),
            DefaultValue::Generated(f) => f(),
        }
    }
}

impl std::fmt::Debug for DefaultValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DefaultValue::Static(value) => f.debug_tuple("Static").field(value).finish(),
            DefaultValue::Generated(_) => f.write_str("Generated(..)"),
        }
    }
}

/// Per-table default values, with [`ALL_TABLES`] as fallback
#[derive(Debug, Clone, Default)]
pub struct DefaultValues {
    entries: HashMap<String, HashMap<String, DefaultValue>>,
}

impl DefaultValues {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults used by the CLI and the import endpoint
    pub fn standard() -> Self {
        let now = || DefaultValue::generated(|| Value::Timestamp(Utc::now().naive_utc()));
        Self::new()
            .with(ALL_TABLES, "created_at", now())
            .with(ALL_TABLES, "updated_at", now())
            .with("users", "last_login", now())
            .with("users", "is_active", DefaultValue::Static(Value::Boolean(true)))
            .with("digital", "license_expiration", now())
            .with("books", "current_quantity", DefaultValue::Static(Value::Integer(1)))
            .with("books", "total_quantity", DefaultValue::Static(Value::Integer(1)))
            .with("author_book", "primary_author", DefaultValue::Static(Value::Boolean(false)))
    }

    pub fn with(mut self, table: &str, column: &str, value: DefaultValue) -> Self {
        self.set(table, column, value);
        self
    }

    pub fn set(&mut self, table: &str, column: &str, value: DefaultValue) {
        self.entries
            .entry(table.to_string())
            .or_default()
            .insert(column.to_string(), value);
    }

    pub fn lookup(&self, table: &str, column: &str) -> Option<&DefaultValue> {
        self.entries
            .get(table)
            .and_then(|columns| columns.get(column))
            .or_else(|| self.entries.get(ALL_TABLES).and_then(|columns| columns.get(column)))
    }

    /// Fill every known column that is still absent or null
    pub fn apply(&self, definition: &EntityDefinition, record: &mut ImportRecord) {
        for column in &definition.columns {
            if Some(column.name) == definition.primary_key || column.secret {
                continue;
            }
            if record.is_missing(column.name) {
                if let Some(default) = self.lookup(definition.name, column.name) {
                    record.insert(column.name, default.produce());
                }
            }
        }
    }
}

/// Output of [`RowTransformer::transform`]
#[derive(Debug)]
pub struct TransformedRow {
    pub record: ImportRecord,
    /// Field-level problems that nulled or dropped a column
    pub issues: Vec<ImportError>,
}

pub struct RowTransformer<'a> {
    registry: &'a SchemaRegistry,
    hasher: &'a dyn SecretHasher,
    defaults: &'a DefaultValues,
}

impl<'a> RowTransformer<'a> {
    pub fn new(
        registry: &'a SchemaRegistry,
        hasher: &'a dyn SecretHasher,
        defaults: &'a DefaultValues,
    ) -> Self {
        Self {
            registry,
            hasher,
            defaults,
        }
    }

    /// Transform `raw` into a record for `definition`.
    ///
    /// The surrogate key is assigned last, once the row is known to be
    /// viable, so rejected rows never leave an entry in the remapper.
    pub fn transform(
        &self,
        definition: &EntityDefinition,
        raw: &RawRow,
        legacy: LegacyId,
        remapper: &mut IdRemapper,
    ) -> ImportResult<TransformedRow> {
        let foreign_keys = self.registry.foreign_keys_of(definition.name)?;
        let mut record = ImportRecord::new();
        let mut issues = Vec::new();

        for (header, value) in raw {
            let Some(column) = definition.column_named(header) else {
                continue;
            };
            if Some(column.name) == definition.primary_key {
                continue;
            }

            let trimmed = value.trim();
            if trimmed.is_empty() {
                record.insert(column.name, Value::Null);
                continue;
            }

            if column.secret {
                record.insert(column.name, Value::Text(self.hasher.hash(trimmed)?));
                continue;
            }

            if let Some(&target) = foreign_keys.get(column.name) {
                match resolve_reference(column, trimmed, target, remapper) {
                    Ok(id) => record.insert(column.name, Value::Uuid(id)),
                    Err(e) => {
                        tracing::warn!(
                            "{} row {}: dropping {}: {}",
                            definition.name, legacy, column.name, e
                        );
                        issues.push(e);
                    }
                }
                continue;
            }

            match coerce(column, trimmed) {
                Ok(value) => record.insert(column.name, value),
                Err(e) => {
                    tracing::warn!(
                        "{} row {}: nulling {}: {}",
                        definition.name, legacy, column.name, e
                    );
                    record.insert(column.name, Value::Null);
                    issues.push(e);
                }
            }
        }

        for column in definition.columns.iter().filter(|c| c.secret) {
            if record.is_missing(column.name) {
                let digest = self.hasher.hash(&random_secret())?;
                record.insert(column.name, Value::Text(digest));
            }
        }

        self.defaults.apply(definition, &mut record);
        check_required(definition, &record)?;

        if let Some(pk) = definition.primary_key {
            let surrogate = remapper.assign(definition.name, legacy)?;
            record.insert(pk, Value::Uuid(surrogate));
        }

        Ok(TransformedRow { record, issues })
    }
}

/// Parse a legacy reference and map it through the remapper
pub fn resolve_reference(
    column: &ColumnDef,
    raw: &str,
    target: &str,
    remapper: &IdRemapper,
) -> ImportResult<Uuid> {
    let legacy = raw.trim().parse::<i64>().map_err(|_| invalid(column, raw))?;
    remapper.resolve(target, LegacyId(legacy))
}

/// Coerce a scalar literal according to the column kind
pub fn coerce(column: &ColumnDef, raw: &str) -> ImportResult<Value> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(Value::Null);
    }

    match column.kind {
        ColumnKind::String => Ok(Value::Text(raw.to_string())),
        ColumnKind::Integer => raw
            .parse::<i64>()
            .map(Value::Integer)
            .map_err(|_| invalid(column, raw)),
        ColumnKind::Boolean => {
            if raw.eq_ignore_ascii_case("true") {
                Ok(Value::Boolean(true))
            } else if raw.eq_ignore_ascii_case("false") {
                Ok(Value::Boolean(false))
            } else {
                Err(invalid(column, raw))
            }
        }
        ColumnKind::Enum(kind) => kind
            .parse(raw)
            .map(|literal| Value::Text(literal.to_string()))
            .ok_or_else(|| invalid(column, raw)),
        ColumnKind::Timestamp => parse_timestamp(raw)
            .map(Value::Timestamp)
            .ok_or_else(|| invalid(column, raw)),
        ColumnKind::Date => NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .map(Value::Date)
            .map_err(|_| invalid(column, raw)),
        ColumnKind::Uuid => Uuid::parse_str(raw)
            .map(Value::Uuid)
            .map_err(|_| invalid(column, raw)),
        // References go through the remapper, never through plain coercion
        ColumnKind::ForeignKey(_) => Err(invalid(column, raw)),
    }
}

pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    const FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M"];

    FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .or_else(|| DateTime::parse_from_rfc3339(raw).ok().map(|dt| dt.naive_utc()))
        .or_else(|| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
}

/// Reject rows that still lack a value for a NOT NULL column
pub fn check_required(definition: &EntityDefinition, record: &ImportRecord) -> ImportResult<()> {
    for column in &definition.columns {
        if column.nullable || Some(column.name) == definition.primary_key {
            continue;
        }
        if record.is_missing(column.name) {
            return Err(ImportError::MissingColumn {
                table: definition.name.to_string(),
                column: column.name.to_string(),
            });
        }
    }
    Ok(())
}

pub fn random_secret() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(GENERATED_SECRET_LEN)
        .map(char::from)
        .collect()
}

fn invalid(column: &ColumnDef, raw: &str) -> ImportError {
    ImportError::InvalidLiteral {
        column: column.name.to_string(),
        value: raw.to_string(),
        expected: column.kind.expected(),
    }
}

//! Schema registry: explicit column metadata for every importable table.
//!
//! Column kinds drive both CSV coercion and the DDL emitted by
//! `init-database`, so the registry is the single place where the library
//! schema is described.

use indexmap::IndexMap;
use std::collections::{HashMap, HashSet};

use crate::{
    error::{ImportError, ImportResult},
    models::enums::{BookStatus, FileFormat, LicenseType, LoanStatus, ReservationStatus},
};

/// Domain enum backing an enum-typed column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnumKind {
    BookStatus,
    FileFormat,
    LicenseType,
    LoanStatus,
    ReservationStatus,
}

impl EnumKind {
    pub fn name(&self) -> &'static str {
        match self {
            EnumKind::BookStatus => "BookStatus",
            EnumKind::FileFormat => "FileFormat",
            EnumKind::LicenseType => "LicenseType",
            EnumKind::LoanStatus => "LoanStatus",
            EnumKind::ReservationStatus => "ReservationStatus",
        }
    }

    /// Build the enum member from a literal, returning its canonical form
    pub fn parse(&self, literal: &str) -> Option<&'static str> {
        match self {
            EnumKind::BookStatus => literal.parse::<BookStatus>().ok().map(|v| v.as_str()),
            EnumKind::FileFormat => literal.parse::<FileFormat>().ok().map(|v| v.as_str()),
            EnumKind::LicenseType => literal.parse::<LicenseType>().ok().map(|v| v.as_str()),
            EnumKind::LoanStatus => literal.parse::<LoanStatus>().ok().map(|v| v.as_str()),
            EnumKind::ReservationStatus => {
                literal.parse::<ReservationStatus>().ok().map(|v| v.as_str())
            }
        }
    }

    pub fn literals(&self) -> Vec<&'static str> {
        match self {
            EnumKind::BookStatus => BookStatus::ALL.iter().map(|v| v.as_str()).collect(),
            EnumKind::FileFormat => FileFormat::ALL.iter().map(|v| v.as_str()).collect(),
            EnumKind::LicenseType => LicenseType::ALL.iter().map(|v| v.as_str()).collect(),
            EnumKind::LoanStatus => LoanStatus::ALL.iter().map(|v| v.as_str()).collect(),
            EnumKind::ReservationStatus => {
                ReservationStatus::ALL.iter().map(|v| v.as_str()).collect()
            }
        }
    }
}

/// Semantic type of a destination column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Uuid,
    String,
    Integer,
    Boolean,
    Enum(EnumKind),
    Timestamp,
    Date,
    /// Reference to the primary key of the named table
    ForeignKey(&'static str),
}

impl ColumnKind {
    pub fn sql_type(&self) -> &'static str {
        match self {
            ColumnKind::Uuid | ColumnKind::ForeignKey(_) => "UUID",
            ColumnKind::String | ColumnKind::Enum(_) => "TEXT",
            ColumnKind::Integer => "BIGINT",
            ColumnKind::Boolean => "BOOLEAN",
            ColumnKind::Timestamp => "TIMESTAMP",
            ColumnKind::Date => "DATE",
        }
    }

    /// Human label used in literal errors
    pub fn expected(&self) -> &'static str {
        match self {
            ColumnKind::Uuid => "uuid",
            ColumnKind::String => "string",
            ColumnKind::Integer => "integer",
            ColumnKind::Boolean => "boolean",
            ColumnKind::Enum(kind) => kind.name(),
            ColumnKind::Timestamp => "timestamp",
            ColumnKind::Date => "date",
            ColumnKind::ForeignKey(_) => "legacy id",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ColumnDef {
    pub name: &'static str,
    pub kind: ColumnKind,
    pub nullable: bool,
    pub unique: bool,
    /// Hashed before persisting, never stored in clear
    pub secret: bool,
    /// Alternative CSV header accepted for this column
    pub alias: Option<&'static str>,
}

impl ColumnDef {
    pub fn new(name: &'static str, kind: ColumnKind) -> Self {
        Self {
            name,
            kind,
            nullable: true,
            unique: false,
            secret: false,
            alias: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn secret(mut self, alias: &'static str) -> Self {
        self.secret = true;
        self.alias = Some(alias);
        self
    }

    fn definition_sql(&self, primary_key: bool) -> String {
        let mut sql = format!("{} {}", quote_ident(self.name), self.kind.sql_type());
        if primary_key {
            sql.push_str(" PRIMARY KEY");
        } else if !self.nullable {
            sql.push_str(" NOT NULL");
        }
        if self.unique {
            sql.push_str(" UNIQUE");
        }
        match self.kind {
            ColumnKind::ForeignKey(table) => {
                sql.push_str(&format!(" REFERENCES {} (\"id\")", quote_ident(table)));
            }
            ColumnKind::Enum(kind) => {
                let literals: Vec<String> =
                    kind.literals().iter().map(|l| format!("'{}'", l)).collect();
                sql.push_str(&format!(
                    " CHECK ({} IN ({}))",
                    quote_ident(self.name),
                    literals.join(", ")
                ));
            }
            _ => {}
        }
        sql
    }
}

/// Destination table description
#[derive(Debug, Clone)]
pub struct EntityDefinition {
    pub name: &'static str,
    pub columns: Vec<ColumnDef>,
    /// Surrogate key column; `None` for association tables (composite key)
    pub primary_key: Option<&'static str>,
    /// Column used for duplicate detection
    pub natural_key: Option<&'static str>,
    lookup: HashMap<&'static str, usize>,
    foreign_keys: IndexMap<&'static str, &'static str>,
}

impl EntityDefinition {
    /// Entity with a UUID surrogate key named `id`
    pub fn entity(name: &'static str) -> Self {
        Self::bare(name, Some("id")).column(ColumnDef::new("id", ColumnKind::Uuid).required())
    }

    /// Many-to-many join table keyed by its foreign keys
    pub fn association(name: &'static str) -> Self {
        Self::bare(name, None)
    }

    fn bare(name: &'static str, primary_key: Option<&'static str>) -> Self {
        Self {
            name,
            columns: Vec::new(),
            primary_key,
            natural_key: None,
            lookup: HashMap::new(),
            foreign_keys: IndexMap::new(),
        }
    }

    pub fn column(mut self, column: ColumnDef) -> Self {
        let index = self.columns.len();
        self.lookup.insert(column.name, index);
        if let Some(alias) = column.alias {
            self.lookup.insert(alias, index);
        }
        if let ColumnKind::ForeignKey(table) = column.kind {
            self.foreign_keys.insert(column.name, table);
        }
        self.columns.push(column);
        self
    }

    pub fn natural_key(mut self, column: &'static str) -> Self {
        self.natural_key = Some(column);
        self
    }

    fn with_timestamps(self) -> Self {
        self.column(ColumnDef::new("created_at", ColumnKind::Timestamp).required())
            .column(ColumnDef::new("updated_at", ColumnKind::Timestamp).required())
    }

    /// Look up a column by name or alias
    pub fn column_named(&self, name: &str) -> Option<&ColumnDef> {
        self.lookup.get(name).map(|&index| &self.columns[index])
    }

    /// Foreign-key column to referenced table
    pub fn foreign_keys(&self) -> &IndexMap<&'static str, &'static str> {
        &self.foreign_keys
    }

    pub fn is_association(&self) -> bool {
        self.primary_key.is_none()
    }

    /// Columns forming the primary key
    pub fn key_columns(&self) -> Vec<&'static str> {
        match self.primary_key {
            Some(pk) => vec![pk],
            None => self.foreign_keys.keys().copied().collect(),
        }
    }

    pub fn create_statement(&self) -> String {
        let mut parts: Vec<String> = self
            .columns
            .iter()
            .map(|c| c.definition_sql(Some(c.name) == self.primary_key))
            .collect();
        if self.is_association() {
            let keys: Vec<String> = self.key_columns().iter().map(|k| quote_ident(k)).collect();
            parts.push(format!("PRIMARY KEY ({})", keys.join(", ")));
        }
        format!(
            "CREATE TABLE {} (\n    {}\n)",
            quote_ident(self.name),
            parts.join(",\n    ")
        )
    }
}

pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Registry of entity definitions, in declaration order
#[derive(Debug, Clone)]
pub struct SchemaRegistry {
    tables: IndexMap<&'static str, EntityDefinition>,
}

impl SchemaRegistry {
    /// Build a registry, checking that every foreign key targets a known table
    pub fn new(definitions: Vec<EntityDefinition>) -> ImportResult<Self> {
        let tables: IndexMap<&'static str, EntityDefinition> =
            definitions.into_iter().map(|d| (d.name, d)).collect();

        for definition in tables.values() {
            for (column, target) in definition.foreign_keys() {
                if !tables.contains_key(target) {
                    return Err(ImportError::UnknownTable(format!(
                        "{} (referenced by {}.{})",
                        target, definition.name, column
                    )));
                }
            }
        }

        Ok(Self { tables })
    }

    pub fn resolve(&self, table: &str) -> ImportResult<&EntityDefinition> {
        self.tables
            .get(table)
            .ok_or_else(|| ImportError::UnknownTable(table.to_string()))
    }

    pub fn foreign_keys_of(&self, table: &str) -> ImportResult<&IndexMap<&'static str, &'static str>> {
        Ok(self.resolve(table)?.foreign_keys())
    }

    pub fn tables(&self) -> impl Iterator<Item = &EntityDefinition> {
        self.tables.values()
    }

    /// Check that `order` imports every referenced table before its dependents
    pub fn validate_order(&self, order: &[&str]) -> ImportResult<()> {
        let mut seen: HashSet<&str> = HashSet::new();
        for &table in order {
            let definition = self.resolve(table)?;
            for (column, target) in definition.foreign_keys() {
                if *target != table && !seen.contains(target) {
                    return Err(ImportError::InvalidImportOrder(format!(
                        "{}.{} references {} which is not imported before it",
                        table, column, target
                    )));
                }
            }
            if !seen.insert(table) {
                return Err(ImportError::InvalidImportOrder(format!(
                    "{} appears more than once",
                    table
                )));
            }
        }
        Ok(())
    }

    pub fn create_statements(&self) -> Vec<String> {
        self.tables.values().map(|d| d.create_statement()).collect()
    }

    pub fn drop_statements(&self) -> Vec<String> {
        self.tables
            .values()
            .rev()
            .map(|d| format!("DROP TABLE IF EXISTS {} CASCADE", quote_ident(d.name)))
            .collect()
    }

    /// The library schema
    pub fn library() -> ImportResult<Self> {
        use ColumnKind::*;

        let loan_columns = |definition: EntityDefinition| {
            definition
                .column(ColumnDef::new("loan_date", Timestamp).required())
                .column(ColumnDef::new("due_date", Timestamp).required())
                .column(ColumnDef::new("status", Enum(EnumKind::LoanStatus)).required())
                .column(ColumnDef::new("user_id", ForeignKey("users")).required())
        };

        Self::new(vec![
            EntityDefinition::entity("author")
                .column(ColumnDef::new("first_name", String).required())
                .column(ColumnDef::new("last_name", String).required())
                .column(ColumnDef::new("bio", String).required())
                .column(ColumnDef::new("birth_date", Date))
                .column(ColumnDef::new("death_date", Date))
                .with_timestamps(),
            EntityDefinition::entity("publisher")
                .column(ColumnDef::new("name", String).required())
                .column(ColumnDef::new("address", String).required())
                .column(ColumnDef::new("phone", String))
                .column(ColumnDef::new("email", String))
                .column(ColumnDef::new("website", String).required())
                .with_timestamps(),
            EntityDefinition::entity("category")
                .column(ColumnDef::new("name", String).required())
                .column(ColumnDef::new("description", String).required())
                .natural_key("name")
                .with_timestamps(),
            EntityDefinition::entity("role")
                .column(ColumnDef::new("name", String).required())
                .column(ColumnDef::new("description", String).required())
                .natural_key("name")
                .with_timestamps(),
            EntityDefinition::entity("users")
                .column(ColumnDef::new("username", String).required().unique())
                .column(ColumnDef::new("first_name", String))
                .column(ColumnDef::new("last_name", String))
                .column(ColumnDef::new("email", String).required().unique())
                .column(ColumnDef::new("password_hash", String).required().secret("password"))
                .column(ColumnDef::new("phone", String))
                .column(ColumnDef::new("address", String))
                .column(ColumnDef::new("is_active", Boolean))
                .column(ColumnDef::new("last_login", Timestamp).required())
                .natural_key("username")
                .with_timestamps(),
            EntityDefinition::entity("books")
                .column(ColumnDef::new("isbn", String).required())
                .column(ColumnDef::new("title", String).required())
                .column(ColumnDef::new("author", String))
                .column(ColumnDef::new("author_id", ForeignKey("author")))
                .column(ColumnDef::new("publisher", String))
                .column(ColumnDef::new("publisher_id", ForeignKey("publisher")))
                .column(ColumnDef::new("published_year", Integer))
                .column(ColumnDef::new("current_quantity", Integer).required())
                .column(ColumnDef::new("total_quantity", Integer).required())
                .column(ColumnDef::new("image_url_s", String))
                .column(ColumnDef::new("image_url_m", String))
                .column(ColumnDef::new("image_url_l", String))
                .natural_key("isbn")
                .with_timestamps(),
            EntityDefinition::entity("physical")
                .column(ColumnDef::new("barcode", String).required().unique())
                .column(ColumnDef::new("shelf_location", String).required())
                .column(ColumnDef::new("status", Enum(EnumKind::BookStatus)))
                .column(ColumnDef::new("book_id", ForeignKey("books")))
                .natural_key("barcode")
                .with_timestamps(),
            EntityDefinition::entity("digital")
                .column(ColumnDef::new("file_format", Enum(EnumKind::FileFormat)))
                .column(ColumnDef::new("file_url", String).required())
                .column(ColumnDef::new("status", Enum(EnumKind::BookStatus)))
                .column(ColumnDef::new("license_type", Enum(EnumKind::LicenseType)).required())
                .column(ColumnDef::new("license_expiration", Timestamp).required())
                .column(ColumnDef::new("book_id", ForeignKey("books")))
                .with_timestamps(),
            loan_columns(EntityDefinition::entity("physical_loan"))
                .column(ColumnDef::new("return_date", Timestamp))
                .column(ColumnDef::new("book_id", ForeignKey("physical")).required())
                .with_timestamps(),
            loan_columns(EntityDefinition::entity("digital_loan"))
                .column(ColumnDef::new("access_token", String).required())
                .column(ColumnDef::new("book_id", ForeignKey("digital")).required())
                .with_timestamps(),
            EntityDefinition::entity("rating")
                .column(ColumnDef::new("rating", Integer).required())
                .column(ColumnDef::new("review_date", Timestamp).required())
                .column(ColumnDef::new("comment", String).required())
                .column(ColumnDef::new("is_approved", Boolean))
                .column(ColumnDef::new("user_id", ForeignKey("users")))
                .column(ColumnDef::new("book_id", ForeignKey("books")))
                .with_timestamps(),
            EntityDefinition::entity("reservation")
                .column(ColumnDef::new("reservation_date", Timestamp).required())
                .column(ColumnDef::new("expiration_date", Timestamp).required())
                .column(ColumnDef::new("status", Enum(EnumKind::ReservationStatus)).required())
                .column(ColumnDef::new("position", Integer).required())
                .column(ColumnDef::new("user_id", ForeignKey("users")))
                .column(ColumnDef::new("book_id", ForeignKey("books")))
                .with_timestamps(),
            EntityDefinition::association("category_book")
                .column(ColumnDef::new("book_id", ForeignKey("books")).required())
                .column(ColumnDef::new("category_id", ForeignKey("category")).required()),
            EntityDefinition::association("user_role")
                .column(ColumnDef::new("user_id", ForeignKey("users")).required())
                .column(ColumnDef::new("role_id", ForeignKey("role")).required()),
            EntityDefinition::association("author_book")
                .column(ColumnDef::new("author_id", ForeignKey("author")).required())
                .column(ColumnDef::new("book_id", ForeignKey("books")).required())
                .column(ColumnDef::new("primary_author", Boolean).required()),
        ])
    }
}

//! Postgres destination for the CSV import pipeline

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use sqlx::{query_builder::Separated, Pool, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::{
    error::ImportResult,
    import::{
        record::{ImportRecord, Value},
        schema::{quote_ident, ColumnKind, EntityDefinition},
        store::ImportStore,
    },
};

/// Postgres caps a statement at 65535 bind parameters
const MAX_BIND_PARAMS: usize = 65_535;

#[derive(Clone)]
pub struct ImportRepository {
    pool: Pool<Postgres>,
}

impl ImportRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

/// Rows per INSERT statement for a table with `columns` columns
pub(crate) fn rows_per_statement(columns: usize) -> usize {
    (MAX_BIND_PARAMS / columns.max(1)).max(1)
}

fn push_value(
    separated: &mut Separated<'_, '_, Postgres, &'static str>,
    kind: ColumnKind,
    value: Option<&Value>,
) {
    match value.unwrap_or(&Value::Null) {
        Value::Text(s) => separated.push_bind(s.clone()),
        Value::Integer(v) => separated.push_bind(*v),
        Value::Boolean(v) => separated.push_bind(*v),
        Value::Timestamp(v) => separated.push_bind(*v),
        Value::Date(v) => separated.push_bind(*v),
        Value::Uuid(v) => separated.push_bind(*v),
        // Nulls still need the column's type for Postgres to accept the bind
        Value::Null => match kind {
            ColumnKind::Uuid | ColumnKind::ForeignKey(_) => separated.push_bind(None::<Uuid>),
            ColumnKind::String | ColumnKind::Enum(_) => separated.push_bind(None::<String>),
            ColumnKind::Integer => separated.push_bind(None::<i64>),
            ColumnKind::Boolean => separated.push_bind(None::<bool>),
            ColumnKind::Timestamp => separated.push_bind(None::<NaiveDateTime>),
            ColumnKind::Date => separated.push_bind(None::<NaiveDate>),
        },
    };
}

#[async_trait]
impl ImportStore for ImportRepository {
    async fn insert_batch(
        &self,
        definition: &EntityDefinition,
        records: &[ImportRecord],
    ) -> ImportResult<()> {
        if records.is_empty() {
            return Ok(());
        }

        let columns: Vec<String> = definition.columns.iter().map(|c| quote_ident(c.name)).collect();
        let header = format!(
            "INSERT INTO {} ({}) ",
            quote_ident(definition.name),
            columns.join(", ")
        );

        // Dropping the transaction on error rolls the whole batch back
        let mut tx = self.pool.begin().await?;
        for chunk in records.chunks(rows_per_statement(columns.len())) {
            let mut builder = QueryBuilder::<Postgres>::new(&header);
            builder.push_values(chunk, |mut row, record| {
                for column in &definition.columns {
                    push_value(&mut row, column.kind, record.get(column.name));
                }
            });
            builder.build().execute(&mut *tx).await?;
        }
        tx.commit().await?;

        Ok(())
    }

    async fn find_by_natural_key(
        &self,
        definition: &EntityDefinition,
        column: &str,
        value: &str,
    ) -> ImportResult<Option<Uuid>> {
        let pk = definition.primary_key.unwrap_or("id");
        let sql = format!(
            "SELECT {} FROM {} WHERE {} = $1 LIMIT 1",
            quote_ident(pk),
            quote_ident(definition.name),
            quote_ident(column)
        );
        let id: Option<Uuid> = sqlx::query_scalar(&sql)
            .bind(value)
            .fetch_optional(&self.pool)
            .await?;
        Ok(id)
    }

    async fn row_exists(&self, definition: &EntityDefinition, id: Uuid) -> ImportResult<bool> {
        let pk = definition.primary_key.unwrap_or("id");
        let sql = format!(
            "SELECT EXISTS(SELECT 1 FROM {} WHERE {} = $1)",
            quote_ident(definition.name),
            quote_ident(pk)
        );
        let exists: bool = sqlx::query_scalar(&sql).bind(id).fetch_one(&self.pool).await?;
        Ok(exists)
    }

    async fn association_exists(
        &self,
        definition: &EntityDefinition,
        key: &[(&'static str, Uuid)],
    ) -> ImportResult<bool> {
        let mut builder = QueryBuilder::<Postgres>::new("SELECT EXISTS(SELECT 1 FROM ");
        builder.push(quote_ident(definition.name)).push(" WHERE 1=1");
        for (column, id) in key {
            builder
                .push(" AND ")
                .push(quote_ident(column))
                .push(" = ")
                .push_bind(*id);
        }
        builder.push(")");

        let exists: bool = builder.build_query_scalar().fetch_one(&self.pool).await?;
        Ok(exists)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rows_per_statement_stays_under_bind_limit() {
        assert_eq!(rows_per_statement(15), 4369);
        assert!(rows_per_statement(15) * 15 <= MAX_BIND_PARAMS);
        assert_eq!(rows_per_statement(3), 21845);
        assert_eq!(rows_per_statement(0), MAX_BIND_PARAMS);
    }
}

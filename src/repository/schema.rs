//! Schema (re)creation from the import registry

use sqlx::{Pool, Postgres};

use crate::{error::AppResult, import::schema::SchemaRegistry};

#[derive(Clone)]
pub struct SchemaRepository {
    pool: Pool<Postgres>,
}

impl SchemaRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Drop and recreate every registry table in a single transaction.
    ///
    /// Destroys all library data.
    pub async fn reset(&self, registry: &SchemaRegistry) -> AppResult<usize> {
        let mut tx = self.pool.begin().await?;

        for statement in registry.drop_statements() {
            tracing::debug!("{}", statement);
            sqlx::query(&statement).execute(&mut *tx).await?;
        }

        let creates = registry.create_statements();
        for statement in &creates {
            tracing::debug!("{}", statement);
            sqlx::query(statement).execute(&mut *tx).await?;
        }

        tx.commit().await?;
        tracing::info!("Database schema recreated ({} tables)", creates.len());
        Ok(creates.len())
    }
}

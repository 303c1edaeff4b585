//! Authors repository for database operations

use chrono::Utc;
use sqlx::{Pool, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    models::author::{Author, AuthorQuery, CreateAuthor},
};

const AUTHOR_COLUMNS: &str =
    "id, first_name, last_name, bio, birth_date, death_date, created_at, updated_at";

#[derive(Clone)]
pub struct AuthorsRepository {
    pool: Pool<Postgres>,
}

impl AuthorsRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    pub async fn list(&self, query: &AuthorQuery) -> AppResult<(Vec<Author>, i64)> {
        let page = query.page.unwrap_or(1).max(1);
        let per_page = query.per_page.unwrap_or(20).clamp(1, 200);
        let pattern = query.name.as_ref().map(|n| format!("%{}%", n.to_lowercase()));

        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM author");
        let mut select =
            QueryBuilder::<Postgres>::new(format!("SELECT {} FROM author", AUTHOR_COLUMNS));
        if let Some(ref pattern) = pattern {
            count.push(" WHERE LOWER(last_name) LIKE ").push_bind(pattern);
            select.push(" WHERE LOWER(last_name) LIKE ").push_bind(pattern);
        }
        select
            .push(" ORDER BY last_name, first_name LIMIT ")
            .push_bind(per_page)
            .push(" OFFSET ")
            .push_bind((page - 1) * per_page);

        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;
        let authors = select.build_query_as::<Author>().fetch_all(&self.pool).await?;
        Ok((authors, total))
    }

    pub async fn get_by_id(&self, id: Uuid) -> AppResult<Author> {
        sqlx::query_as::<_, Author>(&format!("SELECT {} FROM author WHERE id = $1", AUTHOR_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Author with id {} not found", id)))
    }

    pub async fn create(&self, author: &CreateAuthor) -> AppResult<Author> {
        let now = Utc::now().naive_utc();
        let created = sqlx::query_as::<_, Author>(&format!(
            r#"
            INSERT INTO author (id, first_name, last_name, bio, birth_date, death_date, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $7)
            RETURNING {}
            "#,
            AUTHOR_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(author.first_name.trim())
        .bind(author.last_name.trim())
        .bind(&author.bio)
        .bind(author.birth_date)
        .bind(author.death_date)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;
        Ok(created)
    }

    /// Delete an author, unlinking its books
    pub async fn delete(&self, id: Uuid) -> AppResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM author_book WHERE author_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("UPDATE books SET author_id = NULL WHERE author_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        let result = sqlx::query("DELETE FROM author WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Author with id {} not found", id)));
        }

        tx.commit().await?;
        Ok(())
    }
}

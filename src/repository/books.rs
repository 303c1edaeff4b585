//! Books repository for database operations

use chrono::Utc;
use sqlx::{Pool, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    models::book::{Book, BookQuery, CreateBook, UpdateBook},
};

const BOOK_COLUMNS: &str = "id, isbn, title, author, author_id, publisher, publisher_id, \
     published_year, current_quantity, total_quantity, image_url_s, image_url_m, image_url_l, \
     created_at, updated_at";

#[derive(Clone)]
pub struct BooksRepository {
    pool: Pool<Postgres>,
}

impl BooksRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    fn push_filters<'a>(builder: &mut QueryBuilder<'a, Postgres>, query: &'a BookQuery) {
        builder.push(" WHERE 1=1");
        if let Some(ref title) = query.title {
            builder
                .push(" AND LOWER(title) LIKE ")
                .push_bind(format!("%{}%", title.to_lowercase()));
        }
        if let Some(ref isbn) = query.isbn {
            builder.push(" AND isbn = ").push_bind(isbn.trim());
        }
    }

    /// Search books with filters and pagination
    pub async fn search(&self, query: &BookQuery) -> AppResult<(Vec<Book>, i64)> {
        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM books");
        Self::push_filters(&mut count, query);
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        let mut select = QueryBuilder::<Postgres>::new(format!("SELECT {} FROM books", BOOK_COLUMNS));
        Self::push_filters(&mut select, query);
        select
            .push(" ORDER BY title, isbn LIMIT ")
            .push_bind(query.per_page())
            .push(" OFFSET ")
            .push_bind(query.offset());

        let books = select.build_query_as::<Book>().fetch_all(&self.pool).await?;
        Ok((books, total))
    }

    /// Get book by ID
    pub async fn get_by_id(&self, id: Uuid) -> AppResult<Book> {
        sqlx::query_as::<_, Book>(&format!("SELECT {} FROM books WHERE id = $1", BOOK_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", id)))
    }

    /// Check if ISBN already exists
    pub async fn isbn_exists(&self, isbn: &str, exclude_id: Option<Uuid>) -> AppResult<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM books WHERE isbn = $1 AND ($2::uuid IS NULL OR id != $2))",
        )
        .bind(isbn)
        .bind(exclude_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    pub async fn publisher_exists(&self, id: Uuid) -> AppResult<bool> {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM publisher WHERE id = $1)")
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        Ok(exists)
    }

    /// Create a new book
    pub async fn create(&self, book: &CreateBook) -> AppResult<Book> {
        let now = Utc::now().naive_utc();
        let quantity = book.total_quantity.unwrap_or(1);

        let created = sqlx::query_as::<_, Book>(&format!(
            r#"
            INSERT INTO books (
                id, isbn, title, author, author_id, publisher, publisher_id, published_year,
                current_quantity, total_quantity, image_url_s, image_url_m, image_url_l,
                created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $9, $10, $11, $12, $13, $13)
            RETURNING {}
            "#,
            BOOK_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(book.isbn.trim())
        .bind(&book.title)
        .bind(&book.author)
        .bind(book.author_id)
        .bind(&book.publisher)
        .bind(book.publisher_id)
        .bind(book.published_year)
        .bind(quantity)
        .bind(&book.image_url_s)
        .bind(&book.image_url_m)
        .bind(&book.image_url_l)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        Ok(created)
    }

    /// Update an existing book
    pub async fn update(&self, id: Uuid, book: &UpdateBook) -> AppResult<Book> {
        let now = Utc::now().naive_utc();

        sqlx::query_as::<_, Book>(&format!(
            r#"
            UPDATE books SET
                isbn = COALESCE($1, isbn),
                title = COALESCE($2, title),
                author = COALESCE($3, author),
                author_id = COALESCE($4, author_id),
                publisher = COALESCE($5, publisher),
                publisher_id = COALESCE($6, publisher_id),
                published_year = COALESCE($7, published_year),
                current_quantity = COALESCE($8, current_quantity),
                total_quantity = COALESCE($9, total_quantity),
                updated_at = $10
            WHERE id = $11
            RETURNING {}
            "#,
            BOOK_COLUMNS
        ))
        .bind(book.isbn.as_deref().map(str::trim))
        .bind(&book.title)
        .bind(&book.author)
        .bind(book.author_id)
        .bind(&book.publisher)
        .bind(book.publisher_id)
        .bind(book.published_year)
        .bind(book.current_quantity)
        .bind(book.total_quantity)
        .bind(now)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", id)))
    }

    /// Delete a book with its copies, loan history and links.
    ///
    /// Refused while any copy is on loan.
    pub async fn delete(&self, id: Uuid) -> AppResult<()> {
        let mut tx = self.pool.begin().await?;

        let loaned: i64 = sqlx::query_scalar(
            r#"
            SELECT
                (SELECT COUNT(*) FROM physical_loan l JOIN physical p ON l.book_id = p.id
                 WHERE p.book_id = $1 AND l.return_date IS NULL)
              + (SELECT COUNT(*) FROM digital_loan l JOIN digital d ON l.book_id = d.id
                 WHERE d.book_id = $1 AND l.status IN ('CHECKOUT', 'OVERDUE'))
            "#,
        )
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;
        if loaned > 0 {
            return Err(AppError::Conflict(format!(
                "Book {} has {} copies on loan",
                id, loaned
            )));
        }

        for statement in [
            "DELETE FROM physical_loan WHERE book_id IN (SELECT id FROM physical WHERE book_id = $1)",
            "DELETE FROM digital_loan WHERE book_id IN (SELECT id FROM digital WHERE book_id = $1)",
            "DELETE FROM physical WHERE book_id = $1",
            "DELETE FROM digital WHERE book_id = $1",
            "DELETE FROM category_book WHERE book_id = $1",
            "DELETE FROM author_book WHERE book_id = $1",
            "DELETE FROM rating WHERE book_id = $1",
            "DELETE FROM reservation WHERE book_id = $1",
        ] {
            sqlx::query(statement).bind(id).execute(&mut *tx).await?;
        }

        let result = sqlx::query("DELETE FROM books WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Book with id {} not found", id)));
        }

        tx.commit().await?;
        Ok(())
    }
}

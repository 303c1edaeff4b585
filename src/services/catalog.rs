//! Catalog management service (books and authors)

use uuid::Uuid;
use validator::Validate;

use crate::{
    error::{AppError, AppResult},
    models::{
        author::{Author, AuthorQuery, CreateAuthor},
        book::{Book, BookQuery, CreateBook, UpdateBook},
    },
    repository::Repository,
};

#[derive(Clone)]
pub struct CatalogService {
    repository: Repository,
}

impl CatalogService {
    pub fn new(repository: Repository) -> Self {
        Self { repository }
    }

    /// Search books with filters
    pub async fn search_books(&self, query: &BookQuery) -> AppResult<(Vec<Book>, i64)> {
        self.repository.books.search(query).await
    }

    pub async fn get_book(&self, id: Uuid) -> AppResult<Book> {
        self.repository.books.get_by_id(id).await
    }

    /// Create a new book; ISBNs are unique across the catalog
    pub async fn create_book(&self, book: CreateBook) -> AppResult<Book> {
        book.validate()
            .map_err(|e| AppError::Validation(e.to_string()))?;

        if self.repository.books.isbn_exists(book.isbn.trim(), None).await? {
            return Err(AppError::Conflict(format!(
                "A book with ISBN {} already exists",
                book.isbn.trim()
            )));
        }
        self.check_references(book.author_id, book.publisher_id).await?;

        let created = self.repository.books.create(&book).await?;
        tracing::info!("Created book {} ({})", created.id, created.isbn);
        Ok(created)
    }

    pub async fn update_book(&self, id: Uuid, book: UpdateBook) -> AppResult<Book> {
        book.validate()
            .map_err(|e| AppError::Validation(e.to_string()))?;

        if let Some(ref isbn) = book.isbn {
            if self.repository.books.isbn_exists(isbn.trim(), Some(id)).await? {
                return Err(AppError::Conflict(format!(
                    "A book with ISBN {} already exists",
                    isbn.trim()
                )));
            }
        }
        self.check_references(book.author_id, book.publisher_id).await?;

        self.repository.books.update(id, &book).await
    }

    pub async fn delete_book(&self, id: Uuid) -> AppResult<()> {
        self.repository.books.delete(id).await?;
        tracing::info!("Deleted book {}", id);
        Ok(())
    }

    pub async fn list_authors(&self, query: &AuthorQuery) -> AppResult<(Vec<Author>, i64)> {
        self.repository.authors.list(query).await
    }

    pub async fn get_author(&self, id: Uuid) -> AppResult<Author> {
        self.repository.authors.get_by_id(id).await
    }

    pub async fn create_author(&self, author: CreateAuthor) -> AppResult<Author> {
        author
            .validate()
            .map_err(|e| AppError::Validation(e.to_string()))?;
        author.check_dates().map_err(AppError::Validation)?;

        self.repository.authors.create(&author).await
    }

    pub async fn delete_author(&self, id: Uuid) -> AppResult<()> {
        self.repository.authors.delete(id).await
    }

    /// Referenced author and publisher must exist
    async fn check_references(
        &self,
        author_id: Option<Uuid>,
        publisher_id: Option<Uuid>,
    ) -> AppResult<()> {
        if let Some(author_id) = author_id {
            match self.repository.authors.get_by_id(author_id).await {
                Ok(_) => {}
                Err(AppError::NotFound(_)) => {
                    return Err(AppError::BadRequest(format!("Unknown author {}", author_id)));
                }
                Err(e) => return Err(e),
            }
        }
        if let Some(publisher_id) = publisher_id {
            if !self.repository.books.publisher_exists(publisher_id).await? {
                return Err(AppError::BadRequest(format!("Unknown publisher {}", publisher_id)));
            }
        }
        Ok(())
    }
}

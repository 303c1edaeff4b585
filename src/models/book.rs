//! Book model and related types

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

/// Full book model from database
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Book {
    pub id: Uuid,
    pub isbn: String,
    pub title: String,
    pub author: Option<String>,
    pub author_id: Option<Uuid>,
    pub publisher: Option<String>,
    pub publisher_id: Option<Uuid>,
    pub published_year: Option<i64>,
    pub current_quantity: i64,
    pub total_quantity: i64,
    pub image_url_s: Option<String>,
    pub image_url_m: Option<String>,
    pub image_url_l: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

/// Book query parameters
#[derive(Debug, Default, Deserialize, IntoParams, ToSchema)]
#[into_params(parameter_in = Query)]
pub struct BookQuery {
    /// Case-insensitive substring of the title
    pub title: Option<String>,
    pub isbn: Option<String>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

impl BookQuery {
    pub const DEFAULT_PER_PAGE: i64 = 20;
    pub const MAX_PER_PAGE: i64 = 200;

    pub fn page(&self) -> i64 {
        self.page.unwrap_or(1).max(1)
    }

    pub fn per_page(&self) -> i64 {
        self.per_page
            .unwrap_or(Self::DEFAULT_PER_PAGE)
            .clamp(1, Self::MAX_PER_PAGE)
    }

    pub fn offset(&self) -> i64 {
        (self.page() - 1) * self.per_page()
    }
}

/// Create book request
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateBook {
    #[validate(length(min = 1, max = 20, message = "ISBN must be 1-20 characters"))]
    pub isbn: String,
    #[validate(length(min = 1, message = "Title is required"))]
    pub title: String,
    pub author: Option<String>,
    pub author_id: Option<Uuid>,
    pub publisher: Option<String>,
    pub publisher_id: Option<Uuid>,
    pub published_year: Option<i64>,
    #[validate(range(min = 0, message = "Quantity cannot be negative"))]
    pub total_quantity: Option<i64>,
    pub image_url_s: Option<String>,
    pub image_url_m: Option<String>,
    pub image_url_l: Option<String>,
}

/// Update book request; absent fields are left unchanged
#[derive(Debug, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateBook {
    #[validate(length(min = 1, max = 20, message = "ISBN must be 1-20 characters"))]
    pub isbn: Option<String>,
    #[validate(length(min = 1, message = "Title cannot be empty"))]
    pub title: Option<String>,
    pub author: Option<String>,
    pub author_id: Option<Uuid>,
    pub publisher: Option<String>,
    pub publisher_id: Option<Uuid>,
    pub published_year: Option<i64>,
    #[validate(range(min = 0, message = "Quantity cannot be negative"))]
    pub current_quantity: Option<i64>,
    #[validate(range(min = 0, message = "Quantity cannot be negative"))]
    pub total_quantity: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pagination_bounds() {
        let query = BookQuery {
            page: Some(0),
            per_page: Some(10_000),
            ..Default::default()
        };
        assert_eq!(query.page(), 1);
        assert_eq!(query.per_page(), BookQuery::MAX_PER_PAGE);
        assert_eq!(query.offset(), 0);

        let query = BookQuery {
            page: Some(3),
            ..Default::default()
        };
        assert_eq!(query.offset(), 40);
    }

    #[test]
    fn test_create_book_validation() {
        let book = CreateBook {
            isbn: String::new(),
            title: "Dune".into(),
            author: None,
            author_id: None,
            publisher: None,
            publisher_id: None,
            published_year: None,
            total_quantity: Some(-1),
            image_url_s: None,
            image_url_m: None,
            image_url_l: None,
        };
        let errors = book.validate().unwrap_err();
        let fields = errors.field_errors();
        assert!(fields.contains_key("isbn"));
        assert!(fields.contains_key("total_quantity"));
    }
}

//! Data models for Libris

pub mod author;
pub mod book;
pub mod enums;
pub mod import_report;
pub mod user;

// Re-export commonly used types
pub use author::Author;
pub use book::Book;
pub use enums::{BookStatus, FileFormat, LicenseType, LoanStatus, ReservationStatus};
pub use import_report::{ImportReport, TableOutcome};
pub use user::{User, UserClaims};

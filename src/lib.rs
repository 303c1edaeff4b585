//! Libris Library Management Server
//!
//! REST JSON API over a Postgres library catalog, plus a bulk CSV import
//! pipeline that loads legacy numeric-keyed exports into the UUID-keyed
//! schema.

use std::sync::Arc;

pub mod api;
pub mod config;
pub mod error;
pub mod import;
pub mod models;
pub mod repository;
pub mod services;

pub use config::AppConfig;
pub use error::{AppError, AppResult, ImportError, ImportResult};

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub services: Arc<services::Services>,
}

//! Bulk import endpoint

use axum::{extract::State, Json};

use crate::{
    error::AppResult,
    models::import_report::ImportReport,
    services::import::ImportRequest,
    AppState,
};

use super::AuthenticatedUser;

/// Import the legacy CSV export found in the configured data directory
#[utoipa::path(
    post,
    path = "/import",
    tag = "import",
    security(("bearer_auth" = [])),
    request_body = ImportRequest,
    responses(
        (status = 200, description = "Per-table import report", body = ImportReport),
        (status = 400, description = "No import files or invalid batch size"),
        (status = 403, description = "Administrator role required")
    )
)]
pub async fn run_import(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Json(request): Json<ImportRequest>,
) -> AppResult<Json<ImportReport>> {
    claims.require_admin()?;

    tracing::info!("Import requested by {}", claims.sub);
    let report = state.services.import.run(&request).await?;
    Ok(Json(report))
}

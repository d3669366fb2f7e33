use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};

use tallybook_core::JournalId;

use crate::app::{dto, errors};
use crate::app::services::AppServices;
use crate::context::CompanyContext;

pub fn router() -> Router {
    Router::new()
        .route("/", get(company_trail))
        .route("/journals/:id", get(journal_trail))
}

/// Audit records are written asynchronously; a change may take a moment to show up.
pub async fn company_trail(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(company): Extension<CompanyContext>,
) -> axum::response::Response {
    let records = services.audit.records(company.company_id());
    (StatusCode::OK, Json(dto::items(records))).into_response()
}

pub async fn journal_trail(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(company): Extension<CompanyContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let journal_id: JournalId = match errors::parse_param(&id, "invalid_id") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let records = services.audit.journal_history(company.company_id(), journal_id);
    (StatusCode::OK, Json(dto::items(records))).into_response()
}

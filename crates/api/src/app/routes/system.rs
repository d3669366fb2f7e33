use std::sync::Arc;

use axum::{extract::Extension, http::StatusCode, response::IntoResponse, Json};

use crate::app::services::AppServices;
use crate::context::{ActorContext, CompanyContext};

pub async fn health() -> StatusCode {
    StatusCode::OK
}

pub async fn whoami(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(company): Extension<CompanyContext>,
    Extension(actor): Extension<ActorContext>,
) -> impl IntoResponse {
    Json(serde_json::json!({
        "app": services.app_name,
        "company_id": company.company_id().to_string(),
        "user_id": actor.user_id().to_string(),
    }))
}

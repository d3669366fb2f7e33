use std::sync::Arc;

use axum::{
    extract::{Extension, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};

use crate::app::{dto, errors};
use crate::app::services::AppServices;
use crate::context::CompanyContext;

pub fn router() -> Router {
    Router::new()
        .route("/trial-balance", get(trial_balance))
        .route("/income-statement", get(income_statement))
        .route("/balance-sheet", get(balance_sheet))
        .route("/cash-flow", get(cash_flow))
}

pub async fn trial_balance(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(company): Extension<CompanyContext>,
    Query(query): Query<dto::AsOfQuery>,
) -> axum::response::Response {
    match services.trial_balance.build(company.company_id(), query.as_of) {
        Ok(report) => (StatusCode::OK, Json(report)).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}

pub async fn income_statement(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(company): Extension<CompanyContext>,
    Query(query): Query<dto::PeriodQuery>,
) -> axum::response::Response {
    match services
        .statements
        .income_statement(company.company_id(), query.start, query.end)
    {
        Ok(report) => (StatusCode::OK, Json(report)).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}

pub async fn balance_sheet(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(company): Extension<CompanyContext>,
    Query(query): Query<dto::AsOfQuery>,
) -> axum::response::Response {
    match services.statements.balance_sheet(company.company_id(), query.as_of) {
        Ok(report) => (StatusCode::OK, Json(report)).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}

pub async fn cash_flow(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(company): Extension<CompanyContext>,
    Query(query): Query<dto::PeriodQuery>,
) -> axum::response::Response {
    match services
        .statements
        .cash_flow(company.company_id(), query.start, query.end)
    {
        Ok(Some(report)) => (StatusCode::OK, Json(report)).into_response(),
        Ok(None) => errors::json_error(
            StatusCode::NOT_FOUND,
            "not_found",
            "company has no active cash or bank accounts",
        ),
        Err(e) => errors::engine_error_to_response(e),
    }
}

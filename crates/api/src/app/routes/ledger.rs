use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};

use tallybook_core::AccountId;

use crate::app::{dto, errors};
use crate::app::services::AppServices;
use crate::context::CompanyContext;

pub fn router() -> Router {
    Router::new()
        .route("/", get(company_ledger))
        .route("/accounts/:id", get(account_ledger))
        .route("/accounts/:id/balance", get(account_balance))
}

pub async fn company_ledger(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(company): Extension<CompanyContext>,
    Query(query): Query<dto::DateRangeQuery>,
) -> axum::response::Response {
    let range = match query.range() {
        Ok(r) => r,
        Err(e) => return errors::engine_error_to_response(e.into()),
    };

    match services.ledger.by_company(company.company_id(), range) {
        Ok(lines) => (StatusCode::OK, Json(dto::items(lines))).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}

pub async fn account_ledger(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(company): Extension<CompanyContext>,
    Path(id): Path<String>,
    Query(query): Query<dto::DateRangeQuery>,
) -> axum::response::Response {
    let account_id: AccountId = match errors::parse_param(&id, "invalid_id") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let range = match query.range() {
        Ok(r) => r,
        Err(e) => return errors::engine_error_to_response(e.into()),
    };

    match services.ledger.by_account(company.company_id(), account_id, range) {
        Ok(lines) => (StatusCode::OK, Json(dto::items(lines))).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}

/// Raw `debit - credit` balance, not adjusted for the account's normal side.
pub async fn account_balance(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(company): Extension<CompanyContext>,
    Path(id): Path<String>,
    Query(query): Query<dto::AsOfQuery>,
) -> axum::response::Response {
    let account_id: AccountId = match errors::parse_param(&id, "invalid_id") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services
        .ledger
        .account_balance(company.company_id(), account_id, query.as_of)
    {
        Ok(balance) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "account_id": account_id,
                "as_of": query.as_of,
                "balance": balance,
            })),
        )
            .into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}

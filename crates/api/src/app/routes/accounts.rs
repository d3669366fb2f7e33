use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};

use tallybook_accounting::{AccountType, AccountUpdate};
use tallybook_core::AccountId;

use crate::app::{dto, errors};
use crate::app::services::AppServices;
use crate::context::CompanyContext;

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_account).get(list_accounts))
        .route("/seed", post(seed_default_chart))
        .route("/code/:code", get(get_account_by_code))
        .route("/:id", get(get_account).patch(update_account))
}

pub async fn create_account(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(company): Extension<CompanyContext>,
    Json(body): Json<dto::CreateAccountRequest>,
) -> axum::response::Response {
    match services
        .registry
        .create(body.into_new_account(company.company_id()))
    {
        Ok(account) => (StatusCode::CREATED, Json(account)).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}

pub async fn list_accounts(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(company): Extension<CompanyContext>,
    Query(query): Query<dto::AccountListQuery>,
) -> axum::response::Response {
    let company_id = company.company_id();
    let result = match query.account_type.as_deref() {
        Some(raw) => {
            let account_type: AccountType = match errors::parse_param(raw, "invalid_account_type") {
                Ok(t) => t,
                Err(resp) => return resp,
            };
            services.registry.list_by_type(company_id, account_type)
        }
        None if query.all => services.registry.list_all(company_id),
        None => services.registry.list_active(company_id),
    };

    match result {
        Ok(accounts) => (StatusCode::OK, Json(dto::items(accounts))).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}

pub async fn seed_default_chart(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(company): Extension<CompanyContext>,
) -> axum::response::Response {
    match services.registry.seed_default_chart(company.company_id()) {
        Ok(accounts) => (StatusCode::CREATED, Json(dto::items(accounts))).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}

pub async fn get_account_by_code(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(company): Extension<CompanyContext>,
    Path(code): Path<String>,
) -> axum::response::Response {
    match services.registry.find_by_code(company.company_id(), &code) {
        Ok(account) => (StatusCode::OK, Json(account)).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}

pub async fn get_account(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(company): Extension<CompanyContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let account_id: AccountId = match errors::parse_param(&id, "invalid_id") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.registry.find_by_id(company.company_id(), account_id) {
        Ok(account) => (StatusCode::OK, Json(account)).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}

pub async fn update_account(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(company): Extension<CompanyContext>,
    Path(id): Path<String>,
    Json(body): Json<AccountUpdate>,
) -> axum::response::Response {
    let account_id: AccountId = match errors::parse_param(&id, "invalid_id") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.registry.update(company.company_id(), account_id, body) {
        Ok(account) => (StatusCode::OK, Json(account)).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}

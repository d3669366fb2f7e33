use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;

use tallybook_accounting::{DeleteJournal, JournalStatus, PostJournal, UpdateJournal, VoidJournal};
use tallybook_core::JournalId;

use crate::app::{dto, errors};
use crate::app::services::AppServices;
use crate::context::{ActorContext, CompanyContext};

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_journal).get(list_journals))
        .route("/cash-in", post(cash_in))
        .route("/cash-out", post(cash_out))
        .route(
            "/:id",
            get(get_journal).put(update_journal).delete(delete_journal),
        )
        .route("/:id/post", post(post_journal))
        .route("/:id/void", post(void_journal))
}

fn journal_id(raw: &str) -> Result<JournalId, axum::response::Response> {
    errors::parse_param(raw, "invalid_id")
}

pub async fn create_journal(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(company): Extension<CompanyContext>,
    Extension(actor): Extension<ActorContext>,
    Json(body): Json<dto::JournalRequest>,
) -> axum::response::Response {
    match services
        .engine
        .create(body.into_new_journal(company.company_id(), actor.user_id()))
    {
        Ok(journal) => (StatusCode::CREATED, Json(journal)).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}

pub async fn cash_in(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(company): Extension<CompanyContext>,
    Extension(actor): Extension<ActorContext>,
    Json(body): Json<dto::CashRequest>,
) -> axum::response::Response {
    match services
        .engine
        .cash_in(body.into_cash_entry(company.company_id(), actor.user_id()))
    {
        Ok(journal) => (StatusCode::CREATED, Json(journal)).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}

pub async fn cash_out(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(company): Extension<CompanyContext>,
    Extension(actor): Extension<ActorContext>,
    Json(body): Json<dto::CashRequest>,
) -> axum::response::Response {
    match services
        .engine
        .cash_out(body.into_cash_entry(company.company_id(), actor.user_id()))
    {
        Ok(journal) => (StatusCode::CREATED, Json(journal)).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}

pub async fn list_journals(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(company): Extension<CompanyContext>,
    Query(query): Query<dto::JournalListQuery>,
) -> axum::response::Response {
    let company_id = company.company_id();

    let result = match query.status.as_deref() {
        Some(raw) => {
            let status: JournalStatus = match errors::parse_param(raw, "invalid_status") {
                Ok(s) => s,
                Err(resp) => return resp,
            };
            services.engine.list_by_status(company_id, status)
        }
        None => {
            let range = dto::DateRangeQuery {
                start: query.start,
                end: query.end,
            }
            .range();
            match range {
                Ok(range) => services.engine.list(company_id, range),
                Err(e) => Err(e.into()),
            }
        }
    };

    match result {
        Ok(journals) => (StatusCode::OK, Json(dto::items(journals))).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}

pub async fn get_journal(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(company): Extension<CompanyContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let journal_id = match journal_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.engine.get(company.company_id(), journal_id) {
        Ok(journal) => (StatusCode::OK, Json(journal)).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}

pub async fn update_journal(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(company): Extension<CompanyContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::JournalRequest>,
) -> axum::response::Response {
    let journal_id = match journal_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let cmd = UpdateJournal {
        company_id: company.company_id(),
        journal_id,
        transaction_date: body.transaction_date,
        description: body.description,
        entries: dto::to_entry_lines(body.entries),
        occurred_at: Utc::now(),
    };

    match services.engine.update(cmd) {
        Ok(journal) => (StatusCode::OK, Json(journal)).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}

pub async fn delete_journal(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(company): Extension<CompanyContext>,
    Extension(actor): Extension<ActorContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let journal_id = match journal_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let cmd = DeleteJournal {
        company_id: company.company_id(),
        journal_id,
        deleted_by: actor.user_id(),
        occurred_at: Utc::now(),
    };

    match services.engine.delete(cmd) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}

pub async fn post_journal(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(company): Extension<CompanyContext>,
    Extension(actor): Extension<ActorContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let journal_id = match journal_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let cmd = PostJournal {
        company_id: company.company_id(),
        journal_id,
        posted_by: actor.user_id(),
        occurred_at: Utc::now(),
    };

    match services.engine.post(cmd) {
        Ok(journal) => (StatusCode::OK, Json(journal)).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}

pub async fn void_journal(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(company): Extension<CompanyContext>,
    Extension(actor): Extension<ActorContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let journal_id = match journal_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let cmd = VoidJournal {
        company_id: company.company_id(),
        journal_id,
        voided_by: actor.user_id(),
        occurred_at: Utc::now(),
    };

    match services.engine.void(cmd) {
        Ok(journal) => (StatusCode::OK, Json(journal)).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}

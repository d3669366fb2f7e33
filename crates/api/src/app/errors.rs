use std::str::FromStr;

use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use tallybook_accounting::AccountingError;
use tallybook_core::DomainError;
use tallybook_infra::{EngineError, StoreError};

pub fn engine_error_to_response(err: EngineError) -> axum::response::Response {
    let message = err.to_string();
    match err {
        EngineError::Accounting(AccountingError::Validation(violations)) => (
            StatusCode::BAD_REQUEST,
            axum::Json(json!({
                "error": "validation_error",
                "message": message,
                "violations": violations,
            })),
        )
            .into_response(),
        EngineError::Accounting(e) => accounting_error_to_response(e, message),
        EngineError::Domain(e) => domain_error_to_response(e, message),
        EngineError::Store(e) => store_error_to_response(e, message),
    }
}

fn accounting_error_to_response(err: AccountingError, message: String) -> axum::response::Response {
    match err {
        AccountingError::StateConflict { .. } => {
            json_error(StatusCode::CONFLICT, "state_conflict", message)
        }
        AccountingError::JournalExists(_) | AccountingError::DuplicateAccountCode(_) => {
            json_error(StatusCode::CONFLICT, "conflict", message)
        }
        // Other companies' records are reported as missing.
        AccountingError::JournalNotFound(_)
        | AccountingError::AccountNotFound(_)
        | AccountingError::CompanyMismatch(_) => {
            json_error(StatusCode::NOT_FOUND, "not_found", message)
        }
        AccountingError::Validation(_)
        | AccountingError::HeaderAccountBalance(_)
        | AccountingError::OpeningBalance(_)
        | AccountingError::HeaderAccountPosting(_)
        | AccountingError::InactiveAccount(_)
        | AccountingError::CategoryMismatch { .. }
        | AccountingError::Invalid(_) => {
            json_error(StatusCode::BAD_REQUEST, "validation_error", message)
        }
    }
}

fn domain_error_to_response(err: DomainError, message: String) -> axum::response::Response {
    match err {
        DomainError::Validation(_) | DomainError::InvalidId(_) | DomainError::InvariantViolation(_) => {
            json_error(StatusCode::BAD_REQUEST, "validation_error", message)
        }
        DomainError::NotFound(_) => json_error(StatusCode::NOT_FOUND, "not_found", message),
        DomainError::Conflict(_) => json_error(StatusCode::CONFLICT, "conflict", message),
    }
}

fn store_error_to_response(err: StoreError, message: String) -> axum::response::Response {
    match err {
        StoreError::Concurrency(_) | StoreError::Duplicate(_) => {
            json_error(StatusCode::CONFLICT, "conflict", message)
        }
        StoreError::NotFound(_) => json_error(StatusCode::NOT_FOUND, "not_found", message),
        StoreError::Rejected(_) => json_error(StatusCode::BAD_REQUEST, "validation_error", message),
        StoreError::Unavailable(_) => {
            tracing::error!(error = %message, "storage unavailable");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "store_error", message)
        }
    }
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

/// Parse a path or query value, answering 400 with `code` when it is malformed.
pub fn parse_param<T>(raw: &str, code: &'static str) -> Result<T, axum::response::Response>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e: T::Err| json_error(StatusCode::BAD_REQUEST, code, e.to_string()))
}

use axum::{routing::get, Router};

pub mod accounts;
pub mod audit;
pub mod journals;
pub mod ledger;
pub mod reports;
pub mod system;

/// Router for all company-scoped endpoints.
pub fn router() -> Router {
    Router::new()
        .route("/whoami", get(system::whoami))
        .nest("/accounts", accounts::router())
        .nest("/journals", journals::router())
        .nest("/ledger", ledger::router())
        .nest("/reports", reports::router())
        .nest("/audit", audit::router())
}

//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `services.rs`: engine wiring (store, bus, engine, reports, audit trail)
//! - `routes/`: HTTP routes + handlers (one file per area)
//! - `dto.rs`: request DTOs and JSON mapping helpers
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{routing::get, Extension, Router};
use tower::ServiceBuilder;

use crate::config::AppConfig;
use crate::middleware;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

/// Build the full HTTP router over a fresh in-memory store.
///
/// The returned services handle lets the caller stop background workers.
pub fn build_app(config: &AppConfig) -> std::io::Result<(Router, Arc<services::AppServices>)> {
    build_app_with_store(config, services::in_memory_store())
}

/// Build the full HTTP router over `store` (public entrypoint used by `main.rs`).
pub fn build_app_with_store(
    config: &AppConfig,
    store: services::Store,
) -> std::io::Result<(Router, Arc<services::AppServices>)> {
    let services = Arc::new(services::build_services(config, store)?);

    // Company-scoped routes: require company + actor context.
    let scoped = routes::router()
        .layer(Extension(services.clone()))
        .layer(axum::middleware::from_fn(middleware::company_context_middleware));

    let router = Router::new()
        .route("/health", get(routes::system::health))
        .merge(scoped)
        .layer(ServiceBuilder::new());

    Ok((router, services))
}

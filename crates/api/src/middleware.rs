use std::str::FromStr;

use axum::{
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};

use tallybook_core::{CompanyId, UserId};

use crate::context::{ActorContext, CompanyContext};

pub const COMPANY_HEADER: &str = "x-company-id";
pub const USER_HEADER: &str = "x-user-id";

/// Resolve the company and acting user from request headers.
///
/// Authentication happens upstream; this layer only refuses requests that do
/// not carry both identities.
pub async fn company_context_middleware(
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    let company_id: CompanyId = header_id(req.headers(), COMPANY_HEADER)?;
    let user_id: UserId = header_id(req.headers(), USER_HEADER)?;

    req.extensions_mut().insert(CompanyContext::new(company_id));
    req.extensions_mut().insert(ActorContext::new(user_id));

    Ok(next.run(req).await)
}

fn header_id<T: FromStr>(headers: &HeaderMap, name: &str) -> Result<T, StatusCode> {
    let value = headers
        .get(name)
        .ok_or(StatusCode::UNAUTHORIZED)?
        .to_str()
        .map_err(|_| StatusCode::UNAUTHORIZED)?
        .trim();

    value.parse().map_err(|_| StatusCode::BAD_REQUEST)
}

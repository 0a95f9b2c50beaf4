pub mod availability;
pub mod bookings;
pub mod health;
pub mod vehicles;

use axum::http::HeaderMap;

use crate::errors::AppError;
use crate::services::booking::OrgScope;

/// Caller identity headers, injected by the upstream auth layer. `X-Org-Id`
/// is mandatory; `X-Actor` defaults to "system" for automated callers.
pub fn org_scope(headers: &HeaderMap) -> Result<OrgScope, AppError> {
    let org_id = headers
        .get("x-org-id")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or(AppError::Unauthorized)?;

    let actor = headers
        .get("x-actor")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or("system");

    Ok(OrgScope {
        org_id: org_id.to_string(),
        actor: actor.to_string(),
    })
}

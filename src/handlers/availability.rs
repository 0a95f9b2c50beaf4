use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::Json;
use chrono::NaiveDateTime;
use serde::Deserialize;

use crate::errors::AppError;
use crate::services::availability::{self, VehicleAvailability};
use crate::state::AppState;

use super::org_scope;

// GET /api/availability?start=...&end=...&exclude_booking=...
#[derive(Deserialize)]
pub struct AvailabilityQuery {
    pub start: String,
    pub end: String,
    pub exclude_booking: Option<String>,
}

fn parse_window_dt(s: &str) -> Result<NaiveDateTime, AppError> {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S"))
        .map_err(|_| AppError::Validation(format!("invalid timestamp: {s}")))
}

/// Advisory preview for selection lists. The write path re-validates inside
/// its own transaction, so this result may go stale without harm.
pub async fn check_availability(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<AvailabilityQuery>,
) -> Result<Json<Vec<VehicleAvailability>>, AppError> {
    let scope = org_scope(&headers)?;
    let start = parse_window_dt(&query.start)?;
    let end = parse_window_dt(&query.end)?;

    let db = state.db.lock().unwrap();
    let result = availability::check_availability(
        &db,
        &scope.org_id,
        &start,
        &end,
        query.exclude_booking.as_deref(),
    )?;
    Ok(Json(result))
}

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde::Deserialize;

use crate::db::queries;
use crate::errors::AppError;
use crate::models::{AuditLogEntry, Booking, BookingStatus, VehicleAssignment};
use crate::services::booking::{
    self, AssignmentSpec, BookingDraft, BookingPatch, BookingWithAssignments,
};
use crate::state::AppState;

use super::org_scope;

// POST /api/bookings
pub async fn create_booking(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(draft): Json<BookingDraft>,
) -> Result<(StatusCode, Json<Booking>), AppError> {
    let scope = org_scope(&headers)?;
    let mut db = state.db.lock().unwrap();
    let booking = booking::create_booking(&mut db, &scope, draft)?;
    Ok((StatusCode::CREATED, Json(booking)))
}

// GET /api/bookings
#[derive(Deserialize)]
pub struct BookingsQuery {
    pub status: Option<String>,
    pub limit: Option<i64>,
}

pub async fn list_bookings(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<BookingsQuery>,
) -> Result<Json<Vec<Booking>>, AppError> {
    let scope = org_scope(&headers)?;
    let limit = query.limit.unwrap_or(50);

    let db = state.db.lock().unwrap();
    let bookings = queries::list_bookings(&db, &scope.org_id, query.status.as_deref(), limit)?;
    Ok(Json(bookings))
}

// GET /api/bookings/:id
pub async fn get_booking(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<BookingWithAssignments>, AppError> {
    let scope = org_scope(&headers)?;
    let db = state.db.lock().unwrap();
    let detail =
        booking::get_booking_with_assignments(&db, &scope, &id, &state.config.rates)?;
    Ok(Json(detail))
}

// PATCH /api/bookings/:id
pub async fn update_booking(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(patch): Json<BookingPatch>,
) -> Result<Json<Booking>, AppError> {
    let scope = org_scope(&headers)?;
    let mut db = state.db.lock().unwrap();
    let booking = booking::update_details(&mut db, &scope, &id, patch, &state.config.rates)?;
    Ok(Json(booking))
}

// POST /api/bookings/:id/status
#[derive(Deserialize)]
pub struct ChangeStatusRequest {
    pub status: BookingStatus,
    #[serde(default)]
    pub confirm: bool,
}

pub async fn change_status(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<ChangeStatusRequest>,
) -> Result<Json<Booking>, AppError> {
    let scope = org_scope(&headers)?;
    let mut db = state.db.lock().unwrap();
    let booking = booking::change_status(&mut db, &scope, &id, body.status, body.confirm)?;
    Ok(Json(booking))
}

// POST /api/bookings/:id/vehicles
#[derive(Deserialize)]
pub struct AssignVehicleRequest {
    pub vehicle_id: String,
    #[serde(flatten)]
    pub spec: AssignmentSpec,
}

pub async fn assign_vehicle(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<AssignVehicleRequest>,
) -> Result<Json<VehicleAssignment>, AppError> {
    let scope = org_scope(&headers)?;
    let mut db = state.db.lock().unwrap();
    let assignment = booking::assign_vehicle(
        &mut db,
        &scope,
        &id,
        &body.vehicle_id,
        body.spec,
        &state.config.rates,
    )?;
    Ok(Json(assignment))
}

// DELETE /api/bookings/:id/vehicles/:vehicle_id
pub async fn remove_vehicle(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path((id, vehicle_id)): Path<(String, String)>,
) -> Result<StatusCode, AppError> {
    let scope = org_scope(&headers)?;
    let mut db = state.db.lock().unwrap();
    booking::remove_vehicle(&mut db, &scope, &id, &vehicle_id)?;
    Ok(StatusCode::NO_CONTENT)
}

// GET /api/bookings/:id/audit
pub async fn get_audit_log(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Vec<AuditLogEntry>>, AppError> {
    let scope = org_scope(&headers)?;
    let db = state.db.lock().unwrap();
    let entries = booking::list_audit_log(&db, &scope, &id)?;
    Ok(Json(entries))
}

use std::sync::Arc;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;

use crate::db::queries;
use crate::errors::AppError;
use crate::models::Vehicle;
use crate::state::AppState;

use super::org_scope;

// GET /api/vehicles — read-only fleet reference listing
pub async fn list_vehicles(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Vec<Vehicle>>, AppError> {
    let scope = org_scope(&headers)?;
    let db = state.db.lock().unwrap();
    let vehicles = queries::list_active_vehicles(&db, &scope.org_id)?;
    Ok(Json(vehicles))
}

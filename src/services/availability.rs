use chrono::NaiveDateTime;
use rusqlite::Connection;
use serde::Serialize;

use crate::db::queries;
use crate::errors::AppError;

/// Availability verdict for one vehicle over a requested window.
#[derive(Debug, Clone, Serialize)]
pub struct VehicleAvailability {
    pub vehicle_id: String,
    pub plate_number: String,
    pub model: String,
    pub available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conflict_ref: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conflict_customer: Option<String>,
}

/// Advisory listing: one verdict per active vehicle in the org. Two windows
/// `[s1,e1)` and `[s2,e2)` conflict iff `s1 < e2 && s2 < e1`; touching
/// endpoints do not conflict. Only holding-status bookings block.
pub fn check_availability(
    conn: &Connection,
    org_id: &str,
    start: &NaiveDateTime,
    end: &NaiveDateTime,
    exclude_booking_id: Option<&str>,
) -> Result<Vec<VehicleAvailability>, AppError> {
    if end <= start {
        return Err(AppError::Validation("end must be after start".to_string()));
    }

    let vehicles = queries::list_active_vehicles(conn, org_id)?;
    let conflicts =
        queries::find_conflicts_in_window(conn, org_id, start, end, exclude_booking_id)?;

    Ok(vehicles
        .into_iter()
        .map(|v| {
            let conflict = conflicts.iter().find(|c| c.vehicle_id == v.id);
            VehicleAvailability {
                vehicle_id: v.id,
                plate_number: v.plate_number,
                model: v.model,
                available: conflict.is_none(),
                conflict_ref: conflict.map(|c| c.booking_ref.clone()),
                conflict_customer: conflict.map(|c| c.customer_name.clone()),
            }
        })
        .collect())
}

/// Mandatory write-path gate for a single vehicle. Must run inside the same
/// transaction as the write it protects; the advisory listing above is never
/// a substitute.
pub fn gate(
    conn: &Connection,
    org_id: &str,
    vehicle_id: &str,
    start: &NaiveDateTime,
    end: &NaiveDateTime,
    exclude_booking_id: Option<&str>,
) -> Result<(), AppError> {
    let conflict =
        queries::find_conflict(conn, org_id, vehicle_id, start, end, exclude_booking_id)?;

    match conflict {
        Some(c) => Err(AppError::AvailabilityConflict {
            vehicle_id: vehicle_id.to_string(),
            conflict_ref: c.booking_ref,
            conflict_customer: c.customer_name,
        }),
        None => Ok(()),
    }
}

use chrono::{NaiveDateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use crate::models::{
    AuditAction, AuditLogEntry, Booking, BookingStatus, RateSpec, Vehicle, VehicleAssignment,
};

const DT_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub fn fmt_dt(dt: &NaiveDateTime) -> String {
    dt.format(DT_FORMAT).to_string()
}

fn parse_dt(s: &str) -> NaiveDateTime {
    NaiveDateTime::parse_from_str(s, DT_FORMAT).unwrap_or_else(|_| Utc::now().naive_utc())
}

// ── Bookings ──

pub fn insert_booking(conn: &Connection, booking: &Booking) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO bookings (id, org_id, booking_ref, customer_name, customer_phone, trip_category,
                               start_time, end_time, pickup, dropoff, notes, status,
                               created_by, updated_by, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
        params![
            booking.id,
            booking.org_id,
            booking.booking_ref,
            booking.customer_name,
            booking.customer_phone,
            booking.trip_category,
            fmt_dt(&booking.start_time),
            fmt_dt(&booking.end_time),
            booking.pickup,
            booking.dropoff,
            booking.notes,
            booking.status.as_str(),
            booking.created_by,
            booking.updated_by,
            fmt_dt(&booking.created_at),
            fmt_dt(&booking.updated_at),
        ],
    )?;
    Ok(())
}

/// Updates everything mutable on a booking. `booking_ref`, `created_by` and
/// `created_at` are write-once and deliberately absent from the SET list.
pub fn update_booking(conn: &Connection, booking: &Booking) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE bookings SET customer_name = ?1, customer_phone = ?2, trip_category = ?3,
                             start_time = ?4, end_time = ?5, pickup = ?6, dropoff = ?7,
                             notes = ?8, status = ?9, updated_by = ?10, updated_at = ?11
         WHERE id = ?12 AND org_id = ?13",
        params![
            booking.customer_name,
            booking.customer_phone,
            booking.trip_category,
            fmt_dt(&booking.start_time),
            fmt_dt(&booking.end_time),
            booking.pickup,
            booking.dropoff,
            booking.notes,
            booking.status.as_str(),
            booking.updated_by,
            fmt_dt(&booking.updated_at),
            booking.id,
            booking.org_id,
        ],
    )?;
    Ok(count > 0)
}

pub fn booking_ref_exists(conn: &Connection, booking_ref: &str) -> anyhow::Result<bool> {
    let exists: bool = conn.query_row(
        "SELECT COUNT(*) > 0 FROM bookings WHERE booking_ref = ?1",
        params![booking_ref],
        |row| row.get(0),
    )?;
    Ok(exists)
}

pub fn get_booking(conn: &Connection, org_id: &str, id: &str) -> anyhow::Result<Option<Booking>> {
    let result = conn
        .query_row(
            &format!("{BOOKING_SELECT} WHERE id = ?1 AND org_id = ?2"),
            params![id, org_id],
            |row| Ok(parse_booking_row(row)),
        )
        .optional()?;

    match result {
        Some(booking) => Ok(Some(booking?)),
        None => Ok(None),
    }
}

pub fn list_bookings(
    conn: &Connection,
    org_id: &str,
    status_filter: Option<&str>,
    limit: i64,
) -> anyhow::Result<Vec<Booking>> {
    let mut bookings = vec![];
    match status_filter {
        Some(status) => {
            let mut stmt = conn.prepare(&format!(
                "{BOOKING_SELECT} WHERE org_id = ?1 AND status = ?2 ORDER BY start_time DESC LIMIT ?3"
            ))?;
            let rows = stmt.query_map(params![org_id, status, limit], |row| {
                Ok(parse_booking_row(row))
            })?;
            for row in rows {
                bookings.push(row??);
            }
        }
        None => {
            let mut stmt = conn.prepare(&format!(
                "{BOOKING_SELECT} WHERE org_id = ?1 ORDER BY start_time DESC LIMIT ?2"
            ))?;
            let rows = stmt.query_map(params![org_id, limit], |row| Ok(parse_booking_row(row)))?;
            for row in rows {
                bookings.push(row??);
            }
        }
    }
    Ok(bookings)
}

const BOOKING_SELECT: &str =
    "SELECT id, org_id, booking_ref, customer_name, customer_phone, trip_category,
            start_time, end_time, pickup, dropoff, notes, status,
            created_by, updated_by, created_at, updated_at
     FROM bookings";

fn parse_booking_row(row: &rusqlite::Row) -> anyhow::Result<Booking> {
    let start_time: String = row.get(6)?;
    let end_time: String = row.get(7)?;
    let status: String = row.get(11)?;
    let created_at: String = row.get(14)?;
    let updated_at: String = row.get(15)?;

    Ok(Booking {
        id: row.get(0)?,
        org_id: row.get(1)?,
        booking_ref: row.get(2)?,
        customer_name: row.get(3)?,
        customer_phone: row.get(4)?,
        trip_category: row.get(5)?,
        start_time: parse_dt(&start_time),
        end_time: parse_dt(&end_time),
        pickup: row.get(8)?,
        dropoff: row.get(9)?,
        notes: row.get(10)?,
        status: BookingStatus::parse(&status),
        created_by: row.get(12)?,
        updated_by: row.get(13)?,
        created_at: parse_dt(&created_at),
        updated_at: parse_dt(&updated_at),
    })
}

// ── Vehicle assignments ──

pub fn insert_assignment(conn: &Connection, a: &VehicleAssignment) -> anyhow::Result<()> {
    let (rate_total, rate_per_day, rate_per_km, estimated_km, final_km) = rate_columns(&a.rate);
    conn.execute(
        "INSERT INTO vehicle_assignments (booking_id, vehicle_id, driver_name, driver_phone,
                                          rate_mode, rate_total, rate_per_day, rate_per_km,
                                          estimated_km, final_km, advance_amount, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
        params![
            a.booking_id,
            a.vehicle_id,
            a.driver_name,
            a.driver_phone,
            a.rate.mode(),
            rate_total,
            rate_per_day,
            rate_per_km,
            estimated_km,
            final_km,
            a.advance_amount,
            fmt_dt(&a.created_at),
            fmt_dt(&a.updated_at),
        ],
    )?;
    Ok(())
}

pub fn update_assignment(conn: &Connection, a: &VehicleAssignment) -> anyhow::Result<bool> {
    let (rate_total, rate_per_day, rate_per_km, estimated_km, final_km) = rate_columns(&a.rate);
    let count = conn.execute(
        "UPDATE vehicle_assignments SET driver_name = ?1, driver_phone = ?2, rate_mode = ?3,
                                        rate_total = ?4, rate_per_day = ?5, rate_per_km = ?6,
                                        estimated_km = ?7, final_km = ?8, advance_amount = ?9,
                                        updated_at = ?10
         WHERE booking_id = ?11 AND vehicle_id = ?12",
        params![
            a.driver_name,
            a.driver_phone,
            a.rate.mode(),
            rate_total,
            rate_per_day,
            rate_per_km,
            estimated_km,
            final_km,
            a.advance_amount,
            fmt_dt(&a.updated_at),
            a.booking_id,
            a.vehicle_id,
        ],
    )?;
    Ok(count > 0)
}

pub fn delete_assignment(
    conn: &Connection,
    booking_id: &str,
    vehicle_id: &str,
) -> anyhow::Result<bool> {
    let count = conn.execute(
        "DELETE FROM vehicle_assignments WHERE booking_id = ?1 AND vehicle_id = ?2",
        params![booking_id, vehicle_id],
    )?;
    Ok(count > 0)
}

pub fn get_assignment(
    conn: &Connection,
    booking_id: &str,
    vehicle_id: &str,
) -> anyhow::Result<Option<VehicleAssignment>> {
    let result = conn
        .query_row(
            &format!("{ASSIGNMENT_SELECT} WHERE booking_id = ?1 AND vehicle_id = ?2"),
            params![booking_id, vehicle_id],
            |row| Ok(parse_assignment_row(row)),
        )
        .optional()?;

    match result {
        Some(assignment) => Ok(Some(assignment?)),
        None => Ok(None),
    }
}

pub fn get_assignments_for_booking(
    conn: &Connection,
    booking_id: &str,
) -> anyhow::Result<Vec<VehicleAssignment>> {
    let mut stmt = conn.prepare(&format!(
        "{ASSIGNMENT_SELECT} WHERE booking_id = ?1 ORDER BY vehicle_id ASC"
    ))?;
    let rows = stmt.query_map(params![booking_id], |row| Ok(parse_assignment_row(row)))?;

    let mut assignments = vec![];
    for row in rows {
        assignments.push(row??);
    }
    Ok(assignments)
}

const ASSIGNMENT_SELECT: &str =
    "SELECT booking_id, vehicle_id, driver_name, driver_phone, rate_mode, rate_total,
            rate_per_day, rate_per_km, estimated_km, final_km, advance_amount,
            created_at, updated_at
     FROM vehicle_assignments";

fn rate_columns(
    rate: &RateSpec,
) -> (
    Option<f64>,
    Option<f64>,
    Option<f64>,
    Option<f64>,
    Option<f64>,
) {
    match rate {
        RateSpec::Total { rate_total } => (Some(*rate_total), None, None, None, None),
        RateSpec::PerDay { rate_per_day } => (None, Some(*rate_per_day), None, None, None),
        RateSpec::PerKm {
            rate_per_km,
            estimated_km,
            final_km,
        } => (None, None, Some(*rate_per_km), Some(*estimated_km), *final_km),
        RateSpec::Hybrid {
            rate_per_day,
            rate_per_km,
            estimated_km,
            final_km,
        } => (
            None,
            Some(*rate_per_day),
            Some(*rate_per_km),
            Some(*estimated_km),
            *final_km,
        ),
    }
}

fn parse_assignment_row(row: &rusqlite::Row) -> anyhow::Result<VehicleAssignment> {
    let mode: String = row.get(4)?;
    let rate_total: Option<f64> = row.get(5)?;
    let rate_per_day: Option<f64> = row.get(6)?;
    let rate_per_km: Option<f64> = row.get(7)?;
    let estimated_km: Option<f64> = row.get(8)?;
    let final_km: Option<f64> = row.get(9)?;
    let created_at: String = row.get(11)?;
    let updated_at: String = row.get(12)?;

    let rate = match mode.as_str() {
        "total" => RateSpec::Total {
            rate_total: rate_total.unwrap_or(0.0),
        },
        "per_day" => RateSpec::PerDay {
            rate_per_day: rate_per_day.unwrap_or(0.0),
        },
        "per_km" => RateSpec::PerKm {
            rate_per_km: rate_per_km.unwrap_or(0.0),
            estimated_km: estimated_km.unwrap_or(0.0),
            final_km,
        },
        "hybrid" => RateSpec::Hybrid {
            rate_per_day: rate_per_day.unwrap_or(0.0),
            rate_per_km: rate_per_km.unwrap_or(0.0),
            estimated_km: estimated_km.unwrap_or(0.0),
            final_km,
        },
        other => {
            // Data-quality issue, not a hard failure: prices as zero.
            tracing::warn!("unknown rate mode '{other}' in stored assignment, pricing as 0");
            RateSpec::Total { rate_total: 0.0 }
        }
    };

    Ok(VehicleAssignment {
        booking_id: row.get(0)?,
        vehicle_id: row.get(1)?,
        driver_name: row.get(2)?,
        driver_phone: row.get(3)?,
        rate,
        advance_amount: row.get(10)?,
        created_at: parse_dt(&created_at),
        updated_at: parse_dt(&updated_at),
    })
}

// ── Vehicles (read-only reference data) ──

pub fn list_active_vehicles(conn: &Connection, org_id: &str) -> anyhow::Result<Vec<Vehicle>> {
    let mut stmt = conn.prepare(
        "SELECT id, org_id, plate_number, model, seats, is_active
         FROM vehicles WHERE org_id = ?1 AND is_active = 1 ORDER BY plate_number ASC",
    )?;
    let rows = stmt.query_map(params![org_id], |row| {
        Ok(Vehicle {
            id: row.get(0)?,
            org_id: row.get(1)?,
            plate_number: row.get(2)?,
            model: row.get(3)?,
            seats: row.get(4)?,
            is_active: row.get::<_, i32>(5)? != 0,
        })
    })?;

    let mut vehicles = vec![];
    for row in rows {
        vehicles.push(row?);
    }
    Ok(vehicles)
}

pub fn get_vehicle(conn: &Connection, org_id: &str, id: &str) -> anyhow::Result<Option<Vehicle>> {
    let result = conn
        .query_row(
            "SELECT id, org_id, plate_number, model, seats, is_active
             FROM vehicles WHERE id = ?1 AND org_id = ?2",
            params![id, org_id],
            |row| {
                Ok(Vehicle {
                    id: row.get(0)?,
                    org_id: row.get(1)?,
                    plate_number: row.get(2)?,
                    model: row.get(3)?,
                    seats: row.get(4)?,
                    is_active: row.get::<_, i32>(5)? != 0,
                })
            },
        )
        .optional()?;
    Ok(result)
}

/// Seeding helper. Vehicle master data is owned elsewhere; the core never
/// calls this outside tests and bootstrap scripts.
pub fn insert_vehicle(conn: &Connection, vehicle: &Vehicle) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO vehicles (id, org_id, plate_number, model, seats, is_active)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            vehicle.id,
            vehicle.org_id,
            vehicle.plate_number,
            vehicle.model,
            vehicle.seats,
            vehicle.is_active as i32,
        ],
    )?;
    Ok(())
}

// ── Availability ──

pub struct Conflict {
    pub vehicle_id: String,
    pub booking_ref: String,
    pub customer_name: String,
}

/// First holding-status assignment of `vehicle_id` overlapping the half-open
/// window `[start, end)`, skipping `exclude_booking_id`'s own assignments.
/// Timestamps are stored in a fixed-width format so string comparison orders
/// them correctly.
pub fn find_conflict(
    conn: &Connection,
    org_id: &str,
    vehicle_id: &str,
    start: &NaiveDateTime,
    end: &NaiveDateTime,
    exclude_booking_id: Option<&str>,
) -> anyhow::Result<Option<Conflict>> {
    let result = conn
        .query_row(
            "SELECT va.vehicle_id, b.booking_ref, b.customer_name
             FROM vehicle_assignments va
             JOIN bookings b ON b.id = va.booking_id
             WHERE va.vehicle_id = ?1 AND b.org_id = ?2
               AND b.status IN ('tentative', 'confirmed', 'ongoing')
               AND b.start_time < ?4 AND ?3 < b.end_time
               AND (?5 IS NULL OR va.booking_id != ?5)
             ORDER BY b.start_time ASC
             LIMIT 1",
            params![vehicle_id, org_id, fmt_dt(start), fmt_dt(end), exclude_booking_id],
            |row| {
                Ok(Conflict {
                    vehicle_id: row.get(0)?,
                    booking_ref: row.get(1)?,
                    customer_name: row.get(2)?,
                })
            },
        )
        .optional()?;
    Ok(result)
}

/// All holding-status conflicts in the window, one per vehicle (the earliest
/// conflicting booking wins the citation). Used by the advisory listing.
pub fn find_conflicts_in_window(
    conn: &Connection,
    org_id: &str,
    start: &NaiveDateTime,
    end: &NaiveDateTime,
    exclude_booking_id: Option<&str>,
) -> anyhow::Result<Vec<Conflict>> {
    let mut stmt = conn.prepare(
        "SELECT va.vehicle_id, b.booking_ref, b.customer_name
         FROM vehicle_assignments va
         JOIN bookings b ON b.id = va.booking_id
         WHERE b.org_id = ?1
           AND b.status IN ('tentative', 'confirmed', 'ongoing')
           AND b.start_time < ?3 AND ?2 < b.end_time
           AND (?4 IS NULL OR va.booking_id != ?4)
         ORDER BY va.vehicle_id ASC, b.start_time ASC",
    )?;
    let rows = stmt.query_map(
        params![org_id, fmt_dt(start), fmt_dt(end), exclude_booking_id],
        |row| {
            Ok(Conflict {
                vehicle_id: row.get(0)?,
                booking_ref: row.get(1)?,
                customer_name: row.get(2)?,
            })
        },
    )?;

    let mut conflicts: Vec<Conflict> = vec![];
    for row in rows {
        let conflict = row?;
        if conflicts.last().map(|c| c.vehicle_id.as_str()) != Some(conflict.vehicle_id.as_str()) {
            conflicts.push(conflict);
        }
    }
    Ok(conflicts)
}

// ── Audit log ──

pub fn insert_audit_entry(
    conn: &Connection,
    booking_id: &str,
    action: AuditAction,
    before: Option<&serde_json::Value>,
    after: &serde_json::Value,
    actor: &str,
    at: &NaiveDateTime,
) -> anyhow::Result<i64> {
    let before_json = match before {
        Some(v) => Some(serde_json::to_string(v)?),
        None => None,
    };
    conn.execute(
        "INSERT INTO audit_log (booking_id, action, before_snapshot, after_snapshot, actor, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            booking_id,
            action.as_str(),
            before_json,
            serde_json::to_string(after)?,
            actor,
            fmt_dt(at),
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn list_audit_entries(
    conn: &Connection,
    booking_id: &str,
) -> anyhow::Result<Vec<AuditLogEntry>> {
    let mut stmt = conn.prepare(
        "SELECT id, booking_id, action, before_snapshot, after_snapshot, actor, created_at
         FROM audit_log WHERE booking_id = ?1 ORDER BY id ASC",
    )?;
    let rows = stmt.query_map(params![booking_id], |row| {
        let action: String = row.get(2)?;
        let before_json: Option<String> = row.get(3)?;
        let after_json: String = row.get(4)?;
        let created_at: String = row.get(6)?;
        Ok((
            row.get::<_, i64>(0)?,
            row.get::<_, String>(1)?,
            action,
            before_json,
            after_json,
            row.get::<_, String>(5)?,
            created_at,
        ))
    })?;

    let mut entries = vec![];
    for row in rows {
        let (id, booking_id, action, before_json, after_json, actor, created_at) = row?;
        let before = match before_json {
            Some(json) => Some(serde_json::from_str(&json)?),
            None => None,
        };
        entries.push(AuditLogEntry {
            id,
            booking_id,
            action: AuditAction::parse(&action),
            before,
            after: serde_json::from_str(&after_json)?,
            actor,
            created_at: parse_dt(&created_at),
        });
    }
    Ok(entries)
}

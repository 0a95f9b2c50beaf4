use chrono::{NaiveDateTime, Utc};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::RateThresholds;
use crate::db::queries;
use crate::errors::AppError;
use crate::models::{
    AuditAction, AuditLogEntry, Booking, BookingStatus, RateSpec, VehicleAssignment,
};
use crate::services::{audit, availability, rates};

/// Caller identity injected by the upstream auth collaborator. Every
/// operation is scoped to `org_id`; `actor` is recorded on audit entries.
#[derive(Debug, Clone)]
pub struct OrgScope {
    pub org_id: String,
    pub actor: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BookingDraft {
    pub customer_name: String,
    pub customer_phone: String,
    pub trip_category: String,
    pub start_time: NaiveDateTime,
    pub end_time: NaiveDateTime,
    pub pickup: Option<String>,
    pub dropoff: Option<String>,
    pub notes: Option<String>,
    #[serde(default)]
    pub status: Option<BookingStatus>,
}

/// Partial update; `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BookingPatch {
    pub customer_name: Option<String>,
    pub customer_phone: Option<String>,
    pub trip_category: Option<String>,
    pub start_time: Option<NaiveDateTime>,
    pub end_time: Option<NaiveDateTime>,
    pub pickup: Option<String>,
    pub dropoff: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AssignmentSpec {
    pub driver_name: Option<String>,
    pub driver_phone: Option<String>,
    #[serde(flatten)]
    pub rate: RateSpec,
    #[serde(default)]
    pub advance_amount: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct AssignmentWithTotal {
    #[serde(flatten)]
    pub assignment: VehicleAssignment,
    /// Recomputed on read; once `final_km` is recorded it supersedes the
    /// estimate in the same formula.
    pub computed_total: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct BookingWithAssignments {
    #[serde(flatten)]
    pub booking: Booking,
    pub assignments: Vec<AssignmentWithTotal>,
}

fn validate_window(start: &NaiveDateTime, end: &NaiveDateTime) -> Result<(), AppError> {
    if end <= start {
        return Err(AppError::Validation("end must be after start".to_string()));
    }
    Ok(())
}

fn require_booking(conn: &Connection, scope: &OrgScope, id: &str) -> Result<Booking, AppError> {
    queries::get_booking(conn, &scope.org_id, id)?
        .ok_or_else(|| AppError::NotFound(format!("booking {id}")))
}

// ── Create ──

/// Reference codes are derived from the booking's uuid; on the rare
/// collision with an existing code, fresh candidates are drawn until one is
/// free. Runs inside the create transaction, so the chosen code cannot be
/// taken before the insert commits.
fn unique_booking_ref(conn: &Connection, seed: &str) -> Result<String, AppError> {
    let mut candidate = format!("BK-{}", seed[..8].to_uppercase());
    while queries::booking_ref_exists(conn, &candidate)? {
        candidate = format!("BK-{}", Uuid::new_v4().to_string()[..8].to_uppercase());
    }
    Ok(candidate)
}

pub fn create_booking(
    conn: &mut Connection,
    scope: &OrgScope,
    draft: BookingDraft,
) -> Result<Booking, AppError> {
    if draft.customer_name.trim().is_empty() {
        return Err(AppError::Validation("customer_name is required".to_string()));
    }
    if draft.customer_phone.trim().is_empty() {
        return Err(AppError::Validation("customer_phone is required".to_string()));
    }
    validate_window(&draft.start_time, &draft.end_time)?;

    let tx = conn.transaction()?;
    let now = Utc::now().naive_utc();
    let id = Uuid::new_v4().to_string();
    let booking = Booking {
        booking_ref: unique_booking_ref(&tx, &id)?,
        id,
        org_id: scope.org_id.clone(),
        customer_name: draft.customer_name,
        customer_phone: draft.customer_phone,
        trip_category: draft.trip_category,
        start_time: draft.start_time,
        end_time: draft.end_time,
        pickup: draft.pickup,
        dropoff: draft.dropoff,
        notes: draft.notes,
        status: draft.status.unwrap_or(BookingStatus::Inquiry),
        created_by: scope.actor.clone(),
        updated_by: scope.actor.clone(),
        created_at: now,
        updated_at: now,
    };

    queries::insert_booking(&tx, &booking)?;
    audit::record(
        &tx,
        &booking.id,
        AuditAction::Created,
        None::<&Booking>,
        &booking,
        &scope.actor,
        &now,
    )?;
    tx.commit()?;

    tracing::info!(booking_ref = %booking.booking_ref, "booking created");
    Ok(booking)
}

// ── Update details ──

pub fn update_details(
    conn: &mut Connection,
    scope: &OrgScope,
    id: &str,
    patch: BookingPatch,
    thresholds: &RateThresholds,
) -> Result<Booking, AppError> {
    let tx = conn.transaction()?;
    let before = require_booking(&tx, scope, id)?;
    let mut booking = before.clone();

    if let Some(name) = patch.customer_name {
        if name.trim().is_empty() {
            return Err(AppError::Validation("customer_name is required".to_string()));
        }
        booking.customer_name = name;
    }
    if let Some(phone) = patch.customer_phone {
        if phone.trim().is_empty() {
            return Err(AppError::Validation("customer_phone is required".to_string()));
        }
        booking.customer_phone = phone;
    }
    if let Some(category) = patch.trip_category {
        booking.trip_category = category;
    }
    if let Some(start) = patch.start_time {
        booking.start_time = start;
    }
    if let Some(end) = patch.end_time {
        booking.end_time = end;
    }
    if let Some(pickup) = patch.pickup {
        booking.pickup = Some(pickup);
    }
    if let Some(dropoff) = patch.dropoff {
        booking.dropoff = Some(dropoff);
    }
    if let Some(notes) = patch.notes {
        booking.notes = Some(notes);
    }

    validate_window(&booking.start_time, &booking.end_time)?;

    let dates_changed =
        booking.start_time != before.start_time || booking.end_time != before.end_time;
    let details_changed = booking.customer_name != before.customer_name
        || booking.customer_phone != before.customer_phone
        || booking.trip_category != before.trip_category
        || booking.pickup != before.pickup
        || booking.dropoff != before.dropoff
        || booking.notes != before.notes;

    if !dates_changed && !details_changed {
        return Ok(before);
    }

    // A date change affects every assignment: a holding booking's vehicles
    // must still fit the new window, and the new duration changes each
    // computed total, which must still cover any standing advance. Both
    // checks run inside this transaction, before the write.
    if dates_changed {
        let days = rates::trip_duration_days(&booking.start_time, &booking.end_time);
        for assignment in queries::get_assignments_for_booking(&tx, id)? {
            if booking.status.is_holding() {
                availability::gate(
                    &tx,
                    &scope.org_id,
                    &assignment.vehicle_id,
                    &booking.start_time,
                    &booking.end_time,
                    Some(id),
                )?;
            }
            let total = rates::compute_total(&assignment.rate, days, thresholds);
            if assignment.advance_amount > total {
                return Err(AppError::Validation(format!(
                    "advance exceeds total for vehicle {}: {} > {}",
                    assignment.vehicle_id, assignment.advance_amount, total
                )));
            }
        }
    }

    let now = Utc::now().naive_utc();
    booking.updated_by = scope.actor.clone();
    booking.updated_at = now;
    queries::update_booking(&tx, &booking)?;

    if dates_changed {
        audit::record(
            &tx,
            id,
            AuditAction::DateChanged,
            Some(&before),
            &booking,
            &scope.actor,
            &now,
        )?;
    }
    if details_changed {
        audit::record(
            &tx,
            id,
            AuditAction::Updated,
            Some(&before),
            &booking,
            &scope.actor,
            &now,
        )?;
    }
    tx.commit()?;

    Ok(booking)
}

// ── Status transitions ──

pub fn change_status(
    conn: &mut Connection,
    scope: &OrgScope,
    id: &str,
    new_status: BookingStatus,
    confirm: bool,
) -> Result<Booking, AppError> {
    let tx = conn.transaction()?;
    let before = require_booking(&tx, scope, id)?;

    if before.status.is_terminal() {
        return Err(AppError::InvalidTransition(format!(
            "booking is {} and cannot change status",
            before.status.as_str()
        )));
    }
    if new_status == before.status {
        return Err(AppError::InvalidTransition(format!(
            "booking is already {}",
            new_status.as_str()
        )));
    }
    if new_status.requires_confirmation() && !confirm {
        return Err(AppError::Validation(format!(
            "transition to {} requires confirm=true",
            new_status.as_str()
        )));
    }

    // Entering a holding status makes this booking's assignments start
    // occupying availability, so they must pass the gate now.
    if new_status.is_holding() && !before.status.is_holding() {
        for assignment in queries::get_assignments_for_booking(&tx, id)? {
            availability::gate(
                &tx,
                &scope.org_id,
                &assignment.vehicle_id,
                &before.start_time,
                &before.end_time,
                Some(id),
            )?;
        }
    }

    let now = Utc::now().naive_utc();
    let mut booking = before.clone();
    booking.status = new_status;
    booking.updated_by = scope.actor.clone();
    booking.updated_at = now;
    queries::update_booking(&tx, &booking)?;

    audit::record(
        &tx,
        id,
        AuditAction::StatusChanged,
        Some(&before),
        &booking,
        &scope.actor,
        &now,
    )?;
    tx.commit()?;

    tracing::info!(
        booking_ref = %booking.booking_ref,
        from = before.status.as_str(),
        to = new_status.as_str(),
        "status changed"
    );
    Ok(booking)
}

// ── Vehicle assignment ──

/// Upserts the assignment for `(booking, vehicle)`: insert on first assign,
/// update in place after. The availability gate, the write and the audit
/// entry share one transaction, so concurrent assigns for the same vehicle
/// and overlapping windows cannot both succeed.
pub fn assign_vehicle(
    conn: &mut Connection,
    scope: &OrgScope,
    booking_id: &str,
    vehicle_id: &str,
    spec: AssignmentSpec,
    thresholds: &RateThresholds,
) -> Result<VehicleAssignment, AppError> {
    spec.rate.validate().map_err(AppError::Validation)?;
    if spec.advance_amount < 0.0 {
        return Err(AppError::Validation(
            "advance_amount must not be negative".to_string(),
        ));
    }

    let tx = conn.transaction()?;
    let booking = require_booking(&tx, scope, booking_id)?;

    let vehicle = queries::get_vehicle(&tx, &scope.org_id, vehicle_id)?
        .ok_or_else(|| AppError::NotFound(format!("vehicle {vehicle_id}")))?;
    if !vehicle.is_active {
        return Err(AppError::Validation(format!(
            "vehicle {} is not active",
            vehicle.plate_number
        )));
    }

    // Advance is bounded by the total as computed now, not as it was when
    // the advance was entered. A rate edit that lowers the total below an
    // existing advance is rejected here.
    let days = rates::trip_duration_days(&booking.start_time, &booking.end_time);
    let total = rates::compute_total(&spec.rate, days, thresholds);
    if spec.advance_amount > total {
        return Err(AppError::Validation(format!(
            "advance exceeds total: {} > {}",
            spec.advance_amount, total
        )));
    }

    // Only holding bookings occupy availability; assigning to an inquiry or
    // a completed booking cannot double-book anything.
    if booking.status.is_holding() {
        availability::gate(
            &tx,
            &scope.org_id,
            vehicle_id,
            &booking.start_time,
            &booking.end_time,
            Some(booking_id),
        )?;
    }

    let now = Utc::now().naive_utc();
    let existing = queries::get_assignment(&tx, booking_id, vehicle_id)?;
    let assignment = VehicleAssignment {
        booking_id: booking_id.to_string(),
        vehicle_id: vehicle_id.to_string(),
        driver_name: spec.driver_name,
        driver_phone: spec.driver_phone,
        rate: spec.rate,
        advance_amount: spec.advance_amount,
        created_at: existing.as_ref().map(|e| e.created_at).unwrap_or(now),
        updated_at: now,
    };

    let action = match &existing {
        Some(_) => {
            queries::update_assignment(&tx, &assignment)?;
            AuditAction::RateChanged
        }
        None => {
            queries::insert_assignment(&tx, &assignment)?;
            AuditAction::VehicleAssigned
        }
    };

    audit::record(
        &tx,
        booking_id,
        action,
        existing.as_ref(),
        &assignment,
        &scope.actor,
        &now,
    )?;
    tx.commit()?;

    tracing::info!(
        booking_ref = %booking.booking_ref,
        vehicle_id,
        action = action.as_str(),
        "vehicle assignment saved"
    );
    Ok(assignment)
}

pub fn remove_vehicle(
    conn: &mut Connection,
    scope: &OrgScope,
    booking_id: &str,
    vehicle_id: &str,
) -> Result<(), AppError> {
    let tx = conn.transaction()?;
    require_booking(&tx, scope, booking_id)?;

    let existing = queries::get_assignment(&tx, booking_id, vehicle_id)?.ok_or_else(|| {
        AppError::NotFound(format!("assignment of vehicle {vehicle_id} to booking {booking_id}"))
    })?;

    queries::delete_assignment(&tx, booking_id, vehicle_id)?;

    let now = Utc::now().naive_utc();
    audit::record(
        &tx,
        booking_id,
        AuditAction::VehicleRemoved,
        Some(&existing),
        &serde_json::Value::Null,
        &scope.actor,
        &now,
    )?;
    tx.commit()?;

    Ok(())
}

// ── Reads ──

pub fn get_booking_with_assignments(
    conn: &Connection,
    scope: &OrgScope,
    id: &str,
    thresholds: &RateThresholds,
) -> Result<BookingWithAssignments, AppError> {
    let booking = require_booking(conn, scope, id)?;
    let days = rates::trip_duration_days(&booking.start_time, &booking.end_time);

    let assignments = queries::get_assignments_for_booking(conn, id)?
        .into_iter()
        .map(|assignment| AssignmentWithTotal {
            computed_total: rates::compute_total(&assignment.rate, days, thresholds),
            assignment,
        })
        .collect();

    Ok(BookingWithAssignments { booking, assignments })
}

pub fn list_audit_log(
    conn: &Connection,
    scope: &OrgScope,
    booking_id: &str,
) -> Result<Vec<AuditLogEntry>, AppError> {
    require_booking(conn, scope, booking_id)?;
    Ok(queries::list_audit_entries(conn, booking_id)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::models::Vehicle;

    fn thresholds() -> RateThresholds {
        RateThresholds {
            min_km_per_day: 100.0,
            min_km_hybrid_per_day: 100.0,
        }
    }

    fn scope() -> OrgScope {
        OrgScope {
            org_id: "org1".to_string(),
            actor: "tester".to_string(),
        }
    }

    fn setup_db() -> Connection {
        let conn = db::init_db(":memory:").unwrap();
        for (id, plate) in [("v1", "KA-01-1111"), ("v2", "KA-01-2222")] {
            queries::insert_vehicle(
                &conn,
                &Vehicle {
                    id: id.to_string(),
                    org_id: "org1".to_string(),
                    plate_number: plate.to_string(),
                    model: "Innova".to_string(),
                    seats: 7,
                    is_active: true,
                },
            )
            .unwrap();
        }
        conn
    }

    fn dt(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M").unwrap()
    }

    fn draft(start: &str, end: &str, status: Option<BookingStatus>) -> BookingDraft {
        BookingDraft {
            customer_name: "Alice".to_string(),
            customer_phone: "+911234567890".to_string(),
            trip_category: "outstation".to_string(),
            start_time: dt(start),
            end_time: dt(end),
            pickup: Some("Airport".to_string()),
            dropoff: None,
            notes: None,
            status,
        }
    }

    fn per_day(rate: f64, advance: f64) -> AssignmentSpec {
        AssignmentSpec {
            driver_name: None,
            driver_phone: None,
            rate: RateSpec::PerDay { rate_per_day: rate },
            advance_amount: advance,
        }
    }

    #[test]
    fn test_create_defaults_to_inquiry_and_audits() {
        let mut conn = setup_db();
        let booking =
            create_booking(&mut conn, &scope(), draft("2025-06-01 09:00", "2025-06-03 18:00", None))
                .unwrap();

        assert_eq!(booking.status, BookingStatus::Inquiry);
        assert!(booking.booking_ref.starts_with("BK-"));

        let entries = queries::list_audit_entries(&conn, &booking.id).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].action, AuditAction::Created);
        assert!(entries[0].before.is_none());
    }

    #[test]
    fn test_booking_ref_retries_past_a_taken_candidate() {
        let mut conn = setup_db();
        let booking =
            create_booking(&mut conn, &scope(), draft("2025-06-01 09:00", "2025-06-03 18:00", None))
                .unwrap();

        // same seed would reproduce the stored ref, so the helper must pick another
        let fresh = unique_booking_ref(&conn, &booking.id).unwrap();
        assert!(fresh.starts_with("BK-"));
        assert_ne!(fresh, booking.booking_ref);
    }

    #[test]
    fn test_create_rejects_inverted_dates_and_blank_customer() {
        let mut conn = setup_db();
        let result = create_booking(
            &mut conn,
            &scope(),
            draft("2025-06-03 18:00", "2025-06-01 09:00", None),
        );
        assert!(matches!(result, Err(AppError::Validation(_))));

        let mut bad = draft("2025-06-01 09:00", "2025-06-03 18:00", None);
        bad.customer_name = "  ".to_string();
        assert!(matches!(
            create_booking(&mut conn, &scope(), bad),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn test_assign_vehicle_per_day_total() {
        let mut conn = setup_db();
        let booking = create_booking(
            &mut conn,
            &scope(),
            draft("2025-06-01 09:00", "2025-06-03 18:00", Some(BookingStatus::Confirmed)),
        )
        .unwrap();

        let assignment =
            assign_vehicle(&mut conn, &scope(), &booking.id, "v1", per_day(2000.0, 0.0), &thresholds())
                .unwrap();
        assert_eq!(assignment.rate, RateSpec::PerDay { rate_per_day: 2000.0 });

        let detail =
            get_booking_with_assignments(&conn, &scope(), &booking.id, &thresholds()).unwrap();
        assert_eq!(detail.assignments.len(), 1);
        assert_eq!(detail.assignments[0].computed_total, 4000.0);
    }

    #[test]
    fn test_double_booking_rejected_with_conflict_ref() {
        let mut conn = setup_db();
        let b1 = create_booking(
            &mut conn,
            &scope(),
            draft("2025-06-01 09:00", "2025-06-03 18:00", Some(BookingStatus::Confirmed)),
        )
        .unwrap();
        assign_vehicle(&mut conn, &scope(), &b1.id, "v1", per_day(2000.0, 0.0), &thresholds())
            .unwrap();

        let b2 = create_booking(
            &mut conn,
            &scope(),
            draft("2025-06-02 10:00", "2025-06-04 10:00", Some(BookingStatus::Tentative)),
        )
        .unwrap();
        let result =
            assign_vehicle(&mut conn, &scope(), &b2.id, "v1", per_day(2000.0, 0.0), &thresholds());

        match result {
            Err(AppError::AvailabilityConflict { conflict_ref, .. }) => {
                assert_eq!(conflict_ref, b1.booking_ref);
            }
            other => panic!("expected AvailabilityConflict, got {other:?}"),
        }

        // a different vehicle is fine
        assign_vehicle(&mut conn, &scope(), &b2.id, "v2", per_day(1800.0, 0.0), &thresholds())
            .unwrap();
    }

    #[test]
    fn test_assign_to_inquiry_never_gated_and_reserves_nothing() {
        let mut conn = setup_db();
        let b1 = create_booking(
            &mut conn,
            &scope(),
            draft("2025-06-01 09:00", "2025-06-03 18:00", None),
        )
        .unwrap();
        assign_vehicle(&mut conn, &scope(), &b1.id, "v1", per_day(2000.0, 0.0), &thresholds())
            .unwrap();

        // same vehicle, same window, holding booking: the inquiry blocks nothing
        let b2 = create_booking(
            &mut conn,
            &scope(),
            draft("2025-06-01 09:00", "2025-06-03 18:00", Some(BookingStatus::Confirmed)),
        )
        .unwrap();
        assign_vehicle(&mut conn, &scope(), &b2.id, "v1", per_day(2000.0, 0.0), &thresholds())
            .unwrap();
    }

    #[test]
    fn test_promoting_inquiry_regates_assignments() {
        let mut conn = setup_db();
        let b1 = create_booking(
            &mut conn,
            &scope(),
            draft("2025-06-01 09:00", "2025-06-03 18:00", None),
        )
        .unwrap();
        assign_vehicle(&mut conn, &scope(), &b1.id, "v1", per_day(2000.0, 0.0), &thresholds())
            .unwrap();

        let b2 = create_booking(
            &mut conn,
            &scope(),
            draft("2025-06-02 00:00", "2025-06-04 00:00", Some(BookingStatus::Confirmed)),
        )
        .unwrap();
        assign_vehicle(&mut conn, &scope(), &b2.id, "v1", per_day(2000.0, 0.0), &thresholds())
            .unwrap();

        // b1's window now collides with b2, so it cannot start holding
        let result = change_status(&mut conn, &scope(), &b1.id, BookingStatus::Tentative, false);
        assert!(matches!(result, Err(AppError::AvailabilityConflict { .. })));
    }

    #[test]
    fn test_status_machine_rules() {
        let mut conn = setup_db();
        let booking = create_booking(
            &mut conn,
            &scope(),
            draft("2025-06-01 09:00", "2025-06-03 18:00", None),
        )
        .unwrap();

        // confirmed requires the confirmation flag
        let result =
            change_status(&mut conn, &scope(), &booking.id, BookingStatus::Confirmed, false);
        assert!(matches!(result, Err(AppError::Validation(_))));

        change_status(&mut conn, &scope(), &booking.id, BookingStatus::Confirmed, true).unwrap();
        change_status(&mut conn, &scope(), &booking.id, BookingStatus::Completed, false).unwrap();

        // terminal states are final
        let result =
            change_status(&mut conn, &scope(), &booking.id, BookingStatus::Ongoing, true);
        assert!(matches!(result, Err(AppError::InvalidTransition(_))));

        let entries = queries::list_audit_entries(&conn, &booking.id).unwrap();
        let status_changes: Vec<_> = entries
            .iter()
            .filter(|e| e.action == AuditAction::StatusChanged)
            .collect();
        assert_eq!(status_changes.len(), 2);
    }

    #[test]
    fn test_same_status_transition_rejected() {
        let mut conn = setup_db();
        let booking = create_booking(
            &mut conn,
            &scope(),
            draft("2025-06-01 09:00", "2025-06-03 18:00", None),
        )
        .unwrap();
        let result =
            change_status(&mut conn, &scope(), &booking.id, BookingStatus::Inquiry, false);
        assert!(matches!(result, Err(AppError::InvalidTransition(_))));
    }

    #[test]
    fn test_date_change_gated_for_holding_booking() {
        let mut conn = setup_db();
        let b1 = create_booking(
            &mut conn,
            &scope(),
            draft("2025-06-01 09:00", "2025-06-03 18:00", Some(BookingStatus::Confirmed)),
        )
        .unwrap();
        assign_vehicle(&mut conn, &scope(), &b1.id, "v1", per_day(2000.0, 0.0), &thresholds())
            .unwrap();

        let b2 = create_booking(
            &mut conn,
            &scope(),
            draft("2025-06-05 09:00", "2025-06-07 18:00", Some(BookingStatus::Confirmed)),
        )
        .unwrap();
        assign_vehicle(&mut conn, &scope(), &b2.id, "v1", per_day(2000.0, 0.0), &thresholds())
            .unwrap();

        // moving b1 onto b2's window must fail and leave b1 untouched
        let result = update_details(
            &mut conn,
            &scope(),
            &b1.id,
            BookingPatch {
                start_time: Some(dt("2025-06-05 09:00")),
                end_time: Some(dt("2025-06-07 18:00")),
                ..Default::default()
            },
            &thresholds(),
        );
        assert!(matches!(result, Err(AppError::AvailabilityConflict { .. })));

        let unchanged = queries::get_booking(&conn, "org1", &b1.id).unwrap().unwrap();
        assert_eq!(unchanged.start_time, dt("2025-06-01 09:00"));

        // moving to a free window succeeds and emits date_changed
        update_details(
            &mut conn,
            &scope(),
            &b1.id,
            BookingPatch {
                start_time: Some(dt("2025-06-10 09:00")),
                end_time: Some(dt("2025-06-12 18:00")),
                ..Default::default()
            },
            &thresholds(),
        )
        .unwrap();

        let entries = queries::list_audit_entries(&conn, &b1.id).unwrap();
        assert!(entries.iter().any(|e| e.action == AuditAction::DateChanged));
    }

    #[test]
    fn test_update_emits_updated_for_detail_changes() {
        let mut conn = setup_db();
        let booking = create_booking(
            &mut conn,
            &scope(),
            draft("2025-06-01 09:00", "2025-06-03 18:00", None),
        )
        .unwrap();

        let updated = update_details(
            &mut conn,
            &scope(),
            &booking.id,
            BookingPatch {
                notes: Some("airport pickup at gate 3".to_string()),
                ..Default::default()
            },
            &thresholds(),
        )
        .unwrap();
        assert_eq!(updated.notes.as_deref(), Some("airport pickup at gate 3"));
        assert_eq!(updated.booking_ref, booking.booking_ref);

        let entries = queries::list_audit_entries(&conn, &booking.id).unwrap();
        assert_eq!(entries.last().unwrap().action, AuditAction::Updated);
    }

    #[test]
    fn test_advance_bound_enforced_at_commit_time() {
        let mut conn = setup_db();
        let booking = create_booking(
            &mut conn,
            &scope(),
            draft("2025-06-01 09:00", "2025-06-03 18:00", Some(BookingStatus::Confirmed)),
        )
        .unwrap();

        // 2 days * 2000 = 4000; advance above that is rejected
        let result = assign_vehicle(
            &mut conn,
            &scope(),
            &booking.id,
            "v1",
            per_day(2000.0, 4500.0),
            &thresholds(),
        );
        assert!(matches!(result, Err(AppError::Validation(_))));

        assign_vehicle(&mut conn, &scope(), &booking.id, "v1", per_day(2000.0, 4000.0), &thresholds())
            .unwrap();

        // a rate edit that lowers the total below the standing advance fails
        let result = assign_vehicle(
            &mut conn,
            &scope(),
            &booking.id,
            "v1",
            per_day(1000.0, 4000.0),
            &thresholds(),
        );
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[test]
    fn test_date_change_rechecks_advance_against_new_total() {
        let mut conn = setup_db();
        let booking = create_booking(
            &mut conn,
            &scope(),
            draft("2025-06-01 09:00", "2025-06-03 18:00", Some(BookingStatus::Confirmed)),
        )
        .unwrap();

        // 2 days * 2000 = 4000; advance fills it exactly
        assign_vehicle(&mut conn, &scope(), &booking.id, "v1", per_day(2000.0, 4000.0), &thresholds())
            .unwrap();

        // shortening to 1 day drops the total to 2000, below the standing advance
        let result = update_details(
            &mut conn,
            &scope(),
            &booking.id,
            BookingPatch {
                end_time: Some(dt("2025-06-02 18:00")),
                ..Default::default()
            },
            &thresholds(),
        );
        assert!(matches!(result, Err(AppError::Validation(_))));

        let unchanged = queries::get_booking(&conn, "org1", &booking.id).unwrap().unwrap();
        assert_eq!(unchanged.end_time, dt("2025-06-03 18:00"));
        let kept = queries::get_assignment(&conn, &booking.id, "v1").unwrap().unwrap();
        assert_eq!(kept.advance_amount, 4000.0);

        // extending the trip only raises the total, so it goes through
        let extended = update_details(
            &mut conn,
            &scope(),
            &booking.id,
            BookingPatch {
                end_time: Some(dt("2025-06-05 18:00")),
                ..Default::default()
            },
            &thresholds(),
        )
        .unwrap();
        assert_eq!(extended.end_time, dt("2025-06-05 18:00"));
    }

    #[test]
    fn test_reassign_same_vehicle_updates_in_place_as_rate_change() {
        let mut conn = setup_db();
        let booking = create_booking(
            &mut conn,
            &scope(),
            draft("2025-06-01 09:00", "2025-06-03 18:00", Some(BookingStatus::Confirmed)),
        )
        .unwrap();

        assign_vehicle(&mut conn, &scope(), &booking.id, "v1", per_day(2000.0, 0.0), &thresholds())
            .unwrap();
        assign_vehicle(&mut conn, &scope(), &booking.id, "v1", per_day(2500.0, 0.0), &thresholds())
            .unwrap();

        let detail =
            get_booking_with_assignments(&conn, &scope(), &booking.id, &thresholds()).unwrap();
        assert_eq!(detail.assignments.len(), 1);
        assert_eq!(detail.assignments[0].computed_total, 5000.0);

        let entries = queries::list_audit_entries(&conn, &booking.id).unwrap();
        assert_eq!(entries.last().unwrap().action, AuditAction::RateChanged);
    }

    #[test]
    fn test_final_km_settlement_flow() {
        // spec worked example: per_km 10/km, estimate 50, floor 100 km/day,
        // 2 days -> 2000; final_km 250 -> 2500; advance 2400 stays valid,
        // 2600 is rejected.
        let mut conn = setup_db();
        let booking = create_booking(
            &mut conn,
            &scope(),
            draft("2025-06-01 09:00", "2025-06-03 18:00", Some(BookingStatus::Confirmed)),
        )
        .unwrap();

        let spec = AssignmentSpec {
            driver_name: None,
            driver_phone: None,
            rate: RateSpec::PerKm {
                rate_per_km: 10.0,
                estimated_km: 50.0,
                final_km: None,
            },
            advance_amount: 0.0,
        };
        assign_vehicle(&mut conn, &scope(), &booking.id, "v1", spec, &thresholds()).unwrap();

        let detail =
            get_booking_with_assignments(&conn, &scope(), &booking.id, &thresholds()).unwrap();
        assert_eq!(detail.assignments[0].computed_total, 2000.0);

        change_status(&mut conn, &scope(), &booking.id, BookingStatus::Completed, false).unwrap();

        let settle = |advance: f64| AssignmentSpec {
            driver_name: None,
            driver_phone: None,
            rate: RateSpec::PerKm {
                rate_per_km: 10.0,
                estimated_km: 50.0,
                final_km: Some(250.0),
            },
            advance_amount: advance,
        };

        assign_vehicle(&mut conn, &scope(), &booking.id, "v1", settle(2400.0), &thresholds())
            .unwrap();
        let detail =
            get_booking_with_assignments(&conn, &scope(), &booking.id, &thresholds()).unwrap();
        assert_eq!(detail.assignments[0].computed_total, 2500.0);

        let result =
            assign_vehicle(&mut conn, &scope(), &booking.id, "v1", settle(2600.0), &thresholds());
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[test]
    fn test_remove_vehicle_audits_before_snapshot() {
        let mut conn = setup_db();
        let booking = create_booking(
            &mut conn,
            &scope(),
            draft("2025-06-01 09:00", "2025-06-03 18:00", Some(BookingStatus::Confirmed)),
        )
        .unwrap();
        assign_vehicle(&mut conn, &scope(), &booking.id, "v1", per_day(2000.0, 0.0), &thresholds())
            .unwrap();

        remove_vehicle(&mut conn, &scope(), &booking.id, "v1").unwrap();

        let detail =
            get_booking_with_assignments(&conn, &scope(), &booking.id, &thresholds()).unwrap();
        assert!(detail.assignments.is_empty());

        let entries = queries::list_audit_entries(&conn, &booking.id).unwrap();
        let removal = entries.last().unwrap();
        assert_eq!(removal.action, AuditAction::VehicleRemoved);
        let before = removal.before.as_ref().unwrap();
        assert_eq!(before["vehicle_id"], "v1");

        // removing again is NotFound
        let result = remove_vehicle(&mut conn, &scope(), &booking.id, "v1");
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    #[test]
    fn test_cross_org_access_is_not_found() {
        let mut conn = setup_db();
        let booking = create_booking(
            &mut conn,
            &scope(),
            draft("2025-06-01 09:00", "2025-06-03 18:00", None),
        )
        .unwrap();

        let other = OrgScope {
            org_id: "org2".to_string(),
            actor: "intruder".to_string(),
        };
        assert!(matches!(
            get_booking_with_assignments(&conn, &other, &booking.id, &thresholds()),
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            change_status(&mut conn, &other, &booking.id, BookingStatus::Cancelled, false),
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            list_audit_log(&conn, &other, &booking.id),
            Err(AppError::NotFound(_))
        ));
    }

    #[test]
    fn test_audit_trail_is_complete_per_mutation() {
        let mut conn = setup_db();
        let booking = create_booking(
            &mut conn,
            &scope(),
            draft("2025-06-01 09:00", "2025-06-03 18:00", None),
        )
        .unwrap();
        change_status(&mut conn, &scope(), &booking.id, BookingStatus::Tentative, false).unwrap();
        assign_vehicle(&mut conn, &scope(), &booking.id, "v1", per_day(2000.0, 0.0), &thresholds())
            .unwrap();
        update_details(
            &mut conn,
            &scope(),
            &booking.id,
            BookingPatch {
                notes: Some("note".to_string()),
                ..Default::default()
            },
            &thresholds(),
        )
        .unwrap();
        remove_vehicle(&mut conn, &scope(), &booking.id, "v1").unwrap();

        let entries = list_audit_log(&conn, &scope(), &booking.id).unwrap();
        let actions: Vec<_> = entries.iter().map(|e| e.action).collect();
        assert_eq!(
            actions,
            vec![
                AuditAction::Created,
                AuditAction::StatusChanged,
                AuditAction::VehicleAssigned,
                AuditAction::Updated,
                AuditAction::VehicleRemoved,
            ]
        );

        // folding the after-snapshots reconstructs current state
        let last_booking_snapshot = entries
            .iter()
            .rev()
            .find(|e| {
                matches!(
                    e.action,
                    AuditAction::Created
                        | AuditAction::Updated
                        | AuditAction::StatusChanged
                        | AuditAction::DateChanged
                )
            })
            .unwrap();
        let current = queries::get_booking(&conn, "org1", &booking.id).unwrap().unwrap();
        assert_eq!(last_booking_snapshot.after["status"], current.status.as_str());
        assert_eq!(
            last_booking_snapshot.after["notes"],
            serde_json::json!("note")
        );
    }
}

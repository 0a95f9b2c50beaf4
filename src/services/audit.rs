use chrono::NaiveDateTime;
use rusqlite::Connection;
use serde::Serialize;

use crate::db::queries;
use crate::models::AuditAction;

/// Appends one immutable entry for an accepted mutation. Callers pass the
/// transaction's connection so the entry commits or rolls back with the
/// mutation it describes.
pub fn record<B: Serialize, A: Serialize>(
    conn: &Connection,
    booking_id: &str,
    action: AuditAction,
    before: Option<&B>,
    after: &A,
    actor: &str,
    at: &NaiveDateTime,
) -> anyhow::Result<i64> {
    let before_snapshot = match before {
        Some(b) => Some(serde_json::to_value(b)?),
        None => None,
    };
    let after_snapshot = serde_json::to_value(after)?;

    queries::insert_audit_entry(
        conn,
        booking_id,
        action,
        before_snapshot.as_ref(),
        &after_snapshot,
        actor,
        at,
    )
}

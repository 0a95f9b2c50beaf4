use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Immutable record of one accepted mutation: written in the same
/// transaction as the mutation, never updated or deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub id: i64,
    pub booking_id: String,
    pub action: AuditAction,
    /// Entity snapshot before the change. Null for `created`.
    pub before: Option<serde_json::Value>,
    pub after: serde_json::Value,
    pub actor: String,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Created,
    Updated,
    StatusChanged,
    VehicleAssigned,
    VehicleRemoved,
    DateChanged,
    RateChanged,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Created => "created",
            AuditAction::Updated => "updated",
            AuditAction::StatusChanged => "status_changed",
            AuditAction::VehicleAssigned => "vehicle_assigned",
            AuditAction::VehicleRemoved => "vehicle_removed",
            AuditAction::DateChanged => "date_changed",
            AuditAction::RateChanged => "rate_changed",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "updated" => AuditAction::Updated,
            "status_changed" => AuditAction::StatusChanged,
            "vehicle_assigned" => AuditAction::VehicleAssigned,
            "vehicle_removed" => AuditAction::VehicleRemoved,
            "date_changed" => AuditAction::DateChanged,
            "rate_changed" => AuditAction::RateChanged,
            _ => AuditAction::Created,
        }
    }
}

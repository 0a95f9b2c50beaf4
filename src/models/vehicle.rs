use serde::{Deserialize, Serialize};

/// Fleet reference data. Owned by the vehicle master-data subsystem; this
/// core only reads it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vehicle {
    pub id: String,
    pub org_id: String,
    pub plate_number: String,
    pub model: String,
    pub seats: i32,
    pub is_active: bool,
}

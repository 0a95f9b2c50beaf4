use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Booking {
    pub id: String,
    pub org_id: String,
    /// Human-readable reference code, assigned once at creation.
    pub booking_ref: String,
    pub customer_name: String,
    pub customer_phone: String,
    pub trip_category: String,
    pub start_time: NaiveDateTime,
    pub end_time: NaiveDateTime,
    pub pickup: Option<String>,
    pub dropoff: Option<String>,
    pub notes: Option<String>,
    pub status: BookingStatus,
    pub created_by: String,
    pub updated_by: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Inquiry,
    Tentative,
    Confirmed,
    Ongoing,
    Completed,
    Cancelled,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Inquiry => "inquiry",
            BookingStatus::Tentative => "tentative",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Ongoing => "ongoing",
            BookingStatus::Completed => "completed",
            BookingStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "tentative" => BookingStatus::Tentative,
            "confirmed" => BookingStatus::Confirmed,
            "ongoing" => BookingStatus::Ongoing,
            "completed" => BookingStatus::Completed,
            "cancelled" => BookingStatus::Cancelled,
            _ => BookingStatus::Inquiry,
        }
    }

    /// A holding status occupies real vehicle availability. An inquiry is a
    /// soft request and reserves nothing; terminal bookings release their
    /// vehicles.
    pub fn is_holding(&self) -> bool {
        matches!(
            self,
            BookingStatus::Tentative | BookingStatus::Confirmed | BookingStatus::Ongoing
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, BookingStatus::Completed | BookingStatus::Cancelled)
    }

    /// Transitions into these states require the caller's explicit
    /// confirmation flag.
    pub fn requires_confirmation(&self) -> bool {
        matches!(self, BookingStatus::Confirmed | BookingStatus::Ongoing)
    }
}

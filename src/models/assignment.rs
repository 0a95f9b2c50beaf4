use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// One vehicle bound to one booking for its duration, with its own pricing
/// terms. Upserted per `(booking_id, vehicle_id)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VehicleAssignment {
    pub booking_id: String,
    pub vehicle_id: String,
    pub driver_name: Option<String>,
    pub driver_phone: Option<String>,
    #[serde(flatten)]
    pub rate: RateSpec,
    pub advance_amount: f64,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

/// Pricing terms keyed by rate mode. Each variant carries only the fields
/// that mode uses, so "which fields are required" is a property of the type.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum RateSpec {
    Total {
        rate_total: f64,
    },
    PerDay {
        rate_per_day: f64,
    },
    PerKm {
        rate_per_km: f64,
        estimated_km: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        final_km: Option<f64>,
    },
    Hybrid {
        rate_per_day: f64,
        rate_per_km: f64,
        estimated_km: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        final_km: Option<f64>,
    },
}

impl RateSpec {
    pub fn mode(&self) -> &'static str {
        match self {
            RateSpec::Total { .. } => "total",
            RateSpec::PerDay { .. } => "per_day",
            RateSpec::PerKm { .. } => "per_km",
            RateSpec::Hybrid { .. } => "hybrid",
        }
    }

    /// Rejects rate figures that cannot price a trip. A flat total of zero
    /// is allowed (unpriced placeholder); everything else must be positive.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            RateSpec::Total { rate_total } => {
                if *rate_total < 0.0 {
                    return Err("rate_total must not be negative".to_string());
                }
            }
            RateSpec::PerDay { rate_per_day } => {
                if *rate_per_day <= 0.0 {
                    return Err("rate_per_day must be positive".to_string());
                }
            }
            RateSpec::PerKm {
                rate_per_km,
                estimated_km,
                final_km,
            } => {
                if *rate_per_km <= 0.0 || *estimated_km <= 0.0 {
                    return Err("per_km mode requires rate_per_km and estimated_km > 0".to_string());
                }
                if matches!(final_km, Some(km) if *km <= 0.0) {
                    return Err("final_km must be positive when recorded".to_string());
                }
            }
            RateSpec::Hybrid {
                rate_per_day,
                rate_per_km,
                estimated_km,
                final_km,
            } => {
                if *rate_per_day <= 0.0 || *rate_per_km <= 0.0 || *estimated_km <= 0.0 {
                    return Err(
                        "hybrid mode requires rate_per_day, rate_per_km and estimated_km > 0"
                            .to_string(),
                    );
                }
                if matches!(final_km, Some(km) if *km <= 0.0) {
                    return Err("final_km must be positive when recorded".to_string());
                }
            }
        }
        Ok(())
    }
}

use chrono::NaiveDateTime;

use crate::config::RateThresholds;
use crate::models::RateSpec;

/// Trip duration in billable days: the calendar-date difference between end
/// and start, minimum one day. A trip picked up June 1st and returned
/// June 3rd bills two days regardless of the hours involved.
pub fn trip_duration_days(start: &NaiveDateTime, end: &NaiveDateTime) -> i64 {
    (end.date() - start.date()).num_days().max(1)
}

/// Computes an assignment's monetary total. Pure: same inputs, same output.
/// When `final_km` has been recorded it replaces `estimated_km` in the
/// formula; the minimum-distance thresholds apply either way.
pub fn compute_total(rate: &RateSpec, duration_days: i64, thresholds: &RateThresholds) -> f64 {
    let days = duration_days as f64;
    match rate {
        RateSpec::Total { rate_total } => *rate_total,
        RateSpec::PerDay { rate_per_day } => rate_per_day * days,
        RateSpec::PerKm {
            rate_per_km,
            estimated_km,
            final_km,
        } => {
            let billable = billable_km(*estimated_km, *final_km, thresholds.min_km_per_day, days);
            rate_per_km * billable
        }
        RateSpec::Hybrid {
            rate_per_day,
            rate_per_km,
            estimated_km,
            final_km,
        } => {
            let billable = billable_km(
                *estimated_km,
                *final_km,
                thresholds.min_km_hybrid_per_day,
                days,
            );
            rate_per_day * days + rate_per_km * billable
        }
    }
}

fn billable_km(estimated_km: f64, final_km: Option<f64>, min_km_per_day: f64, days: f64) -> f64 {
    let distance = final_km.unwrap_or(estimated_km);
    distance.max(min_km_per_day * days)
}

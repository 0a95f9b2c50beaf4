use std::env;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub port: u16,
    pub database_url: String,
    pub rates: RateThresholds,
}

/// Global minimum-distance thresholds used by the rate engine. Per-km trips
/// are billed at least `min_km_per_day` kilometres per trip day so a short
/// distance estimate cannot under-bill a multi-day trip.
#[derive(Clone, Copy, Debug)]
pub struct RateThresholds {
    pub min_km_per_day: f64,
    pub min_km_hybrid_per_day: f64,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            port: env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(3000),
            database_url: env::var("DATABASE_URL").unwrap_or_else(|_| "fleetbook.db".to_string()),
            rates: RateThresholds {
                min_km_per_day: env::var("MIN_KM_PER_DAY")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(250.0),
                min_km_hybrid_per_day: env::var("MIN_KM_HYBRID_PER_DAY")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(100.0),
            },
        }
    }
}

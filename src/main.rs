use std::sync::{Arc, Mutex};

use axum::routing::{delete, get, patch, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use fleetbook::config::AppConfig;
use fleetbook::db;
use fleetbook::handlers;
use fleetbook::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = AppConfig::from_env();

    let conn = db::init_db(&config.database_url)?;

    let state = Arc::new(AppState {
        db: Arc::new(Mutex::new(conn)),
        config: config.clone(),
    });

    let app = Router::new()
        .route("/health", get(handlers::health::health))
        .route("/api/bookings", post(handlers::bookings::create_booking))
        .route("/api/bookings", get(handlers::bookings::list_bookings))
        .route("/api/bookings/:id", get(handlers::bookings::get_booking))
        .route("/api/bookings/:id", patch(handlers::bookings::update_booking))
        .route(
            "/api/bookings/:id/status",
            post(handlers::bookings::change_status),
        )
        .route(
            "/api/bookings/:id/vehicles",
            post(handlers::bookings::assign_vehicle),
        )
        .route(
            "/api/bookings/:id/vehicles/:vehicle_id",
            delete(handlers::bookings::remove_vehicle),
        )
        .route(
            "/api/bookings/:id/audit",
            get(handlers::bookings::get_audit_log),
        )
        .route(
            "/api/availability",
            get(handlers::availability::check_availability),
        )
        .route("/api/vehicles", get(handlers::vehicles::list_vehicles))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("starting server on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

use anyhow::Context;
use rusqlite::Connection;

/// Migrations are compiled into the binary and applied in order, so an
/// `:memory:` database gets the full schema too. Names are recorded in
/// `_migrations`; already-applied entries are skipped.
const MIGRATIONS: &[(&str, &str)] = &[(
    "001_core_tables",
    "CREATE TABLE vehicles (
        id TEXT PRIMARY KEY,
        org_id TEXT NOT NULL,
        plate_number TEXT NOT NULL,
        model TEXT NOT NULL,
        seats INTEGER NOT NULL,
        is_active INTEGER NOT NULL DEFAULT 1
    );
    CREATE TABLE bookings (
        id TEXT PRIMARY KEY,
        org_id TEXT NOT NULL,
        booking_ref TEXT NOT NULL UNIQUE,
        customer_name TEXT NOT NULL,
        customer_phone TEXT NOT NULL,
        trip_category TEXT NOT NULL,
        start_time TEXT NOT NULL,
        end_time TEXT NOT NULL,
        pickup TEXT,
        dropoff TEXT,
        notes TEXT,
        status TEXT NOT NULL,
        created_by TEXT NOT NULL,
        updated_by TEXT NOT NULL,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );
    CREATE TABLE vehicle_assignments (
        booking_id TEXT NOT NULL REFERENCES bookings(id),
        vehicle_id TEXT NOT NULL REFERENCES vehicles(id),
        driver_name TEXT,
        driver_phone TEXT,
        rate_mode TEXT NOT NULL,
        rate_total REAL,
        rate_per_day REAL,
        rate_per_km REAL,
        estimated_km REAL,
        final_km REAL,
        advance_amount REAL NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        PRIMARY KEY (booking_id, vehicle_id)
    );
    CREATE INDEX idx_assignments_vehicle ON vehicle_assignments(vehicle_id);
    CREATE TABLE audit_log (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        booking_id TEXT NOT NULL REFERENCES bookings(id),
        action TEXT NOT NULL,
        before_snapshot TEXT,
        after_snapshot TEXT NOT NULL,
        actor TEXT NOT NULL,
        created_at TEXT NOT NULL
    );
    CREATE INDEX idx_audit_booking ON audit_log(booking_id);",
)];

pub fn run_migrations(conn: &Connection) -> anyhow::Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS _migrations (
            name TEXT PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    )
    .context("failed to create migrations table")?;

    for (name, sql) in MIGRATIONS {
        let already_applied: bool = conn
            .query_row(
                "SELECT COUNT(*) > 0 FROM _migrations WHERE name = ?1",
                [name],
                |row| row.get(0),
            )
            .context("failed to check migration status")?;

        if already_applied {
            continue;
        }

        conn.execute_batch(sql)
            .with_context(|| format!("failed to apply migration: {name}"))?;

        conn.execute("INSERT INTO _migrations (name) VALUES (?1)", [name])
            .with_context(|| format!("failed to record migration: {name}"))?;

        tracing::info!("applied migration: {name}");
    }

    Ok(())
}

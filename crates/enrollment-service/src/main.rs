//! Enrollment Service
//!
//! Applies schema migrations and logs per-classroom capacity for every
//! enrollment scope, then exits.

use enrollment_service::config::Config;
use enrollment_service::observability;
use enrollment_service::repositories::PgEnrollmentStore;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    observability::init_tracing()?;

    info!("Starting Enrollment Service");

    let config = Config::from_env().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    info!(
        db_max_connections = config.db_max_connections,
        allocation_max_attempts = config.allocation_max_attempts,
        allocation_lock_timeout_ms = config.allocation_lock_timeout_ms,
        "Configuration loaded successfully"
    );

    info!("Connecting to database...");
    let db_url_with_timeout =
        add_query_timeout(&config.database_url, config.db_statement_timeout_seconds);
    let db_pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .min_connections(config.db_min_connections)
        .acquire_timeout(config.db_acquire_timeout)
        .idle_timeout(std::time::Duration::from_secs(600))
        .max_lifetime(std::time::Duration::from_secs(1800))
        .connect(&db_url_with_timeout)
        .await
        .map_err(|e| {
            error!("Failed to connect to database: {}", e);
            e
        })?;

    info!("Database connection established");

    sqlx::migrate!("../../migrations")
        .run(&db_pool)
        .await
        .map_err(|e| {
            error!("Failed to run migrations: {}", e);
            e
        })?;

    info!("Migrations applied");

    let store = PgEnrollmentStore::new(db_pool.clone())
        .with_lock_timeout_ms(config.allocation_lock_timeout_ms);

    let report = store.capacity_report().await?;
    if report.is_empty() {
        warn!("No classrooms configured");
    }
    for row in &report {
        info!(
            site = %row.site,
            shift = %row.shift,
            process = %row.process,
            classroom = %row.classroom,
            priority = row.priority,
            capacity = row.capacity,
            occupancy = row.occupancy,
            "Classroom capacity"
        );
    }

    db_pool.close().await;
    info!("Enrollment Service finished");

    Ok(())
}

/// Adds statement_timeout to the database URL.
fn add_query_timeout(url: &str, timeout_secs: u32) -> String {
    let separator = if url.contains('?') { '&' } else { '?' };
    format!(
        "{}{}options=-c%20statement_timeout%3D{}s",
        url, separator, timeout_secs
    )
}

//! Connection pool construction (§5: "Database connections are pooled
//! (default 25 max / 5 min)").

use std::time::Duration;

use pay_common::PayError;
use sqlx::postgres::{PgPool, PgPoolOptions};

const DEFAULT_MAX_CONNECTIONS: u32 = 25;
const DEFAULT_MIN_CONNECTIONS: u32 = 5;
/// Connection acquisition is time-bounded (§5); this is independent of the
/// per-query deadline hierarchy.
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

pub async fn connect(database_url: &str) -> Result<PgPool, PayError> {
    PgPoolOptions::new()
        .max_connections(DEFAULT_MAX_CONNECTIONS)
        .min_connections(DEFAULT_MIN_CONNECTIONS)
        .acquire_timeout(ACQUIRE_TIMEOUT)
        .connect(database_url)
        .await
        .map_err(|e| PayError::internal(format!("database pool connect: {e}")))
}

/// Apply all pending migrations (§6). Fatal on failure: an unmigrated
/// schema is not a state the service can run against.
pub async fn migrate(pool: &PgPool) -> Result<(), PayError> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| PayError::internal(format!("migration failed: {e}")))
}

//! Database migration command.
//!
//! # Usage
//!
//! ```bash
//! lists-cli migrate
//! ```
//!
//! # Environment Variables
//!
//! - `LISTS_DATABASE_URL` - `PostgreSQL` connection string (or `DATABASE_URL`)
//!
//! # Migration Files
//!
//! Migrations live in `crates/service/migrations/` and are embedded at build time.

use shopping_lists::MergeConfig;

use super::{CliError, connect};

/// Run all pending migrations.
pub async fn run(config: &MergeConfig) -> Result<(), CliError> {
    let store = connect(config).await?;

    tracing::info!("Running migrations...");
    sqlx::migrate!("../service/migrations")
        .run(store.pool())
        .await?;

    tracing::info!("Migrations complete!");
    Ok(())
}

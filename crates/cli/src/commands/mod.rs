//! CLI subcommands.

pub mod merge;
pub mod migrate;
pub mod show;

use thiserror::Error;

use shopping_lists::store::create_pool;
use shopping_lists::{ConfigError, MergeConfig, MergeError, PgStore, StoreError};

/// Errors that can occur while running a command.
#[derive(Debug, Error)]
pub enum CliError {
    /// Configuration could not be loaded.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Database connection error.
    #[error("Database connection error: {0}")]
    Database(#[from] sqlx::Error),

    /// A migration failed.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// The merge was rejected or rolled back.
    #[error("Merge failed: {0}")]
    Merge(#[from] MergeError),

    /// A store read failed.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// The requested list does not exist.
    #[error("Shopping list {0} not found")]
    ListNotFound(i32),

    /// Output could not be serialized.
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Connect to the database and wrap the pool in a store.
async fn connect(config: &MergeConfig) -> Result<PgStore, CliError> {
    tracing::info!("Connecting to database...");
    let pool = create_pool(&config.database_url, config.max_connections).await?;
    Ok(PgStore::new(pool))
}

//! Shopping Lists CLI - Database migrations and list merges.
//!
//! # Usage
//!
//! ```bash
//! # Run database migrations
//! lists-cli migrate
//!
//! # Merge the unpurchased items of lists 1 and 2 into a new list for user 3,
//! # removing them from the source lists
//! lists-cli merge pending --from 1,2 --user 3 --name "Saturday" --date 2024-03-02 --purge
//!
//! # Merge every item of lists 1 and 2, leaving the sources untouched
//! lists-cli merge lists --from 1,2 --user 3 --name "Party" --date 2024-03-09
//!
//! # Print a list with its items as JSON
//! lists-cli show 7
//! ```
//!
//! # Commands
//!
//! - `migrate` - Run database migrations
//! - `merge pending` - Merge unpurchased items, optionally purging the originals
//! - `merge lists` - Merge all items, copying them
//! - `show` - Print a shopping list

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};
use sentry::integrations::tracing as sentry_tracing;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use shopping_lists::MergeConfig;
use shopping_lists_core::ShoppingListId;

mod commands;

use commands::CliError;
use commands::merge::MergeArgs;

#[derive(Parser)]
#[command(name = "lists-cli")]
#[command(author, version, about = "Shopping lists CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run database migrations
    Migrate,
    /// Create a new shopping list by merging existing ones
    Merge {
        #[command(subcommand)]
        mode: MergeMode,
    },
    /// Print a shopping list with its items as JSON
    Show {
        /// Shopping list ID
        list_id: ShoppingListId,
    },
}

#[derive(Subcommand)]
enum MergeMode {
    /// Merge the unpurchased items of the source lists
    Pending {
        #[command(flatten)]
        args: MergeArgs,

        /// Remove the merged items from their source lists
        #[arg(long)]
        purge: bool,
    },
    /// Merge every item of the source lists, leaving the sources untouched
    Lists {
        #[command(flatten)]
        args: MergeArgs,
    },
}

/// Initialize Sentry error tracking and return guard that must be kept alive.
fn init_sentry(config: &MergeConfig) -> Option<sentry::ClientInitGuard> {
    let dsn = config.sentry_dsn.as_ref()?;

    let guard = sentry::init((
        dsn.as_str(),
        sentry::ClientOptions {
            release: sentry::release_name!(),
            environment: config
                .sentry_environment
                .clone()
                .map(std::borrow::Cow::Owned),
            attach_stacktrace: true,
            ..Default::default()
        },
    ));

    Some(guard)
}

/// Filter tracing events to Sentry event types.
fn sentry_event_filter(metadata: &tracing::Metadata<'_>) -> sentry_tracing::EventFilter {
    match *metadata.level() {
        tracing::Level::ERROR => sentry_tracing::EventFilter::Event,
        tracing::Level::WARN | tracing::Level::INFO => sentry_tracing::EventFilter::Breadcrumb,
        _ => sentry_tracing::EventFilter::Ignore,
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Configuration is needed for Sentry, which must be initialized before tracing
    let config = MergeConfig::from_env();
    let _sentry_guard = config.as_ref().ok().and_then(init_sentry);

    // Defaults to info level for our crates if RUST_LOG is not set
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "shopping_lists=info,lists_cli=info".into());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer().event_filter(sentry_event_filter))
        .init();

    let result = match config {
        Ok(config) => run(cli, &config).await,
        Err(e) => Err(CliError::from(e)),
    };

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli, config: &MergeConfig) -> Result<(), CliError> {
    match cli.command {
        Commands::Migrate => commands::migrate::run(config).await?,
        Commands::Merge { mode } => match mode {
            MergeMode::Pending { args, purge } => {
                commands::merge::pending(config, args, purge).await?;
            }
            MergeMode::Lists { args } => commands::merge::lists(config, args).await?,
        },
        Commands::Show { list_id } => commands::show::run(config, list_id).await?,
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_merge_pending() {
        let cli = Cli::try_parse_from([
            "lists-cli", "merge", "pending", "--from", "1,2", "--user", "3", "--name", "Sat",
            "--date", "2024-03-02", "--purge",
        ]);
        let Ok(Cli {
            command: Commands::Merge {
                mode: MergeMode::Pending { args, purge },
            },
        }) = cli
        else {
            panic!("expected merge pending");
        };
        assert!(purge);
        assert_eq!(args.from, [1, 2].map(ShoppingListId::new));
    }

    #[test]
    fn test_merge_requires_sources() {
        let cli = Cli::try_parse_from([
            "lists-cli", "merge", "lists", "--user", "3", "--name", "Sat", "--date", "2024-03-02",
        ]);
        assert!(cli.is_err());
    }
}

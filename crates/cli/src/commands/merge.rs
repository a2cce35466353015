//! List merge commands.
//!
//! Both commands print the new list as JSON. A merge that lost a race with a
//! concurrent merge is retried a few times before giving up.

use chrono::NaiveDate;
use clap::Args;

use shopping_lists::{MergeConfig, MergeError, MergeService, PgStore};
use shopping_lists_core::{ListMetadata, ShoppingList, ShoppingListId, UserId};

use super::{CliError, connect};

const MAX_ATTEMPTS: u32 = 3;

/// Arguments shared by both merge modes.
#[derive(Args, Debug)]
pub struct MergeArgs {
    /// Source shopping list IDs (comma separated)
    #[arg(short, long, value_delimiter = ',', required = true)]
    pub from: Vec<ShoppingListId>,

    /// ID of the user who will own the new list
    #[arg(short, long)]
    pub user: UserId,

    /// Name of the new list
    #[arg(short, long)]
    pub name: String,

    /// Date of the new list (YYYY-MM-DD)
    #[arg(short, long)]
    pub date: NaiveDate,
}

impl MergeArgs {
    fn metadata(&self) -> ListMetadata {
        ListMetadata::new(self.name.clone(), self.date)
    }
}

/// Merge the unpurchased items of the source lists.
pub async fn pending(config: &MergeConfig, args: MergeArgs, purge: bool) -> Result<(), CliError> {
    let service = service(config).await?;

    let list = with_retries(|| {
        service.create_from_pending_items(&args.from, args.user, args.metadata(), purge)
    })
    .await?;

    print_list(&list)
}

/// Merge every item of the source lists.
pub async fn lists(config: &MergeConfig, args: MergeArgs) -> Result<(), CliError> {
    let service = service(config).await?;

    let list = with_retries(|| {
        service.create_from_shopping_lists(&args.from, args.user, args.metadata())
    })
    .await?;

    print_list(&list)
}

async fn service(config: &MergeConfig) -> Result<MergeService<PgStore>, CliError> {
    let store = connect(config).await?;
    Ok(MergeService::new(store, config.merge_timeout))
}

async fn with_retries<F, Fut>(mut attempt: F) -> Result<ShoppingList, MergeError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<ShoppingList, MergeError>>,
{
    let mut tries = 1;
    loop {
        match attempt().await {
            Err(e) if e.is_retryable() && tries < MAX_ATTEMPTS => {
                tracing::warn!(error = %e, attempt = tries, "Merge conflicted, retrying");
                tries += 1;
            }
            result => return result,
        }
    }
}

fn print_list(list: &ShoppingList) -> Result<(), CliError> {
    #[allow(clippy::print_stdout)]
    {
        println!("{}", serde_json::to_string_pretty(list)?);
    }
    Ok(())
}

//! Print a shopping list as JSON.

use shopping_lists::{MergeConfig, ShoppingListStore, StoreTransaction};
use shopping_lists_core::ShoppingListId;

use super::{CliError, connect};

/// Load `list_id` with its items and print it.
pub async fn run(config: &MergeConfig, list_id: ShoppingListId) -> Result<(), CliError> {
    let store = connect(config).await?;

    let mut tx = store.begin().await?;
    let list = tx.fetch_list(list_id, None).await?;
    tx.rollback().await?;

    let list = list.ok_or(CliError::ListNotFound(list_id.as_i32()))?;

    #[allow(clippy::print_stdout)]
    {
        println!("{}", serde_json::to_string_pretty(&list)?);
    }
    Ok(())
}

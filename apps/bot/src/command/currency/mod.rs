mod add;
mod list;
mod price;
mod remove;

use crate::{Context, Error};
use add::add;
use list::list;
use price::price;
use remove::remove;

pub use remove::handle_component;

#[poise::command(
    slash_command,
    rename = "currency",
    subcommands("add", "remove", "price", "list")
)]
pub async fn currency_command(_: Context<'_>) -> Result<(), Error> {
    Ok(())
}

/// Split a comma-separated input into trimmed, non-empty symbols.
/// Case is preserved.
pub(crate) fn parse_symbols(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

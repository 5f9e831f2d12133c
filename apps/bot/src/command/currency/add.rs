use tracing::{debug, info, warn};

use super::parse_symbols;
use crate::{Context, Error};

#[poise::command(slash_command)]
pub async fn add(
    ctx: Context<'_>,
    #[description = "Currency symbol(s), comma-separated (e.g., BTC,ETH)"] symbol: String,
) -> Result<(), Error> {
    let user_id = ctx.author().id.get();
    let poller = &ctx.data().poller;

    info!(user_id, raw_input = %symbol, "add: invoked");

    let symbols = parse_symbols(&symbol);

    if symbols.is_empty() {
        warn!(user_id, raw_input = %symbol, "add: no valid symbols");
        ctx.say("No valid symbols provided.").await?;
        return Ok(());
    }

    let mut added: Vec<String> = Vec::new();
    let mut already: Vec<String> = Vec::new();

    for sym in symbols {
        if poller.track(&sym) {
            debug!(user_id, symbol = %sym, "add: tracked");
            added.push(sym);
        } else {
            debug!(user_id, symbol = %sym, "add: already tracked");
            already.push(sym);
        }
    }

    info!(
        user_id,
        added_count = added.len(),
        already_count = already.len(),
        "add: completed"
    );

    let mut lines = Vec::new();
    if !added.is_empty() {
        lines.push(format!("Now tracking: {}", added.join(", ")));
    }
    if !already.is_empty() {
        lines.push(format!("Already tracking: {}", already.join(", ")));
    }
    ctx.say(lines.join("\n")).await?;

    Ok(())
}

use chrono::{DateTime, Utc};
use coin::StoreError;
use tracing::{error, info};

use crate::{Context, Error};

#[poise::command(slash_command)]
pub async fn price(
    ctx: Context<'_>,
    #[description = "Currency symbol (e.g., BTC)"] symbol: String,
    #[description = "Unix timestamp in seconds, defaults to now"] timestamp: Option<i64>,
) -> Result<(), Error> {
    ctx.defer().await?;

    let symbol = symbol.trim().to_string();
    let target = timestamp.unwrap_or_else(|| Utc::now().timestamp());
    let store = &ctx.data().price_store;

    info!(symbol = %symbol, target, "price: invoked");

    let Some(id) = store.lookup_symbol(&symbol).await? else {
        ctx.say(format!("No prices recorded for {symbol}.")).await?;
        return Ok(());
    };

    let obs = match store.nearest_price(id, target).await {
        Ok(obs) => obs,
        Err(StoreError::NotFound) => {
            ctx.say(format!("No prices recorded for {symbol}.")).await?;
            return Ok(());
        }
        Err(e) => {
            error!(symbol = %symbol, error = %e, "price: lookup failed");
            return Err(e.into());
        }
    };

    let observed = DateTime::<Utc>::from_timestamp(obs.observed_at, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| obs.observed_at.to_string());

    ctx.say(format!(
        "{symbol}: ${} (observed {observed}, ts {})",
        obs.price, obs.observed_at
    ))
    .await?;

    Ok(())
}

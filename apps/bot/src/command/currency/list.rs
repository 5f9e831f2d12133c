use crate::{Context, Error};

#[poise::command(slash_command)]
pub async fn list(ctx: Context<'_>) -> Result<(), Error> {
    let symbols = ctx.data().poller.tracked();

    if symbols.is_empty() {
        ctx.say("Not tracking any currencies.").await?;
    } else {
        ctx.say(format!(
            "Tracking {} currencies: {}",
            symbols.len(),
            symbols.join(", ")
        ))
        .await?;
    }

    Ok(())
}

use ::serenity::all::{
    CreateActionRow, CreateSelectMenu, CreateSelectMenuKind, CreateSelectMenuOption,
};
use anyhow::bail;
use poise::serenity_prelude as serenity;
use tracing::{debug, info};

use super::parse_symbols;
use crate::{Context, Data, Error};

const SELECT_REMOVE_ID: &str = "select_remove";

// Discord caps select menus at 25 options.
const MAX_OPTIONS: usize = 25;

#[poise::command(slash_command)]
pub async fn remove(
    ctx: Context<'_>,
    #[description = "Currency symbol(s) to stop tracking, comma-separated; omit to pick from a list"]
    symbol: Option<String>,
) -> Result<(), Error> {
    let user_id = ctx.author().id.get();

    info!(user_id, raw_input = ?symbol, "remove: invoked");

    if let Some(raw) = symbol {
        let symbols = parse_symbols(&raw);
        if symbols.is_empty() {
            ctx.say("No valid symbols provided.").await?;
            return Ok(());
        }

        let (removed, missing): (Vec<String>, Vec<String>) = symbols
            .into_iter()
            .partition(|sym| ctx.data().poller.untrack(sym));

        info!(
            user_id,
            removed_count = removed.len(),
            missing_count = missing.len(),
            "remove: completed"
        );

        let mut lines = Vec::new();
        if !removed.is_empty() {
            lines.push(format!("Stopped tracking: {}", removed.join(", ")));
        }
        if !missing.is_empty() {
            lines.push(format!("Not tracked: {}", missing.join(", ")));
        }
        ctx.say(lines.join("\n")).await?;
        return Ok(());
    }

    let symbols = ctx.data().poller.tracked();
    if symbols.is_empty() {
        info!(user_id, "remove: nothing tracked");
        bail!("Not tracking any currencies.");
    }

    let total = symbols.len();
    let limit = total.min(MAX_OPTIONS);

    let opts: Vec<CreateSelectMenuOption> = symbols
        .into_iter()
        .take(limit)
        .map(|sym| CreateSelectMenuOption::new(sym.clone(), sym))
        .collect();

    let menu = CreateSelectMenu::new(
        SELECT_REMOVE_ID,
        CreateSelectMenuKind::String { options: opts },
    )
    .placeholder("Choose currencies...")
    .min_values(1)
    .max_values(limit as u8);

    ctx.send(
        poise::CreateReply::default()
            .content(menu_prompt(total))
            .components(vec![CreateActionRow::SelectMenu(menu)]),
    )
    .await?;

    debug!(user_id, count = limit, total, "remove: options presented");
    Ok(())
}

fn menu_prompt(total: usize) -> String {
    if total > MAX_OPTIONS {
        format!(
            "Select currencies to stop tracking (showing the first {MAX_OPTIONS} of {total}; \
             use `/currency remove symbol:<SYMBOL>` for the rest):"
        )
    } else {
        "Select currencies to stop tracking:".to_string()
    }
}

pub async fn handle_component(
    ctx: &serenity::Context,
    data: &Data,
    interaction: &serenity::ComponentInteraction,
) -> Result<(), Error> {
    let id = interaction.data.custom_id.as_str();
    let user_id = interaction.user.id.get();

    if id != SELECT_REMOVE_ID {
        debug!(user_id, custom_id = id, "remove: ignored component");
        return Ok(());
    }

    let values = match &interaction.data.kind {
        serenity::ComponentInteractionDataKind::StringSelect { values } => values.clone(),
        _ => vec![],
    };

    if values.is_empty() {
        debug!(user_id, "remove: empty selection");
        return Ok(());
    }

    let removed: Vec<String> = values
        .into_iter()
        .filter(|sym| data.poller.untrack(sym))
        .collect();

    info!(
        user_id,
        count = removed.len(),
        symbols = %removed.join(", "),
        "remove: completed"
    );

    let content = if removed.is_empty() {
        "Nothing to remove, the selection was no longer tracked.".to_string()
    } else {
        format!("Stopped tracking: {}", removed.join(", "))
    };

    interaction
        .create_response(
            ctx,
            serenity::CreateInteractionResponse::UpdateMessage(
                serenity::CreateInteractionResponseMessage::new()
                    .content(content)
                    .components(vec![]),
            ),
        )
        .await?;

    Ok(())
}

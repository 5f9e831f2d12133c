use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use bot::{
    Data,
    command::{self, currency::currency_command},
    config::Config,
};
use coin::{
    CancellationToken, MemoryPriceStore, Poller, PriceClient, PriceStore, RedisPriceStore,
};
use poise::{Framework, FrameworkOptions};
use serenity::all::{ActivityData, ClientBuilder, FullEvent, GatewayIntents, Interaction};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env()?;

    let redis = if std::env::var("REDIS_URL").is_ok() {
        Some(
            RedisPriceStore::from_env()
                .await
                .context("init price store failed")?,
        )
    } else {
        warn!("REDIS_URL not set, prices are kept in memory and lost on exit");
        None
    };
    let price_store: Arc<dyn PriceStore> = match &redis {
        Some(store) => Arc::new(store.clone()),
        None => Arc::new(MemoryPriceStore::new()),
    };
    let price_client = Arc::new(PriceClient::from_env().context("init price client failed")?);

    let poller = Arc::new(Poller::new(
        price_client,
        Arc::clone(&price_store),
        config.poller.clone(),
    ));

    let shutdown = CancellationToken::new();
    poller.start(&shutdown)?;

    let intents = GatewayIntents::non_privileged();
    let commands = vec![currency_command()];

    let framework = Framework::builder()
        .options(FrameworkOptions {
            event_handler: |serenity_ctx, event, _framework_ctx, data| {
                Box::pin(async move {
                    if let FullEvent::InteractionCreate { interaction, .. } = event
                        && let Interaction::Component(component) = interaction
                        && let Err(e) =
                            command::currency::handle_component(serenity_ctx, data, component)
                                .await
                    {
                        warn!(error = ?e, "component interaction failed");
                    }
                    Ok(())
                })
            },
            commands,
            ..Default::default()
        })
        .setup({
            let poller = Arc::clone(&poller);
            let price_store = Arc::clone(&price_store);
            let config = config.clone();

            move |ctx, ready, framework| {
                let poller = Arc::clone(&poller);
                let price_store = Arc::clone(&price_store);
                let config = config.clone();

                Box::pin(async move {
                    info!(user = %ready.user.name, id = %ready.user.id, "connected successfully");

                    poise::builtins::register_globally(ctx, &framework.options().commands).await?;

                    let ctx_clone = ctx.clone();
                    let status_poller = Arc::clone(&poller);
                    tokio::spawn(async move {
                        let mut show_version = true;
                        let mut tick = tokio::time::interval(Duration::from_secs(30));

                        loop {
                            tick.tick().await;

                            let text = if show_version {
                                if config.version.starts_with('v') {
                                    config.version.clone()
                                } else {
                                    format!("Version - {}", config.version)
                                }
                            } else {
                                format!("Tracking - {} coins", status_poller.tracked().len())
                            };

                            ctx_clone.set_activity(Some(ActivityData::custom(text)));
                            show_version = !show_version;
                        }
                    });

                    Ok(Data {
                        poller,
                        price_store,
                    })
                })
            }
        })
        .build();

    let mut client = ClientBuilder::new(&config.discord_token, intents)
        .framework(framework)
        .await
        .context("Err creating client")?;
    let shard_manager = client.shard_manager.clone();

    tokio::spawn(async move {
        if let Err(why) = client.start().await {
            error!(error = ?why, "client error");
        }
    });

    shutdown_signal().await;

    shutdown.cancel();
    poller.shutdown().await;
    shard_manager.shutdown_all().await;

    if let Some(redis) = redis
        && let Err(e) = redis.quit().await
    {
        warn!(error = ?e, "failed to close price store");
    }

    info!("Shutdown complete.");
    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::{
            select,
            signal::unix::{SignalKind, signal},
        };
        let mut sigterm =
            signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
        let mut sigint = signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");
        select! {
            _ = sigterm.recv() => {},
            _ = sigint.recv()  => {},
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

// src/main.rs
use absa_status::aggregator::Aggregator;
use absa_status::config::Config;
use absa_status::discord::DiscordClient;
use absa_status::presenter::Presenter;
use absa_status::publisher::ChatPlatform;
use absa_status::scheduler::Scheduler;
use env_logger::Env;
use log::{error, info};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    dotenv::dotenv().ok();

    env_logger::init_from_env(Env::default().default_filter_or("info"));

    info!("Starting bot...");

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Configuration error: {}", e);
            return Err(e.into());
        }
    };

    // One pooled client shared by every probe and the Discord API calls.
    let http = reqwest::Client::builder().build()?;

    let discord = DiscordClient::new(
        http.clone(),
        config.discord_api_base.clone(),
        config.discord_token.clone(),
    )
    .with_timeout(config.discord_timeout());

    let bot = match discord.current_user().await {
        Ok(bot) => bot,
        Err(e) => {
            error!("Failed to log in: {}", e);
            return Err(e.into());
        }
    };
    info!("✅ Logged in as {}", bot.name);

    let aggregator = Aggregator::new(
        http,
        config.probe_timeout(),
        config.max_concurrent_probes,
        config.category_order.clone(),
    );

    let mut presenter = Presenter::new(
        config.title.clone(),
        config.category_emojis.clone(),
        config.branding.clone(),
        config.update_interval_secs,
    );
    if config.compact_layout {
        presenter = presenter.without_spacers();
    }

    let scheduler = Scheduler::new(
        discord,
        aggregator,
        presenter,
        config.servers.clone(),
        config.channel_id,
        config.update_interval(),
    );

    if config.cleanup_on_start {
        scheduler.cleanup(&bot).await;
    }

    scheduler
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for shutdown signal: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await;

    info!("Stopped");
    Ok(())
}

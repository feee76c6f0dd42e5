use anyhow::Result;
use serenity::{http::Http, model::gateway::GatewayIntents, Client};
use songbird::{SerenityInit, Songbird};
use std::{sync::Arc, time::Duration};
use tracing::{error, info};

mod audio;
mod bot;
mod config;
mod sources;
mod ui;

use crate::audio::session::VoiceSessions;
use crate::audio::songbird_transport::SongbirdGateway;
use crate::bot::{notifier::DiscordNotifier, MusicBot};
use crate::config::Config;
use crate::sources::YtDlpResolver;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("zix_music=debug".parse()?)
                .add_directive("serenity=info".parse()?)
                .add_directive("songbird=info".parse()?),
        )
        .init();

    info!("🎵 Starting zix-music v{}", env!("CARGO_PKG_VERSION"));

    let config = Arc::new(Config::load()?);
    let resolver = Arc::new(YtDlpResolver::new(
        config.ytdlp_path.clone(),
        config.resolve_timeout(),
        config.max_playlist_size,
    ));

    if std::env::args().any(|arg| arg == "--health-check") {
        let version = resolver.verify().await?;
        info!("yt-dlp {}", version);
        println!("OK");
        return Ok(());
    }

    info!("{}", config.summary());

    let stream_client = reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .build()?;

    let manager = Songbird::serenity();
    let gateway = Arc::new(SongbirdGateway::new(
        manager.clone(),
        stream_client,
        config.default_volume,
    ));
    let notifier = Arc::new(DiscordNotifier::new(Arc::new(Http::new(&config.discord_token))));
    let sessions = Arc::new(VoiceSessions::new(
        gateway,
        resolver,
        notifier.clone(),
        config.player_settings(),
    ));

    let reaper = sessions.clone();
    tokio::spawn(async move { reaper.reap_idle().await });

    let intents = GatewayIntents::GUILDS
        | GatewayIntents::GUILD_VOICE_STATES
        | GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::MESSAGE_CONTENT;

    let handler = MusicBot::new(config.clone(), sessions.clone(), notifier);
    let mut client = Client::builder(&config.discord_token, intents)
        .event_handler(handler)
        .register_songbird_with(manager)
        .await?;

    let shard_manager = client.shard_manager.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Could not listen for Ctrl+C: {:?}", e);
            return;
        }
        info!("⚠️ Shutdown signal received, leaving voice...");
        sessions.shutdown_all().await;
        shard_manager.shutdown_all().await;
    });

    info!("🚀 Bot started");
    if let Err(why) = client.start().await {
        error!("Client error: {:?}", why);
    }

    Ok(())
}

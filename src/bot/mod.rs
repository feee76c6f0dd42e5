//! # Bot Module
//!
//! Discord front end of zix-music.
//!
//! This module contains:
//! - Prefix command parsing ([`commands`])
//! - Command and button handling ([`handlers`])
//! - Delivery of replies as embeds ([`notifier`])
//!
//! ## Architecture
//!
//! The bot is built around the [`MusicBot`] struct which implements
//! Serenity's [`EventHandler`] trait. It owns:
//!
//! - Per-guild voice sessions through [`VoiceSessions`]
//! - The [`Notifier`] every reply goes through
//!
//! Playback itself never runs inside an event callback; handlers only
//! enqueue work and talk to the session controller.

use serenity::{
    all::{Context, EventHandler, Interaction, Message, Ready, VoiceState},
    async_trait,
    model::id::ChannelId,
};
use std::sync::Arc;
use tracing::{error, info, warn};

pub mod commands;
pub mod handlers;
pub mod notifier;

use crate::{
    audio::{
        notifier::{MessageRef, Notice, Notifier},
        session::VoiceSessions,
    },
    config::Config,
};

/// Main Discord event handler.
///
/// ## Fields
///
/// - `config`: Bot configuration (prefix, limits)
/// - `sessions`: Voice sessions per guild
/// - `notifier`: Where replies are sent
pub struct MusicBot {
    config: Arc<Config>,
    sessions: Arc<VoiceSessions>,
    notifier: Arc<dyn Notifier>,
}

impl MusicBot {
    pub fn new(config: Arc<Config>, sessions: Arc<VoiceSessions>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            config,
            sessions,
            notifier,
        }
    }

    /// Sends `notice` to `channel_id`, logging delivery failures.
    pub async fn reply(&self, channel_id: ChannelId, notice: Notice) -> Option<MessageRef> {
        match self.notifier.send(channel_id, notice).await {
            Ok(message) => Some(message),
            Err(e) => {
                warn!("⚠️ Could not reply in channel {}: {}", channel_id, e);
                None
            }
        }
    }
}

#[async_trait]
impl EventHandler for MusicBot {
    /// Called when the bot is connected to Discord.
    async fn ready(&self, _ctx: Context, ready: Ready) {
        info!("🤖 {} is online!", ready.user.name);
        info!("📊 Connected to {} servers", ready.guilds.len());
        info!("💬 Listening for {:?} commands", self.config.command_prefix);
    }

    /// Dispatches prefix commands.
    ///
    /// Errors are logged and never crash the shard.
    async fn message(&self, ctx: Context, msg: Message) {
        if let Err(e) = handlers::handle_message(&ctx, &msg, self).await {
            error!("Error handling message: {:?}", e);
        }
    }

    /// Handles button clicks on queue views.
    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        if let Interaction::Component(component) = interaction {
            if let Err(e) = handlers::handle_component(&ctx, &component, self).await {
                error!("Error handling component: {:?}", e);
            }
        }
    }

    /// Tracks what happens to the bot's own voice state.
    ///
    /// A move by someone else updates the session's channel; a voice state
    /// with no channel means the bot was removed and tears the session down.
    async fn voice_state_update(&self, ctx: Context, _old: Option<VoiceState>, new: VoiceState) {
        let current_user_id = ctx.cache.current_user().id;
        if new.user_id != current_user_id {
            return;
        }
        let Some(guild_id) = new.guild_id.filter(|guild_id| self.sessions.is_active(*guild_id)) else {
            return;
        };

        match new.channel_id {
            Some(channel_id) => {
                self.sessions.handle_moved(guild_id, channel_id);
            }
            None => {
                if self.sessions.handle_membership_lost(guild_id).await {
                    info!("🔌 Bot was disconnected from voice in guild {}", guild_id);
                }
            }
        }
    }
}

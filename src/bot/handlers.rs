use anyhow::Result;
use serenity::{
    builder::{CreateInteractionResponse, CreateInteractionResponseMessage, CreateMessage},
    model::{
        application::ComponentInteraction,
        channel::Message,
        id::{ChannelId, GuildId, UserId},
    },
    prelude::Context,
};
use std::time::Instant;
use tracing::{debug, info, warn};

use super::{
    commands::{self, Command, ParseError},
    MusicBot,
};
use crate::{
    audio::{
        error::MusicError,
        notifier::{MessageRef, Notice},
        player::PlayerState,
        session::{ConnectOutcome, SkipOutcome},
        track::TrackDescriptor,
    },
    sources::Resolution,
    ui::{buttons, embeds},
};

/// Handles a chat message that may carry a prefix command.
pub async fn handle_message(ctx: &Context, msg: &Message, bot: &MusicBot) -> Result<()> {
    if msg.author.bot {
        return Ok(());
    }
    let Some(guild_id) = msg.guild_id else {
        return Ok(());
    };
    let prefix = bot.config.command_prefix.as_str();
    let Some(parsed) = commands::parse(&msg.content, prefix) else {
        return Ok(());
    };

    let command = match parsed {
        Ok(command) => command,
        Err(ParseError::Usage(info)) => {
            bot.reply(msg.channel_id, Notice::Usage { usage: info.usage(prefix) }).await;
            return Ok(());
        }
        Err(ParseError::Unknown(name)) => {
            debug!("Unknown command {:?} from {}", name, msg.author.name);
            bot.reply(
                msg.channel_id,
                Notice::UnknownCommand {
                    name,
                    prefix: prefix.to_string(),
                },
            )
            .await;
            return Ok(());
        }
    };

    info!(
        "📝 Command {:?} used by {} in guild {}",
        command, msg.author.name, guild_id
    );

    let request = Request {
        ctx,
        bot,
        guild_id,
        channel_id: msg.channel_id,
        author: msg.author.id,
    };

    let outcome = match command {
        Command::Play { query } => request.play(&query).await,
        Command::Pause => request.pause().await,
        Command::Resume => request.resume().await,
        Command::Skip => request.skip().await,
        Command::Stop => request.stop(Notice::Stopped).await,
        Command::Leave => request.stop(Notice::Disconnected).await,
        Command::Queue { page } => request.queue(page).await,
        Command::Join => request.join().await,
        Command::Help => {
            request
                .reply(Notice::Help {
                    prefix: prefix.to_string(),
                })
                .await;
            Ok(())
        }
        Command::Ping => request.ping().await,
    };

    if let Err(e) = outcome {
        warn!("⚠️ Command failed in guild {}: {:?}", guild_id, e);
        request
            .reply(Notice::CommandFailed {
                reason: e.to_string(),
            })
            .await;
    }

    Ok(())
}

/// Handles the queue navigation buttons.
pub async fn handle_component(ctx: &Context, component: &ComponentInteraction, bot: &MusicBot) -> Result<()> {
    let Some((page, owner)) = buttons::parse_navigation_id(&component.data.custom_id) else {
        debug!("Unhandled component {}", component.data.custom_id);
        return Ok(());
    };
    let Some(guild_id) = component.guild_id else {
        return Ok(());
    };

    if component.user.id != owner {
        component
            .create_response(
                &ctx.http,
                CreateInteractionResponse::Message(
                    CreateInteractionResponseMessage::new()
                        .content("❌ You can't control this queue view.")
                        .ephemeral(true),
                ),
            )
            .await?;
        return Ok(());
    }

    let snapshot = bot.sessions.snapshot(guild_id, page);
    let components: Vec<_> = buttons::queue_navigation(&snapshot.layout, owner).into_iter().collect();
    component
        .create_response(
            &ctx.http,
            CreateInteractionResponse::UpdateMessage(
                CreateInteractionResponseMessage::new()
                    .embed(embeds::render(&Notice::Queue(snapshot)))
                    .components(components),
            ),
        )
        .await?;

    Ok(())
}

/// One command invocation.
struct Request<'a> {
    ctx: &'a Context,
    bot: &'a MusicBot,
    guild_id: GuildId,
    channel_id: ChannelId,
    author: UserId,
}

impl Request<'_> {
    async fn reply(&self, notice: Notice) -> Option<MessageRef> {
        self.bot.reply(self.channel_id, notice).await
    }

    /// Connects to the author's voice channel. Replies and returns `None` on failure.
    async fn connect_to_author(&self, announce_noop: bool) -> Option<ConnectOutcome> {
        let Some(channel_id) = author_voice_channel(self.ctx, self.guild_id, self.author) else {
            self.reply(Notice::VoiceChannelRequired).await;
            return None;
        };

        match self.bot.sessions.connect(self.guild_id, channel_id).await {
            Ok(outcome) => {
                let notice = match outcome {
                    ConnectOutcome::Joined => Some(Notice::Joined { channel_id }),
                    ConnectOutcome::Moved => Some(Notice::Moved { channel_id }),
                    ConnectOutcome::AlreadyConnected if announce_noop => {
                        Some(Notice::AlreadyConnected { channel_id })
                    }
                    ConnectOutcome::AlreadyConnected => None,
                };
                if let Some(notice) = notice {
                    self.reply(notice).await;
                }
                Some(outcome)
            }
            Err(e) => {
                warn!("⚠️ Voice connection failed in guild {}: {}", self.guild_id, e);
                self.reply(Notice::ConnectionFailed { reason: e.to_string() }).await;
                None
            }
        }
    }

    async fn play(&self, query: &str) -> Result<()> {
        if self.connect_to_author(false).await.is_none() {
            return Ok(());
        }

        let resolution = match self.bot.sessions.resolver().resolve(query, true).await {
            Ok(resolution) => resolution,
            Err(e) => {
                warn!("❌ Could not resolve {:?}: {}", query, e);
                self.reply(Notice::ResolutionFailed {
                    query: query.to_string(),
                    reason: e.to_string(),
                })
                .await;
                return Ok(());
            }
        };

        let count = resolution.len();
        let playlist_title = match &resolution {
            Resolution::Playlist { title, .. } => Some(title.clone()),
            Resolution::Single(_) => None,
        };
        let tracks: Vec<TrackDescriptor> = resolution
            .into_tracks()
            .into_iter()
            .map(|track| TrackDescriptor::from_resolved(track, self.author, self.channel_id))
            .collect();
        let Some(first) = tracks.first().cloned() else {
            self.reply(Notice::ResolutionFailed {
                query: query.to_string(),
                reason: "nothing playable found".to_string(),
            })
            .await;
            return Ok(());
        };

        let receipt = match self.bot.sessions.enqueue(self.guild_id, tracks) {
            Ok(receipt) => receipt,
            // Disconnected while resolving.
            Err(MusicError::TransportUnavailable) => {
                self.reply(Notice::NotConnected).await;
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };
        info!(
            "➕ Queued {} track(s) in guild {} (starts now: {})",
            receipt.ids.len(),
            self.guild_id,
            receipt.starts_immediately
        );

        let notice = match playlist_title {
            Some(title) => Notice::PlaylistAdded {
                title,
                url: query.to_string(),
                count,
            },
            None if receipt.starts_immediately => Notice::StartingPlayback { track: first },
            None => Notice::Added { track: first },
        };
        self.reply(notice).await;
        Ok(())
    }

    async fn pause(&self) -> Result<()> {
        let notice = match self.bot.sessions.pause(self.guild_id).await {
            Ok(()) => Notice::Paused,
            Err(MusicError::InvalidTransition {
                state: PlayerState::Paused,
                ..
            }) => Notice::AlreadyPaused,
            Err(MusicError::InvalidTransition { .. } | MusicError::TransportUnavailable) => Notice::NothingPlaying,
            Err(e) => return Err(e.into()),
        };
        self.reply(notice).await;
        Ok(())
    }

    async fn resume(&self) -> Result<()> {
        let notice = match self.bot.sessions.resume(self.guild_id).await {
            Ok(()) => Notice::Resumed,
            Err(MusicError::InvalidTransition { .. } | MusicError::TransportUnavailable) => Notice::NothingPaused,
            Err(e) => return Err(e.into()),
        };
        self.reply(notice).await;
        Ok(())
    }

    async fn skip(&self) -> Result<()> {
        let Some(session) = self.bot.sessions.get(self.guild_id) else {
            self.reply(Notice::NotConnected).await;
            return Ok(());
        };
        let listeners = listeners_in(self.ctx, self.guild_id, session.channel_id()).max(1);

        let notice = match self.bot.sessions.skip(self.guild_id, self.author, listeners).await {
            Ok(SkipOutcome::Skipped { by_vote }) => Notice::Skipped { by_vote },
            Ok(SkipOutcome::VoteNotReached { votes, required }) => Notice::SkipVote {
                voter: self.author,
                votes,
                required,
            },
            Ok(SkipOutcome::AlreadyVoted) => Notice::AlreadyVoted,
            Err(MusicError::InvalidTransition { .. }) => Notice::NothingPlaying,
            Err(MusicError::TransportUnavailable) => Notice::NotConnected,
            Err(e) => return Err(e.into()),
        };
        self.reply(notice).await;
        Ok(())
    }

    /// `stop` and `leave` share the teardown and differ only in the reply.
    async fn stop(&self, done: Notice) -> Result<()> {
        let notice = if self.bot.sessions.disconnect(self.guild_id).await {
            done
        } else {
            Notice::NotConnected
        };
        self.reply(notice).await;
        Ok(())
    }

    async fn queue(&self, page: usize) -> Result<()> {
        let snapshot = self.bot.sessions.snapshot(self.guild_id, page);
        let mut message = CreateMessage::new();
        if let Some(row) = buttons::queue_navigation(&snapshot.layout, self.author) {
            message = message.components(vec![row]);
        }
        message = message.embed(embeds::render(&Notice::Queue(snapshot)));

        self.channel_id.send_message(&self.ctx.http, message).await?;
        Ok(())
    }

    async fn join(&self) -> Result<()> {
        self.connect_to_author(true).await;
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        let started = Instant::now();
        let Some(message) = self.reply(Notice::Pong { latency: None }).await else {
            return Ok(());
        };
        let latency = started.elapsed();
        if let Err(e) = self
            .bot
            .notifier
            .edit(message, Notice::Pong { latency: Some(latency) })
            .await
        {
            debug!("Could not update ping reply: {}", e);
        }
        Ok(())
    }
}

/// Voice channel the user currently sits in, from the guild cache.
fn author_voice_channel(ctx: &Context, guild_id: GuildId, user_id: UserId) -> Option<ChannelId> {
    let guild = ctx.cache.guild(guild_id)?;
    guild.voice_states.get(&user_id).and_then(|state| state.channel_id)
}

/// Non-bot users in `channel_id`.
fn listeners_in(ctx: &Context, guild_id: GuildId, channel_id: ChannelId) -> usize {
    let Some(guild) = ctx.cache.guild(guild_id) else {
        return 0;
    };

    guild
        .voice_states
        .values()
        .filter(|state| state.channel_id == Some(channel_id))
        .filter(|state| {
            let is_bot = state
                .member
                .as_ref()
                .map(|member| member.user.bot)
                .or_else(|| guild.members.get(&state.user_id).map(|member| member.user.bot))
                .unwrap_or(false);
            !is_bot
        })
        .count()
}

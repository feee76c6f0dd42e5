use async_trait::async_trait;
use serenity::model::id::{ChannelId, MessageId, UserId};
use std::time::Duration;
use thiserror::Error;

use super::{queue::QueuePage, track::TrackDescriptor};

/// A message the bot has sent and may edit later.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageRef {
    pub channel_id: ChannelId,
    pub message_id: MessageId,
}

#[derive(Debug, Error)]
pub enum NotifyError {
    /// The message was deleted (or the channel is gone).
    #[error("message not found")]
    NotFound,

    #[error("failed to deliver reply: {0}")]
    Delivery(String),
}

/// Everything the bot says, independent of how it is rendered.
#[derive(Debug, Clone, PartialEq)]
pub enum Notice {
    Joined { channel_id: ChannelId },
    Moved { channel_id: ChannelId },
    AlreadyConnected { channel_id: ChannelId },
    ConnectionFailed { reason: String },
    VoiceChannelRequired,
    NotConnected,

    Fetching { track: TrackDescriptor },
    NowPlaying { track: TrackDescriptor, elapsed: Option<Duration> },
    NowPlayingFinished { track: TrackDescriptor },
    PlaybackFailed { title: String, reason: String },

    Added { track: TrackDescriptor },
    StartingPlayback { track: TrackDescriptor },
    PlaylistAdded { title: String, url: String, count: usize },
    ResolutionFailed { query: String, reason: String },

    Paused,
    Resumed,
    AlreadyPaused,
    NothingPlaying,
    NothingPaused,

    SkipVote { voter: UserId, votes: usize, required: usize },
    AlreadyVoted,
    Skipped { by_vote: bool },

    Stopped,
    Disconnected,

    Queue(QueuePage),
    Help { prefix: String },
    Pong { latency: Option<Duration> },
    Usage { usage: String },
    UnknownCommand { name: String, prefix: String },
    CommandFailed { reason: String },
}

/// Delivers notices to a reply target.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, channel_id: ChannelId, notice: Notice) -> Result<MessageRef, NotifyError>;

    async fn edit(&self, message: MessageRef, notice: Notice) -> Result<(), NotifyError>;
}

//! # Audio Module
//!
//! Per-guild playback: a queue, one player loop draining it, and the voice
//! session controller that owns both.
//!
//! ## Architecture
//!
//! ### [`queue`] - Playback Queue
//! - FIFO with a consumer side and a display side kept in sync
//! - Clearing drops waiting entries without waking the consumer
//!
//! ### [`player`] - Player Loop
//! - Waits for an idle transport, dequeues, re-resolves the stream URL just
//!   in time and plays it to completion
//! - Never runs two tracks at once; a failed track is reported and skipped
//!
//! ### [`progress`] - Progress Reporter
//! - Edits the "Now Playing" message with elapsed time until the track changes
//!
//! ### [`session`] - Voice Session Controller
//! - Join / move / leave, pause, resume, skip votes and queue snapshots
//!
//! The voice connection sits behind [`transport::Transport`] and
//! [`transport::VoiceGateway`]; [`songbird_transport`] is the production
//! implementation. Replies go through [`notifier::Notifier`].
//!
//! ## Example Usage
//!
//! ```rust,ignore
//! let sessions = VoiceSessions::new(gateway, resolver, notifier, PlayerSettings::default());
//!
//! sessions.connect(guild_id, channel_id).await?;
//! sessions.enqueue(guild_id, vec![track])?;
//! sessions.pause(guild_id).await?;
//! sessions.resume(guild_id).await?;
//! ```

pub mod error;
pub mod notifier;
pub mod player;
pub mod progress;
pub mod queue;
pub mod session;
pub mod skip_vote;
pub mod songbird_transport;
pub mod track;
pub mod transport;

use thiserror::Error;

use super::player::PlayerState;
use crate::sources::ResolveError;

/// Failures of a voice transport or of the gateway that hands them out.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("not connected to a voice channel")]
    NotConnected,

    /// `play` was called while a stream was still active.
    #[error("transport is already playing")]
    AlreadyPlaying,

    #[error("failed to join voice channel: {0}")]
    Join(String),

    #[error("voice control failed: {0}")]
    Control(String),
}

/// Errors surfaced by music operations.
///
/// None of these escape the player loop; they are turned into replies at
/// the boundary nearest to where they happen.
#[derive(Debug, Error)]
pub enum MusicError {
    /// Search or extraction failed, found nothing, or timed out.
    #[error(transparent)]
    Resolution(#[from] ResolveError),

    /// The transport failed mid-play.
    #[error("playback failed: {0}")]
    Playback(String),

    /// Commands that need a voice connection are rejected before they mutate anything.
    #[error("not connected to a voice channel")]
    TransportUnavailable,

    #[error("cannot {action} while {state}")]
    InvalidTransition {
        action: &'static str,
        state: PlayerState,
    },

    #[error(transparent)]
    Transport(#[from] TransportError),
}

pub type MusicResult<T> = Result<T, MusicError>;

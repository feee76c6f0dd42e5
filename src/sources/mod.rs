//! # Sources
//!
//! Turning user queries into playable tracks. The bot talks to a single
//! [`TrackResolver`]; the production one shells out to `yt-dlp`
//! ([`ytdlp::YtDlpResolver`]).

pub mod ytdlp;

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

pub use ytdlp::YtDlpResolver;

/// Metadata returned by a resolver for one item.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedTrack {
    pub title: String,
    /// Stable page URL, used to re-resolve at play time.
    pub page_url: String,
    pub duration: Option<Duration>,
    /// Short-lived media URL; absent for flat playlist entries.
    pub direct_url: Option<String>,
}

/// Result of resolving a query.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Single(ResolvedTrack),
    Playlist {
        title: String,
        tracks: Vec<ResolvedTrack>,
    },
}

impl Resolution {
    pub fn into_tracks(self) -> Vec<ResolvedTrack> {
        match self {
            Resolution::Single(track) => vec![track],
            Resolution::Playlist { tracks, .. } => tracks,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Resolution::Single(_) => 1,
            Resolution::Playlist { tracks, .. } => tracks.len(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ResolveError {
    /// Network, process or parsing failure.
    #[error("extraction failed: {0}")]
    Extraction(String),

    #[error("no results for `{0}`")]
    NotFound(String),

    #[error("extraction timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    /// Resolution succeeded but produced nothing playable.
    #[error("no playable stream for `{0}`")]
    NoStream(String),
}

/// External metadata-resolution service.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TrackResolver: Send + Sync {
    /// Resolves a URL or search text. With `allow_playlist` a playlist URL
    /// yields every entry (flat, without durations or stream URLs).
    async fn resolve(&self, query: &str, allow_playlist: bool) -> Result<Resolution, ResolveError>;
}

/// Whether `query` should be treated as a URL rather than search text.
pub fn is_url(query: &str) -> bool {
    url::Url::parse(query.trim())
        .map(|url| matches!(url.scheme(), "http" | "https"))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_detection() {
        assert!(is_url("https://www.youtube.com/watch?v=dQw4w9WgXcQ"));
        assert!(is_url(" http://youtu.be/dQw4w9WgXcQ "));
        assert!(!is_url("never gonna give you up"));
        assert!(!is_url("ftp://example.com/song.mp3"));
    }
}

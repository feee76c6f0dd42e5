use serenity::model::id::{ChannelId, UserId};
use std::{fmt, time::Duration};

use crate::sources::ResolvedTrack;

/// Identity assigned to a descriptor when it enters a [`PlaybackQueue`].
///
/// Ids grow monotonically per queue, so two enqueues of the same URL still
/// get distinct identities.
///
/// [`PlaybackQueue`]: super::queue::PlaybackQueue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntryId(pub(crate) u64);

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One song waiting in (or taken from) the queue.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackDescriptor {
    pub title: String,
    pub page_url: String,
    /// Short-lived media URL, only filled at play time.
    pub direct_url: Option<String>,
    pub duration: Option<Duration>,
    pub requester: UserId,
    pub reply_target: ChannelId,
}

impl TrackDescriptor {
    pub fn new(
        title: impl Into<String>,
        page_url: impl Into<String>,
        requester: UserId,
        reply_target: ChannelId,
    ) -> Self {
        Self {
            title: title.into(),
            page_url: page_url.into(),
            direct_url: None,
            duration: None,
            requester,
            reply_target,
        }
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }

    /// Builds a descriptor from resolver output.
    ///
    /// The direct URL is deliberately dropped: it will have expired by the
    /// time the entry reaches the head of a long queue.
    pub fn from_resolved(track: ResolvedTrack, requester: UserId, reply_target: ChannelId) -> Self {
        Self {
            title: track.title,
            page_url: track.page_url,
            direct_url: None,
            duration: track.duration,
            requester,
            reply_target,
        }
    }

    /// Applies the fields obtained by just-in-time resolution.
    pub fn refresh(&mut self, fresh: &ResolvedTrack) {
        if !fresh.title.is_empty() {
            self.title = fresh.title.clone();
        }
        self.duration = fresh.duration;
        self.direct_url = fresh.direct_url.clone();
    }

    /// Known, non-zero duration.
    pub fn known_duration(&self) -> Option<Duration> {
        self.duration.filter(|d| !d.is_zero())
    }

    pub fn requester_mention(&self) -> String {
        format!("<@{}>", self.requester)
    }
}

/// A descriptor together with the identity its queue gave it.
#[derive(Debug, Clone, PartialEq)]
pub struct QueuedTrack {
    pub id: EntryId,
    pub track: TrackDescriptor,
}

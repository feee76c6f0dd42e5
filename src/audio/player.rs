use parking_lot::Mutex;
use serenity::model::id::{ChannelId, GuildId};
use std::{fmt, sync::Arc, time::Duration};
use tokio::{task::JoinHandle, time::Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{
    error::{MusicError, MusicResult},
    notifier::{MessageRef, Notice, Notifier},
    progress::{ProgressReporter, ReporterHandle},
    queue::PlaybackQueue,
    skip_vote::SkipVotes,
    track::{EntryId, QueuedTrack, TrackDescriptor},
    transport::{completion_channel, StreamRef, Transport},
};
use crate::sources::{Resolution, ResolveError, TrackResolver};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlayerState {
    #[default]
    Idle,
    Resolving,
    Playing,
    Paused,
}

impl fmt::Display for PlayerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PlayerState::Idle => "idle",
            PlayerState::Resolving => "resolving",
            PlayerState::Playing => "playing",
            PlayerState::Paused => "paused",
        };
        f.write_str(name)
    }
}

/// Timing knobs of the player loop.
#[derive(Debug, Clone)]
pub struct PlayerSettings {
    /// How often to check whether the transport went idle.
    pub idle_poll: Duration,
    pub drain_tick: Duration,
    pub max_drain_ticks: u32,
    /// Pause after a forced stop before starting the next stream.
    pub settle: Duration,
    pub progress_interval: Duration,
    /// Nothing queued for this long means the session should leave voice.
    pub idle_timeout: Duration,
}

impl Default for PlayerSettings {
    fn default() -> Self {
        Self {
            idle_poll: Duration::from_millis(500),
            drain_tick: Duration::from_millis(100),
            max_drain_ticks: 50,
            settle: Duration::from_millis(200),
            progress_interval: Duration::from_secs(5),
            idle_timeout: Duration::from_secs(300),
        }
    }
}

/// Elapsed time of the current stream, excluding paused time.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlaybackClock {
    started: Option<Instant>,
    paused_at: Option<Instant>,
}

impl PlaybackClock {
    pub fn start(&mut self) {
        self.started = Some(Instant::now());
        self.paused_at = None;
    }

    pub fn pause(&mut self) {
        if self.started.is_some() && self.paused_at.is_none() {
            self.paused_at = Some(Instant::now());
        }
    }

    pub fn resume(&mut self) {
        if let (Some(started), Some(paused_at)) = (self.started, self.paused_at.take()) {
            self.started = Some(started + paused_at.elapsed());
        }
    }

    pub fn elapsed(&self) -> Option<Duration> {
        let started = self.started?;
        Some(match self.paused_at {
            Some(paused_at) => paused_at.duration_since(started),
            None => started.elapsed(),
        })
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// State shared by the player loop, its progress reporter and the commands.
///
/// Lives behind a `parking_lot::Mutex`; never hold the guard across an await.
#[derive(Default)]
pub struct PlayerShared {
    state: PlayerState,
    /// Stays set after the stream ends until the next entry is dequeued, so a
    /// reporter can still recognise its track and finalise its message.
    current: Option<QueuedTrack>,
    clock: PlaybackClock,
    reporter: Option<ReporterHandle>,
    votes: SkipVotes,
}

pub type SharedPlayer = Arc<Mutex<PlayerShared>>;

impl PlayerShared {
    pub fn state(&self) -> PlayerState {
        self.state
    }

    pub fn current_id(&self) -> Option<EntryId> {
        self.current.as_ref().map(|entry| entry.id)
    }

    /// The track to show as "Now Playing", with its elapsed time.
    pub fn now_playing(&self) -> Option<(TrackDescriptor, Option<Duration>)> {
        if self.state == PlayerState::Idle {
            return None;
        }
        self.current
            .as_ref()
            .map(|entry| (entry.track.clone(), self.clock.elapsed()))
    }

    pub fn elapsed(&self) -> Option<Duration> {
        self.clock.elapsed()
    }

    pub fn votes_mut(&mut self) -> &mut SkipVotes {
        &mut self.votes
    }

    pub(crate) fn begin_resolving(&mut self, entry: QueuedTrack) {
        self.state = PlayerState::Resolving;
        self.current = Some(entry);
        self.clock.reset();
    }

    pub(crate) fn update_track(&mut self, track: &TrackDescriptor) {
        if let Some(current) = self.current.as_mut() {
            current.track = track.clone();
        }
    }

    pub(crate) fn start_playing(&mut self) {
        self.state = PlayerState::Playing;
        self.clock.start();
    }

    pub(crate) fn finish_playback(&mut self) {
        self.state = PlayerState::Idle;
        self.clock.pause();
    }

    pub(crate) fn mark_paused(&mut self) {
        if self.state == PlayerState::Playing {
            self.state = PlayerState::Paused;
            self.clock.pause();
        }
    }

    pub(crate) fn mark_resumed(&mut self) {
        if self.state == PlayerState::Paused {
            self.state = PlayerState::Playing;
            self.clock.resume();
        }
    }

    /// Forgets the previous track and hands back its reporter for cancellation.
    fn retire(&mut self) -> Option<ReporterHandle> {
        self.current = None;
        self.clock.reset();
        self.votes.reset();
        self.reporter.take()
    }

    /// Back to a fresh `Idle` player. Used on disconnect.
    pub(crate) fn reset(&mut self) -> Option<ReporterHandle> {
        self.state = PlayerState::Idle;
        self.retire()
    }
}

/// Sent by a player loop that found nothing to play for [`PlayerSettings::idle_timeout`].
#[derive(Clone)]
pub struct IdleReport {
    pub guild_id: GuildId,
    /// Identifies the session the report came from.
    pub player: SharedPlayer,
}

/// The single consumer of a guild's [`PlaybackQueue`].
pub struct PlayerLoop {
    pub guild_id: GuildId,
    pub queue: Arc<PlaybackQueue>,
    pub transport: Arc<dyn Transport>,
    pub resolver: Arc<dyn TrackResolver>,
    pub notifier: Arc<dyn Notifier>,
    pub shared: SharedPlayer,
    pub settings: PlayerSettings,
    pub shutdown: CancellationToken,
    pub idle_reports: flume::Sender<IdleReport>,
}

impl PlayerLoop {
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Runs until the shutdown token is cancelled. Track failures never end the loop.
    pub async fn run(self) {
        info!("▶️ Player loop started for guild {}", self.guild_id);
        let shutdown = self.shutdown.clone();

        tokio::select! {
            biased;
            _ = shutdown.cancelled() => {}
            _ = async {
                loop {
                    self.play_next().await;
                }
            } => {}
        }

        info!("⏹️ Player loop stopped for guild {}", self.guild_id);
    }

    async fn play_next(&self) {
        self.wait_until_idle().await;

        let entry = match tokio::time::timeout(self.settings.idle_timeout, self.queue.dequeue_for_play()).await {
            Ok(entry) => entry,
            Err(_) => {
                self.report_idle();
                return;
            }
        };
        self.retire_previous().await;

        if !self.transport.is_connected() {
            warn!("🔌 Not connected, skipping {} ({})", entry.id, entry.track.title);
            self.fail(&entry.track, &MusicError::TransportUnavailable).await;
            return;
        }

        let id = entry.id;
        let mut track = entry.track.clone();
        self.shared.lock().begin_resolving(entry);

        self.notify(track.reply_target, Notice::Fetching { track: track.clone() })
            .await;

        let stream = match self.resolve_stream(&mut track).await {
            Ok(stream) => stream,
            Err(e) => {
                warn!("⚠️ Could not resolve {}: {}", track.title, e);
                self.fail(&track, &e).await;
                return;
            }
        };
        self.shared.lock().update_track(&track);

        self.drain_previous().await;

        let (signal, completion) = completion_channel();
        if let Err(e) = self.transport.play(stream, signal).await {
            error!("❌ Transport refused {}: {}", track.title, e);
            self.fail(&track, &MusicError::from(e)).await;
            return;
        }
        self.shared.lock().start_playing();
        info!("🎵 Now playing {} {} in guild {}", id, track.title, self.guild_id);

        let message = self
            .notify(
                track.reply_target,
                Notice::NowPlaying {
                    track: track.clone(),
                    elapsed: None,
                },
            )
            .await;

        match (message, track.known_duration()) {
            (Some(message), Some(total)) => self.start_reporter(id, &track, total, message),
            (_, None) => debug!("No progress updates for {} (unknown duration)", track.title),
            (None, _) => debug!("No progress updates for {} (message not delivered)", track.title),
        }

        match completion.wait().await {
            Ok(()) => {
                debug!("✅ Finished {}", track.title);
                self.shared.lock().finish_playback();
            }
            Err(reason) => {
                error!("❌ Playback of {} failed: {}", track.title, reason);
                self.fail(&track, &MusicError::Playback(reason)).await;
            }
        }
    }

    fn report_idle(&self) {
        info!(
            "💤 Nothing to play for {}s in guild {}",
            self.settings.idle_timeout.as_secs(),
            self.guild_id
        );
        let report = IdleReport {
            guild_id: self.guild_id,
            player: self.shared.clone(),
        };
        if self.idle_reports.send(report).is_err() {
            debug!("Nobody listens for idle reports");
        }
    }

    async fn wait_until_idle(&self) {
        while !self.transport.is_idle() {
            tokio::time::sleep(self.settings.idle_poll).await;
        }
    }

    async fn retire_previous(&self) {
        let reporter = self.shared.lock().retire();
        if let Some(reporter) = reporter {
            reporter.cancel().await;
        }
    }

    /// Fetches a fresh stream URL; queued ones would have expired.
    async fn resolve_stream(&self, track: &mut TrackDescriptor) -> MusicResult<StreamRef> {
        let fresh = match self.resolver.resolve(&track.page_url, false).await? {
            Resolution::Single(fresh) => fresh,
            Resolution::Playlist { tracks, .. } => tracks
                .into_iter()
                .next()
                .ok_or_else(|| ResolveError::NoStream(track.title.clone()))?,
        };
        track.refresh(&fresh);

        track
            .direct_url
            .clone()
            .map(StreamRef::new)
            .ok_or_else(|| ResolveError::NoStream(track.title.clone()).into())
    }

    /// Stops a playback that is somehow still running and waits for it to wind down.
    async fn drain_previous(&self) {
        if self.transport.is_idle() {
            return;
        }

        warn!("⚠️ Previous stream still active in guild {}, stopping it", self.guild_id);
        self.transport.stop().await;
        for _ in 0..self.settings.max_drain_ticks {
            if self.transport.is_idle() {
                break;
            }
            tokio::time::sleep(self.settings.drain_tick).await;
        }
        tokio::time::sleep(self.settings.settle).await;
    }

    fn start_reporter(&self, id: EntryId, track: &TrackDescriptor, total: Duration, message: MessageRef) {
        let token = self.shutdown.child_token();
        let handle = ProgressReporter {
            entry: id,
            track: track.clone(),
            total,
            message,
            notifier: self.notifier.clone(),
            transport: self.transport.clone(),
            shared: self.shared.clone(),
            interval: self.settings.progress_interval,
        }
        .spawn(token);

        self.shared.lock().reporter = Some(handle);
    }

    async fn fail(&self, track: &TrackDescriptor, error: &MusicError) {
        self.notify(
            track.reply_target,
            Notice::PlaybackFailed {
                title: track.title.clone(),
                reason: error.to_string(),
            },
        )
        .await;
        self.shared.lock().finish_playback();
    }

    async fn notify(&self, channel_id: ChannelId, notice: Notice) -> Option<MessageRef> {
        match self.notifier.send(channel_id, notice).await {
            Ok(message) => Some(message),
            Err(e) => {
                warn!("⚠️ Could not notify channel {}: {}", channel_id, e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        audio::{notifier::recording::RecordingNotifier, transport::fake::FakeTransport},
        sources::{MockTrackResolver, ResolvedTrack},
    };
    use pretty_assertions::assert_eq;
    use serenity::model::id::UserId;

    struct Harness {
        queue: Arc<PlaybackQueue>,
        transport: Arc<FakeTransport>,
        notifier: Arc<RecordingNotifier>,
        shared: SharedPlayer,
        shutdown: CancellationToken,
        idle_reports: flume::Receiver<IdleReport>,
        task: JoinHandle<()>,
    }

    fn start(resolver: MockTrackResolver, transport: Arc<FakeTransport>) -> Harness {
        let queue = Arc::new(PlaybackQueue::new());
        let notifier = Arc::new(RecordingNotifier::default());
        let shared = SharedPlayer::default();
        let shutdown = CancellationToken::new();
        let (idle_tx, idle_reports) = flume::unbounded();

        let task = PlayerLoop {
            guild_id: GuildId::new(1),
            queue: queue.clone(),
            transport: transport.clone(),
            resolver: Arc::new(resolver),
            notifier: notifier.clone(),
            shared: shared.clone(),
            settings: PlayerSettings::default(),
            shutdown: shutdown.clone(),
            idle_reports: idle_tx,
        }
        .spawn();

        Harness {
            queue,
            transport,
            notifier,
            shared,
            shutdown,
            idle_reports,
            task,
        }
    }

    fn queued(name: &str, duration: Option<u64>) -> TrackDescriptor {
        let mut track = TrackDescriptor::new(name, format!("https://www.youtube.com/watch?v={name}"), UserId::new(5), ChannelId::new(6));
        track.duration = duration.map(Duration::from_secs);
        track
    }

    fn fresh(name: &str, duration: Option<u64>) -> Result<Resolution, ResolveError> {
        Ok(Resolution::Single(ResolvedTrack {
            title: name.to_string(),
            page_url: format!("https://www.youtube.com/watch?v={name}"),
            duration: duration.map(Duration::from_secs),
            direct_url: Some(format!("stream-{name}")),
        }))
    }

    /// Lets virtual time pass until `condition` holds.
    async fn until(condition: impl Fn() -> bool) {
        for _ in 0..600 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        panic!("condition not reached");
    }

    fn is_now_playing(notice: &Notice) -> bool {
        matches!(notice, Notice::NowPlaying { .. })
    }

    #[tokio::test(start_paused = true)]
    async fn plays_tracks_in_order_with_progress_for_known_duration() {
        let mut resolver = MockTrackResolver::new();
        resolver.expect_resolve().returning(|query, allow_playlist| {
            assert!(!allow_playlist);
            if query.ends_with("=A") {
                fresh("A", Some(120))
            } else {
                fresh("B", None)
            }
        });
        let h = start(resolver, FakeTransport::new());
        h.queue.enqueue(queued("A", None));
        h.queue.enqueue(queued("B", None));

        until(|| h.transport.played().len() == 1).await;
        assert_eq!(h.shared.lock().state(), PlayerState::Playing);
        tokio::time::sleep(Duration::from_secs(12)).await;
        let progress_edits = h.notifier.count_edits(is_now_playing);
        assert!(progress_edits >= 2, "expected progress edits, got {progress_edits}");

        h.transport.finish(Ok(()));
        until(|| h.transport.played().len() == 2).await;
        tokio::time::sleep(Duration::from_secs(30)).await;
        // B has no known duration, so nobody edits its message.
        assert_eq!(h.notifier.count_edits(is_now_playing), progress_edits);

        h.transport.finish(Ok(()));
        until(|| h.shared.lock().state() == PlayerState::Idle).await;

        assert_eq!(h.transport.played(), vec!["stream-A", "stream-B"]);
        assert!(h.queue.is_empty());
        assert_eq!(h.transport.overlapping_plays(), 0);
        assert_eq!(h.notifier.count_sent(is_now_playing), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn resolution_failure_skips_to_next_track() {
        let mut resolver = MockTrackResolver::new();
        resolver.expect_resolve().returning(|query, _| {
            if query.ends_with("=A") {
                Err(ResolveError::Extraction("Private video".into()))
            } else {
                fresh("B", Some(60))
            }
        });
        let h = start(resolver, FakeTransport::new());
        h.queue.enqueue_all([queued("A", Some(30)), queued("B", None)]);

        until(|| h.transport.played().len() == 1).await;

        assert_eq!(h.transport.played(), vec!["stream-B"]);
        assert_eq!(
            h.notifier.count_sent(|n| matches!(n, Notice::PlaybackFailed { title, .. } if title == "A")),
            1
        );
    }

    #[tokio::test(start_paused = true)]
    async fn missing_stream_url_is_a_failure() {
        let mut resolver = MockTrackResolver::new();
        resolver.expect_resolve().times(1).returning(|_, _| {
            Ok(Resolution::Single(ResolvedTrack {
                title: "A".into(),
                page_url: "https://www.youtube.com/watch?v=A".into(),
                duration: Some(Duration::from_secs(10)),
                direct_url: None,
            }))
        });
        let h = start(resolver, FakeTransport::new());
        h.queue.enqueue(queued("A", None));

        until(|| h.notifier.count_sent(|n| matches!(n, Notice::PlaybackFailed { .. })) == 1).await;
        assert!(h.transport.played().is_empty());
        assert_eq!(h.shared.lock().state(), PlayerState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn completion_error_is_reported_and_not_retried() {
        let mut resolver = MockTrackResolver::new();
        resolver
            .expect_resolve()
            .times(2)
            .returning(|query, _| if query.ends_with("=A") { fresh("A", Some(200)) } else { fresh("B", Some(200)) });
        let h = start(resolver, FakeTransport::new());
        h.queue.enqueue_all([queued("A", None), queued("B", None)]);

        until(|| h.transport.played().len() == 1).await;
        h.transport.finish(Err("decoder error".into()));
        until(|| h.transport.played().len() == 2).await;

        assert_eq!(h.transport.played(), vec!["stream-A", "stream-B"]);
        assert_eq!(
            h.notifier
                .count_sent(|n| matches!(n, Notice::PlaybackFailed { reason, .. } if reason == "playback failed: decoder error")),
            1
        );
    }

    #[tokio::test(start_paused = true)]
    async fn lingering_stream_is_stopped_and_drained_before_play() {
        let transport = FakeTransport::new();
        let intruder = transport.clone();
        let mut resolver = MockTrackResolver::new();
        resolver.expect_resolve().times(1).returning(move |_, _| {
            // Someone else starts a stream while the next track resolves.
            intruder.start_stray(Duration::from_millis(350));
            fresh("A", Some(60))
        });
        let h = start(resolver, transport);
        h.queue.enqueue(queued("A", None));

        until(|| h.transport.played().len() == 1).await;

        assert_eq!(h.transport.stops(), 1);
        assert_eq!(h.transport.overlapping_plays(), 0);
        let stopped_at = h.transport.stopped_at().expect("stray stream was never stopped");
        let settings = PlayerSettings::default();
        assert!(h.transport.played_at()[0] >= stopped_at + Duration::from_millis(350) + settings.settle);
        assert_eq!(h.shared.lock().state(), PlayerState::Playing);
    }

    #[tokio::test(start_paused = true)]
    async fn reports_idle_after_timeout_with_nothing_queued() {
        let mut resolver = MockTrackResolver::new();
        resolver.expect_resolve().returning(|_, _| fresh("A", Some(60)));
        let h = start(resolver, FakeTransport::new());
        let idle_timeout = PlayerSettings::default().idle_timeout;

        h.queue.enqueue(queued("A", None));
        until(|| h.transport.played().len() == 1).await;
        // Playing for longer than the timeout is not idle.
        tokio::time::sleep(idle_timeout + Duration::from_secs(10)).await;
        assert!(h.idle_reports.try_recv().is_err());

        h.transport.finish(Ok(()));
        tokio::time::sleep(idle_timeout - Duration::from_secs(5)).await;
        assert!(h.idle_reports.try_recv().is_err());

        tokio::time::sleep(Duration::from_secs(10)).await;
        let report = h.idle_reports.try_recv().expect("idle report");
        assert_eq!(report.guild_id, GuildId::new(1));
        assert!(Arc::ptr_eq(&report.player, &h.shared));
    }

    #[tokio::test(start_paused = true)]
    async fn entries_are_skipped_while_disconnected() {
        let mut resolver = MockTrackResolver::new();
        resolver.expect_resolve().never();
        let transport = FakeTransport::new();
        transport.set_connected(false);
        let h = start(resolver, transport);
        h.queue.enqueue_all([queued("A", None), queued("B", None)]);

        until(|| h.queue.is_empty()).await;
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert!(h.transport.played().is_empty());
        let failures: Vec<String> = h
            .notifier
            .sent()
            .into_iter()
            .filter_map(|notice| match notice {
                Notice::PlaybackFailed { title, reason } => Some(format!("{title}: {reason}")),
                _ => None,
            })
            .collect();
        assert_eq!(
            failures,
            vec!["A: not connected to a voice channel", "B: not connected to a voice channel"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_ends_loop_mid_play() {
        let mut resolver = MockTrackResolver::new();
        resolver.expect_resolve().returning(|_, _| fresh("A", Some(300)));
        let h = start(resolver, FakeTransport::new());
        h.queue.enqueue_all([queued("A", None), queued("B", None)]);

        until(|| h.transport.played().len() == 1).await;
        h.shutdown.cancel();
        h.transport.stop().await;
        h.task.await.expect("player loop panicked");

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(h.transport.played(), vec!["stream-A"]);
        assert_eq!(h.queue.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn clock_excludes_paused_time() {
        let mut clock = PlaybackClock::default();
        assert_eq!(clock.elapsed(), None);

        clock.start();
        tokio::time::advance(Duration::from_secs(10)).await;
        clock.pause();
        tokio::time::advance(Duration::from_secs(30)).await;
        assert_eq!(clock.elapsed(), Some(Duration::from_secs(10)));

        clock.resume();
        tokio::time::advance(Duration::from_secs(5)).await;
        assert_eq!(clock.elapsed(), Some(Duration::from_secs(15)));
    }

    #[test]
    fn shared_state_transitions() {
        let mut shared = PlayerShared::default();
        let entry = QueuedTrack {
            id: EntryId(3),
            track: queued("A", Some(10)),
        };

        shared.begin_resolving(entry);
        assert_eq!(shared.state(), PlayerState::Resolving);
        shared.mark_paused();
        assert_eq!(shared.state(), PlayerState::Resolving);

        shared.start_playing();
        shared.mark_paused();
        assert_eq!(shared.state(), PlayerState::Paused);
        shared.mark_resumed();
        assert_eq!(shared.state(), PlayerState::Playing);

        shared.finish_playback();
        assert_eq!(shared.now_playing(), None);
        assert_eq!(shared.current_id(), Some(EntryId(3)));

        assert!(shared.reset().is_none());
        assert_eq!(shared.current_id(), None);
    }
}

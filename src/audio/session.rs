use dashmap::DashMap;
use parking_lot::Mutex;
use serenity::model::id::{ChannelId, GuildId, UserId};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{
    error::{MusicError, MusicResult},
    notifier::Notifier,
    player::{IdleReport, PlayerLoop, PlayerSettings, PlayerState, SharedPlayer},
    queue::{PageLayout, PlaybackQueue, QueuePage},
    skip_vote::VoteOutcome,
    track::{EntryId, TrackDescriptor},
    transport::{Transport, VoiceGateway},
};
use crate::sources::TrackResolver;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectOutcome {
    Joined,
    Moved,
    AlreadyConnected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipOutcome {
    Skipped { by_vote: bool },
    VoteNotReached { votes: usize, required: usize },
    AlreadyVoted,
}

/// What an enqueue did, for choosing the reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnqueueReceipt {
    pub ids: Vec<EntryId>,
    /// Nothing was playing and nothing was waiting before this enqueue.
    pub starts_immediately: bool,
}

/// One guild's voice connection with its queue and player loop.
pub struct VoiceSession {
    guild_id: GuildId,
    channel_id: Mutex<ChannelId>,
    transport: Arc<dyn Transport>,
    queue: Arc<PlaybackQueue>,
    shared: SharedPlayer,
    shutdown: CancellationToken,
    player_task: Mutex<Option<JoinHandle<()>>>,
}

impl VoiceSession {
    pub fn channel_id(&self) -> ChannelId {
        *self.channel_id.lock()
    }

    pub fn queue(&self) -> &PlaybackQueue {
        &self.queue
    }

    pub fn state(&self) -> PlayerState {
        self.shared.lock().state()
    }

    /// Nothing is playing and nothing is queued.
    fn is_idle(&self) -> bool {
        self.state() == PlayerState::Idle && self.transport.is_idle() && self.queue.is_empty()
    }

    /// Stops everything this session owns. The gateway is left to the caller.
    async fn teardown(&self) {
        // Cancel first so the loop cannot pick up the next entry when the
        // stopped stream completes.
        self.shutdown.cancel();
        self.transport.stop().await;

        let task = self.player_task.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                if e.is_panic() {
                    warn!("⚠️ Player loop for guild {} panicked: {}", self.guild_id, e);
                }
            }
        }

        let reporter = self.shared.lock().reset();
        if let Some(reporter) = reporter {
            reporter.cancel().await;
        }
        self.queue.clear();
    }
}

/// Voice sessions of every guild; at most one per guild.
pub struct VoiceSessions {
    sessions: DashMap<GuildId, Arc<VoiceSession>>,
    gateway: Arc<dyn VoiceGateway>,
    resolver: Arc<dyn TrackResolver>,
    notifier: Arc<dyn Notifier>,
    settings: PlayerSettings,
    /// Serializes connect/disconnect so a guild never ends up with two sessions.
    lifecycle: tokio::sync::Mutex<()>,
    idle_tx: flume::Sender<IdleReport>,
    idle_rx: flume::Receiver<IdleReport>,
}

impl VoiceSessions {
    pub fn new(
        gateway: Arc<dyn VoiceGateway>,
        resolver: Arc<dyn TrackResolver>,
        notifier: Arc<dyn Notifier>,
        settings: PlayerSettings,
    ) -> Self {
        let (idle_tx, idle_rx) = flume::unbounded();
        Self {
            sessions: DashMap::new(),
            gateway,
            resolver,
            notifier,
            settings,
            lifecycle: tokio::sync::Mutex::new(()),
            idle_tx,
            idle_rx,
        }
    }

    pub fn get(&self, guild_id: GuildId) -> Option<Arc<VoiceSession>> {
        self.sessions.get(&guild_id).map(|entry| entry.value().clone())
    }

    pub fn is_active(&self, guild_id: GuildId) -> bool {
        self.sessions.contains_key(&guild_id)
    }

    pub fn resolver(&self) -> Arc<dyn TrackResolver> {
        self.resolver.clone()
    }

    fn require(&self, guild_id: GuildId) -> MusicResult<Arc<VoiceSession>> {
        self.get(guild_id).ok_or(MusicError::TransportUnavailable)
    }

    /// Joins `channel_id`, moves there, or does nothing if already there.
    pub async fn connect(&self, guild_id: GuildId, channel_id: ChannelId) -> MusicResult<ConnectOutcome> {
        let _guard = self.lifecycle.lock().await;

        if let Some(session) = self.get(guild_id) {
            if session.channel_id() == channel_id {
                return Ok(ConnectOutcome::AlreadyConnected);
            }
            self.gateway.move_to(guild_id, channel_id).await?;
            *session.channel_id.lock() = channel_id;
            info!("🔀 Moved to channel {} in guild {}", channel_id, guild_id);
            return Ok(ConnectOutcome::Moved);
        }

        let transport = self.gateway.join(guild_id, channel_id).await?;
        let queue = Arc::new(PlaybackQueue::new());
        let shared = SharedPlayer::default();
        let shutdown = CancellationToken::new();

        let task = PlayerLoop {
            guild_id,
            queue: queue.clone(),
            transport: transport.clone(),
            resolver: self.resolver.clone(),
            notifier: self.notifier.clone(),
            shared: shared.clone(),
            settings: self.settings.clone(),
            shutdown: shutdown.clone(),
            idle_reports: self.idle_tx.clone(),
        }
        .spawn();

        self.sessions.insert(
            guild_id,
            Arc::new(VoiceSession {
                guild_id,
                channel_id: Mutex::new(channel_id),
                transport,
                queue,
                shared,
                shutdown,
                player_task: Mutex::new(Some(task)),
            }),
        );
        info!("🔊 Joined channel {} in guild {}", channel_id, guild_id);
        Ok(ConnectOutcome::Joined)
    }

    /// Stops playback, drops the queue and leaves voice. Returns whether a session existed.
    pub async fn disconnect(&self, guild_id: GuildId) -> bool {
        let _guard = self.lifecycle.lock().await;
        self.disconnect_locked(guild_id).await
    }

    /// Someone else moved the bot to `channel_id`. Returns whether the session changed.
    pub fn handle_moved(&self, guild_id: GuildId, channel_id: ChannelId) -> bool {
        let Some(session) = self.get(guild_id) else {
            return false;
        };
        let mut current = session.channel_id.lock();
        if *current == channel_id {
            return false;
        }
        info!("🔀 Moved from {} to {} in guild {}", *current, channel_id, guild_id);
        *current = channel_id;
        true
    }

    /// Leaves voice in guilds whose player loop reports having nothing to do.
    ///
    /// Runs for the lifetime of the controller; spawn it once.
    pub async fn reap_idle(&self) {
        while let Ok(report) = self.idle_rx.recv_async().await {
            if self.leave_if_idle(&report).await {
                info!("💤 Left voice in guild {} after being idle", report.guild_id);
            }
        }
    }

    async fn leave_if_idle(&self, report: &IdleReport) -> bool {
        let _guard = self.lifecycle.lock().await;

        match self.get(report.guild_id) {
            // Reports from an earlier session of the same guild are stale.
            Some(session) if Arc::ptr_eq(&session.shared, &report.player) && session.is_idle() => {}
            _ => return false,
        }
        self.disconnect_locked(report.guild_id).await
    }

    async fn disconnect_locked(&self, guild_id: GuildId) -> bool {
        let Some((_, session)) = self.sessions.remove(&guild_id) else {
            return false;
        };
        session.teardown().await;

        if let Err(e) = self.gateway.leave(guild_id).await {
            warn!("⚠️ Could not leave voice in guild {}: {}", guild_id, e);
        }
        info!("👋 Disconnected from guild {}", guild_id);
        true
    }

    /// Called when the bot was removed from voice by someone else.
    pub async fn handle_membership_lost(&self, guild_id: GuildId) -> bool {
        debug!("Voice membership lost in guild {}", guild_id);
        self.disconnect(guild_id).await
    }

    pub fn enqueue(&self, guild_id: GuildId, tracks: Vec<TrackDescriptor>) -> MusicResult<EnqueueReceipt> {
        let session = self.require(guild_id)?;
        let starts_immediately = session.is_idle();

        let ids = session.queue.enqueue_all(tracks);
        Ok(EnqueueReceipt {
            ids,
            starts_immediately,
        })
    }

    pub async fn pause(&self, guild_id: GuildId) -> MusicResult<()> {
        let session = self.require(guild_id)?;
        match session.state() {
            PlayerState::Playing => {}
            state => return Err(MusicError::InvalidTransition { action: "pause", state }),
        }

        session.transport.pause().await?;
        session.shared.lock().mark_paused();
        info!("⏸️ Paused in guild {}", guild_id);
        Ok(())
    }

    pub async fn resume(&self, guild_id: GuildId) -> MusicResult<()> {
        let session = self.require(guild_id)?;
        match session.state() {
            PlayerState::Paused => {}
            state => return Err(MusicError::InvalidTransition { action: "resume", state }),
        }

        session.transport.resume().await?;
        session.shared.lock().mark_resumed();
        info!("▶️ Resumed in guild {}", guild_id);
        Ok(())
    }

    /// Registers `voter`'s skip vote, skipping once a majority of `listeners` agrees.
    pub async fn skip(&self, guild_id: GuildId, voter: UserId, listeners: usize) -> MusicResult<SkipOutcome> {
        let session = self.require(guild_id)?;

        let outcome = {
            let mut shared = session.shared.lock();
            let state = shared.state();
            let entry = match (state, shared.current_id()) {
                (PlayerState::Playing | PlayerState::Paused, Some(entry)) => entry,
                _ => return Err(MusicError::InvalidTransition { action: "skip", state }),
            };
            shared.votes_mut().cast(entry, voter, listeners)
        };

        match outcome {
            VoteOutcome::AlreadyVoted => Ok(SkipOutcome::AlreadyVoted),
            VoteOutcome::Pending { votes, required } => Ok(SkipOutcome::VoteNotReached { votes, required }),
            VoteOutcome::Passed { votes, .. } => {
                session.transport.stop().await;
                info!("⏭️ Skipped in guild {} ({} vote(s))", guild_id, votes);
                Ok(SkipOutcome::Skipped { by_vote: listeners > 1 })
            }
        }
    }

    /// The current track and one page of the display list.
    pub fn snapshot(&self, guild_id: GuildId, page: usize) -> QueuePage {
        let Some(session) = self.get(guild_id) else {
            return QueuePage {
                current: None,
                elapsed: None,
                items: Vec::new(),
                layout: PageLayout::compute(0, false, page),
                total_items: 0,
                total_duration: Default::default(),
            };
        };

        let now_playing = session.shared.lock().now_playing();
        let (current, elapsed) = match now_playing {
            Some((track, elapsed)) => (Some(track), elapsed),
            None => (None, None),
        };

        let total_items = session.queue.len();
        let layout = PageLayout::compute(total_items, current.is_some(), page);
        QueuePage {
            items: session.queue.peek_display(layout.offset, layout.limit),
            total_duration: session.queue.total_duration(),
            current,
            elapsed,
            layout,
            total_items,
        }
    }

    /// Disconnects every guild; used on process exit.
    pub async fn shutdown_all(&self) {
        let guilds: Vec<GuildId> = self.sessions.iter().map(|entry| *entry.key()).collect();
        for guild_id in guilds {
            self.disconnect(guild_id).await;
        }
    }
}

use async_trait::async_trait;
use parking_lot::Mutex;
use serenity::model::id::{ChannelId, GuildId};
use songbird::{
    input::{HttpRequest, Input},
    tracks::{PlayMode, TrackHandle},
    Call, CoreEvent, Event, EventContext, EventHandler as VoiceEventHandler, Songbird, TrackEvent,
};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use tracing::{debug, info, warn};

use super::{
    error::TransportError,
    transport::{CompletionSignal, PlaybackOutcome, StreamRef, Transport, VoiceGateway},
};

/// Voice gateway backed by the songbird manager registered on the client.
pub struct SongbirdGateway {
    manager: Arc<Songbird>,
    http: reqwest::Client,
    volume: f32,
}

impl SongbirdGateway {
    pub fn new(manager: Arc<Songbird>, http: reqwest::Client, volume: f32) -> Self {
        Self {
            manager,
            http,
            volume: volume.clamp(0.0, 2.0),
        }
    }
}

#[async_trait]
impl VoiceGateway for SongbirdGateway {
    async fn join(&self, guild_id: GuildId, channel_id: ChannelId) -> Result<Arc<dyn Transport>, TransportError> {
        let call = self
            .manager
            .join(guild_id, channel_id)
            .await
            .map_err(|e| TransportError::Join(e.to_string()))?;

        let state = Arc::new(TransportState::default());
        state.connected.store(true, Ordering::SeqCst);

        {
            let mut handler = call.lock().await;
            handler.remove_all_global_events();
            handler.add_global_event(
                CoreEvent::DriverDisconnect.into(),
                ConnectionWatch {
                    state: state.clone(),
                    connected: false,
                },
            );
            // Songbird reports a full reconnect after a driver restart as a connect.
            for event in [CoreEvent::DriverConnect, CoreEvent::DriverReconnect] {
                handler.add_global_event(
                    event.into(),
                    ConnectionWatch {
                        state: state.clone(),
                        connected: true,
                    },
                );
            }
            if let Err(e) = handler.deafen(true).await {
                debug!("Could not self-deafen in guild {}: {}", guild_id, e);
            }
        }

        Ok(Arc::new(SongbirdTransport {
            call,
            http: self.http.clone(),
            volume: self.volume,
            state,
        }))
    }

    async fn move_to(&self, guild_id: GuildId, channel_id: ChannelId) -> Result<(), TransportError> {
        // Joining another channel of the same guild moves the existing call.
        self.manager
            .join(guild_id, channel_id)
            .await
            .map(|_| ())
            .map_err(|e| TransportError::Join(e.to_string()))
    }

    async fn leave(&self, guild_id: GuildId) -> Result<(), TransportError> {
        self.manager
            .remove(guild_id)
            .await
            .map_err(|e| TransportError::Control(e.to_string()))
    }
}

#[derive(Default)]
struct TransportState {
    playing: AtomicBool,
    paused: AtomicBool,
    connected: AtomicBool,
    current: Mutex<Option<ActiveTrack>>,
}

struct ActiveTrack {
    handle: TrackHandle,
    signal: Option<CompletionSignal>,
}

impl TransportState {
    /// Resolves the completion of `track` if it is still the active one.
    fn finish(&self, track: &TrackHandle, outcome: PlaybackOutcome) {
        let signal = {
            let mut current = self.current.lock();
            match current.as_ref() {
                Some(active) if active.handle.uuid() == track.uuid() => {}
                _ => return,
            }
            self.playing.store(false, Ordering::SeqCst);
            self.paused.store(false, Ordering::SeqCst);
            current.take().and_then(|active| active.signal)
        };

        if let Some(signal) = signal {
            signal.complete(outcome);
        }
    }

    fn active_handle(&self) -> Result<TrackHandle, TransportError> {
        self.current
            .lock()
            .as_ref()
            .map(|active| active.handle.clone())
            .ok_or_else(|| TransportError::Control("nothing is playing".to_string()))
    }
}

/// One songbird call playing HTTP streams one at a time.
pub struct SongbirdTransport {
    call: Arc<tokio::sync::Mutex<Call>>,
    http: reqwest::Client,
    volume: f32,
    state: Arc<TransportState>,
}

#[async_trait]
impl Transport for SongbirdTransport {
    async fn play(&self, stream: StreamRef, on_complete: CompletionSignal) -> Result<(), TransportError> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }
        if !self.is_idle() {
            return Err(TransportError::AlreadyPlaying);
        }

        let input: Input = HttpRequest::new(self.http.clone(), stream.url().to_string()).into();
        let handle = self.call.lock().await.play_input(input);
        if let Err(e) = handle.set_volume(self.volume) {
            warn!("⚠️ Could not set volume: {:?}", e);
        }

        *self.state.current.lock() = Some(ActiveTrack {
            handle: handle.clone(),
            signal: Some(on_complete),
        });
        self.state.playing.store(true, Ordering::SeqCst);
        self.state.paused.store(false, Ordering::SeqCst);

        let watcher = TrackWatch {
            state: self.state.clone(),
            track: handle.clone(),
        };
        for event in [TrackEvent::End, TrackEvent::Error] {
            if let Err(e) = handle.add_event(Event::Track(event), watcher.clone()) {
                // Already over before we could watch it.
                self.state.finish(&handle, Err(format!("failed to watch track: {:?}", e)));
                break;
            }
        }
        Ok(())
    }

    async fn stop(&self) {
        let Ok(handle) = self.state.active_handle() else {
            return;
        };
        if let Err(e) = handle.stop() {
            debug!("Stopping track: {:?}", e);
        }
        // The End event may never arrive once the driver is gone.
        self.state.finish(&handle, Ok(()));
    }

    async fn pause(&self) -> Result<(), TransportError> {
        self.state
            .active_handle()?
            .pause()
            .map_err(|e| TransportError::Control(format!("{:?}", e)))?;
        self.state.playing.store(false, Ordering::SeqCst);
        self.state.paused.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn resume(&self) -> Result<(), TransportError> {
        self.state
            .active_handle()?
            .play()
            .map_err(|e| TransportError::Control(format!("{:?}", e)))?;
        self.state.paused.store(false, Ordering::SeqCst);
        self.state.playing.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_playing(&self) -> bool {
        self.state.playing.load(Ordering::SeqCst)
    }

    fn is_paused(&self) -> bool {
        self.state.paused.load(Ordering::SeqCst)
    }

    fn is_connected(&self) -> bool {
        self.state.connected.load(Ordering::SeqCst)
    }
}

/// Resolves the completion signal when songbird reports the track ended or failed.
#[derive(Clone)]
struct TrackWatch {
    state: Arc<TransportState>,
    track: TrackHandle,
}

#[async_trait]
impl VoiceEventHandler for TrackWatch {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        if let EventContext::Track(tracks) = ctx {
            let outcome = tracks
                .iter()
                .find(|(_, handle)| handle.uuid() == self.track.uuid())
                .and_then(|(state, _)| match &state.playing {
                    PlayMode::Errored(e) => Some(Err(format!("{:?}", e))),
                    _ => None,
                })
                .unwrap_or(Ok(()));

            debug!("Track {} finished: {:?}", self.track.uuid(), outcome);
            self.state.finish(&self.track, outcome);
        }

        None
    }
}

struct ConnectionWatch {
    state: Arc<TransportState>,
    connected: bool,
}

#[async_trait]
impl VoiceEventHandler for ConnectionWatch {
    async fn act(&self, _ctx: &EventContext<'_>) -> Option<Event> {
        self.state.connected.store(self.connected, Ordering::SeqCst);
        if self.connected {
            info!("🔌 Voice driver connected");
        } else {
            warn!("🔌 Voice driver disconnected");
        }
        None
    }
}

use async_trait::async_trait;
use serenity::model::id::{ChannelId, GuildId};
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::debug;

use super::error::TransportError;

/// Resolved media URL handed to a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamRef(String);

impl StreamRef {
    pub fn new(url: impl Into<String>) -> Self {
        Self(url.into())
    }

    pub fn url(&self) -> &str {
        &self.0
    }
}

/// How a stream ended, as reported by the transport.
pub type PlaybackOutcome = Result<(), String>;

/// Write half of the one-shot completion signal.
///
/// Transports call [`complete`](Self::complete) from whatever thread their
/// end-of-stream callback runs on; the player loop awaits the matching
/// [`Completion`] on the runtime.
#[derive(Debug)]
pub struct CompletionSignal(oneshot::Sender<PlaybackOutcome>);

impl CompletionSignal {
    pub fn complete(self, outcome: PlaybackOutcome) {
        if self.0.send(outcome).is_err() {
            debug!("Completion signal fired after the player stopped listening");
        }
    }
}

/// Read half of the completion signal.
#[derive(Debug)]
pub struct Completion(oneshot::Receiver<PlaybackOutcome>);

impl Completion {
    /// Resolves when the stream ends. A transport that dropped the signal
    /// without firing it counts as an error.
    pub async fn wait(self) -> PlaybackOutcome {
        self.0
            .await
            .unwrap_or_else(|_| Err("transport dropped the completion signal".to_string()))
    }
}

pub fn completion_channel() -> (CompletionSignal, Completion) {
    let (tx, rx) = oneshot::channel();
    (CompletionSignal(tx), Completion(rx))
}

/// An active voice connection able to play one stream at a time.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Starts `stream`. Calling this while something is playing is an error;
    /// callers must [`stop`](Self::stop) and wait for idle first.
    async fn play(&self, stream: StreamRef, on_complete: CompletionSignal) -> Result<(), TransportError>;

    async fn stop(&self);

    async fn pause(&self) -> Result<(), TransportError>;

    async fn resume(&self) -> Result<(), TransportError>;

    fn is_playing(&self) -> bool;

    fn is_paused(&self) -> bool;

    fn is_connected(&self) -> bool;

    fn is_idle(&self) -> bool {
        !self.is_playing() && !self.is_paused()
    }
}

/// Platform side of voice connections: produces transports.
#[async_trait]
pub trait VoiceGateway: Send + Sync {
    async fn join(&self, guild_id: GuildId, channel_id: ChannelId) -> Result<Arc<dyn Transport>, TransportError>;

    async fn move_to(&self, guild_id: GuildId, channel_id: ChannelId) -> Result<(), TransportError>;

    async fn leave(&self, guild_id: GuildId) -> Result<(), TransportError>;
}

#[cfg(test)]
pub mod fake {
    //! In-memory transport and gateway for player and session tests.

    use super::*;
    use parking_lot::Mutex;
    use std::time::Duration;
    use tokio::time::Instant;

    #[derive(Default)]
    struct FakeState {
        playing: bool,
        paused: bool,
        pending: Option<CompletionSignal>,
        played: Vec<String>,
        played_at: Vec<Instant>,
        stops: usize,
        stopped_at: Option<Instant>,
        overlapping_plays: usize,
        /// Wind-down time of a stream this transport did not start through `play`.
        stray: Option<Duration>,
        winding_down_until: Option<Instant>,
    }

    impl FakeState {
        fn busy(&self) -> bool {
            self.playing || self.paused || self.winding_down_until.is_some_and(|until| Instant::now() < until)
        }
    }

    pub struct FakeTransport {
        state: Mutex<FakeState>,
        connected: std::sync::atomic::AtomicBool,
    }

    impl FakeTransport {
        pub fn new() -> Arc<Self> {
            Arc::new(Self {
                state: Mutex::new(FakeState::default()),
                connected: std::sync::atomic::AtomicBool::new(true),
            })
        }

        /// Simulates the end-of-stream callback.
        pub fn finish(&self, outcome: PlaybackOutcome) {
            let signal = {
                let mut state = self.state.lock();
                state.playing = false;
                state.paused = false;
                state.pending.take()
            };
            if let Some(signal) = signal {
                // Fire from another thread, like a real voice driver would.
                std::thread::spawn(move || signal.complete(outcome))
                    .join()
                    .expect("callback thread");
            }
        }

        /// Marks a foreign stream as playing; after `stop` it stays busy for `wind_down`.
        pub fn start_stray(&self, wind_down: Duration) {
            let mut state = self.state.lock();
            state.playing = true;
            state.stray = Some(wind_down);
        }

        pub fn set_connected(&self, connected: bool) {
            self.connected.store(connected, std::sync::atomic::Ordering::SeqCst);
        }

        pub fn played(&self) -> Vec<String> {
            self.state.lock().played.clone()
        }

        pub fn played_at(&self) -> Vec<Instant> {
            self.state.lock().played_at.clone()
        }

        pub fn stops(&self) -> usize {
            self.state.lock().stops
        }

        pub fn stopped_at(&self) -> Option<Instant> {
            self.state.lock().stopped_at
        }

        pub fn overlapping_plays(&self) -> usize {
            self.state.lock().overlapping_plays
        }
    }

    #[async_trait]
    impl Transport for FakeTransport {
        async fn play(&self, stream: StreamRef, on_complete: CompletionSignal) -> Result<(), TransportError> {
            let mut state = self.state.lock();
            if state.busy() {
                state.overlapping_plays += 1;
                return Err(TransportError::AlreadyPlaying);
            }
            state.playing = true;
            state.pending = Some(on_complete);
            state.played.push(stream.url().to_string());
            state.played_at.push(Instant::now());
            Ok(())
        }

        async fn stop(&self) {
            {
                let mut state = self.state.lock();
                state.stops += 1;
                let now = Instant::now();
                state.stopped_at = Some(now);
                if let Some(wind_down) = state.stray.take() {
                    state.winding_down_until = Some(now + wind_down);
                }
            }
            self.finish(Ok(()));
        }

        async fn pause(&self) -> Result<(), TransportError> {
            let mut state = self.state.lock();
            if !state.playing {
                return Err(TransportError::Control("nothing to pause".into()));
            }
            state.playing = false;
            state.paused = true;
            Ok(())
        }

        async fn resume(&self) -> Result<(), TransportError> {
            let mut state = self.state.lock();
            if !state.paused {
                return Err(TransportError::Control("nothing to resume".into()));
            }
            state.playing = true;
            state.paused = false;
            Ok(())
        }

        fn is_playing(&self) -> bool {
            let state = self.state.lock();
            state.playing || state.winding_down_until.is_some_and(|until| Instant::now() < until)
        }

        fn is_paused(&self) -> bool {
            self.state.lock().paused
        }

        fn is_connected(&self) -> bool {
            self.connected.load(std::sync::atomic::Ordering::SeqCst)
        }
    }

    #[derive(Default)]
    pub struct FakeGateway {
        pub joins: Mutex<Vec<(GuildId, ChannelId)>>,
        pub moves: Mutex<Vec<(GuildId, ChannelId)>>,
        pub leaves: Mutex<Vec<GuildId>>,
        pub transports: Mutex<Vec<Arc<FakeTransport>>>,
    }

    impl FakeGateway {
        pub fn last_transport(&self) -> Arc<FakeTransport> {
            self.transports.lock().last().cloned().expect("no transport created")
        }
    }

    #[async_trait]
    impl VoiceGateway for FakeGateway {
        async fn join(&self, guild_id: GuildId, channel_id: ChannelId) -> Result<Arc<dyn Transport>, TransportError> {
            self.joins.lock().push((guild_id, channel_id));
            let transport = FakeTransport::new();
            self.transports.lock().push(transport.clone());
            Ok(transport)
        }

        async fn move_to(&self, guild_id: GuildId, channel_id: ChannelId) -> Result<(), TransportError> {
            self.moves.lock().push((guild_id, channel_id));
            Ok(())
        }

        async fn leave(&self, guild_id: GuildId) -> Result<(), TransportError> {
            self.leaves.lock().push(guild_id);
            if let Some(transport) = self.transports.lock().last() {
                transport.set_connected(false);
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn completion_crosses_threads() {
        let (signal, completion) = completion_channel();
        std::thread::spawn(move || signal.complete(Err("decoder exploded".into())));
        assert_eq!(completion.wait().await, Err("decoder exploded".to_string()));
    }

    #[tokio::test]
    async fn dropped_signal_is_an_error() {
        let (signal, completion) = completion_channel();
        drop(signal);
        assert!(completion.wait().await.is_err());
    }
}

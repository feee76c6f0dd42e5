use std::{sync::Arc, time::Duration};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{
    notifier::{MessageRef, Notice, Notifier, NotifyError},
    player::SharedPlayer,
    track::{EntryId, TrackDescriptor},
    transport::Transport,
};

/// Cells in the "Now Playing" progress bar.
pub const NOW_PLAYING_BAR: usize = 20;
/// Cells in the queue view progress bar.
pub const QUEUE_BAR: usize = 10;

/// Keeps a "Now Playing" message up to date while its track plays.
pub struct ProgressReporter {
    pub entry: EntryId,
    pub track: TrackDescriptor,
    pub total: Duration,
    pub message: MessageRef,
    pub notifier: Arc<dyn Notifier>,
    pub transport: Arc<dyn Transport>,
    pub shared: SharedPlayer,
    pub interval: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StopReason {
    TrackChanged,
    Disconnected,
    Ended,
    MessageGone,
    EditFailed,
}

/// A running reporter. Cancelling it skips the final edit.
pub struct ReporterHandle {
    token: CancellationToken,
    task: JoinHandle<()>,
}

impl ReporterHandle {
    pub async fn cancel(self) {
        self.token.cancel();
        if let Err(e) = self.task.await {
            if e.is_panic() {
                warn!("⚠️ Progress reporter panicked: {}", e);
            }
        }
    }
}

impl ProgressReporter {
    pub fn spawn(self, token: CancellationToken) -> ReporterHandle {
        let task = tokio::spawn(self.run(token.clone()));
        ReporterHandle { token, task }
    }

    async fn run(self, token: CancellationToken) {
        let reason = tokio::select! {
            biased;
            _ = token.cancelled() => {
                debug!("Progress reporter for {} cancelled", self.entry);
                return;
            }
            reason = self.report() => reason,
        };
        debug!("Progress reporter for {} stopped: {:?}", self.entry, reason);

        if reason != StopReason::MessageGone && self.is_current() {
            self.finalize().await;
        }
    }

    async fn report(&self) -> StopReason {
        loop {
            if !self.is_current() {
                return StopReason::TrackChanged;
            }
            if !self.transport.is_connected() {
                return StopReason::Disconnected;
            }
            if self.transport.is_idle() {
                return StopReason::Ended;
            }

            let elapsed = self.shared.lock().elapsed().unwrap_or_default().min(self.total);
            let notice = Notice::NowPlaying {
                track: self.track.clone(),
                elapsed: Some(elapsed),
            };
            match self.notifier.edit(self.message, notice).await {
                Ok(()) => {}
                Err(NotifyError::NotFound) => return StopReason::MessageGone,
                Err(e) => {
                    warn!("⚠️ Could not update progress of {}: {}", self.track.title, e);
                    return StopReason::EditFailed;
                }
            }

            tokio::time::sleep(self.interval).await;
        }
    }

    fn is_current(&self) -> bool {
        self.shared.lock().current_id() == Some(self.entry)
    }

    async fn finalize(&self) {
        let notice = Notice::NowPlayingFinished {
            track: self.track.clone(),
        };
        match self.notifier.edit(self.message, notice).await {
            Ok(()) | Err(NotifyError::NotFound) => {}
            Err(e) => debug!("Could not finalize Now Playing message: {}", e),
        }
    }
}

/// `MM:SS`, or `HH:MM:SS` from one hour on.
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    let (hours, minutes, seconds) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if hours > 0 {
        format!("{:02}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{:02}:{:02}", minutes, seconds)
    }
}

pub fn format_optional_duration(duration: Option<Duration>) -> String {
    duration
        .filter(|d| !d.is_zero())
        .map(format_duration)
        .unwrap_or_else(|| "N/A".to_string())
}

/// `█` for the elapsed share of `cells`, `─` for the rest.
pub fn progress_bar(elapsed: Duration, total: Duration, cells: usize) -> String {
    let filled = if total.is_zero() {
        0
    } else {
        let ratio = elapsed.min(total).as_secs_f64() / total.as_secs_f64();
        ((ratio * cells as f64) as usize).min(cells)
    };
    format!("{}{}", "█".repeat(filled), "─".repeat(cells - filled))
}

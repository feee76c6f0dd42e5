use parking_lot::Mutex;
use std::{collections::VecDeque, time::Duration};
use tracing::{debug, info};

use super::track::{EntryId, QueuedTrack, TrackDescriptor};

/// Unbounded FIFO feeding a single player loop.
///
/// Two views are kept in lockstep:
///
/// - the consumption channel, which the player loop awaits on, and
/// - the display list, which status commands peek at without consuming.
///
/// Every mutation of the display list happens under its lock, and producers
/// send into the channel while still holding it, so both views always agree
/// on order. An entry received from the channel whose id does not match the
/// display head was cleared in the meantime and is dropped.
pub struct PlaybackQueue {
    sender: flume::Sender<QueuedTrack>,
    receiver: flume::Receiver<QueuedTrack>,
    display: Mutex<DisplayList>,
}

struct DisplayList {
    items: VecDeque<QueuedTrack>,
    next_id: u64,
}

impl PlaybackQueue {
    pub fn new() -> Self {
        let (sender, receiver) = flume::unbounded();
        Self {
            sender,
            receiver,
            display: Mutex::new(DisplayList {
                items: VecDeque::new(),
                next_id: 1,
            }),
        }
    }

    /// Appends a track to both views. Never blocks and never rejects.
    pub fn enqueue(&self, track: TrackDescriptor) -> EntryId {
        let mut display = self.display.lock();
        let id = self.push_locked(&mut display, track);
        let pending = display.items.len();
        debug!("➕ Queued {} ({} pending)", id, pending);
        id
    }

    /// Appends a batch (a playlist) without interleaving with other producers.
    pub fn enqueue_all(&self, tracks: impl IntoIterator<Item = TrackDescriptor>) -> Vec<EntryId> {
        let mut display = self.display.lock();
        let ids: Vec<EntryId> = tracks
            .into_iter()
            .map(|track| self.push_locked(&mut display, track))
            .collect();
        let pending = display.items.len();
        info!("➕ Queued {} tracks ({} pending)", ids.len(), pending);
        ids
    }

    fn push_locked(&self, display: &mut DisplayList, track: TrackDescriptor) -> EntryId {
        let id = EntryId(display.next_id);
        display.next_id += 1;

        let entry = QueuedTrack { id, track };
        display.items.push_back(entry.clone());
        // Cannot fail: `self` owns the receiving half.
        let _ = self.sender.send(entry);
        id
    }

    /// Waits for the next entry and removes it from both views.
    pub async fn dequeue_for_play(&self) -> QueuedTrack {
        loop {
            let entry = match self.receiver.recv_async().await {
                Ok(entry) => entry,
                // Unreachable while `self` holds the sender; park instead of spinning.
                Err(_) => std::future::pending().await,
            };

            if let Some(entry) = self.claim(entry) {
                return entry;
            }
        }
    }

    /// Non-blocking variant of [`dequeue_for_play`](Self::dequeue_for_play).
    pub fn try_dequeue_for_play(&self) -> Option<QueuedTrack> {
        while let Ok(entry) = self.receiver.try_recv() {
            if let Some(entry) = self.claim(entry) {
                return Some(entry);
            }
        }
        None
    }

    fn claim(&self, entry: QueuedTrack) -> Option<QueuedTrack> {
        let mut display = self.display.lock();
        if display.items.front().map(|head| head.id) == Some(entry.id) {
            display.items.pop_front();
            Some(entry)
        } else {
            debug!("🗑️ Dropping {} (cleared before it was claimed)", entry.id);
            None
        }
    }

    /// Read-only copy of `limit` display entries starting at `offset`.
    pub fn peek_display(&self, offset: usize, limit: usize) -> Vec<TrackDescriptor> {
        self.display
            .lock()
            .items
            .iter()
            .skip(offset)
            .take(limit)
            .map(|entry| entry.track.clone())
            .collect()
    }

    /// Empties both views in one critical section. Returns how many entries were removed.
    pub fn clear(&self) -> usize {
        let mut display = self.display.lock();
        // May be one short of the display list when a consumer holds an
        // entry it has not claimed yet; that entry is dropped by `claim`.
        self.receiver.drain().for_each(drop);
        let removed = display.items.len();
        display.items.clear();
        if removed > 0 {
            info!("🗑️ Queue cleared ({} tracks)", removed);
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.display.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.display.lock().items.is_empty()
    }

    /// Sum of the known durations of pending entries.
    pub fn total_duration(&self) -> Duration {
        self.display
            .lock()
            .items
            .iter()
            .filter_map(|entry| entry.track.duration)
            .sum()
    }
}

impl Default for PlaybackQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// Entries shown on the first page when a track is playing; it also shows "Now Playing".
pub const FIRST_PAGE_WITH_CURRENT: usize = 9;
pub const ITEMS_PER_PAGE: usize = 10;

/// Which slice of the display list a queue page shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageLayout {
    /// 1-based, clamped into `1..=total_pages`.
    pub page: usize,
    pub total_pages: usize,
    pub offset: usize,
    pub limit: usize,
}

impl PageLayout {
    /// Page 1 holds the current track plus [`FIRST_PAGE_WITH_CURRENT`]
    /// entries; later pages hold [`ITEMS_PER_PAGE`] each.
    pub fn compute(total_items: usize, has_current: bool, page: usize) -> Self {
        let first = if has_current { FIRST_PAGE_WITH_CURRENT } else { ITEMS_PER_PAGE };
        let total_pages = if total_items <= first {
            1
        } else {
            1 + (total_items - first).div_ceil(ITEMS_PER_PAGE)
        };
        let page = page.clamp(1, total_pages);
        let (offset, limit) = if page == 1 {
            (0, first)
        } else {
            (first + (page - 2) * ITEMS_PER_PAGE, ITEMS_PER_PAGE)
        };

        Self {
            page,
            total_pages,
            offset,
            limit,
        }
    }
}

/// Rendered-ready view of one queue page.
#[derive(Debug, Clone, PartialEq)]
pub struct QueuePage {
    pub current: Option<TrackDescriptor>,
    pub elapsed: Option<Duration>,
    pub items: Vec<TrackDescriptor>,
    pub layout: PageLayout,
    pub total_items: usize,
    pub total_duration: Duration,
}

impl QueuePage {
    pub fn is_empty(&self) -> bool {
        self.current.is_none() && self.items.is_empty()
    }

    /// Queue position (1-based) of the `index`-th item on this page.
    pub fn position(&self, index: usize) -> usize {
        self.layout.offset + index + 1
    }
}

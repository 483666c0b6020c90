use std::collections::{HashMap, VecDeque};

use parking_lot::Mutex;

use crate::common::{FrameId, Timestamp};

/// Access history for a single frame.
#[derive(Debug)]
struct FrameRecord {
    /// The last up to k access timestamps, oldest at the front
    history: VecDeque<Timestamp>,
    /// Whether this frame may currently be chosen as a victim
    evictable: bool,
}

impl FrameRecord {
    fn new() -> Self {
        Self {
            history: VecDeque::new(),
            evictable: false,
        }
    }

    fn record_access(&mut self, timestamp: Timestamp, k: usize) {
        self.history.push_back(timestamp);
        while self.history.len() > k {
            self.history.pop_front();
        }
    }

    /// The timestamp of the k-th most recent access, or None when the
    /// frame has fewer than k accesses (backward k-distance +inf).
    fn kth_recent(&self, k: usize) -> Option<Timestamp> {
        if self.history.len() < k {
            None
        } else {
            Some(self.history[self.history.len() - k])
        }
    }

    fn earliest(&self) -> Timestamp {
        *self.history.front().expect("record has at least one access")
    }
}

#[derive(Debug)]
struct ReplacerInner {
    entries: HashMap<FrameId, FrameRecord>,
    evictable_count: usize,
    /// Monotonic logical clock; wraparound is not a concern at u64 width
    current_timestamp: Timestamp,
}

/// LRU-K replacement policy.
///
/// The victim is the evictable frame with the largest backward
/// k-distance, i.e. the one whose k-th most recent access is oldest. A
/// frame with fewer than k recorded accesses has +inf distance and is
/// preferred; ties among such frames go to the one whose earliest
/// recorded access is oldest (classical LRU on first-seen time).
pub struct LruKReplacer {
    /// Maximum number of frames the replacer can track
    num_frames: usize,
    /// K value for the LRU-K algorithm
    k: usize,
    inner: Mutex<ReplacerInner>,
}

impl LruKReplacer {
    pub fn new(num_frames: usize, k: usize) -> Self {
        assert!(k > 0, "k must be > 0");
        Self {
            num_frames,
            k,
            inner: Mutex::new(ReplacerInner {
                entries: HashMap::new(),
                evictable_count: 0,
                current_timestamp: 0,
            }),
        }
    }

    /// Records an access to the given frame at the current logical time.
    ///
    /// An access to an unknown frame while the replacer already tracks
    /// `num_frames` distinct frames is ignored. Otherwise an unknown
    /// frame gets a fresh, non-evictable record.
    pub fn record_access(&self, frame_id: FrameId) {
        let mut inner = self.inner.lock();

        if !inner.entries.contains_key(&frame_id) && inner.entries.len() >= self.num_frames {
            return;
        }

        let timestamp = inner.current_timestamp;
        inner.current_timestamp += 1;

        inner
            .entries
            .entry(frame_id)
            .or_insert_with(FrameRecord::new)
            .record_access(timestamp, self.k);
    }

    /// Marks a frame as evictable or pinned-down. Unknown frames are
    /// ignored.
    pub fn set_evictable(&self, frame_id: FrameId, evictable: bool) {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;

        if let Some(record) = inner.entries.get_mut(&frame_id) {
            if record.evictable != evictable {
                record.evictable = evictable;
                if evictable {
                    inner.evictable_count += 1;
                } else {
                    inner.evictable_count -= 1;
                }
            }
        }
    }

    /// Selects and removes the victim frame, or None if no frame is
    /// evictable.
    pub fn evict(&self) -> Option<FrameId> {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;

        let mut victim: Option<FrameId> = None;
        // (has k accesses, ordering timestamp): the k-th most recent for
        // full histories, the earliest access otherwise
        let mut victim_key: Option<(bool, Timestamp)> = None;

        for (&frame_id, record) in inner.entries.iter() {
            if !record.evictable {
                continue;
            }
            let key = match record.kth_recent(self.k) {
                Some(ts) => (true, ts),
                None => (false, record.earliest()),
            };
            // +inf distance (false) sorts before finite; within a class
            // the smaller timestamp means the larger distance
            if victim_key.map_or(true, |best| key < best) {
                victim = Some(frame_id);
                victim_key = Some(key);
            }
        }

        if let Some(frame_id) = victim {
            inner.entries.remove(&frame_id);
            inner.evictable_count -= 1;
        }
        victim
    }

    /// Forgets a frame entirely.
    ///
    /// # Panics
    /// Panics if the frame is tracked but not evictable.
    pub fn remove(&self, frame_id: FrameId) {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;

        match inner.entries.get(&frame_id) {
            None => {}
            Some(record) => {
                assert!(
                    record.evictable,
                    "cannot remove non-evictable frame {} from replacer",
                    frame_id
                );
                inner.entries.remove(&frame_id);
                inner.evictable_count -= 1;
            }
        }
    }

    /// Returns the number of evictable frames.
    pub fn size(&self) -> usize {
        self.inner.lock().evictable_count
    }

    pub fn k(&self) -> usize {
        self.k
    }
}

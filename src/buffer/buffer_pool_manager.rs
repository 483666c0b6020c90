use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::common::{
    FrameId, PageId, QuarryError, Result, DEFAULT_BUCKET_SIZE, INVALID_PAGE_ID, PAGE_SIZE,
};
use crate::container::hash::ExtendibleHashTable;
use crate::storage::disk::{DiskManager, DiskScheduler};

use super::{Frame, LruKReplacer, ReadPageGuard, WritePageGuard};

/// Pool bookkeeping shared with page guards so their drops can unpin.
pub(crate) struct PoolState {
    /// Serializes every public buffer pool operation
    latch: Mutex<()>,
    /// The buffer pool frames
    frames: Vec<Arc<Frame>>,
    /// Page table: maps resident page IDs to frame IDs
    page_table: ExtendibleHashTable<PageId, FrameId>,
    /// Frames not currently holding any page
    free_list: Mutex<VecDeque<FrameId>>,
    /// LRU-K replacer for eviction decisions
    replacer: LruKReplacer,
}

impl PoolState {
    /// Guard-drop path: same semantics as `unpin_page`, result ignored.
    pub(crate) fn complete_unpin(&self, page_id: PageId, is_dirty: bool) {
        self.unpin(page_id, is_dirty);
    }

    fn unpin(&self, page_id: PageId, is_dirty: bool) -> bool {
        let _guard = self.latch.lock();
        let Some(frame_id) = self.page_table.find(&page_id) else {
            return false;
        };
        let frame = &self.frames[frame_id.as_usize()];
        match frame.unpin() {
            None => false,
            Some(remaining) => {
                if is_dirty {
                    frame.set_dirty(true);
                }
                if remaining == 0 {
                    self.replacer.set_evictable(frame_id, true);
                }
                true
            }
        }
    }
}

/// BufferPoolManager caches disk pages in a fixed set of frames.
///
/// The page table is an extendible hash table, eviction decisions come
/// from an LRU-K replacer, and pages are handed out through RAII guards
/// that pin the frame and latch its bytes. A pool-level latch is taken at
/// the entry of every operation; disk I/O may block while it is held.
pub struct BufferPoolManager {
    /// Number of frames in the buffer pool
    pool_size: usize,
    /// Shared state (also referenced by outstanding guards)
    state: Arc<PoolState>,
    /// Disk scheduler for page I/O
    disk_scheduler: DiskScheduler,
}

impl BufferPoolManager {
    /// Creates a buffer pool with `pool_size` frames and an LRU-K
    /// replacer with the given k.
    pub fn new(pool_size: usize, replacer_k: usize, disk_manager: Arc<DiskManager>) -> Self {
        assert!(pool_size > 0, "pool_size must be > 0");

        let mut frames = Vec::with_capacity(pool_size);
        let mut free_list = VecDeque::with_capacity(pool_size);
        for i in 0..pool_size {
            let frame_id = FrameId::new(i as u32);
            frames.push(Arc::new(Frame::new(frame_id)));
            free_list.push_back(frame_id);
        }

        let state = Arc::new(PoolState {
            latch: Mutex::new(()),
            frames,
            page_table: ExtendibleHashTable::new(DEFAULT_BUCKET_SIZE),
            free_list: Mutex::new(free_list),
            replacer: LruKReplacer::new(pool_size, replacer_k),
        });

        Self {
            pool_size,
            state,
            disk_scheduler: DiskScheduler::new(disk_manager),
        }
    }

    /// Allocates a fresh page and returns a pinned, zeroed write guard
    /// for it. Fails with `BufferPoolFull` when no frame is free or
    /// evictable.
    pub fn new_page(&self) -> Result<WritePageGuard> {
        let (page_id, frame_id) = {
            let _latch = self.state.latch.lock();

            let frame_id = self.acquire_frame()?;
            let page_id = self.disk_scheduler.disk_manager().allocate_page()?;

            let frame = &self.state.frames[frame_id.as_usize()];
            frame.reset();
            frame.set_page_id(page_id);
            frame.pin();

            self.state.page_table.insert(page_id, frame_id);
            self.state.replacer.record_access(frame_id);
            self.state.replacer.set_evictable(frame_id, false);

            (page_id, frame_id)
        };

        let frame = Arc::clone(&self.state.frames[frame_id.as_usize()]);
        Ok(unsafe { WritePageGuard::new(page_id, frame, Arc::clone(&self.state)) })
    }

    /// Fetches a page for shared access, reading it from disk if it is
    /// not resident.
    pub fn fetch_page_read(&self, page_id: PageId) -> Result<ReadPageGuard> {
        let frame_id = self.fetch_frame(page_id)?;
        let frame = Arc::clone(&self.state.frames[frame_id.as_usize()]);
        Ok(unsafe { ReadPageGuard::new(page_id, frame, Arc::clone(&self.state)) })
    }

    /// Fetches a page for exclusive access, reading it from disk if it is
    /// not resident.
    pub fn fetch_page_write(&self, page_id: PageId) -> Result<WritePageGuard> {
        let frame_id = self.fetch_frame(page_id)?;
        let frame = Arc::clone(&self.state.frames[frame_id.as_usize()]);
        Ok(unsafe { WritePageGuard::new(page_id, frame, Arc::clone(&self.state)) })
    }

    /// Decrements a page's pin count and ORs in the dirty flag. Returns
    /// false when the page is not resident or was not pinned. When the
    /// pin count reaches zero the frame becomes evictable.
    ///
    /// Guard drops call this automatically; it stays public for callers
    /// managing pins by hand.
    pub fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> bool {
        self.state.unpin(page_id, is_dirty)
    }

    /// Writes a page's bytes to disk unconditionally and clears its dirty
    /// flag. Returns Ok(false) when the page is not resident.
    pub fn flush_page(&self, page_id: PageId) -> Result<bool> {
        if page_id == INVALID_PAGE_ID {
            return Err(QuarryError::InvalidPageId(page_id));
        }

        let _latch = self.state.latch.lock();

        let Some(frame_id) = self.state.page_table.find(&page_id) else {
            return Ok(false);
        };
        let frame = &self.state.frames[frame_id.as_usize()];

        let mut data = [0u8; PAGE_SIZE];
        frame.copy_to(&mut data);
        self.disk_scheduler.schedule_write_sync(page_id, &data)?;
        frame.set_dirty(false);

        Ok(true)
    }

    /// Flushes every resident page to disk.
    pub fn flush_all_pages(&self) -> Result<()> {
        let _latch = self.state.latch.lock();

        for frame in &self.state.frames {
            let page_id = frame.page_id();
            if page_id == INVALID_PAGE_ID {
                continue;
            }
            let mut data = [0u8; PAGE_SIZE];
            frame.copy_to(&mut data);
            self.disk_scheduler.schedule_write_sync(page_id, &data)?;
            frame.set_dirty(false);
        }

        Ok(())
    }

    /// Removes a page from the pool and releases its ID. Returns Ok(true)
    /// when the page was removed or was not resident, Ok(false) when it
    /// is pinned. The ID is only released on the Ok(true) paths.
    pub fn delete_page(&self, page_id: PageId) -> Result<bool> {
        let _latch = self.state.latch.lock();

        let Some(frame_id) = self.state.page_table.find(&page_id) else {
            self.disk_scheduler.disk_manager().deallocate_page(page_id)?;
            return Ok(true);
        };

        let frame = &self.state.frames[frame_id.as_usize()];
        if frame.pin_count() > 0 {
            return Ok(false);
        }

        self.state.page_table.remove(&page_id);
        self.state.replacer.remove(frame_id);
        frame.reset();
        self.state.free_list.lock().push_back(frame_id);
        self.disk_scheduler.disk_manager().deallocate_page(page_id)?;

        Ok(true)
    }

    /// Returns the pin count of a resident page.
    pub fn get_pin_count(&self, page_id: PageId) -> Option<u32> {
        let _latch = self.state.latch.lock();
        self.state
            .page_table
            .find(&page_id)
            .map(|frame_id| self.state.frames[frame_id.as_usize()].pin_count())
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    pub fn free_frame_count(&self) -> usize {
        self.state.free_list.lock().len()
    }

    pub fn disk_manager(&self) -> &Arc<DiskManager> {
        self.disk_scheduler.disk_manager()
    }

    /// Brings a page into some frame and pins it. Caller-side latching is
    /// not needed; the pool latch is taken here.
    fn fetch_frame(&self, page_id: PageId) -> Result<FrameId> {
        if page_id == INVALID_PAGE_ID {
            return Err(QuarryError::InvalidPageId(page_id));
        }

        let _latch = self.state.latch.lock();

        // Resident: just pin and note the access
        if let Some(frame_id) = self.state.page_table.find(&page_id) {
            let frame = &self.state.frames[frame_id.as_usize()];
            frame.pin();
            self.state.replacer.record_access(frame_id);
            self.state.replacer.set_evictable(frame_id, false);
            return Ok(frame_id);
        }

        let frame_id = self.acquire_frame()?;
        let frame = &self.state.frames[frame_id.as_usize()];

        let mut data = [0u8; PAGE_SIZE];
        self.disk_scheduler.schedule_read_sync(page_id, &mut data)?;

        frame.set_page_id(page_id);
        frame.copy_from(&data);
        frame.set_dirty(false);
        frame.pin();

        self.state.page_table.insert(page_id, frame_id);
        self.state.replacer.record_access(frame_id);
        self.state.replacer.set_evictable(frame_id, false);

        Ok(frame_id)
    }

    /// Finds a frame to load into: the free list first, then an eviction
    /// victim (written back when dirty). Must be called with the pool
    /// latch held.
    fn acquire_frame(&self) -> Result<FrameId> {
        if let Some(frame_id) = self.state.free_list.lock().pop_front() {
            return Ok(frame_id);
        }

        let Some(frame_id) = self.state.replacer.evict() else {
            return Err(QuarryError::BufferPoolFull);
        };

        let frame = &self.state.frames[frame_id.as_usize()];
        let old_page_id = frame.page_id();

        if frame.is_dirty() {
            let mut data = [0u8; PAGE_SIZE];
            frame.copy_to(&mut data);
            self.disk_scheduler.schedule_write_sync(old_page_id, &data)?;
        }

        self.state.page_table.remove(&old_page_id);
        frame.reset();

        Ok(frame_id)
    }
}

use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use parking_lot::{RwLockReadGuard, RwLockWriteGuard};

use crate::common::{PageId, PAGE_SIZE};

use super::buffer_pool_manager::PoolState;
use super::Frame;

/// RAII guard for read-only access to a page.
///
/// Holds the frame's read latch for its whole lifetime and unpins the
/// page (not dirty) when dropped.
pub struct ReadPageGuard {
    page_id: PageId,
    state: Arc<PoolState>,
    /// Kept alive so the lifetime-erased latch guard below stays valid
    _frame: Arc<Frame>,
    data_guard: Option<RwLockReadGuard<'static, Box<[u8; PAGE_SIZE]>>>,
}

impl ReadPageGuard {
    /// # Safety
    /// The caller must pass the frame whose data latch is taken; the Arc
    /// keeps it alive for as long as the erased guard exists.
    pub(crate) unsafe fn new(page_id: PageId, frame: Arc<Frame>, state: Arc<PoolState>) -> Self {
        let data_guard = frame.data.read();
        let data_guard: RwLockReadGuard<'static, Box<[u8; PAGE_SIZE]>> =
            std::mem::transmute(data_guard);

        Self {
            page_id,
            state,
            _frame: frame,
            data_guard: Some(data_guard),
        }
    }

    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    pub fn data(&self) -> &[u8] {
        &self.data_guard.as_ref().unwrap()[..]
    }
}

impl Deref for ReadPageGuard {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        self.data()
    }
}

impl Drop for ReadPageGuard {
    fn drop(&mut self) {
        // Release the latch before touching pool state
        self.data_guard.take();
        self.state.complete_unpin(self.page_id, false);
    }
}

/// RAII guard for exclusive access to a page.
///
/// Holds the frame's write latch; `data_mut` flips the dirty flag, and
/// dropping the guard unpins the page with that flag.
pub struct WritePageGuard {
    page_id: PageId,
    state: Arc<PoolState>,
    _frame: Arc<Frame>,
    data_guard: Option<RwLockWriteGuard<'static, Box<[u8; PAGE_SIZE]>>>,
    is_dirty: bool,
}

impl WritePageGuard {
    /// # Safety
    /// Same contract as [`ReadPageGuard::new`].
    pub(crate) unsafe fn new(page_id: PageId, frame: Arc<Frame>, state: Arc<PoolState>) -> Self {
        let data_guard = frame.data.write();
        let data_guard: RwLockWriteGuard<'static, Box<[u8; PAGE_SIZE]>> =
            std::mem::transmute(data_guard);

        Self {
            page_id,
            state,
            _frame: frame,
            data_guard: Some(data_guard),
            is_dirty: false,
        }
    }

    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    pub fn data(&self) -> &[u8] {
        &self.data_guard.as_ref().unwrap()[..]
    }

    /// Returns the page bytes for writing and marks the page dirty.
    pub fn data_mut(&mut self) -> &mut [u8] {
        self.is_dirty = true;
        &mut self.data_guard.as_mut().unwrap()[..]
    }
}

impl Deref for WritePageGuard {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        self.data()
    }
}

impl DerefMut for WritePageGuard {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.data_mut()
    }
}

impl Drop for WritePageGuard {
    fn drop(&mut self) {
        self.data_guard.take();
        self.state.complete_unpin(self.page_id, self.is_dirty);
    }
}

use std::sync::Arc;

use crate::buffer::{BufferPoolManager, ReadPageGuard};
use crate::common::{RecordId, Result, INVALID_PAGE_ID};

use super::leaf_page::LeafPageRef;

/// Forward iterator over the leaf chain.
///
/// Holds the current leaf's read guard (which is both the pin and the
/// read latch) plus an offset into it. Advancing off the end of a leaf
/// latches the next leaf before the current guard is released, so the
/// scan is hand-over-hand.
pub struct BPlusTreeIterator {
    bpm: Arc<BufferPoolManager>,
    guard: Option<ReadPageGuard>,
    index: usize,
    key_size: usize,
}

impl BPlusTreeIterator {
    pub(crate) fn new(
        bpm: Arc<BufferPoolManager>,
        guard: Option<ReadPageGuard>,
        index: usize,
        key_size: usize,
    ) -> Self {
        Self {
            bpm,
            guard,
            index,
            key_size,
        }
    }

    /// True when the iterator sits past the last record of the last leaf.
    pub fn is_end(&self) -> bool {
        match &self.guard {
            None => true,
            Some(guard) => {
                let leaf = LeafPageRef::new(guard.data(), self.key_size);
                self.index >= leaf.size() && leaf.next_page_id() == INVALID_PAGE_ID
            }
        }
    }

    /// Returns the next `(key, record)` pair, or None at the end.
    pub fn next_entry(&mut self) -> Result<Option<(Vec<u8>, RecordId)>> {
        loop {
            let Some(guard) = &self.guard else {
                return Ok(None);
            };

            let leaf = LeafPageRef::new(guard.data(), self.key_size);
            if self.index < leaf.size() {
                let entry = (leaf.key_at(self.index).to_vec(), leaf.value_at(self.index));
                self.index += 1;
                return Ok(Some(entry));
            }

            let next = leaf.next_page_id();
            if next == INVALID_PAGE_ID {
                self.guard = None;
                return Ok(None);
            }

            // Latch the next leaf before dropping the current guard
            let next_guard = self.bpm.fetch_page_read(next)?;
            self.guard = Some(next_guard);
            self.index = 0;
        }
    }
}

impl Iterator for BPlusTreeIterator {
    type Item = Result<(Vec<u8>, RecordId)>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.next_entry() {
            Ok(Some(entry)) => Some(Ok(entry)),
            Ok(None) => None,
            Err(e) => Some(Err(e)),
        }
    }
}

use std::cmp::Ordering;
use std::sync::Arc;

use crate::buffer::BufferPoolManager;
use crate::common::{
    PageId, QuarryError, RecordId, Result, HEADER_PAGE_ID, INVALID_PAGE_ID, PAGE_SIZE,
};
use crate::storage::page::{HeaderPage, HeaderPageRef};

use super::internal_page::{InternalPage, InternalPageRef};
use super::iterator::BPlusTreeIterator;
use super::key_comparator::KeyComparator;
use super::leaf_page::{LeafPage, LeafPageRef, LEAF_HEADER_SIZE, LEAF_VALUE_SIZE};
use super::tree_page::{self, TreePage, TREE_PAGE_HEADER_SIZE};

/// B+Tree index over the buffer pool.
///
/// Keys are fixed-width byte strings compared through the supplied
/// comparator; leaves store `RecordId`s and are chained through
/// `next_page_id` for range scans. The tree names its pages by id and
/// re-pins them per operation, so it holds no durable pointers; the root
/// id is persisted in the header page under the index name.
///
/// Mutating operations take `&mut self`, which serializes them per index
/// instance.
pub struct BPlusTree<C: KeyComparator> {
    index_name: String,
    root_page_id: PageId,
    bpm: Arc<BufferPoolManager>,
    comparator: C,
    key_size: usize,
    leaf_max_size: usize,
    internal_max_size: usize,
    /// Whether the header page already holds a record for this index
    has_header_record: bool,
}

impl<C: KeyComparator> BPlusTree<C> {
    /// Opens (or prepares to create) the index named `name`. If the
    /// header page already records a root for this name, the existing
    /// tree is used.
    pub fn new(
        name: &str,
        bpm: Arc<BufferPoolManager>,
        comparator: C,
        key_size: usize,
        leaf_max_size: usize,
        internal_max_size: usize,
    ) -> Result<Self> {
        assert!(key_size > 0 && key_size <= 64, "unsupported key size");
        assert!(leaf_max_size >= 3, "leaf_max_size must be >= 3");
        assert!(internal_max_size >= 3, "internal_max_size must be >= 3");
        assert!(
            LEAF_HEADER_SIZE + leaf_max_size * (key_size + LEAF_VALUE_SIZE) <= PAGE_SIZE,
            "leaf_max_size does not fit in a page"
        );
        assert!(
            TREE_PAGE_HEADER_SIZE + internal_max_size * (key_size + 4) <= PAGE_SIZE,
            "internal_max_size does not fit in a page"
        );

        let (root_page_id, has_header_record) = {
            let guard = bpm.fetch_page_read(HEADER_PAGE_ID)?;
            let header = HeaderPageRef::new(guard.data());
            (
                header.get_root_id(name).unwrap_or(INVALID_PAGE_ID),
                header.has_record(name),
            )
        };

        Ok(Self {
            index_name: name.to_string(),
            root_page_id,
            bpm,
            comparator,
            key_size,
            leaf_max_size,
            internal_max_size,
            has_header_record,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.root_page_id == INVALID_PAGE_ID
    }

    pub fn root_page_id(&self) -> PageId {
        self.root_page_id
    }

    /// Point lookup.
    pub fn get_value(&self, key: &[u8]) -> Result<Option<RecordId>> {
        self.check_key(key);
        if self.is_empty() {
            return Ok(None);
        }

        let leaf_id = self.find_leaf(key)?;
        let guard = self.bpm.fetch_page_read(leaf_id)?;
        let leaf = LeafPageRef::new(guard.data(), self.key_size);

        let index = leaf.key_index(key, &self.comparator);
        if index < leaf.size()
            && self.comparator.compare(leaf.key_at(index), key) == Ordering::Equal
        {
            Ok(Some(leaf.value_at(index)))
        } else {
            Ok(None)
        }
    }

    /// Inserts a key/record pair. Returns false when the key already
    /// exists (duplicates are rejected).
    pub fn insert(&mut self, key: &[u8], value: RecordId) -> Result<bool> {
        self.check_key(key);
        if self.is_empty() {
            self.start_new_tree(key, value)?;
            return Ok(true);
        }

        let leaf_id = self.find_leaf(key)?;

        let insert_index = {
            let guard = self.bpm.fetch_page_read(leaf_id)?;
            let leaf = LeafPageRef::new(guard.data(), self.key_size);
            let index = leaf.key_index(key, &self.comparator);
            if index < leaf.size()
                && self.comparator.compare(leaf.key_at(index), key) == Ordering::Equal
            {
                return Ok(false);
            }
            index
        };

        let size_after = {
            let mut guard = self.bpm.fetch_page_write(leaf_id)?;
            let mut leaf = LeafPage::new(guard.data_mut(), self.key_size);
            leaf.insert_at(insert_index, key, value);
            leaf.size()
        };

        if size_after == self.leaf_max_size {
            self.split_leaf(leaf_id)?;
        }
        Ok(true)
    }

    /// Removes a key if present. Underflowing pages coalesce with or
    /// borrow from a sibling; an emptied root shrinks the tree.
    pub fn remove(&mut self, key: &[u8]) -> Result<()> {
        self.check_key(key);
        if self.is_empty() {
            return Ok(());
        }
        let leaf_id = self.find_leaf(key)?;
        self.delete_entry(leaf_id, key)
    }

    /// Iterator positioned at the smallest key.
    pub fn begin(&self) -> Result<BPlusTreeIterator> {
        if self.is_empty() {
            return Ok(BPlusTreeIterator::new(
                Arc::clone(&self.bpm),
                None,
                0,
                self.key_size,
            ));
        }

        let mut current = self.root_page_id;
        loop {
            let guard = self.bpm.fetch_page_read(current)?;
            if TreePage::new(guard.data()).is_leaf() {
                return Ok(BPlusTreeIterator::new(
                    Arc::clone(&self.bpm),
                    Some(guard),
                    0,
                    self.key_size,
                ));
            }
            current = InternalPageRef::new(guard.data(), self.key_size).child_at(0);
        }
    }

    /// Iterator positioned at the first key >= `key`.
    pub fn begin_at(&self, key: &[u8]) -> Result<BPlusTreeIterator> {
        self.check_key(key);
        if self.is_empty() {
            return Ok(BPlusTreeIterator::new(
                Arc::clone(&self.bpm),
                None,
                0,
                self.key_size,
            ));
        }

        let leaf_id = self.find_leaf(key)?;
        let guard = self.bpm.fetch_page_read(leaf_id)?;
        let index = LeafPageRef::new(guard.data(), self.key_size).key_index(key, &self.comparator);
        Ok(BPlusTreeIterator::new(
            Arc::clone(&self.bpm),
            Some(guard),
            index,
            self.key_size,
        ))
    }

    fn check_key(&self, key: &[u8]) {
        assert_eq!(key.len(), self.key_size, "key width mismatch");
    }

    fn leaf_min_size(&self) -> usize {
        self.leaf_max_size / 2
    }

    fn internal_min_size(&self) -> usize {
        (self.internal_max_size + 1) / 2
    }

    /// Descends from the root to the leaf whose range covers `key`.
    fn find_leaf(&self, key: &[u8]) -> Result<PageId> {
        debug_assert!(!self.is_empty());

        let mut current = self.root_page_id;
        loop {
            let guard = self.bpm.fetch_page_read(current)?;
            if TreePage::new(guard.data()).is_leaf() {
                return Ok(current);
            }
            current = InternalPageRef::new(guard.data(), self.key_size)
                .lookup(key, &self.comparator);
        }
    }

    fn start_new_tree(&mut self, key: &[u8], value: RecordId) -> Result<()> {
        let root_id = {
            let mut guard = self.bpm.new_page()?;
            let root_id = guard.page_id();
            let mut leaf = LeafPage::new(guard.data_mut(), self.key_size);
            leaf.init(root_id, INVALID_PAGE_ID, self.leaf_max_size);
            leaf.insert_at(0, key, value);
            root_id
        };

        self.root_page_id = root_id;
        self.update_root_page_id()
    }

    /// Persists the current root id in the header page, inserting the
    /// record the first time this index is seen.
    fn update_root_page_id(&mut self) -> Result<()> {
        let mut guard = self.bpm.fetch_page_write(HEADER_PAGE_ID)?;
        let mut header = HeaderPage::new(guard.data_mut());

        if self.has_header_record {
            header.update_record(&self.index_name, self.root_page_id);
        } else {
            if !header.insert_record(&self.index_name, self.root_page_id) {
                return Err(QuarryError::HeaderPageFull);
            }
            self.has_header_record = true;
        }
        Ok(())
    }

    fn set_parent(&self, page_id: PageId, parent_id: PageId) -> Result<()> {
        let mut guard = self.bpm.fetch_page_write(page_id)?;
        tree_page::set_parent_page_id(guard.data_mut(), parent_id);
        Ok(())
    }

    /// Splits a full leaf: the upper half moves to a fresh sibling that
    /// is threaded into the leaf chain, and the sibling's first key is
    /// pushed up.
    fn split_leaf(&mut self, leaf_id: PageId) -> Result<()> {
        let (moved, old_next, parent_id) = {
            let mut guard = self.bpm.fetch_page_write(leaf_id)?;
            let mut leaf = LeafPage::new(guard.data_mut(), self.key_size);
            let moved = leaf.split_off();
            (moved, leaf.next_page_id(), leaf.parent_page_id())
        };
        let separator = moved[0].0.clone();

        let sibling_id = {
            let mut guard = self.bpm.new_page()?;
            let sibling_id = guard.page_id();
            let mut sibling = LeafPage::new(guard.data_mut(), self.key_size);
            sibling.init(sibling_id, parent_id, self.leaf_max_size);
            for (key, value) in &moved {
                sibling.append(key, *value);
            }
            sibling.set_next_page_id(old_next);
            sibling_id
        };

        {
            let mut guard = self.bpm.fetch_page_write(leaf_id)?;
            let mut leaf = LeafPage::new(guard.data_mut(), self.key_size);
            leaf.set_next_page_id(sibling_id);
        }

        self.insert_into_parent(leaf_id, &separator, sibling_id)
    }

    /// Links a freshly split-off `right_id` under the parent of
    /// `left_id`, splitting upward as needed.
    fn insert_into_parent(&mut self, left_id: PageId, key: &[u8], right_id: PageId) -> Result<()> {
        if left_id == self.root_page_id {
            let new_root_id = {
                let mut guard = self.bpm.new_page()?;
                let new_root_id = guard.page_id();
                let mut root = InternalPage::new(guard.data_mut(), self.key_size);
                root.init(new_root_id, INVALID_PAGE_ID, self.internal_max_size);
                root.populate_new_root(left_id, key, right_id);
                new_root_id
            };

            self.set_parent(left_id, new_root_id)?;
            self.set_parent(right_id, new_root_id)?;
            self.root_page_id = new_root_id;
            return self.update_root_page_id();
        }

        let parent_id = {
            let guard = self.bpm.fetch_page_read(left_id)?;
            TreePage::new(guard.data()).parent_page_id()
        };

        let parent_size = {
            let guard = self.bpm.fetch_page_read(parent_id)?;
            InternalPageRef::new(guard.data(), self.key_size).size()
        };

        if parent_size < self.internal_max_size {
            {
                let mut guard = self.bpm.fetch_page_write(parent_id)?;
                let mut parent = InternalPage::new(guard.data_mut(), self.key_size);
                parent.insert_pair(key, right_id, &self.comparator);
            }
            return self.set_parent(right_id, parent_id);
        }

        // Parent is full: build the would-be pair array in scratch space,
        // keep the lower ceil((max+1)/2) children and move the rest to a
        // new sibling whose slot-0 key becomes the pushed-up separator.
        let (mut scratch, grandparent_id) = {
            let guard = self.bpm.fetch_page_read(parent_id)?;
            let parent = InternalPageRef::new(guard.data(), self.key_size);
            let pairs: Vec<(Vec<u8>, PageId)> = (0..parent.size())
                .map(|i| (parent.key_at(i).to_vec(), parent.child_at(i)))
                .collect();
            (pairs, parent.parent_page_id())
        };

        let insert_pos = 1 + scratch[1..]
            .partition_point(|(k, _)| self.comparator.compare(k, key) == Ordering::Less);
        scratch.insert(insert_pos, (key.to_vec(), right_id));

        let keep = (self.internal_max_size + 2) / 2;
        let right_half = scratch.split_off(keep);
        let separator = right_half[0].0.clone();

        {
            let mut guard = self.bpm.fetch_page_write(parent_id)?;
            let mut parent = InternalPage::new(guard.data_mut(), self.key_size);
            parent.set_pairs(&scratch);
        }

        let new_internal_id = {
            let mut guard = self.bpm.new_page()?;
            let new_internal_id = guard.page_id();
            let mut node = InternalPage::new(guard.data_mut(), self.key_size);
            node.init(new_internal_id, grandparent_id, self.internal_max_size);
            node.set_pairs(&right_half);
            new_internal_id
        };

        for (_, child) in &right_half {
            self.set_parent(*child, new_internal_id)?;
        }

        self.insert_into_parent(parent_id, &separator, new_internal_id)
    }

    /// Deletes `key` from `page_id` and repairs any underflow, walking up
    /// the tree as merges remove separators.
    fn delete_entry(&mut self, page_id: PageId, key: &[u8]) -> Result<()> {
        let is_leaf = {
            let guard = self.bpm.fetch_page_read(page_id)?;
            let page = TreePage::new(guard.data());
            if page.is_leaf() {
                // Internal deletions always target a separator that was
                // just read from the page; only leaf probes can miss.
                let leaf = LeafPageRef::new(guard.data(), self.key_size);
                let index = leaf.key_index(key, &self.comparator);
                if index >= leaf.size()
                    || self.comparator.compare(leaf.key_at(index), key) != Ordering::Equal
                {
                    return Ok(());
                }
            }
            page.is_leaf()
        };

        let size = {
            let mut guard = self.bpm.fetch_page_write(page_id)?;
            let deleted = if is_leaf {
                let mut leaf = LeafPage::new(guard.data_mut(), self.key_size);
                leaf.delete(key, &self.comparator)
            } else {
                let mut node = InternalPage::new(guard.data_mut(), self.key_size);
                node.delete(key, &self.comparator)
            };
            debug_assert!(deleted);
            TreePage::new(guard.data()).size()
        };

        if page_id == self.root_page_id {
            return self.adjust_root(page_id);
        }

        let min_size = if is_leaf {
            self.leaf_min_size()
        } else {
            self.internal_min_size()
        };
        if size >= min_size {
            return Ok(());
        }

        let parent_id = {
            let guard = self.bpm.fetch_page_read(page_id)?;
            TreePage::new(guard.data()).parent_page_id()
        };

        let (sibling_id, separator, sibling_is_left) = {
            let guard = self.bpm.fetch_page_read(parent_id)?;
            let parent = InternalPageRef::new(guard.data(), self.key_size);
            let index = parent
                .child_index(page_id)
                .expect("page missing from its parent");
            if index >= 1 {
                (
                    parent.child_at(index - 1),
                    parent.key_at(index).to_vec(),
                    true,
                )
            } else {
                (parent.child_at(1), parent.key_at(1).to_vec(), false)
            }
        };

        let sibling_size = {
            let guard = self.bpm.fetch_page_read(sibling_id)?;
            TreePage::new(guard.data()).size()
        };

        let max_fill = if is_leaf {
            self.leaf_max_size - 1
        } else {
            self.internal_max_size
        };

        if sibling_size + size <= max_fill {
            // Merge into whichever page is the left one
            let (left_id, right_id) = if sibling_is_left {
                (sibling_id, page_id)
            } else {
                (page_id, sibling_id)
            };
            if is_leaf {
                self.coalesce_leaf(left_id, right_id)?;
            } else {
                self.coalesce_internal(left_id, right_id, &separator)?;
            }
            self.bpm.delete_page(right_id)?;
            self.delete_entry(parent_id, &separator)
        } else if is_leaf {
            self.redistribute_leaf(page_id, sibling_id, parent_id, &separator, sibling_is_left)
        } else {
            self.redistribute_internal(page_id, sibling_id, parent_id, &separator, sibling_is_left)
        }
    }

    /// Shrinks or clears the root after a deletion touched it.
    fn adjust_root(&mut self, root_id: PageId) -> Result<()> {
        let (is_leaf, size, first_child) = {
            let guard = self.bpm.fetch_page_read(root_id)?;
            let page = TreePage::new(guard.data());
            if page.is_leaf() {
                (true, page.size(), INVALID_PAGE_ID)
            } else {
                let node = InternalPageRef::new(guard.data(), self.key_size);
                (false, node.size(), node.child_at(0))
            }
        };

        if is_leaf && size == 0 {
            // Last key removed: the tree is empty again
            self.root_page_id = INVALID_PAGE_ID;
            self.update_root_page_id()?;
            self.bpm.delete_page(root_id)?;
        } else if !is_leaf && size == 1 {
            // Root with a single child: promote the child
            self.set_parent(first_child, INVALID_PAGE_ID)?;
            self.root_page_id = first_child;
            self.update_root_page_id()?;
            self.bpm.delete_page(root_id)?;
        }
        Ok(())
    }

    /// Appends the right leaf's records to the left one and unlinks it
    /// from the chain.
    fn coalesce_leaf(&mut self, left_id: PageId, right_id: PageId) -> Result<()> {
        let (pairs, right_next) = {
            let guard = self.bpm.fetch_page_read(right_id)?;
            let right = LeafPageRef::new(guard.data(), self.key_size);
            let pairs: Vec<(Vec<u8>, RecordId)> = (0..right.size())
                .map(|i| (right.key_at(i).to_vec(), right.value_at(i)))
                .collect();
            (pairs, right.next_page_id())
        };

        let mut guard = self.bpm.fetch_page_write(left_id)?;
        let mut left = LeafPage::new(guard.data_mut(), self.key_size);
        for (key, value) in &pairs {
            left.append(key, *value);
        }
        left.set_next_page_id(right_next);
        Ok(())
    }

    /// Pulls the separator down between the two internal pages, appends
    /// the right page's pairs to the left one, and reparents the moved
    /// children.
    fn coalesce_internal(&mut self, left_id: PageId, right_id: PageId, separator: &[u8]) -> Result<()> {
        let right_pairs = {
            let guard = self.bpm.fetch_page_read(right_id)?;
            let right = InternalPageRef::new(guard.data(), self.key_size);
            let pairs: Vec<(Vec<u8>, PageId)> = (0..right.size())
                .map(|i| (right.key_at(i).to_vec(), right.child_at(i)))
                .collect();
            pairs
        };

        {
            let mut guard = self.bpm.fetch_page_write(left_id)?;
            let mut left = InternalPage::new(guard.data_mut(), self.key_size);
            left.append_pair(separator, right_pairs[0].1);
            for (key, child) in &right_pairs[1..] {
                left.append_pair(key, *child);
            }
        }

        for (_, child) in &right_pairs {
            self.set_parent(*child, left_id)?;
        }
        Ok(())
    }

    /// Moves one record across the boundary between a leaf and its
    /// sibling and refreshes the parent separator.
    fn redistribute_leaf(
        &mut self,
        page_id: PageId,
        sibling_id: PageId,
        parent_id: PageId,
        separator: &[u8],
        sibling_is_left: bool,
    ) -> Result<()> {
        let new_separator;

        if sibling_is_left {
            let (key, value) = {
                let mut guard = self.bpm.fetch_page_write(sibling_id)?;
                let mut sibling = LeafPage::new(guard.data_mut(), self.key_size);
                sibling.pop_back()
            };
            {
                let mut guard = self.bpm.fetch_page_write(page_id)?;
                let mut leaf = LeafPage::new(guard.data_mut(), self.key_size);
                leaf.insert_at(0, &key, value);
            }
            new_separator = key;
        } else {
            let (key, value) = {
                let mut guard = self.bpm.fetch_page_write(sibling_id)?;
                let mut sibling = LeafPage::new(guard.data_mut(), self.key_size);
                sibling.pop_front()
            };
            {
                let mut guard = self.bpm.fetch_page_write(page_id)?;
                let mut leaf = LeafPage::new(guard.data_mut(), self.key_size);
                leaf.append(&key, value);
            }
            new_separator = {
                let guard = self.bpm.fetch_page_read(sibling_id)?;
                LeafPageRef::new(guard.data(), self.key_size).key_at(0).to_vec()
            };
        }

        self.replace_separator(parent_id, separator, &new_separator)
    }

    /// Rotates one child through the parent separator between two
    /// internal pages.
    fn redistribute_internal(
        &mut self,
        page_id: PageId,
        sibling_id: PageId,
        parent_id: PageId,
        separator: &[u8],
        sibling_is_left: bool,
    ) -> Result<()> {
        let (new_separator, moved_child) = if sibling_is_left {
            let (last_key, last_child) = {
                let mut guard = self.bpm.fetch_page_write(sibling_id)?;
                let mut sibling = InternalPage::new(guard.data_mut(), self.key_size);
                sibling.pop_back()
            };
            {
                let mut guard = self.bpm.fetch_page_write(page_id)?;
                let mut node = InternalPage::new(guard.data_mut(), self.key_size);
                node.push_front(separator, last_child);
            }
            (last_key, last_child)
        } else {
            let (first_child, first_key) = {
                let mut guard = self.bpm.fetch_page_write(sibling_id)?;
                let mut sibling = InternalPage::new(guard.data_mut(), self.key_size);
                let first_child = sibling.child_at(0);
                let first_key = sibling.key_at(1).to_vec();
                sibling.delete_first();
                (first_child, first_key)
            };
            {
                let mut guard = self.bpm.fetch_page_write(page_id)?;
                let mut node = InternalPage::new(guard.data_mut(), self.key_size);
                node.append_pair(separator, first_child);
            }
            (first_key, first_child)
        };

        self.set_parent(moved_child, page_id)?;
        self.replace_separator(parent_id, separator, &new_separator)
    }

    fn replace_separator(&self, parent_id: PageId, old: &[u8], new: &[u8]) -> Result<()> {
        let mut guard = self.bpm.fetch_page_write(parent_id)?;
        let mut parent = InternalPage::new(guard.data_mut(), self.key_size);
        let index = parent.key_index(old, &self.comparator);
        debug_assert!(
            index < parent.size()
                && self.comparator.compare(parent.key_at(index), old) == Ordering::Equal
        );
        parent.set_key_at(index, new);
        Ok(())
    }
}

//! Quarry - the storage-engine core of a disk-oriented RDBMS
//!
//! This crate implements the four subsystems that coordinate concurrent
//! access to a bounded pool of memory frames over a paged disk file:
//!
//! - **Storage layer** (`storage`): page-granular disk I/O
//!   - `DiskManager`: reads and writes pages in a single database file
//!   - `DiskScheduler`: background worker thread for disk requests
//!   - `HeaderPage`: persisted index-name to root-page records
//!
//! - **Containers** (`container`): general-purpose structures
//!   - `ExtendibleHashTable`: split-on-overflow hash directory with
//!     local/global depths, reused as the buffer pool's page table
//!
//! - **Buffer pool** (`buffer`): memory management for database pages
//!   - `BufferPoolManager`: caches pages in a fixed set of frames
//!   - `LruKReplacer`: LRU-K page replacement policy
//!   - `ReadPageGuard`/`WritePageGuard`: RAII pin + latch on a page
//!
//! - **Index** (`index`): ordered access paths
//!   - `BPlusTree`: comparator-parametric B+Tree with split, coalesce
//!     and redistribute maintenance plus a forward leaf iterator
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use quarry::buffer::BufferPoolManager;
//! use quarry::common::{PageId, RecordId, SlotId};
//! use quarry::index::{BPlusTree, IntegerComparator};
//! use quarry::storage::disk::DiskManager;
//!
//! let disk_manager = Arc::new(DiskManager::new("test.db").unwrap());
//! let bpm = Arc::new(BufferPoolManager::new(64, 2, disk_manager));
//!
//! let mut index =
//!     BPlusTree::new("demo", Arc::clone(&bpm), IntegerComparator, 4, 64, 64).unwrap();
//!
//! let key = 42u32.to_le_bytes();
//! let rid = RecordId::new(PageId::new(9), SlotId::new(0));
//! index.insert(&key, rid).unwrap();
//! assert_eq!(index.get_value(&key).unwrap(), Some(rid));
//!
//! bpm.flush_all_pages().unwrap();
//! ```

pub mod buffer;
pub mod common;
pub mod container;
pub mod index;
pub mod storage;

// Re-export commonly used types at the crate root
pub use common::{FrameId, PageId, QuarryError, RecordId, Result, SlotId};

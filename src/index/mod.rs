pub mod btree;
pub mod internal_page;
pub mod iterator;
pub mod key_comparator;
pub mod leaf_page;
pub mod tree_page;

pub use btree::BPlusTree;
pub use internal_page::{InternalPage, InternalPageRef};
pub use iterator::BPlusTreeIterator;
pub use key_comparator::{BytewiseComparator, IntegerComparator, KeyComparator};
pub use leaf_page::{LeafPage, LeafPageRef};
pub use tree_page::{TreePage, TreePageType};

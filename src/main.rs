use std::sync::Arc;

use quarry::buffer::BufferPoolManager;
use quarry::common::{PageId, RecordId, SlotId};
use quarry::index::{BPlusTree, IntegerComparator};
use quarry::storage::disk::DiskManager;

fn main() {
    println!("Quarry - a disk-oriented storage engine core");
    println!("============================================\n");

    let db_path = "demo.db";

    let disk_manager = Arc::new(DiskManager::new(db_path).expect("failed to open database file"));
    println!("Opened database file: {}", db_path);

    let bpm = Arc::new(BufferPoolManager::new(16, 2, disk_manager));
    println!("Created buffer pool with 16 frames (LRU-2 replacement)\n");

    let mut index = BPlusTree::new("demo_index", Arc::clone(&bpm), IntegerComparator, 4, 8, 8)
        .expect("failed to open index");

    for k in [17u32, 3, 25, 8, 42, 1, 30] {
        let key = k.to_le_bytes();
        let rid = RecordId::new(PageId::new(100 + k), SlotId::new(0));
        index.insert(&key, rid).expect("insert failed");
        println!("Inserted key {}", k);
    }

    let probe = 25u32.to_le_bytes();
    match index.get_value(&probe).expect("lookup failed") {
        Some(rid) => println!("\nLookup 25 -> {}", rid),
        None => println!("\nLookup 25 -> not found"),
    }

    println!("\nFull scan:");
    let iter = index.begin().expect("failed to open iterator");
    for entry in iter {
        let (key, rid) = entry.expect("scan failed");
        let k = u32::from_le_bytes(key[..4].try_into().unwrap());
        println!("  {} -> {}", k, rid);
    }

    bpm.flush_all_pages().expect("flush failed");
    println!("\nFlushed all pages to disk");
}

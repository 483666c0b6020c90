//! Integration tests for the LRU-K replacer

use quarry::buffer::LruKReplacer;
use quarry::common::FrameId;

#[test]
fn test_lru_k_eviction_order() {
    let replacer = LruKReplacer::new(10, 2);

    for i in 0..5 {
        replacer.record_access(FrameId::new(i));
        replacer.set_evictable(FrameId::new(i), true);
    }

    assert_eq!(replacer.size(), 5);

    // All frames have a single access (< k=2), so all have +inf distance:
    // eviction follows the earliest first access
    for i in 0..5 {
        assert_eq!(replacer.evict(), Some(FrameId::new(i)));
    }

    assert_eq!(replacer.size(), 0);
    assert_eq!(replacer.evict(), None);
}

#[test]
fn test_lru_k_respects_k_distance() {
    let replacer = LruKReplacer::new(10, 2);

    // Frame 0: one access (+inf distance)
    replacer.record_access(FrameId::new(0));

    // Frames 1 and 2: two accesses each, frame 1 earlier
    replacer.record_access(FrameId::new(1));
    replacer.record_access(FrameId::new(1));
    replacer.record_access(FrameId::new(2));
    replacer.record_access(FrameId::new(2));

    for i in 0..3 {
        replacer.set_evictable(FrameId::new(i), true);
    }

    assert_eq!(replacer.evict(), Some(FrameId::new(0)));
    assert_eq!(replacer.evict(), Some(FrameId::new(1)));
    assert_eq!(replacer.evict(), Some(FrameId::new(2)));
}

#[test]
fn test_lru_k_pinned_frames_not_evicted() {
    let replacer = LruKReplacer::new(10, 2);

    replacer.record_access(FrameId::new(0));
    replacer.record_access(FrameId::new(1));
    replacer.record_access(FrameId::new(2));

    replacer.set_evictable(FrameId::new(1), true);
    replacer.set_evictable(FrameId::new(2), true);

    assert_eq!(replacer.size(), 2);

    assert_eq!(replacer.evict(), Some(FrameId::new(1)));
    assert_eq!(replacer.evict(), Some(FrameId::new(2)));
    assert_eq!(replacer.evict(), None);
}

#[test]
fn test_lru_k_toggle_evictable() {
    let replacer = LruKReplacer::new(10, 2);

    replacer.record_access(FrameId::new(0));
    replacer.set_evictable(FrameId::new(0), true);
    assert_eq!(replacer.size(), 1);

    replacer.set_evictable(FrameId::new(0), false);
    assert_eq!(replacer.size(), 0);
    assert_eq!(replacer.evict(), None);

    replacer.set_evictable(FrameId::new(0), true);
    assert_eq!(replacer.size(), 1);
    assert_eq!(replacer.evict(), Some(FrameId::new(0)));
}

#[test]
fn test_lru_k_remove() {
    let replacer = LruKReplacer::new(10, 2);

    replacer.record_access(FrameId::new(0));
    replacer.record_access(FrameId::new(1));
    replacer.set_evictable(FrameId::new(0), true);
    replacer.set_evictable(FrameId::new(1), true);

    replacer.remove(FrameId::new(0));
    assert_eq!(replacer.size(), 1);

    assert_eq!(replacer.evict(), Some(FrameId::new(1)));
    assert_eq!(replacer.evict(), None);
}

#[test]
#[should_panic(expected = "non-evictable")]
fn test_lru_k_remove_non_evictable_panics() {
    let replacer = LruKReplacer::new(10, 2);

    replacer.record_access(FrameId::new(0));
    replacer.remove(FrameId::new(0));
}

#[test]
fn test_lru_k_record_access_bounded_by_capacity() {
    let replacer = LruKReplacer::new(3, 2);

    for i in 0..3 {
        replacer.record_access(FrameId::new(i));
    }
    // At capacity: accesses to unknown frames are dropped
    replacer.record_access(FrameId::new(99));
    replacer.set_evictable(FrameId::new(99), true);

    assert_eq!(replacer.size(), 0);

    // Known frames still record fine
    replacer.record_access(FrameId::new(0));
    replacer.set_evictable(FrameId::new(0), true);
    assert_eq!(replacer.evict(), Some(FrameId::new(0)));
}

#[test]
fn test_lru_k_history_limit() {
    let replacer = LruKReplacer::new(10, 2);

    // Many accesses to frame 0, then two to frame 1
    for _ in 0..10 {
        replacer.record_access(FrameId::new(0));
    }
    replacer.record_access(FrameId::new(1));
    replacer.record_access(FrameId::new(1));

    replacer.set_evictable(FrameId::new(0), true);
    replacer.set_evictable(FrameId::new(1), true);

    // Both histories are full; frame 0's k-th most recent access is older
    assert_eq!(replacer.evict(), Some(FrameId::new(0)));
    assert_eq!(replacer.evict(), Some(FrameId::new(1)));
}

#[test]
fn test_lru_k_concurrent_access() {
    use std::sync::Arc;
    use std::thread;

    let replacer = Arc::new(LruKReplacer::new(100, 2));

    let handles: Vec<_> = (0..4)
        .map(|t| {
            let replacer = Arc::clone(&replacer);
            thread::spawn(move || {
                for i in 0..25 {
                    let frame_id = FrameId::new((t * 25 + i) as u32);
                    replacer.record_access(frame_id);
                    replacer.set_evictable(frame_id, true);
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(replacer.size(), 100);

    for _ in 0..100 {
        assert!(replacer.evict().is_some());
    }
    assert_eq!(replacer.size(), 0);
}

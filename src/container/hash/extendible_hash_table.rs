use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use parking_lot::Mutex;

/// Upper bound on bucket local depth. Splitting past this means the
/// inputs hash identically in 30 low bits, which only adversarial keys
/// can produce.
const MAX_DEPTH: usize = 30;

/// A bucket holding up to `bucket_size` key/value pairs.
#[derive(Debug)]
struct Bucket<K, V> {
    items: Vec<(K, V)>,
    local_depth: usize,
}

impl<K: Eq, V> Bucket<K, V> {
    fn new(local_depth: usize, bucket_size: usize) -> Self {
        Self {
            items: Vec::with_capacity(bucket_size),
            local_depth,
        }
    }

    fn find(&self, key: &K) -> Option<&V> {
        self.items.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    fn remove(&mut self, key: &K) -> bool {
        match self.items.iter().position(|(k, _)| k == key) {
            Some(pos) => {
                self.items.remove(pos);
                true
            }
            None => false,
        }
    }
}

/// Directory state, guarded by the table's single latch.
///
/// `dir` maps a directory slot to an index into the bucket slab; many
/// slots may name the same bucket (the slot count is `2^global_depth`
/// while buckets split lazily).
#[derive(Debug)]
struct Directory<K, V> {
    global_depth: usize,
    bucket_size: usize,
    dir: Vec<usize>,
    buckets: Vec<Bucket<K, V>>,
    num_pairs: usize,
}

/// In-memory extendible hash table.
///
/// Addressing uses the low `global_depth` bits of the key's hash. On
/// overflow a bucket either splits in place (when its local depth is
/// below the global depth) or forces the directory to double. The buffer
/// pool uses this table as its page table; it also works as a standalone
/// container.
///
/// A single mutex serializes all operations.
pub struct ExtendibleHashTable<K, V> {
    inner: Mutex<Directory<K, V>>,
}

impl<K: Hash + Eq, V: Clone> ExtendibleHashTable<K, V> {
    /// Creates a table with one bucket of the given capacity and a
    /// directory of global depth 0.
    pub fn new(bucket_size: usize) -> Self {
        assert!(bucket_size > 0, "bucket_size must be > 0");
        Self {
            inner: Mutex::new(Directory {
                global_depth: 0,
                bucket_size,
                dir: vec![0],
                buckets: vec![Bucket::new(0, bucket_size)],
                num_pairs: 0,
            }),
        }
    }

    /// Looks up the value stored for a key.
    pub fn find(&self, key: &K) -> Option<V> {
        let inner = self.inner.lock();
        let slot = Self::index_of(key, inner.global_depth);
        inner.buckets[inner.dir[slot]].find(key).cloned()
    }

    /// Inserts a key/value pair, overwriting the value of an existing key.
    /// Splits buckets (and doubles the directory) as needed.
    pub fn insert(&self, key: K, value: V) {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;

        loop {
            let slot = Self::index_of(&key, inner.global_depth);
            let bucket_idx = inner.dir[slot];

            let bucket = &mut inner.buckets[bucket_idx];
            if let Some(entry) = bucket.items.iter_mut().find(|(k, _)| *k == key) {
                entry.1 = value;
                return;
            }
            if bucket.items.len() < inner.bucket_size {
                bucket.items.push((key, value));
                inner.num_pairs += 1;
                return;
            }

            let local_depth = bucket.local_depth;
            if local_depth == inner.global_depth {
                Self::double_directory(inner);
            }
            let slot = Self::index_of(&key, inner.global_depth);
            Self::split_bucket(inner, slot);
        }
    }

    /// Removes a key. Returns true if it was present.
    pub fn remove(&self, key: &K) -> bool {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        let slot = Self::index_of(key, inner.global_depth);
        let bucket_idx = inner.dir[slot];
        let removed = inner.buckets[bucket_idx].remove(key);
        if removed {
            inner.num_pairs -= 1;
        }
        removed
    }

    /// Returns the directory's global depth.
    pub fn get_global_depth(&self) -> usize {
        self.inner.lock().global_depth
    }

    /// Returns the local depth of the bucket named by a directory slot.
    pub fn get_local_depth(&self, dir_index: usize) -> usize {
        let inner = self.inner.lock();
        inner.buckets[inner.dir[dir_index]].local_depth
    }

    /// Returns the number of allocated buckets.
    pub fn get_num_buckets(&self) -> usize {
        self.inner.lock().buckets.len()
    }

    /// Returns the number of stored key/value pairs.
    pub fn len(&self) -> usize {
        self.inner.lock().num_pairs
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn hash_of(key: &K) -> u64 {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        hasher.finish()
    }

    fn index_of(key: &K, global_depth: usize) -> usize {
        (Self::hash_of(key) & ((1u64 << global_depth) - 1)) as usize
    }

    /// Doubles the directory: slot `i + 2^(g-1)` aliases slot `i`.
    fn double_directory(inner: &mut Directory<K, V>) {
        assert!(
            inner.global_depth < MAX_DEPTH,
            "extendible hash directory exceeded maximum depth"
        );
        inner.global_depth += 1;
        let half = inner.dir.len();
        inner.dir.extend_from_within(0..half);
    }

    /// Splits the bucket addressed by `slot`: bumps its local depth,
    /// allocates a sibling, re-hashes the pairs by their now-significant
    /// bit, and repoints every directory slot matching the sibling's
    /// pattern.
    fn split_bucket(inner: &mut Directory<K, V>, slot: usize) {
        let bucket_idx = inner.dir[slot];
        let new_depth = inner.buckets[bucket_idx].local_depth + 1;
        assert!(new_depth <= inner.global_depth);

        let old_pattern = slot & ((1 << (new_depth - 1)) - 1);
        let sibling_pattern = old_pattern | (1 << (new_depth - 1));
        let new_mask = (1u64 << new_depth) - 1;

        inner.buckets[bucket_idx].local_depth = new_depth;
        let sibling_idx = inner.buckets.len();
        let mut sibling = Bucket::new(new_depth, inner.bucket_size);

        let items = std::mem::take(&mut inner.buckets[bucket_idx].items);
        for (key, value) in items {
            if (Self::hash_of(&key) & new_mask) as usize == sibling_pattern {
                sibling.items.push((key, value));
            } else {
                inner.buckets[bucket_idx].items.push((key, value));
            }
        }
        inner.buckets.push(sibling);

        for i in 0..inner.dir.len() {
            if i & new_mask as usize == sibling_pattern {
                inner.dir[i] = sibling_idx;
            }
        }
    }
}

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::Mutex;

use crate::common::{PageId, Result, PAGE_SIZE};

/// DiskManager is responsible for reading and writing pages to/from disk.
///
/// All pages live in a single database file at `page_id * PAGE_SIZE`.
/// Page 0 is reserved for the header page and is created together with
/// the file. Page IDs are handed out by a monotonically increasing
/// counter and are never reused.
pub struct DiskManager {
    /// File handle, guarded because reads and writes share the cursor
    db_file: Mutex<File>,
    /// Path of the database file
    db_path: PathBuf,
    /// Next page ID to hand out
    next_page_id: AtomicU32,
    /// Number of disk reads performed
    num_reads: AtomicU32,
    /// Number of disk writes performed
    num_writes: AtomicU32,
}

impl DiskManager {
    /// Opens (or creates) the database file at the given path.
    /// A fresh file is initialized with a zeroed header page.
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let db_path = db_path.as_ref().to_path_buf();
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&db_path)?;

        let file_size = file.metadata()?.len();
        let pages_on_disk = (file_size / PAGE_SIZE as u64) as u32;

        if pages_on_disk == 0 {
            // Bootstrap the reserved header page
            file.seek(SeekFrom::Start(0))?;
            file.write_all(&[0u8; PAGE_SIZE])?;
            file.flush()?;
        }

        Ok(Self {
            db_file: Mutex::new(file),
            db_path,
            next_page_id: AtomicU32::new(pages_on_disk.max(1)),
            num_reads: AtomicU32::new(0),
            num_writes: AtomicU32::new(0),
        })
    }

    /// Reads a page from disk into the provided buffer.
    /// Reads past the end of the file yield zeroed bytes, so a page that
    /// was allocated but never written reads back as all zeros.
    pub fn read_page(&self, page_id: PageId, data: &mut [u8]) -> Result<()> {
        assert_eq!(data.len(), PAGE_SIZE, "buffer must be PAGE_SIZE bytes");

        let byte_offset = (page_id.as_u32() as u64) * (PAGE_SIZE as u64);

        let mut file = self.db_file.lock();
        file.seek(SeekFrom::Start(byte_offset))?;

        let mut total = 0;
        while total < PAGE_SIZE {
            let n = file.read(&mut data[total..])?;
            if n == 0 {
                break;
            }
            total += n;
        }
        data[total..].fill(0);

        self.num_reads.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Writes a page to disk from the provided buffer.
    pub fn write_page(&self, page_id: PageId, data: &[u8]) -> Result<()> {
        assert_eq!(data.len(), PAGE_SIZE, "buffer must be PAGE_SIZE bytes");

        let byte_offset = (page_id.as_u32() as u64) * (PAGE_SIZE as u64);

        let mut file = self.db_file.lock();
        file.seek(SeekFrom::Start(byte_offset))?;
        file.write_all(data)?;
        file.flush()?;

        self.num_writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Allocates a new page ID. The page's bytes materialize lazily: until
    /// the first write the page reads back as zeros.
    pub fn allocate_page(&self) -> Result<PageId> {
        Ok(PageId::new(self.next_page_id.fetch_add(1, Ordering::SeqCst)))
    }

    /// Releases a page ID. IDs are never recycled, so this only exists to
    /// keep the allocator interface symmetrical.
    pub fn deallocate_page(&self, _page_id: PageId) -> Result<()> {
        Ok(())
    }

    pub fn num_allocated_pages(&self) -> u32 {
        self.next_page_id.load(Ordering::Relaxed)
    }

    pub fn num_reads(&self) -> u32 {
        self.num_reads.load(Ordering::Relaxed)
    }

    pub fn num_writes(&self) -> u32 {
        self.num_writes.load(Ordering::Relaxed)
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    pub fn sync(&self) -> Result<()> {
        self.db_file.lock().sync_all()?;
        Ok(())
    }
}

impl Drop for DiskManager {
    fn drop(&mut self) {
        let _ = self.db_file.get_mut().sync_all();
    }
}

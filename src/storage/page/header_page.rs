use crate::common::{PageId, INVALID_PAGE_ID, PAGE_SIZE};

const RECORD_COUNT_OFFSET: usize = 0;
const RECORDS_OFFSET: usize = 4;

const NAME_SIZE: usize = 32;
const RECORD_SIZE: usize = NAME_SIZE + 4;

/// Maximum number of index records a header page can hold
pub const MAX_HEADER_RECORDS: usize = (PAGE_SIZE - RECORDS_OFFSET) / RECORD_SIZE;

/// View over the reserved header page (page 0).
///
/// The header page stores `index_name -> root_page_id` records so that an
/// index can find its root again after the database is reopened. Names are
/// fixed-width, zero-padded byte strings of up to 32 bytes.
pub struct HeaderPage<'a> {
    data: &'a mut [u8],
}

impl<'a> HeaderPage<'a> {
    pub fn new(data: &'a mut [u8]) -> Self {
        assert_eq!(data.len(), PAGE_SIZE);
        Self { data }
    }

    pub fn record_count(&self) -> usize {
        read_u32(self.data, RECORD_COUNT_OFFSET) as usize
    }

    fn set_record_count(&mut self, count: usize) {
        write_u32(self.data, RECORD_COUNT_OFFSET, count as u32);
    }

    /// Inserts a new record. Returns false if the name already exists or
    /// the page is full.
    pub fn insert_record(&mut self, name: &str, root_page_id: PageId) -> bool {
        assert!(name.len() <= NAME_SIZE, "index name too long");

        if self.find_record(name).is_some() {
            return false;
        }
        let count = self.record_count();
        if count >= MAX_HEADER_RECORDS {
            return false;
        }

        let offset = RECORDS_OFFSET + count * RECORD_SIZE;
        self.data[offset..offset + NAME_SIZE].fill(0);
        self.data[offset..offset + name.len()].copy_from_slice(name.as_bytes());
        write_u32(self.data, offset + NAME_SIZE, root_page_id.as_u32());
        self.set_record_count(count + 1);
        true
    }

    /// Updates an existing record. Returns false if the name is unknown.
    pub fn update_record(&mut self, name: &str, root_page_id: PageId) -> bool {
        match self.find_record(name) {
            Some(index) => {
                let offset = RECORDS_OFFSET + index * RECORD_SIZE;
                write_u32(self.data, offset + NAME_SIZE, root_page_id.as_u32());
                true
            }
            None => false,
        }
    }

    /// Looks up the root page ID recorded for an index name.
    /// Returns None when the name is unknown or the recorded root is
    /// invalid (the index exists but is currently empty).
    pub fn get_root_id(&self, name: &str) -> Option<PageId> {
        let index = self.find_record(name)?;
        let offset = RECORDS_OFFSET + index * RECORD_SIZE;
        let root = PageId::new(read_u32(self.data, offset + NAME_SIZE));
        if root == INVALID_PAGE_ID {
            None
        } else {
            Some(root)
        }
    }

    /// Returns true if a record with this name exists, even if its root
    /// is currently invalid.
    pub fn has_record(&self, name: &str) -> bool {
        self.find_record(name).is_some()
    }

    fn find_record(&self, name: &str) -> Option<usize> {
        find_record_in(self.data, name)
    }
}

/// Read-only view of the header page.
pub struct HeaderPageRef<'a> {
    data: &'a [u8],
}

impl<'a> HeaderPageRef<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        assert_eq!(data.len(), PAGE_SIZE);
        Self { data }
    }

    pub fn record_count(&self) -> usize {
        read_u32(self.data, RECORD_COUNT_OFFSET) as usize
    }

    pub fn get_root_id(&self, name: &str) -> Option<PageId> {
        let index = find_record_in(self.data, name)?;
        let offset = RECORDS_OFFSET + index * RECORD_SIZE;
        let root = PageId::new(read_u32(self.data, offset + NAME_SIZE));
        if root == INVALID_PAGE_ID {
            None
        } else {
            Some(root)
        }
    }

    pub fn has_record(&self, name: &str) -> bool {
        find_record_in(self.data, name).is_some()
    }
}

fn find_record_in(data: &[u8], name: &str) -> Option<usize> {
    assert!(name.len() <= NAME_SIZE, "index name too long");
    let mut padded = [0u8; NAME_SIZE];
    padded[..name.len()].copy_from_slice(name.as_bytes());

    let count = read_u32(data, RECORD_COUNT_OFFSET) as usize;
    (0..count).find(|&i| {
        let offset = RECORDS_OFFSET + i * RECORD_SIZE;
        data[offset..offset + NAME_SIZE] == padded
    })
}

fn read_u32(data: &[u8], offset: usize) -> u32 {
    let bytes: [u8; 4] = data[offset..offset + 4].try_into().unwrap();
    u32::from_le_bytes(bytes)
}

fn write_u32(data: &mut [u8], offset: usize, value: u32) {
    data[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

//! The header page: a registry of `(index_name, root_page_id)` records.
//!
//! Lives at [`HEADER_PAGE_ID`](larch_common::page::HEADER_PAGE_ID). Layout:
//! a u32 record count at offset 0 (offset 4..8 reserved), then fixed-size
//! records of a zero-padded 32-byte name followed by the root page id.
//! A zeroed page is a valid empty header.

use larch_common::page::{PageId, PAGE_SIZE};

const NUM_RECORDS_OFFSET: usize = 0;
const RECORDS_OFFSET: usize = 8;

/// Maximum length of an index name in bytes.
pub const MAX_NAME_LEN: usize = 32;

const RECORD_SIZE: usize = MAX_NAME_LEN + 4;

/// Maximum number of index records the header page can hold.
pub const MAX_RECORDS: usize = (PAGE_SIZE - RECORDS_OFFSET) / RECORD_SIZE;

/// View of the header page.
pub struct HeaderPage<B> {
    buf: B,
}

impl<B: AsRef<[u8]>> HeaderPage<B> {
    /// Wraps page bytes as a header view.
    pub fn new(buf: B) -> Self {
        Self { buf }
    }

    #[inline]
    fn data(&self) -> &[u8] {
        self.buf.as_ref()
    }

    /// Number of records stored.
    pub fn num_records(&self) -> usize {
        let d = self.data();
        u32::from_le_bytes([d[0], d[1], d[2], d[3]]) as usize
    }

    fn name_at(&self, index: usize) -> &[u8] {
        let off = RECORDS_OFFSET + index * RECORD_SIZE;
        let raw = &self.data()[off..off + MAX_NAME_LEN];
        let end = raw.iter().position(|&b| b == 0).unwrap_or(MAX_NAME_LEN);
        &raw[..end]
    }

    fn root_at(&self, index: usize) -> PageId {
        let off = RECORDS_OFFSET + index * RECORD_SIZE + MAX_NAME_LEN;
        let d = self.data();
        PageId(u32::from_le_bytes([
            d[off],
            d[off + 1],
            d[off + 2],
            d[off + 3],
        ]))
    }

    fn find(&self, name: &str) -> Option<usize> {
        (0..self.num_records()).find(|&i| self.name_at(i) == name.as_bytes())
    }

    /// Looks up the root page id recorded for `name`.
    pub fn get_record(&self, name: &str) -> Option<PageId> {
        self.find(name).map(|i| self.root_at(i))
    }
}

impl<B: AsRef<[u8]> + AsMut<[u8]>> HeaderPage<B> {
    #[inline]
    fn data_mut(&mut self) -> &mut [u8] {
        self.buf.as_mut()
    }

    fn set_num_records(&mut self, count: usize) {
        self.data_mut()[NUM_RECORDS_OFFSET..NUM_RECORDS_OFFSET + 4]
            .copy_from_slice(&(count as u32).to_le_bytes());
    }

    fn write_record(&mut self, index: usize, name: &str, root: PageId) {
        let off = RECORDS_OFFSET + index * RECORD_SIZE;
        let data = self.data_mut();
        data[off..off + MAX_NAME_LEN].fill(0);
        data[off..off + name.len()].copy_from_slice(name.as_bytes());
        data[off + MAX_NAME_LEN..off + MAX_NAME_LEN + 4].copy_from_slice(&root.0.to_le_bytes());
    }

    /// Registers a new `(name, root)` record. Returns false when the name
    /// is already registered or the page is full.
    pub fn insert_record(&mut self, name: &str, root: PageId) -> bool {
        debug_assert!(name.len() <= MAX_NAME_LEN);
        if self.find(name).is_some() {
            return false;
        }
        let count = self.num_records();
        if count >= MAX_RECORDS {
            return false;
        }
        self.write_record(count, name, root);
        self.set_num_records(count + 1);
        true
    }

    /// Updates the root page id recorded for `name`. Returns false when
    /// the name is not registered.
    pub fn update_record(&mut self, name: &str, root: PageId) -> bool {
        match self.find(name) {
            Some(index) => {
                let off = RECORDS_OFFSET + index * RECORD_SIZE + MAX_NAME_LEN;
                self.data_mut()[off..off + 4].copy_from_slice(&root.0.to_le_bytes());
                true
            }
            None => false,
        }
    }
}

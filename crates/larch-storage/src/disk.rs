//! Page-granular file I/O.

use larch_common::page::{PageId, PAGE_SIZE};
use larch_common::Result;
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

/// Synchronous disk manager reading and writing whole pages.
///
/// Pages live at `page_id * PAGE_SIZE` in a single data file. Reads past
/// the end of the file yield zeroed pages, so a freshly allocated page id
/// can be fetched before it was ever written.
pub struct DiskManager {
    /// Data file, guarded for seek+read/write atomicity.
    file: Mutex<File>,
    /// Whether to fsync after every page write.
    fsync_enabled: bool,
}

impl DiskManager {
    /// Opens (creating if needed) the data file at the given path.
    pub fn open(path: impl AsRef<Path>, fsync_enabled: bool) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        Ok(Self {
            file: Mutex::new(file),
            fsync_enabled,
        })
    }

    /// Reads a page into `buf`, zero-filling anything past end of file.
    pub fn read_page(&self, page_id: PageId, buf: &mut [u8]) -> Result<()> {
        debug_assert_eq!(buf.len(), PAGE_SIZE);
        let offset = page_id.0 as u64 * PAGE_SIZE as u64;

        let mut file = self.file.lock();
        let file_len = file.metadata()?.len();
        if offset >= file_len {
            buf.fill(0);
            return Ok(());
        }

        file.seek(SeekFrom::Start(offset))?;
        let mut total = 0;
        while total < buf.len() {
            let n = file.read(&mut buf[total..])?;
            if n == 0 {
                break;
            }
            total += n;
        }
        buf[total..].fill(0);
        Ok(())
    }

    /// Writes a page, extending the file if necessary.
    pub fn write_page(&self, page_id: PageId, data: &[u8]) -> Result<()> {
        debug_assert_eq!(data.len(), PAGE_SIZE);
        let offset = page_id.0 as u64 * PAGE_SIZE as u64;

        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(data)?;
        if self.fsync_enabled {
            file.sync_data()?;
        }
        Ok(())
    }

    /// Number of pages the file currently covers.
    pub fn num_pages(&self) -> Result<u32> {
        let file = self.file.lock();
        let len = file.metadata()?.len();
        Ok(len.div_ceil(PAGE_SIZE as u64) as u32)
    }

    /// Flushes file contents to stable storage.
    pub fn sync(&self) -> Result<()> {
        self.file.lock().sync_all()?;
        Ok(())
    }
}

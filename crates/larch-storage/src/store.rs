//! The page store: buffer pool + disk manager behind one interface.

use crate::disk::DiskManager;
use larch_buffer::{BufferPool, Frame, Page, PoolStats};
use larch_common::config::StorageConfig;
use larch_common::page::{PageId, PAGE_SIZE};
use larch_common::Result;
use parking_lot::{Mutex, RwLockReadGuard, RwLockWriteGuard};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// Page storage facade consumed by the index layer.
///
/// Owns page allocation, residency (via the buffer pool) and durability
/// (via the disk manager, which the pool's write-back hook targets).
/// Callers interact with pages exclusively through [`ReadPageGuard`] and
/// [`WritePageGuard`]: a guard pins its page and holds the page latch;
/// dropping it releases the latch and then unpins, so a fetched page is
/// always returned exactly once on every exit path.
pub struct PageStore {
    pool: BufferPool,
    disk: Arc<DiskManager>,
    /// Next never-used page id. Page 0 is reserved for the header page.
    next_page_id: AtomicU32,
    /// Ids of deleted pages available for reuse.
    free_pages: Mutex<Vec<PageId>>,
    /// Serializes miss handling so concurrent loads cannot interleave.
    io_lock: Mutex<()>,
}

impl PageStore {
    /// Opens the page store described by `config`.
    pub fn open(config: &StorageConfig) -> Result<Self> {
        let disk = Arc::new(DiskManager::open(&config.data_path, config.fsync_enabled)?);
        let next = disk.num_pages()?.max(1);

        let pool = {
            let disk = Arc::clone(&disk);
            BufferPool::new(
                config.buffer_pool_frames,
                Box::new(move |page_id, page: &Page| disk.write_page(page_id, &page[..])),
            )
        };

        Ok(Self {
            pool,
            disk,
            next_page_id: AtomicU32::new(next),
            free_pages: Mutex::new(Vec::new()),
            io_lock: Mutex::new(()),
        })
    }

    fn allocate_page_id(&self) -> PageId {
        if let Some(page_id) = self.free_pages.lock().pop() {
            return page_id;
        }
        PageId(self.next_page_id.fetch_add(1, Ordering::AcqRel))
    }

    /// Allocates a fresh zeroed page, returned pinned and write-latched.
    pub fn new_page(&self) -> Result<WritePageGuard<'_>> {
        let page_id = self.allocate_page_id();

        let frame = {
            let _io = self.io_lock.lock();
            match self.pool.admit(page_id, None) {
                Ok(frame) => frame,
                Err(e) => {
                    self.free_pages.lock().push(page_id);
                    return Err(e);
                }
            }
        };

        tracing::debug!(page_id = page_id.0, "allocated page");
        Ok(WritePageGuard {
            data: frame.latch_exclusive(),
            unpin: Unpinner {
                store: self,
                page_id,
                dirty: true,
            },
        })
    }

    /// Pins a page, reading it from disk if it is not resident.
    fn fetch_frame(&self, page_id: PageId) -> Result<&Frame> {
        if let Some(frame) = self.pool.pin(page_id) {
            return Ok(frame);
        }

        let _io = self.io_lock.lock();
        if let Some(frame) = self.pool.pin(page_id) {
            return Ok(frame);
        }

        let mut image = Box::new([0u8; PAGE_SIZE]);
        self.disk.read_page(page_id, &mut image[..])?;
        self.pool.admit(page_id, Some(&image))
    }

    /// Fetches a page and takes its latch in read mode. May block on I/O
    /// and on the latch.
    pub fn fetch_page_read(&self, page_id: PageId) -> Result<ReadPageGuard<'_>> {
        let frame = self.fetch_frame(page_id)?;
        Ok(ReadPageGuard {
            data: frame.latch_shared(),
            unpin: Unpinner {
                store: self,
                page_id,
                dirty: false,
            },
        })
    }

    /// Fetches a page and takes its latch in write mode. May block on I/O
    /// and on the latch.
    pub fn fetch_page_write(&self, page_id: PageId) -> Result<WritePageGuard<'_>> {
        let frame = self.fetch_frame(page_id)?;
        Ok(WritePageGuard {
            data: frame.latch_exclusive(),
            unpin: Unpinner {
                store: self,
                page_id,
                dirty: false,
            },
        })
    }

    /// Decrements a page's pin count, marking it dirty if requested.
    /// Guards call this on drop; it is public for symmetry with the
    /// buffer pool interface.
    pub fn unpin_page(&self, page_id: PageId, dirty: bool) -> bool {
        self.pool.unpin(page_id, dirty)
    }

    /// Frees a page. Returns false if the page is still pinned.
    ///
    /// The freed id becomes available for reuse; callers must ensure the
    /// page is unreachable before deleting it.
    pub fn delete_page(&self, page_id: PageId) -> bool {
        if self.pool.contains(page_id) && !self.pool.discard(page_id) {
            return false;
        }
        tracing::debug!(page_id = page_id.0, "freed page");
        self.free_pages.lock().push(page_id);
        true
    }

    /// Writes every dirty resident page to disk. Returns the number of
    /// pages flushed.
    pub fn flush_all(&self) -> Result<usize> {
        let flushed = self.pool.flush()?;
        self.disk.sync()?;
        Ok(flushed)
    }

    /// Returns buffer pool statistics.
    pub fn stats(&self) -> PoolStats {
        self.pool.stats()
    }
}

/// Shared cleanup half of a page guard: runs after the latch guard has
/// been dropped and returns the pin.
struct Unpinner<'a> {
    store: &'a PageStore,
    page_id: PageId,
    dirty: bool,
}

impl Drop for Unpinner<'_> {
    fn drop(&mut self) {
        self.store.unpin_page(self.page_id, self.dirty);
    }
}

/// A pinned page held under its read latch.
///
/// Field order matters: `data` (the latch guard) is declared before
/// `unpin`, so on drop the latch is released before the pin.
pub struct ReadPageGuard<'a> {
    data: RwLockReadGuard<'a, Box<Page>>,
    unpin: Unpinner<'a>,
}

impl ReadPageGuard<'_> {
    /// Returns the guarded page's id.
    pub fn page_id(&self) -> PageId {
        self.unpin.page_id
    }

    /// Returns the page bytes.
    pub fn data(&self) -> &Page {
        &self.data
    }
}

/// A pinned page held under its write latch.
///
/// Field order matters: `data` (the latch guard) is declared before
/// `unpin`, so on drop the latch is released before the pin.
pub struct WritePageGuard<'a> {
    data: RwLockWriteGuard<'a, Box<Page>>,
    unpin: Unpinner<'a>,
}

impl WritePageGuard<'_> {
    /// Returns the guarded page's id.
    pub fn page_id(&self) -> PageId {
        self.unpin.page_id
    }

    /// Returns the page bytes.
    pub fn data(&self) -> &Page {
        &self.data
    }

    /// Returns the page bytes mutably and marks the page dirty.
    pub fn data_mut(&mut self) -> &mut Page {
        self.unpin.dirty = true;
        &mut self.data
    }
}

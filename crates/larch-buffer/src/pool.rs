//! The buffer pool: a fixed set of frames, a residency map, and a clock
//! sweep for victim selection.

use crate::frame::{Frame, Page};
use larch_common::page::PageId;
use larch_common::{LarchError, Result};
use parking_lot::{Mutex, RwLock};
use std::collections::hash_map::Entry;
use std::collections::HashMap;

/// Write-back hook invoked with a dirty page's id and bytes before its
/// frame is reused. Injected at construction so the pool stays ignorant
/// of where pages persist.
pub type WriteBack = Box<dyn Fn(PageId, &Page) -> Result<()> + Send + Sync>;

/// Counters describing the pool's current occupancy.
#[derive(Debug, Clone)]
pub struct PoolStats {
    pub capacity: usize,
    pub free: usize,
    pub resident: usize,
    pub pinned: usize,
    pub dirty: usize,
}

/// A fixed-capacity cache of pages.
///
/// Residency is tracked in a directory mapping page ids to frame
/// indices. Pinning happens under the directory's read lock and victim
/// selection under its write lock, so a frame chosen for eviction cannot
/// gain a pin concurrently. Eviction runs a second-chance sweep over the
/// frame array itself: every acquire sets a frame's REFERENCED bit, the
/// hand clears it once, and an unpinned frame found cold is recycled,
/// with its bytes pushed through the write-back hook first when dirty.
pub struct BufferPool {
    frames: Box<[Frame]>,
    /// Residency directory: page id to frame index.
    directory: RwLock<HashMap<PageId, usize>>,
    /// Indices of frames holding no page.
    free: Mutex<Vec<usize>>,
    /// Clock hand position for the eviction sweep.
    hand: Mutex<usize>,
    write_back: WriteBack,
}

impl BufferPool {
    /// Creates a pool of `capacity` empty frames writing evicted dirty
    /// pages through `write_back`.
    pub fn new(capacity: usize, write_back: WriteBack) -> Self {
        let frames: Box<[Frame]> = (0..capacity).map(|_| Frame::empty()).collect();
        // Reversed so the free list hands out frame 0 first
        let free: Vec<usize> = (0..capacity).rev().collect();

        Self {
            frames,
            directory: RwLock::new(HashMap::new()),
            free: Mutex::new(free),
            hand: Mutex::new(0),
            write_back,
        }
    }

    /// Total number of frames.
    pub fn capacity(&self) -> usize {
        self.frames.len()
    }

    /// Number of pages currently resident.
    pub fn resident_count(&self) -> usize {
        self.directory.read().len()
    }

    /// Whether `page_id` is resident.
    pub fn contains(&self, page_id: PageId) -> bool {
        self.directory.read().contains_key(&page_id)
    }

    /// Pins `page_id` if it is resident and returns its frame.
    ///
    /// The pin is taken under the directory's read lock, which excludes
    /// concurrent eviction and discard of the same frame.
    pub fn pin(&self, page_id: PageId) -> Option<&Frame> {
        let directory = self.directory.read();
        let index = *directory.get(&page_id)?;
        let frame = &self.frames[index];
        frame.acquire();
        Some(frame)
    }

    /// Makes `page_id` resident and pins it. `image` fills the frame
    /// when given; otherwise the page starts zeroed. If the page is
    /// already resident its frame is returned untouched, so a stale disk
    /// image never clobbers newer resident bytes.
    ///
    /// Misses must be serialized by the caller when images come from
    /// storage (the page store's I/O lock does this); the pool itself
    /// only guarantees that racing admissions agree on one frame.
    pub fn admit(&self, page_id: PageId, image: Option<&Page>) -> Result<&Frame> {
        if let Some(frame) = self.pin(page_id) {
            return Ok(frame);
        }

        let index = self.reclaim_frame()?;
        let frame = &self.frames[index];
        {
            let mut page = frame.latch_exclusive();
            match image {
                Some(bytes) => page.copy_from_slice(&bytes[..]),
                None => page.fill(0),
            }
        }
        frame.set_owner(page_id);
        frame.acquire();

        let mut directory = self.directory.write();
        match directory.entry(page_id) {
            Entry::Vacant(slot) => {
                slot.insert(index);
                Ok(frame)
            }
            Entry::Occupied(slot) => {
                // Lost an admission race: pin the winner, recycle ours
                let winner = &self.frames[*slot.get()];
                winner.acquire();
                drop(directory);
                frame.clear();
                self.free.lock().push(index);
                Ok(winner)
            }
        }
    }

    /// Hands a free frame back, evicting if none is free.
    fn reclaim_frame(&self) -> Result<usize> {
        if let Some(index) = self.free.lock().pop() {
            return Ok(index);
        }

        let victim = {
            let mut directory = self.directory.write();
            let mut hand = self.hand.lock();
            let capacity = self.frames.len();
            let mut victim = None;

            // Two rotations: the first spends second chances, the
            // second finds whatever went cold
            for _ in 0..2 * capacity {
                let index = *hand;
                *hand = (index + 1) % capacity;

                let frame = &self.frames[index];
                let Some(owner) = frame.owner() else { continue };
                if frame.pins() > 0 || frame.tick() {
                    continue;
                }

                directory.remove(&owner);
                victim = Some((index, owner));
                break;
            }
            victim
        };

        let Some((index, owner)) = victim else {
            return Err(LarchError::BufferPoolFull);
        };

        let frame = &self.frames[index];
        if frame.is_dirty() {
            let result = {
                let page = frame.latch_shared();
                (self.write_back)(owner, &page)
            };
            if let Err(e) = result {
                frame.clear();
                self.free.lock().push(index);
                return Err(e);
            }
        }
        frame.clear();
        Ok(index)
    }

    /// Returns a pin on `page_id`, marking the page dirty if requested.
    /// False when the page is not resident.
    pub fn unpin(&self, page_id: PageId, dirty: bool) -> bool {
        let directory = self.directory.read();
        let Some(&index) = directory.get(&page_id) else {
            return false;
        };
        let frame = &self.frames[index];
        if dirty {
            frame.mark_dirty();
        }
        frame.release();
        true
    }

    /// Drops `page_id` from the pool without writing it back. Refuses
    /// pinned pages. Callers use this for deleted pages whose contents
    /// no longer matter.
    pub fn discard(&self, page_id: PageId) -> bool {
        let mut directory = self.directory.write();
        let Some(&index) = directory.get(&page_id) else {
            return false;
        };
        let frame = &self.frames[index];
        if frame.pins() > 0 {
            return false;
        }
        directory.remove(&page_id);
        drop(directory);

        frame.clear();
        self.free.lock().push(index);
        true
    }

    /// Pushes every dirty resident page through the write-back hook and
    /// marks it clean. Returns how many pages were written.
    pub fn flush(&self) -> Result<usize> {
        let resident: Vec<(PageId, usize)> = self
            .directory
            .read()
            .iter()
            .map(|(page_id, index)| (*page_id, *index))
            .collect();

        let mut written = 0;
        for (page_id, index) in resident {
            let frame = &self.frames[index];
            // Skip frames recycled since the snapshot
            if frame.owner() != Some(page_id) || !frame.is_dirty() {
                continue;
            }
            {
                let page = frame.latch_shared();
                (self.write_back)(page_id, &page)?;
            }
            frame.clear_dirty();
            written += 1;
        }
        Ok(written)
    }

    /// Occupancy counters.
    pub fn stats(&self) -> PoolStats {
        let directory = self.directory.read();
        let mut pinned = 0;
        let mut dirty = 0;
        for &index in directory.values() {
            let frame = &self.frames[index];
            if frame.pins() > 0 {
                pinned += 1;
            }
            if frame.is_dirty() {
                dirty += 1;
            }
        }
        PoolStats {
            capacity: self.frames.len(),
            free: self.free.lock().len(),
            resident: directory.len(),
            pinned,
            dirty,
        }
    }
}

//! Frames: the resident slots of the buffer pool.

use larch_common::page::{PageId, PAGE_SIZE};
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::sync::atomic::{AtomicU32, AtomicU8, Ordering};

/// One page worth of bytes.
pub type Page = [u8; PAGE_SIZE];

/// Owner value of a frame holding no page.
const NO_OWNER: u32 = u32::MAX;

/// The page was modified since it was loaded and must be written back
/// before its frame is reused.
const DIRTY: u8 = 0b01;

/// The page was used since the clock hand last swept past; one sweep
/// clears the bit, the next may evict.
const REFERENCED: u8 = 0b10;

/// A buffer slot holding at most one resident page.
///
/// The RwLock around the bytes doubles as the page latch: tree readers
/// hold it shared, tree writers exclusive, for as long as they work on
/// the page. Pin counts and the dirty/referenced bits live beside the
/// latch so the pool can consult them without touching the page bytes.
pub struct Frame {
    /// Page bytes; the lock is the page latch.
    slot: RwLock<Box<Page>>,
    /// Id of the resident page, NO_OWNER while the frame is free.
    owner: AtomicU32,
    /// Outstanding fetches against the resident page. A pinned frame is
    /// never evicted.
    pins: AtomicU32,
    /// DIRTY and REFERENCED bits.
    flags: AtomicU8,
}

impl Frame {
    pub(crate) fn empty() -> Self {
        Self {
            slot: RwLock::new(Box::new([0u8; PAGE_SIZE])),
            owner: AtomicU32::new(NO_OWNER),
            pins: AtomicU32::new(0),
            flags: AtomicU8::new(0),
        }
    }

    /// The resident page, if any.
    pub fn owner(&self) -> Option<PageId> {
        match self.owner.load(Ordering::Acquire) {
            NO_OWNER => None,
            id => Some(PageId(id)),
        }
    }

    pub(crate) fn set_owner(&self, owner: PageId) {
        self.owner.store(owner.0, Ordering::Release);
    }

    /// Current pin count.
    pub fn pins(&self) -> u32 {
        self.pins.load(Ordering::Acquire)
    }

    /// Adds a pin and grants the page its second chance against the
    /// clock sweep. Returns the new pin count.
    pub fn acquire(&self) -> u32 {
        let count = self.pins.fetch_add(1, Ordering::AcqRel) + 1;
        self.flags.fetch_or(REFERENCED, Ordering::Relaxed);
        count
    }

    /// Drops a pin, refusing to fall below zero. Returns the new count.
    pub fn release(&self) -> u32 {
        self.pins
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |pins| {
                pins.checked_sub(1)
            })
            .map_or(0, |previous| previous - 1)
    }

    /// Whether the resident page has unwritten changes.
    pub fn is_dirty(&self) -> bool {
        self.flags.load(Ordering::Acquire) & DIRTY != 0
    }

    pub(crate) fn mark_dirty(&self) {
        self.flags.fetch_or(DIRTY, Ordering::AcqRel);
    }

    pub(crate) fn clear_dirty(&self) {
        self.flags.fetch_and(!DIRTY, Ordering::AcqRel);
    }

    /// Consumes the page's second chance: clears the REFERENCED bit and
    /// reports whether it was set. The sweep skips a frame once per
    /// rotation while this returns true.
    pub(crate) fn tick(&self) -> bool {
        self.flags.fetch_and(!REFERENCED, Ordering::Relaxed) & REFERENCED != 0
    }

    /// Takes the page latch in shared mode.
    pub fn latch_shared(&self) -> RwLockReadGuard<'_, Box<Page>> {
        self.slot.read()
    }

    /// Takes the page latch in exclusive mode.
    pub fn latch_exclusive(&self) -> RwLockWriteGuard<'_, Box<Page>> {
        self.slot.write()
    }

    /// Detaches the frame from its page: owner, pins and flags reset.
    /// The stale bytes stay behind; admission overwrites them.
    pub(crate) fn clear(&self) {
        self.owner.store(NO_OWNER, Ordering::Release);
        self.pins.store(0, Ordering::Release);
        self.flags.store(0, Ordering::Release);
    }
}

use crate::block::BlockId;
use crate::error::Result;
use crate::io::{BlockStorage, Page, WalLog, LSN};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// In-memory block storage, used by tests and examples.
/// Reading an absent block yields a zeroed page, matching a file
/// manager that extends files on demand.
#[derive(Default)]
pub struct MemBlockStorage {
    inner: RwLock<HashMap<BlockId, Box<Page>>>,
    writes: AtomicUsize,
}

impl MemBlockStorage {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of write_block calls performed so far.
    #[inline]
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::Acquire)
    }

    /// Returns a copy of the stored contents of the given block, if any
    /// write has reached it.
    #[inline]
    pub fn stored(&self, blk: &BlockId) -> Option<Box<Page>> {
        let inner = self.inner.read();
        inner.get(blk).cloned()
    }
}

impl BlockStorage for MemBlockStorage {
    #[inline]
    fn read_block(&self, blk: &BlockId, page: &mut Page) -> Result<()> {
        let inner = self.inner.read();
        match inner.get(blk) {
            Some(stored) => page.copy_from_slice(&stored[..]),
            None => page.fill(0),
        }
        Ok(())
    }

    #[inline]
    fn write_block(&self, blk: &BlockId, page: &Page) -> Result<()> {
        let mut inner = self.inner.write();
        inner.insert(blk.clone(), Box::new(*page));
        self.writes.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }
}

/// In-memory write-ahead log that only tracks the highest flushed LSN.
#[derive(Default)]
pub struct MemWalLog {
    flushed: AtomicU64,
    flushes: AtomicUsize,
}

impl MemWalLog {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Highest LSN a flush_through call has reached.
    #[inline]
    pub fn flushed_through(&self) -> LSN {
        self.flushed.load(Ordering::Acquire)
    }

    /// Number of flush_through calls performed so far.
    #[inline]
    pub fn flush_count(&self) -> usize {
        self.flushes.load(Ordering::Acquire)
    }
}

impl WalLog for MemWalLog {
    #[inline]
    fn flush_through(&self, lsn: LSN) -> Result<()> {
        self.flushed.fetch_max(lsn, Ordering::AcqRel);
        self.flushes.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }
}

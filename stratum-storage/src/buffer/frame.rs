use crate::block::BlockId;
use crate::error::Result;
use crate::io::{BlockStorage, Page, WalLog, LSN};
use crate::trx::TrxID;
use parking_lot::{MappedMutexGuard, Mutex, MutexGuard};
use std::sync::Arc;

/// A buffer frame: an in-memory slot holding the contents of at most
/// one disk block, together with its pin count and modification
/// markers. Frames are created once at pool construction and rebound
/// to different blocks over their lifetime.
///
/// The frame guards its own state with a mutex, but pin-count changes
/// are only performed by the pool under the pool lock, which makes
/// check-then-pin sequences atomic. Lock order is pool, then frame.
pub struct BufferFrame {
    id: usize,
    storage: Arc<dyn BlockStorage>,
    wal: Arc<dyn WalLog>,
    inner: Mutex<FrameInner>,
}

struct FrameInner {
    blk: Option<BlockId>,
    page: Page,
    pins: u32,
    /// Transaction that last modified the page, cleared on flush.
    modified_by: Option<TrxID>,
    /// LSN of the log record covering that modification.
    lsn: Option<LSN>,
}

impl BufferFrame {
    pub(crate) fn new(id: usize, storage: Arc<dyn BlockStorage>, wal: Arc<dyn WalLog>) -> Self {
        BufferFrame {
            id,
            storage,
            wal,
            inner: Mutex::new(FrameInner {
                blk: None,
                page: [0u8; crate::io::BLOCK_SIZE],
                pins: 0,
                modified_by: None,
                lsn: None,
            }),
        }
    }

    /// Index of this frame within the pool.
    #[inline]
    pub fn id(&self) -> usize {
        self.id
    }

    /// Block this frame is currently bound to, if any.
    #[inline]
    pub fn block(&self) -> Option<BlockId> {
        self.inner.lock().blk.clone()
    }

    #[inline]
    pub fn is_pinned(&self) -> bool {
        self.inner.lock().pins > 0
    }

    #[inline]
    pub fn pin_count(&self) -> u32 {
        self.inner.lock().pins
    }

    /// Transaction that last modified this frame's contents, if the
    /// modification has not been flushed yet.
    #[inline]
    pub fn modifying_trx(&self) -> Option<TrxID> {
        self.inner.lock().modified_by
    }

    /// Access the page contents. The caller must hold a pin; the pool
    /// never rebinds a pinned frame, so the contents stay those of the
    /// bound block for as long as the pin is held.
    #[inline]
    pub fn page(&self) -> MappedMutexGuard<'_, Page> {
        MutexGuard::map(self.inner.lock(), |inner| &mut inner.page)
    }

    /// Record that the transaction modified this frame's contents as of
    /// the given log position. `None` keeps the previously recorded LSN,
    /// for modifications that wrote no log record of their own.
    #[inline]
    pub fn set_modified(&self, trx: TrxID, lsn: Option<LSN>) {
        let mut inner = self.inner.lock();
        inner.modified_by = Some(trx);
        if lsn.is_some() {
            inner.lsn = lsn;
        }
    }

    /// Write the frame's contents back to its block if it carries an
    /// outstanding modification, flushing the log first so the WAL rule
    /// holds. No-op on an unmodified frame; safe to call repeatedly.
    pub fn flush(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        if let Some(trx) = inner.modified_by {
            if let Some(lsn) = inner.lsn {
                self.wal.flush_through(lsn)?;
            }
            let blk = inner
                .blk
                .clone()
                .expect("modified frame must be bound to a block");
            self.storage.write_block(&blk, &inner.page)?;
            log::debug!("frame {} flushed {} for trx {}", self.id, blk, trx);
            inner.modified_by = None;
            inner.lsn = None;
        }
        Ok(())
    }

    /// Rebind the frame to the given block, loading its contents from
    /// storage and clearing all markers. The pool only calls this on a
    /// frame with pin count 0. A failed read leaves the frame unbound.
    pub(crate) fn assign_to_block(&self, blk: BlockId) -> Result<()> {
        let mut inner = self.inner.lock();
        debug_assert_eq!(inner.pins, 0, "rebinding a pinned frame");
        inner.blk = None;
        inner.modified_by = None;
        inner.lsn = None;
        self.storage.read_block(&blk, &mut inner.page)?;
        inner.blk = Some(blk);
        inner.pins = 0;
        Ok(())
    }

    /// Called by the pool under the pool lock.
    #[inline]
    pub(crate) fn pin(&self) {
        self.inner.lock().pins += 1;
    }

    /// Called by the pool under the pool lock. Decrementing at pin
    /// count 0 is a no-op so a stray unpin cannot corrupt the count.
    #[inline]
    pub(crate) fn unpin(&self) {
        let mut inner = self.inner.lock();
        if inner.pins > 0 {
            inner.pins -= 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mem_impl::{MemBlockStorage, MemWalLog};

    fn new_frame() -> (Arc<MemBlockStorage>, Arc<MemWalLog>, BufferFrame) {
        let storage = Arc::new(MemBlockStorage::new());
        let wal = Arc::new(MemWalLog::new());
        let frame = BufferFrame::new(
            0,
            Arc::clone(&storage) as Arc<dyn BlockStorage>,
            Arc::clone(&wal) as Arc<dyn WalLog>,
        );
        (storage, wal, frame)
    }

    #[test]
    fn test_new_frame_unbound() {
        let (_, _, frame) = new_frame();
        assert_eq!(frame.block(), None);
        assert!(!frame.is_pinned());
        assert_eq!(frame.modifying_trx(), None);
    }

    #[test]
    fn test_assign_loads_contents() {
        let (storage, _, frame) = new_frame();
        let blk = BlockId::new("t.tbl", 1);
        let mut page = [0u8; crate::io::BLOCK_SIZE];
        page[0] = 42;
        storage.write_block(&blk, &page).unwrap();

        frame.assign_to_block(blk.clone()).unwrap();
        assert_eq!(frame.block(), Some(blk));
        assert_eq!(frame.page()[0], 42);
        assert_eq!(frame.modifying_trx(), None);
    }

    #[test]
    fn test_flush_orders_wal_before_write_and_is_idempotent() {
        let (storage, wal, frame) = new_frame();
        let blk = BlockId::new("t.tbl", 2);
        frame.assign_to_block(blk.clone()).unwrap();

        frame.page()[0] = 0x5A;
        frame.set_modified(9, Some(117));

        frame.flush().unwrap();
        assert_eq!(wal.flushed_through(), 117);
        assert_eq!(storage.write_count(), 1);
        assert_eq!(storage.stored(&blk).unwrap()[0], 0x5A);
        assert_eq!(frame.modifying_trx(), None);

        // marker cleared: a second flush performs no further write
        frame.flush().unwrap();
        assert_eq!(storage.write_count(), 1);
        assert_eq!(wal.flush_count(), 1);
    }

    #[test]
    fn test_flush_unmodified_is_noop() {
        let (storage, wal, frame) = new_frame();
        frame.assign_to_block(BlockId::new("t.tbl", 3)).unwrap();
        frame.flush().unwrap();
        assert_eq!(storage.write_count(), 0);
        assert_eq!(wal.flush_count(), 0);
    }

    #[test]
    fn test_modification_without_lsn_skips_wal() {
        let (storage, wal, frame) = new_frame();
        frame.assign_to_block(BlockId::new("t.tbl", 4)).unwrap();
        frame.set_modified(3, None);
        frame.flush().unwrap();
        assert_eq!(storage.write_count(), 1);
        assert_eq!(wal.flush_count(), 0);
    }

    #[test]
    fn test_pin_unpin_counts() {
        let (_, _, frame) = new_frame();
        frame.pin();
        frame.pin();
        assert_eq!(frame.pin_count(), 2);
        frame.unpin();
        assert_eq!(frame.pin_count(), 1);
        frame.unpin();
        assert_eq!(frame.pin_count(), 0);
        // unpin at zero stays at zero
        frame.unpin();
        assert_eq!(frame.pin_count(), 0);
    }

    #[test]
    fn test_rebind_clears_markers() {
        let (_, _, frame) = new_frame();
        frame.assign_to_block(BlockId::new("t.tbl", 5)).unwrap();
        frame.set_modified(4, Some(9));
        frame.assign_to_block(BlockId::new("t.tbl", 6)).unwrap();
        assert_eq!(frame.modifying_trx(), None);
        assert_eq!(frame.block(), Some(BlockId::new("t.tbl", 6)));
    }
}

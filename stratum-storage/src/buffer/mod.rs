//! Buffer pool management.
//!
//! A fixed set of frames caches disk blocks in memory. Callers pin the
//! block they work on, which keeps its frame resident, and unpin it
//! when done. Replacement picks the frame that has been unpinned the
//! longest; a caller that finds no replaceable frame waits on the
//! pool's condition variable up to a fixed bound.
pub mod frame;

use crate::block::BlockId;
use crate::error::{Error, Result};
use crate::io::{BlockStorage, WalLog};
use crate::trx::TrxID;
use frame::BufferFrame;
use parking_lot::{Condvar, Mutex};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Bound on how long `pin` waits for a frame to become available.
pub const DEFAULT_MAX_WAIT: Duration = Duration::from_secs(10);

/// The buffer pool manager. All bookkeeping (block index, recency
/// queue, available count) lives behind one mutex; every public
/// operation is a single critical section apart from the explicit wait
/// inside [`BufferMgr::pin`].
pub struct BufferMgr {
    frames: Vec<Arc<BufferFrame>>,
    state: Mutex<PoolState>,
    avail: Condvar,
    max_wait: Duration,
}

struct PoolState {
    /// Maps each bound block to the index of its frame.
    index: HashMap<BlockId, usize>,
    /// Unpinned frame indexes, least recently unpinned at the front.
    unpinned: VecDeque<usize>,
    available: usize,
}

impl BufferMgr {
    /// Create a pool of `numbuffs` frames over the given collaborators,
    /// with the default wait bound.
    pub fn new(storage: Arc<dyn BlockStorage>, wal: Arc<dyn WalLog>, numbuffs: usize) -> Self {
        Self::with_max_wait(storage, wal, numbuffs, DEFAULT_MAX_WAIT)
    }

    /// Create a pool with an explicit wait bound for `pin`.
    pub fn with_max_wait(
        storage: Arc<dyn BlockStorage>,
        wal: Arc<dyn WalLog>,
        numbuffs: usize,
        max_wait: Duration,
    ) -> Self {
        let frames: Vec<Arc<BufferFrame>> = (0..numbuffs)
            .map(|id| {
                Arc::new(BufferFrame::new(
                    id,
                    Arc::clone(&storage),
                    Arc::clone(&wal),
                ))
            })
            .collect();
        let unpinned: VecDeque<usize> = (0..numbuffs).collect();
        BufferMgr {
            frames,
            state: Mutex::new(PoolState {
                index: HashMap::new(),
                unpinned,
                available: numbuffs,
            }),
            avail: Condvar::new(),
            max_wait,
        }
    }

    /// Number of currently unpinned frames.
    #[inline]
    pub fn available(&self) -> usize {
        self.state.lock().available
    }

    /// Pin a frame to the given block, waiting up to the pool's wait
    /// bound for a frame to become available. Fails with
    /// [`Error::BufferAbort`] once the bound elapses.
    pub fn pin(&self, blk: &BlockId) -> Result<Arc<BufferFrame>> {
        let deadline = Instant::now() + self.max_wait;
        let mut state = self.state.lock();
        loop {
            if let Some(frame) = self.try_pin(&mut state, blk)? {
                return Ok(frame);
            }
            log::debug!("no frame available for {}, waiting", blk);
            if self.avail.wait_until(&mut state, deadline).timed_out() {
                // one last attempt after the deadline, then give up
                return match self.try_pin(&mut state, blk)? {
                    Some(frame) => Ok(frame),
                    None => Err(Error::BufferAbort),
                };
            }
        }
    }

    /// Unpin the frame. When its pin count reaches 0 the frame joins
    /// the back of the recency queue (most recently unpinned) and one
    /// waiting `pin` caller may proceed. Unpinning an unpinned frame is
    /// a no-op.
    pub fn unpin(&self, frame: &BufferFrame) {
        let mut state = self.state.lock();
        if !frame.is_pinned() {
            return;
        }
        frame.unpin();
        if !frame.is_pinned() {
            state.available += 1;
            state.unpinned.push_back(frame.id());
            drop(state);
            self.avail.notify_all();
        }
    }

    /// Flush every resident frame whose outstanding modification was
    /// made by the given transaction. Frames modified by other
    /// transactions, or unmodified, are left untouched.
    pub fn flush_all(&self, trx: TrxID) -> Result<()> {
        let _state = self.state.lock();
        for frame in &self.frames {
            if frame.modifying_trx() == Some(trx) {
                frame.flush()?;
            }
        }
        Ok(())
    }

    /// Diagnostic snapshot of the pool: bound frames with their pinned
    /// state, and the recency queue order. Observability only.
    pub fn status(&self) -> PoolStatus {
        let state = self.state.lock();
        let frames = self
            .frames
            .iter()
            .filter_map(|f| {
                f.block().map(|blk| FrameStatus {
                    id: f.id(),
                    blk,
                    pinned: f.is_pinned(),
                })
            })
            .collect();
        PoolStatus {
            frames,
            unpinned: state.unpinned.iter().copied().collect(),
        }
    }

    fn try_pin(&self, state: &mut PoolState, blk: &BlockId) -> Result<Option<Arc<BufferFrame>>> {
        match state.index.get(blk) {
            Some(&id) => {
                // block already resident, reuse its frame
                let frame = &self.frames[id];
                if !frame.is_pinned() {
                    state.available -= 1;
                    state.unpinned.retain(|&i| i != id);
                }
                frame.pin();
                Ok(Some(Arc::clone(frame)))
            }
            None => {
                // replace the frame that has been unpinned the longest
                let victim = match state.unpinned.pop_front() {
                    Some(victim) => victim,
                    None => return Ok(None),
                };
                let frame = &self.frames[victim];
                if let Some(old) = frame.block() {
                    log::debug!("evict frame {} bound to {} for {}", victim, old, blk);
                    state.index.remove(&old);
                }
                if let Err(e) = frame.assign_to_block(blk.clone()) {
                    // frame is left unbound and stays replaceable
                    state.unpinned.push_front(victim);
                    return Err(e);
                }
                state.index.insert(blk.clone(), victim);
                state.available -= 1;
                frame.pin();
                Ok(Some(Arc::clone(frame)))
            }
        }
    }
}

/// Snapshot returned by [`BufferMgr::status`].
pub struct PoolStatus {
    frames: Vec<FrameStatus>,
    unpinned: Vec<usize>,
}

struct FrameStatus {
    id: usize,
    blk: BlockId,
    pinned: bool,
}

impl fmt::Display for PoolStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Allocated frames:")?;
        for fs in &self.frames {
            writeln!(
                f,
                "frame {}: {} {}",
                fs.id,
                fs.blk,
                if fs.pinned { "pinned" } else { "unpinned" }
            )?;
        }
        write!(f, "Unpinned frames in LRU order:")?;
        for id in &self.unpinned {
            write!(f, " {}", id)?;
        }
        Ok(())
    }
}

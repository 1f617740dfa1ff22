use crate::block::BlockId;
use crate::error::{Error, Result};
use crate::trx::TrxID;
use parking_lot::{Condvar, Mutex};
use smallvec::{smallvec, SmallVec};
use std::collections::HashMap;

/// Lock mode a transaction holds on a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    Shared,
    Exclusive,
}

#[derive(Debug, Clone, Copy)]
struct LockEntry {
    trx: TrxID,
    mode: LockMode,
}

/// Block-level lock table implementing the Wait-Die deadlock
/// prevention scheme.
///
/// Priority is the transaction id itself: lower id = older transaction.
/// A requester that conflicts with an older holder dies immediately
/// with [`Error::LockAbort`]; a requester that conflicts with a younger
/// holder waits until the holder releases. Because every wait edge goes
/// from an older to a younger transaction, no wait cycle can form.
///
/// There is a single wait set for the whole table. Every unlock wakes
/// all waiters and each re-evaluates its own request from scratch, so
/// spurious wakeups are expected and harmless.
pub struct LockTable {
    locks: Mutex<HashMap<BlockId, SmallVec<[LockEntry; 2]>>>,
    released: Condvar,
}

impl LockTable {
    #[inline]
    pub fn new() -> Self {
        LockTable {
            locks: Mutex::new(HashMap::new()),
            released: Condvar::new(),
        }
    }

    /// Acquire a shared lock on the block for the transaction.
    ///
    /// Returns immediately if the transaction already holds any lock on
    /// the block. Shared locks never conflict with each other; against
    /// an exclusive holder the Wait-Die rule decides between dying and
    /// waiting.
    pub fn lock_shared(&self, blk: &BlockId, trx: TrxID) -> Result<()> {
        let mut locks = self.locks.lock();
        loop {
            match locks.get_mut(blk) {
                None => {
                    locks.insert(
                        blk.clone(),
                        smallvec![LockEntry {
                            trx,
                            mode: LockMode::Shared,
                        }],
                    );
                    return Ok(());
                }
                Some(holders) => {
                    // already holds a shared or exclusive lock on this block
                    if holders.iter().any(|e| e.trx == trx) {
                        return Ok(());
                    }
                    match holders.iter().find(|e| e.mode == LockMode::Exclusive) {
                        None => {
                            holders.push(LockEntry {
                                trx,
                                mode: LockMode::Shared,
                            });
                            return Ok(());
                        }
                        Some(x) => {
                            if trx > x.trx {
                                log::debug!(
                                    "trx {} dies requesting S on {} held X by older trx {}",
                                    trx,
                                    blk,
                                    x.trx
                                );
                                return Err(Error::LockAbort);
                            }
                        }
                    }
                }
            }
            // older than the exclusive holder, wait for a release and
            // re-evaluate from the top
            self.released.wait(&mut locks);
        }
    }

    /// Acquire an exclusive lock on the block for the transaction.
    ///
    /// Returns immediately if the transaction already holds the
    /// exclusive lock. The transaction's own shared entry is not a
    /// conflict; granting replaces it (lock upgrade). Any other
    /// holder's entry conflicts and the Wait-Die rule decides.
    pub fn lock_exclusive(&self, blk: &BlockId, trx: TrxID) -> Result<()> {
        let mut locks = self.locks.lock();
        loop {
            match locks.get_mut(blk) {
                None => {
                    locks.insert(
                        blk.clone(),
                        smallvec![LockEntry {
                            trx,
                            mode: LockMode::Exclusive,
                        }],
                    );
                    return Ok(());
                }
                Some(holders) => {
                    if holders
                        .iter()
                        .any(|e| e.trx == trx && e.mode == LockMode::Exclusive)
                    {
                        return Ok(());
                    }
                    match holders.iter().find(|e| e.trx != trx) {
                        None => {
                            // only the caller's own shared entry remains,
                            // upgrade it in place
                            holders.clear();
                            holders.push(LockEntry {
                                trx,
                                mode: LockMode::Exclusive,
                            });
                            return Ok(());
                        }
                        Some(other) => {
                            if trx > other.trx {
                                log::debug!(
                                    "trx {} dies requesting X on {} held by older trx {}",
                                    trx,
                                    blk,
                                    other.trx
                                );
                                return Err(Error::LockAbort);
                            }
                        }
                    }
                }
            }
            self.released.wait(&mut locks);
        }
    }

    /// Release the transaction's lock on the block, whatever its mode.
    ///
    /// Drops the block's holder list once it becomes empty and wakes
    /// all waiters so they can re-check their own requests.
    pub fn unlock(&self, blk: &BlockId, trx: TrxID) {
        let mut locks = self.locks.lock();
        if let Some(holders) = locks.get_mut(blk) {
            holders.retain(|e| e.trx != trx);
            if holders.is_empty() {
                locks.remove(blk);
            }
        }
        drop(locks);
        self.released.notify_all();
    }
}

impl Default for LockTable {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_shared_locks_compatible() {
        let table = LockTable::new();
        let blk = BlockId::new("t.tbl", 0);
        table.lock_shared(&blk, 1).unwrap();
        table.lock_shared(&blk, 2).unwrap();
        // re-entry is idempotent
        table.lock_shared(&blk, 1).unwrap();
        table.unlock(&blk, 1);
        table.unlock(&blk, 2);
    }

    #[test]
    fn test_younger_exclusive_dies_against_older_exclusive() {
        let table = LockTable::new();
        let blk = BlockId::new("t.tbl", 0);
        table.lock_exclusive(&blk, 1).unwrap();
        // younger trx 2 must die immediately, not wait
        let res = table.lock_exclusive(&blk, 2);
        assert!(matches!(res, Err(Error::LockAbort)));
        table.unlock(&blk, 1);
    }

    #[test]
    fn test_younger_shared_dies_against_older_exclusive() {
        let table = LockTable::new();
        let blk = BlockId::new("t.tbl", 0);
        table.lock_exclusive(&blk, 1).unwrap();
        let res = table.lock_shared(&blk, 2);
        assert!(matches!(res, Err(Error::LockAbort)));
        table.unlock(&blk, 1);
    }

    #[test]
    fn test_older_shared_against_younger_shared_no_conflict() {
        let table = LockTable::new();
        let blk = BlockId::new("t.tbl", 0);
        table.lock_shared(&blk, 2).unwrap();
        // shared never conflicts with shared, regardless of age
        table.lock_shared(&blk, 1).unwrap();
        table.unlock(&blk, 1);
        table.unlock(&blk, 2);
    }

    #[test]
    fn test_older_waits_until_younger_unlocks() {
        let table = Arc::new(LockTable::new());
        let blk = BlockId::new("t.tbl", 0);
        // younger trx 2 holds the exclusive lock
        table.lock_exclusive(&blk, 2).unwrap();

        let releaser = {
            let table = Arc::clone(&table);
            let blk = blk.clone();
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(50));
                table.unlock(&blk, 2);
            })
        };

        // older trx 1 blocks here until the release, then is granted
        table.lock_exclusive(&blk, 1).unwrap();
        releaser.join().unwrap();
        table.unlock(&blk, 1);
    }

    #[test]
    fn test_older_shared_waits_for_younger_exclusive() {
        let table = Arc::new(LockTable::new());
        let blk = BlockId::new("t.tbl", 0);
        table.lock_exclusive(&blk, 2).unwrap();

        let releaser = {
            let table = Arc::clone(&table);
            let blk = blk.clone();
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(50));
                table.unlock(&blk, 2);
            })
        };

        table.lock_shared(&blk, 1).unwrap();
        releaser.join().unwrap();
        table.unlock(&blk, 1);
    }

    #[test]
    fn test_upgrade_ignores_own_shared_entry() {
        let table = LockTable::new();
        let blk = BlockId::new("t.tbl", 0);
        table.lock_shared(&blk, 1).unwrap();
        // no other holder: upgrade succeeds without blocking on itself
        table.lock_exclusive(&blk, 1).unwrap();
        // still exclusive: a younger shared request dies
        assert!(matches!(table.lock_shared(&blk, 2), Err(Error::LockAbort)));
        table.unlock(&blk, 1);
    }

    #[test]
    fn test_unlock_removes_empty_entry() {
        let table = LockTable::new();
        let blk = BlockId::new("t.tbl", 0);
        table.lock_exclusive(&blk, 1).unwrap();
        table.unlock(&blk, 1);
        // block entry dropped: a younger transaction succeeds immediately
        table.lock_exclusive(&blk, 2).unwrap();
        table.unlock(&blk, 2);
        // unlock with no holders is a no-op
        table.unlock(&blk, 2);
    }

    #[test]
    fn test_wait_die_under_contention() {
        const THREADS: usize = 4;
        const ROUNDS: usize = 200;
        let table = Arc::new(LockTable::new());
        let seq = Arc::new(crate::trx::TrxIdSequence::new());
        let blocks: Vec<BlockId> = (0..4).map(|i| BlockId::new("t.tbl", i)).collect();

        let mut handles = vec![];
        for t in 0..THREADS {
            let table = Arc::clone(&table);
            let seq = Arc::clone(&seq);
            let blocks = blocks.clone();
            handles.push(std::thread::spawn(move || {
                let mut done = 0;
                while done < ROUNDS {
                    // fresh (younger) id per attempt, as a restarted
                    // transaction would draw
                    let trx = seq.next_trx_id();
                    let a = &blocks[(done + t) % blocks.len()];
                    let b = &blocks[(done + t + 1) % blocks.len()];
                    let res = table
                        .lock_shared(a, trx)
                        .and_then(|_| table.lock_exclusive(b, trx));
                    table.unlock(a, trx);
                    table.unlock(b, trx);
                    if res.is_ok() {
                        done += 1;
                    }
                }
            }));
        }
        // Wait-Die guarantees this terminates: no wait cycle can form,
        // and the oldest active transaction never aborts
        for handle in handles {
            handle.join().unwrap();
        }
    }

    #[test]
    fn test_single_unlock_releases_upgraded_lock() {
        let table = LockTable::new();
        let blk = BlockId::new("t.tbl", 0);
        table.lock_shared(&blk, 1).unwrap();
        table.lock_exclusive(&blk, 1).unwrap();
        table.unlock(&blk, 1);
        table.lock_exclusive(&blk, 2).unwrap();
        table.unlock(&blk, 2);
    }
}

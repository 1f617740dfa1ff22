//! Transaction identity and block-level locking.
//!
//! Transaction ids are issued monotonically and double as the Wait-Die
//! priority: a lower id means an older transaction, and an older
//! transaction always wins a lock conflict against a younger one. A
//! transaction that dies must restart with a fresh id, which makes it
//! younger than everything that outlived it.
pub mod lock;

use crossbeam_utils::CachePadded;
use std::sync::atomic::{AtomicU64, Ordering};

pub type TrxID = u64;
pub const INVALID_TRX_ID: TrxID = !0;
pub const MIN_TRX_ID: TrxID = 1;

/// Monotonic transaction id sequence.
/// The transaction layer draws one id per transaction (including
/// restarts after a Wait-Die abort).
pub struct TrxIdSequence {
    next: CachePadded<AtomicU64>,
}

impl TrxIdSequence {
    #[inline]
    pub fn new() -> Self {
        TrxIdSequence {
            next: CachePadded::new(AtomicU64::new(MIN_TRX_ID)),
        }
    }

    /// Issue the next transaction id.
    #[inline]
    pub fn next_trx_id(&self) -> TrxID {
        self.next.fetch_add(1, Ordering::SeqCst)
    }
}

impl Default for TrxIdSequence {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_trx_id_sequence_monotonic() {
        let seq = TrxIdSequence::new();
        let a = seq.next_trx_id();
        let b = seq.next_trx_id();
        let c = seq.next_trx_id();
        assert!(a < b && b < c);
        assert_eq!(a, MIN_TRX_ID);
    }

    #[test]
    fn test_trx_id_sequence_multi_threaded_unique() {
        const THREADS: usize = 4;
        const PER_THREAD: usize = 1000;
        let seq = Arc::new(TrxIdSequence::new());
        let mut handles = vec![];
        for _ in 0..THREADS {
            let seq = Arc::clone(&seq);
            handles.push(std::thread::spawn(move || {
                (0..PER_THREAD)
                    .map(|_| seq.next_trx_id())
                    .collect::<Vec<_>>()
            }));
        }
        let mut all: Vec<TrxID> = vec![];
        for handle in handles {
            all.extend(handle.join().unwrap());
        }
        all.sort_unstable();
        all.dedup();
        assert_eq!(all.len(), THREADS * PER_THREAD);
    }
}

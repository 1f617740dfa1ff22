//! Multi-threaded transaction workload over the buffer pool and lock table.
//! Each worker runs transactions that exclusive-lock a random block, pin it,
//! modify its contents and commit. A transaction that dies under Wait-Die
//! rolls back and the worker moves on with a fresh id.
use clap::Parser;
use rand::Rng;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use stratum_storage::mem_impl::{MemBlockStorage, MemWalLog};
use stratum_storage::prelude::*;

fn main() {
    env_logger::init();
    let args = Args::parse();
    let storage: Arc<dyn BlockStorage> = Arc::new(MemBlockStorage::new());
    let wal: Arc<dyn WalLog> = Arc::new(MemWalLog::new());
    let mgr = Arc::new(BufferMgr::new(storage, wal, args.buffers));
    let locks = Arc::new(LockTable::new());
    let seq = Arc::new(TrxIdSequence::new());
    let stop = Arc::new(AtomicBool::new(false));

    let mut handles = vec![];
    let start = Instant::now();
    for _ in 1..args.threads {
        let mgr = Arc::clone(&mgr);
        let locks = Arc::clone(&locks);
        let seq = Arc::clone(&seq);
        let stop = Arc::clone(&stop);
        let handle =
            std::thread::spawn(move || worker(&mgr, &locks, &seq, &args, &stop));
        handles.push(handle);
    }
    let (mut commits, mut aborts) = worker(&mgr, &locks, &seq, &args, &stop);
    for handle in handles {
        let (c, a) = handle.join().unwrap();
        commits += c;
        aborts += a;
    }
    let dur = start.elapsed();
    println!(
        "{:?} commits, {:?} wait-die aborts in {:?} microseconds, avg {:?} trx/s",
        commits,
        aborts,
        dur.as_micros(),
        commits as f64 * 1_000_000_000f64 / dur.as_nanos() as f64
    );
}

fn worker(
    mgr: &BufferMgr,
    locks: &LockTable,
    seq: &TrxIdSequence,
    args: &Args,
    stop: &AtomicBool,
) -> (usize, usize) {
    let mut rng = rand::thread_rng();
    let mut commits = 0usize;
    let mut aborts = 0usize;
    while !stop.load(Ordering::Relaxed) {
        let trx = seq.next_trx_id();
        let blk = BlockId::new("data.tbl", rng.gen_range(0..args.blocks));
        match run_trx(mgr, locks, &blk, trx) {
            Ok(()) => {
                commits += 1;
                if commits == args.count {
                    stop.store(true, Ordering::SeqCst); // notify others to stop.
                    break;
                }
            }
            Err(Error::LockAbort) | Err(Error::BufferAbort) => aborts += 1,
            Err(e) => panic!("worker failed: {}", e),
        }
    }
    (commits, aborts)
}

fn run_trx(mgr: &BufferMgr, locks: &LockTable, blk: &BlockId, trx: TrxID) -> Result<()> {
    locks.lock_exclusive(blk, trx)?;
    let res = modify_and_commit(mgr, blk, trx);
    locks.unlock(blk, trx);
    res
}

fn modify_and_commit(mgr: &BufferMgr, blk: &BlockId, trx: TrxID) -> Result<()> {
    let frame = mgr.pin(blk)?;
    frame.page()[0] = (trx % 251) as u8;
    // the transaction id doubles as the LSN of this workload's single
    // log record per transaction
    frame.set_modified(trx, Some(trx));
    mgr.unpin(&frame);
    mgr.flush_all(trx)
}

#[derive(Parser, Debug, Clone, Copy)]
#[command(version, about, long_about = None)]
struct Args {
    /// thread number to run transactions
    #[arg(short, long, default_value = "4")]
    threads: usize,

    /// Number of commits at least one thread should complete
    #[arg(short, long, default_value = "10000")]
    count: usize,

    /// number of frames in the buffer pool
    #[arg(short, long, default_value = "8")]
    buffers: usize,

    /// number of distinct blocks the workload touches
    #[arg(long, default_value = "32")]
    blocks: u64,
}

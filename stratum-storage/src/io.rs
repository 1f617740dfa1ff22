use crate::block::BlockId;
use crate::error::Result;

pub const BLOCK_SIZE: usize = 4 * 1024;
pub type Page = [u8; BLOCK_SIZE];
pub type LSN = u64;

/// Abstraction of raw block storage.
/// Blocks are fixed-size and addressed by [`BlockId`].
pub trait BlockStorage: Send + Sync + 'static {
    /// Read the contents of the given block into the page.
    fn read_block(&self, blk: &BlockId, page: &mut Page) -> Result<()>;

    /// Write the page back as the contents of the given block.
    fn write_block(&self, blk: &BlockId, page: &Page) -> Result<()>;
}

/// Abstraction of the write-ahead log.
/// It's responsible to persist log records and wait until they are durable.
pub trait WalLog: Send + Sync + 'static {
    /// Durably persist all log records up to and including the given LSN.
    /// A modified page must not be written back before this returns for
    /// the LSN recorded on its frame.
    fn flush_through(&self, lsn: LSN) -> Result<()>;
}

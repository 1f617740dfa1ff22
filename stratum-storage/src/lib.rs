pub mod block;
pub mod buffer;
pub mod error;
pub mod io;
pub mod mem_impl;
pub mod trx;

pub mod prelude {
    pub use crate::block::BlockId;
    pub use crate::buffer::frame::BufferFrame;
    pub use crate::buffer::{BufferMgr, DEFAULT_MAX_WAIT};
    pub use crate::error::{Error, Result};
    pub use crate::io::{BlockStorage, Page, WalLog, BLOCK_SIZE, LSN};
    pub use crate::trx::lock::{LockMode, LockTable};
    pub use crate::trx::{TrxID, TrxIdSequence, INVALID_TRX_ID};
}

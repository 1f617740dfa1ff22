use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, Error)]
pub enum Error {
    /// The buffer pool could not provide a frame within the wait bound.
    /// The requesting transaction should abort and may retry later.
    #[error("no buffer available within wait bound")]
    BufferAbort,
    /// The lock request conflicts with an older transaction's lock.
    /// Wait-Die requires the requester to die: roll back, release all
    /// locks and pins, then restart with a new transaction id.
    #[error("lock denied to prevent deadlock")]
    LockAbort,
    #[error("IO Error")]
    IOError,
}

impl From<std::io::Error> for Error {
    #[inline]
    fn from(_src: std::io::Error) -> Self {
        Error::IOError
    }
}

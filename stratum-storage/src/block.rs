use semistr::SemiStr;
use std::fmt;

/// Reference to a fixed-size unit of on-disk storage: a block number
/// within a named file. Immutable, compared and hashed by value, and
/// used as the key of both the buffer pool index and the lock table.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BlockId {
    file: SemiStr,
    number: u64,
}

impl BlockId {
    #[inline]
    pub fn new(file: &str, number: u64) -> Self {
        BlockId {
            file: SemiStr::new(file),
            number,
        }
    }

    /// Name of the file this block belongs to.
    #[inline]
    pub fn file(&self) -> &str {
        &self.file
    }

    /// Block number within the file.
    #[inline]
    pub fn number(&self) -> u64 {
        self.number
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[file {}, block {}]", self.file, self.number)
    }
}

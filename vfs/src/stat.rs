use crate::DirEntryType;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stat {
    pub mode: DirEntryType,
    /// File size
    pub size: u64,
    /// Optimal I/O block size
    pub block_size: u64,
    /// Occupying blocks
    pub blocks: u64,
    /// Time of last access
    pub accessed: i64,
    /// Time of last modification
    pub modified: i64,
    /// Time of creation
    pub created: i64,
}

use derive_more::{Add, Display, From, Into};

/// 块编号，同时也是块链表中的条目值。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Add, From, Into, Display)]
#[repr(transparent)]
pub struct BlockId(u32);

impl BlockId {
    /// 超级块所在的块
    pub const SUPER: Self = Self(0);

    /// 块链表的起始块
    pub const TABLE: Self = Self(1);

    /// 链尾，也表示空的空闲链表
    pub const EOF: Self = Self(u32::MAX);

    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u32 {
        self.0
    }

    pub const fn is_eof(self) -> bool {
        self.0 == u32::MAX
    }
}

impl core::ops::Add<u32> for BlockId {
    type Output = Self;

    fn add(self, rhs: u32) -> Self::Output {
        self + Self(rhs)
    }
}

impl From<BlockId> for usize {
    fn from(id: BlockId) -> Self {
        id.0 as usize
    }
}

impl From<BlockId> for u64 {
    fn from(id: BlockId) -> Self {
        id.0 as u64
    }
}

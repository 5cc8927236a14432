//! 块链表
//!
//! 每个块对应一个`u32`条目：已分配的块存放同一链上的下一块，
//! 链尾为[`BlockId::EOF`]；空闲块串成一条以`free_head`开头的空闲链表。
//! 调用者只能通过分配、延长、释放和遍历来使用它。

use alloc::vec;
use alloc::vec::Vec;
use core::mem;

use crate::volume::{get_u32, put_u32};
use crate::{BlockId, Error, Result};

#[derive(Debug, Clone)]
pub struct ChainTable {
    next: Vec<BlockId>,
    free_head: BlockId,
    free_blocks: u32,
    /// 超级块与块链表自身占用的块数，这些块永不进入空闲链表
    reserved: u32,
}

impl ChainTable {
    pub const ENTRY_SIZE: usize = mem::size_of::<u32>();

    /// 块链表需要占用的块数
    pub fn table_blocks(total_blocks: u32, block_size: usize) -> u32 {
        (total_blocks as usize * Self::ENTRY_SIZE).div_ceil(block_size) as u32
    }

    /// 构建全新的块链表。
    ///
    /// - 0号块自成一条链（超级块）
    /// - `1..=table_blocks`串成一条链（块链表自身）
    /// - 其余的块全部进入空闲链表
    pub fn format(total_blocks: u32, table_blocks: u32) -> Self {
        let reserved = 1 + table_blocks;
        let mut next = vec![BlockId::EOF; total_blocks as usize];

        for id in 1..table_blocks {
            next[id as usize] = BlockId::new(id + 1);
        }
        for id in reserved..total_blocks.saturating_sub(1) {
            next[id as usize] = BlockId::new(id + 1);
        }

        let free_blocks = total_blocks.saturating_sub(reserved);
        let free_head = if free_blocks == 0 {
            BlockId::EOF
        } else {
            BlockId::new(reserved)
        };

        Self {
            next,
            free_head,
            free_blocks,
            reserved,
        }
    }

    /// 从磁盘上的字节恢复块链表。
    pub fn decode(
        bytes: &[u8],
        total_blocks: u32,
        table_blocks: u32,
        free_head: BlockId,
        free_blocks: u32,
    ) -> Result<Self> {
        let len = total_blocks as usize * Self::ENTRY_SIZE;
        if bytes.len() < len {
            return Err(Error::Corrupted);
        }

        let next = (0..total_blocks as usize)
            .map(|i| BlockId::new(get_u32(bytes, i * Self::ENTRY_SIZE)))
            .collect();

        Ok(Self {
            next,
            free_head,
            free_blocks,
            reserved: 1 + table_blocks,
        })
    }

    pub fn encode(&self, buf: &mut [u8]) {
        buf.fill(0);
        for (i, id) in self.next.iter().enumerate() {
            put_u32(buf, i * Self::ENTRY_SIZE, id.raw());
        }
    }

    #[inline]
    pub fn total_blocks(&self) -> u32 {
        self.next.len() as u32
    }

    #[inline]
    pub fn free_blocks(&self) -> u32 {
        self.free_blocks
    }

    #[inline]
    pub fn free_head(&self) -> BlockId {
        self.free_head
    }

    /// 第一个可供分配的块
    #[inline]
    pub fn first_data_block(&self) -> BlockId {
        BlockId::new(self.reserved)
    }

    /// 从空闲链表头部摘下`n`块，组成一条以[`BlockId::EOF`]结尾的链并返回链头。
    pub fn allocate(&mut self, n: u32) -> Result<BlockId> {
        if n == 0 {
            return Err(Error::Malformed);
        }
        if n > self.free_blocks {
            log::warn!("allocate({n}) with only {} free block(s)", self.free_blocks);
            return Err(Error::OutOfSpace);
        }

        let head = self.free_head;
        let last = self.walk(head, n - 1)?;
        self.free_head = self.next[usize::from(last)];
        self.next[usize::from(last)] = BlockId::EOF;
        self.free_blocks -= n;

        log::debug!("allocated {n} block(s) at {head}, {} left", self.free_blocks);
        Ok(head)
    }

    /// 分配`n`块并接在链尾`last`之后，返回新块的链头。
    pub fn extend(&mut self, last: BlockId, n: u32) -> Result<BlockId> {
        let last = self.validate(last)?;
        if !self.next[usize::from(last)].is_eof() {
            return Err(Error::InvalidChain);
        }

        let head = self.allocate(n)?;
        self.next[usize::from(last)] = head;
        Ok(head)
    }

    /// 把以`start`开头的整条链归还给空闲链表，返回释放的块数。
    pub fn free(&mut self, start: BlockId) -> Result<u32> {
        let start = self.validate(start)?;
        if start < self.first_data_block() {
            return Err(Error::InvalidArgument);
        }

        let mut tail = start;
        let mut count = 1;
        while let Some(next) = self.next(tail)? {
            tail = next;
            count += 1;
            if count > self.total_blocks() {
                return Err(Error::InvalidChain);
            }
        }

        self.next[usize::from(tail)] = self.free_head;
        self.free_head = start;
        self.free_blocks += count;

        log::debug!("freed {count} block(s) from {start}");
        Ok(count)
    }

    /// 获取链上的下一块。`Ok(None)`表示`id`为链尾。
    pub fn next(&self, id: BlockId) -> Result<Option<BlockId>> {
        let id = self.validate(id)?;
        match self.next[usize::from(id)] {
            next if next.is_eof() => Ok(None),
            next => self.validate(next).map(Some),
        }
    }

    /// 从`start`出发沿链走`offset`步。
    pub fn walk(&self, start: BlockId, offset: u32) -> Result<BlockId> {
        let mut id = self.validate(start)?;
        for _ in 0..offset {
            id = self.next(id)?.ok_or(Error::InvalidChain)?;
        }
        Ok(id)
    }

    pub fn last(&self, start: BlockId) -> Result<BlockId> {
        let mut id = self.validate(start)?;
        let mut steps = 0;
        while let Some(next) = self.next(id)? {
            id = next;
            steps += 1;
            if steps >= self.total_blocks() {
                return Err(Error::InvalidChain);
            }
        }
        Ok(id)
    }

    pub fn len(&self, start: BlockId) -> Result<u32> {
        let mut id = self.validate(start)?;
        let mut len = 1;
        while let Some(next) = self.next(id)? {
            id = next;
            len += 1;
            if len > self.total_blocks() {
                return Err(Error::InvalidChain);
            }
        }
        Ok(len)
    }

    /// 链上前`count`块按物理连续性切成的若干段`(起始块, 块数)`。
    pub fn runs(&self, start: BlockId, count: u32) -> Result<Vec<(BlockId, u32)>> {
        let mut runs = Vec::new();
        if count == 0 {
            return Ok(runs);
        }

        let mut id = self.validate(start)?;
        let mut run = (id, 1);
        for _ in 1..count {
            let next = self.next(id)?.ok_or(Error::InvalidChain)?;
            if next.raw() == id.raw() + 1 {
                run.1 += 1;
            } else {
                runs.push(run);
                run = (next, 1);
            }
            id = next;
        }
        runs.push(run);

        Ok(runs)
    }

    /// 校验空闲链表：无环、不含保留块，且长度等于空闲块计数。
    pub fn check(&self) -> Result<()> {
        let mut visited = vec![false; self.next.len()];
        let mut id = self.free_head;
        let mut count = 0;

        while !id.is_eof() {
            let id_ = self.validate(id).map_err(|_| Error::Corrupted)?;
            if id_ < self.first_data_block() || visited[usize::from(id_)] {
                log::error!("free list revisits or reserves block {id_}");
                return Err(Error::Corrupted);
            }
            visited[usize::from(id_)] = true;
            count += 1;
            id = self.next[usize::from(id_)];
        }

        if count != self.free_blocks {
            log::error!(
                "free counter says {} but {count} block(s) are reachable",
                self.free_blocks
            );
            return Err(Error::Corrupted);
        }
        Ok(())
    }
}

impl ChainTable {
    fn validate(&self, id: BlockId) -> Result<BlockId> {
        if usize::from(id) < self.next.len() {
            Ok(id)
        } else {
            Err(Error::InvalidChain)
        }
    }
}

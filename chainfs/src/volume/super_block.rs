//! 超级块（卷控制块），位于#0块。

use crate::config::{MIN_BLOCK_SIZE, NAME_FIELD, SIGNATURE};
use crate::volume::{
    ChainTable, Directory, decode_name, encode_name, get_i64, get_u32, get_u64, put_i64, put_u32,
    put_u64,
};
use crate::{BlockId, Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuperBlock {
    /// 签名 0x286D8A17，区分已格式化的卷
    pub signature: u64,

    /// 卷的总块数
    pub block_total: u64,

    pub block_size: u32,

    /// 块链表的起始块，恒为1
    pub table_start: u32,

    /// 块链表占用的块数
    pub table_blocks: u32,

    pub free_blocks: u32,

    /// 空闲链表头
    /// - [`BlockId::EOF`] 表示没有空闲块
    pub free_head: BlockId,

    /// 根目录的首块
    pub root_location: BlockId,

    /// 根目录占用的块数
    pub root_blocks: u32,

    /// 最近一次挂载的时间
    pub mount_time: i64,

    volume_name: [u8; NAME_FIELD],
}

impl SuperBlock {
    /// 磁盘上的字节数
    pub const SIZE: usize = 56 + NAME_FIELD;

    pub fn new(block_total: u32, block_size: usize, table_blocks: u32, volume_name: &str) -> Self {
        Self {
            signature: SIGNATURE,
            block_total: block_total as u64,
            block_size: block_size as u32,
            table_start: BlockId::TABLE.raw(),
            table_blocks,
            free_blocks: 0,
            free_head: BlockId::EOF,
            root_location: BlockId::EOF,
            root_blocks: 0,
            mount_time: 0,
            volume_name: encode_name(volume_name),
        }
    }

    /// 带有签名即视为本文件系统的卷，无论其余字段是否完好。
    #[inline]
    pub fn is_signed(&self) -> bool {
        self.signature == SIGNATURE
    }

    /// 签名、块大小与块数都与设备吻合，且块链表与根目录的大小符合布局。
    pub fn is_valid(&self, block_size: usize, num_blocks: usize) -> bool {
        let Ok(total) = u32::try_from(num_blocks) else {
            return false;
        };
        self.is_signed()
            && self.block_size as usize == block_size
            && block_size >= MIN_BLOCK_SIZE
            && self.block_total == total as u64
            && self.table_start == BlockId::TABLE.raw()
            && self.table_blocks == ChainTable::table_blocks(total, block_size)
            && self.root_blocks == Directory::blocks(block_size)
            && self.root_location.raw() < total
    }

    pub fn volume_name(&self) -> &str {
        decode_name(&self.volume_name)
    }

    pub fn encode(&self, buf: &mut [u8]) {
        buf[..Self::SIZE].fill(0);
        put_u64(buf, 0, self.signature);
        put_u64(buf, 8, self.block_total);
        put_u32(buf, 16, self.block_size);
        put_u32(buf, 20, self.table_start);
        put_u32(buf, 24, self.table_blocks);
        put_u32(buf, 28, self.free_blocks);
        put_u32(buf, 32, self.free_head.raw());
        put_u32(buf, 36, self.root_location.raw());
        put_u32(buf, 40, self.root_blocks);
        put_i64(buf, 48, self.mount_time);
        buf[56..Self::SIZE].copy_from_slice(&self.volume_name);
    }

    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < Self::SIZE {
            return Err(Error::Corrupted);
        }

        let mut volume_name = [0; NAME_FIELD];
        volume_name.copy_from_slice(&buf[56..Self::SIZE]);
        // 名称字段的最后一个字节恒为NUL
        volume_name[NAME_FIELD - 1] = 0;

        Ok(Self {
            signature: get_u64(buf, 0),
            block_total: get_u64(buf, 8),
            block_size: get_u32(buf, 16),
            table_start: get_u32(buf, 20),
            table_blocks: get_u32(buf, 24),
            free_blocks: get_u32(buf, 28),
            free_head: BlockId::new(get_u32(buf, 32)),
            root_location: BlockId::new(get_u32(buf, 36)),
            root_blocks: get_u32(buf, 40),
            mount_time: get_i64(buf, 48),
            volume_name,
        })
    }
}

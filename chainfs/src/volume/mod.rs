//! 卷的布局
//!
//! 超级块(#0) | 块链表(#1..) | 数据区（根目录、其余目录与文件）
//!
//! 磁盘上的多字节整数一律为小端序，各记录逐字段编解码。

mod chain;
mod dir_entry;
mod super_block;

use alloc::vec;

pub use self::{
    chain::ChainTable,
    dir_entry::{DirEntry, Directory, EntryKind},
    super_block::SuperBlock,
};
use crate::config::{MIN_BLOCK_SIZE, NAME_CAP, NAME_FIELD};
use crate::disk::Disk;
use crate::{BlockId, Error, Result};

/// 已打开的卷：超级块与块链表常驻内存，另持有当前目录的快照。
#[derive(Debug)]
pub(crate) struct Volume {
    disk: Disk,
    sb: SuperBlock,
    table: ChainTable,
    cwd: Directory,
    clock: fn() -> i64,
}

impl Volume {
    /// 在设备上建立全新的卷，原有内容全部作废。
    pub fn format(disk: Disk, volume_name: &str, clock: fn() -> i64) -> Result<Self> {
        let block_size = disk.block_size();
        if block_size < MIN_BLOCK_SIZE {
            log::error!("block size {block_size} is below {MIN_BLOCK_SIZE}");
            return Err(Error::InvalidArgument);
        }
        let total = u32::try_from(disk.num_blocks())
            .ok()
            .filter(|&total| total < u32::MAX)
            .ok_or(Error::InvalidArgument)?;

        let table_blocks = ChainTable::table_blocks(total, block_size);
        let mut table = ChainTable::format(total, table_blocks);

        let root_blocks = Directory::blocks(block_size);
        let root_location = table.allocate(root_blocks)?;
        let now = clock();
        let root = DirEntry::new(
            ".",
            EntryKind::Directory,
            root_location,
            root_blocks,
            root_blocks as u64 * block_size as u64,
            now,
        );
        let root = Directory::new(&root, &root);

        let mut sb = SuperBlock::new(total, block_size, table_blocks, volume_name);
        sb.root_location = root_location;
        sb.root_blocks = root_blocks;
        sb.mount_time = now;

        let mut volume = Self {
            disk,
            sb,
            table,
            cwd: root.clone(),
            clock,
        };
        volume.write_directory(&root)?;
        volume.sync_meta()?;

        log::info!(
            "formatted `{}`: {total} blocks of {block_size} bytes, {} free",
            volume.sb.volume_name(),
            volume.table.free_blocks()
        );
        Ok(volume)
    }

    /// 读取已格式化的卷。签名、块大小或块数不符时返回[`Error::Corrupted`]。
    pub fn open(disk: Disk, clock: fn() -> i64) -> Result<Self> {
        let block_size = disk.block_size();
        if block_size < MIN_BLOCK_SIZE {
            return Err(Error::Corrupted);
        }

        let mut buf = vec![0; block_size];
        disk.read(BlockId::SUPER, &mut buf)?;
        let mut sb = SuperBlock::decode(&buf)?;
        if !sb.is_signed() {
            log::warn!("no volume found on device");
            return Err(Error::Corrupted);
        }
        if !sb.is_valid(block_size, disk.num_blocks()) {
            log::error!("superblock does not match the device geometry");
            return Err(Error::Corrupted);
        }

        let mut buf = vec![0; sb.table_blocks as usize * block_size];
        disk.read(BlockId::TABLE, &mut buf)?;
        let table = ChainTable::decode(
            &buf,
            sb.block_total as u32,
            sb.table_blocks,
            sb.free_head,
            sb.free_blocks,
        )?;

        let root = read_directory(&disk, &table, sb.root_location, sb.root_blocks)?;
        sb.mount_time = clock();
        let mut volume = Self {
            disk,
            sb,
            table,
            cwd: root,
            clock,
        };
        volume.sync_meta()?;

        log::info!(
            "opened `{}`: {} of {} blocks free",
            volume.sb.volume_name(),
            volume.table.free_blocks(),
            volume.sb.block_total
        );
        Ok(volume)
    }

    /// #0块是否带有本文件系统的签名
    pub fn is_formatted(disk: &Disk) -> Result<bool> {
        let block_size = disk.block_size();
        if block_size < MIN_BLOCK_SIZE {
            return Ok(false);
        }

        let mut buf = vec![0; block_size];
        disk.read(BlockId::SUPER, &mut buf)?;
        Ok(SuperBlock::decode(&buf)?.is_signed())
    }

    #[inline]
    pub fn super_block(&self) -> &SuperBlock {
        &self.sb
    }

    #[inline]
    pub fn table(&self) -> &ChainTable {
        &self.table
    }

    #[inline]
    pub(crate) fn disk(&self) -> &Disk {
        &self.disk
    }

    #[inline]
    pub fn block_size(&self) -> usize {
        self.disk.block_size()
    }

    #[inline]
    pub fn now(&self) -> i64 {
        (self.clock)()
    }

    /// 分配一条`n`块的链并立即持久化块链表。
    pub fn allocate(&mut self, n: u32) -> Result<BlockId> {
        let head = self.table.allocate(n)?;
        self.sync_meta()?;
        Ok(head)
    }

    /// 在链尾`last`之后追加`n`块。
    pub fn extend(&mut self, last: BlockId, n: u32) -> Result<BlockId> {
        let head = self.table.extend(last, n)?;
        self.sync_meta()?;
        Ok(head)
    }

    /// 归还整条链。
    pub fn release(&mut self, start: BlockId) -> Result<u32> {
        let count = self.table.free(start)?;
        self.sync_meta()?;
        Ok(count)
    }

    /// 将超级块与整张块链表写回磁盘。
    pub fn sync_meta(&mut self) -> Result<()> {
        let block_size = self.block_size();

        self.sb.free_blocks = self.table.free_blocks();
        self.sb.free_head = self.table.free_head();
        let mut buf = vec![0; block_size];
        self.sb.encode(&mut buf);
        self.disk.write(BlockId::SUPER, &buf)?;

        let mut buf = vec![0; self.sb.table_blocks as usize * block_size];
        self.table.encode(&mut buf);
        self.disk.write(BlockId::TABLE, &buf)
    }

    pub fn load_directory(&self, location: BlockId, num_blocks: u32) -> Result<Directory> {
        read_directory(&self.disk, &self.table, location, num_blocks)
    }

    pub fn load_root(&self) -> Result<Directory> {
        self.load_directory(self.sb.root_location, self.sb.root_blocks)
    }

    /// 写回目录数组；若它正是当前目录，一并刷新快照。
    pub fn write_directory(&mut self, dir: &Directory) -> Result<()> {
        let mut buf = vec![0; dir.num_blocks() as usize * self.block_size()];
        dir.encode(&mut buf);
        self.disk.write_chain(&self.table, dir.location(), &buf)?;

        if self.cwd.location() == dir.location() {
            self.cwd = dir.clone();
        }
        Ok(())
    }

    /// 分配并写出一个只含`.`与`..`的新目录，返回应装入`parent`的目录项。
    pub fn create_directory(&mut self, name: &str, parent: &Directory) -> Result<DirEntry> {
        let num_blocks = Directory::blocks(self.block_size());
        let location = self.allocate(num_blocks)?;
        let entry = DirEntry::new(
            name,
            EntryKind::Directory,
            location,
            num_blocks,
            num_blocks as u64 * self.block_size() as u64,
            self.now(),
        );

        let dir = Directory::new(&entry, parent.cwd());
        if let Err(e) = self.write_directory(&dir) {
            self.release(location)?;
            return Err(e);
        }
        Ok(entry)
    }

    #[inline]
    pub fn cwd(&self) -> &Directory {
        &self.cwd
    }

    pub fn set_cwd(&mut self, dir: Directory) {
        self.cwd = dir;
    }

    #[inline]
    pub fn is_root(&self, dir: &Directory) -> bool {
        dir.location() == self.sb.root_location
    }
}

fn read_directory(
    disk: &Disk,
    table: &ChainTable,
    location: BlockId,
    num_blocks: u32,
) -> Result<Directory> {
    let mut buf = vec![0; num_blocks as usize * disk.block_size()];
    disk.read_chain(table, location, &mut buf)?;
    Directory::decode(&buf)
}

#[inline]
pub(crate) fn get_u32(buf: &[u8], offset: usize) -> u32 {
    let mut bytes = [0; 4];
    bytes.copy_from_slice(&buf[offset..offset + 4]);
    u32::from_le_bytes(bytes)
}

#[inline]
pub(crate) fn get_u64(buf: &[u8], offset: usize) -> u64 {
    let mut bytes = [0; 8];
    bytes.copy_from_slice(&buf[offset..offset + 8]);
    u64::from_le_bytes(bytes)
}

#[inline]
pub(crate) fn get_i64(buf: &[u8], offset: usize) -> i64 {
    get_u64(buf, offset) as i64
}

#[inline]
pub(crate) fn put_u32(buf: &mut [u8], offset: usize, value: u32) {
    buf[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

#[inline]
pub(crate) fn put_u64(buf: &mut [u8], offset: usize, value: u64) {
    buf[offset..offset + 8].copy_from_slice(&value.to_le_bytes());
}

#[inline]
pub(crate) fn put_i64(buf: &mut [u8], offset: usize, value: i64) {
    put_u64(buf, offset, value as u64);
}

/// NUL填充的名称字段，超出[`NAME_CAP`]的部分被截断
pub(crate) fn encode_name(name: &str) -> [u8; NAME_FIELD] {
    let mut field = [0; NAME_FIELD];
    let len = name.len().min(NAME_CAP);
    field[..len].copy_from_slice(&name.as_bytes()[..len]);
    field
}

pub(crate) fn decode_name(field: &[u8]) -> &str {
    let len = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    match core::str::from_utf8(&field[..len]) {
        Ok(name) => name,
        // 截断可能切开多字节字符
        Err(e) => core::str::from_utf8(&field[..e.valid_up_to()]).unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use crate::config::{DIR_ENTRIES, DIR_ENTRY_SIZE};

    use super::*;

    #[test]
    fn volume() {
        assert!(SuperBlock::SIZE <= MIN_BLOCK_SIZE);
        assert_eq!(64 + NAME_FIELD, DIR_ENTRY_SIZE);
        assert_eq!(40, Directory::blocks(512));
        assert_eq!(5, Directory::blocks(4096));
        assert!(Directory::blocks(4096) as usize * 4096 >= DIR_ENTRIES * DIR_ENTRY_SIZE);
    }

    #[test]
    fn little_endian_fields() {
        let mut buf = [0; 16];
        put_u32(&mut buf, 0, 0x0403_0201);
        put_i64(&mut buf, 4, -2);
        assert_eq!([1, 2, 3, 4], buf[..4]);
        assert_eq!(0x0403_0201, get_u32(&buf, 0));
        assert_eq!(-2, get_i64(&buf, 4));
    }

    #[test]
    fn names() {
        let field = encode_name("hello");
        assert_eq!("hello", decode_name(&field));

        // 第255字节落在“中”的中间
        let name = alloc::format!("{}中", "a".repeat(254));
        let field = encode_name(&name);
        assert_eq!(254, decode_name(&field).len());
    }
}

//! 文件描述符与带单块缓冲区的读写
//!
//! 每次读写至多分三段进行：
//!
//! 1. 游标位于块中间时，先在缓冲区内完成块内剩余部分；
//! 2. 整块直接在调用者的切片与设备之间传输；
//! 3. 不足一块的尾部载入缓冲区再拷贝。
//!
//! 缓冲区采用写回策略：游标离开当前块、定位以及关闭时才写回设备。

use alloc::vec;
use alloc::vec::Vec;

use derive_more::{Display, From, Into};
use enumflags2::{BitFlags, bitflags};

use crate::control::MountedVolume;
use crate::path::Resolved;
use crate::volume::{DirEntry, Directory, EntryKind, Volume};
use crate::{BlockId, Error, Result};

#[rustfmt::skip]
#[allow(clippy::upper_case_acronyms)]
#[bitflags]
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenFlag {
    /// 只写
    WRONLY = 0b0000_0000_0001,
    /// 读写兼备
    RDWR   = 0b0000_0000_0010,
    /// 文件不存在时创建
    CREATE = 0b0010_0000_0000,
    /// 大小清零，保留已分配的块
    TRUNC  = 0b0100_0000_0000,
}

impl OpenFlag {
    // enumflags2拒绝值为0的标志
    /// 只读
    pub const RDONLY: u32 = 0b0000_0000_0000;

    #[inline]
    pub fn read_only() -> BitFlags<OpenFlag> {
        BitFlags::from_bits_truncate(Self::RDONLY)
    }

    /// `(可读, 可写)`
    fn access(flags: BitFlags<OpenFlag>) -> (bool, bool) {
        if flags.is_empty() {
            (true, false)
        } else if flags.contains(OpenFlag::WRONLY) {
            (false, true)
        } else {
            (true, true)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Whence {
    Set,
    Cur,
    /// 相对于文件大小
    End,
}

/// 文件描述符，即描述符表的索引
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, From, Into, Display)]
pub struct Fd(usize);

/// 文件控制块
#[derive(Debug)]
pub(crate) struct FileControlBlock {
    /// 目录项的副本
    pub entry: DirEntry,
    /// 父目录数组的副本
    parent: Directory,
    /// 在父目录中的槽位
    index: usize,

    buf: Vec<u8>,
    /// 缓冲区中是否为`block`的内容
    resident: bool,
    dirty: bool,

    /// 游标所在的块；越过块链时为`None`，等链延长后再行解析
    block: Option<BlockId>,
    /// 游标之前的整块数
    consumed: u32,
    /// 块内偏移，恒小于块大小
    offset: usize,

    readable: bool,
    writable: bool,
    /// 自上次写回以来是否写过数据
    wrote: bool,
    /// 打开时带了`TRUNC`，写回时大小以本描述符为准
    truncated: bool,
}

impl FileControlBlock {
    fn new(
        entry: DirEntry,
        parent: Directory,
        index: usize,
        block_size: usize,
        (readable, writable): (bool, bool),
    ) -> Self {
        Self {
            block: Some(entry.location),
            entry,
            parent,
            index,
            buf: vec![0; block_size],
            resident: false,
            dirty: false,
            consumed: 0,
            offset: 0,
            readable,
            writable,
            wrote: false,
            truncated: false,
        }
    }

    #[inline]
    fn block_size(&self) -> usize {
        self.buf.len()
    }

    /// 游标在文件中的字节位置
    #[inline]
    pub fn pos(&self) -> u64 {
        self.consumed as u64 * self.block_size() as u64 + self.offset as u64
    }

    pub fn read(&mut self, vol: &Volume, buf: &mut [u8]) -> Result<usize> {
        if !self.readable {
            return Err(Error::PermissionDenied);
        }

        let pos = self.pos();
        if pos >= self.entry.size {
            return Ok(0);
        }
        let n = (buf.len() as u64).min(self.entry.size - pos) as usize;
        let bs = self.block_size();
        self.entry.accessed = vol.now();
        let mut done = 0;

        if self.offset != 0 {
            self.load(vol)?;
            let len = (bs - self.offset).min(n);
            buf[..len].copy_from_slice(&self.buf[self.offset..self.offset + len]);
            self.advance(vol, len)?;
            done += len;
        }

        while n - done >= bs {
            if self.resident {
                self.flush(vol)?;
            }
            let block = self.current_block(vol)?;
            vol.disk().read(block, &mut buf[done..done + bs])?;
            self.leave_block(vol)?;
            done += bs;
        }

        if n > done {
            self.load(vol)?;
            let len = n - done;
            buf[done..n].copy_from_slice(&self.buf[..len]);
            self.offset = len;
            done = n;
        }

        Ok(done)
    }

    pub fn write(&mut self, vol: &mut Volume, data: &[u8]) -> Result<usize> {
        if !self.writable {
            return Err(Error::PermissionDenied);
        }
        if data.is_empty() {
            return Ok(0);
        }

        let pos = self.pos();
        let end = pos + data.len() as u64;
        self.ensure_capacity(vol, end)?;

        if pos > self.entry.size {
            self.zero_fill(vol, self.entry.size, pos)?;
        }
        self.write_raw(vol, data)?;

        self.entry.size = self.entry.size.max(end);
        self.entry.touch(vol.now());
        self.wrote = true;
        self.write_back(vol)?;

        Ok(data.len())
    }

    pub fn seek(&mut self, vol: &Volume, offset: i64, whence: Whence) -> Result<u64> {
        let base = match whence {
            Whence::Set => 0,
            Whence::Cur => self.pos(),
            Whence::End => {
                vol.table().len(self.entry.location)? as u64 * self.block_size() as u64
            }
        };
        let pos = i64::try_from(base)
            .ok()
            .and_then(|base| base.checked_add(offset))
            .filter(|&pos| pos >= 0)
            .ok_or(Error::InvalidArgument)? as u64;

        self.flush(vol)?;
        self.resident = false;
        self.set_cursor(vol, pos)?;
        Ok(pos)
    }

    /// 大小清零，保留已分配的块
    fn truncate(&mut self, now: i64) {
        self.entry.size = 0;
        self.entry.touch(now);
        self.truncated = true;
    }

    pub fn close(&mut self, vol: &mut Volume) -> Result<()> {
        self.flush(vol)?;
        self.write_back(vol)
    }
}

impl FileControlBlock {
    /// 保证文件至少拥有容纳`end`字节的块；优先成倍增长，空间不足时只补缺口。
    fn ensure_capacity(&mut self, vol: &mut Volume, end: u64) -> Result<()> {
        let need = end.div_ceil(self.block_size() as u64);
        if need <= self.entry.num_blocks as u64 {
            return Ok(());
        }
        // 同一文件的其他描述符可能已经延长了块链
        self.entry.num_blocks = vol.table().len(self.entry.location)?;
        let owned = self.entry.num_blocks as u64;
        if need <= owned {
            return Ok(());
        }

        let missing = u32::try_from(need - owned).map_err(|_| Error::OutOfSpace)?;
        let doubled = missing.max(self.entry.num_blocks);
        let last = vol.table().last(self.entry.location)?;

        let grown = match vol.extend(last, doubled) {
            Ok(_) => doubled,
            Err(Error::OutOfSpace) if doubled > missing => {
                vol.extend(last, missing)?;
                missing
            }
            Err(e) => return Err(e),
        };
        self.entry.num_blocks += grown;

        log::debug!(
            "grew `{}` by {grown} block(s) to {}",
            self.entry.name(),
            self.entry.num_blocks
        );
        Ok(())
    }

    /// 以零填满`[from, to)`，结束时游标位于`to`。
    fn zero_fill(&mut self, vol: &Volume, from: u64, to: u64) -> Result<()> {
        self.flush(vol)?;
        self.resident = false;
        self.set_cursor(vol, from)?;

        let zeros = vec![0; self.block_size()];
        let mut left = to - from;
        while left > 0 {
            let len = left.min(zeros.len() as u64) as usize;
            self.write_raw(vol, &zeros[..len])?;
            left -= len as u64;
        }
        Ok(())
    }

    fn write_raw(&mut self, vol: &Volume, data: &[u8]) -> Result<()> {
        let n = data.len();
        let bs = self.block_size();
        let mut done = 0;

        if self.offset != 0 {
            self.load(vol)?;
            let len = (bs - self.offset).min(n);
            self.buf[self.offset..self.offset + len].copy_from_slice(&data[..len]);
            self.dirty = true;
            self.advance(vol, len)?;
            done += len;
        }

        while n - done >= bs {
            // 整块覆盖，缓冲区中的旧内容作废
            self.resident = false;
            self.dirty = false;
            let block = self.current_block(vol)?;
            vol.disk().write(block, &data[done..done + bs])?;
            self.leave_block(vol)?;
            done += bs;
        }

        if n > done {
            self.load(vol)?;
            let len = n - done;
            self.buf[..len].copy_from_slice(&data[done..]);
            self.dirty = true;
            self.offset = len;
        }

        Ok(())
    }

    fn set_cursor(&mut self, vol: &Volume, pos: u64) -> Result<()> {
        let bs = self.block_size() as u64;
        self.consumed = u32::try_from(pos / bs).map_err(|_| Error::InvalidArgument)?;
        self.offset = (pos % bs) as usize;
        self.block = if self.consumed < self.entry.num_blocks {
            Some(vol.table().walk(self.entry.location, self.consumed)?)
        } else {
            None
        };
        Ok(())
    }

    fn current_block(&mut self, vol: &Volume) -> Result<BlockId> {
        match self.block {
            Some(block) => Ok(block),
            None => {
                let block = vol.table().walk(self.entry.location, self.consumed)?;
                self.block = Some(block);
                Ok(block)
            }
        }
    }

    fn load(&mut self, vol: &Volume) -> Result<()> {
        if !self.resident {
            let block = self.current_block(vol)?;
            vol.disk().read(block, &mut self.buf)?;
            self.resident = true;
            self.dirty = false;
        }
        Ok(())
    }

    fn flush(&mut self, vol: &Volume) -> Result<()> {
        if self.resident && self.dirty {
            let block = self.current_block(vol)?;
            vol.disk().write(block, &self.buf)?;
            self.dirty = false;
        }
        Ok(())
    }

    fn advance(&mut self, vol: &Volume, len: usize) -> Result<()> {
        self.offset += len;
        if self.offset == self.block_size() {
            self.leave_block(vol)?;
        }
        Ok(())
    }

    /// 游标移到下一块的开头
    fn leave_block(&mut self, vol: &Volume) -> Result<()> {
        self.flush(vol)?;
        self.resident = false;
        self.consumed += 1;
        self.offset = 0;
        self.block = match self.block {
            Some(block) => vol.table().next(block)?,
            None => None,
        };
        Ok(())
    }

    /// 从磁盘重新载入父目录，修补本文件的目录项。
    ///
    /// - 块数取块链的实际长度
    /// - 未写过的描述符只推进访问时间
    /// - 写过的描述符把大小推进到自己写到的位置，`TRUNC`则直接覆盖
    fn write_back(&mut self, vol: &mut Volume) -> Result<()> {
        let mut parent = vol.load_directory(self.parent.location(), self.parent.num_blocks())?;
        let slot = &mut parent[self.index];
        if slot.is_available() || slot.location != self.entry.location {
            log::warn!(
                "`{}` left slot {} of {}, skipping write-back",
                self.entry.name(),
                self.index,
                self.parent.location()
            );
            return Ok(());
        }

        slot.num_blocks = vol.table().len(self.entry.location)?;
        slot.accessed = slot.accessed.max(self.entry.accessed);
        if self.truncated {
            slot.size = self.entry.size;
            slot.modified = self.entry.modified;
        } else if self.wrote {
            slot.size = slot.size.max(self.entry.size);
            slot.modified = slot.modified.max(self.entry.modified);
        }

        self.entry.size = slot.size;
        self.entry.num_blocks = slot.num_blocks;
        self.truncated = false;
        self.wrote = false;

        vol.write_directory(&parent)?;
        self.parent = parent;
        Ok(())
    }
}

impl MountedVolume {
    /// 打开文件。
    ///
    /// - 空标志为只读，含`WRONLY`为只写，其余为读写
    /// - 不存在且未给`CREATE`时返回[`Error::NotFound`]
    /// - `TRUNC`把大小清零，但保留已分配的块
    pub fn open(&mut self, path: &str, flags: BitFlags<OpenFlag>) -> Result<Fd> {
        if self.files.is_full() {
            return Err(Error::NoDescriptors);
        }

        let resolved = self.volume.resolve(path)?;
        let (parent, index) = match resolved.index {
            Some(index) if resolved.dir[index].is_dir() => return Err(Error::NotAFile),
            Some(index) => (resolved.dir, index),
            None if flags.contains(OpenFlag::CREATE) => self.create_file(resolved)?,
            None => return Err(Error::NotFound),
        };

        let entry = parent[index].clone();
        let mut file = FileControlBlock::new(
            entry,
            parent,
            index,
            self.volume.block_size(),
            OpenFlag::access(flags),
        );
        if flags.contains(OpenFlag::TRUNC) {
            file.truncate(self.volume.now());
            file.write_back(&mut self.volume)?;
        }

        let fd = self.files.insert(file).ok_or(Error::NoDescriptors)?;
        log::debug!("opened `{path}` as fd {fd}");
        Ok(Fd(fd))
    }

    /// 读取至多`buf.len()`字节，位于文件末尾及之后时返回0。
    pub fn read(&mut self, fd: Fd, buf: &mut [u8]) -> Result<usize> {
        let file = self.files.get_mut(fd.0).ok_or(Error::InvalidDescriptor)?;
        file.read(&self.volume, buf)
    }

    pub fn write(&mut self, fd: Fd, data: &[u8]) -> Result<usize> {
        let file = self.files.get_mut(fd.0).ok_or(Error::InvalidDescriptor)?;
        file.write(&mut self.volume, data)
    }

    /// 返回新的位置；结果为负时返回[`Error::InvalidArgument`]。
    pub fn seek(&mut self, fd: Fd, offset: i64, whence: Whence) -> Result<u64> {
        let file = self.files.get_mut(fd.0).ok_or(Error::InvalidDescriptor)?;
        file.seek(&self.volume, offset, whence)
    }

    pub fn tell(&self, fd: Fd) -> Result<u64> {
        self.files
            .get(fd.0)
            .map(FileControlBlock::pos)
            .ok_or(Error::InvalidDescriptor)
    }

    /// 写回缓冲区与目录项，释放描述符。
    pub fn close(&mut self, fd: Fd) -> Result<()> {
        let mut file = self.files.remove(fd.0).ok_or(Error::InvalidDescriptor)?;
        file.close(&mut self.volume)?;
        self.volume.sync_meta()?;
        log::debug!("closed fd {fd}");
        Ok(())
    }

    /// 在解析出的目录中新建空文件，返回更新后的目录及槽位。
    fn create_file(&mut self, resolved: Resolved) -> Result<(Directory, usize)> {
        let Resolved { mut dir, name, .. } = resolved;
        let index = dir.free_slot().ok_or(Error::NoDirectorySlot)?;

        let num_blocks = self.opts.default_file_blocks.max(1);
        let location = self.volume.allocate(num_blocks)?;
        dir[index] = DirEntry::new(
            &name,
            EntryKind::File,
            location,
            num_blocks,
            0,
            self.volume.now(),
        );

        if let Err(e) = self.volume.write_directory(&dir) {
            self.volume.release(location)?;
            return Err(e);
        }

        log::debug!("created `{name}` at {location} with {num_blocks} block(s)");
        Ok((dir, index))
    }

    /// 以`location`为首块的文件是否仍被打开
    pub(crate) fn is_open(&self, location: BlockId) -> bool {
        self.files
            .iter()
            .any(|(_, file)| file.entry.location == location)
    }
}

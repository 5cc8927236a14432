//! 目录项与目录数组
//!
//! 每个目录都是一条普通的块链，内容为[`DIR_ENTRIES`]个定长目录项。
//! `[0]`恒为`.`，`[1]`恒为`..`，二者永不空闲。

use alloc::vec::Vec;
use core::ops::{Index, IndexMut};

use vfs::{DirEntryType, Stat};

use crate::config::{DIR_ENTRIES, DIR_ENTRY_SIZE, NAME_FIELD};
use crate::volume::{decode_name, encode_name, get_i64, get_u32, get_u64, put_i64, put_u32, put_u64};
use crate::{BlockId, Error, Result};

const CWD_NAME: &str = ".";
const PARENT_NAME: &str = "..";

const NAME_OFFSET: usize = 64;

/// 目录项的类型标签
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum EntryKind {
    File = b'f',
    Directory = b'd',
    #[default]
    Available = b'a',
}

impl TryFrom<u8> for EntryKind {
    type Error = Error;

    fn try_from(tag: u8) -> Result<Self> {
        match tag {
            b'f' => Ok(Self::File),
            b'd' => Ok(Self::Directory),
            b'a' => Ok(Self::Available),
            _ => Err(Error::Corrupted),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub created: i64,
    pub modified: i64,
    pub accessed: i64,

    /// 首块，空闲项为[`BlockId::EOF`]
    pub location: BlockId,

    /// 文件的字节数；目录恒为`num_blocks * block_size`
    pub size: u64,

    pub num_blocks: u32,

    pub kind: EntryKind,

    name: [u8; NAME_FIELD],
}

impl Default for DirEntry {
    fn default() -> Self {
        Self::available()
    }
}

impl DirEntry {
    pub fn new(name: &str, kind: EntryKind, location: BlockId, num_blocks: u32, size: u64, now: i64) -> Self {
        Self {
            created: now,
            modified: now,
            accessed: now,
            location,
            size,
            num_blocks,
            kind,
            name: encode_name(name),
        }
    }

    /// 空闲项：空名，零大小，零块
    pub fn available() -> Self {
        Self {
            created: 0,
            modified: 0,
            accessed: 0,
            location: BlockId::EOF,
            size: 0,
            num_blocks: 0,
            kind: EntryKind::Available,
            name: [0; NAME_FIELD],
        }
    }

    pub fn name(&self) -> &str {
        decode_name(&self.name)
    }

    pub fn rename(&mut self, name: &str) {
        self.name = encode_name(name);
    }

    #[inline]
    pub fn is_available(&self) -> bool {
        self.kind == EntryKind::Available
    }

    #[inline]
    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }

    #[inline]
    pub fn is_file(&self) -> bool {
        self.kind == EntryKind::File
    }

    pub fn is_relative(&self) -> bool {
        matches!(self.name(), CWD_NAME | PARENT_NAME)
    }

    /// 清空并标记为空闲
    pub fn release(&mut self) {
        *self = Self::available();
    }

    /// 以自身为内容的`.`
    pub fn as_cwd(&self) -> Self {
        let mut cwd = self.clone();
        cwd.rename(CWD_NAME);
        cwd
    }

    /// 以自身为内容的`..`
    pub fn as_parent(&self) -> Self {
        let mut parent = self.clone();
        parent.rename(PARENT_NAME);
        parent
    }

    pub fn touch(&mut self, now: i64) {
        self.modified = now;
        self.accessed = now;
    }

    pub fn dirent_type(&self) -> DirEntryType {
        if self.is_dir() {
            DirEntryType::Directory
        } else {
            DirEntryType::Regular
        }
    }

    pub fn stat(&self, block_size: usize) -> Stat {
        Stat {
            mode: self.dirent_type(),
            size: self.size,
            block_size: block_size as u64,
            blocks: self.num_blocks as u64,
            accessed: self.accessed,
            modified: self.modified,
            created: self.created,
        }
    }

    pub fn encode(&self, buf: &mut [u8]) {
        buf[..DIR_ENTRY_SIZE].fill(0);
        put_i64(buf, 0, self.created);
        put_i64(buf, 8, self.modified);
        put_i64(buf, 16, self.accessed);
        put_u64(buf, 24, self.location.raw() as u64);
        put_u64(buf, 32, self.size);
        put_u32(buf, 40, self.num_blocks);
        buf[44] = self.kind as u8;
        buf[NAME_OFFSET..DIR_ENTRY_SIZE].copy_from_slice(&self.name);
    }

    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < DIR_ENTRY_SIZE {
            return Err(Error::Corrupted);
        }

        let location = u32::try_from(get_u64(buf, 24)).map_err(|_| Error::Corrupted)?;
        let mut name = [0; NAME_FIELD];
        name.copy_from_slice(&buf[NAME_OFFSET..DIR_ENTRY_SIZE]);
        name[NAME_FIELD - 1] = 0;

        Ok(Self {
            created: get_i64(buf, 0),
            modified: get_i64(buf, 8),
            accessed: get_i64(buf, 16),
            location: BlockId::new(location),
            size: get_u64(buf, 32),
            num_blocks: get_u32(buf, 40),
            kind: EntryKind::try_from(buf[44])?,
            name,
        })
    }
}

/// 目录数组：一个目录在内存中的完整映像
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directory {
    entries: Vec<DirEntry>,
}

impl Directory {
    /// 一个目录占用的块数
    pub fn blocks(block_size: usize) -> u32 {
        (DIR_ENTRIES * DIR_ENTRY_SIZE).div_ceil(block_size) as u32
    }

    /// 只含`.`与`..`的新目录。`this`为新目录自己的目录项。
    pub fn new(this: &DirEntry, parent: &DirEntry) -> Self {
        let mut entries = Vec::with_capacity(DIR_ENTRIES);
        entries.push(this.as_cwd());
        entries.push(parent.as_parent());
        entries.resize_with(DIR_ENTRIES, DirEntry::available);
        Self { entries }
    }

    /// 即`.`指向的首块
    #[inline]
    pub fn location(&self) -> BlockId {
        self.entries[0].location
    }

    #[inline]
    pub fn num_blocks(&self) -> u32 {
        self.entries[0].num_blocks
    }

    #[inline]
    pub fn cwd(&self) -> &DirEntry {
        &self.entries[0]
    }

    #[inline]
    pub fn parent(&self) -> &DirEntry {
        &self.entries[1]
    }

    /// 按名称精确查找非空闲项
    pub fn find(&self, name: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|entry| !entry.is_available() && entry.name() == name)
    }

    /// 第一个空闲项
    pub fn free_slot(&self) -> Option<usize> {
        self.entries
            .iter()
            .skip(2)
            .position(DirEntry::is_available)
            .map(|i| i + 2)
    }

    /// 除`.`与`..`外没有任何项
    pub fn is_empty(&self) -> bool {
        self.entries.iter().skip(2).all(DirEntry::is_available)
    }

    pub fn entries(&self) -> &[DirEntry] {
        &self.entries
    }

    pub fn encode(&self, buf: &mut [u8]) {
        buf.fill(0);
        for (entry, chunk) in self.entries.iter().zip(buf.chunks_exact_mut(DIR_ENTRY_SIZE)) {
            entry.encode(chunk);
        }
    }

    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < DIR_ENTRIES * DIR_ENTRY_SIZE {
            return Err(Error::Corrupted);
        }

        let entries = buf
            .chunks_exact(DIR_ENTRY_SIZE)
            .take(DIR_ENTRIES)
            .map(DirEntry::decode)
            .collect::<Result<Vec<_>>>()?;

        if entries[0].is_available() || entries[1].is_available() {
            log::error!("directory without `.` or `..`");
            return Err(Error::Corrupted);
        }

        Ok(Self { entries })
    }
}

impl Index<usize> for Directory {
    type Output = DirEntry;

    fn index(&self, index: usize) -> &Self::Output {
        &self.entries[index]
    }
}

impl IndexMut<usize> for Directory {
    fn index_mut(&mut self, index: usize) -> &mut Self::Output {
        &mut self.entries[index]
    }
}

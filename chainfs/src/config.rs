//! 磁盘布局常量与挂载选项

use alloc::string::String;

/// 已格式化卷的签名
pub const SIGNATURE: u64 = 0x286D_8A17;

/// 超级块需要完整放进一块
pub const MIN_BLOCK_SIZE: usize = 512;

/// 每个目录的目录项数，含`.`与`..`
pub const DIR_ENTRIES: usize = 64;

/// 磁盘上一个目录项的字节数
pub const DIR_ENTRY_SIZE: usize = 320;

/// 名称字段的字节数，最后一个字节恒为NUL
pub const NAME_FIELD: usize = 256;

/// 名称最长字节数
pub const NAME_CAP: usize = NAME_FIELD - 1;

pub const MAX_OPEN_FILES: usize = 20;

/// 新建文件时预先分配的块数
pub const DEFAULT_FILE_BLOCKS: u32 = 128;

pub const DEFAULT_VOLUME_NAME: &str = "MyVolume";

pub const SEPARATOR: char = '/';

#[derive(Debug, Clone)]
pub struct MountOptions {
    /// 仅在格式化时写入超级块
    pub volume_name: String,
    pub default_file_blocks: u32,
    pub max_open_files: usize,
    /// 时间戳来源，单位为秒。`no_std`下没有系统时钟，由使用者注入。
    pub clock: fn() -> i64,
}

impl Default for MountOptions {
    fn default() -> Self {
        Self {
            volume_name: String::from(DEFAULT_VOLUME_NAME),
            default_file_blocks: DEFAULT_FILE_BLOCKS,
            max_open_files: MAX_OPEN_FILES,
            clock: epoch,
        }
    }
}

impl MountOptions {
    pub fn with_clock(mut self, clock: fn() -> i64) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_volume_name(mut self, name: &str) -> Self {
        self.volume_name = String::from(name);
        self
    }

    pub fn with_default_file_blocks(mut self, blocks: u32) -> Self {
        self.default_file_blocks = blocks;
        self
    }

    pub fn with_max_open_files(mut self, max: usize) -> Self {
        self.max_open_files = max;
        self
    }
}

fn epoch() -> i64 {
    0
}

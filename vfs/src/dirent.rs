use alloc::string::String;

/// 遍历目录时交给调用者的目录项
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub ty: DirEntryType,
    /// 该项所指向的块数
    pub reclen: u32,
}

impl DirEntry {
    /// 名称最长为255字节
    pub const NAME_CAP: usize = 255;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum DirEntryType {
    Directory,
    #[default]
    Regular,
}

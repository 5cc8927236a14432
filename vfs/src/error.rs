use core::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    NotFound,
    AlreadyExists,
    NotADirectory,
    NotAFile,
    DirectoryNotEmpty,
    /// 没有足够的空闲块
    OutOfSpace,
    /// 目录项已满
    NoDirectorySlot,
    /// 文件描述符表已满
    NoDescriptors,
    InvalidDescriptor,
    /// 沿块链行走时越过了链尾
    InvalidChain,
    /// 块设备读写的块数与请求不符
    DeviceError,
    Malformed,
    InvalidArgument,
    PermissionDenied,
    Busy,
    /// 超级块签名或几何参数不符
    Corrupted,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            Error::NotFound => "no such file or directory",
            Error::AlreadyExists => "file or directory already exists",
            Error::NotADirectory => "not a directory",
            Error::NotAFile => "not a regular file",
            Error::DirectoryNotEmpty => "directory not empty",
            Error::OutOfSpace => "not enough free blocks",
            Error::NoDirectorySlot => "no available slot in directory",
            Error::NoDescriptors => "no free file descriptors",
            Error::InvalidDescriptor => "bad file descriptor",
            Error::InvalidChain => "walked past the end of a block chain",
            Error::DeviceError => "short block device transfer",
            Error::Malformed => "malformed path or argument",
            Error::InvalidArgument => "invalid argument",
            Error::PermissionDenied => "descriptor not opened for this access",
            Error::Busy => "resource busy",
            Error::Corrupted => "volume metadata is corrupted",
        };
        f.write_str(msg)
    }
}

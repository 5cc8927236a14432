//! # chainfs
//!
//! 直接建立在LBA块设备之上的块链式文件系统。
//!
//! ## 分层（自下而上）
//!
//! 1. 块设备层：[`block_dev::BlockDevice`]，由使用者提供
//! 2. 磁盘层：检查每次传输的块数，并合并物理连续的块链
//! 3. 卷层：超级块、块链表（兼任空闲链表）、目录数组
//! 4. 路径层：沿目录树解析`/`分隔的路径
//! 5. 文件描述符层：带单块缓冲区的读写、定位
//! 6. [`MountedVolume`]：挂载、卸载与全部对外操作
//!
//! 整个卷的状态都归[`MountedVolume`]所有，没有全局变量。

#![no_std]

extern crate alloc;

mod block;
pub mod config;
mod control;
mod dir;
mod disk;
mod file;
mod path;
mod slot;
pub mod volume;

pub use self::{
    block::BlockId,
    config::MountOptions,
    control::{MountedVolume, SharedVolume},
    dir::DirStream,
    file::{Fd, OpenFlag, Whence},
    path::Resolved,
};
pub use vfs::Error;

pub type Result<T> = core::result::Result<T, Error>;

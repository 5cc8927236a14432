use alloc::sync::Arc;

use block_dev::BlockDevice;
use spin::Mutex;

use crate::config::MountOptions;
use crate::disk::Disk;
use crate::file::{Fd, FileControlBlock};
use crate::path::Resolved;
use crate::slot::SlotVec;
use crate::volume::{ChainTable, SuperBlock, Volume};
use crate::Result;

/// 多线程宿主共享同一个卷时使用的粗粒度锁
pub type SharedVolume = Arc<Mutex<MountedVolume>>;

/// 已挂载的卷，持有全部状态：块链表、当前目录与文件描述符表。
#[derive(Debug)]
pub struct MountedVolume {
    pub(crate) volume: Volume,
    pub(crate) files: SlotVec<FileControlBlock>,
    pub(crate) opts: MountOptions,
}

impl MountedVolume {
    /// 格式化设备并挂载。
    pub fn format(dev: Arc<dyn BlockDevice>, opts: MountOptions) -> Result<Self> {
        let volume = Volume::format(Disk::new(dev), &opts.volume_name, opts.clock)?;
        Ok(Self::with_volume(volume, opts))
    }

    /// 挂载已格式化的卷，签名不符时返回[`Error::Corrupted`](crate::Error::Corrupted)。
    pub fn load(dev: Arc<dyn BlockDevice>, opts: MountOptions) -> Result<Self> {
        let volume = Volume::open(Disk::new(dev), opts.clock)?;
        Ok(Self::with_volume(volume, opts))
    }

    /// 挂载卷；#0块没有签名时先格式化。
    ///
    /// 带签名但已损坏的卷返回[`Error::Corrupted`](crate::Error::Corrupted)，不会被格式化。
    pub fn mount(dev: Arc<dyn BlockDevice>, opts: MountOptions) -> Result<Self> {
        let disk = Disk::new(Arc::clone(&dev));
        if !Volume::is_formatted(&disk)? {
            log::info!("no volume on device, formatting");
            return Self::format(dev, opts);
        }

        let volume = Volume::open(disk, opts.clock)?;
        Ok(Self::with_volume(volume, opts))
    }

    /// 关闭所有仍打开的文件并写回元数据。
    ///
    /// 尽力而为：出错时记录警告并继续，最后返回遇到的第一个错误。
    pub fn unmount(mut self) -> Result<()> {
        let mut first = None;
        if !self.files.is_empty() {
            log::info!("closing {} open file(s)", self.files.len());
        }

        for index in self.files.indices() {
            let Some(mut file) = self.files.remove(index) else {
                continue;
            };
            if let Err(e) = file.close(&mut self.volume) {
                log::warn!("failed to close fd {index} on unmount: {e}");
                first.get_or_insert(e);
            }
        }

        if let Err(e) = self.volume.sync_meta() {
            log::warn!("failed to write metadata on unmount: {e}");
            first.get_or_insert(e);
        }

        log::info!("unmounted `{}`", self.volume.super_block().volume_name());
        first.map_or(Ok(()), Err)
    }

    pub fn into_shared(self) -> SharedVolume {
        Arc::new(Mutex::new(self))
    }

    #[inline]
    pub fn super_block(&self) -> &SuperBlock {
        self.volume.super_block()
    }

    #[inline]
    pub fn chain_table(&self) -> &ChainTable {
        self.volume.table()
    }

    #[inline]
    pub fn free_blocks(&self) -> u32 {
        self.volume.table().free_blocks()
    }

    #[inline]
    pub fn block_size(&self) -> usize {
        self.volume.block_size()
    }

    /// 解析路径，返回末级名称所在的目录数组及其槽位。
    pub fn resolve(&self, path: &str) -> Result<Resolved> {
        self.volume.resolve(path)
    }

    /// 当前打开的文件描述符
    pub fn open_files(&self) -> impl Iterator<Item = Fd> + '_ {
        self.files.iter().map(|(i, _)| Fd::from(i))
    }

    /// 校验块链表的空闲计数与空闲链表。
    pub fn check(&self) -> Result<()> {
        self.volume.table().check()
    }
}

impl MountedVolume {
    fn with_volume(volume: Volume, opts: MountOptions) -> Self {
        Self {
            files: SlotVec::with_capacity(opts.max_open_files),
            volume,
            opts,
        }
    }
}

//! 磁盘层：对块设备的每次传输做块数校验

use alloc::sync::Arc;

use block_dev::BlockDevice;

use crate::volume::ChainTable;
use crate::{BlockId, Error, Result};

#[derive(Debug, Clone)]
pub struct Disk {
    /// 底层块设备的引用
    dev: Arc<dyn BlockDevice>,
    block_size: usize,
}

impl Disk {
    pub fn new(dev: Arc<dyn BlockDevice>) -> Self {
        let block_size = dev.block_size();
        Self { dev, block_size }
    }

    #[inline]
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    #[inline]
    pub fn num_blocks(&self) -> usize {
        self.dev.num_blocks()
    }

    /// 从`start`起连续读取`buf.len() / block_size`块。
    pub fn read(&self, start: BlockId, buf: &mut [u8]) -> Result<()> {
        let count = self.count_of(buf.len())?;
        let read = self.dev.read_blocks(buf, count, start.into());
        if read != count {
            log::error!("short read at block {start}: {read}/{count}");
            return Err(Error::DeviceError);
        }
        log::trace!("read {count} block(s) at {start}");
        Ok(())
    }

    /// 从`start`起连续写入`buf.len() / block_size`块。
    pub fn write(&self, start: BlockId, buf: &[u8]) -> Result<()> {
        let count = self.count_of(buf.len())?;
        let written = self.dev.write_blocks(buf, count, start.into());
        if written != count {
            log::error!("short write at block {start}: {written}/{count}");
            return Err(Error::DeviceError);
        }
        log::trace!("wrote {count} block(s) at {start}");
        Ok(())
    }

    /// 沿块链读取，物理连续的部分合并为一次传输。
    pub fn read_chain(&self, table: &ChainTable, start: BlockId, buf: &mut [u8]) -> Result<()> {
        let count = self.count_of(buf.len())? as u32;
        let mut offset = 0;
        for (first, len) in table.runs(start, count)? {
            let bytes = len as usize * self.block_size;
            self.read(first, &mut buf[offset..offset + bytes])?;
            offset += bytes;
        }
        Ok(())
    }

    /// 沿块链写入，物理连续的部分合并为一次传输。
    pub fn write_chain(&self, table: &ChainTable, start: BlockId, buf: &[u8]) -> Result<()> {
        let count = self.count_of(buf.len())? as u32;
        let mut offset = 0;
        for (first, len) in table.runs(start, count)? {
            let bytes = len as usize * self.block_size;
            self.write(first, &buf[offset..offset + bytes])?;
            offset += bytes;
        }
        Ok(())
    }

    fn count_of(&self, len: usize) -> Result<usize> {
        if len % self.block_size != 0 {
            log::error!("transfer of {len} bytes is not block aligned");
            return Err(Error::InvalidArgument);
        }
        Ok(len / self.block_size)
    }
}

#![no_std]

use core::fmt::Debug;

/// 以块为单位读写的存储设备。
///
/// 所有传输都是块大小的整数倍，不存在部分块。
/// 返回值为实际传输的块数，与请求的`count`不等即视为设备错误。
pub trait BlockDevice: Debug + Send + Sync {
    /// 每块的字节数
    fn block_size(&self) -> usize;

    /// 设备的总块数
    fn num_blocks(&self) -> usize;

    /// 从`start`块起读取`count`块至`buf`。
    ///
    /// `buf.len()`至少为`count * block_size()`。
    fn read_blocks(&self, buf: &mut [u8], count: usize, start: usize) -> usize;

    /// 将`buf`的前`count`块写入`start`块起的位置。
    fn write_blocks(&self, buf: &[u8], count: usize, start: usize) -> usize;
}

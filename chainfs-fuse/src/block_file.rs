use std::cell::RefCell;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};

use block_dev::BlockDevice;
use chainfs::config::MIN_BLOCK_SIZE;
use send_wrapper::SendWrapper;

/// 以宿主文件充当块设备
#[derive(Debug)]
pub struct BlockFile {
    inner: SendWrapper<RefCell<File>>,
    block_size: usize,
    num_blocks: usize,
}

impl BlockFile {
    pub fn new(fd: File, block_size: usize) -> io::Result<Self> {
        check_block_size(block_size)?;
        let num_blocks = fd.metadata()?.len() as usize / block_size;
        Ok(Self {
            inner: SendWrapper::new(RefCell::new(fd)),
            block_size,
            num_blocks,
        })
    }

    fn transfer<F>(&self, start: usize, count: usize, f: F) -> usize
    where
        F: FnOnce(&mut File) -> io::Result<()>,
    {
        if start + count > self.num_blocks {
            log::error!("blocks {start}..{} out of range", start + count);
            return 0;
        }

        let mut file = self.inner.borrow_mut();
        let result = file
            .seek(SeekFrom::Start((start * self.block_size) as u64))
            .and_then(|_| f(&mut file));
        match result {
            Ok(()) => count,
            Err(e) => {
                log::error!("image I/O at block {start} failed: {e}");
                0
            }
        }
    }
}

impl BlockDevice for BlockFile {
    fn block_size(&self) -> usize {
        self.block_size
    }

    fn num_blocks(&self) -> usize {
        self.num_blocks
    }

    fn read_blocks(&self, buf: &mut [u8], count: usize, start: usize) -> usize {
        let len = count * self.block_size;
        self.transfer(start, count, |file| file.read_exact(&mut buf[..len]))
    }

    fn write_blocks(&self, buf: &[u8], count: usize, start: usize) -> usize {
        let len = count * self.block_size;
        self.transfer(start, count, |file| file.write_all(&buf[..len]))
    }
}

/// 块大小不得小于[`MIN_BLOCK_SIZE`]
pub fn check_block_size(block_size: usize) -> io::Result<()> {
    if block_size < MIN_BLOCK_SIZE {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("block size {block_size} is below {MIN_BLOCK_SIZE}"),
        ));
    }
    Ok(())
}

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

use block_dev::BlockDevice;
use chainfs::{MountOptions, MountedVolume};

pub const BLOCK_SIZE: usize = 512;

/// 8 MiB
pub const NUM_BLOCKS: usize = 16 * 1024;

/// 内存中的块设备
#[derive(Debug)]
pub struct RamDisk {
    data: Mutex<Vec<u8>>,
    block_size: usize,
    /// 置位后所有传输都只完成0块
    broken: AtomicBool,
}

impl RamDisk {
    pub fn new(block_size: usize, num_blocks: usize) -> Arc<Self> {
        Arc::new(Self {
            data: Mutex::new(vec![0; block_size * num_blocks]),
            block_size,
            broken: AtomicBool::new(false),
        })
    }

    pub fn set_broken(&self, broken: bool) {
        self.broken.store(broken, Ordering::SeqCst);
    }

    /// 绕过文件系统直接改写原始字节
    pub fn poke(&self, offset: usize, bytes: &[u8]) {
        let mut data = self.data.lock().unwrap();
        data[offset..offset + bytes.len()].copy_from_slice(bytes);
    }

    /// 直接读取某块的原始内容
    pub fn raw_block(&self, id: usize) -> Vec<u8> {
        let data = self.data.lock().unwrap();
        data[id * self.block_size..(id + 1) * self.block_size].to_vec()
    }
}

impl BlockDevice for RamDisk {
    fn block_size(&self) -> usize {
        self.block_size
    }

    fn num_blocks(&self) -> usize {
        self.data.lock().unwrap().len() / self.block_size
    }

    fn read_blocks(&self, buf: &mut [u8], count: usize, start: usize) -> usize {
        if self.broken.load(Ordering::SeqCst) {
            return 0;
        }
        let data = self.data.lock().unwrap();
        let from = start * self.block_size;
        let len = count * self.block_size;
        if from + len > data.len() {
            return 0;
        }
        buf[..len].copy_from_slice(&data[from..from + len]);
        count
    }

    fn write_blocks(&self, buf: &[u8], count: usize, start: usize) -> usize {
        if self.broken.load(Ordering::SeqCst) {
            return 0;
        }
        let mut data = self.data.lock().unwrap();
        let from = start * self.block_size;
        let len = count * self.block_size;
        if from + len > data.len() {
            return 0;
        }
        data[from..from + len].copy_from_slice(&buf[..len]);
        count
    }
}

static NOW: AtomicI64 = AtomicI64::new(1_700_000_000);

/// 每次调用都前进一秒的时钟
pub fn tick() -> i64 {
    NOW.fetch_add(1, Ordering::SeqCst) + 1
}

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn options() -> MountOptions {
    MountOptions::default().with_clock(tick)
}

pub fn format() -> (Arc<RamDisk>, MountedVolume) {
    format_with(options())
}

pub fn format_with(opts: MountOptions) -> (Arc<RamDisk>, MountedVolume) {
    init_logger();
    let disk = RamDisk::new(BLOCK_SIZE, NUM_BLOCKS);
    let vol = MountedVolume::format(disk.clone(), opts).unwrap();
    (disk, vol)
}

pub fn remount(disk: &Arc<RamDisk>, vol: MountedVolume) -> MountedVolume {
    vol.unmount().unwrap();
    MountedVolume::load(disk.clone(), options()).unwrap()
}

/// 可复现的随机字节
pub fn random_bytes(len: usize, seed: u64) -> Vec<u8> {
    use rand::{Rng, SeedableRng};

    let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
    let mut bytes = vec![0; len];
    rng.fill(&mut bytes[..]);
    bytes
}

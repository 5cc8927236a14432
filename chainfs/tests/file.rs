mod common;

use chainfs::config::DEFAULT_FILE_BLOCKS;
use chainfs::{Error, Fd, MountedVolume, OpenFlag, Whence};
use rand::{Rng, SeedableRng};

use self::common::{
    BLOCK_SIZE, RamDisk, format, format_with, init_logger, options, random_bytes, remount,
};

fn create(vol: &mut MountedVolume, path: &str) -> Fd {
    vol.open(path, OpenFlag::CREATE | OpenFlag::RDWR).unwrap()
}

fn read_at(vol: &mut MountedVolume, fd: Fd, offset: u64, len: usize) -> Vec<u8> {
    vol.seek(fd, offset as i64, Whence::Set).unwrap();
    let mut buf = vec![0; len];
    let read = vol.read(fd, &mut buf).unwrap();
    buf.truncate(read);
    buf
}

#[test]
fn read_back_across_blocks() {
    let (_disk, mut vol) = format();
    let fd = create(&mut vol, "/data");

    let data = random_bytes(3 * BLOCK_SIZE + 77, 7);
    assert_eq!(data.len(), vol.write(fd, &data).unwrap());
    assert_eq!(data.len() as u64, vol.tell(fd).unwrap());
    assert_eq!(data, read_at(&mut vol, fd, 0, data.len()));

    // 起点在块中间：三段都会经过
    let patch = random_bytes(2 * BLOCK_SIZE + 10, 8);
    vol.seek(fd, 300, Whence::Set).unwrap();
    vol.write(fd, &patch).unwrap();
    assert_eq!(patch, read_at(&mut vol, fd, 300, patch.len()));
    assert_eq!(&data[..300], &read_at(&mut vol, fd, 0, 300)[..]);

    let end = 300 + patch.len();
    assert_eq!(&data[end..], &read_at(&mut vol, fd, end as u64, data.len())[..]);

    vol.close(fd).unwrap();
    vol.check().unwrap();
}

#[test]
fn random_offsets() {
    let (_disk, mut vol) = format();
    let fd = create(&mut vol, "/random");
    let mut rng = rand::rngs::StdRng::seed_from_u64(42);
    let mut shadow = vec![0u8; 16 * BLOCK_SIZE];

    vol.write(fd, &shadow).unwrap();
    for round in 0..64 {
        let offset = rng.gen_range(0..shadow.len() - 1);
        let len = rng.gen_range(1..=(shadow.len() - offset).min(3 * BLOCK_SIZE));
        let bytes = random_bytes(len, round);

        vol.seek(fd, offset as i64, Whence::Set).unwrap();
        vol.write(fd, &bytes).unwrap();
        shadow[offset..offset + len].copy_from_slice(&bytes);
    }

    assert_eq!(shadow, read_at(&mut vol, fd, 0, shadow.len()));
    vol.close(fd).unwrap();

    // 关闭后从磁盘重新读取
    let fd = vol.open("/random", OpenFlag::read_only()).unwrap();
    assert_eq!(shadow, read_at(&mut vol, fd, 0, shadow.len()));
}

#[test]
fn small_sequential_io() {
    let (_disk, mut vol) = format();
    let fd = create(&mut vol, "/log");

    let mut expected = Vec::new();
    for i in 0..200u32 {
        let line = format!("line {i}\n");
        vol.write(fd, line.as_bytes()).unwrap();
        expected.extend_from_slice(line.as_bytes());
    }

    vol.seek(fd, 0, Whence::Set).unwrap();
    let mut actual = Vec::new();
    let mut chunk = [0; 33];
    loop {
        let read = vol.read(fd, &mut chunk).unwrap();
        if read == 0 {
            break;
        }
        actual.extend_from_slice(&chunk[..read]);
    }
    assert_eq!(expected, actual);
}

#[test]
fn reads_stop_at_end_of_file() {
    let (_disk, mut vol) = format();
    let fd = create(&mut vol, "/short");
    vol.write(fd, b"0123456789").unwrap();

    vol.seek(fd, 0, Whence::Set).unwrap();
    let mut buf = [0; 100];
    assert_eq!(10, vol.read(fd, &mut buf).unwrap());
    assert_eq!(b"0123456789", &buf[..10]);
    assert_eq!(0, vol.read(fd, &mut buf).unwrap());

    // 块链末尾远在文件末尾之后
    let chain_end = DEFAULT_FILE_BLOCKS as u64 * BLOCK_SIZE as u64;
    assert_eq!(chain_end + 100, vol.seek(fd, 100, Whence::End).unwrap());
    assert_eq!(0, vol.read(fd, &mut buf).unwrap());
    assert_eq!(chain_end - 3, vol.seek(fd, -3, Whence::End).unwrap());
    assert_eq!(0, vol.read(fd, &mut buf).unwrap());

    assert_eq!(7, vol.seek(fd, 7, Whence::Set).unwrap());
    assert_eq!(3, vol.read(fd, &mut buf).unwrap());
    assert_eq!(b"789", &buf[..3]);
}

#[test]
fn seek_whence() {
    let (_disk, mut vol) = format();
    let fd = create(&mut vol, "/seek");
    vol.write(fd, &[7; 1000]).unwrap();

    assert_eq!(10, vol.seek(fd, 10, Whence::Set).unwrap());
    assert_eq!(15, vol.seek(fd, 5, Whence::Cur).unwrap());
    assert_eq!(5, vol.seek(fd, -10, Whence::Cur).unwrap());
    let chain_end = DEFAULT_FILE_BLOCKS as u64 * BLOCK_SIZE as u64;
    assert_eq!(chain_end, vol.seek(fd, 0, Whence::End).unwrap());
    assert_eq!(chain_end, vol.tell(fd).unwrap());
    assert_eq!(0, vol.seek(fd, -(chain_end as i64), Whence::End).unwrap());
    assert_eq!(1000, vol.seek(fd, 1000, Whence::Set).unwrap());

    assert_eq!(Err(Error::InvalidArgument), vol.seek(fd, -1, Whence::Set));
    assert_eq!(
        Err(Error::InvalidArgument),
        vol.seek(fd, -(chain_end as i64) - 1, Whence::End)
    );
    // 位置不变
    assert_eq!(1000, vol.tell(fd).unwrap());
}

#[test]
fn write_past_end_fills_zeros() {
    let (_disk, mut vol) = format();
    let fd = create(&mut vol, "/sparse");
    vol.write(fd, b"abc").unwrap();

    vol.seek(fd, 1500, Whence::Set).unwrap();
    vol.write(fd, b"xyz").unwrap();
    assert_eq!(1503, vol.stat("/sparse").unwrap().size);

    let all = read_at(&mut vol, fd, 0, 2000);
    assert_eq!(1503, all.len());
    assert_eq!(b"abc", &all[..3]);
    assert!(all[3..1500].iter().all(|&b| b == 0));
    assert_eq!(b"xyz", &all[1500..]);
}

#[test]
fn zero_fill_hides_stale_blocks() {
    let (_disk, mut vol) = format();

    // 先在块里留下非零内容，再删除
    let fd = create(&mut vol, "/old");
    vol.write(fd, &[0xEE; 4 * BLOCK_SIZE]).unwrap();
    vol.close(fd).unwrap();
    vol.delete("/old").unwrap();

    let fd = create(&mut vol, "/new");
    vol.seek(fd, 3 * BLOCK_SIZE as i64, Whence::Set).unwrap();
    vol.write(fd, b"!").unwrap();

    let all = read_at(&mut vol, fd, 0, 4 * BLOCK_SIZE);
    assert_eq!(3 * BLOCK_SIZE + 1, all.len());
    assert!(all[..3 * BLOCK_SIZE].iter().all(|&b| b == 0));
}

#[test]
fn writes_grow_the_chain() {
    let (_disk, mut vol) = format_with(options().with_default_file_blocks(2));
    let fd = create(&mut vol, "/grow");
    let initial = vol.free_blocks();

    // 需要10块：缺8块，max(8, 2) = 8
    let data = random_bytes(5000, 3);
    vol.write(fd, &data).unwrap();
    assert_eq!(10, vol.stat("/grow").unwrap().blocks);
    assert_eq!(initial - 8, vol.free_blocks());

    // 需要12块：缺2块，翻倍为10
    vol.write(fd, &[1; 1000]).unwrap();
    assert_eq!(20, vol.stat("/grow").unwrap().blocks);
    assert_eq!(initial - 18, vol.free_blocks());

    assert_eq!(data, read_at(&mut vol, fd, 0, data.len()));
    vol.close(fd).unwrap();
    vol.check().unwrap();
}

#[test]
fn growth_falls_back_to_exact_need() {
    init_logger();
    // 块链表2块，根目录40块，剩余157块
    let disk = RamDisk::new(BLOCK_SIZE, 200);
    let mut vol = MountedVolume::format(disk, options().with_default_file_blocks(100)).unwrap();
    assert_eq!(157, vol.free_blocks());

    let fd = create(&mut vol, "/big");
    assert_eq!(57, vol.free_blocks());

    vol.seek(fd, 100 * BLOCK_SIZE as i64, Whence::Set).unwrap();
    vol.write(fd, b"+").unwrap();
    assert_eq!(101, vol.stat("/big").unwrap().blocks);
    assert_eq!(56, vol.free_blocks());

    vol.seek(fd, 0, Whence::End).unwrap();
    assert_eq!(
        Err(Error::OutOfSpace),
        vol.write(fd, &vec![0; 57 * BLOCK_SIZE])
    );
    assert_eq!(56, vol.free_blocks());
    vol.check().unwrap();
}

#[test]
fn open_modes() {
    let (_disk, mut vol) = format();
    assert_eq!(
        Error::NotFound,
        vol.open("/missing", OpenFlag::read_only()).unwrap_err()
    );

    let fd = vol.open("/f", OpenFlag::CREATE | OpenFlag::WRONLY).unwrap();
    vol.write(fd, b"hello").unwrap();
    assert_eq!(Err(Error::PermissionDenied), vol.read(fd, &mut [0; 5]));
    vol.close(fd).unwrap();

    let fd = vol.open("/f", OpenFlag::read_only()).unwrap();
    assert_eq!(Err(Error::PermissionDenied), vol.write(fd, b"x"));
    let mut buf = [0; 5];
    assert_eq!(5, vol.read(fd, &mut buf).unwrap());
    assert_eq!(b"hello", &buf);
    vol.close(fd).unwrap();

    vol.mkdir("/dir").unwrap();
    assert_eq!(
        Error::NotAFile,
        vol.open("/dir", OpenFlag::RDWR.into()).unwrap_err()
    );
    assert_eq!(
        Error::NotAFile,
        vol.open("/", OpenFlag::read_only()).unwrap_err()
    );
}

#[test]
fn truncate_keeps_blocks() {
    let (_disk, mut vol) = format();
    let fd = create(&mut vol, "/t");
    vol.write(fd, &[9; 2000]).unwrap();
    vol.close(fd).unwrap();
    let before = vol.stat("/t").unwrap();
    let free = vol.free_blocks();

    let fd = vol.open("/t", OpenFlag::RDWR | OpenFlag::TRUNC).unwrap();
    let after = vol.stat("/t").unwrap();
    assert_eq!(0, after.size);
    assert_eq!(before.blocks, after.blocks);
    assert_eq!(free, vol.free_blocks());
    assert_eq!(0, vol.read(fd, &mut [0; 10]).unwrap());
    vol.close(fd).unwrap();
}

#[test]
fn descriptor_table() {
    let (_disk, mut vol) = format_with(options().with_max_open_files(2));
    let a = create(&mut vol, "/a");
    let b = create(&mut vol, "/b");
    assert_ne!(a, b);
    assert_eq!(
        Error::NoDescriptors,
        vol.open("/c", OpenFlag::CREATE.into()).unwrap_err()
    );
    // 表满时不会创建文件
    assert!(!vol.is_file("/c"));

    vol.close(a).unwrap();
    assert_eq!(Err(Error::InvalidDescriptor), vol.close(a));
    assert_eq!(Err(Error::InvalidDescriptor), vol.read(a, &mut [0; 1]));
    assert_eq!(Err(Error::InvalidDescriptor), vol.tell(Fd::from(7)));

    let c = create(&mut vol, "/c");
    assert_eq!(a, c);
    vol.close(b).unwrap();
    vol.close(c).unwrap();
}

#[test]
fn write_back_keeps_sibling_entries() {
    let (_disk, mut vol) = format();
    let a = create(&mut vol, "/a");
    vol.write(a, b"first").unwrap();

    // 文件打开期间同目录下新建的项不会被覆盖
    let b = create(&mut vol, "/b");
    vol.close(b).unwrap();
    vol.mkdir("/d").unwrap();

    vol.write(a, b" second").unwrap();
    vol.close(a).unwrap();

    assert!(vol.is_file("/b"));
    assert!(vol.is_dir("/d"));
    assert_eq!(12, vol.stat("/a").unwrap().size);
}

#[test]
fn rename_while_open() {
    let (_disk, mut vol) = format();
    let fd = create(&mut vol, "/draft");
    vol.write(fd, b"abc").unwrap();

    vol.rename("/final", "/draft").unwrap();
    vol.write(fd, b"def").unwrap();
    vol.close(fd).unwrap();

    assert!(!vol.is_file("/draft"));
    assert_eq!(6, vol.stat("/final").unwrap().size);

    vol.mkdir("/other").unwrap();
    let fd = vol.open("/final", OpenFlag::read_only()).unwrap();
    assert_eq!(Err(Error::Busy), vol.rename("/other/final", "/final"));
    assert_eq!(Err(Error::Busy), vol.delete("/final"));
    vol.close(fd).unwrap();
    vol.rename("/other/final", "/final").unwrap();
}

#[test]
fn write_times() {
    let (_disk, mut vol) = format();
    let fd = create(&mut vol, "/times");
    let created = vol.stat("/times").unwrap();
    assert_eq!(created.created, created.modified);

    vol.write(fd, b"tick").unwrap();
    let written = vol.stat("/times").unwrap();
    assert_eq!(created.created, written.created);
    assert!(written.modified > created.modified);
    assert_eq!(written.modified, written.accessed);
}

#[test]
fn seek_end_follows_growth() {
    let (_disk, mut vol) = format();
    let fd = create(&mut vol, "/grow");
    let bs = BLOCK_SIZE as u64;
    assert_eq!(DEFAULT_FILE_BLOCKS as u64 * bs, vol.seek(fd, 0, Whence::End).unwrap());

    vol.seek(fd, 0, Whence::Set).unwrap();
    vol.write(fd, &vec![3; 130 * BLOCK_SIZE]).unwrap();
    let blocks = vol.stat("/grow").unwrap().blocks;
    assert_eq!(2 * DEFAULT_FILE_BLOCKS as u64, blocks);
    assert_eq!(blocks * bs - 1, vol.seek(fd, -1, Whence::End).unwrap());
}

fn chain_len(vol: &MountedVolume, path: &str) -> u64 {
    let resolved = vol.resolve(path).unwrap();
    let location = resolved.entry().unwrap().location;
    vol.chain_table().len(location).unwrap() as u64
}

#[test]
fn stale_reader_keeps_writer_metadata() {
    let (disk, mut vol) = format();
    let fd = create(&mut vol, "/f");
    vol.close(fd).unwrap();

    let reader = vol.open("/f", OpenFlag::read_only()).unwrap();
    let writer = vol.open("/f", OpenFlag::RDWR.into()).unwrap();
    let data = random_bytes(200 * BLOCK_SIZE, 11);
    vol.write(writer, &data).unwrap();
    vol.close(writer).unwrap();

    let written = vol.stat("/f").unwrap();
    assert_eq!(data.len() as u64, written.size);
    assert_eq!(2 * DEFAULT_FILE_BLOCKS as u64, written.blocks);

    // 读者只看到打开时的大小
    assert_eq!(0, vol.read(reader, &mut [0; 16]).unwrap());
    vol.close(reader).unwrap();

    let after = vol.stat("/f").unwrap();
    assert_eq!(written.size, after.size);
    assert_eq!(written.blocks, after.blocks);
    assert_eq!(chain_len(&vol, "/f"), after.blocks);
    assert!(after.accessed >= written.accessed);

    let mut vol = remount(&disk, vol);
    let fd = vol.open("/f", OpenFlag::read_only()).unwrap();
    assert_eq!(data, read_at(&mut vol, fd, 0, data.len()));
    vol.check().unwrap();
}

#[test]
fn writers_share_the_chain() {
    let (_disk, mut vol) = format();
    let a = create(&mut vol, "/shared");
    let b = vol.open("/shared", OpenFlag::RDWR.into()).unwrap();
    let bs = BLOCK_SIZE;

    vol.write(a, &vec![1; 200 * bs]).unwrap();
    vol.write(b, b"head").unwrap();
    let stat = vol.stat("/shared").unwrap();
    assert_eq!(200 * bs as u64, stat.size);
    assert_eq!(2 * DEFAULT_FILE_BLOCKS as u64, stat.blocks);

    // b打开时块链还很短，延长时须从实际链尾算起
    vol.seek(b, 300 * bs as i64, Whence::Set).unwrap();
    vol.write(b, b"tail").unwrap();
    let stat = vol.stat("/shared").unwrap();
    assert_eq!(300 * bs as u64 + 4, stat.size);
    assert_eq!(4 * DEFAULT_FILE_BLOCKS as u64, stat.blocks);
    assert_eq!(chain_len(&vol, "/shared"), stat.blocks);

    vol.close(a).unwrap();
    vol.close(b).unwrap();
    let stat = vol.stat("/shared").unwrap();
    assert_eq!(300 * bs as u64 + 4, stat.size);
    assert_eq!(chain_len(&vol, "/shared"), stat.blocks);

    let fd = vol.open("/shared", OpenFlag::read_only()).unwrap();
    let content = read_at(&mut vol, fd, 0, stat.size as usize);
    assert_eq!(b"head", &content[..4]);
    assert!(content[4..200 * bs].iter().all(|&x| x == 1));
    assert!(content[200 * bs..300 * bs].iter().all(|&x| x == 0));
    assert_eq!(b"tail", &content[300 * bs..]);
    vol.check().unwrap();
}

mod block_file;
mod cli;

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::Path;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use block_dev::BlockDevice;
use chainfs::config::MIN_BLOCK_SIZE;
use chainfs::volume::SuperBlock;
use chainfs::{MountOptions, MountedVolume, OpenFlag};
use clap::Parser;
use typed_bytesize::ByteSizeIec;
use vfs::DirEntryType;

pub use self::{
    block_file::BlockFile,
    cli::{Cli, Command},
};

fn main() -> io::Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    match cli.command {
        Command::Pack {
            source,
            size_mib,
            block_size,
        } => pack(&cli.image, &source, size_mib, block_size),
        Command::Ls { path } => ls(&cli.image, &path),
        Command::Cat { path } => cat(&cli.image, &path),
    }
}

fn pack(image: &Path, source: &Path, size_mib: u64, block_size: usize) -> io::Result<()> {
    println!("source={source:?}\nimage={image:?}");
    block_file::check_block_size(block_size)?;

    let disk_size = ByteSizeIec::mib(size_mib).0;
    let fd = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(true)
        .open(image)?;
    fd.set_len(disk_size)?;

    let block_dev: Arc<dyn BlockDevice> = Arc::new(BlockFile::new(fd, block_size)?);
    let name = source
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("chainfs");
    let opts = MountOptions::default()
        .with_clock(now)
        .with_volume_name(name);
    let mut vol = MountedVolume::format(block_dev, opts).map_err(fs_error)?;

    copy_dir(&mut vol, source, "")?;

    println!("{} block(s) free", vol.free_blocks());
    vol.unmount().map_err(fs_error)
}

/// 把宿主目录`host`下的内容逐项复制到卷内的`dest`目录。
fn copy_dir(vol: &mut MountedVolume, host: &Path, dest: &str) -> io::Result<()> {
    for entry in fs::read_dir(host)? {
        let entry = entry?;
        let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
            log::warn!("skipping non UTF-8 name {:?}", entry.file_name());
            continue;
        };
        let path = format!("{dest}/{name}");

        if entry.file_type()?.is_dir() {
            log::info!("mkdir {path}");
            vol.mkdir(&path).map_err(fs_error)?;
            copy_dir(vol, &entry.path(), &path)?;
        } else {
            let mut data = Vec::new();
            File::open(entry.path())?.read_to_end(&mut data)?;
            log::info!("file {path} ({} bytes)", data.len());

            let fd = vol
                .open(&path, OpenFlag::CREATE | OpenFlag::WRONLY | OpenFlag::TRUNC)
                .map_err(fs_error)?;
            vol.write(fd, &data).map_err(fs_error)?;
            vol.close(fd).map_err(fs_error)?;
        }
    }
    Ok(())
}

fn ls(image: &Path, path: &str) -> io::Result<()> {
    let vol = mount(image)?;
    for entry in vol.opendir(path).map_err(fs_error)? {
        let full = format!("{}/{}", path.trim_end_matches('/'), entry.name);
        let stat = vol.stat(&full).map_err(fs_error)?;
        let kind = match entry.ty {
            DirEntryType::Directory => 'd',
            DirEntryType::Regular => '-',
        };
        println!("{kind} {:>6} {:>10} {}", entry.reclen, stat.size, entry.name);
    }
    vol.unmount().map_err(fs_error)
}

fn cat(image: &Path, path: &str) -> io::Result<()> {
    let mut vol = mount(image)?;
    let fd = vol.open(path, OpenFlag::read_only()).map_err(fs_error)?;

    let mut stdout = io::stdout().lock();
    let mut buf = vec![0; 64 * vol.block_size()];
    loop {
        let read = vol.read(fd, &mut buf).map_err(fs_error)?;
        if read == 0 {
            break;
        }
        stdout.write_all(&buf[..read])?;
    }

    vol.close(fd).map_err(fs_error)?;
    vol.unmount().map_err(fs_error)
}

/// 从镜像的超级块得知块大小后挂载。
fn mount(image: &Path) -> io::Result<MountedVolume> {
    let mut fd = OpenOptions::new().read(true).write(true).open(image)?;

    let mut head = [0; MIN_BLOCK_SIZE];
    fd.read_exact(&mut head)?;
    let sb = SuperBlock::decode(&head).map_err(fs_error)?;
    if !sb.is_signed() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "not a chainfs image",
        ));
    }
    let block_size = sb.block_size as usize;

    let block_dev: Arc<dyn BlockDevice> = Arc::new(BlockFile::new(fd, block_size)?);
    MountedVolume::load(block_dev, MountOptions::default().with_clock(now)).map_err(fs_error)
}

fn now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_secs() as i64)
}

fn fs_error(e: vfs::Error) -> io::Error {
    let kind = match e {
        vfs::Error::NotFound => io::ErrorKind::NotFound,
        vfs::Error::AlreadyExists => io::ErrorKind::AlreadyExists,
        vfs::Error::PermissionDenied => io::ErrorKind::PermissionDenied,
        vfs::Error::InvalidArgument | vfs::Error::Malformed => io::ErrorKind::InvalidInput,
        vfs::Error::Corrupted | vfs::Error::InvalidChain => io::ErrorKind::InvalidData,
        _ => io::ErrorKind::Other,
    };
    io::Error::new(kind, e.to_string())
}

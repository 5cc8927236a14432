use alloc::string::String;
use alloc::vec::Vec;

use vfs::Stat;

use crate::control::MountedVolume;
use crate::path::Resolved;
use crate::volume::Directory;
use crate::{BlockId, Error, Result};

/// 打开的目录：目录数组的快照，跳过`.`与`..`按槽位顺序遍历。
#[derive(Debug, Clone)]
pub struct DirStream {
    dir: Directory,
    cursor: usize,
}

impl DirStream {
    fn new(dir: Directory) -> Self {
        Self { dir, cursor: 2 }
    }

    /// 下一个非空闲项，到达目录末尾时返回`None`。
    pub fn readdir(&mut self) -> Option<vfs::DirEntry> {
        self.next()
    }

    pub fn close(self) {}
}

impl Iterator for DirStream {
    type Item = vfs::DirEntry;

    fn next(&mut self) -> Option<Self::Item> {
        let entries = self.dir.entries();
        let (offset, entry) = entries[self.cursor.min(entries.len())..]
            .iter()
            .enumerate()
            .find(|(_, entry)| !entry.is_available())?;
        self.cursor += offset + 1;

        Some(vfs::DirEntry {
            name: String::from(entry.name()),
            ty: entry.dirent_type(),
            reclen: entry.num_blocks,
        })
    }
}

impl MountedVolume {
    pub fn mkdir(&mut self, path: &str) -> Result<()> {
        let resolved = self.volume.resolve(path)?;
        if resolved.index.is_some() {
            return Err(Error::AlreadyExists);
        }

        let Resolved { mut dir, name, .. } = resolved;
        let index = dir.free_slot().ok_or(Error::NoDirectorySlot)?;
        let entry = self.volume.create_directory(&name, &dir)?;
        let location = entry.location;
        dir[index] = entry;

        if let Err(e) = self.volume.write_directory(&dir) {
            self.volume.release(location)?;
            return Err(e);
        }
        log::debug!("mkdir `{path}` at {location}");
        Ok(())
    }

    /// 删除空目录并回收其块链。
    pub fn rmdir(&mut self, path: &str) -> Result<()> {
        let (mut dir, index) = self.volume.resolve(path)?.existing()?;
        let entry = dir[index].clone();
        if !entry.is_dir() {
            return Err(Error::NotADirectory);
        }
        if entry.is_relative() {
            return Err(Error::InvalidArgument);
        }
        if entry.location == self.volume.cwd().location() {
            return Err(Error::Busy);
        }

        let target = self.volume.load_directory(entry.location, entry.num_blocks)?;
        if !target.is_empty() {
            return Err(Error::DirectoryNotEmpty);
        }

        dir[index].release();
        self.volume.write_directory(&dir)?;
        let freed = self.volume.release(entry.location)?;
        log::debug!("rmdir `{path}` freed {freed} block(s)");
        Ok(())
    }

    /// 删除文件并回收其块链。
    pub fn delete(&mut self, path: &str) -> Result<()> {
        let (mut dir, index) = self.volume.resolve(path)?.existing()?;
        let entry = dir[index].clone();
        if !entry.is_file() {
            return Err(Error::NotAFile);
        }
        if self.is_open(entry.location) {
            return Err(Error::Busy);
        }

        dir[index].release();
        self.volume.write_directory(&dir)?;
        let freed = self.volume.release(entry.location)?;
        log::debug!("deleted `{path}`, freed {freed} block(s)");
        Ok(())
    }

    /// 把`src`移动为`dest`。
    ///
    /// 同一目录内只改名称与修改时间；跨目录时目录项连同块链一起迁往新目录，
    /// 被移动的目录还会改写自己的`..`。
    pub fn rename(&mut self, dest: &str, src: &str) -> Result<()> {
        let (mut src_dir, src_index) = self.volume.resolve(src)?.existing()?;
        if src_dir[src_index].is_relative() {
            return Err(Error::InvalidArgument);
        }
        let dest = self.volume.resolve(dest)?;
        if dest.index.is_some() {
            return Err(Error::AlreadyExists);
        }

        let now = self.volume.now();
        let entry = src_dir[src_index].clone();

        if dest.dir.location() == src_dir.location() {
            let moved = &mut src_dir[src_index];
            moved.rename(&dest.name);
            moved.modified = now;
            self.volume.write_directory(&src_dir)?;
            log::debug!("renamed `{}` to `{}`", entry.name(), dest.name);
            return Ok(());
        }

        if entry.is_file() && self.is_open(entry.location) {
            return Err(Error::Busy);
        }
        if entry.is_dir() {
            self.ensure_not_ancestor(entry.location, &dest.dir)?;
        }

        let Resolved { mut dir, name, .. } = dest;
        let index = dir.free_slot().ok_or(Error::NoDirectorySlot)?;
        let mut moved = entry.clone();
        moved.rename(&name);
        moved.modified = now;
        dir[index] = moved;
        self.volume.write_directory(&dir)?;

        src_dir[src_index].release();
        self.volume.write_directory(&src_dir)?;

        if entry.is_dir() {
            let mut child = self.volume.load_directory(entry.location, entry.num_blocks)?;
            child[1] = dir.cwd().as_parent();
            self.volume.write_directory(&child)?;
        }

        log::debug!("moved `{src}` into {} as `{name}`", dir.location());
        Ok(())
    }

    pub fn opendir(&self, path: &str) -> Result<DirStream> {
        self.volume.resolve_dir(path).map(DirStream::new)
    }

    pub fn closedir(&self, stream: DirStream) {
        stream.close();
    }

    pub fn stat(&self, path: &str) -> Result<Stat> {
        let resolved = self.volume.resolve(path)?;
        let entry = resolved.entry().ok_or(Error::NotFound)?;
        Ok(entry.stat(self.volume.block_size()))
    }

    pub fn setcwd(&mut self, path: &str) -> Result<()> {
        let dir = self.volume.resolve_dir(path)?;
        self.volume.set_cwd(dir);
        Ok(())
    }

    /// 沿`..`逐级上溯至根目录，拼出当前目录的绝对路径。
    pub fn getcwd(&self) -> Result<String> {
        let mut names = Vec::new();
        let mut dir = self.volume.cwd().clone();

        while !self.volume.is_root(&dir) {
            if names.len() as u32 > self.volume.table().total_blocks() {
                return Err(Error::Corrupted);
            }

            let up = dir.parent();
            let parent = self.volume.load_directory(up.location, up.num_blocks)?;
            let entry = parent
                .entries()
                .iter()
                .skip(2)
                .find(|entry| entry.is_dir() && entry.location == dir.location())
                .ok_or(Error::Corrupted)?;
            names.push(String::from(entry.name()));
            dir = parent;
        }

        if names.is_empty() {
            return Ok(String::from("/"));
        }
        Ok(names.iter().rev().fold(String::new(), |mut path, name| {
            path.push('/');
            path.push_str(name);
            path
        }))
    }

    pub fn is_file(&self, path: &str) -> bool {
        self.volume
            .resolve(path)
            .is_ok_and(|resolved| resolved.entry().is_some_and(|entry| entry.is_file()))
    }

    pub fn is_dir(&self, path: &str) -> bool {
        self.volume
            .resolve(path)
            .is_ok_and(|resolved| resolved.entry().is_some_and(|entry| entry.is_dir()))
    }
}

impl MountedVolume {
    /// 从`dest`上溯至根目录，途中不得经过`moving`。
    fn ensure_not_ancestor(&self, moving: BlockId, dest: &Directory) -> Result<()> {
        let mut dir = dest.clone();
        let mut depth = 0;

        loop {
            if dir.location() == moving {
                return Err(Error::InvalidArgument);
            }
            if self.volume.is_root(&dir) {
                return Ok(());
            }

            depth += 1;
            if depth > self.volume.table().total_blocks() {
                return Err(Error::Corrupted);
            }
            let up = dir.parent();
            dir = self.volume.load_directory(up.location, up.num_blocks)?;
        }
    }
}

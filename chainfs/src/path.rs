use alloc::string::String;
use alloc::vec::Vec;

use crate::config::{NAME_CAP, SEPARATOR};
use crate::volume::{DirEntry, Directory, Volume};
use crate::{Error, Result};

pub trait Path {
    fn is_absolute(&self) -> bool;

    /// 按`/`切分后的各级名称，空名称被跳过。
    fn components(&self) -> impl Iterator<Item = &str>;
}

impl Path for str {
    fn is_absolute(&self) -> bool {
        self.starts_with(SEPARATOR)
    }

    fn components(&self) -> impl Iterator<Item = &str> {
        self.split(SEPARATOR).filter(|s| !s.is_empty())
    }
}

/// 路径解析的结果：末级名称所在的目录数组，以及它在其中的位置。
#[derive(Debug, Clone)]
pub struct Resolved {
    pub dir: Directory,
    /// 末级名称
    pub name: String,
    /// 末级名称不存在时为`None`，便于创建者区分“不存在”与“已存在”
    pub index: Option<usize>,
}

impl Resolved {
    pub fn entry(&self) -> Option<&DirEntry> {
        self.index.map(|i| &self.dir[i])
    }

    /// 末级名称必须存在
    pub fn existing(self) -> Result<(Directory, usize)> {
        match self.index {
            Some(index) => Ok((self.dir, index)),
            None => Err(Error::NotFound),
        }
    }
}

impl Volume {
    /// 以`/`开头的路径从根目录出发，否则从当前目录出发。
    pub fn resolve(&self, path: &str) -> Result<Resolved> {
        if path.is_empty() {
            return Err(Error::Malformed);
        }

        let names: Vec<&str> = path.components().collect();
        if names.iter().any(|name| name.len() > NAME_CAP) {
            log::debug!("name too long in `{path}`");
            return Err(Error::Malformed);
        }

        let mut dir = if path.is_absolute() {
            self.load_root()?
        } else {
            self.cwd().clone()
        };

        let Some((&last, parents)) = names.split_last() else {
            return Ok(Resolved {
                dir,
                name: String::from("."),
                index: Some(0),
            });
        };

        for &name in parents {
            let entry = dir
                .find(name)
                .map(|i| &dir[i])
                .filter(|entry| entry.is_dir())
                .ok_or(Error::NotFound)?;
            dir = self.load_directory(entry.location, entry.num_blocks)?;
        }

        let index = dir.find(last);
        log::debug!("resolved `{path}` to slot {index:?} of {}", dir.location());
        Ok(Resolved {
            dir,
            name: String::from(last),
            index,
        })
    }

    /// 解析并载入一个已存在的目录。
    pub fn resolve_dir(&self, path: &str) -> Result<Directory> {
        let (dir, index) = self.resolve(path)?.existing()?;
        let entry = &dir[index];
        if !entry.is_dir() {
            return Err(Error::NotADirectory);
        }
        if index == 0 {
            return Ok(dir);
        }
        self.load_directory(entry.location, entry.num_blocks)
    }
}

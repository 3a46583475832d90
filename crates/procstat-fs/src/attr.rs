//! Synthesized attributes and their `fuser` representation.

use std::time::SystemTime;

use fuser::{FileAttr, FileType};

use crate::handle::Handle;
use crate::permissions::{dir_nlink, DIR_PERM, FILE_BLKSIZE, FILE_PERM};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemType {
    Directory,
    Leaf,
}

impl ItemType {
    pub fn file_type(self) -> FileType {
        match self {
            ItemType::Directory => FileType::Directory,
            ItemType::Leaf => FileType::RegularFile,
        }
    }

    /// `d_type` value written into directory entries.
    pub fn dirent_type(self) -> u32 {
        match self {
            ItemType::Directory => u32::from(libc::DT_DIR),
            ItemType::Leaf => u32::from(libc::DT_REG),
        }
    }

    pub fn from_dirent_type(d_type: u32) -> Option<Self> {
        if d_type == u32::from(libc::DT_DIR) {
            Some(ItemType::Directory)
        } else if d_type == u32::from(libc::DT_REG) {
            Some(ItemType::Leaf)
        } else {
            None
        }
    }
}

/// Attributes of one item as answered to lookup/getattr.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ItemAttr {
    pub handle: Handle,
    pub kind: ItemType,
    pub perm: u16,
    pub nlink: u32,
    pub size: u64,
    pub blksize: u32,
    pub uid: u32,
    pub gid: u32,
}

impl ItemAttr {
    pub fn directory(handle: Handle, uid: u32, gid: u32) -> Self {
        Self {
            handle,
            kind: ItemType::Directory,
            perm: DIR_PERM,
            nlink: dir_nlink(handle.is_root()),
            size: 0,
            blksize: 0,
            uid,
            gid,
        }
    }

    pub fn leaf(handle: Handle, uid: u32, gid: u32) -> Self {
        Self {
            handle,
            kind: ItemType::Leaf,
            perm: FILE_PERM,
            nlink: 1,
            size: 0,
            blksize: FILE_BLKSIZE,
            uid,
            gid,
        }
    }

    /// Full `st_mode`, type bits included.
    pub fn mode(&self) -> u32 {
        let type_bits = match self.kind {
            ItemType::Directory => libc::S_IFDIR,
            ItemType::Leaf => libc::S_IFREG,
        };
        type_bits as u32 | u32::from(self.perm)
    }

    pub fn to_file_attr(&self, time: SystemTime) -> FileAttr {
        FileAttr {
            ino: self.handle.ino(),
            size: self.size,
            blocks: 0,
            atime: time,
            mtime: time,
            ctime: time,
            crtime: time,
            kind: self.kind.file_type(),
            perm: self.perm,
            nlink: self.nlink,
            uid: self.uid,
            gid: self.gid,
            rdev: 0,
            blksize: self.blksize,
            flags: 0,
        }
    }
}

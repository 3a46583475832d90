//! Directory listings in the kernel's `fuse_dirent` layout.
//!
//! A listing is rebuilt from scratch on every readdir call. Each record is
//!
//! ```text
//! ino: u64 | off: u64 | namelen: u32 | type: u32 | name | zero padding to 8
//! ```
//!
//! where `off` is the byte offset right after the record, which the kernel
//! hands back to resume the listing.

use crate::attr::ItemType;
use crate::error::{StatsError, StatsResult};

/// Bytes before the name in every record.
pub const DIRENT_HEADER_LEN: usize = 24;
/// First buffer capacity; doubled on every shortfall.
pub const INITIAL_CAPACITY: usize = 1024;

/// Size of the record for `name`, padding included.
pub fn dirent_len(name: &str) -> usize {
    (DIRENT_HEADER_LEN + name.len() + 7) & !7
}

#[derive(Debug)]
pub struct ListingBuffer {
    buf: Vec<u8>,
    capacity: usize,
}

impl Default for ListingBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl ListingBuffer {
    pub fn new() -> Self {
        Self {
            buf: Vec::new(),
            capacity: 0,
        }
    }

    /// Append one record, growing the buffer geometrically if needed.
    pub fn push(&mut self, ino: u64, kind: ItemType, name: &str) -> StatsResult<()> {
        let entry_len = dirent_len(name);
        let end = self.buf.len() + entry_len;
        if end > self.capacity {
            self.grow(end)?;
        }

        self.buf.extend_from_slice(&ino.to_ne_bytes());
        self.buf.extend_from_slice(&(end as u64).to_ne_bytes());
        self.buf.extend_from_slice(&(name.len() as u32).to_ne_bytes());
        self.buf.extend_from_slice(&kind.dirent_type().to_ne_bytes());
        self.buf.extend_from_slice(name.as_bytes());
        self.buf.resize(end, 0);
        Ok(())
    }

    fn grow(&mut self, needed: usize) -> StatsResult<()> {
        let mut capacity = match self.capacity {
            0 => INITIAL_CAPACITY,
            current => current.checked_mul(2).ok_or(StatsError::OutOfMemory)?,
        };
        while capacity < needed {
            capacity = capacity.checked_mul(2).ok_or(StatsError::OutOfMemory)?;
        }
        self.buf
            .try_reserve_exact(capacity - self.buf.len())
            .map_err(|_| StatsError::OutOfMemory)?;
        self.capacity = capacity;
        Ok(())
    }

    /// Total formatted size.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Current buffer capacity as tracked by the growth policy.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Up to `max_bytes` bytes starting at `offset`; empty past the end.
    pub fn window(&self, offset: u64, max_bytes: usize) -> &[u8] {
        match usize::try_from(offset) {
            Ok(start) if start < self.buf.len() => {
                let end = start + max_bytes.min(self.buf.len() - start);
                &self.buf[start..end]
            }
            _ => &[],
        }
    }
}

/// One decoded directory entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry<'a> {
    pub ino: u64,
    /// Offset of the next record.
    pub next_offset: u64,
    pub kind: ItemType,
    pub name: &'a str,
}

/// Decode records from a listing window. A truncated trailing record is
/// dropped.
pub fn entries(buf: &[u8]) -> Entries<'_> {
    Entries { buf }
}

pub struct Entries<'a> {
    buf: &'a [u8],
}

impl<'a> Iterator for Entries<'a> {
    type Item = DirEntry<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let header = self.buf.get(..DIRENT_HEADER_LEN)?;
        let ino = u64::from_ne_bytes(header[0..8].try_into().ok()?);
        let next_offset = u64::from_ne_bytes(header[8..16].try_into().ok()?);
        let namelen = u32::from_ne_bytes(header[16..20].try_into().ok()?) as usize;
        let d_type = u32::from_ne_bytes(header[20..24].try_into().ok()?);

        let record_len = (DIRENT_HEADER_LEN + namelen + 7) & !7;
        let record = self.buf.get(..record_len)?;
        let name = std::str::from_utf8(&record[DIRENT_HEADER_LEN..DIRENT_HEADER_LEN + namelen]).ok()?;
        let kind = ItemType::from_dirent_type(d_type)?;
        self.buf = &self.buf[record_len..];

        Some(DirEntry {
            ino,
            next_offset,
            kind,
            name,
        })
    }
}

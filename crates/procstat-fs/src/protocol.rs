//! Kernel-facing request handlers.
//!
//! Each handler resolves the handle, runs under the tree lock and returns
//! a plain result; [`crate::fs::ProcStatFs`] turns those into FUSE replies.

use tracing::{debug, warn};

use crate::attr::{ItemAttr, ItemType};
use crate::context::StatsContext;
use crate::error::{StatsError, StatsResult};
use crate::handle::Handle;
use crate::item::Item;
use crate::listing::ListingBuffer;

impl StatsContext {
    fn attr_of(&self, handle: Handle, item: &Item) -> ItemAttr {
        if item.is_directory() {
            ItemAttr::directory(handle, self.uid(), self.gid())
        } else {
            ItemAttr::leaf(handle, self.uid(), self.gid())
        }
    }

    /// Resolve `name` under `parent` and take a reference on it.
    pub fn lookup(&self, parent: Handle, name: &str) -> StatsResult<ItemAttr> {
        let mut tree = self.lock();
        match tree.registered(parent) {
            Some(dir) if dir.is_directory() => {}
            _ => return Err(StatsError::NotFound),
        }
        let handle = tree.lookup_child(parent, name).ok_or(StatsError::NotFound)?;

        let attr = {
            let item = tree.get(handle).ok_or(StatsError::NotFound)?;
            self.attr_of(handle, item)
        };
        tree.acquire(handle)?;
        debug!(parent = parent.ino(), name, handle = handle.ino(), "lookup");
        Ok(attr)
    }

    /// Drop `count` kernel references on `handle`.
    ///
    /// Stale handles and the root are ignored. A release of more
    /// references than outstanding is returned untouched so the caller can
    /// end the session.
    pub fn forget(&self, handle: Handle, count: u64) -> StatsResult<()> {
        if handle.is_root() {
            debug!(count, "forget on root ignored");
            return Ok(());
        }
        let mut tree = self.lock();
        match tree.release(handle, count) {
            Err(StatsError::NotFound) => {
                warn!(handle = handle.ino(), count, "forget on stale handle");
                Ok(())
            }
            other => other,
        }
    }

    pub fn getattr(&self, handle: Handle) -> StatsResult<ItemAttr> {
        let tree = self.lock();
        let item = tree.registered(handle).ok_or(StatsError::NotFound)?;
        Ok(self.attr_of(handle, item))
    }

    /// Check that `handle` can be listed. Nothing is kept open.
    pub fn opendir(&self, handle: Handle) -> StatsResult<()> {
        let tree = self.lock();
        let item = tree.registered(handle).ok_or(StatsError::NotFound)?;
        if !item.is_directory() {
            return Err(StatsError::NotADirectory);
        }
        Ok(())
    }

    /// Format the whole listing of `handle` and return up to `max_bytes`
    /// of it starting at byte `offset`.
    pub fn readdir(&self, handle: Handle, max_bytes: usize, offset: u64) -> StatsResult<Vec<u8>> {
        let listing = {
            let tree = self.lock();
            let dir = tree.registered(handle).ok_or(StatsError::NotFound)?;
            if !dir.is_directory() {
                return Err(StatsError::NotADirectory);
            }

            let mut listing = ListingBuffer::new();
            for child in dir.children() {
                let Some(item) = tree.registered(*child) else {
                    continue;
                };
                let kind = if item.is_directory() {
                    ItemType::Directory
                } else {
                    ItemType::Leaf
                };
                listing.push(child.ino(), kind, item.name.as_str())?;
            }
            listing
        };

        Ok(listing.window(offset, max_bytes).to_vec())
    }

    /// Check that `handle` is a readable statistics file.
    pub fn open(&self, handle: Handle) -> StatsResult<()> {
        let tree = self.lock();
        let item = tree.registered(handle).ok_or(StatsError::NotFound)?;
        if item.is_directory() {
            return Err(StatsError::IsADirectory);
        }
        Ok(())
    }

    /// Render the file behind `handle` and return the requested range.
    pub fn read(&self, handle: Handle, offset: u64, size: usize) -> StatsResult<Vec<u8>> {
        let payload = {
            let tree = self.lock();
            let item = tree.registered(handle).ok_or(StatsError::NotFound)?;
            item.payload().cloned().ok_or(StatsError::IsADirectory)?
        };

        let mut content = String::new();
        if payload.format(&mut content).is_err() {
            warn!(handle = handle.ino(), "formatter failed");
            content.clear();
        }

        let bytes = content.as_bytes();
        match usize::try_from(offset) {
            Ok(start) if start < bytes.len() => {
                let end = start + size.min(bytes.len() - start);
                Ok(bytes[start..end].to_vec())
            }
            _ => Ok(Vec::new()),
        }
    }
}

//! The statistics context and its registration API.
//!
//! One [`StatsContext`] owns the whole tree behind a single mutex. It is
//! shared as `Arc<StatsContext>` between the FUSE session thread and
//! application threads registering statistics.

use std::sync::Arc;
use std::time::SystemTime;

use parking_lot::{Mutex, MutexGuard};
use tracing::{debug, info};

use crate::error::{StatsError, StatsResult};
use crate::handle::Handle;
use crate::item::ItemKind;
use crate::stats::StatFormatter;
use crate::tree::Tree;

pub struct StatsContext {
    tree: Mutex<Tree>,
    uid: u32,
    gid: u32,
    created: SystemTime,
}

impl StatsContext {
    /// Create an empty tree whose items are owned by `uid`/`gid`.
    pub fn new(uid: u32, gid: u32) -> Self {
        Self {
            tree: Mutex::new(Tree::new()),
            uid,
            gid,
            created: SystemTime::now(),
        }
    }

    /// Create an empty tree owned by the calling user.
    pub fn for_current_user() -> Self {
        let uid = unsafe { libc::getuid() };
        let gid = unsafe { libc::getgid() };
        Self::new(uid, gid)
    }

    pub fn uid(&self) -> u32 {
        self.uid
    }

    pub fn gid(&self) -> u32 {
        self.gid
    }

    /// Timestamp reported for every item.
    pub fn created(&self) -> SystemTime {
        self.created
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, Tree> {
        self.tree.lock()
    }

    /// The root directory, under which `None` parents register.
    pub fn root(&self) -> Handle {
        Handle::ROOT
    }

    /// Create directory `name` under `parent` (root when `None`).
    pub fn create_directory(&self, parent: Option<Handle>, name: &str) -> StatsResult<Handle> {
        self.create(parent, name, ItemKind::directory())
    }

    /// Create a statistics file `name` under `parent`, rendered by `payload`.
    pub fn create_leaf(
        &self,
        parent: Option<Handle>,
        name: &str,
        payload: Arc<dyn StatFormatter>,
    ) -> StatsResult<Handle> {
        self.create(parent, name, ItemKind::leaf(payload))
    }

    fn create(&self, parent: Option<Handle>, name: &str, kind: ItemKind) -> StatsResult<Handle> {
        let mut tree = self.lock();
        let parent = tree.parent_or_root(parent)?;
        let handle = tree.register(parent, name, kind)?;
        debug!(handle = handle.ino(), parent = parent.ino(), name, "created");
        Ok(handle)
    }

    /// Remove `item`. On the root this removes all of root's children.
    ///
    /// Removing an item that is already gone does nothing.
    pub fn remove(&self, item: Handle) {
        let mut tree = self.lock();
        if item.is_root() {
            tree.clear_root();
            debug!("removed all root children");
        } else if tree.unregister(item) {
            debug!(handle = item.ino(), "removed");
        }
    }

    /// Remove the registered child `name` of `parent` (root when `None`).
    pub fn remove_by_name(&self, parent: Option<Handle>, name: &str) -> StatsResult<()> {
        let mut tree = self.lock();
        let parent = tree.parent_or_root(parent)?;
        let item = tree
            .lookup_child(parent, name)
            .ok_or(StatsError::NotFound)?;
        tree.unregister(item);
        debug!(handle = item.ino(), parent = parent.ino(), name, "removed by name");
        Ok(())
    }

    /// Release the whole tree, ignoring references the kernel may still
    /// hold. Only valid once the FUSE session has stopped.
    pub fn teardown(&self) {
        let orphans = self.lock().teardown();
        info!(kernel_held = orphans, "statistics tree released");
    }

    /// Outstanding references on `handle`, `None` once freed.
    pub fn refcount(&self, handle: Handle) -> Option<u64> {
        self.lock().get(handle).map(|item| item.refcount)
    }

    pub fn is_registered(&self, handle: Handle) -> bool {
        self.lock().registered(handle).is_some()
    }

    /// Number of live items, root included.
    pub fn live_items(&self) -> usize {
        self.lock().len()
    }
}

impl std::fmt::Debug for StatsContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatsContext")
            .field("uid", &self.uid)
            .field("gid", &self.gid)
            .field("live_items", &self.live_items())
            .finish()
    }
}

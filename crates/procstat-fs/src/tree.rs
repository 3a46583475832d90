//! The item tree and every operation that runs under the tree lock.
//!
//! Reference accounting:
//!
//! - a registered item holds one "exists" reference on itself;
//! - every kernel lookup adds one, every kernel forget removes `nlookup`;
//! - removing an item (or its parent being freed) drops the exists
//!   reference and clears `registered`;
//! - the item is freed when the count reaches zero, after it has been
//!   unlinked from its parent and, for a directory, after all of its
//!   children have been detached.

use tracing::{debug, trace};

use crate::error::{StatsError, StatsResult};
use crate::handle::{Handle, SlotTable};
use crate::item::{Item, ItemKind};
use crate::name::{self, name_hash};

/// Name of the root directory.
pub const ROOT_NAME: &str = ".";

#[derive(Debug)]
pub struct Tree {
    items: SlotTable<Item>,
}

impl Default for Tree {
    fn default() -> Self {
        Self::new()
    }
}

impl Tree {
    pub fn new() -> Self {
        let mut root = Item::new(ROOT_NAME, ItemKind::directory());
        root.refcount = 1;
        root.registered = true;
        Self {
            items: SlotTable::with_root(root),
        }
    }

    pub fn get(&self, handle: Handle) -> Option<&Item> {
        self.items.get(handle)
    }

    /// The item behind `handle` if it is still visible.
    pub fn registered(&self, handle: Handle) -> Option<&Item> {
        self.items.get(handle).filter(|item| item.registered)
    }

    /// Number of live items, root included.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// `None` means root; anything else must be a registered directory.
    pub fn parent_or_root(&self, parent: Option<Handle>) -> StatsResult<Handle> {
        let Some(parent) = parent else {
            return Ok(Handle::ROOT);
        };
        match self.registered(parent) {
            Some(item) if item.is_directory() => Ok(parent),
            Some(_) => Err(StatsError::InvalidArgument("parent is not a directory")),
            None => Err(StatsError::InvalidArgument("parent is not registered")),
        }
    }

    /// First registered child of `dir` called `name`.
    pub fn lookup_child(&self, dir: Handle, name: &str) -> Option<Handle> {
        let hash = name_hash(name);
        self.items.get(dir)?.children().iter().copied().find(|child| {
            self.items
                .get(*child)
                .is_some_and(|item| item.registered && item.has_name(name, hash))
        })
    }

    /// Whether any child of `dir` is called `name`, registered or not.
    pub fn has_child_named(&self, dir: Handle, name: &str) -> bool {
        let hash = name_hash(name);
        self.items.get(dir).is_some_and(|item| {
            item.children().iter().any(|child| {
                self.items
                    .get(*child)
                    .is_some_and(|item| item.has_name(name, hash))
            })
        })
    }

    /// Take one more reference on a live item.
    pub fn acquire(&mut self, handle: Handle) -> StatsResult<()> {
        let item = self.items.get_mut(handle).ok_or(StatsError::NotFound)?;
        item.refcount += 1;
        Ok(())
    }

    /// Create `name` under `parent`, registered with one reference.
    pub fn register(&mut self, parent: Handle, name: &str, kind: ItemKind) -> StatsResult<Handle> {
        name::validate(name)?;
        if self.has_child_named(parent, name) {
            return Err(StatsError::AlreadyExists(name.to_string()));
        }
        match self.items.get_mut(parent) {
            Some(item) if item.is_directory() => {}
            _ => return Err(StatsError::InvalidArgument("parent is not a directory")),
        }

        let mut item = Item::new(name, kind);
        item.parent = Some(parent);
        item.refcount = 1;
        item.registered = true;
        let handle = self.items.insert(item)?;

        let pushed = match self.items.get_mut(parent).map(|p| &mut p.kind) {
            Some(ItemKind::Directory { children }) => children
                .try_reserve(1)
                .map(|()| children.push(handle))
                .map_err(|_| StatsError::OutOfMemory),
            _ => Err(StatsError::InvalidArgument("parent is not a directory")),
        };
        if let Err(e) = pushed {
            self.items.remove(handle);
            return Err(e);
        }

        trace!(handle = handle.ino(), parent = parent.ino(), name, "registered");
        Ok(handle)
    }

    /// Drop the exists reference of a registered item.
    ///
    /// No-op for the root, for stale handles and for items that are
    /// already unregistered. Returns whether anything changed.
    pub fn unregister(&mut self, handle: Handle) -> bool {
        if handle.is_root() {
            return false;
        }
        match self.items.get_mut(handle) {
            Some(item) if item.registered => item.registered = false,
            _ => return false,
        }
        // The exists reference is always present while registered.
        let _ = self.release(handle, 1);
        true
    }

    /// Release `count` references held on `handle`, freeing it at zero.
    ///
    /// Releasing more than is outstanding leaves the tree untouched and
    /// reports [`StatsError::ProtocolViolation`].
    pub fn release(&mut self, handle: Handle, count: u64) -> StatsResult<()> {
        if handle.is_root() {
            return Ok(());
        }
        let item = self.items.get_mut(handle).ok_or(StatsError::NotFound)?;
        if count > item.refcount {
            return Err(StatsError::ProtocolViolation {
                handle: handle.ino(),
                released: count,
                outstanding: item.refcount,
            });
        }
        item.refcount -= count;
        if item.refcount > 0 {
            return Ok(());
        }

        let mut zeroed = vec![handle];
        while let Some(handle) = zeroed.pop() {
            if let Some(item) = self.items.get_mut(handle) {
                item.registered = false;
            }
            zeroed.extend(self.detach_children(handle));
            self.free(handle);
        }
        Ok(())
    }

    /// Detach every child of `dir`; registered children lose their exists
    /// reference. Returns the children whose count dropped to zero.
    fn detach_children(&mut self, dir: Handle) -> Vec<Handle> {
        let children = match self.items.get_mut(dir).map(|item| &mut item.kind) {
            Some(ItemKind::Directory { children }) => std::mem::take(children),
            _ => return Vec::new(),
        };

        let mut zeroed = Vec::new();
        for child in children {
            let Some(item) = self.items.get_mut(child) else {
                continue;
            };
            item.parent = None;
            if item.registered {
                item.registered = false;
                item.refcount -= 1;
                if item.refcount == 0 {
                    zeroed.push(child);
                }
            }
        }
        zeroed
    }

    /// Unlink and drop a zero-reference item.
    fn free(&mut self, handle: Handle) {
        let Some(item) = self.items.get(handle) else {
            return;
        };
        assert_eq!(item.refcount, 0, "freeing a referenced item");
        assert!(
            item.children().is_empty(),
            "freeing directory {:?} with children",
            item.name
        );

        if let Some(parent) = item.parent {
            if let Some(ItemKind::Directory { children }) =
                self.items.get_mut(parent).map(|p| &mut p.kind)
            {
                children.retain(|child| *child != handle);
            }
        }

        if let Some(item) = self.items.remove(handle) {
            debug!(handle = handle.ino(), name = %item.name, "freed");
        }
    }

    /// Remove every child of root. Root itself stays registered.
    pub fn clear_root(&mut self) {
        let mut zeroed = self.detach_children(Handle::ROOT);
        while let Some(handle) = zeroed.pop() {
            zeroed.extend(self.detach_children(handle));
            self.free(handle);
        }
    }

    /// Drop the whole tree regardless of kernel references. Returns the
    /// number of items that were only alive because the kernel held them.
    pub fn teardown(&mut self) -> usize {
        self.clear_root();
        let orphans = self.items.handles();
        for handle in &orphans {
            if let Some(item) = self.items.get_mut(*handle) {
                if let ItemKind::Directory { children } = &mut item.kind {
                    children.clear();
                }
            }
        }
        for handle in &orphans {
            self.items.remove(*handle);
        }
        orphans.len()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::stats::{Counter, ValueFormat};

    fn leaf() -> ItemKind {
        ItemKind::leaf(Arc::new(Counter::new(
            Arc::new(std::sync::atomic::AtomicU64::new(0)),
            ValueFormat::Decimal,
        )))
    }

    fn refcount(tree: &Tree, handle: Handle) -> Option<u64> {
        tree.get(handle).map(|item| item.refcount)
    }

    #[test]
    fn test_root_registered() {
        let tree = Tree::new();
        let root = tree.registered(Handle::ROOT).unwrap();
        assert!(root.is_directory());
        assert_eq!(root.name.as_str(), ".");
        assert_eq!(tree.len(), 1);
    }

    #[test]
    fn test_register_appends_in_order() {
        let mut tree = Tree::new();
        let a = tree.register(Handle::ROOT, "a", ItemKind::directory()).unwrap();
        let b = tree.register(Handle::ROOT, "b", leaf()).unwrap();
        let c = tree.register(Handle::ROOT, "c", leaf()).unwrap();
        assert_eq!(tree.get(Handle::ROOT).unwrap().children(), &[a, b, c]);
        assert_eq!(tree.get(b).unwrap().parent, Some(Handle::ROOT));
        assert_eq!(refcount(&tree, b), Some(1));
    }

    #[test]
    fn test_register_duplicate() {
        let mut tree = Tree::new();
        tree.register(Handle::ROOT, "jobs", ItemKind::directory()).unwrap();
        let err = tree.register(Handle::ROOT, "jobs", leaf()).unwrap_err();
        assert!(matches!(err, StatsError::AlreadyExists(name) if name == "jobs"));
        assert_eq!(tree.len(), 2);
    }

    #[test]
    fn test_register_under_leaf_rejected() {
        let mut tree = Tree::new();
        let file = tree.register(Handle::ROOT, "count", leaf()).unwrap();
        assert!(matches!(
            tree.register(file, "x", leaf()),
            Err(StatsError::InvalidArgument(_))
        ));
        assert!(matches!(
            tree.parent_or_root(Some(file)),
            Err(StatsError::InvalidArgument(_))
        ));
        assert_eq!(tree.parent_or_root(None).unwrap(), Handle::ROOT);
    }

    #[test]
    fn test_unregister_frees_unreferenced() {
        let mut tree = Tree::new();
        let file = tree.register(Handle::ROOT, "count", leaf()).unwrap();
        assert!(tree.unregister(file));
        assert!(tree.get(file).is_none());
        assert!(tree.get(Handle::ROOT).unwrap().children().is_empty());
        assert!(!tree.unregister(file));
    }

    #[test]
    fn test_unregister_keeps_kernel_referenced() {
        let mut tree = Tree::new();
        let file = tree.register(Handle::ROOT, "count", leaf()).unwrap();
        tree.acquire(file).unwrap();

        assert!(tree.unregister(file));
        let item = tree.get(file).unwrap();
        assert!(!item.registered);
        assert_eq!(item.refcount, 1);
        assert!(tree.lookup_child(Handle::ROOT, "count").is_none());

        // Second removal must not eat the kernel's reference.
        assert!(!tree.unregister(file));
        assert_eq!(refcount(&tree, file), Some(1));

        tree.release(file, 1).unwrap();
        assert!(tree.get(file).is_none());
        assert!(tree.get(Handle::ROOT).unwrap().children().is_empty());
    }

    #[test]
    fn test_name_taken_while_old_item_kernel_held() {
        let mut tree = Tree::new();
        let old = tree.register(Handle::ROOT, "count", leaf()).unwrap();
        tree.acquire(old).unwrap();
        tree.unregister(old);

        assert!(tree.lookup_child(Handle::ROOT, "count").is_none());
        assert!(tree.has_child_named(Handle::ROOT, "count"));
        assert!(matches!(
            tree.register(Handle::ROOT, "count", leaf()),
            Err(StatsError::AlreadyExists(name)) if name == "count"
        ));
        assert_eq!(tree.len(), 2);

        // The last forget frees the old item and the name.
        tree.release(old, 1).unwrap();
        let new = tree.register(Handle::ROOT, "count", leaf()).unwrap();
        assert_ne!(old, new);
        assert_eq!(tree.lookup_child(Handle::ROOT, "count"), Some(new));
    }

    #[test]
    fn test_hash_collision_names_kept_apart() {
        assert_eq!(name_hash("Aa"), name_hash("BB"));

        let mut tree = Tree::new();
        let aa = tree.register(Handle::ROOT, "Aa", leaf()).unwrap();
        let bb = tree.register(Handle::ROOT, "BB", leaf()).unwrap();
        assert_ne!(aa, bb);
        assert_eq!(tree.lookup_child(Handle::ROOT, "Aa"), Some(aa));
        assert_eq!(tree.lookup_child(Handle::ROOT, "BB"), Some(bb));

        tree.unregister(aa);
        assert!(tree.lookup_child(Handle::ROOT, "Aa").is_none());
        assert_eq!(tree.lookup_child(Handle::ROOT, "BB"), Some(bb));
    }

    #[test]
    fn test_release_over_count_is_violation() {
        let mut tree = Tree::new();
        let file = tree.register(Handle::ROOT, "count", leaf()).unwrap();
        let err = tree.release(file, 2).unwrap_err();
        assert!(matches!(
            err,
            StatsError::ProtocolViolation {
                released: 2,
                outstanding: 1,
                ..
            }
        ));
        assert_eq!(refcount(&tree, file), Some(1));
    }

    #[test]
    fn test_cascade_release() {
        let mut tree = Tree::new();
        let dir = tree.register(Handle::ROOT, "jobs", ItemKind::directory()).unwrap();
        let sub = tree.register(dir, "sub", ItemKind::directory()).unwrap();
        let a = tree.register(sub, "a", leaf()).unwrap();
        let b = tree.register(dir, "b", leaf()).unwrap();
        tree.acquire(b).unwrap();

        tree.unregister(dir);

        assert!(tree.get(dir).is_none());
        assert!(tree.get(sub).is_none());
        assert!(tree.get(a).is_none());
        let b_item = tree.get(b).unwrap();
        assert!(!b_item.registered);
        assert_eq!(b_item.parent, None);
        assert_eq!(b_item.refcount, 1);

        tree.release(b, 1).unwrap();
        assert_eq!(tree.len(), 1);
    }

    #[test]
    fn test_kernel_held_directory_keeps_children() {
        let mut tree = Tree::new();
        let dir = tree.register(Handle::ROOT, "jobs", ItemKind::directory()).unwrap();
        let file = tree.register(dir, "count", leaf()).unwrap();
        tree.acquire(dir).unwrap();

        tree.unregister(dir);
        assert!(!tree.get(dir).unwrap().registered);
        // Children are untouched until the directory itself goes away.
        assert!(tree.get(file).unwrap().registered);
        assert_eq!(tree.get(file).unwrap().parent, Some(dir));

        tree.release(dir, 1).unwrap();
        assert!(tree.get(dir).is_none());
        assert!(tree.get(file).is_none());
    }

    #[test]
    fn test_clear_root() {
        let mut tree = Tree::new();
        let dir = tree.register(Handle::ROOT, "jobs", ItemKind::directory()).unwrap();
        tree.register(dir, "count", leaf()).unwrap();
        let held = tree.register(Handle::ROOT, "held", leaf()).unwrap();
        tree.acquire(held).unwrap();

        tree.clear_root();
        assert!(tree.get(Handle::ROOT).unwrap().children().is_empty());
        assert!(tree.get(Handle::ROOT).unwrap().registered);
        assert_eq!(tree.len(), 2);
        assert_eq!(refcount(&tree, held), Some(1));
    }

    #[test]
    fn test_teardown_drops_kernel_held() {
        let mut tree = Tree::new();
        let dir = tree.register(Handle::ROOT, "jobs", ItemKind::directory()).unwrap();
        let file = tree.register(dir, "count", leaf()).unwrap();
        tree.acquire(dir).unwrap();
        tree.unregister(dir);

        assert_eq!(tree.teardown(), 2);
        assert!(tree.get(file).is_none());
        assert_eq!(tree.len(), 1);
    }

    #[test]
    fn test_root_release_never_frees() {
        let mut tree = Tree::new();
        tree.release(Handle::ROOT, 5).unwrap();
        assert_eq!(refcount(&tree, Handle::ROOT), Some(1));
        assert!(!tree.unregister(Handle::ROOT));
    }
}
